use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use glam::{IVec2, Vec2};
use meander_common::ChunkCoord;
use meander_input::{Action, Control, InputFrame};
use meander_kernel::{ConfigOverrides, Engine, EngineConfig, EngineStats, Pump};
use meander_render::NullDevice;
use meander_stream::{ChunkGrid, TerrainGenerator};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meander-cli", about = "Headless tools for the meander terrain engine")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// JSON engine config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Chunks kept on each side of the observer
    #[arg(long, global = true)]
    radius: Option<u32>,

    /// Simulation ticks per second
    #[arg(long, global = true)]
    tick_rate: Option<f64>,

    /// Terrain noise seed
    #[arg(long, global = true)]
    seed: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and the resolved engine config
    Info,
    /// Run the engine headless while flying forward
    Run {
        /// Wall-clock seconds to run for
        #[arg(short, long, default_value = "2")]
        seconds: f64,
    },
    /// Walk a chunk grid in fixed steps and report each update
    Stream {
        /// Number of moves
        #[arg(short = 'n', long, default_value = "8")]
        steps: u32,
        /// Chunks moved along x per step
        #[arg(long, default_value = "1", allow_hyphen_values = true)]
        dx: i32,
        /// Chunks moved along y per step
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        dy: i32,
    },
    /// Generate one chunk and summarize its geometry
    Chunk {
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        x: i32,
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        y: i32,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let overrides = ConfigOverrides {
        radius: cli.radius,
        tick_rate: cli.tick_rate,
        seed: cli.seed,
    };
    let config = EngineConfig::resolve(cli.config.as_deref(), &overrides)?;

    match cli.command {
        Commands::Info => {
            println!("meander-cli v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "grid: {0}x{0} chunks, {1} quads per chunk side",
                config.stream.grid_edge(),
                config.stream.quads_per_side()
            );
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Run { seconds } => run(config, seconds)?,
        Commands::Stream { steps, dx, dy } => stream(config, steps, IVec2::new(dx, dy))?,
        Commands::Chunk { x, y } => chunk(&config, ChunkCoord::new(x, y)),
    }

    Ok(())
}

fn run(config: EngineConfig, seconds: f64) -> anyhow::Result<()> {
    if !seconds.is_finite() || seconds < 0.0 {
        anyhow::bail!("--seconds must be a non-negative number");
    }
    tracing::info!(seconds, "headless run with the null device");
    let device = Arc::new(NullDevice::new());
    let stats = fly_forward(config, device.clone(), Duration::from_secs_f64(seconds))?;

    println!("uptime: {:.2?}", stats.uptime);
    for (name, role) in [
        ("simulation", stats.simulation),
        ("presentation", stats.presentation),
    ] {
        println!(
            "{name}: dispatched={} skipped={} completed={} soft_overruns={} peak_in_flight={}",
            role.dispatched, role.skipped, role.completed, role.soft_overruns, role.peak_in_flight
        );
    }
    println!(
        "stream: observer=({}, {}) updates={} generated={} evicted={} full_resets={}",
        stats.last_stream.observer.x,
        stats.last_stream.observer.y,
        stats.stream_totals.updates,
        stats.stream_totals.generated,
        stats.stream_totals.evicted,
        stats.stream_totals.full_resets
    );
    println!(
        "render: samples={} avg={:.2?} min={:.2?} max={:.2?}",
        stats.render.samples, stats.render.average, stats.render.min, stats.render.max
    );
    let gpu = device.stats();
    println!(
        "device: frames={} draws={} buffers={} bytes_uploaded={}",
        gpu.frames, gpu.draws, gpu.buffers_created, gpu.bytes_uploaded
    );
    Ok(())
}

/// Drive the engine with MoveForward held until `duration` has passed.
/// The loop never sleeps; `Engine::pump` yields when nothing is due.
fn fly_forward(
    config: EngineConfig,
    device: Arc<NullDevice>,
    duration: Duration,
) -> anyhow::Result<EngineStats> {
    let mut engine = Engine::start(config, device, None)?;

    let mut input = InputFrame::default();
    input.apply(Action::Press(Control::MoveForward));

    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        if engine.pump(&input.take())? == Pump::Quit {
            break;
        }
    }
    let stats = engine.stats();
    engine.shutdown()?;
    Ok(stats)
}

fn stream(config: EngineConfig, steps: u32, step: IVec2) -> anyhow::Result<()> {
    let mut grid = ChunkGrid::new(config.stream)?;
    println!(
        "start: observer=({}, {}) occupied={}",
        grid.observer().x,
        grid.observer().y,
        grid.occupied()
    );
    for i in 1..=steps {
        let target = grid.observer() + step;
        if !grid.set_observer(target) {
            println!("step {i}: no move");
            continue;
        }
        let update = grid.last_update();
        println!(
            "step {i}: observer=({}, {}) reused={} generated={} evicted={}{} in {:.2?}",
            update.observer.x,
            update.observer.y,
            update.reused,
            update.generated,
            update.evicted,
            if update.full_reset { " (reset)" } else { "" },
            update.elapsed
        );
    }
    let totals = grid.totals();
    println!(
        "totals: updates={} generated={} evicted={} full_resets={} consistent={}",
        totals.updates,
        totals.generated,
        totals.evicted,
        totals.full_resets,
        grid.is_consistent()
    );
    Ok(())
}

fn chunk(config: &EngineConfig, coord: ChunkCoord) {
    let generator = TerrainGenerator::new(&config.stream);
    let started = Instant::now();
    let mesh = generator.generate(coord);
    let elapsed = started.elapsed();

    let (min_z, max_z) = mesh
        .vertices
        .iter()
        .map(|v| v.position[2])
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), z| {
            (lo.min(z), hi.max(z))
        });
    let road = mesh
        .vertices
        .iter()
        .filter(|v| {
            let noise_pos = Vec2::new(v.position[0], v.position[1]) * config.stream.noise_scale;
            generator.road_mask(noise_pos) > config.stream.road_threshold
        })
        .count();

    println!("chunk ({}, {}) generated in {elapsed:.2?}", coord.x, coord.y);
    println!(
        "vertices={} indices={} triangles={}",
        mesh.vertices.len(),
        mesh.indices.len(),
        mesh.indices.len() / 3
    );
    println!("height range: {min_z:.2}..{max_z:.2}, road vertices={road}");
    println!(
        "content hash: {:016x}",
        content_hash(&[
            bytemuck::cast_slice(&mesh.vertices),
            bytemuck::cast_slice(&mesh.indices),
        ])
    );
}

/// FNV-1a over the raw mesh bytes; stable across runs for a given seed.
fn content_hash(parts: &[&[u8]]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    parts.iter().flat_map(|part| part.iter()).fold(OFFSET, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_order_sensitive() {
        assert_eq!(content_hash(&[b"ab"]), content_hash(&[b"a", b"b"]));
        assert_ne!(content_hash(&[b"ab"]), content_hash(&[b"ba"]));
    }

    #[test]
    fn headless_flight_ticks_and_draws() {
        let mut config = EngineConfig {
            tick_rate: 500.0,
            fallback_frame_rate: 500.0,
            ..EngineConfig::default()
        };
        config.stream.chunk_size = 4;
        config.stream.resolution = 1;
        config.stream.radius = 2;

        let device = Arc::new(NullDevice::new());
        let stats = fly_forward(config, device.clone(), Duration::from_millis(300)).unwrap();

        assert!(stats.simulation.completed > 0);
        assert!(stats.presentation.completed > 0);
        assert_eq!(stats.presentation.peak_in_flight, 1);
        assert_eq!(device.stats().frames, stats.presentation.completed);
    }

    #[test]
    fn cli_parses_negative_steps() {
        let cli = Cli::parse_from(["meander-cli", "stream", "--dx", "-2", "--dy", "3"]);
        match cli.command {
            Commands::Stream { dx, dy, steps } => {
                assert_eq!((dx, dy, steps), (-2, 3, 8));
            }
            _ => panic!("expected stream"),
        }
    }
}
