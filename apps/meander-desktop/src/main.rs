use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use glam::Vec2;
use meander_input::{Action, Control, InputFrame};
use meander_kernel::{ConfigOverrides, Engine, EngineConfig, Pump};
use meander_render_wgpu::WgpuDevice;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{
    DeviceEvent, DeviceId, ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent,
};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowId};

/// Pixels of trackpad scroll that count as one wheel line.
const PIXELS_PER_LINE: f64 = 40.0;

#[derive(Parser)]
#[command(name = "meander-desktop", about = "Fly over procedurally streamed terrain")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// JSON engine config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Chunks kept on each side of the camera
    #[arg(long)]
    radius: Option<u32>,

    /// Simulation ticks per second
    #[arg(long)]
    tick_rate: Option<f64>,

    /// Terrain noise seed
    #[arg(long)]
    seed: Option<u32>,
}

fn map_key(key: KeyCode) -> Option<Control> {
    match key {
        KeyCode::KeyW => Some(Control::MoveForward),
        KeyCode::KeyS => Some(Control::MoveBack),
        KeyCode::KeyA => Some(Control::MoveLeft),
        KeyCode::KeyD => Some(Control::MoveRight),
        KeyCode::Space | KeyCode::KeyE => Some(Control::MoveUp),
        KeyCode::ControlLeft | KeyCode::KeyQ => Some(Control::MoveDown),
        _ => None,
    }
}

fn refresh_rate(window: &Window) -> Option<f64> {
    window
        .current_monitor()
        .and_then(|monitor| monitor.refresh_rate_millihertz())
        .map(|millihertz| millihertz as f64 / 1000.0)
}

struct App {
    config: EngineConfig,
    window: Option<Arc<Window>>,
    engine: Option<Engine>,
    input: InputFrame,
    grabbed: bool,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            window: None,
            engine: None,
            input: InputFrame::default(),
            grabbed: false,
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        tracing::error!("{err:#}");
        self.error.get_or_insert(err);
        event_loop.exit();
    }

    fn set_grab(&mut self, grabbed: bool) {
        let Some(window) = &self.window else {
            return;
        };
        if grabbed {
            let locked = window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined));
            if let Err(err) = locked {
                tracing::warn!(%err, "cursor grab unavailable");
            }
        } else if let Err(err) = window.set_cursor_grab(CursorGrabMode::None) {
            tracing::warn!(%err, "cursor release failed");
        }
        window.set_cursor_visible(!grabbed);
        self.grabbed = grabbed;
        self.input.apply(if grabbed {
            Action::Press(Control::Look)
        } else {
            Action::Release(Control::Look)
        });
    }

    fn init_gpu(window: Arc<Window>) -> Result<WgpuDevice> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| anyhow::anyhow!("no compatible GPU adapter"))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("meander_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow::anyhow!("surface reports no formats"))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        tracing::info!(
            "GPU initialized with {} backend",
            adapter.get_info().backend.to_str()
        );
        Ok(WgpuDevice::new(device, queue, surface, config))
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title("Meander")
            .with_inner_size(PhysicalSize::new(1280u32, 720));
        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => return self.fail(event_loop, err.into()),
        };

        let device = match Self::init_gpu(window.clone()) {
            Ok(device) => Arc::new(device),
            Err(err) => return self.fail(event_loop, err),
        };

        let refresh = refresh_rate(&window);
        match Engine::start(self.config.clone(), device, refresh) {
            Ok(engine) => self.engine = Some(engine),
            Err(err) => return self.fail(event_loop, err.into()),
        }
        tracing::info!(refresh_hz = ?refresh, "window ready; Tab grabs the mouse, RMB looks");
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => self.input.apply(Action::Quit),
            WindowEvent::Resized(size) => {
                let minimized = size.width == 0 || size.height == 0;
                self.input.apply(Action::Minimized(minimized));
                if !minimized {
                    self.input.apply(Action::Resize {
                        width: size.width,
                        height: size.height,
                    });
                }
            }
            WindowEvent::Occluded(occluded) => self.input.apply(Action::Minimized(occluded)),
            WindowEvent::Moved(_) => {
                if let (Some(engine), Some(window)) = (&self.engine, &self.window) {
                    engine.set_display_refresh(refresh_rate(window));
                }
            }
            WindowEvent::Focused(false) if self.grabbed => self.set_grab(false),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                let pressed = state == ElementState::Pressed;
                match key {
                    KeyCode::Tab if pressed => self.set_grab(!self.grabbed),
                    KeyCode::Escape if pressed => {
                        if self.grabbed {
                            self.set_grab(false);
                        } else {
                            self.input.apply(Action::Quit);
                        }
                    }
                    _ => {
                        if let Some(control) = map_key(key) {
                            self.input.apply(if pressed {
                                Action::Press(control)
                            } else {
                                Action::Release(control)
                            });
                        }
                    }
                }
            }
            WindowEvent::MouseInput {
                button: MouseButton::Right,
                state,
                ..
            } if !self.grabbed => {
                self.input.apply(match state {
                    ElementState::Pressed => Action::Press(Control::Look),
                    ElementState::Released => Action::Release(Control::Look),
                });
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => (position.y / PIXELS_PER_LINE) as f32,
                };
                self.input.apply(Action::Scroll(lines));
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.input
                .apply(Action::PointerMotion(Vec2::new(delta.0 as f32, delta.1 as f32)));
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        match engine.pump(&self.input.take()) {
            Ok(Pump::Continue) => {}
            Ok(Pump::Quit) => event_loop.exit(),
            Err(err) => self.fail(event_loop, err.into()),
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut engine) = self.engine.take() {
            let stats = engine.stats();
            tracing::info!(
                ticks = stats.simulation.completed,
                frames = stats.presentation.completed,
                chunks_generated = stats.stream_totals.generated,
                avg_render_ms = stats.render.average.as_secs_f64() * 1000.0,
                "session summary"
            );
            if let Err(err) = engine.shutdown() {
                tracing::error!(%err, "shutdown failed");
                self.error.get_or_insert(err.into());
            }
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!("meander-desktop starting");

    let overrides = ConfigOverrides {
        radius: cli.radius,
        tick_rate: cli.tick_rate,
        seed: cli.seed,
    };
    let config = EngineConfig::resolve(cli.config.as_deref(), &overrides)?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
