use std::sync::Arc;
use std::time::Instant;

use glam::{IVec2, Vec3};
use meander_common::ChunkCoord;
use meander_render::{Pipeline, RenderDevice, RenderError};

use crate::StreamError;
use crate::chunk::Chunk;
use crate::config::StreamConfig;
use crate::stats::{DrawStats, StreamStats, StreamTotals};
use crate::terrain::TerrainGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    X,
    Y,
}

/// Coordinate represented by the slot at `slot` (0-based, per axis) when the
/// observer stands in `observer`.
pub fn slot_coordinate(observer: ChunkCoord, slot: IVec2, radius: i32) -> ChunkCoord {
    observer + (slot - IVec2::splat(radius))
}

/// Fixed `(2R+1)²` window of chunks centred on the observer's chunk.
///
/// Slots are addressed `x * edge + y`. Moving the observer slides surviving
/// chunks in place and generates the newly exposed ones; the slot array never
/// grows or shrinks.
pub struct ChunkGrid {
    config: StreamConfig,
    edge: i32,
    observer: ChunkCoord,
    slots: Vec<Option<Arc<Chunk>>>,
    generator: TerrainGenerator,
    last: StreamStats,
    totals: StreamTotals,
}

impl ChunkGrid {
    /// Create a grid around chunk (0, 0) and generate every slot.
    pub fn new(config: StreamConfig) -> Result<Self, StreamError> {
        config.validate()?;
        let edge = config.grid_edge();
        let generator = TerrainGenerator::new(&config);
        let mut grid = Self {
            config,
            edge,
            observer: ChunkCoord::ORIGIN,
            slots: vec![None; (edge * edge) as usize],
            generator,
            last: StreamStats::default(),
            totals: StreamTotals::default(),
        };

        let start = Instant::now();
        let generated = grid.fill();
        grid.last = StreamStats {
            generated,
            elapsed: start.elapsed(),
            ..StreamStats::default()
        };
        tracing::info!(
            chunks = generated,
            edge,
            elapsed_ms = grid.last.elapsed.as_secs_f64() * 1000.0,
            "chunk grid ready"
        );
        Ok(grid)
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn edge(&self) -> i32 {
        self.edge
    }

    pub fn observer(&self) -> ChunkCoord {
        self.observer
    }

    pub fn last_update(&self) -> StreamStats {
        self.last
    }

    pub fn totals(&self) -> StreamTotals {
        self.totals
    }

    pub fn generator(&self) -> &TerrainGenerator {
        &self.generator
    }

    /// Move the observer to the chunk containing `position` (XY, Z up).
    /// Returns `false` when the chunk did not change.
    pub fn set_observer_position(&mut self, position: Vec3) -> bool {
        let coord = ChunkCoord::from_world(position.truncate(), self.config.chunk_size as f32);
        self.set_observer(coord)
    }

    /// Move the observer to `coord`, shifting and refilling the window.
    ///
    /// `coord` is clamped so every slot of the window stays addressable in
    /// `i32`; far-away positions pin the window to the edge of chunk space.
    pub fn set_observer(&mut self, coord: ChunkCoord) -> bool {
        let coord = self.clamp_observer(coord);
        if coord == self.observer {
            return false;
        }
        let _span = tracing::info_span!("stream_update", x = coord.x, y = coord.y).entered();
        let start = Instant::now();

        let delta = self.observer.as_ivec2().saturating_sub(coord.as_ivec2());
        let full_reset = self.is_teleport(delta);
        let evicted = self.shift(delta);
        self.observer = coord;
        let generated = self.fill();

        self.last = StreamStats {
            observer: coord,
            reused: self.occupied() - generated,
            generated,
            evicted,
            full_reset,
            elapsed: start.elapsed(),
        };
        self.totals.record(&self.last);

        if full_reset {
            tracing::debug!(delta = ?delta, "observer jumped past the window; grid reset");
        }
        tracing::debug!(
            reused = self.last.reused,
            generated,
            evicted,
            elapsed_ms = self.last.elapsed.as_secs_f64() * 1000.0,
            "stream update complete"
        );
        true
    }

    fn clamp_observer(&self, coord: ChunkCoord) -> ChunkCoord {
        let radius = self.config.radius as i32;
        let (min, max) = (i32::MIN + radius, i32::MAX - radius);
        ChunkCoord::new(coord.x.clamp(min, max), coord.y.clamp(min, max))
    }

    fn is_teleport(&self, delta: IVec2) -> bool {
        delta.x.abs() >= self.edge || delta.y.abs() >= self.edge
    }

    /// Slide slot contents by `delta` (old observer minus new), Y axis first.
    /// Chunks pushed off the window are dropped; vacated slots are left empty.
    /// A delta of a full edge or more on either axis empties every slot.
    ///
    /// Returns the number of chunks evicted. Does not move the observer.
    pub fn shift(&mut self, delta: IVec2) -> usize {
        if self.is_teleport(delta) {
            let evicted = self.occupied();
            self.slots.iter_mut().for_each(|slot| *slot = None);
            return evicted;
        }
        self.slide(Axis::Y, delta.y) + self.slide(Axis::X, delta.x)
    }

    fn slide(&mut self, axis: Axis, delta: i32) -> usize {
        if delta == 0 {
            return 0;
        }
        let mut evicted = 0;
        for line in 0..self.edge {
            for step in 0..self.edge {
                // Walk toward the direction of travel so every target slot has
                // already been vacated.
                let pos = if delta < 0 { step } else { self.edge - 1 - step };
                let source = self.index(axis, line, pos);
                let chunk = self.slots[source].take();
                let target = pos + delta;
                if (0..self.edge).contains(&target) {
                    let dest = self.index(axis, line, target);
                    debug_assert!(self.slots[dest].is_none());
                    self.slots[dest] = chunk;
                } else if chunk.is_some() {
                    evicted += 1;
                }
            }
        }
        evicted
    }

    fn index(&self, axis: Axis, line: i32, pos: i32) -> usize {
        let (x, y) = match axis {
            Axis::Y => (line, pos),
            Axis::X => (pos, line),
        };
        (x * self.edge + y) as usize
    }

    /// Generate a chunk into every empty slot. Returns how many were generated.
    pub fn fill(&mut self) -> usize {
        let radius = self.config.radius as i32;
        let mut generated = 0;
        for x in 0..self.edge {
            for y in 0..self.edge {
                let idx = (x * self.edge + y) as usize;
                if self.slots[idx].is_some() {
                    continue;
                }
                let coord = slot_coordinate(self.observer, IVec2::new(x, y), radius);
                self.slots[idx] = Some(Arc::new(Chunk::generate(coord, &self.generator)));
                generated += 1;
            }
        }
        generated
    }

    /// Resident chunk at `coord`, if it lies inside the window.
    pub fn chunk_at(&self, coord: ChunkCoord) -> Option<Arc<Chunk>> {
        let slot = coord
            .as_ivec2()
            .saturating_sub(self.observer.as_ivec2())
            .saturating_add(IVec2::splat(self.config.radius as i32));
        if !(0..self.edge).contains(&slot.x) || !(0..self.edge).contains(&slot.y) {
            return None;
        }
        self.slots[(slot.x * self.edge + slot.y) as usize].clone()
    }

    /// Occupied slots in slot order.
    pub fn chunks(&self) -> Vec<Arc<Chunk>> {
        self.slots.iter().flatten().cloned().collect()
    }

    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Every occupied slot holds the chunk for the coordinate it represents.
    pub fn is_consistent(&self) -> bool {
        let radius = self.config.radius as i32;
        self.slots.iter().enumerate().all(|(idx, slot)| {
            slot.as_ref().is_none_or(|chunk| {
                let idx = idx as i32;
                let slot = IVec2::new(idx / self.edge, idx % self.edge);
                chunk.coord() == slot_coordinate(self.observer, slot, radius)
            })
        })
    }

    /// Draw every resident chunk. The caller owns the frame.
    pub fn render(&self, device: &dyn RenderDevice) -> Result<DrawStats, RenderError> {
        render_chunks(self.slots.iter().flatten(), device)
    }
}

/// Bind the terrain pipeline and draw `chunks`, uploading any that are still
/// CPU-resident.
pub fn render_chunks<'a>(
    chunks: impl IntoIterator<Item = &'a Arc<Chunk>>,
    device: &dyn RenderDevice,
) -> Result<DrawStats, RenderError> {
    device.bind_pipeline(Pipeline::Terrain)?;
    let mut stats = DrawStats::default();
    for chunk in chunks {
        if chunk.draw(device)? {
            stats.materialized += 1;
        }
        stats.drawn += 1;
    }
    Ok(stats)
}
