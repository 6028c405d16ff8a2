use std::sync::Arc;

use meander_common::{CameraPose, ChunkCoord};
use meander_render::{RenderDevice, RenderError};
use meander_stream::{
    Chunk, ChunkGrid, DrawStats, StreamConfig, StreamError, StreamStats, StreamTotals,
    render_chunks,
};
use parking_lot::{Mutex, RwLock};

/// Thin coordinator between the workers and the chunk grid.
///
/// Simulation moves the observer under the grid lock and then publishes the
/// resident chunk list. Presentation draws from the latest published list
/// and never takes the grid lock.
pub struct World {
    grid: Mutex<ChunkGrid>,
    drawable: RwLock<Arc<Vec<Arc<Chunk>>>>,
}

impl World {
    pub fn new(config: StreamConfig) -> Result<Self, StreamError> {
        let grid = ChunkGrid::new(config)?;
        let drawable = Arc::new(grid.chunks());
        Ok(Self {
            grid: Mutex::new(grid),
            drawable: RwLock::new(drawable),
        })
    }

    /// One simulation step: follow the camera. Returns the streaming result
    /// when the observer changed chunk.
    pub fn tick(&self, pose: &CameraPose) -> Option<StreamStats> {
        let mut grid = self.grid.lock();
        if !grid.set_observer_position(pose.position) {
            return None;
        }
        let chunks = Arc::new(grid.chunks());
        let stats = grid.last_update();
        drop(grid);

        *self.drawable.write() = chunks;
        Some(stats)
    }

    /// Draw the resident chunks. The caller owns the frame.
    pub fn render(&self, device: &dyn RenderDevice) -> Result<DrawStats, RenderError> {
        let chunks = self.drawable();
        render_chunks(chunks.iter(), device)
    }

    /// Latest published chunk list.
    pub fn drawable(&self) -> Arc<Vec<Arc<Chunk>>> {
        Arc::clone(&self.drawable.read())
    }

    pub fn observer(&self) -> ChunkCoord {
        self.grid.lock().observer()
    }

    pub fn last_update(&self) -> StreamStats {
        self.grid.lock().last_update()
    }

    pub fn totals(&self) -> StreamTotals {
        self.grid.lock().totals()
    }

    pub fn chunk_at(&self, coord: ChunkCoord) -> Option<Arc<Chunk>> {
        self.grid.lock().chunk_at(coord)
    }
}
