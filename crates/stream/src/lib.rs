//! Streaming: a bounded window of procedurally generated terrain chunks that
//! follows a moving observer.
//!
//! # Invariants
//! - A resident chunk always sits in the slot for its own coordinate; the
//!   window never holds duplicates or stale chunks after an update.
//! - A move smaller than the window keeps every overlapping chunk (and its GPU
//!   buffers); a larger move discards the whole window.
//! - Chunk geometry is a pure function of coordinate and config.
//! - CPU geometry is uploaded at most once per chunk, then dropped.

mod chunk;
mod config;
mod grid;
mod stats;
mod terrain;

pub use chunk::{Chunk, ChunkState, GpuMesh};
pub use config::{MAX_RADIUS, StreamConfig};
pub use grid::{ChunkGrid, render_chunks, slot_coordinate};
pub use stats::{DrawStats, StreamStats, StreamTotals};
pub use terrain::{ChunkMesh, TerrainGenerator};

use meander_render::RenderError;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("invalid stream config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Render(#[from] RenderError),
}
