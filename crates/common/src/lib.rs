//! Shared types used across the engine crates.
//!
//! # Invariants
//! - Chunk coordinates are integers; world position = coordinate * chunk edge length.
//! - Vertex layout is `#[repr(C)]` and `Pod` so it uploads to the GPU without conversion.

mod types;

pub use types::{CameraPose, ChunkCoord, Index, TerrainVertex};
