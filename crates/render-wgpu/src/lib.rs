//! wgpu render backend.
//!
//! [`WgpuDevice`] implements [`meander_render::RenderDevice`] over a window
//! surface. Draws are recorded during a frame and encoded into a single render
//! pass when the frame ends.
//!
//! # Invariants
//! - Buffers created by another device are rejected, never reinterpreted.
//! - A lost or outdated surface is reconfigured and the frame dropped; it is
//!   not an error.

mod gpu;
mod shaders;

pub use gpu::WgpuDevice;
