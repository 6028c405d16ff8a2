//! Render-resource layer: a backend-agnostic capability interface.
//!
//! # Invariants
//! - The world and the chunk grid depend only on [`RenderDevice`], never on a backend.
//! - Protocol violations (drawing with no pipeline, wrong buffer kind, size mismatch)
//!   are errors returned to the caller, never silently ignored.
//!
//! The GPU backend lives in `meander-render-wgpu`. [`NullDevice`] validates the same
//! protocol without a GPU and backs the headless CLI and tests.

mod null;
mod renderer;

pub use null::{NullDevice, NullDeviceStats};
pub use renderer::{
    BufferHandle, BufferKind, DeviceKind, Pipeline, RenderDevice, RenderError, check_kind,
    validate_upload,
};
