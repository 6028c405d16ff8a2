use meander_common::CameraPose;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
    Uniform,
}

/// Pipelines the world can bind before drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Pipeline {
    Terrain,
}

/// Which implementation was selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Null,
    Wgpu,
}

/// Errors from the render-resource layer.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("draw issued with no pipeline bound")]
    NoPipelineBound,
    #[error("draw issued outside of a frame")]
    FrameNotStarted,
    #[error("frame begun twice without end_frame")]
    FrameAlreadyStarted,
    #[error("expected a {expected:?} buffer, got {actual:?}")]
    WrongBufferKind {
        expected: BufferKind,
        actual: BufferKind,
    },
    #[error("upload of {len} bytes does not match {element_count} x {element_size}-byte elements")]
    SizeMismatch {
        len: usize,
        element_size: u32,
        element_count: u32,
    },
    #[error("buffer {0} was created by a different device")]
    ForeignBuffer(u64),
    #[error("pipeline {0:?} is not supported by this device")]
    UnsupportedPipeline(Pipeline),
    #[error("surface error: {0}")]
    Surface(String),
}

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

struct BufferInner {
    id: u64,
    kind: BufferKind,
    element_size: u32,
    element_count: u32,
    resource: Box<dyn Any + Send + Sync>,
}

/// Shared handle to a device-resident buffer.
///
/// Cloning is cheap. The backend resource is released when the last clone drops,
/// so a frame that still holds a handle keeps the buffer alive until it is submitted.
#[derive(Clone)]
pub struct BufferHandle(Arc<BufferInner>);

impl BufferHandle {
    /// Wrap a backend resource. Only device implementations call this.
    pub fn new<R: Any + Send + Sync>(
        kind: BufferKind,
        element_size: u32,
        element_count: u32,
        resource: R,
    ) -> Self {
        Self(Arc::new(BufferInner {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            element_size,
            element_count,
            resource: Box::new(resource),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn kind(&self) -> BufferKind {
        self.0.kind
    }

    pub fn element_size(&self) -> u32 {
        self.0.element_size
    }

    pub fn element_count(&self) -> u32 {
        self.0.element_count
    }

    pub fn byte_len(&self) -> u64 {
        self.0.element_size as u64 * self.0.element_count as u64
    }

    /// Backend resource, if this handle was created by a backend using type `R`.
    pub fn resource<R: Any>(&self) -> Option<&R> {
        self.0.resource.downcast_ref::<R>()
    }
}

impl fmt::Debug for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferHandle")
            .field("id", &self.0.id)
            .field("kind", &self.0.kind)
            .field("element_size", &self.0.element_size)
            .field("element_count", &self.0.element_count)
            .finish()
    }
}

/// Render-resource capability interface.
///
/// Buffer creation may be called from any thread. The per-frame calls
/// (`begin_frame`, `bind_pipeline`, `draw_with_buffers`, `end_frame`) are issued
/// by the presentation worker only.
pub trait RenderDevice: Send + Sync {
    fn kind(&self) -> DeviceKind;

    /// Create a device-resident buffer initialised from `data`.
    fn create_buffer(
        &self,
        kind: BufferKind,
        data: &[u8],
        element_size: u32,
        element_count: u32,
    ) -> Result<BufferHandle, RenderError>;

    /// Start recording a frame and upload per-frame uniforms from the camera.
    fn begin_frame(&self, pose: &CameraPose) -> Result<(), RenderError>;

    /// Bind a pipeline for subsequent draws. Rebinding the current pipeline is a no-op.
    fn bind_pipeline(&self, pipeline: Pipeline) -> Result<(), RenderError>;

    /// Record an indexed draw of `index` over `vertex` with the bound pipeline.
    fn draw_with_buffers(
        &self,
        vertex: &BufferHandle,
        index: &BufferHandle,
    ) -> Result<(), RenderError>;

    /// Submit the recorded frame and present it.
    fn end_frame(&self) -> Result<(), RenderError>;

    /// Block until the device has finished all submitted work.
    fn wait_for_idle(&self);

    fn resize(&self, width: u32, height: u32);

    fn aspect(&self) -> f32;
}

/// Check that an upload's byte length matches its element layout.
pub fn validate_upload(
    data: &[u8],
    element_size: u32,
    element_count: u32,
) -> Result<(), RenderError> {
    let expected = element_size as usize * element_count as usize;
    if data.len() != expected {
        return Err(RenderError::SizeMismatch {
            len: data.len(),
            element_size,
            element_count,
        });
    }
    Ok(())
}

/// Check that a handle is bound as the expected kind.
pub fn check_kind(handle: &BufferHandle, expected: BufferKind) -> Result<(), RenderError> {
    if handle.kind() != expected {
        return Err(RenderError::WrongBufferKind {
            expected,
            actual: handle.kind(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_get_unique_ids() {
        let a = BufferHandle::new(BufferKind::Vertex, 4, 1, ());
        let b = BufferHandle::new(BufferKind::Vertex, 4, 1, ());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn resource_downcast() {
        let h = BufferHandle::new(BufferKind::Index, 4, 3, 7u32);
        assert_eq!(h.resource::<u32>(), Some(&7));
        assert!(h.resource::<String>().is_none());
        assert_eq!(h.byte_len(), 12);
    }

    #[test]
    fn upload_size_is_validated() {
        assert!(validate_upload(&[0u8; 12], 4, 3).is_ok());
        let err = validate_upload(&[0u8; 10], 4, 3).unwrap_err();
        assert!(matches!(err, RenderError::SizeMismatch { len: 10, .. }));
    }

    #[test]
    fn kind_mismatch_is_an_error() {
        let h = BufferHandle::new(BufferKind::Index, 4, 1, ());
        assert!(check_kind(&h, BufferKind::Index).is_ok());
        assert!(matches!(
            check_kind(&h, BufferKind::Vertex),
            Err(RenderError::WrongBufferKind {
                expected: BufferKind::Vertex,
                actual: BufferKind::Index
            })
        ));
    }
}
