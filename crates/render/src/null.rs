use crate::renderer::{
    BufferHandle, BufferKind, DeviceKind, Pipeline, RenderDevice, RenderError, check_kind,
    validate_upload,
};
use meander_common::CameraPose;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters collected by a [`NullDevice`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullDeviceStats {
    pub buffers_created: u64,
    pub bytes_uploaded: u64,
    pub draws: u64,
    pub pipeline_binds: u64,
    pub frames: u64,
}

#[derive(Debug, Default)]
struct FrameState {
    in_frame: bool,
    pipeline: Option<Pipeline>,
    width: u32,
    height: u32,
}

/// Device that enforces the render protocol but touches no GPU.
///
/// Selected with the headless renderer option; also the device used by tests.
#[derive(Debug)]
pub struct NullDevice {
    frame: Mutex<FrameState>,
    buffers_created: AtomicU64,
    bytes_uploaded: AtomicU64,
    draws: AtomicU64,
    pipeline_binds: AtomicU64,
    frames: AtomicU64,
}

impl Default for NullDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl NullDevice {
    pub fn new() -> Self {
        Self {
            frame: Mutex::new(FrameState {
                width: 1280,
                height: 720,
                ..FrameState::default()
            }),
            buffers_created: AtomicU64::new(0),
            bytes_uploaded: AtomicU64::new(0),
            draws: AtomicU64::new(0),
            pipeline_binds: AtomicU64::new(0),
            frames: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> NullDeviceStats {
        NullDeviceStats {
            buffers_created: self.buffers_created.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            draws: self.draws.load(Ordering::Relaxed),
            pipeline_binds: self.pipeline_binds.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
        }
    }
}

impl RenderDevice for NullDevice {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Null
    }

    fn create_buffer(
        &self,
        kind: BufferKind,
        data: &[u8],
        element_size: u32,
        element_count: u32,
    ) -> Result<BufferHandle, RenderError> {
        validate_upload(data, element_size, element_count)?;
        self.buffers_created.fetch_add(1, Ordering::Relaxed);
        self.bytes_uploaded
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(BufferHandle::new(kind, element_size, element_count, ()))
    }

    fn begin_frame(&self, _pose: &CameraPose) -> Result<(), RenderError> {
        let mut frame = self.frame.lock();
        if frame.in_frame {
            return Err(RenderError::FrameAlreadyStarted);
        }
        frame.in_frame = true;
        frame.pipeline = None;
        Ok(())
    }

    fn bind_pipeline(&self, pipeline: Pipeline) -> Result<(), RenderError> {
        let mut frame = self.frame.lock();
        if !frame.in_frame {
            return Err(RenderError::FrameNotStarted);
        }
        if frame.pipeline != Some(pipeline) {
            frame.pipeline = Some(pipeline);
            self.pipeline_binds.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn draw_with_buffers(
        &self,
        vertex: &BufferHandle,
        index: &BufferHandle,
    ) -> Result<(), RenderError> {
        let frame = self.frame.lock();
        if !frame.in_frame {
            return Err(RenderError::FrameNotStarted);
        }
        if frame.pipeline.is_none() {
            return Err(RenderError::NoPipelineBound);
        }
        check_kind(vertex, BufferKind::Vertex)?;
        check_kind(index, BufferKind::Index)?;
        if vertex.resource::<()>().is_none() || index.resource::<()>().is_none() {
            return Err(RenderError::ForeignBuffer(vertex.id()));
        }
        self.draws.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn end_frame(&self) -> Result<(), RenderError> {
        let mut frame = self.frame.lock();
        if !frame.in_frame {
            return Err(RenderError::FrameNotStarted);
        }
        frame.in_frame = false;
        frame.pipeline = None;
        self.frames.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn wait_for_idle(&self) {
        tracing::debug!("null device idle");
    }

    fn resize(&self, width: u32, height: u32) {
        let mut frame = self.frame.lock();
        frame.width = width.max(1);
        frame.height = height.max(1);
    }

    fn aspect(&self) -> f32 {
        let frame = self.frame.lock();
        frame.width as f32 / frame.height.max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(device: &NullDevice, kind: BufferKind) -> BufferHandle {
        device
            .create_buffer(kind, &[0u8; 16], 4, 4)
            .expect("valid upload")
    }

    #[test]
    fn full_frame_records_one_draw() {
        let device = NullDevice::new();
        let vb = upload(&device, BufferKind::Vertex);
        let ib = upload(&device, BufferKind::Index);

        device.begin_frame(&CameraPose::default()).unwrap();
        device.bind_pipeline(Pipeline::Terrain).unwrap();
        device.draw_with_buffers(&vb, &ib).unwrap();
        device.end_frame().unwrap();

        let stats = device.stats();
        assert_eq!(stats.buffers_created, 2);
        assert_eq!(stats.bytes_uploaded, 32);
        assert_eq!(stats.draws, 1);
        assert_eq!(stats.frames, 1);
    }

    #[test]
    fn draw_without_pipeline_is_rejected() {
        let device = NullDevice::new();
        let vb = upload(&device, BufferKind::Vertex);
        let ib = upload(&device, BufferKind::Index);

        device.begin_frame(&CameraPose::default()).unwrap();
        assert!(matches!(
            device.draw_with_buffers(&vb, &ib),
            Err(RenderError::NoPipelineBound)
        ));
    }

    #[test]
    fn draw_outside_frame_is_rejected() {
        let device = NullDevice::new();
        let vb = upload(&device, BufferKind::Vertex);
        let ib = upload(&device, BufferKind::Index);
        assert!(matches!(
            device.draw_with_buffers(&vb, &ib),
            Err(RenderError::FrameNotStarted)
        ));
    }

    #[test]
    fn swapped_buffers_are_rejected() {
        let device = NullDevice::new();
        let vb = upload(&device, BufferKind::Vertex);
        let ib = upload(&device, BufferKind::Index);

        device.begin_frame(&CameraPose::default()).unwrap();
        device.bind_pipeline(Pipeline::Terrain).unwrap();
        assert!(matches!(
            device.draw_with_buffers(&ib, &vb),
            Err(RenderError::WrongBufferKind { .. })
        ));
    }

    #[test]
    fn rebinding_same_pipeline_is_a_no_op() {
        let device = NullDevice::new();
        device.begin_frame(&CameraPose::default()).unwrap();
        device.bind_pipeline(Pipeline::Terrain).unwrap();
        device.bind_pipeline(Pipeline::Terrain).unwrap();
        device.end_frame().unwrap();
        assert_eq!(device.stats().pipeline_binds, 1);
    }

    #[test]
    fn double_begin_is_rejected() {
        let device = NullDevice::new();
        device.begin_frame(&CameraPose::default()).unwrap();
        assert!(matches!(
            device.begin_frame(&CameraPose::default()),
            Err(RenderError::FrameAlreadyStarted)
        ));
    }

    #[test]
    fn resize_updates_aspect() {
        let device = NullDevice::new();
        device.resize(800, 400);
        assert_eq!(device.aspect(), 2.0);
        device.resize(100, 0);
        assert_eq!(device.aspect(), 100.0);
    }
}
