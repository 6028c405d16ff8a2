use meander_common::{ChunkCoord, Index, TerrainVertex};
use meander_render::{BufferHandle, BufferKind, RenderDevice, RenderError};
use parking_lot::Mutex;

use crate::terrain::{ChunkMesh, TerrainGenerator};

/// Device-resident buffers of a materialized chunk.
#[derive(Debug, Clone)]
pub struct GpuMesh {
    pub vertex: BufferHandle,
    pub index: BufferHandle,
}

/// Where a chunk's geometry currently lives. Transitions only from
/// `Generated` to `Materialized`.
#[derive(Debug)]
pub enum ChunkState {
    Generated(ChunkMesh),
    Materialized(GpuMesh),
}

/// One square tile of terrain.
#[derive(Debug)]
pub struct Chunk {
    coord: ChunkCoord,
    vertex_count: u32,
    index_count: u32,
    state: Mutex<ChunkState>,
}

impl Chunk {
    pub fn generate(coord: ChunkCoord, generator: &TerrainGenerator) -> Self {
        Self::from_mesh(coord, generator.generate(coord))
    }

    pub fn from_mesh(coord: ChunkCoord, mesh: ChunkMesh) -> Self {
        Self {
            coord,
            vertex_count: mesh.vertices.len() as u32,
            index_count: mesh.indices.len() as u32,
            state: Mutex::new(ChunkState::Generated(mesh)),
        }
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn is_materialized(&self) -> bool {
        matches!(*self.state.lock(), ChunkState::Materialized(_))
    }

    /// Copy of the CPU mesh, if it has not been uploaded yet.
    pub fn cpu_mesh(&self) -> Option<ChunkMesh> {
        match &*self.state.lock() {
            ChunkState::Generated(mesh) => Some(mesh.clone()),
            ChunkState::Materialized(_) => None,
        }
    }

    /// Upload the CPU mesh to `device` and drop it, once.
    ///
    /// Returns the device buffers and whether this call performed the upload.
    /// On failure the chunk stays `Generated`.
    pub fn materialize(&self, device: &dyn RenderDevice) -> Result<(GpuMesh, bool), RenderError> {
        let mut state = self.state.lock();
        let mesh = match &*state {
            ChunkState::Materialized(gpu) => return Ok((gpu.clone(), false)),
            ChunkState::Generated(mesh) => mesh,
        };

        let vertex = device.create_buffer(
            BufferKind::Vertex,
            bytemuck::cast_slice(&mesh.vertices),
            size_of::<TerrainVertex>() as u32,
            self.vertex_count,
        )?;
        let index = device.create_buffer(
            BufferKind::Index,
            bytemuck::cast_slice(&mesh.indices),
            size_of::<Index>() as u32,
            self.index_count,
        )?;

        let gpu = GpuMesh { vertex, index };
        *state = ChunkState::Materialized(gpu.clone());
        tracing::trace!(x = self.coord.x, y = self.coord.y, "chunk materialized");
        Ok((gpu, true))
    }

    /// Materialize if needed, then draw with the currently bound pipeline.
    /// Returns whether this call uploaded the chunk.
    pub fn draw(&self, device: &dyn RenderDevice) -> Result<bool, RenderError> {
        let (gpu, uploaded) = self.materialize(device)?;
        device.draw_with_buffers(&gpu.vertex, &gpu.index)?;
        Ok(uploaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StreamConfig;
    use meander_common::CameraPose;
    use meander_render::{NullDevice, Pipeline};

    fn tiny_chunk() -> Chunk {
        let config = StreamConfig {
            chunk_size: 4,
            resolution: 1,
            ..StreamConfig::default()
        };
        Chunk::generate(ChunkCoord::new(2, 3), &TerrainGenerator::new(&config))
    }

    #[test]
    fn materializes_once() {
        let device = NullDevice::new();
        let chunk = tiny_chunk();
        assert!(!chunk.is_materialized());
        assert!(chunk.cpu_mesh().is_some());

        let (first, uploaded) = chunk.materialize(&device).unwrap();
        assert!(uploaded);
        assert!(chunk.is_materialized());
        assert!(chunk.cpu_mesh().is_none());
        assert_eq!(first.vertex.element_count(), 25);
        assert_eq!(first.index.element_count(), 4 * 4 * 6);

        let (second, uploaded) = chunk.materialize(&device).unwrap();
        assert!(!uploaded);
        assert_eq!(first.vertex.id(), second.vertex.id());
        assert_eq!(device.stats().buffers_created, 2);
    }

    #[test]
    fn draw_requires_a_pipeline() {
        let device = NullDevice::new();
        let chunk = tiny_chunk();
        device.begin_frame(&CameraPose::default()).unwrap();
        assert!(matches!(
            chunk.draw(&device),
            Err(RenderError::NoPipelineBound)
        ));
        // The upload happened before the draw was rejected.
        assert!(chunk.is_materialized());

        device.bind_pipeline(Pipeline::Terrain).unwrap();
        assert!(!chunk.draw(&device).unwrap());
        device.end_frame().unwrap();
        assert_eq!(device.stats().draws, 1);
    }
}
