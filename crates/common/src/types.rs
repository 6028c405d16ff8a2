use bytemuck::{Pod, Zeroable};
use glam::{IVec2, Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Integer coordinate of a chunk in world space (XY plane, Z is up).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
}

impl ChunkCoord {
    pub const ORIGIN: Self = Self { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chunk containing a world position. Uses floor so negative positions
    /// land in negative chunks instead of collapsing onto chunk 0.
    pub fn from_world(position: Vec2, chunk_size: f32) -> Self {
        Self {
            x: (position.x / chunk_size).floor() as i32,
            y: (position.y / chunk_size).floor() as i32,
        }
    }

    /// World-space position of the chunk's minimum corner.
    pub fn to_world(self, chunk_size: f32) -> Vec2 {
        Vec2::new(self.x as f32 * chunk_size, self.y as f32 * chunk_size)
    }

    pub fn as_ivec2(self) -> IVec2 {
        IVec2::new(self.x, self.y)
    }
}

impl From<IVec2> for ChunkCoord {
    fn from(v: IVec2) -> Self {
        Self::new(v.x, v.y)
    }
}

impl std::ops::Add<IVec2> for ChunkCoord {
    type Output = ChunkCoord;

    fn add(self, rhs: IVec2) -> ChunkCoord {
        ChunkCoord::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for ChunkCoord {
    type Output = IVec2;

    fn sub(self, rhs: ChunkCoord) -> IVec2 {
        IVec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Terrain vertex: position, normal, color.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct TerrainVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
}

/// Index element type for all index buffers.
pub type Index = u32;

/// Immutable snapshot of the camera, published once per frame.
///
/// Simulation reads `position` to drive streaming; Presentation reads the
/// matrices to build per-frame uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub view: Mat4,
    pub proj: Mat4,
}

impl CameraPose {
    pub fn view_projection(&self) -> Mat4 {
        self.proj * self.view
    }
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_world_floors_negative_positions() {
        assert_eq!(ChunkCoord::from_world(Vec2::new(10.0, 10.0), 64.0), ChunkCoord::new(0, 0));
        assert_eq!(ChunkCoord::from_world(Vec2::new(-10.0, 70.0), 64.0), ChunkCoord::new(-1, 1));
        assert_eq!(ChunkCoord::from_world(Vec2::new(64.0, -64.0), 64.0), ChunkCoord::new(1, -1));
    }

    #[test]
    fn to_world_scales_by_chunk_size() {
        assert_eq!(ChunkCoord::new(2, -3).to_world(16.0), Vec2::new(32.0, -48.0));
    }

    #[test]
    fn coord_arithmetic() {
        let a = ChunkCoord::new(3, 4);
        let b = ChunkCoord::new(1, 6);
        assert_eq!(a - b, IVec2::new(2, -2));
        assert_eq!(b + IVec2::new(2, -2), a);
    }

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<TerrainVertex>(), 36);
    }
}
