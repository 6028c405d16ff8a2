//! Procedural terrain: layered noise heights, a meandering road, finite-difference normals.

use glam::{Vec2, Vec3};
use meander_common::{ChunkCoord, Index, TerrainVertex};
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

use crate::config::StreamConfig;

const DETAIL_OCTAVES: usize = 6;
const SMOOTH_OCTAVES: usize = 3;
/// Normal sampling step, as a fraction of one world unit.
const NORMAL_SAMPLE_STEP: f32 = 0.01;
/// Road mask value at the outer edge of the verge.
const VERGE_FLOOR: f32 = 0.2;

const GRASS_COLOR: Vec3 = Vec3::new(0.0, 0.2, 0.0);
const ROAD_COLOR: Vec3 = Vec3::new(0.1, 0.1, 0.1);
const VERGE_COLOR: Vec3 = Vec3::new(0.2, 0.1, 0.075);

/// CPU-side geometry of one chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkMesh {
    pub vertices: Vec<TerrainVertex>,
    pub indices: Vec<Index>,
}

/// Deterministic height/color field sampled per vertex.
///
/// Two fractal noise layers share one seed: a six-octave detail layer and a
/// three-octave smooth layer. The road mask blends from detail to smooth so the
/// road surface stays drivable.
#[derive(Clone)]
pub struct TerrainGenerator {
    chunk_size: u32,
    resolution: u32,
    noise_scale: f32,
    terrain_height: f32,
    road_threshold: f32,
    road_height: f32,
    road_half_width: f32,
    road_blend_distance: f32,
    detail: Fbm<Perlin>,
    smooth: Fbm<Perlin>,
}

impl TerrainGenerator {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            resolution: config.resolution,
            noise_scale: config.noise_scale,
            terrain_height: config.terrain_height,
            road_threshold: config.road_threshold,
            road_height: config.road_height,
            road_half_width: config.road_half_width,
            road_blend_distance: config.road_blend_distance,
            detail: Fbm::<Perlin>::new(config.seed).set_octaves(DETAIL_OCTAVES),
            smooth: Fbm::<Perlin>::new(config.seed).set_octaves(SMOOTH_OCTAVES),
        }
    }

    pub fn chunk_size(&self) -> f32 {
        self.chunk_size as f32
    }

    /// Build the vertex grid and triangle list for one chunk.
    ///
    /// Vertices are laid out column-major: vertex `(x, y)` lives at
    /// `x * vertices_per_side + y`. Each quad emits two counter-clockwise
    /// triangles (seen from +Z).
    pub fn generate(&self, coord: ChunkCoord) -> ChunkMesh {
        let _span = tracing::trace_span!("chunk_generate", x = coord.x, y = coord.y).entered();

        let quads_per_side = self.chunk_size * self.resolution;
        let vertices_per_side = quads_per_side + 1;
        let origin = coord.to_world(self.chunk_size as f32);
        let step = 1.0 / self.resolution as f32;

        let mut vertices = Vec::with_capacity((vertices_per_side * vertices_per_side) as usize);
        for x in 0..vertices_per_side {
            for y in 0..vertices_per_side {
                let world = origin + Vec2::new(x as f32 * step, y as f32 * step);
                vertices.push(self.vertex_at(world));
            }
        }

        let mut indices = Vec::with_capacity((quads_per_side * quads_per_side * 6) as usize);
        for x in 0..quads_per_side {
            for y in 0..quads_per_side {
                let first = x * vertices_per_side + y;
                indices.extend_from_slice(&[
                    first,
                    first + vertices_per_side,
                    first + 1,
                    first + 1,
                    first + vertices_per_side,
                    first + vertices_per_side + 1,
                ]);
            }
        }

        ChunkMesh { vertices, indices }
    }

    /// Terrain vertex at a world XY position.
    pub fn vertex_at(&self, world: Vec2) -> TerrainVertex {
        let noise_pos = world * self.noise_scale;
        let height = self.height(noise_pos);
        let position = Vec3::new(world.x, world.y, height);

        let step = NORMAL_SAMPLE_STEP * self.noise_scale;
        let along_x = Vec3::new(
            world.x + NORMAL_SAMPLE_STEP,
            world.y,
            self.height(noise_pos + Vec2::new(step, 0.0)),
        );
        let along_y = Vec3::new(
            world.x,
            world.y + NORMAL_SAMPLE_STEP,
            self.height(noise_pos + Vec2::new(0.0, step)),
        );
        let normal = (along_x - position)
            .cross(along_y - position)
            .try_normalize()
            .unwrap_or(Vec3::Z);

        let road = self.road_mask(noise_pos);
        let color = if road > self.road_threshold {
            ROAD_COLOR
        } else if road > 0.0 {
            VERGE_COLOR.lerp(ROAD_COLOR, road / self.road_threshold)
        } else {
            GRASS_COLOR
        };

        TerrainVertex {
            position: position.to_array(),
            normal: normal.to_array(),
            color: color.to_array(),
        }
    }

    /// Surface height at a position in noise space.
    pub fn height(&self, noise_pos: Vec2) -> f32 {
        let detail = sample_unit(&self.detail, noise_pos);
        let smooth = sample_unit(&self.smooth, noise_pos);
        let road = self.road_mask(noise_pos);

        let blended = detail + (smooth - detail) * road;
        let lift = if road > self.road_threshold {
            self.road_height * road
        } else {
            0.0
        };

        blended * self.terrain_height + lift
    }

    /// Road mask in [0, 1] at a position in noise space.
    ///
    /// The road centre line is a sum of two sinusoids in Y. Inside the half
    /// width the mask falls from 1 to the road threshold; across the verge it
    /// falls from the threshold to [`VERGE_FLOOR`]; beyond that it is 0.
    pub fn road_mask(&self, noise_pos: Vec2) -> f32 {
        let centre = (noise_pos.y * 0.5).sin() + (noise_pos.y * 1.3).cos() * 0.3;
        let distance = (centre - noise_pos.x).abs() / self.noise_scale;

        if distance <= self.road_half_width {
            lerp(1.0, self.road_threshold, distance / self.road_half_width)
        } else if distance <= self.road_blend_distance {
            let t = (distance - self.road_half_width)
                / (self.road_blend_distance - self.road_half_width);
            lerp(self.road_threshold, VERGE_FLOOR, t)
        } else {
            0.0
        }
    }

    /// World X of the road centre line at world Y.
    pub fn road_centre(&self, world_y: f32) -> f32 {
        let y = world_y * self.noise_scale;
        ((y * 0.5).sin() + (y * 1.3).cos() * 0.3) / self.noise_scale
    }
}

/// Fractal noise remapped from [-1, 1] to [0, 1].
fn sample_unit(noise: &Fbm<Perlin>, pos: Vec2) -> f32 {
    let v = noise.get([pos.x as f64, pos.y as f64]) as f32;
    (v * 0.5 + 0.5).clamp(0.0, 1.0)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
