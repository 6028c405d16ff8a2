use serde::{Deserialize, Serialize};

use crate::StreamError;

/// Largest accepted streaming radius. The window holds `(2R+1)²` chunks.
pub const MAX_RADIUS: u32 = 1024;

/// Streaming and terrain parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Chunks resident on each side of the observer's chunk.
    pub radius: u32,
    /// World units per chunk edge.
    pub chunk_size: u32,
    /// Vertices per world unit along each axis.
    pub resolution: u32,
    /// Noise seed.
    pub seed: u32,
    /// World units to noise units.
    pub noise_scale: f32,
    /// Height of a noise value of 1.0, in world units.
    pub terrain_height: f32,
    /// Road mask values above this are full road.
    pub road_threshold: f32,
    /// Extra height added on the road surface, scaled by the road mask.
    pub road_height: f32,
    /// Half width of the full-road band, in world units.
    pub road_half_width: f32,
    /// Distance from the road centre where the verge ends, in world units.
    pub road_blend_distance: f32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            radius: 4,
            chunk_size: 64,
            resolution: 2,
            seed: 0xDEAD_BEEF,
            noise_scale: 0.0025,
            terrain_height: 100.0,
            road_threshold: 0.9,
            road_height: 0.25,
            road_half_width: 2.5,
            road_blend_distance: 5.0,
        }
    }
}

impl StreamConfig {
    /// Side length of the chunk window, `2 * radius + 1`.
    pub fn grid_edge(&self) -> i32 {
        2 * self.radius as i32 + 1
    }

    /// Quads along one chunk edge.
    pub fn quads_per_side(&self) -> u32 {
        self.chunk_size * self.resolution
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.radius > MAX_RADIUS {
            return Err(StreamError::InvalidConfig(format!(
                "radius must not exceed {MAX_RADIUS}"
            )));
        }
        if self.chunk_size == 0 {
            return Err(StreamError::InvalidConfig("chunk_size must be positive".into()));
        }
        if self.resolution == 0 {
            return Err(StreamError::InvalidConfig("resolution must be positive".into()));
        }
        if !(self.noise_scale.is_finite() && self.noise_scale > 0.0) {
            return Err(StreamError::InvalidConfig("noise_scale must be positive".into()));
        }
        if !(self.road_threshold > 0.0 && self.road_threshold < 1.0) {
            return Err(StreamError::InvalidConfig(
                "road_threshold must lie in (0, 1)".into(),
            ));
        }
        if self.road_blend_distance <= self.road_half_width {
            return Err(StreamError::InvalidConfig(
                "road_blend_distance must exceed road_half_width".into(),
            ));
        }
        let vertices_per_side = self.quads_per_side() as u64 + 1;
        if vertices_per_side * vertices_per_side > u32::MAX as u64 {
            return Err(StreamError::InvalidConfig(
                "chunk vertex count overflows 32-bit indices".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_nine_by_nine_window() {
        let config = StreamConfig::default();
        assert_eq!(config.grid_edge(), 9);
        assert_eq!(config.quads_per_side(), 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_values() {
        let zero_size = StreamConfig {
            chunk_size: 0,
            ..StreamConfig::default()
        };
        assert!(zero_size.validate().is_err());

        let bad_threshold = StreamConfig {
            road_threshold: 1.5,
            ..StreamConfig::default()
        };
        assert!(bad_threshold.validate().is_err());

        let inverted_road = StreamConfig {
            road_blend_distance: 1.0,
            ..StreamConfig::default()
        };
        assert!(inverted_road.validate().is_err());
    }

    #[test]
    fn radius_is_bounded() {
        let largest = StreamConfig {
            radius: MAX_RADIUS,
            ..StreamConfig::default()
        };
        assert!(largest.validate().is_ok());
        assert_eq!(largest.grid_edge(), 2049);

        for radius in [40_000, u32::MAX] {
            let huge = StreamConfig {
                radius,
                ..StreamConfig::default()
            };
            assert!(matches!(huge.validate(), Err(StreamError::InvalidConfig(_))));
        }
    }
}
