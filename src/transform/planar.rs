use super::SpatialVector;
use crate::error::{Result, SonicFieldError};
use crate::math::Vec3;
use crate::source::PlanarPoint;

/// Maps a point on a 2D surface to audio space around a listener at the surface center.
///
/// Offsets are normalized by the half extent of each axis, so the edges of the
/// surface sit at `±1`. Points outside the surface are not clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarTransform {
    /// Multiplier applied to the normalized horizontal and vertical offset.
    pub scale_xy: f32,
    /// Multiplier applied to the normalized radial distance, pushed along `-Z`.
    pub scale_z: f32,
}

impl Default for PlanarTransform {
    fn default() -> Self {
        Self {
            scale_xy: 5.0,
            scale_z: 3.0,
        }
    }
}

impl PlanarTransform {
    pub fn new(scale_xy: f32, scale_z: f32) -> Self {
        Self { scale_xy, scale_z }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.scale_xy.is_finite() || !self.scale_z.is_finite() {
            return Err(SonicFieldError::Configuration(format!(
                "Planar scales must be finite, got xy={} z={}",
                self.scale_xy, self.scale_z
            )));
        }
        Ok(())
    }

    /// Offset from the center divided by the half extent, or `None` for a degenerate surface.
    pub fn normalized_offset(point: &PlanarPoint) -> Option<(f32, f32)> {
        if point.width <= 0.0 || point.height <= 0.0 {
            return None;
        }
        let half_w = point.width / 2.0;
        let half_h = point.height / 2.0;
        Some(((point.x - half_w) / half_w, (point.y - half_h) / half_h))
    }

    pub fn to_audio_space(&self, point: &PlanarPoint) -> SpatialVector {
        let Some((nx, ny)) = Self::normalized_offset(point) else {
            return SpatialVector::ZERO;
        };

        let distance = (nx * nx + ny * ny).sqrt();
        if distance == 0.0 {
            return SpatialVector::ZERO;
        }

        // Surface y grows downward, audio y grows upward
        SpatialVector::new(
            Vec3::new(
                nx * self.scale_xy,
                -ny * self.scale_xy,
                -distance * self.scale_z,
            ),
            distance,
        )
    }
}
