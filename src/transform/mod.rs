//! Coordinate transforms from declared positions into listener-relative audio space.
//!
//! Audio space is right-handed: `+X` right, `+Y` up, `-Z` ahead of the listener.
//! Both transforms are pure; they never read engine state.

mod geodetic;
mod planar;

pub use geodetic::{GeodeticTransform, initial_bearing_degrees};
pub use planar::PlanarTransform;

use crate::math::Vec3;

/// A source position relative to the listener.
///
/// `distance` is the transform's own scalar distance (normalized canvas units for
/// planar sources, scaled kilometres for geodetic ones). It is always `>= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialVector {
    pub position: Vec3,
    pub distance: f32,
}

impl SpatialVector {
    /// The listener's own location.
    pub const ZERO: Self = Self {
        position: Vec3::ZERO,
        distance: 0.0,
    };

    pub fn new(position: Vec3, distance: f32) -> Self {
        Self {
            position,
            distance: distance.max(0.0),
        }
    }

    /// Distance as seen by the render graph: the length of `position`.
    pub fn render_distance(&self) -> f32 {
        self.position.length()
    }

    pub fn is_zero(&self) -> bool {
        self.position == Vec3::ZERO && self.distance == 0.0
    }
}

impl Default for SpatialVector {
    fn default() -> Self {
        Self::ZERO
    }
}
