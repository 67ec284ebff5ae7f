use super::SpatialVector;
use crate::error::{Result, SonicFieldError};
use crate::math::Vec3;
use crate::source::GeoCoord;

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Maps a latitude/longitude to audio space around a listener standing at another coordinate.
///
/// North is ahead (`-Z`), east is right (`+X`). Sources stay on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeodeticTransform {
    /// Audio-space units per metre.
    pub distance_scale: f64,
    pub earth_radius_m: f64,
}

impl Default for GeodeticTransform {
    fn default() -> Self {
        Self {
            distance_scale: 0.001,
            earth_radius_m: EARTH_RADIUS_M,
        }
    }
}

impl GeodeticTransform {
    pub fn new(distance_scale: f64) -> Self {
        Self {
            distance_scale,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.distance_scale.is_finite() || self.distance_scale < 0.0 {
            return Err(SonicFieldError::Configuration(format!(
                "Geodetic distance scale must be finite and non-negative, got {}",
                self.distance_scale
            )));
        }
        if !self.earth_radius_m.is_finite() || self.earth_radius_m <= 0.0 {
            return Err(SonicFieldError::Configuration(format!(
                "Earth radius must be positive, got {}",
                self.earth_radius_m
            )));
        }
        Ok(())
    }

    /// Great-circle distance in metres (haversine).
    pub fn haversine_distance(&self, from: &GeoCoord, to: &GeoCoord) -> f64 {
        let lat1 = from.lat.to_radians();
        let lat2 = to.lat.to_radians();
        let d_lat = (to.lat - from.lat).to_radians();
        let d_lng = (to.lng - from.lng).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        // Rounding can push `a` a hair outside [0, 1]
        let a = a.clamp(0.0, 1.0);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        self.earth_radius_m * c
    }

    pub fn to_audio_space(&self, source: &GeoCoord, listener: &GeoCoord) -> SpatialVector {
        let distance_m = self.haversine_distance(listener, source);
        let scaled = distance_m * self.distance_scale;
        if scaled == 0.0 {
            return SpatialVector::ZERO;
        }

        let bearing = initial_bearing_degrees(listener, source).to_radians();
        SpatialVector::new(
            Vec3::new(
                (bearing.sin() * scaled) as f32,
                0.0,
                (-bearing.cos() * scaled) as f32,
            ),
            scaled as f32,
        )
    }
}

/// Forward azimuth from `from` to `to` in degrees, clockwise from north.
///
/// The result lies in `(-180, 180]` and may be negative; take it modulo 360 for a
/// compass heading. Identical coordinates yield `0`.
pub fn initial_bearing_degrees(from: &GeoCoord, to: &GeoCoord) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let d_lng = (to.lng - from.lng).to_radians();

    let y = d_lng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lng.cos();
    y.atan2(x).to_degrees()
}
