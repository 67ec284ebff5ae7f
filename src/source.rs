//! Declared audio sources and their positions.
//!
//! An [`AudioSource`] is owned by the caller: it describes what should play and where.
//! The engine turns it into a runtime [`SourceNode`](crate::node::SourceNode) on
//! [`SpatialEngine::start`](crate::SpatialEngine::start).

use crate::audio_data::AudioBuffer;
use crate::error::{Result, SonicFieldError};

/// Caller-assigned identity of a source, stable for the lifetime of the source.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SourceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SourceId({})", self.0)
    }
}

/// A point in an arbitrary 2D space (e.g. a canvas) together with the size of that space.
///
/// The y axis grows downward, as on a screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarPoint {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PlanarPoint {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center of a `width x height` space.
    pub fn center_of(width: f32, height: f32) -> Self {
        Self::new(width / 2.0, height / 2.0, width, height)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.x.is_finite() && self.y.is_finite()) {
            return Err(SonicFieldError::Validation(format!(
                "Planar coordinates must be finite, got ({}, {})",
                self.x, self.y
            )));
        }
        if !(self.width.is_finite() && self.height.is_finite())
            || self.width < 0.0
            || self.height < 0.0
        {
            return Err(SonicFieldError::Validation(format!(
                "Planar space size must be finite and non-negative, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Latitude/longitude in degrees on a spherical Earth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoCoord {
    pub lat: f64,
    pub lng: f64,
}

impl GeoCoord {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Latitude must lie in `[-90, 90]`. Longitude only has to be finite: map
    /// widgets hand out wrapped values past ±180 and the trigonometry copes with them.
    pub fn validate(&self) -> Result<()> {
        if !self.lat.is_finite() || !self.lng.is_finite() {
            return Err(SonicFieldError::Validation(format!(
                "Geodetic coordinates must be finite, got ({}, {})",
                self.lat, self.lng
            )));
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(SonicFieldError::Validation(format!(
                "Latitude {} is outside [-90, 90]",
                self.lat
            )));
        }
        Ok(())
    }
}

/// A declared position, tagged by coordinate space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Position {
    Planar(PlanarPoint),
    Geodetic(GeoCoord),
}

impl Position {
    pub fn planar(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::Planar(PlanarPoint::new(x, y, width, height))
    }

    pub fn geodetic(lat: f64, lng: f64) -> Self {
        Self::Geodetic(GeoCoord::new(lat, lng))
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Planar(point) => point.validate(),
            Self::Geodetic(coord) => coord.validate(),
        }
    }
}

/// Where a source lives relative to the listener.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Pinned to the listener. Never spatialized, ignores position updates.
    Ambient,
    /// Spatialized at a declared position.
    Spatial(Position),
    /// A spatial source whose position is not known yet.
    Unplaced,
}

impl Placement {
    pub fn is_ambient(&self) -> bool {
        matches!(self, Self::Ambient)
    }
}

/// A source as declared by the caller.
#[derive(Debug, Clone)]
pub struct AudioSource {
    pub id: SourceId,
    /// `None` while the caller is still decoding.
    pub buffer: Option<AudioBuffer>,
    /// Linear volume in `[0, 1]`.
    pub volume: f32,
    pub looping: bool,
    pub placement: Placement,
}

impl AudioSource {
    pub fn new(id: impl Into<SourceId>, buffer: Option<AudioBuffer>, placement: Placement) -> Self {
        Self {
            id: id.into(),
            buffer,
            volume: 1.0,
            looping: false,
            placement,
        }
    }

    pub fn planar(
        id: impl Into<SourceId>,
        buffer: Option<AudioBuffer>,
        point: PlanarPoint,
    ) -> Self {
        Self::new(id, buffer, Placement::Spatial(Position::Planar(point)))
    }

    pub fn geodetic(id: impl Into<SourceId>, buffer: Option<AudioBuffer>, coord: GeoCoord) -> Self {
        Self::new(id, buffer, Placement::Spatial(Position::Geodetic(coord)))
    }

    pub fn ambient(id: impl Into<SourceId>, buffer: Option<AudioBuffer>) -> Self {
        Self::new(id, buffer, Placement::Ambient)
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn is_loaded(&self) -> bool {
        self.buffer.is_some()
    }
}

/// Reject volumes outside `[0, 1]` instead of clamping them.
pub fn validate_volume(volume: f32) -> Result<f32> {
    if volume.is_finite() && (0.0..=1.0).contains(&volume) {
        Ok(volume)
    } else {
        Err(SonicFieldError::Validation(format!(
            "Volume {} is outside [0, 1]",
            volume
        )))
    }
}
