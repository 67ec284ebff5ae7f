use crate::error::Result;
use crate::math::Pose;
use crate::source::GeoCoord;

/// The single point every source is heard from.
///
/// The listener sits at the origin of audio space. Its geographic reference is the
/// point geodetic sources are measured against and stays `None` until the caller
/// provides one.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Listener {
    pose: Pose,
    geo_reference: Option<GeoCoord>,
}

impl Listener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn geo_reference(&self) -> Option<GeoCoord> {
        self.geo_reference
    }

    /// Store a new reference. Returns the previous one when the value actually changed.
    pub(crate) fn set_geo_reference(&mut self, coord: GeoCoord) -> Result<Option<Option<GeoCoord>>> {
        coord.validate()?;
        if self.geo_reference == Some(coord) {
            return Ok(None);
        }
        let old = self.geo_reference.replace(coord);
        Ok(Some(old))
    }
}
