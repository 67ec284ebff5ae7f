//! Configuration for SonicField

use crate::attenuation::AttenuationModel;
use crate::error::{Result, SonicFieldError};
use crate::spatial::SpatializerKind;
use crate::transform::{GeodeticTransform, PlanarTransform};

/// Configuration descriptor for a [`SpatialEngine`](crate::SpatialEngine)
#[derive(Debug, Clone)]
pub struct SpatialEngineDesc {
    /// Requested output sample rate. The device may negotiate a different one.
    pub sample_rate: u32,
    /// Frames rendered per mixer block. Gain and position ramps span one block.
    pub block_size: usize,
    /// Requested output channel count (typically 2 for stereo)
    pub channels: u16,
    /// Capacity hint for the render voice arena
    pub max_sources: usize,
    pub planar: PlanarTransform,
    pub geodetic: GeodeticTransform,
    pub planar_attenuation: AttenuationModel,
    pub geodetic_attenuation: AttenuationModel,
    pub spatializer: SpatializerKind,
}

impl Default for SpatialEngineDesc {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 512,
            channels: 2,
            max_sources: 64,
            planar: PlanarTransform::default(),
            geodetic: GeodeticTransform::default(),
            planar_attenuation: AttenuationModel::default(),
            geodetic_attenuation: AttenuationModel::geodetic(),
            spatializer: SpatializerKind::default(),
        }
    }
}

impl SpatialEngineDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn max_sources(mut self, max: usize) -> Self {
        self.max_sources = max;
        self
    }

    pub fn planar(mut self, transform: PlanarTransform) -> Self {
        self.planar = transform;
        self
    }

    pub fn geodetic(mut self, transform: GeodeticTransform) -> Self {
        self.geodetic = transform;
        self
    }

    pub fn planar_attenuation(mut self, model: AttenuationModel) -> Self {
        self.planar_attenuation = model;
        self
    }

    pub fn geodetic_attenuation(mut self, model: AttenuationModel) -> Self {
        self.geodetic_attenuation = model;
        self
    }

    pub fn spatializer(mut self, kind: SpatializerKind) -> Self {
        self.spatializer = kind;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(SonicFieldError::Configuration(
                "Sample rate must be greater than zero".into(),
            ));
        }
        if self.block_size == 0 {
            return Err(SonicFieldError::Configuration(
                "Block size must be greater than zero".into(),
            ));
        }
        if self.channels == 0 {
            return Err(SonicFieldError::Configuration(
                "Channel count must be greater than zero".into(),
            ));
        }
        self.planar.validate()?;
        self.geodetic.validate()?;
        self.planar_attenuation.validate()?;
        self.geodetic_attenuation.validate()?;
        Ok(())
    }
}
