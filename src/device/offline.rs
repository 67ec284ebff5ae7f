use super::{DeviceInfo, OutputDevice};
use crate::config::SpatialEngineDesc;
use crate::error::{Result, SonicFieldError};
use crate::mixer::Mixer;

/// A device without hardware: the caller pulls audio with [`OfflineDevice::render`].
///
/// Useful for rendering to a file and for tests.
pub struct OfflineDevice {
    info: Option<DeviceInfo>,
    mixer: Option<Mixer>,
    suspended: bool,
    start_suspended: bool,
}

impl Default for OfflineDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineDevice {
    pub fn new() -> Self {
        Self {
            info: None,
            mixer: None,
            suspended: false,
            start_suspended: false,
        }
    }

    /// A device that comes up suspended, like an output waiting for a user gesture.
    pub fn starting_suspended() -> Self {
        Self {
            start_suspended: true,
            ..Self::new()
        }
    }

    pub fn info(&self) -> Option<&DeviceInfo> {
        self.info.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.mixer.is_some()
    }

    pub fn mixer(&self) -> Option<&Mixer> {
        self.mixer.as_ref()
    }

    /// Fill `out` with interleaved samples. Returns the number of frames rendered;
    /// a suspended or detached device writes silence and returns 0.
    pub fn render(&mut self, out: &mut [f32]) -> usize {
        let channels = self.info.as_ref().map_or(2, |info| info.channels);
        match self.mixer.as_mut() {
            Some(mixer) if !self.suspended => {
                mixer.render(out, channels);
                out.len() / channels.max(1) as usize
            }
            _ => {
                out.fill(0.0);
                0
            }
        }
    }
}

impl OutputDevice for OfflineDevice {
    fn open(&mut self, desc: &SpatialEngineDesc) -> Result<DeviceInfo> {
        let info = DeviceInfo {
            name: "offline".to_string(),
            sample_rate: desc.sample_rate,
            channels: desc.channels,
        };
        self.info = Some(info.clone());
        self.suspended = self.start_suspended;
        Ok(info)
    }

    fn attach(&mut self, mixer: Mixer) -> Result<()> {
        if self.info.is_none() {
            return Err(SonicFieldError::AudioDevice("Device is not open".into()));
        }
        self.mixer = Some(mixer);
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        self.suspended = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.suspended = false;
        self.start_suspended = false;
        Ok(())
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn release(&mut self) {
        self.mixer = None;
        self.info = None;
        self.suspended = false;
    }
}
