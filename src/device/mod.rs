//! Output devices the render graph can be attached to.

mod cpal_device;
mod offline;

pub use cpal_device::CpalDevice;
pub use offline::OfflineDevice;

use crate::config::SpatialEngineDesc;
use crate::error::Result;
use crate::mixer::Mixer;

/// What the device actually opened with. May differ from the requested desc when the
/// hardware does not support it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// A sink that pulls audio from a [`Mixer`].
///
/// `open` acquires the device, `attach` hands over the render graph and starts pulling.
/// A device may come up suspended (for example when the platform requires a user
/// gesture); `resume` is then expected to be retried later.
pub trait OutputDevice {
    fn open(&mut self, desc: &SpatialEngineDesc) -> Result<DeviceInfo>;

    fn attach(&mut self, mixer: Mixer) -> Result<()>;

    fn suspend(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    fn is_suspended(&self) -> bool;

    /// Stop pulling and drop the render graph. Must be safe to call repeatedly.
    fn release(&mut self);
}
