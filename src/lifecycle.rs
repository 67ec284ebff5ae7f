//! Device acquisition, suspend/resume and teardown.

use crate::config::SpatialEngineDesc;
use crate::device::{DeviceInfo, OutputDevice};
use crate::error::{Result, SonicFieldError};
use crate::math::Pose;
use crate::mixer::{Mixer, NOTIFICATION_CAPACITY, RenderCommand, RenderNotification, Voice};
use crate::spatial::create_spatializer;
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Running,
    Suspended,
    Closed,
}

/// Control-side ends of the render channels, valid while the device is up.
pub(crate) struct RenderLink {
    pub commands: Sender<RenderCommand>,
    pub notifications: Receiver<RenderNotification>,
    /// Voices the mixer removed, dropped on the control thread.
    pub retired: Receiver<Box<Voice>>,
    pub info: DeviceInfo,
}

/// Owns the output device and the link to the render graph attached to it.
pub struct EngineLifecycle<D: OutputDevice> {
    device: D,
    link: Option<RenderLink>,
    state: LifecycleState,
}

impl<D: OutputDevice> EngineLifecycle<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            link: None,
            state: LifecycleState::Uninitialized,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.link.is_some()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.link.as_ref().map(|link| &link.info)
    }

    pub(crate) fn link(&self) -> Option<&RenderLink> {
        self.link.as_ref()
    }

    /// Bring the device up. Returns true when this call performed the first acquisition.
    ///
    /// Already initialized: only tries to resume a suspended device, and a failure to
    /// do so is logged rather than returned.
    pub fn init(&mut self, desc: &SpatialEngineDesc, listener: Pose) -> Result<bool> {
        if self.link.is_some() {
            if self.device.is_suspended() {
                self.try_resume();
            }
            return Ok(false);
        }

        desc.validate()?;
        match self.acquire(desc, listener) {
            Ok(link) => {
                log::info!(
                    "Engine initialized on '{}' ({} Hz, {} channels)",
                    link.info.name,
                    link.info.sample_rate,
                    link.info.channels
                );
                self.link = Some(link);
            }
            Err(e) => {
                log::error!("Engine initialization failed: {}", e);
                self.device.release();
                return Err(e);
            }
        }

        self.state = LifecycleState::Running;
        if self.device.is_suspended() {
            self.state = LifecycleState::Suspended;
            self.try_resume();
        }
        Ok(true)
    }

    fn acquire(&mut self, desc: &SpatialEngineDesc, listener: Pose) -> Result<RenderLink> {
        let info = self.device.open(desc)?;
        // A full set of voices can still be fading out while its replacement starts
        let voice_capacity = desc.max_sources.max(1) * 2;
        let spatializer = create_spatializer(
            &desc.spatializer,
            listener,
            info.sample_rate,
            desc.block_size,
            voice_capacity,
        )?;

        let (command_tx, command_rx) = unbounded();
        let (notify_tx, notify_rx) = bounded(NOTIFICATION_CAPACITY);
        let (retired_tx, retired_rx) = bounded(voice_capacity);
        let mixer = Mixer::new(
            command_rx,
            notify_tx,
            retired_tx,
            spatializer,
            desc.block_size,
            voice_capacity,
        );
        self.device.attach(mixer)?;

        Ok(RenderLink {
            commands: command_tx,
            notifications: notify_rx,
            retired: retired_rx,
            info,
        })
    }

    fn try_resume(&mut self) {
        match self.device.resume() {
            Ok(()) => {
                self.state = LifecycleState::Running;
                log::info!("Output device resumed");
            }
            Err(e) => {
                self.state = LifecycleState::Suspended;
                log::warn!("Output device is suspended and could not be resumed: {}", e);
            }
        }
    }

    pub fn suspend(&mut self) -> Result<()> {
        if self.link.is_none() {
            return Err(SonicFieldError::AudioDevice("Engine is not initialized".into()));
        }
        self.device.suspend()?;
        self.state = LifecycleState::Suspended;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.link.is_none() {
            return Err(SonicFieldError::AudioDevice("Engine is not initialized".into()));
        }
        self.device.resume()?;
        self.state = LifecycleState::Running;
        Ok(())
    }

    /// Release the device. Safe to call in any state.
    pub fn shutdown(&mut self) {
        let was_initialized = self.link.take().is_some();
        self.device.release();
        if was_initialized {
            log::info!("Engine shut down");
        }
        if self.state != LifecycleState::Uninitialized || was_initialized {
            self.state = LifecycleState::Closed;
        }
    }
}
