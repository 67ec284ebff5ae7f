use super::{DeviceInfo, OutputDevice};
use crate::config::SpatialEngineDesc;
use crate::error::{Result, SonicFieldError};
use crate::mixer::Mixer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};

/// The system's default output device, driven through cpal.
pub struct CpalDevice {
    device: Option<cpal::Device>,
    config: Option<cpal::StreamConfig>,
    sample_format: cpal::SampleFormat,
    stream: Option<cpal::Stream>,
    suspended: bool,
}

impl Default for CpalDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalDevice {
    pub fn new() -> Self {
        Self {
            device: None,
            config: None,
            sample_format: cpal::SampleFormat::F32,
            stream: None,
            suspended: false,
        }
    }

    /// Use the requested rate and channel count if the device supports them, its
    /// default configuration otherwise.
    fn choose_config(
        device: &cpal::Device,
        desc: &SpatialEngineDesc,
    ) -> Result<(cpal::StreamConfig, cpal::SampleFormat)> {
        let default_config = device.default_output_config().map_err(|e| {
            SonicFieldError::AudioDevice(format!("Failed to get default config: {}", e))
        })?;

        let requested = device
            .supported_output_configs()
            .map_err(|e| {
                SonicFieldError::AudioDevice(format!("Failed to query output configs: {}", e))
            })?
            .filter(|range| range.channels() == desc.channels)
            .find(|range| {
                range.min_sample_rate().0 <= desc.sample_rate
                    && desc.sample_rate <= range.max_sample_rate().0
            })
            .map(|range| range.with_sample_rate(cpal::SampleRate(desc.sample_rate)));

        let supported = match requested {
            Some(supported) => supported,
            None => {
                log::warn!(
                    "Device does not support {} Hz / {} channels, using {} Hz / {} channels",
                    desc.sample_rate,
                    desc.channels,
                    default_config.sample_rate().0,
                    default_config.channels()
                );
                default_config
            }
        };

        let config = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };
        Ok((config, supported.sample_format()))
    }

    fn create_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut mixer: Mixer,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = config.channels;
        let mut scratch: Vec<f32> = Vec::new();

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // Only grows, so steady-state callbacks do not allocate
                    if scratch.len() < data.len() {
                        scratch.resize(data.len(), 0.0);
                    }
                    let buffer = &mut scratch[..data.len()];
                    mixer.render(buffer, channels);

                    for (sample, value) in data.iter_mut().zip(buffer.iter()) {
                        *sample = T::from_sample(*value);
                    }
                },
                move |err| {
                    log::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| SonicFieldError::AudioDevice(format!("Failed to build stream: {}", e)))
    }
}

impl OutputDevice for CpalDevice {
    fn open(&mut self, desc: &SpatialEngineDesc) -> Result<DeviceInfo> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            SonicFieldError::AudioDevice("No default output device available".into())
        })?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let (config, sample_format) = Self::choose_config(&device, desc)?;
        log::info!(
            "Opened output device '{}' ({} Hz, {} channels, {:?})",
            name,
            config.sample_rate.0,
            config.channels,
            sample_format
        );

        let info = DeviceInfo {
            name,
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        };
        self.device = Some(device);
        self.config = Some(config);
        self.sample_format = sample_format;
        self.suspended = false;
        Ok(info)
    }

    fn attach(&mut self, mixer: Mixer) -> Result<()> {
        let (Some(device), Some(config)) = (self.device.as_ref(), self.config.as_ref()) else {
            return Err(SonicFieldError::AudioDevice("Device is not open".into()));
        };

        let stream = match self.sample_format {
            cpal::SampleFormat::F32 => Self::create_stream::<f32>(device, config, mixer)?,
            cpal::SampleFormat::I16 => Self::create_stream::<i16>(device, config, mixer)?,
            cpal::SampleFormat::U16 => Self::create_stream::<u16>(device, config, mixer)?,
            other => {
                return Err(SonicFieldError::AudioFormat(format!(
                    "Unsupported sample format {:?}",
                    other
                )));
            }
        };

        // Some hosts refuse to start until the user interacts; stay attached but suspended
        match stream.play() {
            Ok(()) => self.suspended = false,
            Err(e) => {
                log::warn!("Output stream did not start, device suspended: {}", e);
                self.suspended = true;
            }
        }
        self.stream = Some(stream);
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        let Some(stream) = self.stream.as_ref() else {
            return Err(SonicFieldError::AudioDevice("No active stream".into()));
        };
        stream
            .pause()
            .map_err(|e| SonicFieldError::AudioDevice(format!("Failed to pause stream: {}", e)))?;
        self.suspended = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        let Some(stream) = self.stream.as_ref() else {
            return Err(SonicFieldError::AudioDevice("No active stream".into()));
        };
        stream
            .play()
            .map_err(|e| SonicFieldError::AudioDevice(format!("Failed to start stream: {}", e)))?;
        self.suspended = false;
        Ok(())
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            log::info!("Output stream released");
        }
        self.device = None;
        self.config = None;
        self.suspended = false;
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.release();
    }
}
