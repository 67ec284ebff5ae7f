//! Decoded PCM buffers handed to the engine.
//!
//! Decoding is the caller's job; SonicField only needs interleaved `f32` samples,
//! a sample rate and a channel count.

mod resampler;

use crate::error::{Result, SonicFieldError};
pub use resampler::AudioResampler;
use std::sync::Arc;
use std::time::Duration;

/// Immutable, cheaply clonable PCM buffer.
///
/// Samples are stored interleaved (`[L0, R0, L1, R1, ...]` for stereo).
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    inner: Arc<AudioBufferInner>,
}

#[derive(Debug)]
struct AudioBufferInner {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    total_frames: usize,
}

impl AudioBuffer {
    /// Wrap interleaved samples.
    ///
    /// # Errors
    ///
    /// Fails if `sample_rate` or `channels` is zero, or if the sample count is not a
    /// whole number of frames.
    pub fn from_interleaved(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(SonicFieldError::AudioFormat(
                "Sample rate must be greater than 0".to_string(),
            ));
        }
        if channels == 0 {
            return Err(SonicFieldError::AudioFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }
        if samples.len() % channels as usize != 0 {
            return Err(SonicFieldError::AudioFormat(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                channels
            )));
        }

        let total_frames = samples.len() / channels as usize;
        Ok(Self {
            inner: Arc::new(AudioBufferInner {
                samples,
                sample_rate,
                channels,
                total_frames,
            }),
        })
    }

    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::from_interleaved(samples, sample_rate, 1)
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.inner.total_frames as f64 / self.inner.sample_rate as f64)
    }

    pub fn samples(&self) -> &[f32] {
        &self.inner.samples
    }

    pub fn total_frames(&self) -> usize {
        self.inner.total_frames
    }

    pub fn is_empty(&self) -> bool {
        self.inner.total_frames == 0
    }

    /// Interleaved samples of one frame. Panics if `index` is out of range.
    #[inline]
    pub fn frame(&self, index: usize) -> &[f32] {
        let channels = self.inner.channels as usize;
        &self.inner.samples[index * channels..(index + 1) * channels]
    }

    /// True when both handles share the same sample storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Get samples for a specific channel (0-indexed)
    pub fn channel_samples(&self, channel: usize) -> Result<Vec<f32>> {
        if channel >= self.inner.channels as usize {
            return Err(SonicFieldError::AudioFormat(format!(
                "Channel {} out of range (max: {})",
                channel,
                self.inner.channels - 1
            )));
        }

        Ok(self
            .inner
            .samples
            .chunks(self.inner.channels as usize)
            .map(|frame| frame[channel])
            .collect())
    }

    /// Downmix all channels to one by averaging.
    pub fn to_mono(&self) -> Result<Self> {
        if self.inner.channels == 1 {
            return Ok(self.clone());
        }

        let channels = self.inner.channels as f32;
        let mono_samples: Vec<f32> = self
            .inner
            .samples
            .chunks(self.inner.channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / channels)
            .collect();

        Self::from_mono(mono_samples, self.inner.sample_rate)
    }

    /// Resample to a different sample rate using rubato
    pub fn resample(&self, target_sample_rate: u32) -> Result<Self> {
        if target_sample_rate == self.inner.sample_rate {
            return Ok(self.clone());
        }

        let resampler = AudioResampler::new(
            self.inner.sample_rate,
            target_sample_rate,
            self.inner.channels,
            None,
        )?;
        let resampled = resampler.resample_interleaved(&self.inner.samples)?;

        Self::from_interleaved(resampled, target_sample_rate, self.inner.channels)
    }
}
