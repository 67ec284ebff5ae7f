use crate::error::{Result, SonicFieldError};
use rubato::{FftFixedIn, Resampler};

/// Offline sample-rate converter used when a buffer's rate differs from the device rate.
pub struct AudioResampler {
    source_sample_rate: u32,
    target_sample_rate: u32,
    channels: u16,
    chunk_size: usize,
}

impl AudioResampler {
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: u16,
        chunk_size: Option<usize>,
    ) -> Result<Self> {
        if source_sample_rate == 0 || target_sample_rate == 0 {
            return Err(SonicFieldError::AudioFormat(
                "Sample rates must be greater than 0".to_string(),
            ));
        }

        if channels == 0 {
            return Err(SonicFieldError::AudioFormat(
                "Channel count must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            source_sample_rate,
            target_sample_rate,
            channels,
            chunk_size: chunk_size.unwrap_or(1024),
        })
    }

    pub fn resample_channel(&self, channel_samples: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            return Ok(channel_samples.to_vec());
        }

        let mut resampler = FftFixedIn::<f32>::new(
            self.source_sample_rate as usize,
            self.target_sample_rate as usize,
            self.chunk_size,
            2, // sub_chunks
            1,
        )
        .map_err(|e| SonicFieldError::AudioFormat(format!("Failed to create resampler: {}", e)))?;

        let expected = (channel_samples.len() as f64 * self.resample_ratio()).ceil() as usize;
        let mut output = Vec::with_capacity(expected + self.chunk_size);
        let mut input_chunk = vec![vec![0.0f32; resampler.input_frames_next()]];
        let mut input_index = 0;

        while input_index < channel_samples.len() {
            let wanted = resampler.input_frames_next();
            input_chunk[0].resize(wanted, 0.0);

            // Last chunk is zero padded
            let take = (channel_samples.len() - input_index).min(wanted);
            input_chunk[0][..take].copy_from_slice(&channel_samples[input_index..input_index + take]);
            input_chunk[0][take..].fill(0.0);

            let waves_out = resampler
                .process(&input_chunk, None)
                .map_err(|e| SonicFieldError::AudioFormat(format!("Resampling error: {}", e)))?;

            if let Some(first_channel) = waves_out.first() {
                output.extend_from_slice(first_channel);
            }

            input_index += take;
        }

        Ok(output)
    }

    pub fn resample_interleaved(&self, interleaved_samples: &[f32]) -> Result<Vec<f32>> {
        if self.source_sample_rate == self.target_sample_rate {
            return Ok(interleaved_samples.to_vec());
        }

        let channels = self.channels as usize;
        let mut resampled_channels = Vec::with_capacity(channels);
        for ch in 0..channels {
            let channel_data: Vec<f32> = interleaved_samples
                .chunks(channels)
                .map(|frame| frame.get(ch).copied().unwrap_or(0.0))
                .collect();
            resampled_channels.push(self.resample_channel(&channel_data)?);
        }

        let new_frames = resampled_channels
            .iter()
            .map(Vec::len)
            .min()
            .unwrap_or(0);
        let mut interleaved = Vec::with_capacity(new_frames * channels);
        for frame_idx in 0..new_frames {
            for channel in &resampled_channels {
                interleaved.push(channel[frame_idx]);
            }
        }

        Ok(interleaved)
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    pub fn resample_ratio(&self) -> f64 {
        self.target_sample_rate as f64 / self.source_sample_rate as f64
    }
}
