use super::Spatializer;
use crate::error::{Result, SonicFieldError};
use crate::math::{Pose, Vec3};
use crate::node::NodeKey;
use audionimbus::{
    AmbisonicsDecodeEffect, AmbisonicsDecodeEffectParams, AmbisonicsDecodeEffectSettings,
    AmbisonicsEncodeEffect, AmbisonicsEncodeEffectParams, AmbisonicsEncodeEffectSettings,
    AudioBufferSettings, AudioSettings, Context, CoordinateSystem, Direction, Hrtf, HrtfSettings,
    Sofa, SpeakerLayout, Vector3, VolumeNormalization,
    audio_buffer::AudioBuffer as NimbusBuffer,
};
use std::collections::HashMap;

// Order 2 ambisonics
const AMBISONICS_CHANNELS: usize = 9;

fn load_hrtf(context: &Context, audio_settings: &AudioSettings, sofa_path: Option<&str>) -> Result<Hrtf> {
    let sofa_information = match sofa_path {
        Some(path) => {
            let data = std::fs::read(path).map_err(|e| {
                SonicFieldError::Spatialization(format!("Failed to read HRTF file {}: {}", path, e))
            })?;
            Some(Sofa::Buffer(data))
        }
        None => None,
    };

    let hrtf = Hrtf::try_new(
        context,
        audio_settings,
        &HrtfSettings {
            volume_normalization: VolumeNormalization::None,
            sofa_information,
            ..Default::default()
        },
    )
    .map_err(|e| SonicFieldError::Spatialization(format!("Failed to create HRTF: {}", e)))?;

    log::info!("Loaded HRTF from {}", sofa_path.unwrap_or("built-in set"));
    Ok(hrtf)
}

/// Binaural spatializer backed by Steam Audio.
///
/// Every voice is encoded into second-order ambisonics at its direction; the summed
/// field is decoded once per block through the HRTF. One encoder per voice is created
/// up front for `max_voices` voices.
pub struct HrtfSpatializer {
    context: Context,
    hrtf: Hrtf,
    decode_effect: AmbisonicsDecodeEffect,
    encode_effects: HashMap<NodeKey, AmbisonicsEncodeEffect>,
    // Encoders built up front so a new voice does not allocate on the render thread
    idle_encoders: Vec<AmbisonicsEncodeEffect>,
    listener: Pose,
    sample_rate: u32,
    frame_size: usize,

    input_buf: Vec<f32>,
    encoded_buf: Vec<f32>,
    summed_buf: Vec<f32>,
    decoded_buf: Vec<f32>,
    interleaved_buf: Vec<f32>,
}

impl HrtfSpatializer {
    pub fn new(
        listener: Pose,
        sample_rate: u32,
        frame_size: usize,
        max_voices: usize,
        hrtf_path: Option<&str>,
    ) -> Result<Self> {
        let context = Context::try_new(&audionimbus::ContextSettings::default()).map_err(|e| {
            SonicFieldError::Spatialization(format!("Failed to create Steam Audio context: {}", e))
        })?;

        let audio_settings = AudioSettings {
            sampling_rate: sample_rate,
            frame_size: frame_size as u32,
        };
        let hrtf = load_hrtf(&context, &audio_settings, hrtf_path)?;

        let decode_effect = AmbisonicsDecodeEffect::try_new(
            &context,
            &audio_settings,
            &AmbisonicsDecodeEffectSettings {
                max_order: 2,
                speaker_layout: SpeakerLayout::Stereo,
                hrtf: &hrtf,
            },
        )
        .map_err(|e| {
            SonicFieldError::Spatialization(format!("Failed to create AmbisonicsDecodeEffect: {}", e))
        })?;

        let idle_encoders = (0..max_voices)
            .map(|_| Self::create_encoder(&context, &audio_settings))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            context,
            hrtf,
            decode_effect,
            encode_effects: HashMap::with_capacity(max_voices),
            idle_encoders,
            listener,
            sample_rate,
            frame_size,
            input_buf: vec![0.0; frame_size],
            encoded_buf: vec![0.0; frame_size * AMBISONICS_CHANNELS],
            summed_buf: vec![0.0; frame_size * AMBISONICS_CHANNELS],
            decoded_buf: vec![0.0; frame_size * 2],
            interleaved_buf: vec![0.0; frame_size * 2],
        })
    }

    fn audio_settings(&self) -> AudioSettings {
        AudioSettings {
            sampling_rate: self.sample_rate,
            frame_size: self.frame_size as u32,
        }
    }

    fn create_encoder(context: &Context, audio_settings: &AudioSettings) -> Result<AmbisonicsEncodeEffect> {
        AmbisonicsEncodeEffect::try_new(
            context,
            audio_settings,
            &AmbisonicsEncodeEffectSettings { max_order: 2 },
        )
        .map_err(|e| {
            SonicFieldError::Spatialization(format!("Failed to create AmbisonicsEncodeEffect: {}", e))
        })
    }

    fn encode(&mut self, voice: NodeKey, direction: Vec3) -> Result<()> {
        if !self.encode_effects.contains_key(&voice) {
            let effect = match self.idle_encoders.pop() {
                Some(effect) => effect,
                None => {
                    log::warn!("Encoder pool exhausted, creating one for {}", voice);
                    Self::create_encoder(&self.context, &self.audio_settings())?
                }
            };
            self.encode_effects.insert(voice, effect);
        }

        {
            let input = NimbusBuffer::try_with_data_and_settings(
                &self.input_buf,
                AudioBufferSettings {
                    num_channels: Some(1),
                    ..Default::default()
                },
            )
            .map_err(|e| SonicFieldError::Spatialization(format!("Failed to create input buffer: {}", e)))?;

            let output = NimbusBuffer::try_with_data_and_settings(
                &mut self.encoded_buf,
                AudioBufferSettings {
                    num_channels: Some(9),
                    ..Default::default()
                },
            )
            .map_err(|e| SonicFieldError::Spatialization(format!("Failed to create output buffer: {}", e)))?;

            if let Some(effect) = self.encode_effects.get_mut(&voice) {
                effect.apply(
                    &AmbisonicsEncodeEffectParams {
                        direction: Direction::new(direction.x, direction.y, direction.z),
                        order: 2,
                    },
                    &input,
                    &output,
                );
            }
        }

        for (sum, encoded) in self.summed_buf.iter_mut().zip(self.encoded_buf.iter()) {
            *sum += *encoded;
        }
        Ok(())
    }

    fn decode(&mut self) -> Result<()> {
        let input = NimbusBuffer::try_with_data_and_settings(
            &self.summed_buf,
            AudioBufferSettings {
                num_channels: Some(9),
                ..Default::default()
            },
        )
        .map_err(|e| SonicFieldError::Spatialization(format!("Failed to create input buffer: {}", e)))?;

        let output = NimbusBuffer::try_with_data_and_settings(
            &mut self.decoded_buf,
            AudioBufferSettings {
                num_channels: Some(2),
                ..Default::default()
            },
        )
        .map_err(|e| SonicFieldError::Spatialization(format!("Failed to create output buffer: {}", e)))?;

        self.decode_effect.apply(
            &AmbisonicsDecodeEffectParams {
                order: 2,
                hrtf: &self.hrtf,
                orientation: CoordinateSystem {
                    ahead: Vector3::new(0.0, 0.0, -1.0),
                    ..Default::default()
                },
                binaural: true,
            },
            &input,
            &output,
        );

        output.interleave(&self.context, &mut self.interleaved_buf);
        Ok(())
    }
}

impl Spatializer for HrtfSpatializer {
    fn name(&self) -> &'static str {
        "steam-audio-hrtf"
    }

    fn begin_block(&mut self, _frames: usize) {
        self.summed_buf.fill(0.0);
    }

    fn spatialize(&mut self, voice: NodeKey, input: &[f32], _from: Vec3, to: Vec3, _output: &mut [f32]) {
        let frames = input.len().min(self.frame_size);
        self.input_buf[..frames].copy_from_slice(&input[..frames]);
        self.input_buf[frames..].fill(0.0);

        // A source on top of the listener has no direction; treat it as straight ahead
        let direction = self
            .listener
            .to_local(to)
            .try_normalize()
            .map(|local| Vec3::new(local.x, local.y, -local.z))
            .unwrap_or(Vec3::NEG_Z);

        if let Err(e) = self.encode(voice, direction) {
            log::error!("HRTF encode failed for {}: {}", voice, e);
        }
    }

    fn end_block(&mut self, output: &mut [f32]) {
        if let Err(e) = self.decode() {
            log::error!("HRTF decode failed: {}", e);
            return;
        }
        for (out, sample) in output.iter_mut().zip(self.interleaved_buf.iter()) {
            *out += *sample;
        }
    }

    fn release(&mut self, voice: NodeKey) {
        if let Some(mut effect) = self.encode_effects.remove(&voice) {
            // Clear the tail so the next voice starts from silence
            effect.reset();
            self.idle_encoders.push(effect);
        }
    }
}
