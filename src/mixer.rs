// Mixer module - the render graph that runs inside the device callback.
//
// Voices live in a flat arena owned by the render thread. The control thread adds and
// releases voices through `RenderCommand`s and moves them through their shared
// `NodeParams`; the mixer reports voices that ran out of samples through
// `RenderNotification`s. Both return channels are bounded and written with `try_send`,
// so the callback never blocks or allocates on them; removed voices travel back to the
// control thread to be dropped there.

use crate::audio_data::AudioBuffer;
use crate::math::Vec3;
use crate::node::{NodeKey, NodeParams};
use crate::source::SourceId;
use crate::spatial::Spatializer;
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;

/// Capacity of the render-to-control notification channel. Reports that do not fit are
/// dropped; completion is also visible through `NodeParams::is_finished`.
pub(crate) const NOTIFICATION_CAPACITY: usize = 256;

/// How a voice reaches the output bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceRouting {
    /// Straight to the bus, keeping the buffer's channel layout. Used for ambient sources.
    Direct,
    /// Downmixed to mono and handed to the spatializer.
    Spatial,
}

/// Render-side counterpart of a [`SourceNode`](crate::node::SourceNode):
/// buffer player, gain stage and pan stage.
pub struct Voice {
    key: NodeKey,
    source_id: SourceId,
    buffer: AudioBuffer,
    cursor: usize,
    looping: bool,
    routing: VoiceRouting,
    params: Arc<NodeParams>,
    // Values reached at the end of the previous block
    gain: f32,
    position: Vec3,
    releasing: bool,
    finished: bool,
    wrapped: bool,
}

impl Voice {
    pub(crate) fn new(
        key: NodeKey,
        source_id: SourceId,
        buffer: AudioBuffer,
        looping: bool,
        routing: VoiceRouting,
        params: Arc<NodeParams>,
    ) -> Self {
        let position = params.position();
        Self {
            key,
            source_id,
            buffer,
            cursor: 0,
            looping,
            routing,
            params,
            // Fade in from silence on the first block
            gain: 0.0,
            position,
            releasing: false,
            finished: false,
            wrapped: false,
        }
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    pub fn routing(&self) -> VoiceRouting {
        self.routing
    }

    /// Next frame index to read, wrapping for looping voices.
    /// Returns `None` once a one-shot voice has run out.
    #[inline]
    fn advance(&mut self) -> Option<usize> {
        let total = self.buffer.total_frames();
        if self.cursor >= total {
            if !self.looping || total == 0 {
                self.finished = true;
                return None;
            }
            self.cursor = 0;
            self.wrapped = true;
        }
        let frame = self.cursor;
        self.cursor += 1;
        Some(frame)
    }

    /// Fill `mono` with gain-ramped samples.
    fn read_mono(&mut self, mono: &mut [f32], gain_from: f32, gain_to: f32) {
        let frames = mono.len();
        let step = (gain_to - gain_from) / frames.max(1) as f32;

        for (i, out) in mono.iter_mut().enumerate() {
            let Some(frame) = self.advance() else {
                *out = 0.0;
                continue;
            };
            let sample = self.buffer.frame(frame)[0];
            *out = sample * (gain_from + step * i as f32);
        }
    }

    /// Mix straight into interleaved stereo.
    fn read_direct(&mut self, stereo: &mut [f32], gain_from: f32, gain_to: f32) {
        let frames = stereo.len() / 2;
        let step = (gain_to - gain_from) / frames.max(1) as f32;

        for i in 0..frames {
            let Some(frame) = self.advance() else {
                break;
            };
            let gain = gain_from + step * i as f32;
            let samples = self.buffer.frame(frame);
            let (left, right) = match samples {
                [mono] => (*mono, *mono),
                [left, right, ..] => (*left, *right),
                [] => (0.0, 0.0),
            };
            stereo[i * 2] += left * gain;
            stereo[i * 2 + 1] += right * gain;
        }
    }
}

/// Structural changes sent from the control thread.
pub enum RenderCommand {
    Insert(Box<Voice>),
    /// Fade the voice out over one block, then drop it.
    Release(NodeKey),
    ReleaseAll,
}

/// Voice events reported back to the control thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderNotification {
    Completed { key: NodeKey, source_id: SourceId },
    Looped { key: NodeKey, source_id: SourceId },
}

/// Render graph: voice arena, spatializer and output staging.
///
/// Renders fixed blocks of `block_size` frames into an internal stereo staging buffer
/// and copies them out to device buffers of any length.
pub struct Mixer {
    commands: Receiver<RenderCommand>,
    notifications: Sender<RenderNotification>,
    retired: Sender<Box<Voice>>,
    voices: Vec<Box<Voice>>,
    spatializer: Box<dyn Spatializer>,
    block_size: usize,
    staging: Vec<f32>,
    staged_cursor: usize,
    mono: Vec<f32>,
    frames_rendered: u64,
}

impl Mixer {
    pub(crate) fn new(
        commands: Receiver<RenderCommand>,
        notifications: Sender<RenderNotification>,
        retired: Sender<Box<Voice>>,
        spatializer: Box<dyn Spatializer>,
        block_size: usize,
        max_voices: usize,
    ) -> Self {
        let block_size = block_size.max(1);
        Self {
            commands,
            notifications,
            retired,
            voices: Vec::with_capacity(max_voices),
            spatializer,
            block_size,
            staging: vec![0.0; block_size * 2],
            // Start exhausted so the first pull renders a block
            staged_cursor: block_size,
            mono: vec![0.0; block_size],
            frames_rendered: 0,
        }
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn spatializer_name(&self) -> &'static str {
        self.spatializer.name()
    }

    /// Fill an interleaved device buffer with `channels` channels.
    ///
    /// Stereo is written to the first two channels, extra channels are silent and a
    /// mono device receives the average of left and right.
    pub fn render(&mut self, out: &mut [f32], channels: u16) {
        self.apply_commands();

        let channels = channels.max(1) as usize;
        for frame in out.chunks_mut(channels) {
            if self.staged_cursor >= self.block_size {
                self.render_block();
                self.staged_cursor = 0;
            }
            let left = self.staging[self.staged_cursor * 2];
            let right = self.staging[self.staged_cursor * 2 + 1];
            self.staged_cursor += 1;

            match frame {
                [mono] => *mono = 0.5 * (left + right),
                [l, r, rest @ ..] => {
                    *l = left;
                    *r = right;
                    rest.fill(0.0);
                }
                [] => {}
            }
        }
        self.frames_rendered += (out.len() / channels) as u64;
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                RenderCommand::Insert(voice) => {
                    log::debug!("Mixer: inserting voice {} for {}", voice.key, voice.source_id);
                    self.voices.push(voice);
                }
                RenderCommand::Release(key) => {
                    if let Some(voice) = self.voices.iter_mut().find(|v| v.key == key) {
                        voice.releasing = true;
                    }
                }
                RenderCommand::ReleaseAll => {
                    for voice in self.voices.iter_mut() {
                        voice.releasing = true;
                    }
                }
            }
        }
    }

    fn render_block(&mut self) {
        self.staging.fill(0.0);
        self.spatializer.begin_block(self.block_size);

        for voice in self.voices.iter_mut() {
            if voice.params.is_released() {
                voice.releasing = true;
            }

            let gain = voice.gain;
            let target_gain = if voice.releasing { 0.0 } else { voice.params.gain() };
            let target_position = voice.params.position();
            voice.wrapped = false;

            match voice.routing {
                VoiceRouting::Direct => voice.read_direct(&mut self.staging, gain, target_gain),
                VoiceRouting::Spatial => {
                    voice.read_mono(&mut self.mono, gain, target_gain);
                    self.spatializer.spatialize(
                        voice.key,
                        &self.mono,
                        voice.position,
                        target_position,
                        &mut self.staging,
                    );
                }
            }

            voice.gain = target_gain;
            voice.position = target_position;

            if voice.wrapped && !voice.releasing {
                let _ = self.notifications.try_send(RenderNotification::Looped {
                    key: voice.key,
                    source_id: voice.source_id,
                });
            }
        }

        self.spatializer.end_block(&mut self.staging);
        self.reap_voices();
    }

    fn reap_voices(&mut self) {
        let mut index = 0;
        while index < self.voices.len() {
            let voice = &self.voices[index];
            if !(voice.releasing || voice.finished) {
                index += 1;
                continue;
            }

            let voice = self.voices.swap_remove(index);
            self.spatializer.release(voice.key);
            if voice.finished && !voice.releasing {
                voice.params.mark_finished();
                log::debug!("Mixer: voice {} for {} completed", voice.key, voice.source_id);
                let _ = self.notifications.try_send(RenderNotification::Completed {
                    key: voice.key,
                    source_id: voice.source_id,
                });
            }
            // Dropped here only when the control thread has stopped collecting
            let _ = self.retired.try_send(voice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Pose;
    use crate::spatial::EqualPowerPanner;
    use crossbeam_channel::{bounded, unbounded};

    struct Rig {
        mixer: Mixer,
        commands: Sender<RenderCommand>,
        notifications: Receiver<RenderNotification>,
        retired: Receiver<Box<Voice>>,
    }

    fn rig(block_size: usize) -> Rig {
        let (commands, command_rx) = unbounded();
        let (notify_tx, notifications) = bounded(NOTIFICATION_CAPACITY);
        let (retired_tx, retired) = bounded(8);
        let mixer = Mixer::new(
            command_rx,
            notify_tx,
            retired_tx,
            Box::new(EqualPowerPanner::new(Pose::identity())),
            block_size,
            8,
        );
        Rig {
            mixer,
            commands,
            notifications,
            retired,
        }
    }

    fn voice(key: u64, frames: usize, looping: bool, routing: VoiceRouting, position: Vec3) -> (Box<Voice>, Arc<NodeParams>) {
        let params = Arc::new(NodeParams::new(position, 1.0));
        let buffer = AudioBuffer::from_mono(vec![1.0; frames], 48000).unwrap();
        let voice = Voice::new(
            NodeKey::new(key),
            SourceId::new(key),
            buffer,
            looping,
            routing,
            params.clone(),
        );
        (Box::new(voice), params)
    }

    #[test]
    fn silence_without_voices() {
        let mut rig = rig(32);
        let mut out = vec![1.0f32; 200];
        rig.mixer.render(&mut out, 2);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(rig.mixer.frames_rendered(), 100);
    }

    #[test]
    fn direct_voice_fades_in_then_holds() {
        let mut rig = rig(16);
        let (v, _params) = voice(1, 1000, false, VoiceRouting::Direct, Vec3::ZERO);
        rig.commands.send(RenderCommand::Insert(v)).unwrap();

        let mut out = vec![0.0f32; 64];
        rig.mixer.render(&mut out, 2);
        assert_eq!(out[0], 0.0);
        // Second block sits at full gain
        assert_eq!(out[32], 1.0);
        assert_eq!(out[33], 1.0);
    }

    #[test]
    fn spatial_voice_pans_right() {
        let mut rig = rig(16);
        let (v, _params) = voice(1, 1000, true, VoiceRouting::Spatial, Vec3::new(2.5, 0.0, 0.0));
        rig.commands.send(RenderCommand::Insert(v)).unwrap();

        let mut out = vec![0.0f32; 128];
        rig.mixer.render(&mut out, 2);
        let left: f32 = out.iter().step_by(2).map(|s| s.abs()).sum();
        let right: f32 = out.iter().skip(1).step_by(2).map(|s| s.abs()).sum();
        assert!(right > 10.0 * left.max(1e-6), "left {} right {}", left, right);
    }

    #[test]
    fn one_shot_voice_completes_and_is_reaped() {
        let mut rig = rig(8);
        let (v, params) = voice(3, 20, false, VoiceRouting::Direct, Vec3::ZERO);
        rig.commands.send(RenderCommand::Insert(v)).unwrap();

        let mut out = vec![0.0f32; 2 * 64];
        rig.mixer.render(&mut out, 2);
        assert_eq!(rig.mixer.voice_count(), 0);
        assert!(params.is_finished());
        assert_eq!(
            rig.notifications.try_recv().unwrap(),
            RenderNotification::Completed {
                key: NodeKey::new(3),
                source_id: SourceId::new(3)
            }
        );
    }

    #[test]
    fn looping_voice_keeps_playing() {
        let mut rig = rig(8);
        let (v, params) = voice(4, 10, true, VoiceRouting::Direct, Vec3::ZERO);
        rig.commands.send(RenderCommand::Insert(v)).unwrap();

        let mut out = vec![0.0f32; 2 * 64];
        rig.mixer.render(&mut out, 2);
        assert_eq!(rig.mixer.voice_count(), 1);
        assert!(!params.is_finished());
        assert!(rig
            .notifications
            .try_iter()
            .all(|n| matches!(n, RenderNotification::Looped { .. })));
    }

    #[test]
    fn release_fades_out_and_removes() {
        let mut rig = rig(8);
        let (v, params) = voice(5, 10_000, false, VoiceRouting::Direct, Vec3::ZERO);
        rig.commands.send(RenderCommand::Insert(v)).unwrap();
        let mut out = vec![0.0f32; 2 * 16];
        rig.mixer.render(&mut out, 2);
        assert_eq!(rig.mixer.voice_count(), 1);

        rig.commands.send(RenderCommand::Release(NodeKey::new(5))).unwrap();
        // Drain the block already staged, then the fade-out block
        let mut out = vec![0.0f32; 2 * 16];
        rig.mixer.render(&mut out, 2);
        assert_eq!(rig.mixer.voice_count(), 0);
        assert!(!params.is_finished());
        assert!(rig.notifications.try_recv().is_err());
    }

    #[test]
    fn released_flag_is_honoured_without_command() {
        let mut rig = rig(8);
        let (v, params) = voice(6, 10_000, true, VoiceRouting::Spatial, Vec3::X);
        rig.commands.send(RenderCommand::Insert(v)).unwrap();
        params.mark_released();
        let mut out = vec![0.0f32; 2 * 8];
        rig.mixer.render(&mut out, 2);
        assert_eq!(rig.mixer.voice_count(), 0);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn mono_and_multichannel_devices() {
        let mut rig = rig(4);
        let (v, _params) = voice(7, 10_000, true, VoiceRouting::Direct, Vec3::ZERO);
        rig.commands.send(RenderCommand::Insert(v)).unwrap();

        let mut warmup = vec![0.0f32; 4];
        rig.mixer.render(&mut warmup, 1);

        let mut mono = vec![0.0f32; 4];
        rig.mixer.render(&mut mono, 1);
        assert!(mono.iter().all(|s| (*s - 1.0).abs() < 1e-6));

        let mut quad = vec![9.0f32; 16];
        rig.mixer.render(&mut quad, 4);
        for frame in quad.chunks(4) {
            assert_eq!(frame[2], 0.0);
            assert_eq!(frame[3], 0.0);
        }
    }

    #[test]
    fn unread_loop_reports_stay_bounded() {
        let mut rig = rig(8);
        let (v, _params) = voice(8, 4, true, VoiceRouting::Direct, Vec3::ZERO);
        rig.commands.send(RenderCommand::Insert(v)).unwrap();

        // Thousands of wraps with nobody reading
        let mut out = vec![0.0f32; 2 * 4096];
        for _ in 0..10 {
            rig.mixer.render(&mut out, 2);
        }
        assert_eq!(rig.notifications.len(), NOTIFICATION_CAPACITY);
        assert_eq!(rig.mixer.voice_count(), 1);
    }

    #[test]
    fn removed_voices_are_handed_back() {
        let mut rig = rig(8);
        let (v, _params) = voice(9, 10_000, false, VoiceRouting::Direct, Vec3::ZERO);
        rig.commands.send(RenderCommand::Insert(v)).unwrap();
        rig.commands.send(RenderCommand::Release(NodeKey::new(9))).unwrap();

        let mut out = vec![0.0f32; 2 * 8];
        rig.mixer.render(&mut out, 2);
        assert_eq!(rig.mixer.voice_count(), 0);
        let retired = rig.retired.try_recv().unwrap();
        assert_eq!(retired.key(), NodeKey::new(9));
    }
}
