// Spatial audio module
//
// The render graph hands every spatial voice to a `Spatializer`, which turns a mono
// block plus a listener-relative position into stereo. The built-in equal-power
// panner needs nothing but arithmetic; the Steam Audio backend adds HRTF filtering.

#[cfg(feature = "steam-audio")]
mod hrtf;
mod panner;

#[cfg(feature = "steam-audio")]
pub use hrtf::HrtfSpatializer;
pub use panner::EqualPowerPanner;

use crate::error::Result;
use crate::math::{Pose, Vec3};
use crate::node::NodeKey;

/// Render-thread capability that positions mono voices in a stereo field.
///
/// Calls arrive once per block in the order `begin_block`, `spatialize` for each
/// voice, `end_block`. `output` is interleaved stereo of exactly one block and
/// must be accumulated into, never overwritten. Implementations must not panic;
/// failures are logged and the voice is left silent for that block.
pub trait Spatializer: Send {
    fn name(&self) -> &'static str;

    fn begin_block(&mut self, _frames: usize) {}

    /// Mix `input` into `output`, moving from `from` to `to` across the block.
    fn spatialize(&mut self, voice: NodeKey, input: &[f32], from: Vec3, to: Vec3, output: &mut [f32]);

    fn end_block(&mut self, _output: &mut [f32]) {}

    /// The voice is gone; drop any per-voice state.
    fn release(&mut self, _voice: NodeKey) {}
}

/// Which spatializer the engine builds when the device comes up.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SpatializerKind {
    #[default]
    EqualPower,
    /// Steam Audio HRTF; `hrtf_path` points at a SOFA file, `None` uses the built-in set.
    #[cfg(feature = "steam-audio")]
    SteamAudio { hrtf_path: Option<String> },
}

pub(crate) fn create_spatializer(
    kind: &SpatializerKind,
    listener: Pose,
    sample_rate: u32,
    block_size: usize,
    max_voices: usize,
) -> Result<Box<dyn Spatializer>> {
    let spatializer: Box<dyn Spatializer> = match kind {
        SpatializerKind::EqualPower => Box::new(EqualPowerPanner::new(listener)),
        #[cfg(feature = "steam-audio")]
        SpatializerKind::SteamAudio { hrtf_path } => Box::new(HrtfSpatializer::new(
            listener,
            sample_rate,
            block_size,
            max_voices,
            hrtf_path.as_deref(),
        )?),
    };
    #[cfg(not(feature = "steam-audio"))]
    let _ = max_voices;
    log::info!(
        "Created {} spatializer ({} Hz, {} frames per block)",
        spatializer.name(),
        sample_rate,
        block_size
    );
    Ok(spatializer)
}
