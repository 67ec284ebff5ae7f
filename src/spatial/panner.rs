use super::Spatializer;
use crate::math::{Pose, Vec3};
use crate::node::NodeKey;
use std::f32::consts::FRAC_PI_4;

/// Equal-power stereo panner.
///
/// Pan follows the azimuth of the source in the listener's horizontal plane; sources
/// behind the listener fold onto the same left/right position as their mirror in front.
/// Distance is handled upstream by the attenuation model.
pub struct EqualPowerPanner {
    listener: Pose,
}

impl EqualPowerPanner {
    pub fn new(listener: Pose) -> Self {
        Self { listener }
    }

    /// `(left, right)` gains for a listener-relative position.
    pub fn pan_gains(&self, position: Vec3) -> (f32, f32) {
        let local = self.listener.to_local(position);
        let horizontal = (local.x * local.x + local.z * local.z).sqrt();
        let pan = if horizontal > f32::EPSILON {
            (local.x / horizontal).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let angle = (pan + 1.0) * FRAC_PI_4;
        (angle.cos(), angle.sin())
    }
}

impl Spatializer for EqualPowerPanner {
    fn name(&self) -> &'static str {
        "equal-power"
    }

    fn spatialize(&mut self, _voice: NodeKey, input: &[f32], from: Vec3, to: Vec3, output: &mut [f32]) {
        let (l0, r0) = self.pan_gains(from);
        let (l1, r1) = self.pan_gains(to);
        let frames = input.len().min(output.len() / 2);
        let step = if frames > 1 { 1.0 / frames as f32 } else { 1.0 };

        for (i, sample) in input.iter().take(frames).enumerate() {
            let t = i as f32 * step;
            output[i * 2] += sample * (l0 + (l1 - l0) * t);
            output[i * 2 + 1] += sample * (r0 + (r1 - r0) * t);
        }
    }
}
