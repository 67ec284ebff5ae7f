//! Distance attenuation.
//!
//! The gain returned here multiplies a source's own volume; it never replaces it.

use crate::error::{Result, SonicFieldError};

/// Shape of the falloff beyond the reference distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DistanceCurve {
    /// `ref / (ref + rolloff * (d - ref))`
    #[default]
    Inverse,
    /// `1 - rolloff * (d - ref) / (max - ref)`, floored at 0
    Linear,
    /// `(d / ref) ^ -rolloff`
    Exponential,
}

/// Distance to gain mapping.
///
/// The gain is exactly 1 inside the reference distance. The linear curve reaches its
/// floor at `max_distance`; inverse and exponential keep falling beyond it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttenuationModel {
    pub curve: DistanceCurve,
    pub reference_distance: f32,
    pub max_distance: f32,
    pub rolloff: f32,
}

impl Default for AttenuationModel {
    fn default() -> Self {
        Self {
            curve: DistanceCurve::Inverse,
            reference_distance: 1.0,
            max_distance: 50.0,
            rolloff: 1.0,
        }
    }
}

impl AttenuationModel {
    pub fn new(curve: DistanceCurve, reference_distance: f32, max_distance: f32, rolloff: f32) -> Self {
        Self {
            curve,
            reference_distance,
            max_distance,
            rolloff,
        }
    }

    /// Model used for map sources, which live on a kilometre scale.
    pub fn geodetic() -> Self {
        Self {
            max_distance: 10_000.0,
            ..Default::default()
        }
    }

    pub fn with_curve(mut self, curve: DistanceCurve) -> Self {
        self.curve = curve;
        self
    }

    pub fn with_rolloff(mut self, rolloff: f32) -> Self {
        self.rolloff = rolloff;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.reference_distance.is_finite() || self.reference_distance <= 0.0 {
            return Err(SonicFieldError::Configuration(format!(
                "Reference distance must be positive, got {}",
                self.reference_distance
            )));
        }
        if !self.max_distance.is_finite() || self.max_distance < self.reference_distance {
            return Err(SonicFieldError::Configuration(format!(
                "Max distance {} must be at least the reference distance {}",
                self.max_distance, self.reference_distance
            )));
        }
        if !self.rolloff.is_finite() || self.rolloff < 0.0 {
            return Err(SonicFieldError::Configuration(format!(
                "Rolloff must be non-negative, got {}",
                self.rolloff
            )));
        }
        Ok(())
    }

    /// Gain in `[0, 1]` for a listener-to-source distance.
    pub fn gain(&self, distance: f32) -> f32 {
        let reference = self.reference_distance;
        if distance.is_nan() || distance <= reference || self.rolloff == 0.0 {
            return 1.0;
        }

        // Only the linear curve stops at max distance; the others keep falling
        let gain = match self.curve {
            DistanceCurve::Inverse => reference / (reference + self.rolloff * (distance - reference)),
            DistanceCurve::Linear => {
                let d = distance.min(self.max_distance);
                let range = self.max_distance - reference;
                if range <= 0.0 {
                    1.0
                } else {
                    1.0 - self.rolloff * (d - reference) / range
                }
            }
            DistanceCurve::Exponential => (distance / reference).powf(-self.rolloff),
        };

        gain.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURVES: [DistanceCurve; 3] = [
        DistanceCurve::Inverse,
        DistanceCurve::Linear,
        DistanceCurve::Exponential,
    ];

    #[test]
    fn unity_inside_reference_distance() {
        for curve in CURVES {
            let model = AttenuationModel::new(curve, 2.0, 20.0, 1.5);
            for d in [0.0, 0.5, 1.0, 2.0] {
                assert_eq!(model.gain(d), 1.0, "{:?} at {}", curve, d);
            }
        }
    }

    #[test]
    fn monotonically_non_increasing() {
        for curve in CURVES {
            for rolloff in [0.0, 0.5, 1.0, 3.0] {
                let model = AttenuationModel::new(curve, 1.0, 50.0, rolloff);
                let mut previous = model.gain(0.0);
                for step in 1..=1200 {
                    let d = step as f32 * 0.05;
                    let gain = model.gain(d);
                    assert!(gain <= previous, "{:?} rolloff {} rose at {}", curve, rolloff, d);
                    assert!((0.0..=1.0).contains(&gain));
                    previous = gain;
                }
            }
        }
    }

    #[test]
    fn linear_floors_at_zero() {
        let model = AttenuationModel::new(DistanceCurve::Linear, 1.0, 11.0, 1.0);
        assert!((model.gain(6.0) - 0.5).abs() < 1e-6);
        assert_eq!(model.gain(11.0), 0.0);
        assert_eq!(model.gain(500.0), 0.0);

        let steep = AttenuationModel::new(DistanceCurve::Linear, 1.0, 11.0, 4.0);
        assert_eq!(steep.gain(8.0), 0.0);
    }

    #[test]
    fn inverse_matches_reference_formula() {
        let model = AttenuationModel::default();
        assert!((model.gain(2.0) - 0.5).abs() < 1e-6);
        assert!((model.gain(4.0) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn inverse_and_exponential_keep_falling_past_max_distance() {
        let inverse = AttenuationModel::default();
        assert!(inverse.gain(60.0) < inverse.gain(50.0));
        assert!((inverse.gain(100.0) - 0.01).abs() < 1e-6);

        let exponential = AttenuationModel::new(DistanceCurve::Exponential, 1.0, 50.0, 1.0);
        assert!(exponential.gain(200.0) < exponential.gain(50.0));

        let linear = AttenuationModel::new(DistanceCurve::Linear, 1.0, 50.0, 0.5);
        assert_eq!(linear.gain(60.0), linear.gain(50.0));
    }

    #[test]
    fn exponential_halves_per_doubling_with_unit_rolloff() {
        let model = AttenuationModel::new(DistanceCurve::Exponential, 1.0, 100.0, 1.0);
        assert!((model.gain(2.0) - 0.5).abs() < 1e-6);
        assert!((model.gain(8.0) - 0.125).abs() < 1e-6);
    }

    #[test]
    fn zero_rolloff_disables_attenuation() {
        for curve in CURVES {
            let model = AttenuationModel::new(curve, 1.0, 50.0, 0.0);
            assert_eq!(model.gain(40.0), 1.0);
        }
    }

    #[test]
    fn validation() {
        assert!(AttenuationModel::default().validate().is_ok());
        assert!(AttenuationModel::geodetic().validate().is_ok());
        assert!(AttenuationModel::new(DistanceCurve::Inverse, 0.0, 10.0, 1.0).validate().is_err());
        assert!(AttenuationModel::new(DistanceCurve::Inverse, 5.0, 1.0, 1.0).validate().is_err());
        assert!(AttenuationModel::new(DistanceCurve::Linear, 1.0, 10.0, -1.0).validate().is_err());
    }
}
