//! Record and playback head transfer models.
//!
//! Both are stateless linear scalings of the reciprocal electromagnetic
//! transduction:
//!
//!   record:   H   = x * N * eta / g
//!   playback: out = M * N * eta * g * w * mu0 * v * G_out
//!
//! with N turns, eta head efficiency, g gap width (m), w head width (m),
//! v tape speed (m/s). `G_out` folds the user output gain into a fixed
//! constant that brings saturated tape back to roughly unity.

use crate::hysteresis::HysteresisCoefficients;
use crate::params::{MICRON, MILLIMETRE, PhysicalParameters};

/// Vacuum permeability (H/m).
pub const MU_0: f64 = 1.256_637_062_12e-6;

/// Playback normalization: Ms at factory settings maps to ~1.0 full scale.
///
/// Factory head: 100 turns, eta 0.1, 6 um gap, 6.35 mm width, 15 ips.
pub const PLAYBACK_GAIN_CONSTANT: f64 = 1.5e7;

/// Record head: audio sample -> magnetizing field H (A/m).
#[derive(Clone, Copy, Debug)]
pub struct RecordHead {
    gain: f64,
}

impl RecordHead {
    pub fn new(params: &PhysicalParameters) -> Self {
        Self {
            gain: params.turns_wire * params.head_efficiency / (params.record_gap_um * MICRON),
        }
    }

    #[inline]
    pub fn process(&self, x: f64) -> f64 {
        x * self.gain
    }

    /// Field per unit input sample.
    pub fn gain(&self) -> f64 {
        self.gain
    }
}

/// Playback head: tape magnetization M (A/m) -> output sample.
#[derive(Clone, Copy, Debug)]
pub struct PlaybackHead {
    gain: f64,
}

impl PlaybackHead {
    pub fn new(params: &PhysicalParameters) -> Self {
        let gain = params.turns_wire
            * params.head_efficiency
            * params.playback_gap_um
            * MICRON
            * params.head_width_mm
            * MILLIMETRE
            * MU_0
            * params.tape_speed_mps()
            * PLAYBACK_GAIN_CONSTANT
            * params.output_gain;
        Self { gain }
    }

    #[inline]
    pub fn process(&self, m: f64) -> f64 {
        m * self.gain
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }
}

/// Output level of fully saturated tape for a given parameter set.
pub fn saturated_output_level(params: &PhysicalParameters) -> f64 {
    PlaybackHead::new(params).process(HysteresisCoefficients::default().ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_gain_scales_inverse_with_gap() {
        let narrow = RecordHead::new(&PhysicalParameters {
            record_gap_um: 3.0,
            ..Default::default()
        });
        let wide = RecordHead::new(&PhysicalParameters {
            record_gap_um: 6.0,
            ..Default::default()
        });
        let ratio = narrow.process(0.5) / wide.process(0.5);
        assert!((ratio - 2.0).abs() < 1e-12, "ratio {ratio}");
    }

    #[test]
    fn test_record_factory_field() {
        // 100 * 0.1 / 6e-6 = 1.667e6 A/m per unit input
        let head = RecordHead::new(&PhysicalParameters::default());
        assert!((head.gain() - 1.0e7 / 6.0).abs() < 1.0);
    }

    #[test]
    fn test_heads_are_linear_and_stateless() {
        let params = PhysicalParameters::default();
        let rec = RecordHead::new(&params);
        let play = PlaybackHead::new(&params);
        for &x in &[-1.0, -0.25, 0.0, 0.3, 1.0] {
            assert_eq!(rec.process(x), rec.process(x));
            assert!((rec.process(2.0 * x) - 2.0 * rec.process(x)).abs() < 1e-6);
            assert!((play.process(2.0 * x) - 2.0 * play.process(x)).abs() < 1e-12);
        }
        assert_eq!(play.process(0.0), 0.0);
    }

    #[test]
    fn test_playback_scales_with_speed_and_output_gain() {
        let base = PhysicalParameters::default();
        let slow = PhysicalParameters {
            tape_speed_ips: 7.5,
            ..base
        };
        let loud = PhysicalParameters {
            output_gain: 2.0,
            ..base
        };
        let g = PlaybackHead::new(&base).gain();
        assert!((PlaybackHead::new(&slow).gain() / g - 0.5).abs() < 1e-12);
        assert!((PlaybackHead::new(&loud).gain() / g - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_factory_saturation_near_full_scale() {
        let level = saturated_output_level(&PhysicalParameters::default());
        assert!(level > 0.5 && level < 2.0, "saturated level {level}");
    }
}
