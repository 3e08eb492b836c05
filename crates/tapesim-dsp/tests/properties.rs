//! Property-based tests: hysteresis boundedness, real loss-filter taps and
//! finite machine output over the whole sanitized parameter space.

use proptest::prelude::*;
use tapesim_dsp::PhysicalParameters;
use tapesim_dsp::TapeMachine;
use tapesim_dsp::flutter::FlutterModulator;
use tapesim_dsp::hysteresis::{HysteresisCoefficients, HysteresisModel};
use tapesim_dsp::loss_filter::{LOSS_FILTER_ORDER, LossFilterDesigner};

const OS_RATE: f64 = 176_400.0;

/// Map 15 unit-interval values onto raw parameters, deliberately reaching
/// outside the valid ranges so sanitizing is exercised too.
fn params_from(v: &[f64; 15]) -> PhysicalParameters {
    PhysicalParameters {
        record_gap_um: -5.0 + v[0] * 120.0,
        playback_gap_um: -5.0 + v[1] * 120.0,
        turns_wire: v[2] * 1200.0,
        head_efficiency: v[3] * 1.2,
        head_width_mm: v[4] * 60.0,
        tape_speed_ips: -10.0 + v[5] * 80.0,
        tape_thickness_um: v[6] * 600.0,
        head_spacing_um: v[7] * 600.0,
        input_gain: v[8] * 4.0,
        output_gain: v[9] * 4.0,
        drive: v[10] * 5.0,
        bias_gain: v[11] * 2.0,
        bias_freq_hz: v[12] * 250_000.0,
        flutter_rate_hz: v[13] * 25.0,
        flutter_depth: v[14] * 0.05,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// |M| never exceeds Ms for any bounded field sequence.
    #[test]
    fn hysteresis_bounded(
        fields in prop::collection::vec(-1.0f64..=1.0, 64..512),
        h_max in 1.0e3f64..5.0e6,
    ) {
        let coeffs = HysteresisCoefficients::default();
        let mut model = HysteresisModel::new(coeffs, OS_RATE);
        for &f in &fields {
            let m = model.process(f * h_max);
            prop_assert!(m.is_finite());
            prop_assert!(m.abs() <= coeffs.ms, "M = {} beyond Ms", m);
        }
    }

    /// Boundedness also holds off the factory material.
    #[test]
    fn hysteresis_bounded_other_materials(
        fields in prop::collection::vec(-1.0f64..=1.0, 64..256),
        alpha in 1.0e-4f64..1.0e-2,
        k in 1.0e3f64..1.0e6,
        c in 0.01f64..0.9,
    ) {
        let coeffs = HysteresisCoefficients { alpha, k, c, ..Default::default() };
        let mut model = HysteresisModel::new(coeffs, OS_RATE);
        for &f in &fields {
            let m = model.process(f * 1.0e6);
            prop_assert!(m.is_finite());
            prop_assert!(m.abs() <= coeffs.ms);
        }
    }

    /// Taps stay real for every sanitized loss geometry.
    #[test]
    fn loss_taps_real(values in prop::array::uniform15(0.0f64..=1.0)) {
        let params = params_from(&values).sanitized();
        let mut designer = LossFilterDesigner::new(OS_RATE);
        let mut taps = [0.0; LOSS_FILTER_ORDER];
        designer.design(&params, &mut taps);
        prop_assert!(designer.imaginary_residual() < 1e-4);
        prop_assert!(taps.iter().all(|t| t.is_finite()));
    }

    /// Zero depth is an exact one-sample delay at any rate.
    #[test]
    fn flutter_zero_depth_is_delay(
        input in prop::collection::vec(-1.0f64..=1.0, 2..256),
        rate in 0.0f64..20.0,
    ) {
        let mut fm = FlutterModulator::new(48_000.0);
        fm.set_params(rate, 0.0);
        let out: Vec<f64> = input.iter().map(|&x| fm.process(x)).collect();
        prop_assert_eq!(out[0], 0.0);
        prop_assert_eq!(&out[1..], &input[..input.len() - 1]);
    }

    /// Any parameter snapshot, sane or not, yields finite output.
    #[test]
    fn machine_output_finite(
        values in prop::array::uniform15(0.0f64..=1.0),
        input in prop::array::uniform32(-1.0f32..=1.0),
    ) {
        let mut tm = TapeMachine::with_parameters(&params_from(&values));
        tm.prepare(48_000.0, 32).unwrap();
        for _ in 0..8 {
            let mut block = input;
            tm.process_block(&mut block);
            for &y in &block {
                prop_assert!(y.is_finite(), "non-finite output {}", y);
            }
        }
    }
}
