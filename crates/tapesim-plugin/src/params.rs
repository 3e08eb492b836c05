use nih_plug::prelude::*;
use tapesim_dsp::PhysicalParameters;
use tapesim_dsp::params::MAX_FLUTTER_DEPTH;

#[derive(Params)]
pub struct TapeSimParams {
    /// Linear gain into the record head.
    #[id = "in_gain"]
    pub input_gain: FloatParam,

    /// Scales the record field: how hard the tape is hit.
    #[id = "drive"]
    pub drive: FloatParam,

    /// Linear gain after the playback head.
    #[id = "out_gain"]
    pub output_gain: FloatParam,

    /// Tape speed in inches per second.
    #[id = "speed"]
    pub tape_speed: FloatParam,

    #[id = "rec_gap"]
    pub record_gap: FloatParam,

    #[id = "play_gap"]
    pub playback_gap: FloatParam,

    #[id = "spacing"]
    pub head_spacing: FloatParam,

    #[id = "thickness"]
    pub tape_thickness: FloatParam,

    #[id = "head_width"]
    pub head_width: FloatParam,

    #[id = "turns"]
    pub turns_wire: IntParam,

    #[id = "efficiency"]
    pub head_efficiency: FloatParam,

    /// Bias amplitude in input units (0 = no bias).
    #[id = "bias_gain"]
    pub bias_gain: FloatParam,

    #[id = "bias_freq"]
    pub bias_freq: FloatParam,

    /// Flutter LFO rate. Below 0.1 Hz flutter is off.
    #[id = "flut_rate"]
    pub flutter_rate: FloatParam,

    /// Flutter depth: 100 % is a 2 % peak speed deviation.
    #[id = "flut_depth"]
    pub flutter_depth: FloatParam,
}

fn gain_param(name: &str, default_db: f32) -> FloatParam {
    FloatParam::new(
        name,
        util::db_to_gain(default_db),
        FloatRange::Skewed {
            min: util::db_to_gain(-24.0),
            max: util::db_to_gain(24.0),
            factor: FloatRange::gain_skew_factor(-24.0, 24.0),
        },
    )
    .with_smoother(SmoothingStyle::Logarithmic(50.0))
    .with_unit(" dB")
    .with_value_to_string(formatters::v2s_f32_gain_to_db(1))
    .with_string_to_value(formatters::s2v_f32_gain_to_db())
}

fn micron_param(name: &str, default: f32, min: f32, max: f32) -> FloatParam {
    FloatParam::new(
        name,
        default,
        FloatRange::Skewed {
            min,
            max,
            factor: FloatRange::skew_factor(-1.5),
        },
    )
    .with_unit(" µm")
    .with_step_size(0.01)
}

impl Default for TapeSimParams {
    fn default() -> Self {
        let factory = PhysicalParameters::default();
        Self {
            input_gain: gain_param("Input Gain", 0.0),

            drive: FloatParam::new(
                "Drive",
                factory.drive as f32,
                FloatRange::Skewed {
                    min: 0.0,
                    max: 4.0,
                    factor: FloatRange::skew_factor(-1.0),
                },
            )
            .with_smoother(SmoothingStyle::Linear(50.0))
            .with_step_size(0.01),

            output_gain: gain_param("Output Gain", 0.0),

            tape_speed: FloatParam::new(
                "Tape Speed",
                factory.tape_speed_ips as f32,
                FloatRange::Skewed {
                    min: 1.875,
                    max: 30.0,
                    factor: FloatRange::skew_factor(-1.0),
                },
            )
            .with_unit(" ips")
            .with_step_size(0.125),

            record_gap: micron_param("Record Gap", factory.record_gap_um as f32, 0.5, 50.0),
            playback_gap: micron_param("Playback Gap", factory.playback_gap_um as f32, 0.5, 50.0),
            head_spacing: micron_param("Head Spacing", factory.head_spacing_um as f32, 0.1, 200.0),
            tape_thickness: micron_param(
                "Tape Thickness",
                factory.tape_thickness_um as f32,
                1.0,
                200.0,
            ),

            head_width: FloatParam::new(
                "Head Width",
                factory.head_width_mm as f32,
                FloatRange::Linear {
                    min: 0.5,
                    max: 25.4,
                },
            )
            .with_unit(" mm")
            .with_step_size(0.01),

            turns_wire: IntParam::new(
                "Coil Turns",
                factory.turns_wire as i32,
                IntRange::Linear { min: 10, max: 1000 },
            ),

            head_efficiency: FloatParam::new(
                "Head Efficiency",
                factory.head_efficiency as f32,
                FloatRange::Linear {
                    min: 0.01,
                    max: 1.0,
                },
            )
            .with_unit(" %")
            .with_value_to_string(formatters::v2s_f32_percentage(0))
            .with_string_to_value(formatters::s2v_f32_percentage()),

            bias_gain: FloatParam::new(
                "Bias Level",
                factory.bias_gain as f32,
                FloatRange::Skewed {
                    min: 0.0,
                    max: 2.0,
                    factor: FloatRange::skew_factor(-1.0),
                },
            )
            .with_smoother(SmoothingStyle::Linear(50.0))
            .with_step_size(0.001),

            bias_freq: FloatParam::new(
                "Bias Frequency",
                factory.bias_freq_hz as f32,
                FloatRange::Skewed {
                    min: 20_000.0,
                    max: 150_000.0,
                    factor: FloatRange::skew_factor(-1.0),
                },
            )
            .with_unit(" Hz")
            .with_step_size(100.0),

            flutter_rate: FloatParam::new(
                "Flutter Rate",
                factory.flutter_rate_hz as f32,
                FloatRange::Linear {
                    min: 0.0,
                    max: 20.0,
                },
            )
            .with_unit(" Hz")
            .with_step_size(0.1),

            flutter_depth: FloatParam::new(
                "Flutter Depth",
                (factory.flutter_depth / MAX_FLUTTER_DEPTH) as f32,
                FloatRange::Linear {
                    min: 0.0,
                    max: 1.0,
                },
            )
            .with_unit(" %")
            .with_value_to_string(formatters::v2s_f32_percentage(0))
            .with_string_to_value(formatters::s2v_f32_percentage()),
        }
    }
}

impl TapeSimParams {
    /// Snapshot for one block. Smoothed controls advance by `block_len`
    /// samples; geometry is stepped, since any change to it redesigns the
    /// loss filter.
    pub fn physical_parameters(&self, block_len: u32) -> PhysicalParameters {
        PhysicalParameters {
            record_gap_um: self.record_gap.value() as f64,
            playback_gap_um: self.playback_gap.value() as f64,
            turns_wire: self.turns_wire.value() as f64,
            head_efficiency: self.head_efficiency.value() as f64,
            head_width_mm: self.head_width.value() as f64,
            tape_speed_ips: self.tape_speed.value() as f64,
            tape_thickness_um: self.tape_thickness.value() as f64,
            head_spacing_um: self.head_spacing.value() as f64,
            input_gain: self.input_gain.smoothed.next_step(block_len) as f64,
            output_gain: self.output_gain.smoothed.next_step(block_len) as f64,
            drive: self.drive.smoothed.next_step(block_len) as f64,
            bias_gain: self.bias_gain.smoothed.next_step(block_len) as f64,
            bias_freq_hz: self.bias_freq.value() as f64,
            flutter_rate_hz: self.flutter_rate.value() as f64,
            flutter_depth: self.flutter_depth.value() as f64 * MAX_FLUTTER_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_map_to_factory_machine() {
        let params = TapeSimParams::default();
        // The host wrapper does this on activation
        for p in [&params.input_gain, &params.output_gain, &params.drive, &params.bias_gain] {
            p.smoothed.reset(p.value());
        }
        let p = params.physical_parameters(1);
        let factory = PhysicalParameters::default();

        let close = |a: f64, b: f64| (a - b).abs() <= 1e-6 * b.abs().max(1.0);
        assert!(close(p.tape_speed_ips, factory.tape_speed_ips));
        assert!(close(p.record_gap_um, factory.record_gap_um));
        assert!(close(p.head_spacing_um, factory.head_spacing_um));
        assert!(close(p.tape_thickness_um, factory.tape_thickness_um));
        assert!(close(p.head_width_mm, factory.head_width_mm));
        assert!(close(p.turns_wire, factory.turns_wire));
        assert!(close(p.head_efficiency, factory.head_efficiency));
        assert!(close(p.input_gain, 1.0));
        assert!(close(p.output_gain, 1.0));
        assert!(close(p.drive, factory.drive));
        assert!(close(p.bias_gain, factory.bias_gain));
        assert!(close(p.bias_freq_hz, factory.bias_freq_hz));
        assert_eq!(p.flutter_depth, 0.0);
    }
}
