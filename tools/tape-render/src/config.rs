//! Machine configuration: optional TOML preset plus per-field CLI overrides.
//!
//! A preset is a flat table of `PhysicalParameters` fields; anything it
//! leaves out keeps the factory value:
//!
//! ```toml
//! tape_speed_ips = 7.5
//! drive = 1.2
//! flutter_rate_hz = 4.0
//! flutter_depth = 0.004
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tapesim_dsp::PhysicalParameters;

#[derive(Args, Debug, Clone, Default)]
pub struct MachineArgs {
    /// TOML preset with PhysicalParameters fields
    #[arg(short, long)]
    pub preset: Option<PathBuf>,

    /// Record field drive
    #[arg(long)]
    pub drive: Option<f64>,

    /// Tape speed (ips)
    #[arg(long)]
    pub speed: Option<f64>,

    /// Record head gap (µm)
    #[arg(long)]
    pub record_gap: Option<f64>,

    /// Playback head gap (µm)
    #[arg(long)]
    pub playback_gap: Option<f64>,

    /// Head-to-tape spacing (µm)
    #[arg(long)]
    pub spacing: Option<f64>,

    /// Coating thickness (µm)
    #[arg(long)]
    pub thickness: Option<f64>,

    /// Playback track width (mm)
    #[arg(long)]
    pub head_width: Option<f64>,

    /// Coil turns
    #[arg(long)]
    pub turns: Option<f64>,

    /// Head efficiency (0..1)
    #[arg(long)]
    pub efficiency: Option<f64>,

    /// Linear input gain
    #[arg(long)]
    pub input_gain: Option<f64>,

    /// Linear output gain
    #[arg(long)]
    pub output_gain: Option<f64>,

    /// Bias amplitude (0 disables bias)
    #[arg(long)]
    pub bias_gain: Option<f64>,

    /// Bias frequency (Hz)
    #[arg(long)]
    pub bias_freq: Option<f64>,

    /// Flutter rate (Hz); below 0.1 flutter is off
    #[arg(long)]
    pub flutter_rate: Option<f64>,

    /// Flutter depth as peak fractional speed deviation (max 0.02)
    #[arg(long)]
    pub flutter_depth: Option<f64>,
}

pub fn load_preset(path: &Path) -> Result<PhysicalParameters> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read preset {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid preset {}", path.display()))
}

impl MachineArgs {
    /// Factory values, then the preset, then explicit flags.
    pub fn resolve(&self) -> Result<PhysicalParameters> {
        let mut p = match &self.preset {
            Some(path) => load_preset(path)?,
            None => PhysicalParameters::default(),
        };

        let overrides = [
            (self.drive, &mut p.drive),
            (self.speed, &mut p.tape_speed_ips),
            (self.record_gap, &mut p.record_gap_um),
            (self.playback_gap, &mut p.playback_gap_um),
            (self.spacing, &mut p.head_spacing_um),
            (self.thickness, &mut p.tape_thickness_um),
            (self.head_width, &mut p.head_width_mm),
            (self.turns, &mut p.turns_wire),
            (self.efficiency, &mut p.head_efficiency),
            (self.input_gain, &mut p.input_gain),
            (self.output_gain, &mut p.output_gain),
            (self.bias_gain, &mut p.bias_gain),
            (self.bias_freq, &mut p.bias_freq_hz),
            (self.flutter_rate, &mut p.flutter_rate_hz),
            (self.flutter_depth, &mut p.flutter_depth),
        ];
        for (value, field) in overrides {
            if let Some(v) = value {
                *field = v;
            }
        }

        let sanitized = p.sanitized();
        if sanitized != p {
            tracing::warn!("some parameters were out of range and have been clamped");
        }
        tracing::debug!(?sanitized, "machine parameters");
        Ok(sanitized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_preset_no_flags_is_factory() {
        let p = MachineArgs::default().resolve().unwrap();
        assert_eq!(p, PhysicalParameters::default());
    }

    #[test]
    fn test_partial_preset_keeps_other_defaults() {
        let p: PhysicalParameters = toml::from_str("tape_speed_ips = 7.5\ndrive = 1.2\n").unwrap();
        assert_eq!(p.tape_speed_ips, 7.5);
        assert_eq!(p.drive, 1.2);
        assert_eq!(p.record_gap_um, PhysicalParameters::default().record_gap_um);
    }

    #[test]
    fn test_flags_override_preset() {
        let path = std::env::temp_dir().join("tape_render_config_test.toml");
        std::fs::write(&path, "tape_speed_ips = 7.5\nbias_gain = 0.3\n").unwrap();

        let args = MachineArgs {
            preset: Some(path.clone()),
            speed: Some(30.0),
            ..Default::default()
        };
        let p = args.resolve().unwrap();
        assert_eq!(p.tape_speed_ips, 30.0);
        assert_eq!(p.bias_gain, 0.3);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_out_of_range_flags_are_clamped() {
        let args = MachineArgs {
            flutter_depth: Some(0.5),
            flutter_rate: Some(5.0),
            record_gap: Some(0.0),
            ..Default::default()
        };
        let p = args.resolve().unwrap();
        assert!(p.flutter_depth <= 0.02);
        assert!(p.record_gap_um > 0.0);
    }

    #[test]
    fn test_missing_preset_is_an_error() {
        let args = MachineArgs {
            preset: Some(PathBuf::from("/nonexistent/tape.toml")),
            ..Default::default()
        };
        let err = args.resolve().unwrap_err();
        assert!(format!("{err:#}").contains("failed to read preset"));
    }
}
