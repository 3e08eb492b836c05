//! Physical parameters of the tape machine and the lock-free store that
//! carries them from the control thread to the audio thread.
//!
//! Units follow the way the machine is specified on paper: gaps, spacing and
//! thickness in microns, head width in millimetres, tape speed in inches per
//! second. Conversion to SI happens in the stages that need it.

use std::sync::atomic::Ordering;

use atomic_float::AtomicF64;

/// Metres per micron.
pub const MICRON: f64 = 1e-6;
/// Metres per millimetre.
pub const MILLIMETRE: f64 = 1e-3;
/// Metres per second per inch-per-second.
pub const IPS_TO_MPS: f64 = 0.0254;

/// Peak fractional speed deviation accepted for flutter depth.
pub const MAX_FLUTTER_DEPTH: f64 = 0.02;
/// Flutter rates below this are treated as "flutter off".
pub const MIN_FLUTTER_RATE_HZ: f64 = 0.1;
/// Upper bound on the flutter LFO rate.
pub const MAX_FLUTTER_RATE_HZ: f64 = 20.0;

/// Snapshot of every physical quantity the signal chain reads.
///
/// The audio thread takes one of these per block and passes it by reference
/// into each stage. Call [`sanitized`](Self::sanitized) before use: it is the
/// single point where out-of-range or non-finite values are repaired.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PhysicalParameters {
    /// Record head gap width (µm).
    pub record_gap_um: f64,
    /// Playback head gap width (µm).
    pub playback_gap_um: f64,
    /// Turns of wire on each head coil.
    pub turns_wire: f64,
    /// Head efficiency (dimensionless, 0..1).
    pub head_efficiency: f64,
    /// Playback head track width (mm).
    pub head_width_mm: f64,
    /// Tape speed (inches per second).
    pub tape_speed_ips: f64,
    /// Magnetic coating thickness (µm).
    pub tape_thickness_um: f64,
    /// Head-to-tape spacing (µm).
    pub head_spacing_um: f64,
    /// Linear gain applied before the tape.
    pub input_gain: f64,
    /// Linear gain applied in the playback head.
    pub output_gain: f64,
    /// Scales the record-head field fed to the hysteresis model.
    pub drive: f64,
    /// Bias amplitude, in input-signal units.
    pub bias_gain: f64,
    /// Bias frequency (Hz).
    pub bias_freq_hz: f64,
    /// Flutter LFO rate (Hz). Below [`MIN_FLUTTER_RATE_HZ`] flutter is off.
    pub flutter_rate_hz: f64,
    /// Peak fractional transport speed deviation.
    pub flutter_depth: f64,
}

impl Default for PhysicalParameters {
    fn default() -> Self {
        Self {
            record_gap_um: 6.0,
            playback_gap_um: 6.0,
            turns_wire: 100.0,
            head_efficiency: 0.1,
            head_width_mm: 6.35,
            tape_speed_ips: 15.0,
            tape_thickness_um: 35.0,
            head_spacing_um: 20.0,
            input_gain: 1.0,
            output_gain: 1.0,
            drive: 0.5,
            bias_gain: 0.1,
            bias_freq_hz: 55_000.0,
            flutter_rate_hz: 0.0,
            flutter_depth: 0.0,
        }
    }
}

/// Clamp to `[lo, hi]`, mapping NaN and infinities to `lo`.
fn clamp_finite(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_finite() {
        value.clamp(lo, hi)
    } else {
        lo
    }
}

impl PhysicalParameters {
    /// Return a copy with every field forced into its valid range.
    ///
    /// Physical dimensions get a strictly positive lower bound so no stage
    /// ever divides by zero.
    pub fn sanitized(&self) -> Self {
        let flutter_rate_hz = clamp_finite(self.flutter_rate_hz, 0.0, MAX_FLUTTER_RATE_HZ);
        let flutter_depth = if flutter_rate_hz < MIN_FLUTTER_RATE_HZ {
            0.0
        } else {
            clamp_finite(self.flutter_depth, 0.0, MAX_FLUTTER_DEPTH)
        };

        Self {
            record_gap_um: clamp_finite(self.record_gap_um, 0.1, 100.0),
            playback_gap_um: clamp_finite(self.playback_gap_um, 0.1, 100.0),
            turns_wire: clamp_finite(self.turns_wire, 1.0, 1000.0),
            head_efficiency: clamp_finite(self.head_efficiency, 0.001, 1.0),
            head_width_mm: clamp_finite(self.head_width_mm, 0.1, 50.0),
            tape_speed_ips: clamp_finite(self.tape_speed_ips, 0.5, 60.0),
            tape_thickness_um: clamp_finite(self.tape_thickness_um, 0.1, 500.0),
            head_spacing_um: clamp_finite(self.head_spacing_um, 0.01, 500.0),
            input_gain: clamp_finite(self.input_gain, 0.0, 16.0),
            output_gain: clamp_finite(self.output_gain, 0.0, 16.0),
            drive: clamp_finite(self.drive, 0.0, 4.0),
            bias_gain: clamp_finite(self.bias_gain, 0.0, 8.0),
            bias_freq_hz: clamp_finite(self.bias_freq_hz, 1_000.0, 200_000.0),
            flutter_rate_hz,
            flutter_depth,
        }
    }

    /// Tape speed in metres per second.
    pub fn tape_speed_mps(&self) -> f64 {
        self.tape_speed_ips * IPS_TO_MPS
    }

    /// True when any field the loss filter depends on differs from `other`.
    pub fn loss_filter_changed(&self, other: &Self) -> bool {
        self.tape_speed_ips != other.tape_speed_ips
            || self.head_spacing_um != other.head_spacing_um
            || self.tape_thickness_um != other.tape_thickness_um
            || self.record_gap_um != other.record_gap_um
    }
}

/// Lock-free parameter store: one atomic per field.
///
/// Fields are independently atomic; a reader may observe a mix of old and new
/// values if a write is in flight. Every field varies smoothly, so a torn
/// snapshot is harmless and lasts at most one block.
pub struct ParameterStore {
    record_gap_um: AtomicF64,
    playback_gap_um: AtomicF64,
    turns_wire: AtomicF64,
    head_efficiency: AtomicF64,
    head_width_mm: AtomicF64,
    tape_speed_ips: AtomicF64,
    tape_thickness_um: AtomicF64,
    head_spacing_um: AtomicF64,
    input_gain: AtomicF64,
    output_gain: AtomicF64,
    drive: AtomicF64,
    bias_gain: AtomicF64,
    bias_freq_hz: AtomicF64,
    flutter_rate_hz: AtomicF64,
    flutter_depth: AtomicF64,
}

impl ParameterStore {
    pub fn new(initial: &PhysicalParameters) -> Self {
        Self {
            record_gap_um: AtomicF64::new(initial.record_gap_um),
            playback_gap_um: AtomicF64::new(initial.playback_gap_um),
            turns_wire: AtomicF64::new(initial.turns_wire),
            head_efficiency: AtomicF64::new(initial.head_efficiency),
            head_width_mm: AtomicF64::new(initial.head_width_mm),
            tape_speed_ips: AtomicF64::new(initial.tape_speed_ips),
            tape_thickness_um: AtomicF64::new(initial.tape_thickness_um),
            head_spacing_um: AtomicF64::new(initial.head_spacing_um),
            input_gain: AtomicF64::new(initial.input_gain),
            output_gain: AtomicF64::new(initial.output_gain),
            drive: AtomicF64::new(initial.drive),
            bias_gain: AtomicF64::new(initial.bias_gain),
            bias_freq_hz: AtomicF64::new(initial.bias_freq_hz),
            flutter_rate_hz: AtomicF64::new(initial.flutter_rate_hz),
            flutter_depth: AtomicF64::new(initial.flutter_depth),
        }
    }

    /// Publish a new snapshot. Safe from any thread.
    pub fn store(&self, p: &PhysicalParameters) {
        let o = Ordering::Relaxed;
        self.record_gap_um.store(p.record_gap_um, o);
        self.playback_gap_um.store(p.playback_gap_um, o);
        self.turns_wire.store(p.turns_wire, o);
        self.head_efficiency.store(p.head_efficiency, o);
        self.head_width_mm.store(p.head_width_mm, o);
        self.tape_speed_ips.store(p.tape_speed_ips, o);
        self.tape_thickness_um.store(p.tape_thickness_um, o);
        self.head_spacing_um.store(p.head_spacing_um, o);
        self.input_gain.store(p.input_gain, o);
        self.output_gain.store(p.output_gain, o);
        self.drive.store(p.drive, o);
        self.bias_gain.store(p.bias_gain, o);
        self.bias_freq_hz.store(p.bias_freq_hz, o);
        self.flutter_rate_hz.store(p.flutter_rate_hz, o);
        self.flutter_depth.store(p.flutter_depth, o);
    }

    /// Read the current values. Wait-free; called once per block on the audio thread.
    pub fn load(&self) -> PhysicalParameters {
        let o = Ordering::Relaxed;
        PhysicalParameters {
            record_gap_um: self.record_gap_um.load(o),
            playback_gap_um: self.playback_gap_um.load(o),
            turns_wire: self.turns_wire.load(o),
            head_efficiency: self.head_efficiency.load(o),
            head_width_mm: self.head_width_mm.load(o),
            tape_speed_ips: self.tape_speed_ips.load(o),
            tape_thickness_um: self.tape_thickness_um.load(o),
            head_spacing_um: self.head_spacing_um.load(o),
            input_gain: self.input_gain.load(o),
            output_gain: self.output_gain.load(o),
            drive: self.drive.load(o),
            bias_gain: self.bias_gain.load(o),
            bias_freq_hz: self.bias_freq_hz.load(o),
            flutter_rate_hz: self.flutter_rate_hz.load(o),
            flutter_depth: self.flutter_depth.load(o),
        }
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new(&PhysicalParameters::default())
    }
}
