//! Fixed conditioning filters around the tape stage.
//!
//! - Low-pass in the oversampled domain: removes what the hysteresis and
//!   bias leave above the audio band before decimation.
//! - High-pass at base rate: removes DC and sub-bass drift from the
//!   integrator's asymmetric behavior near zero field.
//!
//! Both are RBJ cookbook biquads, `process(sample) -> sample`, `reset()`.

use std::f64::consts::PI;

/// Oversampled-domain low-pass cutoff.
pub const CONDITIONING_LPF_HZ: f64 = 20_000.0;
/// Base-rate high-pass cutoff.
pub const CONDITIONING_HPF_HZ: f64 = 25.0;
/// Butterworth Q for both.
pub const CONDITIONING_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Biquad filter, Direct Form II Transposed.
#[derive(Clone, Copy, Debug)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    s1: f64,
    s2: f64,
}

impl Biquad {
    fn from_raw(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            s1: 0.0,
            s2: 0.0,
        }
    }

    /// Low-pass filter (Audio EQ Cookbook).
    pub fn lowpass(cutoff_hz: f64, q: f64, sample_rate: f64) -> Self {
        let w0 = 2.0 * PI * cutoff_hz / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();

        let b1 = 1.0 - cos_w0;
        let b0 = b1 / 2.0;
        Self::from_raw(b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    /// High-pass filter (Audio EQ Cookbook).
    pub fn highpass(cutoff_hz: f64, q: f64, sample_rate: f64) -> Self {
        let w0 = 2.0 * PI * cutoff_hz / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();

        let b1 = -(1.0 + cos_w0);
        let b0 = -b1 / 2.0;
        Self::from_raw(b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    /// Anti-imaging low-pass for the oversampled tape stage.
    ///
    /// The cutoff is pulled below 0.45*fs when the oversampled rate is too
    /// low to hold [`CONDITIONING_LPF_HZ`].
    pub fn conditioning_lowpass(oversampled_rate: f64) -> Self {
        let cutoff = CONDITIONING_LPF_HZ.min(0.45 * oversampled_rate);
        Self::lowpass(cutoff, CONDITIONING_Q, oversampled_rate)
    }

    /// DC / drift high-pass at base rate.
    pub fn conditioning_highpass(sample_rate: f64) -> Self {
        Self::highpass(CONDITIONING_HPF_HZ, CONDITIONING_Q, sample_rate)
    }

    /// Process one sample (Direct Form II Transposed).
    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.s1;
        self.s1 = self.b1 * x - self.a1 * y + self.s2;
        self.s2 = self.b2 * x - self.a2 * y;
        y
    }

    pub fn reset(&mut self) {
        self.s1 = 0.0;
        self.s2 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settled_peak(filter: &mut Biquad, freq: f64, sr: f64) -> f64 {
        filter.reset();
        let n = (sr * 0.2) as usize;
        let mut peak = 0.0f64;
        for i in 0..n {
            let y = filter.process((2.0 * PI * freq * i as f64 / sr).sin());
            if i > n / 2 {
                peak = peak.max(y.abs());
            }
        }
        peak
    }

    #[test]
    fn test_lowpass_passes_audio_band() {
        let sr = 176_400.0;
        let mut lpf = Biquad::conditioning_lowpass(sr);
        let peak = settled_peak(&mut lpf, 1000.0, sr);
        assert!(peak > 0.98, "LPF attenuated 1kHz: {peak}");
    }

    #[test]
    fn test_lowpass_rejects_bias_region() {
        let sr = 176_400.0;
        let mut lpf = Biquad::conditioning_lowpass(sr);
        let peak = settled_peak(&mut lpf, 55_000.0, sr);
        let atten_db = 20.0 * peak.log10();
        assert!(atten_db < -15.0, "55kHz should be attenuated: {atten_db:.1} dB");
    }

    #[test]
    fn test_lowpass_cutoff_tracks_low_rates() {
        // 4x of 8 kHz = 32 kHz: cutoff must drop to 14.4 kHz and stay stable
        let sr = 32_000.0;
        let mut lpf = Biquad::conditioning_lowpass(sr);
        let peak = settled_peak(&mut lpf, 500.0, sr);
        assert!(peak.is_finite() && peak > 0.95, "LPF misbehaved at low rate: {peak}");
    }

    #[test]
    fn test_highpass_removes_dc() {
        let sr = 44100.0;
        let mut hpf = Biquad::conditioning_highpass(sr);
        let mut last = 0.0;
        for _ in 0..(sr as usize) {
            last = hpf.process(1.0);
        }
        assert!(last.abs() < 1e-3, "HPF didn't remove DC: {last}");
    }

    #[test]
    fn test_highpass_passes_midrange() {
        let sr = 44100.0;
        let mut hpf = Biquad::conditioning_highpass(sr);
        let peak = settled_peak(&mut hpf, 1000.0, sr);
        assert!(peak > 0.99, "HPF attenuated 1kHz: {peak}");
    }
}
