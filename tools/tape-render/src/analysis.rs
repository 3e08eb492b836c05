//! Measurement helpers: test tones, single-bin DFT levels and FIR response.

use std::f64::consts::PI;

use tapesim_dsp::TapeMachine;

pub fn sine(freq: f64, amplitude: f64, seconds: f64, sample_rate: f64) -> Vec<f32> {
    let n = (seconds * sample_rate).round() as usize;
    (0..n)
        .map(|i| (amplitude * (2.0 * PI * freq * i as f64 / sample_rate).sin()) as f32)
        .collect()
}

/// Run `samples` through a prepared machine in `block_size` chunks.
pub fn run_machine(machine: &mut TapeMachine, samples: &mut [f32], block_size: usize) {
    for block in samples.chunks_mut(block_size) {
        machine.process_block(block);
    }
}

/// Amplitude of the `freq` component (a full-scale sine reads 1.0).
pub fn tone_amplitude(signal: &[f32], freq: f64, sample_rate: f64) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let w = 2.0 * PI * freq / sample_rate;
    let (mut re, mut im) = (0.0, 0.0);
    for (i, &x) in signal.iter().enumerate() {
        let ph = w * i as f64;
        re += x as f64 * ph.cos();
        im -= x as f64 * ph.sin();
    }
    2.0 * (re * re + im * im).sqrt() / signal.len() as f64
}

pub fn to_db(amplitude: f64) -> f64 {
    20.0 * amplitude.max(1e-12).log10()
}

/// Harmonic levels of a settled tone.
#[derive(Debug, Clone, Copy)]
pub struct HarmonicReport {
    pub h1: f64,
    pub h2: f64,
    pub h3: f64,
}

impl HarmonicReport {
    /// Measure the second half of `signal`, after filters and the
    /// magnetization have settled.
    pub fn measure(signal: &[f32], freq: f64, sample_rate: f64) -> Self {
        let settled = &signal[signal.len() / 2..];
        Self {
            h1: tone_amplitude(settled, freq, sample_rate),
            h2: tone_amplitude(settled, 2.0 * freq, sample_rate),
            h3: tone_amplitude(settled, 3.0 * freq, sample_rate),
        }
    }

    /// Fundamental over 3rd harmonic, in dB.
    pub fn h1_h3_margin_db(&self) -> f64 {
        to_db(self.h1) - to_db(self.h3)
    }
}

/// |H(f)| of an FIR running at `sample_rate`.
pub fn fir_magnitude(taps: &[f64], freq: f64, sample_rate: f64) -> f64 {
    let w = 2.0 * PI * freq / sample_rate;
    let (mut re, mut im) = (0.0, 0.0);
    for (n, &t) in taps.iter().enumerate() {
        re += t * (w * n as f64).cos();
        im -= t * (w * n as f64).sin();
    }
    (re * re + im * im).sqrt()
}

/// `points` log-spaced frequencies from `lo` to `hi` inclusive.
pub fn log_sweep(lo: f64, hi: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![lo],
        _ => {
            let ratio = (hi / lo).ln() / (points - 1) as f64;
            (0..points).map(|i| lo * (ratio * i as f64).exp()).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_amplitude_reads_sine_level() {
        let sr = 48000.0;
        let s = sine(1000.0, 0.5, 1.0, sr);
        assert!((tone_amplitude(&s, 1000.0, sr) - 0.5).abs() < 1e-3);
        assert!(tone_amplitude(&s, 3000.0, sr) < 1e-4);
    }

    #[test]
    fn test_fir_magnitude_of_unit_impulse_is_flat() {
        let taps = [1.0, 0.0, 0.0, 0.0];
        for f in [10.0, 1000.0, 20000.0] {
            assert!((fir_magnitude(&taps, f, 48000.0) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_log_sweep_endpoints() {
        let f = log_sweep(20.0, 20000.0, 4);
        assert_eq!(f.len(), 4);
        assert!((f[0] - 20.0).abs() < 1e-9);
        assert!((f[1] - 200.0).abs() < 1e-6);
        assert!((f[3] - 20000.0).abs() < 1e-6);
    }
}
