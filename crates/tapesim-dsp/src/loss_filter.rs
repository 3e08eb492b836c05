//! Head/tape loss filter: an FIR designed from the physics of the head gap.
//!
//! Wavenumber k = 2*pi*f / v (v = tape speed). Three losses multiply:
//!
//!   spacing:   exp(-k * d)                  (head-to-tape distance d)
//!   thickness: (1 - exp(-k * delta)) / (k * delta)   (coating thickness delta)
//!   gap:       sin(k * g / 2) / (k * g / 2)          (gap width g)
//!
//! The magnitude is sampled on an N-point grid, mirrored into a Hermitian
//! (real, even) spectrum and inverse-transformed. The real part, rotated by
//! N/2, gives a causal linear-phase FIR.
//!
//! The inverse FFT is planned and its buffers allocated once in `new`;
//! redesigning is allocation-free and cheap at N = 128, so it runs at block
//! start on the audio thread whenever speed, spacing, thickness or gap change.

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::params::{MICRON, PhysicalParameters};

/// FIR length (power of two).
pub const LOSS_FILTER_ORDER: usize = 128;

/// Bin 0 is evaluated here instead of 0 Hz, where k = 0 is singular.
pub const BIN0_FLOOR_HZ: f64 = 20.0;

/// Product of spacing, thickness and gap loss at `freq_hz`.
pub fn loss_magnitude(freq_hz: f64, params: &PhysicalParameters) -> f64 {
    let k = 2.0 * PI * freq_hz / params.tape_speed_mps();

    let spacing = (-k * params.head_spacing_um * MICRON).exp();

    let k_delta = k * params.tape_thickness_um * MICRON;
    let thickness = (1.0 - (-k_delta).exp()) / k_delta;

    let x = 0.5 * k * params.record_gap_um * MICRON;
    let gap = if x.abs() < 1e-12 { 1.0 } else { x.sin() / x };

    spacing * thickness * gap
}

/// Turns parameter snapshots into taps via a pre-planned inverse FFT.
pub struct LossFilterDesigner {
    ifft: Arc<dyn Fft<f64>>,
    spectrum: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    sample_rate: f64,
    /// Peak |imag| of the last inverse transform, after 1/N scaling
    imag_residual: f64,
}

impl LossFilterDesigner {
    /// `sample_rate` is the rate the FIR runs at (the oversampled rate).
    pub fn new(sample_rate: f64) -> Self {
        let mut planner = FftPlanner::new();
        let ifft = planner.plan_fft_inverse(LOSS_FILTER_ORDER);
        let scratch = vec![Complex::new(0.0, 0.0); ifft.get_inplace_scratch_len()];
        Self {
            ifft,
            spectrum: vec![Complex::new(0.0, 0.0); LOSS_FILTER_ORDER],
            scratch,
            sample_rate,
            imag_residual: 0.0,
        }
    }

    /// Write a fresh set of taps for `params` into `taps`.
    pub fn design(&mut self, params: &PhysicalParameters, taps: &mut [f64; LOSS_FILTER_ORDER]) {
        let n = LOSS_FILTER_ORDER;
        let bin_hz = self.sample_rate / n as f64;

        for bin in 0..=n / 2 {
            let freq = if bin == 0 {
                BIN0_FLOOR_HZ
            } else {
                bin as f64 * bin_hz
            };
            let h = Complex::new(loss_magnitude(freq, params), 0.0);
            self.spectrum[bin] = h;
            if bin > 0 && bin < n / 2 {
                self.spectrum[n - bin] = h;
            }
        }

        self.ifft
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let scale = 1.0 / n as f64;
        let mut imag_peak = 0.0f64;
        for (i, tap) in taps.iter_mut().enumerate() {
            let c = self.spectrum[(i + n / 2) % n];
            *tap = c.re * scale;
            imag_peak = imag_peak.max((c.im * scale).abs());
        }
        self.imag_residual = imag_peak;
    }

    pub fn imaginary_residual(&self) -> f64 {
        self.imag_residual
    }
}

/// Streaming FIR with lazily regenerated taps.
pub struct LossFilter {
    designer: LossFilterDesigner,
    taps: [f64; LOSS_FILTER_ORDER],
    /// Doubled history: every sample is stored at `pos` and `pos + N`, so the
    /// newest N samples are always the contiguous slice `pos..pos + N`.
    history: [f64; 2 * LOSS_FILTER_ORDER],
    pos: usize,
    designed_for: Option<PhysicalParameters>,
}

impl LossFilter {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            designer: LossFilterDesigner::new(sample_rate),
            taps: [0.0; LOSS_FILTER_ORDER],
            history: [0.0; 2 * LOSS_FILTER_ORDER],
            pos: 0,
            designed_for: None,
        }
    }

    /// Regenerate taps if any loss-relevant parameter changed since the last
    /// design. Returns true when a redesign happened.
    pub fn update(&mut self, params: &PhysicalParameters) -> bool {
        let stale = match &self.designed_for {
            Some(prev) => params.loss_filter_changed(prev),
            None => true,
        };
        if stale {
            self.designer.design(params, &mut self.taps);
            self.designed_for = Some(*params);
        }
        stale
    }

    pub fn taps(&self) -> &[f64; LOSS_FILTER_ORDER] {
        &self.taps
    }

    pub fn imaginary_residual(&self) -> f64 {
        self.designer.imaginary_residual()
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let n = LOSS_FILTER_ORDER;
        self.pos = if self.pos == 0 { n - 1 } else { self.pos - 1 };
        self.history[self.pos] = x;
        self.history[self.pos + n] = x;

        let window = &self.history[self.pos..self.pos + n];
        self.taps
            .iter()
            .zip(window)
            .map(|(&t, &h)| t * h)
            .sum()
    }

    /// Clear the delay history; taps are kept.
    pub fn reset(&mut self) {
        self.history = [0.0; 2 * LOSS_FILTER_ORDER];
        self.pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OS_RATE: f64 = 176_400.0;

    fn steady_gain(filter: &mut LossFilter, freq: f64) -> f64 {
        filter.reset();
        let n = 8192;
        let mut peak = 0.0f64;
        for i in 0..n {
            let y = filter.process((2.0 * PI * freq * i as f64 / OS_RATE).sin());
            if i > n / 2 {
                peak = peak.max(y.abs());
            }
        }
        peak
    }

    #[test]
    fn test_magnitude_near_unity_at_floor() {
        let h = loss_magnitude(BIN0_FLOOR_HZ, &PhysicalParameters::default());
        assert!(h > 0.98 && h <= 1.0, "20 Hz loss {h}");
    }

    #[test]
    fn test_magnitude_falls_with_frequency() {
        let p = PhysicalParameters::default();
        let lo = loss_magnitude(1000.0, &p);
        let mid = loss_magnitude(5000.0, &p);
        let hi = loss_magnitude(15000.0, &p);
        assert!(lo > mid && mid > hi, "{lo} {mid} {hi}");
    }

    #[test]
    fn test_taps_real_for_parameter_grid() {
        let mut designer = LossFilterDesigner::new(OS_RATE);
        let mut taps = [0.0; LOSS_FILTER_ORDER];
        for &speed in &[3.75, 7.5, 15.0, 30.0] {
            for &spacing in &[0.5, 5.0, 20.0, 100.0] {
                for &gap in &[1.0, 2.5, 6.0, 12.0] {
                    let p = PhysicalParameters {
                        tape_speed_ips: speed,
                        head_spacing_um: spacing,
                        record_gap_um: gap,
                        ..Default::default()
                    };
                    designer.design(&p, &mut taps);
                    assert!(
                        designer.imaginary_residual() < 1e-4,
                        "imag residual {} at speed={speed} spacing={spacing} gap={gap}",
                        designer.imaginary_residual()
                    );
                    assert!(taps.iter().all(|t| t.is_finite()));
                }
            }
        }
    }

    #[test]
    fn test_taps_linear_phase_symmetric() {
        let mut filter = LossFilter::new(OS_RATE);
        filter.update(&PhysicalParameters::default());
        let taps = filter.taps();
        let c = LOSS_FILTER_ORDER / 2;
        for i in 1..c {
            assert!((taps[c + i] - taps[c - i]).abs() < 1e-12, "asymmetry at {i}");
        }
    }

    #[test]
    fn test_tap_sum_equals_bin0_magnitude() {
        let p = PhysicalParameters::default();
        let mut filter = LossFilter::new(OS_RATE);
        filter.update(&p);
        let sum: f64 = filter.taps().iter().sum();
        assert!((sum - loss_magnitude(BIN0_FLOOR_HZ, &p)).abs() < 1e-9);
    }

    #[test]
    fn test_slower_tape_loses_more_treble() {
        let mut fast = LossFilter::new(OS_RATE);
        fast.update(&PhysicalParameters {
            tape_speed_ips: 30.0,
            ..Default::default()
        });
        let mut slow = LossFilter::new(OS_RATE);
        slow.update(&PhysicalParameters {
            tape_speed_ips: 3.75,
            ..Default::default()
        });

        let fast_hf = steady_gain(&mut fast, 8000.0);
        let slow_hf = steady_gain(&mut slow, 8000.0);
        assert!(slow_hf < fast_hf * 0.5, "slow {slow_hf} vs fast {fast_hf}");
    }

    #[test]
    fn test_update_only_on_relevant_change() {
        let mut filter = LossFilter::new(OS_RATE);
        let p = PhysicalParameters::default();
        assert!(filter.update(&p));
        assert!(!filter.update(&p));

        let louder = PhysicalParameters {
            drive: 2.0,
            output_gain: 3.0,
            ..p
        };
        assert!(!filter.update(&louder));

        let thinner = PhysicalParameters {
            tape_thickness_um: 10.0,
            ..p
        };
        assert!(filter.update(&thinner));
    }

    #[test]
    fn test_impulse_reproduces_taps() {
        let mut filter = LossFilter::new(OS_RATE);
        filter.update(&PhysicalParameters::default());
        let taps = *filter.taps();

        let mut out = [0.0; LOSS_FILTER_ORDER];
        out[0] = filter.process(1.0);
        for y in out.iter_mut().skip(1) {
            *y = filter.process(0.0);
        }
        for (y, t) in out.iter().zip(taps.iter()) {
            assert!((y - t).abs() < 1e-15);
        }
    }
}
