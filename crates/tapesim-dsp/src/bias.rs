//! AC bias oscillator.
//!
//! Real recorders add a high-frequency sinusoid (tens of kHz) to the audio
//! before the record head; it lifts the signal out of the steep low-field
//! region of the tape's hysteresis curve. Here it is a cosine wavetable with
//! linear interpolation, running at the oversampled rate.

use std::f64::consts::PI;

/// Wavetable length (one period).
pub const BIAS_TABLE_SIZE: usize = 2048;

/// Highest bias frequency as a fraction of the oversampled rate.
const MAX_FREQ_RATIO: f64 = 0.45;

pub struct BiasOscillator {
    table: Box<[f64; BIAS_TABLE_SIZE]>,
    /// Fractional read position in [0, BIAS_TABLE_SIZE)
    index: f64,
    /// Table positions advanced per sample
    increment: f64,
    gain: f64,
    sample_rate: f64,
}

impl BiasOscillator {
    /// `sample_rate` is the rate the oscillator runs at (the oversampled rate).
    pub fn new(sample_rate: f64) -> Self {
        let mut table = Box::new([0.0f64; BIAS_TABLE_SIZE]);
        for (i, v) in table.iter_mut().enumerate() {
            *v = (2.0 * PI * i as f64 / BIAS_TABLE_SIZE as f64).cos();
        }
        Self {
            table,
            index: 0.0,
            increment: 0.0,
            gain: 0.0,
            sample_rate,
        }
    }

    /// Set frequency (Hz), clamped to 45% of the running rate.
    pub fn set_frequency(&mut self, freq_hz: f64) {
        let freq = freq_hz.clamp(0.0, MAX_FREQ_RATIO * self.sample_rate);
        self.increment = freq * BIAS_TABLE_SIZE as f64 / self.sample_rate;
    }

    pub fn set_gain(&mut self, gain: f64) {
        self.gain = gain;
    }

    /// Next raw table value in [-1, 1]; advances the phase.
    #[inline]
    pub fn next_sample(&mut self) -> f64 {
        let i0 = self.index as usize;
        let i1 = if i0 + 1 >= BIAS_TABLE_SIZE { 0 } else { i0 + 1 };
        let frac = self.index - i0 as f64;
        let s0 = self.table[i0];
        let s1 = self.table[i1];

        self.index += self.increment;
        while self.index >= BIAS_TABLE_SIZE as f64 {
            self.index -= BIAS_TABLE_SIZE as f64;
        }

        s0 + frac * (s1 - s0)
    }

    /// Add gain-scaled bias to every sample of `buf`.
    pub fn process(&mut self, buf: &mut [f64]) {
        if self.gain == 0.0 {
            // Phase keeps running so toggling gain doesn't restart the carrier
            for _ in 0..buf.len() {
                self.next_sample();
            }
            return;
        }
        for s in buf.iter_mut() {
            *s += self.gain * self.next_sample();
        }
    }

    pub fn reset(&mut self) {
        self.index = 0.0;
    }
}
