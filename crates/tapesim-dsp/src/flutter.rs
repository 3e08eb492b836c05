//! Wow and flutter: transport speed wobble as a modulated fractional delay.
//!
//! Every input sample is written at an integer write head. A fractional read
//! head advances by
//!
//!   rate = 1 - depth + depth * lfo,   lfo = 1 + sin(phase)
//!
//! so depth is the peak fractional speed deviation and the mean playback
//! speed stays exactly 1. The LFO starts at phase pi: the read head first
//! lags, then catches back up to where it started, and never leads.
//! Reads interpolate linearly between adjacent slots.

use std::f64::consts::PI;

/// Delay line capacity in seconds at the working rate.
pub const FLUTTER_BUFFER_SECONDS: f64 = 3.0;

/// Minimum distance (samples) the read head keeps behind the write head.
pub const MIN_TRAIL: f64 = 1.0;

/// Sine LFO with a wrapped phase accumulator.
pub struct Lfo {
    phase: f64,
    phase_inc: f64,
    sample_rate: f64,
}

impl Lfo {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            phase: PI,
            phase_inc: 0.0,
            sample_rate,
        }
    }

    pub fn set_rate(&mut self, rate_hz: f64) {
        self.phase_inc = 2.0 * PI * rate_hz / self.sample_rate;
    }

    /// Unit-amplitude sine around a mean of 1, in [0, 2].
    #[inline]
    pub fn next_sample(&mut self) -> f64 {
        let value = 1.0 + self.phase.sin();
        self.phase += self.phase_inc;
        if self.phase >= 2.0 * PI {
            self.phase -= 2.0 * PI;
        }
        value
    }

    pub fn reset(&mut self) {
        self.phase = PI;
    }
}

pub struct FlutterModulator {
    buffer: Vec<f64>,
    /// Next slot to be written
    write_index: usize,
    /// Fractional read position in [0, capacity)
    read_index: f64,
    lfo: Lfo,
    depth: f64,
}

impl FlutterModulator {
    pub fn new(sample_rate: f64) -> Self {
        let capacity = ((sample_rate * FLUTTER_BUFFER_SECONDS).ceil() as usize).max(4);
        let mut m = Self {
            buffer: vec![0.0; capacity],
            write_index: 0,
            read_index: 0.0,
            lfo: Lfo::new(sample_rate),
            depth: 0.0,
        };
        m.reset();
        m
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Depth 0 makes the rate exactly 1 regardless of the LFO.
    pub fn set_params(&mut self, rate_hz: f64, depth: f64) {
        self.lfo.set_rate(rate_hz);
        self.depth = depth;
    }

    /// How far (in samples) the read head sits behind the sample just written.
    pub fn trail(&self) -> f64 {
        let cap = self.buffer.len() as f64;
        let newest = self.write_index as f64;
        let mut d = newest - self.read_index;
        if d <= 0.0 {
            d += cap;
        }
        d
    }

    #[inline]
    pub fn process(&mut self, x: f64) -> f64 {
        let cap = self.buffer.len();
        let capf = cap as f64;

        self.buffer[self.write_index] = x;
        self.write_index += 1;
        if self.write_index >= cap {
            self.write_index = 0;
        }

        let i0 = self.read_index as usize;
        let i1 = if i0 + 1 >= cap { 0 } else { i0 + 1 };
        let frac = self.read_index - i0 as f64;
        let y = (1.0 - frac) * self.buffer[i0] + frac * self.buffer[i1];

        let rate = 1.0 - self.depth + self.depth * self.lfo.next_sample();
        self.read_index += rate;
        if self.read_index >= capf {
            self.read_index -= capf;
        }

        // Keep the trail inside [MIN_TRAIL, capacity - 2]; parameter jumps
        // mid-cycle must not let the read head pass the write head.
        let trail = self.trail();
        if trail < MIN_TRAIL {
            self.read_index -= MIN_TRAIL - trail;
        } else if trail > capf - 2.0 {
            self.read_index += trail - (capf - 2.0);
        }
        if self.read_index < 0.0 {
            self.read_index += capf;
        } else if self.read_index >= capf {
            self.read_index -= capf;
        }

        y
    }

    /// Clear the tape and put the read head one sample behind the write head.
    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_index = 0;
        self.read_index = self.buffer.len() as f64 - MIN_TRAIL;
        self.lfo.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_zero_is_pure_delay() {
        let sr = 44100.0;
        for &rate in &[0.0, 0.5, 7.0, 20.0] {
            let mut fm = FlutterModulator::new(sr);
            fm.set_params(rate, 0.0);

            let input: Vec<f64> = (0..5000).map(|i| ((i * 7919) % 1000) as f64 / 1000.0 - 0.5).collect();
            let output: Vec<f64> = input.iter().map(|&x| fm.process(x)).collect();

            assert_eq!(output[0], 0.0);
            for i in 1..input.len() {
                assert_eq!(output[i], input[i - 1], "rate={rate} sample {i}");
            }
        }
    }

    #[test]
    fn test_trail_starts_at_one_sample() {
        let mut fm = FlutterModulator::new(48000.0);
        fm.process(0.0);
        assert!((fm.trail() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_read_head_never_overtakes_write_head() {
        let sr = 44100.0;
        let mut fm = FlutterModulator::new(sr);
        fm.set_params(6.0, 0.02);

        // Parameter changes mid-cycle included
        for block in 0..200 {
            if block % 37 == 0 {
                fm.set_params(0.1 + (block % 5) as f64 * 3.0, 0.02 * ((block % 3) as f64 / 2.0));
            }
            for _ in 0..512 {
                fm.process(0.1);
                let t = fm.trail();
                assert!(t >= MIN_TRAIL - 1e-9, "trail {t} below minimum");
                assert!(t <= fm.capacity() as f64, "trail {t} beyond buffer");
            }
        }
    }

    #[test]
    fn test_modulation_is_bounded_and_periodic() {
        // Trail excursion for rate = 1 + d*sin: peak 2*d*fs/(2*pi*f)
        let sr = 44100.0;
        let (rate, depth) = (2.0, 0.01);
        let mut fm = FlutterModulator::new(sr);
        fm.set_params(rate, depth);

        let mut max_trail = 0.0f64;
        for _ in 0..(sr as usize * 2) {
            fm.process(0.0);
            max_trail = max_trail.max(fm.trail());
        }
        let expected = 1.0 + 2.0 * depth * sr / (2.0 * PI * rate);
        assert!(
            (max_trail - expected).abs() < 2.0,
            "max trail {max_trail:.1}, expected ~{expected:.1}"
        );

        // After a whole number of LFO cycles the head is back near its start
        assert!(fm.trail() < 3.0, "trail drifted: {}", fm.trail());
    }

    #[test]
    fn test_flutter_detunes_a_tone() {
        let sr = 44100.0;
        let mut fm = FlutterModulator::new(sr);
        fm.set_params(4.0, 0.02);

        let freq = 1000.0;
        let mut out = Vec::with_capacity(sr as usize);
        for i in 0..sr as usize {
            out.push(fm.process((2.0 * PI * freq * i as f64 / sr).sin()));
        }

        // Instantaneous period varies: count crossings per 1/8 s window
        let counts: Vec<usize> = out
            .chunks(sr as usize / 8)
            .map(|c| c.windows(2).filter(|w| w[0] < 0.0 && w[1] >= 0.0).count())
            .collect();
        let min = *counts.iter().min().unwrap();
        let max = *counts.iter().max().unwrap();
        assert!(max > min, "no pitch movement: {counts:?}");
    }

    #[test]
    fn test_lfo_range_and_start() {
        let mut lfo = Lfo::new(1000.0);
        lfo.set_rate(5.0);
        let first = lfo.next_sample();
        assert!((first - 1.0).abs() < 1e-12);
        for _ in 0..10_000 {
            let v = lfo.next_sample();
            assert!((0.0..=2.0).contains(&v));
        }
    }
}
