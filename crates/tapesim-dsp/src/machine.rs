//! `TapeMachine`, the owner of the full record/playback signal chain.
//!
//! Per block, in order:
//!
//!   input gain -> 4x upsample -> + bias -> record head -> hysteresis
//!   -> loss FIR -> anti-image LPF -> 4x downsample -> DC HPF
//!   -> playback head -> flutter -> (copy to other channels)
//!
//! Parameters are read from the shared [`ParameterStore`] once at the start
//! of each block and passed by value into every stage; nothing changes
//! mid-block. All buffers are allocated in [`TapeMachine::prepare`]; the
//! block path performs no allocation, locking or I/O.

use std::sync::Arc;

use crate::bias::BiasOscillator;
use crate::error::TapeError;
use crate::filters::Biquad;
use crate::flutter::FlutterModulator;
use crate::heads::{PlaybackHead, RecordHead};
use crate::hysteresis::{HysteresisCoefficients, HysteresisModel};
use crate::loss_filter::{LOSS_FILTER_ORDER, LossFilter};
use crate::oversampler::{OVERSAMPLE_FACTOR, Oversampler};
use crate::params::{ParameterStore, PhysicalParameters};

/// Processing state that only exists once sample rate and block size are known.
struct TapeChain {
    max_block_size: usize,

    oversampler: Oversampler,
    bias: BiasOscillator,
    record_head: RecordHead,
    hysteresis: HysteresisModel,
    loss_filter: LossFilter,
    lowpass: Biquad,
    highpass: Biquad,
    playback_head: PlaybackHead,
    flutter: FlutterModulator,

    /// Snapshot applied at the start of the current block
    params: PhysicalParameters,

    base_buf: Vec<f64>,
    os_buf: Vec<f64>,
}

impl TapeChain {
    fn new(sample_rate: f64, max_block_size: usize, params: PhysicalParameters) -> Self {
        let os_rate = sample_rate * OVERSAMPLE_FACTOR as f64;
        let mut chain = Self {
            max_block_size,
            oversampler: Oversampler::new(max_block_size),
            bias: BiasOscillator::new(os_rate),
            record_head: RecordHead::new(&params),
            hysteresis: HysteresisModel::new(HysteresisCoefficients::default(), os_rate),
            loss_filter: LossFilter::new(os_rate),
            lowpass: Biquad::conditioning_lowpass(os_rate),
            highpass: Biquad::conditioning_highpass(sample_rate),
            playback_head: PlaybackHead::new(&params),
            flutter: FlutterModulator::new(sample_rate),
            params,
            base_buf: vec![0.0; max_block_size],
            os_buf: vec![0.0; max_block_size * OVERSAMPLE_FACTOR],
        };
        chain.apply(params);
        chain
    }

    /// Push a sanitized snapshot into every stage that caches derived values.
    fn apply(&mut self, params: PhysicalParameters) {
        self.record_head = RecordHead::new(&params);
        self.playback_head = PlaybackHead::new(&params);
        self.bias.set_frequency(params.bias_freq_hz);
        self.bias.set_gain(params.bias_gain);
        self.flutter
            .set_params(params.flutter_rate_hz, params.flutter_depth);
        self.loss_filter.update(&params);
        self.params = params;
    }

    /// Render up to `max_block_size` samples in place.
    fn render(&mut self, samples: &mut [f32]) {
        let n = samples.len();
        debug_assert!(n <= self.max_block_size);
        let input_gain = self.params.input_gain;
        let drive = self.params.drive;

        // A non-finite sample would poison the allpass state for good
        let base = &mut self.base_buf[..n];
        for (dst, &src) in base.iter_mut().zip(samples.iter()) {
            let x = src as f64 * input_gain;
            *dst = if x.is_finite() { x } else { 0.0 };
        }

        let os = &mut self.os_buf[..n * OVERSAMPLE_FACTOR];
        self.oversampler.upsample(base, os);
        self.bias.process(os);

        for s in os.iter_mut() {
            let h = self.record_head.process(*s) * drive;
            let m = self.hysteresis.process(h);
            *s = self.lowpass.process(self.loss_filter.process(m));
        }

        self.oversampler.downsample(os, base);

        for (out, &x) in samples.iter_mut().zip(base.iter()) {
            let y = self.highpass.process(x);
            let y = self.playback_head.process(y);
            *out = self.flutter.process(y) as f32;
        }
    }

    fn reset(&mut self) {
        self.oversampler.reset();
        self.bias.reset();
        self.hysteresis.reset();
        self.loss_filter.reset();
        self.lowpass.reset();
        self.highpass.reset();
        self.flutter.reset();
        self.base_buf.fill(0.0);
        self.os_buf.fill(0.0);
    }
}

/// Reel-to-reel tape machine: mono in-place processor with a lock-free
/// parameter input.
pub struct TapeMachine {
    store: Arc<ParameterStore>,
    chain: Option<TapeChain>,
}

impl TapeMachine {
    /// Unprepared machine with factory parameters. Call [`prepare`](Self::prepare)
    /// before processing.
    pub fn new() -> Self {
        Self::with_parameters(&PhysicalParameters::default())
    }

    pub fn with_parameters(params: &PhysicalParameters) -> Self {
        Self {
            store: Arc::new(ParameterStore::new(params)),
            chain: None,
        }
    }

    /// Size every buffer for `max_block_size` samples at `sample_rate` and
    /// reset all processing state. Re-invoke on any rate or block-size change.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> Result<(), TapeError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(TapeError::InvalidSampleRate(sample_rate));
        }
        if max_block_size == 0 {
            return Err(TapeError::InvalidBlockSize(max_block_size));
        }

        let params = self.store.load().sanitized();
        self.chain = Some(TapeChain::new(sample_rate, max_block_size, params));

        #[cfg(feature = "tracing")]
        tracing::debug!(
            sample_rate,
            max_block_size,
            oversampled_rate = sample_rate * OVERSAMPLE_FACTOR as f64,
            "tape machine prepared"
        );

        Ok(())
    }

    pub fn is_prepared(&self) -> bool {
        self.chain.is_some()
    }

    /// Clear integrator, oscillator, filter and delay state. Keeps buffers.
    pub fn reset(&mut self) {
        if let Some(chain) = self.chain.as_mut() {
            chain.reset();
        }
    }

    /// Publish a new parameter snapshot; takes effect at the next block.
    pub fn set_parameters(&self, params: &PhysicalParameters) {
        self.store.store(params);
    }

    /// Shared handle for writing parameters from another thread.
    pub fn parameter_handle(&self) -> Arc<ParameterStore> {
        Arc::clone(&self.store)
    }

    /// Snapshot applied to the most recent block (sanitized).
    pub fn applied_parameters(&self) -> Option<PhysicalParameters> {
        self.chain.as_ref().map(|c| c.params)
    }

    /// Process mono audio in place.
    ///
    /// Blocks longer than the prepared maximum are split into sub-blocks.
    /// Does nothing if the machine has not been prepared.
    pub fn process_block(&mut self, samples: &mut [f32]) {
        let Some(chain) = self.chain.as_mut() else {
            return;
        };

        let params = self.store.load().sanitized();
        chain.apply(params);

        let max = chain.max_block_size;
        for sub in samples.chunks_mut(max) {
            chain.render(sub);
        }
    }

    /// Process channel 0 and copy the result to every other channel.
    pub fn process_channels(&mut self, channels: &mut [&mut [f32]]) {
        let Some((first, rest)) = channels.split_first_mut() else {
            return;
        };
        self.process_block(first);
        for ch in rest {
            for (dst, &src) in ch.iter_mut().zip(first.iter()) {
                *dst = src;
            }
        }
    }

    /// Base-rate latency: one sample of flutter trail plus the loss FIR's
    /// linear-phase delay.
    pub fn latency_samples(&self) -> u32 {
        1 + (LOSS_FILTER_ORDER / 2 / OVERSAMPLE_FACTOR) as u32
    }

    /// Hysteresis steps discarded as non-finite since the last prepare/reset.
    pub fn unstable_samples(&self) -> u64 {
        self.chain
            .as_ref()
            .map_or(0, |c| c.hysteresis.unstable_steps())
    }

    /// Peak |imag| of the current loss filter design.
    pub fn loss_filter_imaginary_residual(&self) -> Option<f64> {
        self.chain
            .as_ref()
            .map(|c| c.loss_filter.imaginary_residual())
    }
}

impl Default for TapeMachine {
    fn default() -> Self {
        Self::new()
    }
}
