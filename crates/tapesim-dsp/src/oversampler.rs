//! 4x polyphase IIR half-band oversampler.
//!
//! Two cascaded 2x stages, each a Regalia-Mitra allpass-based half-band IIR
//! in polyphase form. The hysteresis integrator generates strong odd
//! harmonics; running it at 4x keeps them from folding back into the audio
//! band after decimation.

/// Oversampling factor of the nonlinear section.
pub const OVERSAMPLE_FACTOR: usize = 4;

/// Half-band IIR allpass coefficients (elliptic, two parallel branches).
///
/// Each branch is a cascade of first-order allpass sections:
/// y = (a + z^-1) / (1 + a*z^-1). Transition band ~0.1*fs.
const BRANCH_A_COEFFS: [f64; 3] = [
    0.036_681_502_163_648,
    0.248_030_921_580_110,
    0.643_184_620_136_480,
];

const BRANCH_B_COEFFS: [f64; 3] = [
    0.110_377_634_768_680,
    0.420_399_304_190_880,
    0.854_640_112_701_920,
];

/// First-order allpass section: y = (a + z^-1) / (1 + a*z^-1)
#[derive(Clone, Copy)]
struct AllpassSection {
    a: f64,
    state: f64,
}

impl AllpassSection {
    fn new(a: f64) -> Self {
        Self { a, state: 0.0 }
    }

    #[inline]
    fn process(&mut self, x: f64) -> f64 {
        let y = self.a * x + self.state;
        self.state = x - self.a * y;
        y
    }
}

/// Cascade of three first-order allpass sections. Fixed size, no heap.
#[derive(Clone, Copy)]
struct AllpassBranch {
    sections: [AllpassSection; 3],
}

impl AllpassBranch {
    fn new(coeffs: &[f64; 3]) -> Self {
        Self {
            sections: coeffs.map(AllpassSection::new),
        }
    }

    #[inline]
    fn process(&mut self, x: f64) -> f64 {
        self.sections.iter_mut().fold(x, |y, s| s.process(y))
    }

    fn reset(&mut self) {
        for section in &mut self.sections {
            section.state = 0.0;
        }
    }
}

/// One 2x up/down stage.
#[derive(Clone, Copy)]
pub struct HalfBandStage {
    up_branch_a: AllpassBranch,
    up_branch_b: AllpassBranch,
    down_branch_a: AllpassBranch,
    down_branch_b: AllpassBranch,
    /// One-sample delay for the B branch when decimating
    down_delay: f64,
}

impl HalfBandStage {
    pub fn new() -> Self {
        Self {
            up_branch_a: AllpassBranch::new(&BRANCH_A_COEFFS),
            up_branch_b: AllpassBranch::new(&BRANCH_B_COEFFS),
            down_branch_a: AllpassBranch::new(&BRANCH_A_COEFFS),
            down_branch_b: AllpassBranch::new(&BRANCH_B_COEFFS),
            down_delay: 0.0,
        }
    }

    /// N samples in, 2N out. Branch A yields even samples, branch B odd.
    pub fn upsample(&mut self, input: &[f64], output: &mut [f64]) {
        debug_assert!(output.len() >= input.len() * 2);

        for (i, &x) in input.iter().enumerate() {
            output[i * 2] = self.up_branch_a.process(x);
            output[i * 2 + 1] = self.up_branch_b.process(x);
        }
    }

    /// 2N samples in, N out.
    pub fn downsample(&mut self, input: &[f64], output: &mut [f64]) {
        debug_assert!(input.len() >= output.len() * 2);

        for (i, out) in output.iter_mut().enumerate() {
            let a = self.down_branch_a.process(input[i * 2]);
            let b = self.down_branch_b.process(input[i * 2 + 1]);

            *out = (a + self.down_delay) * 0.5;
            self.down_delay = b;
        }
    }

    pub fn reset(&mut self) {
        self.up_branch_a.reset();
        self.up_branch_b.reset();
        self.down_branch_a.reset();
        self.down_branch_b.reset();
        self.down_delay = 0.0;
    }
}

impl Default for HalfBandStage {
    fn default() -> Self {
        Self::new()
    }
}

/// 4x oversampler: two [`HalfBandStage`]s with a pre-allocated 2x scratch buffer.
pub struct Oversampler {
    inner: HalfBandStage,
    outer: HalfBandStage,
    /// Intermediate 2x-rate buffer, sized in `new`
    mid: Vec<f64>,
}

impl Oversampler {
    /// Allocate for blocks of up to `max_block_size` base-rate samples.
    pub fn new(max_block_size: usize) -> Self {
        Self {
            inner: HalfBandStage::new(),
            outer: HalfBandStage::new(),
            mid: vec![0.0; max_block_size * 2],
        }
    }

    /// N base-rate samples in, 4N out.
    pub fn upsample(&mut self, input: &[f64], output: &mut [f64]) {
        let n = input.len();
        debug_assert!(self.mid.len() >= n * 2);
        let mid = &mut self.mid[..n * 2];
        self.inner.upsample(input, mid);
        self.outer.upsample(mid, &mut output[..n * OVERSAMPLE_FACTOR]);
    }

    /// 4N oversampled samples in, N out.
    pub fn downsample(&mut self, input: &[f64], output: &mut [f64]) {
        let n = output.len();
        debug_assert!(self.mid.len() >= n * 2);
        let mid = &mut self.mid[..n * 2];
        self.outer.downsample(&input[..n * OVERSAMPLE_FACTOR], mid);
        self.inner.downsample(mid, output);
    }

    pub fn reset(&mut self) {
        self.inner.reset();
        self.outer.reset();
        self.mid.fill(0.0);
    }
}
