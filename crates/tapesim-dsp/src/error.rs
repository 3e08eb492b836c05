//! Error types for the tape machine.

use thiserror::Error;

/// Configuration errors raised by [`TapeMachine::prepare`](crate::machine::TapeMachine::prepare).
///
/// These are programmer errors from the host side and cannot be recovered
/// inside the block callback. Numerical trouble during processing is never
/// reported here; the hysteresis stage absorbs it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TapeError {
    /// Sample rate was zero, negative or not finite.
    #[error("invalid sample rate {0} Hz: must be positive and finite")]
    InvalidSampleRate(f64),

    /// Maximum block size was zero.
    #[error("invalid maximum block size {0}: must be at least 1 sample")]
    InvalidBlockSize(usize),
}
