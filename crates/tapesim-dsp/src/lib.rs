//! TapeSim DSP library: the reel-to-reel tape machine signal path.
//!
//! Pure DSP math with no audio framework dependencies. [`TapeMachine`] wires
//! the stages together; each stage is also usable (and tested) on its own.

// Record side
pub mod bias;
pub mod heads;
pub mod hysteresis;
pub mod oversampler;

// Tape and playback side
pub mod filters;
pub mod flutter;
pub mod loss_filter;

// Pipeline, parameters, errors
pub mod error;
pub mod machine;
pub mod params;

pub use error::TapeError;
pub use machine::TapeMachine;
pub use params::{ParameterStore, PhysicalParameters};
