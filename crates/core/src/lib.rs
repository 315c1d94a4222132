//! paraeq core: the filter chain engine of a seven-stage parametric equalizer
//!
//! Everything in this crate is single-threaded and deterministic. The
//! control-thread/audio-thread split lives in `paraeq-infra`.

pub mod domain;

pub use domain::*;
