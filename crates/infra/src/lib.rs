//! paraeq infrastructure: running the filter chain across threads
//!
//! The control side designs coefficients and publishes them; the audio
//! side installs the newest one at the start of each block without
//! locking or allocating.

pub mod realtime;

pub use realtime::{split, EqController, EqProcessor, HandoffStats};
