//! Control-thread / audio-thread split
//!
//! ```text
//!  control thread                         audio thread
//!  ParameterStore --snapshot--> EqController                EqProcessor
//!                               design()  --ArrayQueue-->  drain + install
//!                               <------- sample rate (atomic) ------
//! ```

mod controller;
mod handoff;
mod processor;

pub use controller::EqController;
pub use handoff::HandoffStats;
pub use processor::EqProcessor;

use handoff::Handoff;
use paraeq_core::{EqError, Result, SnapshotSource};
use std::sync::Arc;

/// Create the two halves of a real-time equalizer
///
/// `capacity` is the number of designed coefficient sets that can wait for
/// the audio thread; when full, the oldest pending set is replaced.
pub fn split<S: SnapshotSource>(source: Arc<S>, capacity: usize) -> Result<(EqController<S>, EqProcessor<S>)> {
    if capacity == 0 {
        return Err(EqError::InvalidConfiguration(
            "update queue capacity must be positive".to_string(),
        ));
    }

    let handoff = Arc::new(Handoff::with_capacity(capacity));
    let controller = EqController::new(Arc::clone(&source), Arc::clone(&handoff));
    let processor = EqProcessor::new(source, handoff);
    Ok((controller, processor))
}
