//! Audio-thread half: installs published coefficients and processes blocks

use super::handoff::{Handoff, HandoffStats};
use paraeq_core::{ProcessorState, Result, SnapshotSource, StereoEqualizer};
use std::sync::Arc;
use tracing::info;

/// Owns the stereo equalizer on the audio thread
///
/// Every process call first installs the newest pending coefficient set
/// for the prepared sample rate. No locks, no allocation, no logging on
/// that path.
pub struct EqProcessor<S: SnapshotSource> {
    source: Arc<S>,
    handoff: Arc<Handoff>,
    equalizer: StereoEqualizer,
}

impl<S: SnapshotSource> EqProcessor<S> {
    pub(crate) fn new(source: Arc<S>, handoff: Arc<Handoff>) -> Self {
        let equalizer = StereoEqualizer::new(source.snapshot());
        Self {
            source,
            handoff,
            equalizer,
        }
    }

    /// Prepare for a stream at `sample_rate`
    ///
    /// Runs from the host's stream-start callback, not the audio callback,
    /// so the full design happens here. Pending sets are discarded and the
    /// controller is told the new rate. A rejected call changes nothing.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> Result<()> {
        let snapshot = self.source.snapshot();
        self.equalizer.prepare_with(&snapshot, sample_rate, max_block_size)?;
        self.handoff.clear();
        self.handoff.set_sample_rate(Some(sample_rate));
        Ok(())
    }

    /// Stop the stream; the controller stops publishing until the next prepare
    pub fn release(&mut self) {
        self.handoff.set_sample_rate(None);
        self.handoff.clear();
        self.equalizer.release();
        info!("Processor released");
    }

    fn install_pending(&mut self) {
        let Some(sample_rate) = self.equalizer.sample_rate() else {
            return;
        };
        if let Some(coefficients) = self.handoff.take_latest(sample_rate) {
            // Rate was matched by take_latest
            let _ = self.equalizer.install(&coefficients);
        }
    }

    /// Process one block of split stereo audio in place
    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) -> Result<()> {
        self.install_pending();
        self.equalizer.process(left, right)
    }

    /// Process one interleaved block with `channels` samples per frame
    pub fn process_interleaved(&mut self, buffer: &mut [f32], channels: usize) -> Result<()> {
        self.install_pending();
        self.equalizer.process_interleaved(buffer, channels)
    }

    /// Process one mono block through the left chain
    pub fn process_mono(&mut self, samples: &mut [f32]) -> Result<()> {
        self.install_pending();
        self.equalizer.process_mono(samples)
    }

    pub fn equalizer(&self) -> &StereoEqualizer {
        &self.equalizer
    }

    pub fn state(&self) -> ProcessorState {
        self.equalizer.state()
    }

    pub fn stats(&self) -> HandoffStats {
        self.handoff.stats()
    }
}
