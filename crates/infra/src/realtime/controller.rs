//! Control-thread half: turns parameter changes into published coefficients

use super::handoff::{Handoff, HandoffStats};
use paraeq_core::{ChainCoefficients, ParameterStore, Result, SnapshotSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Designs coefficient sets off the audio thread and publishes them
///
/// Change detection is pull-based: `poll` compares the source's generation
/// and the processor's sample rate with what was last designed.
pub struct EqController<S: SnapshotSource> {
    source: Arc<S>,
    handoff: Arc<Handoff>,
    last_generation: Option<u64>,
    last_sample_rate: Option<f64>,
    current: Option<ChainCoefficients>,
}

impl<S: SnapshotSource> EqController<S> {
    pub(crate) fn new(source: Arc<S>, handoff: Arc<Handoff>) -> Self {
        Self {
            source,
            handoff,
            last_generation: None,
            last_sample_rate: None,
            current: None,
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Publish new coefficients if parameters or the sample rate changed
    ///
    /// Returns `Ok(true)` when a set was published. Nothing happens until
    /// the processor has been prepared. A rejected snapshot is reported
    /// once and not retried until the parameters change again.
    pub fn poll(&mut self) -> Result<bool> {
        let Some(sample_rate) = self.handoff.sample_rate() else {
            return Ok(false);
        };
        let generation = self.source.generation();
        if self.last_generation == Some(generation) && self.last_sample_rate == Some(sample_rate) {
            return Ok(false);
        }
        self.publish(generation, sample_rate).map(|_| true)
    }

    /// Design and publish from the current snapshot unconditionally
    pub fn update_now(&mut self) -> Result<bool> {
        let Some(sample_rate) = self.handoff.sample_rate() else {
            debug!("Processor not prepared, update deferred");
            return Ok(false);
        };
        let generation = self.source.generation();
        self.publish(generation, sample_rate).map(|_| true)
    }

    fn publish(&mut self, generation: u64, sample_rate: f64) -> Result<()> {
        self.last_generation = Some(generation);
        self.last_sample_rate = Some(sample_rate);

        let snapshot = self.source.snapshot();
        match ChainCoefficients::design(&snapshot, sample_rate) {
            Ok(coefficients) => {
                self.handoff.publish(coefficients);
                self.current = Some(coefficients);
                debug!(generation, sample_rate, "Published coefficients");
                Ok(())
            }
            Err(e) => {
                warn!("Rejected parameter update: {}", e);
                Err(e)
            }
        }
    }

    /// Magnitude response in dB of the most recently published set
    ///
    /// `None` until something has been published. May run ahead of the
    /// audio thread by at most one block.
    pub fn magnitude_response_db(&self, freq: f64) -> Option<f64> {
        self.current.map(|c| c.magnitude_response_db(freq))
    }

    /// Response curve at each of `freqs`, for plotting
    pub fn response_curve(&self, freqs: &[f64]) -> Option<Vec<f64>> {
        let current = self.current?;
        Some(freqs.iter().map(|&f| current.magnitude_response_db(f)).collect())
    }

    pub fn current(&self) -> Option<&ChainCoefficients> {
        self.current.as_ref()
    }

    pub fn stats(&self) -> HandoffStats {
        self.handoff.stats()
    }

    /// Poll on a fixed period until `shutdown` flips to true
    #[instrument(skip(self, shutdown))]
    pub async fn run(mut self, period: Duration, mut shutdown: watch::Receiver<bool>) -> Self {
        info!("Update loop started");
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    // Errors were already logged; keep serving later changes
                    let _ = self.poll();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Update loop stopped");
        self
    }
}

impl EqController<ParameterStore> {
    /// Restore a saved state blob and publish the result right away
    #[instrument(skip(self, bytes))]
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<()> {
        self.source.load_state(bytes)?;
        self.update_now()?;
        Ok(())
    }

    pub fn save_state(&self) -> Result<Vec<u8>> {
        self.source.save_state()
    }
}
