//! Stereo coordinator
//!
//! Owns the left and right chains, mirrors every update to both and runs
//! host blocks through them. Lifecycle:
//!
//! ```text
//! Unprepared --prepare--> Prepared --process--> Processing
//!      ^                     ^  |                   |
//!      |                     +--+---- prepare ------+
//!      +------------ Released <------ release ------+
//! ```
//!
//! `process` never allocates, locks or logs.

use crate::domain::chain::{ChainPosition, ChannelChain};
use crate::domain::dsp::validate_sample_rate;
use crate::domain::error::{EqError, Result};
use crate::domain::params::ParameterSnapshot;
use crate::domain::update::ChainCoefficients;
use tracing::{debug, info, warn};

/// Lifecycle state of the processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Unprepared,
    Prepared,
    Processing,
    Released,
}

/// Two identical channel chains driven by one parameter snapshot
#[derive(Debug, Clone)]
pub struct StereoEqualizer {
    left: ChannelChain,
    right: ChannelChain,
    state: ProcessorState,
    sample_rate: f64,
    max_block_size: usize,
    snapshot: ParameterSnapshot,
}

impl Default for StereoEqualizer {
    fn default() -> Self {
        Self::new(ParameterSnapshot::default())
    }
}

impl StereoEqualizer {
    /// Name reported to hosts
    pub const NAME: &'static str = "paraeq";

    /// Create an unprepared equalizer that will start from `snapshot`
    pub fn new(snapshot: ParameterSnapshot) -> Self {
        Self {
            left: ChannelChain::new(),
            right: ChannelChain::new(),
            state: ProcessorState::Unprepared,
            sample_rate: 0.0,
            max_block_size: 0,
            snapshot,
        }
    }

    /// Enter the prepared state at a new sample rate
    ///
    /// Recomputes every coefficient from the current snapshot and clears
    /// all delay lines. On error the previous state is kept.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> Result<()> {
        let snapshot = self.snapshot;
        self.prepare_with(&snapshot, sample_rate, max_block_size)
    }

    /// Like `prepare`, but with a fresh snapshot
    ///
    /// Rate, block size and snapshot are all checked and the design is
    /// finished before anything touches the chains, so a rejected call
    /// leaves the previous coefficients and state in place.
    pub fn prepare_with(
        &mut self,
        snapshot: &ParameterSnapshot,
        sample_rate: f64,
        max_block_size: usize,
    ) -> Result<()> {
        let sample_rate = validate_sample_rate(sample_rate)?;
        if max_block_size == 0 {
            return Err(EqError::InvalidBlockSize(max_block_size));
        }
        let coefficients = ChainCoefficients::design(snapshot, sample_rate)?;

        self.left.reset();
        self.right.reset();
        self.apply(&coefficients);

        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;
        self.state = ProcessorState::Prepared;

        info!(sample_rate, max_block_size, "Equalizer prepared");
        Ok(())
    }

    /// Leave the processing states; `prepare` must run again before `process`
    pub fn release(&mut self) {
        self.left.reset();
        self.right.reset();
        self.state = ProcessorState::Released;
        info!("Equalizer released");
    }

    /// Clear every delay line without touching coefficients
    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }

    /// Run the update protocol with a new snapshot
    ///
    /// Before `prepare` the snapshot is only remembered. A rejected
    /// snapshot leaves both chains on their last good configuration.
    pub fn update(&mut self, snapshot: &ParameterSnapshot) -> Result<()> {
        if !self.is_prepared() {
            snapshot.validate()?;
            self.snapshot = *snapshot;
            debug!("Snapshot stored until prepare");
            return Ok(());
        }

        match ChainCoefficients::design(snapshot, self.sample_rate) {
            Ok(coefficients) => {
                self.apply(&coefficients);
                Ok(())
            }
            Err(e) => {
                warn!("Rejected parameter update: {}", e);
                Err(e)
            }
        }
    }

    /// Install a coefficient set designed elsewhere
    ///
    /// The set must match the prepared sample rate. Safe for the audio
    /// thread: no allocation and no logging.
    pub fn install(&mut self, coefficients: &ChainCoefficients) -> Result<()> {
        if !self.is_prepared() {
            return Err(EqError::NotPrepared);
        }
        if coefficients.sample_rate() != self.sample_rate {
            return Err(EqError::InvalidSampleRate(coefficients.sample_rate()));
        }
        self.apply(coefficients);
        Ok(())
    }

    fn apply(&mut self, coefficients: &ChainCoefficients) {
        self.left.install(coefficients);
        self.right.install(coefficients);
        self.snapshot = *coefficients.snapshot();
    }

    /// Process one block of split stereo audio in place
    ///
    /// Each channel runs through its own chain over its own length. Blocks
    /// larger than `max_block_size` are still processed.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) -> Result<()> {
        self.begin_block()?;
        self.left.process(left);
        self.right.process(right);
        Ok(())
    }

    /// Process a mono buffer through the left chain only
    pub fn process_mono(&mut self, samples: &mut [f32]) -> Result<()> {
        self.begin_block()?;
        self.left.process(samples);
        Ok(())
    }

    /// Process a multi-channel split buffer
    ///
    /// Channel 0 goes through the left chain, channel 1 through the right
    /// chain, and any further channels are left untouched.
    pub fn process_channels(&mut self, channels: &mut [&mut [f32]]) -> Result<()> {
        self.begin_block()?;
        let mut iter = channels.iter_mut();
        if let Some(left) = iter.next() {
            self.left.process(left);
        }
        if let Some(right) = iter.next() {
            self.right.process(right);
        }
        Ok(())
    }

    /// Process an interleaved buffer with `channels` samples per frame
    ///
    /// Same channel routing as `process_channels`. A trailing partial frame
    /// is ignored.
    pub fn process_interleaved(&mut self, buffer: &mut [f32], channels: usize) -> Result<()> {
        self.begin_block()?;
        if channels == 0 {
            return Ok(());
        }

        for frame in buffer.chunks_exact_mut(channels) {
            frame[0] = self.left.process_sample(frame[0]);
            if channels > 1 {
                frame[1] = self.right.process_sample(frame[1]);
            }
        }
        Ok(())
    }

    fn begin_block(&mut self) -> Result<()> {
        match self.state {
            ProcessorState::Prepared | ProcessorState::Processing => {
                self.state = ProcessorState::Processing;
                Ok(())
            }
            ProcessorState::Unprepared | ProcessorState::Released => Err(EqError::NotPrepared),
        }
    }

    /// Combined magnitude response in dB at `freq`, read from the left chain
    pub fn magnitude_response_db(&self, freq: f64) -> Result<f64> {
        if !self.is_prepared() {
            return Err(EqError::NotPrepared);
        }
        Ok(self.left.magnitude_response_db(freq, self.sample_rate))
    }

    pub fn is_prepared(&self) -> bool {
        matches!(self.state, ProcessorState::Prepared | ProcessorState::Processing)
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    /// Prepared sample rate, if any
    pub fn sample_rate(&self) -> Option<f64> {
        self.is_prepared().then_some(self.sample_rate)
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn snapshot(&self) -> &ParameterSnapshot {
        &self.snapshot
    }

    pub fn left(&self) -> &ChannelChain {
        &self.left
    }

    pub fn right(&self) -> &ChannelChain {
        &self.right
    }

    pub fn is_bypassed(&self, position: ChainPosition) -> bool {
        self.left.is_bypassed(position)
    }

    /// IIR tails are not reported to hosts
    pub fn tail_length_seconds(&self) -> f64 {
        0.0
    }

    pub fn name(&self) -> &'static str {
        Self::NAME
    }
}
