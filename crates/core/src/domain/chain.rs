//! Seven-stage mono filter chain
//!
//! Fixed topology: low-cut, five peak bands, high-cut. Each stage carries
//! its own bypass flag; a bypassed stage is skipped and its delay line is
//! left exactly as it was.

use crate::domain::cut::CutFilterBank;
use crate::domain::dsp::BiquadFilter;

/// Number of stages in a channel chain
pub const CHAIN_LENGTH: usize = 7;

/// Stage positions, in processing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainPosition {
    LowCut,
    LowPeak,
    MidLowPeak,
    MidPeak,
    MidHighPeak,
    HighPeak,
    HighCut,
}

impl ChainPosition {
    pub const ALL: [ChainPosition; CHAIN_LENGTH] = [
        ChainPosition::LowCut,
        ChainPosition::LowPeak,
        ChainPosition::MidLowPeak,
        ChainPosition::MidPeak,
        ChainPosition::MidHighPeak,
        ChainPosition::HighPeak,
        ChainPosition::HighCut,
    ];

    pub fn index(self) -> usize {
        match self {
            ChainPosition::LowCut => 0,
            ChainPosition::LowPeak => 1,
            ChainPosition::MidLowPeak => 2,
            ChainPosition::MidPeak => 3,
            ChainPosition::MidHighPeak => 4,
            ChainPosition::HighPeak => 5,
            ChainPosition::HighCut => 6,
        }
    }

    /// Name used as the prefix of the host parameter ids
    pub fn name(self) -> &'static str {
        match self {
            ChainPosition::LowCut => "LowCut",
            ChainPosition::LowPeak => "LowPeak",
            ChainPosition::MidLowPeak => "MidLowPeak",
            ChainPosition::MidPeak => "MidPeak",
            ChainPosition::MidHighPeak => "MidHighPeak",
            ChainPosition::HighPeak => "HighPeak",
            ChainPosition::HighCut => "HighCut",
        }
    }

    pub fn is_cut(self) -> bool {
        matches!(self, ChainPosition::LowCut | ChainPosition::HighCut)
    }
}

/// Filter held by one stage
#[derive(Debug, Clone, PartialEq)]
pub enum StageFilter {
    Peak(BiquadFilter),
    Cut(CutFilterBank),
}

/// One chain stage: a filter plus its bypass flag
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStage {
    filter: StageFilter,
    bypassed: bool,
}

impl ChainStage {
    fn peak() -> Self {
        Self {
            filter: StageFilter::Peak(BiquadFilter::default()),
            bypassed: false,
        }
    }

    fn cut() -> Self {
        Self {
            filter: StageFilter::Cut(CutFilterBank::new()),
            bypassed: false,
        }
    }

    pub fn filter(&self) -> &StageFilter {
        &self.filter
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    pub fn set_bypassed(&mut self, bypassed: bool) {
        self.bypassed = bypassed;
    }

    pub fn as_peak(&self) -> Option<&BiquadFilter> {
        match &self.filter {
            StageFilter::Peak(filter) => Some(filter),
            StageFilter::Cut(_) => None,
        }
    }

    pub fn as_peak_mut(&mut self) -> Option<&mut BiquadFilter> {
        match &mut self.filter {
            StageFilter::Peak(filter) => Some(filter),
            StageFilter::Cut(_) => None,
        }
    }

    pub fn as_cut(&self) -> Option<&CutFilterBank> {
        match &self.filter {
            StageFilter::Cut(bank) => Some(bank),
            StageFilter::Peak(_) => None,
        }
    }

    pub fn as_cut_mut(&mut self) -> Option<&mut CutFilterBank> {
        match &mut self.filter {
            StageFilter::Cut(bank) => Some(bank),
            StageFilter::Peak(_) => None,
        }
    }

    #[inline]
    fn process_sample(&mut self, x: f64) -> f64 {
        if self.bypassed {
            return x;
        }
        match &mut self.filter {
            StageFilter::Peak(filter) => filter.process_sample(x),
            StageFilter::Cut(bank) => bank.process_sample(x),
        }
    }

    fn reset(&mut self) {
        match &mut self.filter {
            StageFilter::Peak(filter) => filter.reset(),
            StageFilter::Cut(bank) => bank.reset(),
        }
    }

    fn is_at_rest(&self) -> bool {
        match &self.filter {
            StageFilter::Peak(filter) => filter.is_at_rest(),
            StageFilter::Cut(bank) => bank.is_at_rest(),
        }
    }

    /// Contribution of this stage to the chain response, 0 dB when bypassed
    pub fn magnitude_db(&self, freq: f64, sample_rate: f64) -> f64 {
        if self.bypassed {
            return 0.0;
        }
        match &self.filter {
            StageFilter::Peak(filter) => filter.coeffs().magnitude_db(freq, sample_rate),
            StageFilter::Cut(bank) => bank.magnitude_db(freq, sample_rate),
        }
    }
}

/// Mono processing chain of seven stages
///
/// A fresh chain is an identity: peaks have unity coefficients and the
/// cut banks have every section bypassed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelChain {
    stages: [ChainStage; CHAIN_LENGTH],
}

impl Default for ChannelChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelChain {
    pub fn new() -> Self {
        Self {
            stages: [
                ChainStage::cut(),
                ChainStage::peak(),
                ChainStage::peak(),
                ChainStage::peak(),
                ChainStage::peak(),
                ChainStage::peak(),
                ChainStage::cut(),
            ],
        }
    }

    pub fn stage(&self, position: ChainPosition) -> &ChainStage {
        &self.stages[position.index()]
    }

    pub fn stage_mut(&mut self, position: ChainPosition) -> &mut ChainStage {
        &mut self.stages[position.index()]
    }

    pub fn stages(&self) -> &[ChainStage] {
        &self.stages
    }

    pub fn is_bypassed(&self, position: ChainPosition) -> bool {
        self.stage(position).is_bypassed()
    }

    pub fn set_bypassed(&mut self, position: ChainPosition, bypassed: bool) {
        self.stage_mut(position).set_bypassed(bypassed);
    }

    /// Run one sample through every non-bypassed stage in order
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let mut y = f64::from(x);
        for stage in &mut self.stages {
            y = stage.process_sample(y);
        }
        y as f32
    }

    /// Process a buffer in place
    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Clear all delay lines, bypassed stages included
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }

    pub fn is_at_rest(&self) -> bool {
        self.stages.iter().all(ChainStage::is_at_rest)
    }

    /// Combined magnitude response in dB from the installed coefficients
    ///
    /// Bypassed stages contribute exactly 0 dB.
    pub fn magnitude_response_db(&self, freq: f64, sample_rate: f64) -> f64 {
        self.stages
            .iter()
            .map(|stage| stage.magnitude_db(freq, sample_rate))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dsp::{BiquadCoeffs, butterworth, CutType};

    const SAMPLE_RATE: f64 = 48000.0;

    #[test]
    fn test_positions_are_in_processing_order() {
        for (index, position) in ChainPosition::ALL.iter().enumerate() {
            assert_eq!(position.index(), index);
        }
        assert!(ChainPosition::LowCut.is_cut());
        assert!(ChainPosition::HighCut.is_cut());
        assert!(!ChainPosition::MidPeak.is_cut());
    }

    #[test]
    fn test_stage_kinds() {
        let chain = ChannelChain::new();
        for position in ChainPosition::ALL {
            let stage = chain.stage(position);
            assert_eq!(stage.as_cut().is_some(), position.is_cut());
            assert_eq!(stage.as_peak().is_some(), !position.is_cut());
        }
    }

    #[test]
    fn test_fresh_chain_is_identity() {
        let mut chain = ChannelChain::new();
        let input = vec![0.5, -0.25, 0.125, 1.0, -1.0];
        let mut output = input.clone();
        chain.process(&mut output);
        assert_eq!(input, output);
        assert_eq!(chain.magnitude_response_db(1000.0, SAMPLE_RATE), 0.0);
    }

    #[test]
    fn test_bypassed_stage_is_skipped_and_frozen() {
        let mut chain = ChannelChain::new();
        let boost = BiquadCoeffs::peak(SAMPLE_RATE, 1000.0, 1.0, 2.0).unwrap();
        if let Some(filter) = chain.stage_mut(ChainPosition::MidPeak).as_peak_mut() {
            filter.set_coeffs(boost);
        }
        chain.process(&mut [0.5, 0.25, -0.5]);
        let frozen = chain.stage(ChainPosition::MidPeak).clone();

        chain.set_bypassed(ChainPosition::MidPeak, true);
        let input = vec![0.1, 0.2, 0.3];
        let mut output = input.clone();
        chain.process(&mut output);

        assert_eq!(input, output);
        assert_eq!(chain.stage(ChainPosition::MidPeak).as_peak(), frozen.as_peak());
        assert_eq!(chain.magnitude_response_db(1000.0, SAMPLE_RATE), 0.0);
    }

    #[test]
    fn test_magnitude_sums_active_stages() {
        let mut chain = ChannelChain::new();
        let boost = BiquadCoeffs::peak(SAMPLE_RATE, 1000.0, 1.0, 2.0).unwrap();
        let cut = butterworth(CutType::HighPass, 100.0, SAMPLE_RATE, 2).unwrap();

        if let Some(filter) = chain.stage_mut(ChainPosition::MidPeak).as_peak_mut() {
            filter.set_coeffs(boost);
        }
        if let Some(bank) = chain.stage_mut(ChainPosition::LowCut).as_cut_mut() {
            bank.install(&cut);
        }

        let freq = 300.0;
        let expected = boost.magnitude_db(freq, SAMPLE_RATE)
            + cut
                .as_slice()
                .iter()
                .map(|c| c.magnitude_db(freq, SAMPLE_RATE))
                .sum::<f64>();
        let actual = chain.magnitude_response_db(freq, SAMPLE_RATE);
        assert!((actual - expected).abs() < 1e-9);
    }

    #[test]
    fn test_reset_clears_bypassed_stages_too() {
        let mut chain = ChannelChain::new();
        let boost = BiquadCoeffs::peak(SAMPLE_RATE, 1000.0, 1.0, 2.0).unwrap();
        if let Some(filter) = chain.stage_mut(ChainPosition::LowPeak).as_peak_mut() {
            filter.set_coeffs(boost);
        }
        chain.process(&mut [1.0; 16]);
        chain.set_bypassed(ChainPosition::LowPeak, true);
        assert!(!chain.is_at_rest());

        chain.reset();
        assert!(chain.is_at_rest());
    }
}
