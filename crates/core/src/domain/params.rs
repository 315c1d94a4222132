//! Parameter model: ranges, layout and the per-cycle snapshot
//!
//! The layout describes what the host exposes (ranges, step, skew and
//! defaults). A `ParameterSnapshot` is one consistent read of those
//! parameters and is the only input the coefficient factory needs.

use crate::domain::chain::{ChainPosition, CHAIN_LENGTH};
use crate::domain::error::{EqError, Result};
use serde::{Deserialize, Serialize};

/// Number of parametric peak bands in the chain
pub const PEAK_BAND_COUNT: usize = 5;

// ============================================================================
// SLOPE
// ============================================================================

/// Cut filter slope choice
///
/// Choice `k` runs `k + 1` cascaded second-order Butterworth sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Slope {
    #[default]
    Db6,
    Db12,
    Db18,
    Db24,
}

impl Slope {
    pub const ALL: [Slope; 4] = [Slope::Db6, Slope::Db12, Slope::Db18, Slope::Db24];

    /// Map a host choice index to a slope, rejecting anything outside 0..=3
    pub fn from_index(index: u32) -> Result<Self> {
        Self::ALL
            .get(index as usize)
            .copied()
            .ok_or(EqError::InvalidSlope(index))
    }

    /// Host choice index (0..=3)
    pub fn index(self) -> u32 {
        match self {
            Slope::Db6 => 0,
            Slope::Db12 => 1,
            Slope::Db18 => 2,
            Slope::Db24 => 3,
        }
    }

    /// Number of active second-order sections in the cut bank
    pub fn sections(self) -> usize {
        self.index() as usize + 1
    }

    /// Nominal dB-per-octave value shown to the user
    pub fn db_per_octave(self) -> u32 {
        6 * (self.index() + 1)
    }

    /// Choice label as shown by the host
    pub fn label(self) -> &'static str {
        match self {
            Slope::Db6 => "6 db/Oct",
            Slope::Db12 => "12 db/Oct",
            Slope::Db18 => "18 db/Oct",
            Slope::Db24 => "24 db/Oct",
        }
    }
}

// ============================================================================
// PEAK BANDS
// ============================================================================

/// The five peak bands, in ascending frequency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    Low,
    MidLow,
    Mid,
    MidHigh,
    High,
}

impl Band {
    pub const ALL: [Band; PEAK_BAND_COUNT] = [Band::Low, Band::MidLow, Band::Mid, Band::MidHigh, Band::High];

    pub fn index(self) -> usize {
        match self {
            Band::Low => 0,
            Band::MidLow => 1,
            Band::Mid => 2,
            Band::MidHigh => 3,
            Band::High => 4,
        }
    }

    /// Chain stage that runs this band
    pub fn position(self) -> ChainPosition {
        match self {
            Band::Low => ChainPosition::LowPeak,
            Band::MidLow => ChainPosition::MidLowPeak,
            Band::Mid => ChainPosition::MidPeak,
            Band::MidHigh => ChainPosition::MidHighPeak,
            Band::High => ChainPosition::HighPeak,
        }
    }
}

/// Settings of one peak band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakSettings {
    /// Center frequency in Hz
    pub freq: f32,
    /// Boost/cut in decibels
    pub gain_db: f32,
    /// Quality (bandwidth)
    pub quality: f32,
}

// ============================================================================
// RANGES AND LAYOUT
// ============================================================================

/// Declared range of one numeric host parameter
///
/// `step` snaps values to an interval (0 disables snapping) and `skew`
/// shapes the normalised 0..1 mapping used for host automation; a skew
/// below 1 gives more of the control travel to the low end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
    #[serde(default)]
    pub step: f32,
    #[serde(default = "default_skew")]
    pub skew: f32,
    pub default: f32,
}

fn default_skew() -> f32 {
    1.0
}

impl ParamRange {
    pub const fn new(min: f32, max: f32, step: f32, skew: f32, default: f32) -> Self {
        Self {
            min,
            max,
            step,
            skew,
            default,
        }
    }

    /// Frequency range with 1 Hz steps and the usual 0.25 skew
    pub const fn frequency(min: f32, max: f32, default: f32) -> Self {
        Self::new(min, max, 1.0, 0.25, default)
    }

    /// Clamp into `[min, max]` and snap to the step interval
    pub fn clamp(&self, value: f32) -> f32 {
        let value = if value.is_nan() { self.default } else { value };
        let clamped = value.clamp(self.min, self.max);
        if self.step <= 0.0 {
            return clamped;
        }

        let (min, step) = (f64::from(self.min), f64::from(self.step));
        let snapped = min + ((f64::from(clamped) - min) / step).round() * step;
        // Values already on the grid are kept bit-exact
        if (snapped - f64::from(clamped)).abs() <= step * 1e-3 {
            clamped
        } else {
            (snapped as f32).clamp(self.min, self.max)
        }
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    /// Map a plain value onto the skewed 0..1 automation range
    pub fn to_normalised(&self, value: f32) -> f32 {
        let proportion = ((self.clamp(value) - self.min) / (self.max - self.min)).clamp(0.0, 1.0);
        if self.skew == 1.0 {
            proportion
        } else {
            proportion.powf(self.skew)
        }
    }

    /// Map a 0..1 automation value back onto the plain range
    pub fn from_normalised(&self, normalised: f32) -> f32 {
        let mut proportion = normalised.clamp(0.0, 1.0);
        if self.skew != 1.0 && proportion > 0.0 {
            proportion = (proportion.ln() / self.skew).exp();
        }
        self.clamp(self.min + (self.max - self.min) * proportion)
    }

    fn validate(&self, name: &str) -> Result<()> {
        let finite = [self.min, self.max, self.step, self.skew, self.default]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.min >= self.max {
            return Err(EqError::InvalidConfiguration(format!(
                "{name}: range must be finite with min < max"
            )));
        }
        if !self.contains(self.default) {
            return Err(EqError::InvalidConfiguration(format!(
                "{name}: default {} outside [{}, {}]",
                self.default, self.min, self.max
            )));
        }
        if self.step < 0.0 || self.skew <= 0.0 {
            return Err(EqError::InvalidConfiguration(format!(
                "{name}: step must be >= 0 and skew > 0"
            )));
        }
        Ok(())
    }
}

/// Ranges for the three parameters of one peak band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandLayout {
    pub freq: ParamRange,
    pub gain: ParamRange,
    pub quality: ParamRange,
}

impl BandLayout {
    fn new(min_freq: f32, max_freq: f32, default_freq: f32) -> Self {
        Self {
            freq: ParamRange::frequency(min_freq, max_freq, default_freq),
            gain: ParamRange::new(-12.0, 12.0, 0.5, 1.0, 0.0),
            quality: ParamRange::new(0.1, 10.0, 0.05, 1.0, 1.0),
        }
    }
}

/// Everything the host exposes about the equalizer's parameters
///
/// Band frequency ranges and the gain range are configuration rather
/// than fixed constants; `EqLayout::default()` reproduces the classic
/// ±12 dB layout and `EqLayout::wide_gain()` the ±24 dB one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqLayout {
    pub low_cut_freq: ParamRange,
    pub high_cut_freq: ParamRange,
    #[serde(default)]
    pub low_cut_slope: Slope,
    #[serde(default)]
    pub high_cut_slope: Slope,
    pub bands: [BandLayout; PEAK_BAND_COUNT],
}

impl Default for EqLayout {
    fn default() -> Self {
        Self {
            low_cut_freq: ParamRange::frequency(20.0, 20000.0, 20.0),
            high_cut_freq: ParamRange::frequency(20.0, 20000.0, 20000.0),
            low_cut_slope: Slope::Db6,
            high_cut_slope: Slope::Db6,
            bands: [
                BandLayout::new(20.0, 500.0, 250.0),
                BandLayout::new(40.0, 1000.0, 550.0),
                BandLayout::new(125.0, 8000.0, 1000.0),
                BandLayout::new(200.0, 18000.0, 12000.0),
                BandLayout::new(2000.0, 20000.0, 17000.0),
            ],
        }
    }
}

impl EqLayout {
    /// Default layout with every band's gain range set to ±`max_db`
    pub fn with_gain_range(max_db: f32) -> Self {
        let mut layout = Self::default();
        for band in &mut layout.bands {
            band.gain = ParamRange::new(-max_db, max_db, 0.5, 1.0, 0.0);
        }
        layout
    }

    /// Layout with a ±24 dB gain range on every band
    pub fn wide_gain() -> Self {
        Self::with_gain_range(24.0)
    }

    pub fn band(&self, band: Band) -> &BandLayout {
        &self.bands[band.index()]
    }

    /// Check every range for consistency
    pub fn validate(&self) -> Result<()> {
        self.low_cut_freq.validate("LowCut Freq")?;
        self.high_cut_freq.validate("HighCut Freq")?;
        for (band, layout) in Band::ALL.iter().zip(self.bands.iter()) {
            let name = band.position().name();
            layout.freq.validate(&format!("{name} Freq"))?;
            layout.gain.validate(&format!("{name} Gain"))?;
            layout.quality.validate(&format!("{name} Quality"))?;
            if layout.freq.min <= 0.0 || layout.quality.min <= 0.0 {
                return Err(EqError::InvalidConfiguration(format!(
                    "{name}: frequency and quality must stay above zero"
                )));
            }
        }
        if self.low_cut_freq.min <= 0.0 || self.high_cut_freq.min <= 0.0 {
            return Err(EqError::InvalidConfiguration(
                "cut frequencies must stay above zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Snapshot with every parameter at its default and nothing bypassed
    pub fn default_snapshot(&self) -> ParameterSnapshot {
        let mut peaks = [PeakSettings {
            freq: 0.0,
            gain_db: 0.0,
            quality: 1.0,
        }; PEAK_BAND_COUNT];
        for (peak, layout) in peaks.iter_mut().zip(self.bands.iter()) {
            *peak = PeakSettings {
                freq: layout.freq.default,
                gain_db: layout.gain.default,
                quality: layout.quality.default,
            };
        }

        ParameterSnapshot {
            peaks,
            low_cut_freq: self.low_cut_freq.default,
            high_cut_freq: self.high_cut_freq.default,
            low_cut_slope: self.low_cut_slope,
            high_cut_slope: self.high_cut_slope,
            bypassed: [false; CHAIN_LENGTH],
        }
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// One consistent read of every user-facing control
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSnapshot {
    pub peaks: [PeakSettings; PEAK_BAND_COUNT],
    pub low_cut_freq: f32,
    pub high_cut_freq: f32,
    pub low_cut_slope: Slope,
    pub high_cut_slope: Slope,
    /// Bypass flag per chain stage, indexed by `ChainPosition::index`
    pub bypassed: [bool; CHAIN_LENGTH],
}

impl Default for ParameterSnapshot {
    fn default() -> Self {
        EqLayout::default().default_snapshot()
    }
}

impl ParameterSnapshot {
    pub fn peak(&self, band: Band) -> &PeakSettings {
        &self.peaks[band.index()]
    }

    pub fn peak_mut(&mut self, band: Band) -> &mut PeakSettings {
        &mut self.peaks[band.index()]
    }

    pub fn is_bypassed(&self, position: ChainPosition) -> bool {
        self.bypassed[position.index()]
    }

    pub fn set_bypassed(&mut self, position: ChainPosition, bypassed: bool) {
        self.bypassed[position.index()] = bypassed;
    }

    /// Builder-style helper: bypass every stage except the listed ones
    pub fn with_only_active(mut self, active: &[ChainPosition]) -> Self {
        for position in ChainPosition::ALL {
            self.set_bypassed(position, !active.contains(&position));
        }
        self
    }

    /// Reject values the filter design cannot use
    ///
    /// Range checks against the layout are the parameter store's job; this
    /// only catches values that would break the math.
    pub fn validate(&self) -> Result<()> {
        for (band, peak) in Band::ALL.iter().zip(self.peaks.iter()) {
            let name = band.position().name();
            if !(peak.freq.is_finite() && peak.gain_db.is_finite() && peak.quality.is_finite()) {
                return Err(EqError::MalformedSnapshot(format!("{name}: non-finite value")));
            }
            if peak.freq <= 0.0 {
                return Err(EqError::MalformedSnapshot(format!(
                    "{name}: frequency must be positive, got {}",
                    peak.freq
                )));
            }
            if peak.quality <= 0.0 {
                return Err(EqError::MalformedSnapshot(format!(
                    "{name}: quality must be positive, got {}",
                    peak.quality
                )));
            }
        }
        for (name, freq) in [("LowCut", self.low_cut_freq), ("HighCut", self.high_cut_freq)] {
            if !freq.is_finite() || freq <= 0.0 {
                return Err(EqError::MalformedSnapshot(format!(
                    "{name}: frequency must be positive and finite, got {freq}"
                )));
            }
        }
        Ok(())
    }
}
