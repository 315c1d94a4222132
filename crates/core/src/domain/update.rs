//! Coefficient sets and the install protocol
//!
//! `ChainCoefficients::design` turns a snapshot into every coefficient the
//! chain needs. It runs wherever it is convenient (control thread or the
//! audio thread at block start) and produces a plain `Copy` value, so the
//! audio thread never allocates while installing it.

use crate::domain::chain::{ChainPosition, ChannelChain};
use crate::domain::dsp::{butterworth, db_to_gain, validate_sample_rate, BiquadCoeffs, CutCoefficients, CutType};
use crate::domain::error::Result;
use crate::domain::params::{Band, ParameterSnapshot, PEAK_BAND_COUNT};

/// Complete coefficient set for one channel chain at one sample rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainCoefficients {
    sample_rate: f64,
    peaks: [BiquadCoeffs; PEAK_BAND_COUNT],
    low_cut: CutCoefficients,
    high_cut: CutCoefficients,
    snapshot: ParameterSnapshot,
}

impl ChainCoefficients {
    /// Design every stage from a snapshot
    ///
    /// The snapshot is validated first; nothing is returned for a
    /// malformed one, so a caller can never install a partial update.
    pub fn design(snapshot: &ParameterSnapshot, sample_rate: f64) -> Result<Self> {
        let sample_rate = validate_sample_rate(sample_rate)?;
        snapshot.validate()?;

        let mut peaks = [BiquadCoeffs::default(); PEAK_BAND_COUNT];
        for (band, coeffs) in Band::ALL.iter().zip(peaks.iter_mut()) {
            let settings = snapshot.peak(*band);
            *coeffs = BiquadCoeffs::peak(
                sample_rate,
                f64::from(settings.freq),
                f64::from(settings.quality),
                db_to_gain(f64::from(settings.gain_db)),
            )?;
        }

        let low_cut = butterworth(
            CutType::HighPass,
            f64::from(snapshot.low_cut_freq),
            sample_rate,
            snapshot.low_cut_slope.sections(),
        )?;
        let high_cut = butterworth(
            CutType::LowPass,
            f64::from(snapshot.high_cut_freq),
            sample_rate,
            snapshot.high_cut_slope.sections(),
        )?;

        Ok(Self {
            sample_rate,
            peaks,
            low_cut,
            high_cut,
            snapshot: *snapshot,
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn peak(&self, band: Band) -> &BiquadCoeffs {
        &self.peaks[band.index()]
    }

    pub fn low_cut(&self) -> &CutCoefficients {
        &self.low_cut
    }

    pub fn high_cut(&self) -> &CutCoefficients {
        &self.high_cut
    }

    /// Snapshot this set was designed from
    pub fn snapshot(&self) -> &ParameterSnapshot {
        &self.snapshot
    }

    pub fn is_bypassed(&self, position: ChainPosition) -> bool {
        self.snapshot.is_bypassed(position)
    }

    /// Magnitude response in dB of the chain this set would produce
    ///
    /// Matches `ChannelChain::magnitude_response_db` after `install`, which
    /// lets a UI thread plot the curve without touching the audio chains.
    pub fn magnitude_response_db(&self, freq: f64) -> f64 {
        let cut_db = |cut: &CutCoefficients| -> f64 {
            cut.as_slice()
                .iter()
                .map(|section| section.magnitude_db(freq, self.sample_rate))
                .sum()
        };

        ChainPosition::ALL
            .iter()
            .filter(|position| !self.is_bypassed(**position))
            .map(|position| match position {
                ChainPosition::LowCut => cut_db(&self.low_cut),
                ChainPosition::HighCut => cut_db(&self.high_cut),
                ChainPosition::LowPeak => self.peaks[0].magnitude_db(freq, self.sample_rate),
                ChainPosition::MidLowPeak => self.peaks[1].magnitude_db(freq, self.sample_rate),
                ChainPosition::MidPeak => self.peaks[2].magnitude_db(freq, self.sample_rate),
                ChainPosition::MidHighPeak => self.peaks[3].magnitude_db(freq, self.sample_rate),
                ChainPosition::HighPeak => self.peaks[4].magnitude_db(freq, self.sample_rate),
            })
            .sum()
    }
}

impl ChannelChain {
    /// Install a designed coefficient set
    ///
    /// Bypass flags are copied from the set. Peak coefficients are written
    /// whether or not the stage is bypassed, so un-bypassing later takes
    /// effect immediately. Cut banks bypass every section before the new
    /// order's leading sections are activated. Delay lines are kept.
    pub fn install(&mut self, coefficients: &ChainCoefficients) {
        for position in ChainPosition::ALL {
            let bypassed = coefficients.is_bypassed(position);
            let stage = self.stage_mut(position);
            stage.set_bypassed(bypassed);

            match position {
                ChainPosition::LowCut => {
                    if let Some(bank) = stage.as_cut_mut() {
                        bank.install(&coefficients.low_cut);
                    }
                }
                ChainPosition::HighCut => {
                    if let Some(bank) = stage.as_cut_mut() {
                        bank.install(&coefficients.high_cut);
                    }
                }
                _ => {
                    if let (Some(filter), Some(band)) = (stage.as_peak_mut(), band_at(position)) {
                        filter.set_coeffs(coefficients.peaks[band.index()]);
                    }
                }
            }
        }
    }

    /// Design and install in one step
    ///
    /// On error the chain is left untouched.
    pub fn update(&mut self, snapshot: &ParameterSnapshot, sample_rate: f64) -> Result<()> {
        let coefficients = ChainCoefficients::design(snapshot, sample_rate)?;
        self.install(&coefficients);
        Ok(())
    }
}

fn band_at(position: ChainPosition) -> Option<Band> {
    Band::ALL.iter().copied().find(|band| band.position() == position)
}
