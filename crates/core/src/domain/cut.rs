//! Variable-order cut filter bank
//!
//! A fixed-capacity cascade of up to four second-order sections. The slope
//! chosen by the user decides how many leading sections run; the rest are
//! bypassed and skipped entirely in the per-sample path.

use crate::domain::dsp::{limits::MAX_CUT_SECTIONS, BiquadCoeffs, BiquadFilter, CutCoefficients};
use crate::domain::error::{EqError, Result};

/// Cascade of up to four biquad sections with per-section bypass
#[derive(Debug, Clone, PartialEq)]
pub struct CutFilterBank {
    sections: [BiquadFilter; MAX_CUT_SECTIONS],
    bypassed: [bool; MAX_CUT_SECTIONS],
}

impl Default for CutFilterBank {
    fn default() -> Self {
        Self::new()
    }
}

impl CutFilterBank {
    /// Create a bank with every section bypassed and unity coefficients
    pub fn new() -> Self {
        Self {
            sections: Default::default(),
            bypassed: [true; MAX_CUT_SECTIONS],
        }
    }

    /// Install `order` sections from `coefficients`
    ///
    /// Sections `0..order` get the new coefficients and are activated,
    /// sections `order..4` are bypassed. An order outside 1..=4, or fewer
    /// coefficient sets than `order`, is rejected before anything changes.
    pub fn configure(&mut self, coefficients: &[BiquadCoeffs], order: usize) -> Result<()> {
        if order == 0 || order > MAX_CUT_SECTIONS || coefficients.len() < order {
            return Err(EqError::InvalidOrder(order));
        }
        self.configure_unchecked(coefficients, order);
        Ok(())
    }

    /// Install a Butterworth design produced by the coefficient factory
    pub fn install(&mut self, cut: &CutCoefficients) {
        self.configure_unchecked(cut.as_slice(), cut.order());
    }

    fn configure_unchecked(&mut self, coefficients: &[BiquadCoeffs], order: usize) {
        // Bypass first so no section is ever active with coefficients
        // belonging to a previous slope.
        self.bypassed = [true; MAX_CUT_SECTIONS];

        for (index, coeffs) in coefficients.iter().take(order).enumerate() {
            self.sections[index].set_coeffs(*coeffs);
            self.bypassed[index] = false;
        }
    }

    /// Number of sections currently running
    pub fn active_sections(&self) -> usize {
        self.bypassed.iter().filter(|&&b| !b).count()
    }

    /// Check whether a section is bypassed (out-of-range indices read as bypassed)
    pub fn is_section_bypassed(&self, index: usize) -> bool {
        self.bypassed.get(index).copied().unwrap_or(true)
    }

    /// Coefficients installed in a section, bypassed or not
    pub fn section_coeffs(&self, index: usize) -> Option<&BiquadCoeffs> {
        self.sections.get(index).map(BiquadFilter::coeffs)
    }

    /// Run one sample through the active sections in order
    #[inline]
    pub fn process_sample(&mut self, x: f64) -> f64 {
        let mut y = x;
        for (section, &bypassed) in self.sections.iter_mut().zip(self.bypassed.iter()) {
            if !bypassed {
                y = section.process_sample(y);
            }
        }
        y
    }

    /// Process a buffer of samples in place
    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(f64::from(*sample)) as f32;
        }
    }

    /// Clear the delay lines of every section
    pub fn reset(&mut self) {
        for section in &mut self.sections {
            section.reset();
        }
    }

    /// Summed magnitude response of the active sections in dB
    pub fn magnitude_db(&self, freq: f64, sample_rate: f64) -> f64 {
        self.sections
            .iter()
            .zip(self.bypassed.iter())
            .filter(|(_, &bypassed)| !bypassed)
            .map(|(section, _)| section.coeffs().magnitude_db(freq, sample_rate))
            .sum()
    }

    /// True when every section's delay line is at rest
    pub fn is_at_rest(&self) -> bool {
        self.sections.iter().all(BiquadFilter::is_at_rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dsp::{butterworth, CutType};

    const SAMPLE_RATE: f64 = 48000.0;

    fn design(order: usize) -> CutCoefficients {
        butterworth(CutType::HighPass, 1000.0, SAMPLE_RATE, order).unwrap()
    }

    #[test]
    fn test_new_bank_is_fully_bypassed() {
        let bank = CutFilterBank::new();
        assert_eq!(bank.active_sections(), 0);
        assert_eq!(bank.magnitude_db(100.0, SAMPLE_RATE), 0.0);
    }

    #[test]
    fn test_configure_activates_leading_sections() {
        for order in 1..=4 {
            let mut bank = CutFilterBank::new();
            let cut = design(order);
            bank.configure(cut.as_slice(), order).unwrap();

            assert_eq!(bank.active_sections(), order);
            for index in 0..MAX_CUT_SECTIONS {
                assert_eq!(bank.is_section_bypassed(index), index >= order);
            }
            for (index, coeffs) in cut.as_slice().iter().enumerate() {
                assert_eq!(bank.section_coeffs(index), Some(coeffs));
            }
        }
    }

    #[test]
    fn test_configure_rejects_invalid_order() {
        let mut bank = CutFilterBank::new();
        bank.install(&design(2));
        let before = bank.clone();

        let four = design(4);
        assert!(matches!(bank.configure(four.as_slice(), 0), Err(EqError::InvalidOrder(0))));
        assert!(matches!(bank.configure(four.as_slice(), 5), Err(EqError::InvalidOrder(5))));
        // Fewer coefficient sets than requested sections
        assert!(matches!(
            bank.configure(&four.as_slice()[..2], 3),
            Err(EqError::InvalidOrder(3))
        ));

        assert_eq!(bank, before);
    }

    #[test]
    fn test_lowering_order_bypasses_tail_sections() {
        let mut bank = CutFilterBank::new();
        bank.install(&design(4));
        assert_eq!(bank.active_sections(), 4);

        bank.install(&design(1));
        assert_eq!(bank.active_sections(), 1);
        assert!(bank.is_section_bypassed(1));
        assert!(bank.is_section_bypassed(2));
        assert!(bank.is_section_bypassed(3));
    }

    #[test]
    fn test_bypassed_sections_keep_their_state() {
        let mut bank = CutFilterBank::new();
        bank.install(&design(2));
        bank.process(&mut [0.25, -0.5, 1.0, 0.75]);

        let section_one = bank.sections[1].clone();
        bank.install(&design(1));
        bank.process(&mut [0.3; 64]);

        // Section 1 was skipped, so its delay line did not move
        assert_eq!(bank.sections[1], section_one);
    }

    #[test]
    fn test_fully_bypassed_bank_is_identity() {
        let mut bank = CutFilterBank::new();
        let input = vec![0.1, -0.7, 0.33, 0.9];
        let mut output = input.clone();
        bank.process(&mut output);
        assert_eq!(input, output);
        assert!(bank.is_at_rest());
    }

    #[test]
    fn test_magnitude_grows_with_order() {
        let mut previous = 0.0;
        for order in 1..=4 {
            let mut bank = CutFilterBank::new();
            bank.install(&design(order));
            let db = bank.magnitude_db(500.0, SAMPLE_RATE);
            assert!(db < previous);
            previous = db;
        }
    }

    #[test]
    fn test_reset_clears_every_section() {
        let mut bank = CutFilterBank::new();
        bank.install(&design(4));
        bank.process(&mut [1.0; 32]);
        assert!(!bank.is_at_rest());

        bank.reset();
        assert!(bank.is_at_rest());
    }
}
