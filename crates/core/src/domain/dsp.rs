//! Biquad filters and the coefficient factory
//!
//! This module provides:
//! - `BiquadCoeffs`: one normalized second-order coefficient set
//! - Peak/bell design (RBJ cookbook) for the five parametric bands
//! - High-order Butterworth high/low-pass design split into cascaded
//!   second-order sections for the cut filters
//! - `BiquadFilter`: the stateful Direct Form I stage that runs them
//!
//! Coefficient design is pure and may run on any thread. Only the
//! per-sample path of `BiquadFilter` is meant for the audio thread.

use crate::domain::error::{EqError, Result};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Numeric limits applied before any filter design math runs
pub mod limits {
    /// Lowest frequency handed to a filter design (Hz)
    pub const MIN_FREQUENCY: f64 = 2.0;

    /// Highest usable frequency as a fraction of Nyquist
    pub const MAX_NYQUIST_RATIO: f64 = 0.999;

    /// Q is bounded away from zero to keep alpha finite
    pub const MIN_Q: f64 = 0.025;

    /// Maximum number of second-order sections in one cut filter
    pub const MAX_CUT_SECTIONS: usize = 4;

    /// Delay-line values below this magnitude are flushed to zero
    pub const DENORMAL_THRESHOLD: f64 = 1.0e-20;

    /// Floor used when converting a silent magnitude to decibels
    pub const MIN_MAGNITUDE: f64 = 1.0e-12;
}

/// Convert decibels to a linear gain factor
///
/// Kept in f64 since it feeds coefficient design directly.
#[inline]
#[must_use]
pub fn db_to_gain(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert a linear magnitude to decibels
#[inline]
#[must_use]
pub fn gain_to_db(gain: f64) -> f64 {
    20.0 * gain.max(limits::MIN_MAGNITUDE).log10()
}

/// Reject sample rates the design formulas cannot work with
///
/// A zero, negative or non-finite rate is a configuration error. It is
/// never replaced with a default.
pub fn validate_sample_rate(sample_rate: f64) -> Result<f64> {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        Ok(sample_rate)
    } else {
        Err(EqError::InvalidSampleRate(sample_rate))
    }
}

/// Clamp a design frequency into (0, Nyquist)
#[inline]
fn clamp_frequency(freq: f64, sample_rate: f64) -> f64 {
    let nyquist = sample_rate * 0.5;
    let upper = (nyquist * limits::MAX_NYQUIST_RATIO).max(limits::MIN_FREQUENCY);
    freq.clamp(limits::MIN_FREQUENCY, upper)
}

// ============================================================================
// BIQUAD COEFFICIENTS
// ============================================================================

/// Biquad filter coefficients
///
/// Transfer function `(b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`.
/// The leading denominator coefficient is normalized to 1.0. Stored in
/// double precision: narrow low-frequency bells lose their shape in f32.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadCoeffs {
    /// Numerator coefficients
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    /// Denominator coefficients (a0 is normalized to 1.0)
    pub a1: f64,
    pub a2: f64,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        // Unity gain (no filtering)
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl BiquadCoeffs {
    /// Normalize a raw `[b0, b1, b2, a0, a1, a2]` design by `a0`
    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        let inv_a0 = 1.0 / a0;
        Self {
            b0: b0 * inv_a0,
            b1: b1 * inv_a0,
            b2: b2 * inv_a0,
            a1: a1 * inv_a0,
            a2: a2 * inv_a0,
        }
    }

    /// Calculate coefficients for a peaking (bell) filter
    ///
    /// Boosts or cuts frequencies around a center frequency.
    ///
    /// # Parameters
    /// - `sample_rate`: Audio sample rate in Hz (must be > 0)
    /// - `freq`: Center frequency in Hz, clamped into (0, Nyquist)
    /// - `q`: Bandwidth, bounded away from zero
    /// - `gain`: Linear gain factor at the center frequency
    pub fn peak(sample_rate: f64, freq: f64, q: f64, gain: f64) -> Result<Self> {
        let sample_rate = validate_sample_rate(sample_rate)?;
        if !(freq.is_finite() && q.is_finite() && gain.is_finite()) || gain <= 0.0 {
            return Err(EqError::MalformedSnapshot(format!(
                "peak design needs finite inputs and positive gain (freq={freq}, q={q}, gain={gain})"
            )));
        }

        let freq = clamp_frequency(freq, sample_rate);
        let q = q.max(limits::MIN_Q);
        let a = gain.sqrt();
        let w0 = 2.0 * PI * freq / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let c2 = -2.0 * w0.cos();

        Ok(Self::normalized(
            1.0 + alpha * a,
            c2,
            1.0 - alpha * a,
            1.0 + alpha / a,
            c2,
            1.0 - alpha / a,
        ))
    }

    /// True when every coefficient is a finite number
    pub fn is_finite(&self) -> bool {
        [self.b0, self.b1, self.b2, self.a1, self.a2]
            .iter()
            .all(|c| c.is_finite())
    }

    /// Magnitude response (linear) at `freq` for the given sample rate
    pub fn magnitude(&self, freq: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * freq / sample_rate;
        let z_inv = Complex64::from_polar(1.0, -w);
        let z_inv_2 = z_inv * z_inv;

        let num = Complex64::new(self.b0, 0.0) + z_inv * self.b1 + z_inv_2 * self.b2;
        let den = Complex64::new(1.0, 0.0) + z_inv * self.a1 + z_inv_2 * self.a2;

        if den.norm_sqr() > limits::MIN_MAGNITUDE {
            (num / den).norm()
        } else {
            0.0
        }
    }

    /// Magnitude response in dB at `freq`
    pub fn magnitude_db(&self, freq: f64, sample_rate: f64) -> f64 {
        gain_to_db(self.magnitude(freq, sample_rate))
    }
}

// ============================================================================
// BUTTERWORTH CUT DESIGN
// ============================================================================

/// Direction of a cut filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CutType {
    /// Removes content below the cutoff (the low-cut stage)
    HighPass,
    /// Removes content above the cutoff (the high-cut stage)
    LowPass,
}

/// Ordered second-order sections of one Butterworth cut design
///
/// Fixed capacity so it can be handed to the audio thread by value.
/// Only the first `order` sections are meaningful; the rest stay at unity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutCoefficients {
    sections: [BiquadCoeffs; limits::MAX_CUT_SECTIONS],
    order: usize,
}

impl CutCoefficients {
    /// Number of active second-order sections (1..=4)
    pub fn order(&self) -> usize {
        self.order
    }

    /// The active sections, in cascade order
    pub fn as_slice(&self) -> &[BiquadCoeffs] {
        &self.sections[..self.order]
    }
}

impl Default for CutCoefficients {
    fn default() -> Self {
        Self {
            sections: [BiquadCoeffs::default(); limits::MAX_CUT_SECTIONS],
            order: 1,
        }
    }
}

/// Design a Butterworth cut filter as `order` cascaded second-order sections
///
/// The analog prototype has order `2 * order`. Each conjugate pole pair at
/// angle `theta_k = pi * (2k + 1) / (2N)` becomes one section via the
/// bilinear transform with a pre-warped cutoff.
pub fn butterworth(cut_type: CutType, freq: f64, sample_rate: f64, order: usize) -> Result<CutCoefficients> {
    let sample_rate = validate_sample_rate(sample_rate)?;
    if order == 0 || order > limits::MAX_CUT_SECTIONS {
        return Err(EqError::InvalidOrder(order));
    }
    if !freq.is_finite() {
        return Err(EqError::MalformedSnapshot(format!(
            "cut frequency is not finite: {freq}"
        )));
    }

    let freq = clamp_frequency(freq, sample_rate);
    let wc = (PI * freq / sample_rate).tan();
    let wc2 = wc * wc;
    let n = 2 * order;

    let mut sections = [BiquadCoeffs::default(); limits::MAX_CUT_SECTIONS];
    for (k, section) in sections.iter_mut().take(order).enumerate() {
        let theta = PI * (2 * k + 1) as f64 / (2 * n) as f64;
        let two_sin_theta = 2.0 * theta.sin();

        let a0 = 1.0 + two_sin_theta * wc + wc2;
        let a1 = 2.0 * (wc2 - 1.0);
        let a2 = 1.0 - two_sin_theta * wc + wc2;

        *section = match cut_type {
            CutType::LowPass => BiquadCoeffs::normalized(wc2, 2.0 * wc2, wc2, a0, a1, a2),
            CutType::HighPass => BiquadCoeffs::normalized(1.0, -2.0, 1.0, a0, a1, a2),
        };
    }

    Ok(CutCoefficients { sections, order })
}

// ============================================================================
// BIQUAD FILTER
// ============================================================================

/// Stateful biquad filter using Direct Form I
///
/// Direct Form I keeps input and output history separately, so swapping
/// coefficients between blocks never reinterprets stored state. The
/// delay line runs in f64; buffers stay f32.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    // Previous input samples (x[n-1], x[n-2])
    x1: f64,
    x2: f64,
    // Previous output samples (y[n-1], y[n-2])
    y1: f64,
    y2: f64,
}

impl Default for BiquadFilter {
    fn default() -> Self {
        Self::new(BiquadCoeffs::default())
    }
}

impl BiquadFilter {
    /// Create a new biquad filter with given coefficients
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Replace the coefficient set as a single value copy
    ///
    /// Delay-line state is kept.
    #[inline]
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    /// Currently installed coefficients
    #[inline]
    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    /// Process a single sample
    #[inline]
    pub fn process_sample(&mut self, x: f64) -> f64 {
        // Direct Form I: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
        //                        - a1*y[n-1] - a2*y[n-2]
        let c = &self.coeffs;
        let mut y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;

        if y.abs() < limits::DENORMAL_THRESHOLD {
            y = 0.0;
        }

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }

    /// Process a buffer of samples in place
    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(f64::from(*sample)) as f32;
        }
    }

    /// Reset filter state
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    /// True when the delay line holds only zeros
    pub fn is_at_rest(&self) -> bool {
        self.x1 == 0.0 && self.x2 == 0.0 && self.y1 == 0.0 && self.y2 == 0.0
    }
}

// ============================================================================
// TESTS
// ============================================================================
