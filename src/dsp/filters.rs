//! Butterworth low-pass built from cascaded biquad sections
//!
//! Section coefficients come from the `biquad` crate's RBJ low-pass, which is the
//! bilinear transform of a two-pole prototype prewarped at the cutoff. Feeding it the
//! Butterworth pole-pair Q values gives the same response as a classic
//! `butter(N, fc, fs)` design. Odd orders add one first-order section.

use super::DecodeError;
use biquad::{Biquad, Coefficients, DirectForm2Transposed, Hertz, Type};
use num_complex::Complex;
use std::f64::consts::PI;

/// Step-response deviation considered settled
pub const SETTLING_TOLERANCE: f64 = 1e-3;

/// Longest step response searched when measuring settling, in seconds of input
pub const MAX_SETTLING_S: f64 = 1.0;

/// Causal Butterworth low-pass filter
#[derive(Clone)]
pub struct ButterworthLowpass {
    order: usize,
    cutoff_hz: f64,
    sample_rate_hz: f64,
    sections: Vec<Coefficients<f64>>,
}

impl ButterworthLowpass {
    /// Design a low-pass of the given order
    ///
    /// # Arguments
    /// * `order` - Filter order (number of poles), at least 1
    /// * `cutoff_hz` - -3 dB frequency, strictly inside (0, sample_rate / 2)
    /// * `sample_rate_hz` - Rate of the signal the filter will run on
    pub fn design(order: usize, cutoff_hz: f64, sample_rate_hz: f64) -> Result<Self, DecodeError> {
        if order == 0 {
            return Err(DecodeError::InvalidOrder);
        }
        let nyquist_hz = sample_rate_hz / 2.0;
        if !(cutoff_hz > 0.0 && cutoff_hz < nyquist_hz) {
            return Err(DecodeError::InvalidCutoff {
                cutoff_hz,
                nyquist_hz,
            });
        }

        let fs = Hertz::<f64>::from_hz(sample_rate_hz)
            .map_err(|e| DecodeError::FilterDesign(format!("{:?}", e)))?;
        let f0 = Hertz::<f64>::from_hz(cutoff_hz)
            .map_err(|e| DecodeError::FilterDesign(format!("{:?}", e)))?;

        let mut sections = Vec::with_capacity((order + 1) / 2);
        for q in butterworth_q_values(order) {
            let coeffs = Coefficients::<f64>::from_params(Type::LowPass, fs, f0, q)
                .map_err(|e| DecodeError::FilterDesign(format!("{:?}", e)))?;
            sections.push(coeffs);
        }
        if order % 2 == 1 {
            sections.push(first_order_lowpass(cutoff_hz, sample_rate_hz));
        }

        log::debug!(
            "Designed order-{} Butterworth low-pass at {} Hz (fs = {} Hz, {} sections)",
            order,
            cutoff_hz,
            sample_rate_hz,
            sections.len()
        );

        Ok(Self {
            order,
            cutoff_hz,
            sample_rate_hz,
            sections,
        })
    }

    /// Filter a sequence in place, starting from rest
    pub fn filter(&self, samples: &mut [f64]) {
        let mut stages = self.stages();
        for sample in samples.iter_mut() {
            *sample = run_cascade(&mut stages, *sample);
        }
    }

    /// Number of input samples before the unit-step response stays within `tolerance` of 1
    ///
    /// The search stops after `MAX_SETTLING_S` of input; a response still outside the
    /// tolerance there is an error.
    pub fn settling_samples(&self, tolerance: f64) -> Result<usize, DecodeError> {
        let limit = self.settling_search_limit();
        let mut stages = self.stages();
        let mut last_outside = None;

        for n in 0..limit {
            let y = run_cascade(&mut stages, 1.0);
            // NaN counts as unsettled
            let settled = (y - 1.0).abs() <= tolerance;
            if !settled {
                last_outside = Some(n);
            }
        }

        match last_outside {
            Some(n) if n + 1 == limit => Err(DecodeError::Unsettled {
                tolerance,
                samples: limit,
            }),
            Some(n) => Ok(n + 1),
            None => Ok(0),
        }
    }

    /// Magnitude of the frequency response at `freq_hz`
    pub fn magnitude_at(&self, freq_hz: f64) -> f64 {
        let w = 2.0 * PI * freq_hz / self.sample_rate_hz;
        let z1 = Complex::from_polar(1.0, -w);
        let z2 = z1 * z1;

        self.sections
            .iter()
            .map(|c| {
                let num = c.b0 + z1 * c.b1 + z2 * c.b2;
                let den = 1.0 + z1 * c.a1 + z2 * c.a2;
                (num / den).norm()
            })
            .product()
    }

    #[cfg(test)]
    pub fn num_sections(&self) -> usize {
        self.sections.len()
    }

    fn stages(&self) -> Vec<DirectForm2Transposed<f64>> {
        self.sections
            .iter()
            .map(|&c| DirectForm2Transposed::<f64>::new(c))
            .collect()
    }

    // Butterworth step responses settle within a few cutoff periods per pole
    fn settling_search_limit(&self) -> usize {
        let period = self.sample_rate_hz / self.cutoff_hz;
        let estimate = (period * 10.0 * self.order as f64).ceil();
        let cap = (self.sample_rate_hz * MAX_SETTLING_S).ceil();
        (estimate.min(cap) as usize).max(64)
    }
}

fn run_cascade(stages: &mut [DirectForm2Transposed<f64>], input: f64) -> f64 {
    stages.iter_mut().fold(input, |x, stage| stage.run(x))
}

/// Q of each conjugate pole pair of an order-`order` Butterworth prototype
fn butterworth_q_values(order: usize) -> Vec<f64> {
    let n = order as f64;
    (0..order / 2)
        .map(|m| {
            // Angle of the pole pair measured from the negative real axis
            let psi = PI * (n - 1.0 - 2.0 * m as f64) / (2.0 * n);
            1.0 / (2.0 * psi.cos())
        })
        .collect()
}

/// Bilinear-transformed single real pole, prewarped at the cutoff
fn first_order_lowpass(cutoff_hz: f64, sample_rate_hz: f64) -> Coefficients<f64> {
    let k = (PI * cutoff_hz / sample_rate_hz).tan();
    let norm = 1.0 / (1.0 + k);
    Coefficients {
        a1: (k - 1.0) * norm,
        a2: 0.0,
        b0: k * norm,
        b1: k * norm,
        b2: 0.0,
    }
}
