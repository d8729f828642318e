//! Entrainment polynomial β(ω)
//!
//! The modified Hopf oscillator splits each cycle into a swing and a stance
//! half whose durations are set by a duty factor β that depends on the
//! commanded angular frequency. The dependence is a piecewise-linear curve
//! (three descending ramps separated by plateaus) approximated once by a
//! least-squares polynomial:
//!
//! ```text
//!  β
//! 0.90 ┤╲
//! 0.75 ┤ ╲______
//! 0.50 ┤        ╲______
//! 0.25 ┤               ╲______
//!      └─┬──┬───┬──┬───┬──┬──── ω
//!        t0 t1  t2 t3  t4 t5  t6
//! ```
//!
//! Coefficients are stored highest degree first and evaluated at |ω|.
//! Outside `[0, t6)` the polynomial extrapolates; accuracy there is not
//! guaranteed and callers clamp the result (see `oscillator`).

use std::collections::HashMap;
use std::path::Path;

use candle_core::{Device, Tensor};
use nalgebra::{DMatrix, DVector};
use ndarray::Array1;

use crate::config::{OscillatorConfig, NUM_THRESHOLDS};
use crate::error::CpgError;
use crate::CpgResult;

/// β values at the seven breakpoints
pub const BETA_ANCHORS: [f64; NUM_THRESHOLDS] = [0.9, 0.75, 0.75, 0.5, 0.5, 0.25, 0.25];

const COEFFICIENTS_KEY: &str = "coefficients";

/// Fitted β(ω) approximation
#[derive(Debug, Clone, PartialEq)]
pub struct EntrainmentPolynomial {
    /// Power-basis coefficients, highest degree first
    coefficients: Vec<f64>,
}

impl EntrainmentPolynomial {
    /// Fit a `degree`-order polynomial to the target curve sampled every
    /// `sampling_step` over `[0, thresholds[6])`.
    pub fn fit(thresholds: &[f64], degree: usize, sampling_step: f64) -> CpgResult<Self> {
        let (xs, ys) = sample_target_curve(thresholds, sampling_step)?;
        if degree == 0 || xs.len() <= degree {
            return Err(CpgError::config(format!(
                "cannot fit degree {} to {} samples",
                degree,
                xs.len()
            )));
        }

        // Fit in u = x / scale with unit-norm columns, then map back.
        let scale = thresholds[NUM_THRESHOLDS - 1];
        let n_coef = degree + 1;
        let mut vander = DMatrix::<f64>::zeros(xs.len(), n_coef);
        for (row, &x) in xs.iter().enumerate() {
            let u = x / scale;
            for col in 0..n_coef {
                vander[(row, col)] = u.powi((degree - col) as i32);
            }
        }
        let mut col_norms = Vec::with_capacity(n_coef);
        for col in 0..n_coef {
            let norm = vander.column(col).norm();
            let norm = if norm > 0.0 { norm } else { 1.0 };
            vander.column_mut(col).scale_mut(1.0 / norm);
            col_norms.push(norm);
        }

        let target = DVector::from_vec(ys);
        let svd = vander.svd(true, true);
        let sigma_max = svd.singular_values.max();
        let rcond = xs.len() as f64 * f64::EPSILON * sigma_max;
        let solution = svd
            .solve(&target, rcond)
            .map_err(|e| CpgError::Configuration(format!("entrainment fit failed: {}", e)))?;

        let coefficients: Vec<f64> = (0..n_coef)
            .map(|col| {
                let power = (degree - col) as i32;
                solution[col] / col_norms[col] / scale.powi(power)
            })
            .collect();

        let poly = Self::from_coefficients(coefficients)?;
        log::debug!(
            "fitted degree-{} entrainment polynomial on {} samples, max residual {:.5}",
            degree,
            xs.len(),
            poly.max_residual(thresholds, sampling_step)?
        );
        Ok(poly)
    }

    /// Fit using the thresholds, degree and step of an oscillator config
    pub fn from_config(config: &OscillatorConfig) -> CpgResult<Self> {
        config.validate()?;
        Self::fit(&config.thresholds, config.degree, config.sampling_step)
    }

    /// Wrap precomputed coefficients (highest degree first)
    pub fn from_coefficients(coefficients: Vec<f64>) -> CpgResult<Self> {
        if coefficients.is_empty() {
            return Err(CpgError::config("polynomial needs at least one coefficient"));
        }
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(CpgError::numerical("entrainment_coefficients"));
        }
        Ok(Self { coefficients })
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    /// β(|ω|) by Horner's rule
    #[inline]
    pub fn evaluate(&self, omega: f64) -> f64 {
        let x = omega.abs();
        self.coefficients.iter().fold(0.0, |acc, &c| acc * x + c)
    }

    /// Elementwise β over a batch of frequencies
    pub fn evaluate_array(&self, omega: &Array1<f64>) -> Array1<f64> {
        omega.mapv(|w| self.evaluate(w))
    }

    /// Sampled piecewise target the fit is made against
    pub fn target_curve(thresholds: &[f64], step: f64) -> CpgResult<(Vec<f64>, Vec<f64>)> {
        sample_target_curve(thresholds, step)
    }

    /// Largest absolute deviation from the sampled target curve
    pub fn max_residual(&self, thresholds: &[f64], sampling_step: f64) -> CpgResult<f64> {
        let (xs, ys) = sample_target_curve(thresholds, sampling_step)?;
        Ok(xs
            .iter()
            .zip(ys.iter())
            .map(|(&x, &y)| (self.evaluate(x) - y).abs())
            .fold(0.0, f64::max))
    }

    /// Store the coefficients as a safetensors file
    pub fn save(&self, path: impl AsRef<Path>) -> CpgResult<()> {
        let path = path.as_ref();
        let tensor = Tensor::from_vec(
            self.coefficients.clone(),
            self.coefficients.len(),
            &Device::Cpu,
        )?;
        let mut tensors = HashMap::new();
        tensors.insert(COEFFICIENTS_KEY.to_string(), tensor);
        candle_core::safetensors::save(&tensors, path)
            .map_err(|e| CpgError::Serialization(format!("failed to save coefficients: {}", e)))?;
        log::info!(
            "Saved degree-{} entrainment coefficients to {:?}",
            self.degree(),
            path
        );
        Ok(())
    }

    /// Load coefficients written by [`save`](Self::save)
    pub fn load(path: impl AsRef<Path>) -> CpgResult<Self> {
        let path = path.as_ref();
        let tensors = candle_core::safetensors::load(path, &Device::Cpu)
            .map_err(|e| CpgError::Serialization(format!("failed to load coefficients: {}", e)))?;
        let tensor = tensors.get(COEFFICIENTS_KEY).ok_or_else(|| {
            CpgError::Serialization(format!("{:?} has no '{}' tensor", path, COEFFICIENTS_KEY))
        })?;
        let coefficients: Vec<f64> = tensor.flatten_all()?.to_vec1()?;
        let poly = Self::from_coefficients(coefficients)?;
        log::info!(
            "Loaded degree-{} entrainment coefficients from {:?}",
            poly.degree(),
            path
        );
        Ok(poly)
    }
}

/// Target β value at `x` for the given breakpoints
pub fn target_beta(thresholds: &[f64], x: f64) -> f64 {
    let t = thresholds;
    let y = &BETA_ANCHORS;
    let ramp = |i: usize, j: usize| y[i] + (y[j] - y[i]) / (t[j] - t[i]) * (x - t[i]);
    if x < t[1] {
        ramp(0, 1)
    } else if x < t[2] {
        y[2]
    } else if x < t[3] {
        ramp(2, 3)
    } else if x < t[4] {
        y[4]
    } else if x < t[5] {
        ramp(4, 5)
    } else {
        y[6]
    }
}

/// Sample the piecewise target on `x = 0, step, 2·step, … < thresholds[6]`
pub fn sample_target_curve(thresholds: &[f64], step: f64) -> CpgResult<(Vec<f64>, Vec<f64>)> {
    if thresholds.len() != NUM_THRESHOLDS {
        return Err(CpgError::config(format!(
            "expected {} thresholds, got {}",
            NUM_THRESHOLDS,
            thresholds.len()
        )));
    }
    if thresholds.windows(2).any(|w| w[1] <= w[0]) {
        return Err(CpgError::config("thresholds must be strictly increasing"));
    }
    if !(step > 0.0) {
        return Err(CpgError::config("sampling step must be positive"));
    }
    let end = thresholds[NUM_THRESHOLDS - 1];
    let n = (end / step).ceil() as usize;
    let xs: Vec<f64> = (0..n).map(|i| i as f64 * step).filter(|&x| x < end).collect();
    let ys = xs.iter().map(|&x| target_beta(thresholds, x)).collect();
    Ok((xs, ys))
}
