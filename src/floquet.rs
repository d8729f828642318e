//! Floquet analysis of the modified Hopf oscillator
//!
//! Linearising the flow around a trajectory z(t) gives the variational
//! equation
//!
//! ```text
//!   dΦ/dt = J(z(t))·Φ,   Φ(0) = I
//! ```
//!
//! Over one period T, Φ(T) is the monodromy matrix M. Its eigenvalues ρ
//! are the Floquet multipliers, κ = ln(ρ)/T the exponents, and the left
//! eigenvectors v (v^H·M = ρ·v^H) seed the isostable response
//!
//! ```text
//!   Z(t) = (Φ(t)·e^{−κt})^{−H}·v
//! ```
//!
//! Everything is integrated with explicit Euler and is first-order
//! accurate in `dt`. Multi-leg states use the interleaved layout
//! `[x₀, y₀, x₁, y₁, …]` so the Jacobian is block-diagonal.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::error::CpgError;
use crate::oscillator::{
    swing_stance_selector, ModifiedHopfOscillator, OscillatorState, RateTerms, SELECTOR_SHARPNESS,
};
use crate::CpgResult;

/// Autonomous vector field with an analytic Jacobian
pub trait VectorField {
    fn dim(&self) -> usize;
    fn eval(&self, state: &DVector<f64>) -> DVector<f64>;
    fn jacobian(&self, state: &DVector<f64>) -> DMatrix<f64>;
}

/// Constant-Jacobian field ż = A·z
#[derive(Debug, Clone, PartialEq)]
pub struct LinearField {
    matrix: DMatrix<f64>,
}

impl LinearField {
    pub fn new(matrix: DMatrix<f64>) -> CpgResult<Self> {
        if !matrix.is_square() {
            return Err(CpgError::DimensionMismatch {
                expected: matrix.nrows(),
                got: matrix.ncols(),
            });
        }
        Ok(Self { matrix })
    }
}

impl VectorField for LinearField {
    fn dim(&self) -> usize {
        self.matrix.nrows()
    }

    fn eval(&self, state: &DVector<f64>) -> DVector<f64> {
        &self.matrix * state
    }

    fn jacobian(&self, _state: &DVector<f64>) -> DMatrix<f64> {
        self.matrix.clone()
    }
}

/// Modified Hopf field for a fixed command (ω, μ) per leg
///
/// β(ω) is evaluated once at construction, so stability warnings are
/// recorded there and not on every Jacobian evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifiedHopfField {
    omega: Vec<f64>,
    mu: Vec<f64>,
    terms: Vec<RateTerms>,
    phase_rate_scale: f64,
    radius_gain: f64,
    radius_saturation: f64,
}

impl ModifiedHopfField {
    pub fn new(oscillator: &ModifiedHopfOscillator, omega: &[f64], mu: &[f64]) -> CpgResult<Self> {
        if omega.len() != mu.len() {
            return Err(CpgError::DimensionMismatch {
                expected: omega.len(),
                got: mu.len(),
            });
        }
        if omega.is_empty() {
            return Err(CpgError::config("floquet field needs at least one leg"));
        }
        if omega.iter().chain(mu.iter()).any(|v| !v.is_finite()) {
            return Err(CpgError::numerical("floquet_command"));
        }
        Ok(Self {
            omega: omega.to_vec(),
            mu: mu.to_vec(),
            terms: omega.iter().map(|&w| oscillator.rate_terms(w)).collect(),
            phase_rate_scale: oscillator.phase_rate_scale(),
            radius_gain: oscillator.radius_gain(),
            radius_saturation: oscillator.radius_saturation(),
        })
    }

    pub fn num_legs(&self) -> usize {
        self.omega.len()
    }

    /// Common period π/(α|ω|) of all legs, taken from the first leg
    ///
    /// Infinite when the first leg is at rest.
    pub fn period(&self) -> f64 {
        std::f64::consts::PI / (self.phase_rate_scale * self.omega[0].abs())
    }

    /// Interleave an oscillator state into `[x₀, y₀, x₁, y₁, …]`
    pub fn state_vector(state: &OscillatorState) -> DVector<f64> {
        DVector::from_iterator(
            2 * state.len(),
            state.x.iter().zip(state.y.iter()).flat_map(|(&x, &y)| [x, y]),
        )
    }

    /// Inverse of [`state_vector`](Self::state_vector)
    pub fn to_state(vector: &DVector<f64>) -> CpgResult<OscillatorState> {
        if vector.len() % 2 != 0 {
            return Err(CpgError::DimensionMismatch {
                expected: vector.len() + 1,
                got: vector.len(),
            });
        }
        let x = vector.iter().step_by(2).copied().collect();
        let y = vector.iter().skip(1).step_by(2).copied().collect();
        OscillatorState::new(x, y)
    }

    fn rate(&self, leg: usize, phi: f64) -> f64 {
        let t = &self.terms[leg];
        self.omega[leg].abs() * (t.mean + t.amplitude * swing_stance_selector(phi)) * self.phase_rate_scale
    }

    /// Exact 2×2 Jacobian of one leg at (x, y)
    pub fn leg_jacobian(&self, leg: usize, x: f64, y: f64) -> [[f64; 2]; 2] {
        let lam = self.radius_gain;
        let b = self.radius_saturation;
        let r2 = x * x + y * y;
        let phi = y.atan2(x);
        let g = lam * (self.mu[leg] - b * r2);
        let w = self.rate(leg, phi);

        // ∂w/∂φ through tanh(kφ), then ∂φ/∂x = −y/r², ∂φ/∂y = x/r²
        let (w_x, w_y) = if r2 > 0.0 {
            let sel = swing_stance_selector(phi);
            let dw_dphi = self.omega[leg].abs()
                * self.phase_rate_scale
                * self.terms[leg].amplitude
                * SELECTOR_SHARPNESS
                * (1.0 - sel * sel);
            (-dw_dphi * y / r2, dw_dphi * x / r2)
        } else {
            (0.0, 0.0)
        };

        [
            [
                g - 2.0 * lam * b * x * x - y * w_x,
                -2.0 * lam * b * x * y - w - y * w_y,
            ],
            [
                -2.0 * lam * b * x * y + w + x * w_x,
                g - 2.0 * lam * b * y * y + x * w_y,
            ],
        ]
    }
}

impl VectorField for ModifiedHopfField {
    fn dim(&self) -> usize {
        2 * self.omega.len()
    }

    fn eval(&self, state: &DVector<f64>) -> DVector<f64> {
        let mut out = DVector::zeros(state.len());
        for leg in 0..self.num_legs() {
            let (x, y) = (state[2 * leg], state[2 * leg + 1]);
            let g = self.radius_gain * (self.mu[leg] - self.radius_saturation * (x * x + y * y));
            let w = self.rate(leg, y.atan2(x));
            out[2 * leg] = g * x - w * y;
            out[2 * leg + 1] = g * y + w * x;
        }
        out
    }

    fn jacobian(&self, state: &DVector<f64>) -> DMatrix<f64> {
        let n = self.dim();
        let mut jac = DMatrix::zeros(n, n);
        for leg in 0..self.num_legs() {
            let block = self.leg_jacobian(leg, state[2 * leg], state[2 * leg + 1]);
            for (i, row) in block.iter().enumerate() {
                for (j, &v) in row.iter().enumerate() {
                    jac[(2 * leg + i, 2 * leg + j)] = v;
                }
            }
        }
        jac
    }
}

/// Multipliers, exponents and left eigenvectors of one monodromy matrix
#[derive(Debug, Clone)]
pub struct FloquetSpectrum {
    pub period: f64,
    pub monodromy: DMatrix<f64>,
    /// Eigenvalues ρ of the monodromy matrix
    pub multipliers: Vec<Complex64>,
    /// ln(ρ)/T, ascending by real part
    pub exponents: Vec<Complex64>,
    /// Unit left eigenvectors, in the order of `exponents`
    pub left_eigenvectors: Vec<DVector<Complex64>>,
}

impl FloquetSpectrum {
    /// Most strongly contracting mode: (κ, v)
    pub fn slowest_isostable(&self) -> (Complex64, &DVector<Complex64>) {
        (self.exponents[0], &self.left_eigenvectors[0])
    }
}

/// Variational analysis of a vector field with a fixed Euler step
#[derive(Debug, Clone)]
pub struct FloquetAnalyzer<F> {
    field: F,
    dt: f64,
}

impl<F: VectorField> FloquetAnalyzer<F> {
    pub fn new(field: F, dt: f64) -> CpgResult<Self> {
        if !(dt > 0.0) {
            return Err(CpgError::config("integration step must be positive"));
        }
        Ok(Self { field, dt })
    }

    pub fn field(&self) -> &F {
        &self.field
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    fn check_state(&self, state: &DVector<f64>) -> CpgResult<()> {
        if state.len() != self.field.dim() {
            return Err(CpgError::DimensionMismatch {
                expected: self.field.dim(),
                got: state.len(),
            });
        }
        if state.iter().any(|v| !v.is_finite()) {
            return Err(CpgError::numerical("floquet_state"));
        }
        Ok(())
    }

    pub fn jacobian(&self, state: &DVector<f64>) -> CpgResult<DMatrix<f64>> {
        self.check_state(state)?;
        Ok(self.field.jacobian(state))
    }

    /// Number of Euler steps used for horizon `t`
    pub fn steps_for(&self, t: f64) -> usize {
        // tolerate t being a float multiple of dt
        (t / self.dt + 1e-9).floor() as usize
    }

    /// Fundamental matrix Φ(t) along the trajectory starting at `initial`
    pub fn monodromy(&self, t: f64, initial: &DVector<f64>) -> CpgResult<DMatrix<f64>> {
        if !(t >= 0.0) || !t.is_finite() {
            return Err(CpgError::config(format!(
                "horizon must be finite and non-negative, got {}",
                t
            )));
        }
        self.check_state(initial)?;
        let n = self.field.dim();
        let mut phi = DMatrix::<f64>::identity(n, n);
        let mut z = initial.clone();
        for _ in 0..self.steps_for(t) {
            let jac = self.field.jacobian(&z);
            phi += (&jac * &phi) * self.dt;
            z += self.field.eval(&z) * self.dt;
        }
        if phi.iter().any(|v| !v.is_finite()) {
            return Err(CpgError::numerical("fundamental_matrix"));
        }
        Ok(phi)
    }

    /// Monodromy over `period` and its eigen-decomposition
    pub fn spectrum(&self, period: f64, initial: &DVector<f64>) -> CpgResult<FloquetSpectrum> {
        if !(period > 0.0) || !period.is_finite() {
            return Err(CpgError::config(format!(
                "period must be finite and positive, got {}",
                period
            )));
        }
        let monodromy = self.monodromy(period, initial)?;
        let multipliers: Vec<Complex64> = monodromy.complex_eigenvalues().iter().copied().collect();
        let exponents = floquet_exponents(&multipliers, period)?;

        let mut order: Vec<usize> = (0..multipliers.len()).collect();
        order.sort_by(|&a, &b| {
            exponents[a]
                .re
                .partial_cmp(&exponents[b].re)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let multipliers: Vec<Complex64> = order.iter().map(|&i| multipliers[i]).collect();
        let exponents: Vec<Complex64> = order.iter().map(|&i| exponents[i]).collect();
        let left = left_eigenvectors(&monodromy, &multipliers)?;

        log::debug!(
            "floquet spectrum over T = {:.4}: exponents {:?}",
            period,
            exponents
        );
        Ok(FloquetSpectrum {
            period,
            monodromy,
            multipliers,
            exponents,
            left_eigenvectors: left,
        })
    }

    /// Isostable response Z(t) for exponent `kappa` and left eigenvector `v`
    pub fn isostable_response(
        &self,
        t: f64,
        initial: &DVector<f64>,
        kappa: Complex64,
        v: &DVector<Complex64>,
    ) -> CpgResult<DVector<Complex64>> {
        let phi = self.monodromy(t, initial)?;
        isostable_from_fundamental(&phi, t, kappa, v)
    }

    /// Input sensitivity Q at time `tau` for power budget `power`
    ///
    /// Uses the central difference of Z over ±dt. A vanishing difference
    /// yields a zero correction.
    pub fn input_sensitivity(
        &self,
        tau: f64,
        initial: &DVector<f64>,
        kappa: Complex64,
        v: &DVector<Complex64>,
        power: f64,
    ) -> CpgResult<DVector<Complex64>> {
        if tau < self.dt {
            return Err(CpgError::config(format!(
                "sensitivity needs tau >= dt ({} < {})",
                tau, self.dt
            )));
        }
        let before = self.isostable_response(tau - self.dt, initial, kappa, v)?;
        let after = self.isostable_response(tau + self.dt, initial, kappa, v)?;
        sensitivity_from_difference(&before, &after, self.dt, power)
    }

    /// Infinitesimal shape response
    pub fn infinitesimal_shape_response(&self, _theta: f64) -> CpgResult<DVector<Complex64>> {
        Err(CpgError::UnsupportedOperation(
            "infinitesimal shape response is not defined for this model".to_string(),
        ))
    }
}

impl FloquetAnalyzer<ModifiedHopfField> {
    /// Period π/(α|ω|) of the analysed oscillator
    pub fn natural_period(&self) -> f64 {
        self.field.period()
    }

    /// Point on the limit cycle at phase 0 for every leg: (√(μ/b), 0)
    pub fn cycle_origin(&self) -> DVector<f64> {
        let f = &self.field;
        let mut z = DVector::zeros(f.dim());
        for leg in 0..f.num_legs() {
            z[2 * leg] = (f.mu[leg] / f.radius_saturation).max(0.0).sqrt();
        }
        z
    }
}

/// ln(ρ)/T for every multiplier
pub fn floquet_exponents(multipliers: &[Complex64], period: f64) -> CpgResult<Vec<Complex64>> {
    let exponents: Vec<Complex64> = multipliers.iter().map(|rho| rho.ln() / period).collect();
    if exponents.iter().any(|k| !k.re.is_finite() || !k.im.is_finite()) {
        return Err(CpgError::numerical("floquet_exponents"));
    }
    Ok(exponents)
}

/// Unit vectors v with v^H·M = ρ·v^H, one per eigenvalue
pub fn left_eigenvectors(
    matrix: &DMatrix<f64>,
    eigenvalues: &[Complex64],
) -> CpgResult<Vec<DVector<Complex64>>> {
    let n = matrix.nrows();
    let adjoint = matrix.transpose().map(|x| Complex64::new(x, 0.0));
    eigenvalues
        .iter()
        .map(|rho| {
            // null vector of M^H − conj(ρ)·I
            let shifted = &adjoint - DMatrix::<Complex64>::identity(n, n) * rho.conj();
            let svd = shifted.svd(false, true);
            let v_t = svd
                .v_t
                .ok_or_else(|| CpgError::numerical("left_eigenvectors"))?;
            let k = svd
                .singular_values
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(i, _)| i)
                .unwrap_or(0);
            let v: DVector<Complex64> = v_t.row(k).transpose().map(|c| c.conj());
            let norm = v.norm();
            if !(norm > 0.0) {
                return Err(CpgError::numerical("left_eigenvectors"));
            }
            Ok(v.map(|c| c / norm))
        })
        .collect()
}

/// Z(t) = (Φ(t)·e^{−κt})^{−H}·v
pub fn isostable_from_fundamental(
    phi: &DMatrix<f64>,
    t: f64,
    kappa: Complex64,
    v: &DVector<Complex64>,
) -> CpgResult<DVector<Complex64>> {
    if v.len() != phi.nrows() {
        return Err(CpgError::DimensionMismatch {
            expected: phi.nrows(),
            got: v.len(),
        });
    }
    let scale = (-kappa * t).exp();
    let scaled = phi.map(|x| Complex64::new(x, 0.0) * scale);
    let inverse = scaled
        .try_inverse()
        .ok_or_else(|| CpgError::numerical("fundamental_matrix"))?;
    Ok(inverse.adjoint() * v)
}

/// Q = √(P/‖D‖²)·D with D = (Z(τ−dt) − Z(τ+dt))/(2dt)
pub fn sensitivity_from_difference(
    before: &DVector<Complex64>,
    after: &DVector<Complex64>,
    dt: f64,
    power: f64,
) -> CpgResult<DVector<Complex64>> {
    let diff = (before - after).map(|c| c / (2.0 * dt));
    let norm_sq = diff.norm_squared();
    if norm_sq == 0.0 {
        return Ok(diff);
    }
    let q = diff.map(|c| c * (power / norm_sq).sqrt());
    if q.iter().any(|c| !c.re.is_finite() || !c.im.is_finite()) {
        return Err(CpgError::numerical("input_sensitivity"));
    }
    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OscillatorConfig;
    use crate::entrainment::EntrainmentPolynomial;
    use std::sync::Arc;

    fn symmetric_oscillator() -> ModifiedHopfOscillator {
        let config = OscillatorConfig::default();
        let poly = Arc::new(EntrainmentPolynomial::from_coefficients(vec![0.5]).unwrap());
        ModifiedHopfOscillator::new(&config, poly)
    }

    fn fitted_oscillator() -> ModifiedHopfOscillator {
        let config = OscillatorConfig::default();
        let poly = Arc::new(EntrainmentPolynomial::from_config(&config).unwrap());
        ModifiedHopfOscillator::new(&config, poly)
    }

    #[test]
    fn test_jacobian_matches_finite_difference() {
        let osc = fitted_oscillator();
        let field = ModifiedHopfField::new(&osc, &[1.3], &[0.8]).unwrap();
        // away from the selector switch so the central difference resolves it
        let z = DVector::from_vec(vec![-0.4, 0.7]);
        let jac = field.jacobian(&z);
        let h = 1e-6;
        for j in 0..2 {
            let mut plus = z.clone();
            let mut minus = z.clone();
            plus[j] += h;
            minus[j] -= h;
            let col = (field.eval(&plus) - field.eval(&minus)) / (2.0 * h);
            for i in 0..2 {
                assert!(
                    (jac[(i, j)] - col[i]).abs() < 1e-5,
                    "J[{},{}] = {} vs {}",
                    i,
                    j,
                    jac[(i, j)],
                    col[i]
                );
            }
        }
    }

    #[test]
    fn test_selector_term_near_switch() {
        let osc = fitted_oscillator();
        let field = ModifiedHopfField::new(&osc, &[1.3], &[1.0]).unwrap();
        let z = DVector::from_vec(vec![1.0, 2e-4]);
        let jac = field.jacobian(&z);
        let h = 1e-8;
        let plus = DVector::from_vec(vec![1.0, 2e-4 + h]);
        let minus = DVector::from_vec(vec![1.0, 2e-4 - h]);
        let col = (field.eval(&plus) - field.eval(&minus)) / (2.0 * h);
        assert!((jac[(1, 1)] - col[1]).abs() / col[1].abs().max(1.0) < 1e-3);
    }

    #[test]
    fn test_block_diagonal_layout() {
        let osc = fitted_oscillator();
        let field = ModifiedHopfField::new(&osc, &[1.0, 2.0], &[1.0, 1.0]).unwrap();
        let z = DVector::from_vec(vec![0.3, 0.9, -0.8, -0.1]);
        let jac = field.jacobian(&z);
        assert_eq!(jac.shape(), (4, 4));
        for i in 0..2 {
            for j in 2..4 {
                assert_eq!(jac[(i, j)], 0.0);
                assert_eq!(jac[(j, i)], 0.0);
            }
        }
        let leg1 = field.leg_jacobian(1, -0.8, -0.1);
        assert_eq!(jac[(2, 3)], leg1[0][1]);
    }

    #[test]
    fn test_state_vector_roundtrip() {
        let state = OscillatorState::from_phases(&[0.1, 1.2, 2.3], 0.9);
        let v = ModifiedHopfField::state_vector(&state);
        assert_eq!(v[1], state.y[0]);
        assert_eq!(v[2], state.x[1]);
        assert_eq!(ModifiedHopfField::to_state(&v).unwrap(), state);
    }

    #[test]
    fn test_monodromy_identity_at_zero() {
        let field = LinearField::new(DMatrix::from_row_slice(2, 2, &[-1.0, 2.0, -2.0, -1.0])).unwrap();
        let analyzer = FloquetAnalyzer::new(field, 1e-3).unwrap();
        let phi = analyzer.monodromy(0.0, &DVector::from_vec(vec![1.0, 0.0])).unwrap();
        assert_eq!(phi, DMatrix::identity(2, 2));
    }

    #[test]
    fn test_monodromy_matches_matrix_exponential() {
        let a = DMatrix::from_row_slice(2, 2, &[-1.0, 2.0, -2.0, -1.0]);
        let t: f64 = 1.0;
        let decay = (-t).exp();
        let exact = DMatrix::from_row_slice(
            2,
            2,
            &[
                decay * (2.0 * t).cos(),
                decay * (2.0 * t).sin(),
                -decay * (2.0 * t).sin(),
                decay * (2.0 * t).cos(),
            ],
        );
        let z0 = DVector::from_vec(vec![1.0, 0.0]);
        let mut errors = Vec::new();
        for dt in [1e-2, 1e-3, 1e-4] {
            let analyzer = FloquetAnalyzer::new(LinearField::new(a.clone()).unwrap(), dt).unwrap();
            let phi = analyzer.monodromy(t, &z0).unwrap();
            errors.push((phi - &exact).norm());
        }
        assert!(errors[0] > errors[1] && errors[1] > errors[2], "{:?}", errors);
        assert!(errors[2] < 1e-3);
    }

    #[test]
    fn test_negative_horizon_rejected() {
        let field = LinearField::new(DMatrix::identity(2, 2)).unwrap();
        let analyzer = FloquetAnalyzer::new(field, 0.01).unwrap();
        assert!(analyzer.monodromy(-1.0, &DVector::zeros(2)).is_err());
        assert!(FloquetAnalyzer::new(LinearField::new(DMatrix::identity(2, 2)).unwrap(), 0.0).is_err());
    }

    #[test]
    fn test_resting_leg_has_no_spectrum() {
        let osc = fitted_oscillator();
        let field = ModifiedHopfField::new(&osc, &[0.0], &[1.0]).unwrap();
        let analyzer = FloquetAnalyzer::new(field, 1e-3).unwrap();
        assert!(analyzer.natural_period().is_infinite());

        let z0 = analyzer.cycle_origin();
        assert!(matches!(
            analyzer.spectrum(analyzer.natural_period(), &z0),
            Err(CpgError::Configuration(_))
        ));
        assert!(matches!(
            analyzer.monodromy(f64::INFINITY, &z0),
            Err(CpgError::Configuration(_))
        ));
        assert!(matches!(
            analyzer.monodromy(f64::NAN, &z0),
            Err(CpgError::Configuration(_))
        ));
        // finite horizons stay usable
        assert!(analyzer.monodromy(0.1, &z0).is_ok());
    }

    #[test]
    fn test_empty_command_rejected() {
        let osc = fitted_oscillator();
        assert!(matches!(
            ModifiedHopfField::new(&osc, &[], &[]),
            Err(CpgError::Configuration(_))
        ));
    }

    #[test]
    fn test_symmetric_hopf_spectrum() {
        let osc = symmetric_oscillator();
        let field = ModifiedHopfField::new(&osc, &[2.0], &[1.0]).unwrap();
        let analyzer = FloquetAnalyzer::new(field, 1e-3).unwrap();
        let period = analyzer.natural_period();
        assert!((period - std::f64::consts::PI).abs() < 1e-12);

        let spectrum = analyzer.spectrum(period, &analyzer.cycle_origin()).unwrap();
        assert_eq!(spectrum.exponents.len(), 2);
        // radial mode contracts at −2λμ, the phase mode is neutral
        assert!((spectrum.exponents[0].re + 2.0).abs() < 0.05, "{:?}", spectrum.exponents);
        assert!(spectrum.exponents[1].re.abs() < 0.01, "{:?}", spectrum.exponents);

        for (rho, v) in spectrum.multipliers.iter().zip(&spectrum.left_eigenvectors) {
            let m = spectrum.monodromy.map(|x| Complex64::new(x, 0.0));
            let lhs = m.adjoint() * v;
            let rhs = v.map(|c| c * rho.conj());
            assert!((lhs - rhs).norm() < 1e-8);
            assert!((v.norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_fitted_spectrum_is_finite_and_contracting() {
        let osc = fitted_oscillator();
        let field = ModifiedHopfField::new(&osc, &[1.5], &[1.0]).unwrap();
        let analyzer = FloquetAnalyzer::new(field, 1e-3).unwrap();
        let spectrum = analyzer
            .spectrum(analyzer.natural_period(), &analyzer.cycle_origin())
            .unwrap();
        assert!(spectrum.exponents[0].re < 0.0);
        assert!(spectrum.exponents[0].re <= spectrum.exponents[1].re);
        assert!(spectrum.multipliers.iter().all(|m| m.re.is_finite()));
    }

    #[test]
    fn test_isostable_response_at_zero_is_eigenvector() {
        let osc = symmetric_oscillator();
        let field = ModifiedHopfField::new(&osc, &[2.0], &[1.0]).unwrap();
        let analyzer = FloquetAnalyzer::new(field, 1e-3).unwrap();
        let z0 = analyzer.cycle_origin();
        let spectrum = analyzer.spectrum(analyzer.natural_period(), &z0).unwrap();
        let (kappa, v) = spectrum.slowest_isostable();
        let z = analyzer.isostable_response(0.0, &z0, kappa, v).unwrap();
        assert!((z - v).norm() < 1e-12);
    }

    #[test]
    fn test_input_sensitivity_has_requested_power() {
        let osc = symmetric_oscillator();
        let field = ModifiedHopfField::new(&osc, &[2.0], &[1.0]).unwrap();
        let analyzer = FloquetAnalyzer::new(field, 1e-3).unwrap();
        let z0 = analyzer.cycle_origin();
        let spectrum = analyzer.spectrum(analyzer.natural_period(), &z0).unwrap();
        let (kappa, v) = spectrum.slowest_isostable();
        let q = analyzer.input_sensitivity(0.5, &z0, kappa, v, 0.25).unwrap();
        assert!((q.norm_squared() - 0.25).abs() < 1e-9);
        assert!(analyzer.input_sensitivity(0.0, &z0, kappa, v, 0.25).is_err());
    }

    #[test]
    fn test_zero_difference_gives_zero_sensitivity() {
        let z = DVector::from_vec(vec![Complex64::new(1.0, 0.5), Complex64::new(0.0, 0.0)]);
        let q = sensitivity_from_difference(&z, &z, 1e-3, 1.0).unwrap();
        assert_eq!(q.norm(), 0.0);
    }

    #[test]
    fn test_shape_response_unsupported() {
        let field = LinearField::new(DMatrix::identity(2, 2)).unwrap();
        let analyzer = FloquetAnalyzer::new(field, 0.01).unwrap();
        assert!(matches!(
            analyzer.infinitesimal_shape_response(0.3),
            Err(CpgError::UnsupportedOperation(_))
        ));
    }
}
