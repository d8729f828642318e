//! Hopf oscillators
//!
//! Both oscillators integrate in polar form and store Cartesian state:
//!
//! ```text
//! plain:     φ' = φ + dt·|ω|·2α
//!            r' = r + dt·r·(μ − r²)
//!
//! modified:  β  = clamp(β(|ω|), m, 1 − m)
//!            w  = |ω|·α·( 1/(2β(1−β)) + (1−2β)/(2β(1−β))·tanh(1000·φ) )
//!            φ' = φ + dt·w
//!            r' = r + λ·dt·(μ − b·r²)·r
//! ```
//!
//! The modified oscillator spends a fraction β of every cycle in the
//! upper half-plane (rate |ω|α/β) and 1−β in the lower one (rate
//! |ω|α/(1−β)), so its period π/(α|ω|) equals that of the plain oscillator
//! while the swing/stance split follows the commanded frequency.
//!
//! `λ` (`radius_gain`) and `b` (`radius_saturation`) are radial constants
//! and have nothing to do with the entrainment factor β(ω).

use std::f64::consts::PI;
use std::sync::Arc;

use ndarray::{Array1, Zip};
use serde::{Deserialize, Serialize};

use crate::config::OscillatorConfig;
use crate::entrainment::EntrainmentPolynomial;
use crate::error::CpgError;
use crate::stability::{check_finite_array, StabilityMonitor, StabilityWarning};
use crate::CpgResult;

/// Slope of the tanh swing/stance selector
pub const SELECTOR_SHARPNESS: f64 = 1000.0;

/// Smooth sign of the phase: ≈ +1 in the upper half-plane, ≈ −1 below
#[inline]
pub fn swing_stance_selector(phi: f64) -> f64 {
    (SELECTOR_SHARPNESS * phi).tanh()
}

/// Wrap an angle to (−π, π]
#[inline]
pub fn wrap_phase(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// Batched Cartesian oscillator state, one (x, y) pair per leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillatorState {
    pub x: Array1<f64>,
    pub y: Array1<f64>,
}

impl OscillatorState {
    pub fn new(x: Array1<f64>, y: Array1<f64>) -> CpgResult<Self> {
        if x.len() != y.len() {
            return Err(CpgError::DimensionMismatch {
                expected: x.len(),
                got: y.len(),
            });
        }
        Ok(Self { x, y })
    }

    /// All oscillators at (1, 0)
    pub fn unit(n: usize) -> Self {
        Self {
            x: Array1::ones(n),
            y: Array1::zeros(n),
        }
    }

    pub fn from_polar(radius: &Array1<f64>, phase: &Array1<f64>) -> CpgResult<Self> {
        if radius.len() != phase.len() {
            return Err(CpgError::DimensionMismatch {
                expected: radius.len(),
                got: phase.len(),
            });
        }
        Ok(Self {
            x: radius * &phase.mapv(f64::cos),
            y: radius * &phase.mapv(f64::sin),
        })
    }

    /// Oscillators on a circle of radius `radius` at the given phases (radians)
    pub fn from_phases(phases: &[f64], radius: f64) -> Self {
        Self {
            x: phases.iter().map(|p| radius * p.cos()).collect(),
            y: phases.iter().map(|p| radius * p.sin()).collect(),
        }
    }

    /// Rebuild from the flat `[x_0..x_n, y_0..y_n]` layout
    pub fn from_flat(flat: &[f64]) -> CpgResult<Self> {
        if flat.len() % 2 != 0 {
            return Err(CpgError::DimensionMismatch {
                expected: flat.len() + 1,
                got: flat.len(),
            });
        }
        let n = flat.len() / 2;
        Ok(Self {
            x: Array1::from(flat[..n].to_vec()),
            y: Array1::from(flat[n..].to_vec()),
        })
    }

    /// Flat `[x_0..x_n, y_0..y_n]` layout
    pub fn to_flat(&self) -> Vec<f64> {
        self.x.iter().chain(self.y.iter()).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn radius(&self) -> Array1<f64> {
        Zip::from(&self.x)
            .and(&self.y)
            .map_collect(|&x, &y| (x * x + y * y).sqrt())
    }

    /// Phase angle in (−π, π]
    pub fn phase(&self) -> Array1<f64> {
        Zip::from(&self.x).and(&self.y).map_collect(|&x, &y| y.atan2(x))
    }

    /// Phase of oscillator `i` relative to `j`, wrapped to (−π, π]
    pub fn phase_difference(&self, i: usize, j: usize) -> f64 {
        let phi_i = self.y[i].atan2(self.x[i]);
        let phi_j = self.y[j].atan2(self.x[j]);
        wrap_phase(phi_i - phi_j)
    }

    pub fn is_finite(&self) -> bool {
        self.x.iter().chain(self.y.iter()).all(|v| v.is_finite())
    }

    pub fn check_finite(&self, name: &str) -> CpgResult<()> {
        check_finite_array(&self.x, name)?;
        check_finite_array(&self.y, name)
    }

    fn check_len(&self, name: &str, other: &Array1<f64>) -> CpgResult<()> {
        if other.len() != self.len() {
            log::debug!("{} has {} entries for {} oscillators", name, other.len(), self.len());
            return Err(CpgError::DimensionMismatch {
                expected: self.len(),
                got: other.len(),
            });
        }
        Ok(())
    }
}

/// Plain Hopf oscillator with constant phase rate 2α|ω|
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseOscillator {
    pub phase_rate_scale: f64,
}

impl PhaseOscillator {
    pub fn new(config: &OscillatorConfig) -> Self {
        Self {
            phase_rate_scale: config.phase_rate_scale,
        }
    }

    /// Advance every oscillator by one Euler step
    pub fn step(
        &self,
        omega: &Array1<f64>,
        mu: &Array1<f64>,
        state: &OscillatorState,
        dt: f64,
    ) -> CpgResult<OscillatorState> {
        state.check_len("omega", omega)?;
        state.check_len("mu", mu)?;

        let two_alpha = 2.0 * self.phase_rate_scale;
        let mut next = state.clone();
        Zip::from(&mut next.x)
            .and(&mut next.y)
            .and(omega)
            .and(mu)
            .for_each(|x, y, &w, &m| {
                let r = (*x * *x + *y * *y).sqrt();
                let phi = y.atan2(*x) + dt * w.abs() * two_alpha;
                let r = r + dt * r * (m - r * r);
                *x = r * phi.cos();
                *y = r * phi.sin();
            });
        next.check_finite("hopf_state")?;
        Ok(next)
    }

    /// Integrate `steps` Euler steps and collect the trajectory
    pub fn run(
        &self,
        omega: &Array1<f64>,
        mu: &Array1<f64>,
        initial: &OscillatorState,
        steps: usize,
        dt: f64,
    ) -> CpgResult<Vec<OscillatorState>> {
        let mut trajectory = Vec::with_capacity(steps);
        let mut state = initial.clone();
        for _ in 0..steps {
            state = self.step(omega, mu, &state, dt)?;
            trajectory.push(state.clone());
        }
        Ok(trajectory)
    }

    /// Period of the limit cycle for angular frequency `omega`
    pub fn period(&self, omega: f64) -> f64 {
        PI / (self.phase_rate_scale * omega.abs())
    }
}

/// Swing/stance rate decomposition for one commanded frequency
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateTerms {
    /// Clamped duty factor β(ω)
    pub beta: f64,
    /// 1 / (2β(1−β))
    pub mean: f64,
    /// (1−2β) / (2β(1−β))
    pub amplitude: f64,
}

impl RateTerms {
    pub fn from_beta(beta: f64) -> Self {
        let denom = 2.0 * beta * (1.0 - beta);
        Self {
            beta,
            mean: (1.0 / denom).abs(),
            amplitude: (1.0 - 2.0 * beta) / denom,
        }
    }
}

/// Hopf oscillator whose phase rate depends on the half-cycle via β(ω)
#[derive(Debug)]
pub struct ModifiedHopfOscillator {
    phase_rate_scale: f64,
    radius_gain: f64,
    radius_saturation: f64,
    beta_margin: f64,
    polynomial: Arc<EntrainmentPolynomial>,
    monitor: StabilityMonitor,
}

impl ModifiedHopfOscillator {
    pub fn new(config: &OscillatorConfig, polynomial: Arc<EntrainmentPolynomial>) -> Self {
        Self {
            phase_rate_scale: config.phase_rate_scale,
            radius_gain: config.radius_gain,
            radius_saturation: config.radius_saturation,
            beta_margin: config.beta_margin,
            polynomial,
            monitor: StabilityMonitor::new(),
        }
    }

    pub fn polynomial(&self) -> &Arc<EntrainmentPolynomial> {
        &self.polynomial
    }

    pub fn stability(&self) -> &StabilityMonitor {
        &self.monitor
    }

    pub fn phase_rate_scale(&self) -> f64 {
        self.phase_rate_scale
    }

    pub fn radius_gain(&self) -> f64 {
        self.radius_gain
    }

    pub fn radius_saturation(&self) -> f64 {
        self.radius_saturation
    }

    /// β(ω) clamped to `[m, 1 − m]`; clamping is recorded as a warning
    pub fn duty_factor(&self, omega: f64) -> f64 {
        let raw = self.polynomial.evaluate(omega);
        let lo = self.beta_margin;
        let hi = 1.0 - self.beta_margin;
        let clamped = raw.clamp(lo, hi);
        if clamped != raw && raw.is_finite() {
            self.monitor.record(StabilityWarning {
                omega,
                beta: raw,
                clamped,
            });
        }
        clamped
    }

    pub fn rate_terms(&self, omega: f64) -> RateTerms {
        RateTerms::from_beta(self.duty_factor(omega))
    }

    /// Instantaneous phase rate at phase `phi`
    #[inline]
    pub fn phase_rate(&self, omega: f64, terms: &RateTerms, phi: f64) -> f64 {
        omega.abs() * (terms.mean + terms.amplitude * swing_stance_selector(phi)) * self.phase_rate_scale
    }

    /// Advance every oscillator by one step; also returns the phase rates used
    pub fn step(
        &self,
        omega: &Array1<f64>,
        mu: &Array1<f64>,
        state: &OscillatorState,
        dt: f64,
    ) -> CpgResult<(OscillatorState, Array1<f64>)> {
        state.check_len("omega", omega)?;
        state.check_len("mu", mu)?;

        let mut next = state.clone();
        let mut rates = Array1::zeros(state.len());
        for i in 0..state.len() {
            let (x, y) = (state.x[i], state.y[i]);
            let terms = self.rate_terms(omega[i]);
            let r = (x * x + y * y).sqrt();
            let phi = y.atan2(x);
            let w = self.phase_rate(omega[i], &terms, phi);
            let phi = phi + dt * w;
            let r = r + self.radius_gain * dt * (mu[i] - self.radius_saturation * r * r) * r;
            next.x[i] = r * phi.cos();
            next.y[i] = r * phi.sin();
            rates[i] = w;
        }
        next.check_finite("modified_hopf_state")?;
        check_finite_array(&rates, "phase_rate")?;
        Ok((next, rates))
    }

    /// Integrate `steps` steps, collecting states and phase rates
    pub fn run(
        &self,
        omega: &Array1<f64>,
        mu: &Array1<f64>,
        initial: &OscillatorState,
        steps: usize,
        dt: f64,
    ) -> CpgResult<(Vec<OscillatorState>, Vec<Array1<f64>>)> {
        let mut states = Vec::with_capacity(steps);
        let mut rates = Vec::with_capacity(steps);
        let mut state = initial.clone();
        for _ in 0..steps {
            let (next, w) = self.step(omega, mu, &state, dt)?;
            state = next;
            states.push(state.clone());
            rates.push(w);
        }
        Ok((states, rates))
    }

    /// Continuous-time vector field F(x, y)
    pub fn vector_field(&self, omega: f64, mu: f64, x: f64, y: f64) -> (f64, f64) {
        let terms = self.rate_terms(omega);
        let g = self.radius_gain * (mu - self.radius_saturation * (x * x + y * y));
        let w = self.phase_rate(omega, &terms, y.atan2(x));
        (g * x - w * y, g * y + w * x)
    }

    /// Period of the limit cycle; identical to the plain oscillator's
    pub fn period(&self, omega: f64) -> f64 {
        PI / (self.phase_rate_scale * omega.abs())
    }
}
