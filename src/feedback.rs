//! Closed-loop CPG correction (feature `feedback`)
//!
//! A free-running reference oscillator per leg, started at μ·(cos γ, sin γ),
//! tracks where the coupled oscillator should be. Every step:
//!
//! ```text
//!   y  = z − z_ref                     drift
//!   z ← z − gain·y + Re(Q)             correction
//! ```
//!
//! `Q` is the isostable input sensitivity along the reference trajectory,
//! with its power budget divided by the Frobenius norm of the local
//! Jacobian. It is only computed when `feedback_power > 0`. Φ is advanced
//! incrementally along the reference and restarted every period, so a step
//! costs O(1) after the per-command spectrum has been computed.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use ndarray::Array1;
use num_complex::Complex64;

use crate::config::OscillatorConfig;
use crate::cpg::CpgNetwork;
use crate::entrainment::EntrainmentPolynomial;
use crate::error::CpgError;
use crate::floquet::{
    isostable_from_fundamental, sensitivity_from_difference, FloquetAnalyzer, ModifiedHopfField,
    VectorField,
};
use crate::oscillator::OscillatorState;
use crate::CpgResult;

/// Output of one corrected step
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackStep {
    pub driver: OscillatorState,
    /// Coupled state after correction
    pub state: OscillatorState,
    pub reference: OscillatorState,
    pub rate: Array1<f64>,
    /// z − z_ref before correction
    pub drift: OscillatorState,
    /// Isostable term added to the state (zero when disabled)
    pub correction: OscillatorState,
}

/// Variational state of one leg along its reference trajectory
#[derive(Debug, Clone)]
struct IsostableTracker {
    omega: f64,
    mu: f64,
    field: ModifiedHopfField,
    kappa: Complex64,
    v: DVector<Complex64>,
    period: f64,
    elapsed: f64,
    phi_prev: DMatrix<f64>,
    phi_curr: DMatrix<f64>,
}

impl IsostableTracker {
    fn new(network: &CpgNetwork, omega: f64, mu: f64, start: [f64; 2], dt: f64) -> CpgResult<Self> {
        let field = ModifiedHopfField::new(network.oscillator(), &[omega], &[mu])?;
        let analyzer = FloquetAnalyzer::new(field.clone(), dt)?;
        let z0 = DVector::from_vec(start.to_vec());
        let spectrum = analyzer.spectrum(analyzer.natural_period(), &z0)?;
        let (kappa, v) = spectrum.slowest_isostable();
        let jac = analyzer.jacobian(&z0)?;
        log::debug!(
            "isostable tracker for omega {:.4}, mu {:.4}: kappa {:.4}",
            omega,
            mu,
            kappa
        );
        Ok(Self {
            omega,
            mu,
            field,
            kappa,
            v: v.clone(),
            period: spectrum.period,
            elapsed: 0.0,
            phi_prev: DMatrix::identity(2, 2) - jac * dt,
            phi_curr: DMatrix::identity(2, 2),
        })
    }

    fn matches(&self, omega: f64, mu: f64) -> bool {
        self.omega == omega && self.mu == mu
    }

    /// Q at the current reference point, then advance Φ by one step
    fn correction(&mut self, z_ref: [f64; 2], dt: f64, power: f64) -> CpgResult<[f64; 2]> {
        let z = DVector::from_vec(z_ref.to_vec());
        let jac = self.field.jacobian(&z);
        let phi_next = &self.phi_curr + (&jac * &self.phi_curr) * dt;

        let before = isostable_from_fundamental(&self.phi_prev, self.elapsed - dt, self.kappa, &self.v)?;
        let after = isostable_from_fundamental(&phi_next, self.elapsed + dt, self.kappa, &self.v)?;
        let jac_norm = jac.norm();
        let budget = if jac_norm > 0.0 { power / jac_norm } else { power };
        let q = sensitivity_from_difference(&before, &after, dt, budget)?;

        self.elapsed += dt;
        if self.elapsed >= self.period {
            self.elapsed = 0.0;
            self.phi_prev = DMatrix::identity(2, 2) - &jac * dt;
            self.phi_curr = DMatrix::identity(2, 2);
        } else {
            self.phi_prev = std::mem::replace(&mut self.phi_curr, phi_next);
        }
        Ok([q[0].re, q[1].re])
    }
}

/// CPG network with drift correction against per-leg reference oscillators
#[derive(Debug)]
pub struct FeedbackCpg {
    network: CpgNetwork,
    reference: OscillatorState,
    feedback_gain: f64,
    feedback_power: f64,
    trackers: Vec<Option<IsostableTracker>>,
}

impl FeedbackCpg {
    pub fn new(config: &OscillatorConfig, polynomial: Arc<EntrainmentPolynomial>) -> CpgResult<Self> {
        if !(config.feedback_power >= 0.0) {
            return Err(CpgError::config("feedback_power must be non-negative"));
        }
        let network = CpgNetwork::new(config, polynomial)?;
        let n = network.num_legs();
        Ok(Self {
            network,
            reference: OscillatorState::unit(n),
            feedback_gain: config.feedback_gain,
            feedback_power: config.feedback_power,
            trackers: vec![None; n],
        })
    }

    pub fn network(&self) -> &CpgNetwork {
        &self.network
    }

    pub fn reference(&self) -> &OscillatorState {
        &self.reference
    }

    /// Restart the episode; references start at μ·(cos γ, sin γ)
    pub fn reset(
        &mut self,
        initial: OscillatorState,
        mu: &Array1<f64>,
        phase_offsets: &Array1<f64>,
    ) -> CpgResult<()> {
        self.network.reset(initial)?;
        self.reference = OscillatorState::from_polar(mu, phase_offsets)?;
        if self.reference.len() != self.network.num_legs() {
            return Err(CpgError::DimensionMismatch {
                expected: self.network.num_legs(),
                got: self.reference.len(),
            });
        }
        self.trackers.iter_mut().for_each(|t| *t = None);
        Ok(())
    }

    pub fn step(
        &mut self,
        omega: &Array1<f64>,
        mu: &Array1<f64>,
        phase_offsets: &Array1<f64>,
        dt: f64,
    ) -> CpgResult<FeedbackStep> {
        let out = self.network.step_states(
            omega,
            mu,
            phase_offsets,
            self.network.driver_state(),
            self.network.coupled_state(),
            dt,
        )?;
        let (reference, _) = self
            .network
            .oscillator()
            .step(omega, mu, &self.reference, dt)?;

        let drift = OscillatorState {
            x: &out.coupled.x - &reference.x,
            y: &out.coupled.y - &reference.y,
        };
        let mut state = OscillatorState {
            x: &out.coupled.x - &(&drift.x * self.feedback_gain),
            y: &out.coupled.y - &(&drift.y * self.feedback_gain),
        };

        let n = self.network.num_legs();
        let mut correction = OscillatorState {
            x: Array1::zeros(n),
            y: Array1::zeros(n),
        };
        if self.feedback_power > 0.0 {
            for leg in 0..n {
                // a leg at rest has no cycle to linearise about
                if omega[leg] == 0.0 {
                    self.trackers[leg] = None;
                    continue;
                }
                // Φ tracking restarts when the command changes
                let stale = !matches!(&self.trackers[leg], Some(t) if t.matches(omega[leg], mu[leg]));
                if stale {
                    let start = [self.reference.x[leg], self.reference.y[leg]];
                    self.trackers[leg] = Some(IsostableTracker::new(
                        &self.network,
                        omega[leg],
                        mu[leg],
                        start,
                        dt,
                    )?);
                }
                if let Some(tracker) = self.trackers[leg].as_mut() {
                    let [qx, qy] = tracker.correction(
                        [self.reference.x[leg], self.reference.y[leg]],
                        dt,
                        self.feedback_power,
                    )?;
                    correction.x[leg] = qx;
                    correction.y[leg] = qy;
                }
            }
            state.x += &correction.x;
            state.y += &correction.y;
        }
        state.check_finite("feedback_state")?;

        self.network.commit(out.driver.clone(), state.clone());
        self.reference = reference.clone();
        Ok(FeedbackStep {
            driver: out.driver,
            state,
            reference,
            rate: out.rate,
            drift,
            correction,
        })
    }

    pub fn run(
        &mut self,
        omega: &Array1<f64>,
        mu: &Array1<f64>,
        phase_offsets: &Array1<f64>,
        steps: usize,
        dt: f64,
    ) -> CpgResult<Vec<FeedbackStep>> {
        (0..steps)
            .map(|_| self.step(omega, mu, phase_offsets, dt))
            .collect()
    }
}
