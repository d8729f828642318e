//! Coupled CPG network
//!
//! Each leg carries two oscillators:
//!
//! ```text
//!   driver  (plain Hopf)  ──R(γ)·K·dt──▶  coupled (modified Hopf)
//!      z₁ ∈ ℝ²                                z₂ ∈ ℝ²
//! ```
//!
//! Per step both oscillators are integrated independently, then the
//! driver's state rotated by the leg's phase offset γ is added to the
//! coupled state. Since both oscillators share the period π/(α|ω|), the
//! coupled oscillator phase-locks to the driver shifted by γ, which is how
//! gaits with fixed inter-leg phase relations emerge.

use std::sync::Arc;

use ndarray::{Array1, Zip};

use crate::config::OscillatorConfig;
use crate::entrainment::EntrainmentPolynomial;
use crate::error::CpgError;
use crate::oscillator::{ModifiedHopfOscillator, OscillatorState, PhaseOscillator};
use crate::stability::StabilityMonitor;
use crate::CpgResult;

/// Output of one network step
#[derive(Debug, Clone, PartialEq)]
pub struct CpgStep {
    pub driver: OscillatorState,
    pub coupled: OscillatorState,
    /// Phase rate of each coupled oscillator during the step
    pub rate: Array1<f64>,
}

/// Per-leg driver/coupled oscillator pairs
#[derive(Debug)]
pub struct CpgNetwork {
    driver: PhaseOscillator,
    coupled: ModifiedHopfOscillator,
    coupling_strength: f64,
    num_legs: usize,
    driver_state: OscillatorState,
    coupled_state: OscillatorState,
}

impl CpgNetwork {
    /// Build a network with every oscillator at (1, 0)
    pub fn new(config: &OscillatorConfig, polynomial: Arc<EntrainmentPolynomial>) -> CpgResult<Self> {
        config.validate()?;
        let num_legs = config.num_legs;
        Ok(Self {
            driver: PhaseOscillator::new(config),
            coupled: ModifiedHopfOscillator::new(config, polynomial),
            coupling_strength: config.coupling_strength,
            num_legs,
            driver_state: OscillatorState::unit(num_legs),
            coupled_state: OscillatorState::unit(num_legs),
        })
    }

    pub fn num_legs(&self) -> usize {
        self.num_legs
    }

    pub fn coupling_strength(&self) -> f64 {
        self.coupling_strength
    }

    pub fn driver_state(&self) -> &OscillatorState {
        &self.driver_state
    }

    pub fn coupled_state(&self) -> &OscillatorState {
        &self.coupled_state
    }

    pub fn oscillator(&self) -> &ModifiedHopfOscillator {
        &self.coupled
    }

    pub fn stability(&self) -> &StabilityMonitor {
        self.coupled.stability()
    }

    /// Restart an episode: drivers at (1, 0), coupled oscillators at `initial`
    pub fn reset(&mut self, initial: OscillatorState) -> CpgResult<()> {
        if initial.len() != self.num_legs {
            return Err(CpgError::DimensionMismatch {
                expected: self.num_legs,
                got: initial.len(),
            });
        }
        initial.check_finite("coupled_state")?;
        self.driver_state = OscillatorState::unit(self.num_legs);
        self.coupled_state = initial;
        Ok(())
    }

    /// Reset with an explicit driver state as well
    pub fn reset_with_driver(
        &mut self,
        driver: OscillatorState,
        coupled: OscillatorState,
    ) -> CpgResult<()> {
        if driver.len() != self.num_legs {
            return Err(CpgError::DimensionMismatch {
                expected: self.num_legs,
                got: driver.len(),
            });
        }
        driver.check_finite("driver_state")?;
        self.reset(coupled)?;
        self.driver_state = driver;
        Ok(())
    }

    /// Pure step from explicit states; the network's own state is untouched
    pub fn step_states(
        &self,
        omega: &Array1<f64>,
        mu: &Array1<f64>,
        phase_offsets: &Array1<f64>,
        driver: &OscillatorState,
        coupled: &OscillatorState,
        dt: f64,
    ) -> CpgResult<CpgStep> {
        for (name, arr) in [("omega", omega), ("mu", mu), ("phase_offsets", phase_offsets)] {
            if arr.len() != self.num_legs {
                log::debug!("{} has {} entries for {} legs", name, arr.len(), self.num_legs);
                return Err(CpgError::DimensionMismatch {
                    expected: self.num_legs,
                    got: arr.len(),
                });
            }
        }

        let driver = self.driver.step(omega, mu, driver, dt)?;
        let (mut coupled, rate) = self.coupled.step(omega, mu, coupled, dt)?;

        let gain = dt * self.coupling_strength;
        Zip::from(&mut coupled.x)
            .and(&mut coupled.y)
            .and(&driver.x)
            .and(&driver.y)
            .and(phase_offsets)
            .for_each(|x2, y2, &x1, &y1, &gamma| {
                let (s, c) = gamma.sin_cos();
                *x2 += gain * (c * x1 - s * y1);
                *y2 += gain * (s * x1 + c * y1);
            });
        coupled.check_finite("coupled_state")?;

        Ok(CpgStep {
            driver,
            coupled,
            rate,
        })
    }

    /// Overwrite both states after an external correction
    #[cfg_attr(not(feature = "feedback"), allow(dead_code))]
    pub(crate) fn commit(&mut self, driver: OscillatorState, coupled: OscillatorState) {
        self.driver_state = driver;
        self.coupled_state = coupled;
    }

    /// Advance the network by one physical timestep
    pub fn step(
        &mut self,
        omega: &Array1<f64>,
        mu: &Array1<f64>,
        phase_offsets: &Array1<f64>,
        dt: f64,
    ) -> CpgResult<CpgStep> {
        let out = self.step_states(
            omega,
            mu,
            phase_offsets,
            &self.driver_state,
            &self.coupled_state,
            dt,
        )?;
        self.driver_state = out.driver.clone();
        self.coupled_state = out.coupled.clone();
        Ok(out)
    }

    /// Step `steps` times with constant commands, collecting every output
    pub fn run(
        &mut self,
        omega: &Array1<f64>,
        mu: &Array1<f64>,
        phase_offsets: &Array1<f64>,
        steps: usize,
        dt: f64,
    ) -> CpgResult<Vec<CpgStep>> {
        (0..steps)
            .map(|_| self.step(omega, mu, phase_offsets, dt))
            .collect()
    }
}
