//! Controller configuration
//!
//! Every component is constructed from an explicit, immutable configuration
//! value. Nothing is read from ambient global state: the caller builds one
//! [`ControllerConfig`] at startup (or loads it from JSON) and passes the
//! relevant section by reference into each constructor.
//!
//! ```text
//! ControllerConfig
//! ├── oscillator     (Hopf constants, entrainment fit, coupling, legs)
//! ├── basal_ganglia  (layer widths, iteration counts, integration rates)
//! └── motor_cortex   (feed-forward widths)
//! ```

use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CpgError;
use crate::CpgResult;

/// Number of breakpoints partitioning the β(ω) target curve.
pub const NUM_THRESHOLDS: usize = 7;

/// Configuration for the oscillator / CPG subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillatorConfig {
    /// Global phase-rate scale (alpha)
    pub phase_rate_scale: f64,
    /// Radial relaxation gain of the modified oscillator (lambda)
    pub radius_gain: f64,
    /// Radial saturation coefficient of the modified oscillator.
    /// Unrelated to the entrainment factor β(ω).
    pub radius_saturation: f64,
    /// Degree of the entrainment polynomial
    pub degree: usize,
    /// Angular-frequency breakpoints of the β(ω) target curve
    pub thresholds: Vec<f64>,
    /// Resolution used when sampling the target curve
    pub sampling_step: f64,
    /// Strength of the driver → coupled oscillator term
    pub coupling_strength: f64,
    /// Number of legs (oscillator pairs)
    pub num_legs: usize,
    /// Minimum distance of β(ω) from 0 and 1
    pub beta_margin: f64,
    /// Per-leg phase offsets (cycle fractions) added at gait reset
    pub leg_phase_offsets: Vec<f64>,
    /// Gain of the drift correction in the feedback CPG
    pub feedback_gain: f64,
    /// Power budget of the isostable correction (0 disables it)
    pub feedback_power: f64,
}

impl Default for OscillatorConfig {
    fn default() -> Self {
        Self {
            phase_rate_scale: 0.5,
            radius_gain: 1.0,
            radius_saturation: 1.0,
            degree: 15,
            thresholds: vec![
                0.0,
                PI / 4.0,
                PI / 2.0,
                3.0 * PI / 4.0,
                PI,
                5.0 * PI / 4.0,
                3.0 * PI / 2.0,
            ],
            sampling_step: 0.05,
            coupling_strength: 1.0,
            num_legs: 4,
            beta_margin: 1e-3,
            leg_phase_offsets: vec![0.0; 4],
            feedback_gain: 0.5,
            feedback_power: 0.0,
        }
    }
}

impl OscillatorConfig {
    /// Check the configuration before any component is built
    pub fn validate(&self) -> CpgResult<()> {
        if self.thresholds.len() != NUM_THRESHOLDS {
            return Err(CpgError::config(format!(
                "expected {} thresholds, got {}",
                NUM_THRESHOLDS,
                self.thresholds.len()
            )));
        }
        if self.thresholds.windows(2).any(|w| w[1] <= w[0]) {
            return Err(CpgError::config("thresholds must be strictly increasing"));
        }
        if !(self.sampling_step > 0.0) {
            return Err(CpgError::config("sampling_step must be positive"));
        }
        if self.degree == 0 {
            return Err(CpgError::config("entrainment degree must be at least 1"));
        }
        let samples = (self.thresholds[NUM_THRESHOLDS - 1] / self.sampling_step).ceil() as usize;
        if samples <= self.degree {
            return Err(CpgError::config(format!(
                "{} samples cannot determine a degree-{} polynomial",
                samples, self.degree
            )));
        }
        if self.num_legs == 0 {
            return Err(CpgError::config("num_legs must be positive"));
        }
        if self.leg_phase_offsets.len() != self.num_legs {
            return Err(CpgError::config(format!(
                "{} leg offsets for {} legs",
                self.leg_phase_offsets.len(),
                self.num_legs
            )));
        }
        if !(self.beta_margin > 0.0 && self.beta_margin < 0.5) {
            return Err(CpgError::config("beta_margin must lie in (0, 0.5)"));
        }
        if !(self.phase_rate_scale > 0.0) {
            return Err(CpgError::config("phase_rate_scale must be positive"));
        }
        Ok(())
    }
}

/// Configuration for the basal-ganglia circuit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasalGangliaConfig {
    /// Output (action) dimension
    pub num_out: usize,
    /// Sensory context width
    pub num_ctx: usize,
    /// GPe population size
    pub num_gpe: usize,
    /// STN population size
    pub num_stn: usize,
    /// GPi population size (also the thalamic cell width)
    pub num_gpi: usize,
    /// Width of the striatal D1/D2 populations
    pub ff_dim_in: usize,
    /// Feed-forward striatal integration steps
    pub ff_steps: usize,
    /// STN/GPe loop iterations per call
    pub stn_gpe_iter: usize,
    pub eta_gpe: f64,
    pub eta_gpi: f64,
    /// Thalamic rate; accepted for compatibility, not used by the dynamics
    pub eta_th: f64,
    /// Widths of the value-function MLP (last entry must be 1)
    pub value_hidden: Vec<usize>,
}

impl Default for BasalGangliaConfig {
    fn default() -> Self {
        Self {
            num_out: 2,
            num_ctx: 1000,
            num_gpe: 40,
            num_stn: 40,
            num_gpi: 20,
            ff_dim_in: 40,
            ff_steps: 20,
            stn_gpe_iter: 50,
            eta_gpe: 0.01,
            eta_gpi: 0.01,
            eta_th: 0.01,
            value_hidden: vec![256, 1],
        }
    }
}

impl BasalGangliaConfig {
    /// Small circuit for tests and demos
    pub fn tiny() -> Self {
        Self {
            num_out: 2,
            num_ctx: 16,
            num_gpe: 8,
            num_stn: 8,
            num_gpi: 6,
            ff_dim_in: 8,
            ff_steps: 3,
            stn_gpe_iter: 4,
            eta_gpe: 0.01,
            eta_gpi: 0.01,
            eta_th: 0.01,
            value_hidden: vec![12, 1],
        }
    }

    /// STN integration rate, tied to the GPe rate
    pub fn eta_stn(&self) -> f64 {
        self.eta_gpe / 3.0
    }

    pub fn validate(&self) -> CpgResult<()> {
        if self.num_out == 0 || self.num_ctx == 0 || self.num_gpi == 0 {
            return Err(CpgError::config("layer widths must be positive"));
        }
        // GPe receives STN excitation and the D2 population elementwise.
        if self.ff_dim_in != self.num_gpe || self.num_gpe != self.num_stn {
            return Err(CpgError::config(format!(
                "ff_dim_in ({}), num_gpe ({}) and num_stn ({}) must match",
                self.ff_dim_in, self.num_gpe, self.num_stn
            )));
        }
        if self.ff_steps == 0 || self.stn_gpe_iter == 0 {
            return Err(CpgError::config(
                "ff_steps and stn_gpe_iter must be at least 1",
            ));
        }
        match self.value_hidden.last() {
            Some(1) => {}
            Some(w) => {
                return Err(CpgError::config(format!(
                    "value function must end in a scalar, got width {}",
                    w
                )))
            }
            None => return Err(CpgError::config("value function has no layers")),
        }
        if self.value_hidden.iter().any(|&w| w == 0) {
            return Err(CpgError::config("value function widths must be positive"));
        }
        Ok(())
    }
}

/// Configuration for the feed-forward motor cortex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorCortexConfig {
    /// Hidden layer widths (ReLU after each)
    pub hidden: Vec<usize>,
}

impl Default for MotorCortexConfig {
    fn default() -> Self {
        Self {
            hidden: vec![256, 128],
        }
    }
}

impl MotorCortexConfig {
    pub fn tiny() -> Self {
        Self { hidden: vec![12] }
    }

    pub fn validate(&self) -> CpgResult<()> {
        if self.hidden.iter().any(|&w| w == 0) {
            return Err(CpgError::config("motor cortex widths must be positive"));
        }
        Ok(())
    }
}

/// Complete controller configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub oscillator: OscillatorConfig,
    pub basal_ganglia: BasalGangliaConfig,
    pub motor_cortex: MotorCortexConfig,
}

impl ControllerConfig {
    pub fn tiny() -> Self {
        Self {
            oscillator: OscillatorConfig::default(),
            basal_ganglia: BasalGangliaConfig::tiny(),
            motor_cortex: MotorCortexConfig::tiny(),
        }
    }

    pub fn validate(&self) -> CpgResult<()> {
        self.oscillator.validate()?;
        self.basal_ganglia.validate()?;
        self.motor_cortex.validate()
    }

    /// Load and validate a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> CpgResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| CpgError::Serialization(format!("failed to read {:?}: {}", path, e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| CpgError::Serialization(e.to_string()))?;
        config.validate()?;
        log::info!("Loaded controller config from {:?}", path);
        Ok(config)
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> CpgResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CpgError::Serialization(e.to_string()))?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }
}
