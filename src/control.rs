//! Actor network: basal ganglia + motor cortex
//!
//! ```text
//!  (s_t, s_t-1, h) ─▶ BasalGangliaCircuit ─▶ (correction, v_t, h')
//!  (s_t, correction) ─▶ MotorBlend ─▶ action
//! ```

use candle_core::{Device, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use serde::{Deserialize, Serialize};

use crate::basal_ganglia::{BasalGangliaCircuit, ThalamicState, FROZEN_PARAMS};
use crate::config::ControllerConfig;
use crate::error::CpgError;
use crate::motor::MotorBlend;
use crate::CpgResult;

/// Whether an optimiser may update a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamTag {
    Trainable,
    Frozen,
}

impl ParamTag {
    /// Tag of a variable from its full VarMap name
    pub fn of(name: &str) -> Self {
        if FROZEN_PARAMS.iter().any(|suffix| name.ends_with(suffix)) {
            ParamTag::Frozen
        } else {
            ParamTag::Trainable
        }
    }
}

/// Every variable tagged [`ParamTag::Trainable`], sorted by name
pub fn trainable_vars(varmap: &VarMap) -> CpgResult<Vec<(String, Var)>> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| CpgError::config("parameter store lock poisoned"))?;
    let mut vars: Vec<(String, Var)> = data
        .iter()
        .filter(|(name, _)| ParamTag::of(name) == ParamTag::Trainable)
        .map(|(name, var)| (name.clone(), var.clone()))
        .collect();
    vars.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(vars)
}

/// One actor evaluation
#[derive(Debug, Clone)]
pub struct ControlOutput {
    /// Action in (−1, 1), `(batch, action_dim)`
    pub action: Tensor,
    /// Value estimate, `(batch, 1)`
    pub value: Tensor,
    pub hidden: ThalamicState,
}

#[derive(Debug, Clone)]
pub struct ControlNetwork {
    bg: BasalGangliaCircuit,
    mc: MotorBlend,
}

impl ControlNetwork {
    pub fn new(config: &ControllerConfig, vb: VarBuilder) -> CpgResult<Self> {
        config.validate()?;
        let bg_config = config.basal_ganglia.clone();
        let num_ctx = bg_config.num_ctx;
        let action_dim = bg_config.num_out;
        Ok(Self {
            bg: BasalGangliaCircuit::new(bg_config, vb.pp("bg"))?,
            mc: MotorBlend::new(&config.motor_cortex, num_ctx, action_dim, vb.pp("mc"))?,
        })
    }

    pub fn basal_ganglia(&self) -> &BasalGangliaCircuit {
        &self.bg
    }

    pub fn motor(&self) -> &MotorBlend {
        &self.mc
    }

    pub fn initial_state(&self, batch: usize, seed: u64, device: &Device) -> CpgResult<ThalamicState> {
        self.bg.initial_state(batch, seed, device)
    }

    pub fn forward(
        &self,
        stimulus_t: &Tensor,
        stimulus_t_1: &Tensor,
        hidden: &ThalamicState,
    ) -> CpgResult<ControlOutput> {
        let bg = self.bg.forward(stimulus_t, stimulus_t_1, hidden)?;
        let action = self.mc.forward(stimulus_t, &bg.correction)?;
        Ok(ControlOutput {
            action,
            value: bg.value,
            hidden: bg.hidden,
        })
    }
}
