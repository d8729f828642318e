//! Motor cortex and action blending
//!
//! `action = tanh(cortex(stimulus) + bg_correction)`, clamped so every
//! component stays strictly inside (−1, 1) in f32.

use candle_core::Tensor;
use candle_nn::VarBuilder;

use crate::config::MotorCortexConfig;
use crate::error::CpgError;
use crate::mlp::Mlp;
use crate::stability::check_finite_tensor;
use crate::CpgResult;

/// Largest magnitude an action component may take
pub const ACTION_LIMIT: f32 = 1.0 - f32::EPSILON;

#[derive(Debug, Clone)]
pub struct MotorBlend {
    cortex: Mlp,
    action_dim: usize,
}

impl MotorBlend {
    pub fn new(
        config: &MotorCortexConfig,
        num_ctx: usize,
        action_dim: usize,
        vb: VarBuilder,
    ) -> CpgResult<Self> {
        config.validate()?;
        let mut widths = config.hidden.clone();
        widths.push(action_dim);
        Ok(Self {
            cortex: Mlp::new(num_ctx, &widths, vb.pp("fc_2"))?,
            action_dim,
        })
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    pub fn forward(&self, stimulus: &Tensor, bg_correction: &Tensor) -> CpgResult<Tensor> {
        let (_, width) = bg_correction.dims2()?;
        if width != self.action_dim {
            return Err(CpgError::DimensionMismatch {
                expected: self.action_dim,
                got: width,
            });
        }
        check_finite_tensor(stimulus, "stimulus")?;
        let action = (self.cortex.forward(stimulus)? + bg_correction)?
            .tanh()?
            .clamp(-ACTION_LIMIT, ACTION_LIMIT)?;
        Ok(action)
    }
}
