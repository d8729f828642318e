//! Basal-ganglia action-gating circuit
//!
//! ```text
//!  stimulus_t ──┬─▶ value MLP ─▶ v_t ─┐
//!  stimulus_t-1 ┴─▶ value MLP ─▶ v_t-1┴▶ Δv ─▶ λ_D1 = σ( e^{a1}(Δv − θ1))
//!                                            λ_D2 = σ(−e^{a2}(Δv − θ2))
//!
//!  striatum   V_D ← σ(λ·(J(1−V_D) + (1−K)V_D))           × ff_steps
//!
//!  loop       GPe ◀─ wsg·STN, lateral, −V_D2              × stn_gpe_iter
//!             STN ◀─ wgs·GPe, lateral
//!             GPi ◀─ −D1 projection + 2·λ_D2·(STN projection)
//!             thalamus h ← tanh(W_ih(−GPi) + W_hh h)
//!
//!  output     Linear(h)  (final iteration only)
//! ```
//!
//! The thalamic hidden state is an explicit input: callers own its seeding
//! and persistence, so a forward pass is a pure function of its arguments.

use candle_core::{DType, Device, Tensor};
use candle_nn::{Init, Linear, Module, VarBuilder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::BasalGangliaConfig;
use crate::error::CpgError;
use crate::mlp::Mlp;
use crate::stability::check_finite_tensor;
use crate::CpgResult;

/// Parameters never updated by the optimiser (suffix of the full var name)
pub const FROZEN_PARAMS: &[&str] = &["fc_stngpi.weight"];

/// Thalamic hidden state, one row per batch element
#[derive(Debug, Clone)]
pub struct ThalamicState {
    pub hx: Tensor,
}

impl ThalamicState {
    /// Uniform [0, 1) state from a fixed seed
    pub fn random(batch: usize, width: usize, seed: u64, device: &Device) -> CpgResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let values: Vec<f32> = (0..batch * width).map(|_| rng.gen::<f32>()).collect();
        Ok(Self {
            hx: Tensor::from_vec(values, (batch, width), device)?,
        })
    }

    pub fn zeros(batch: usize, width: usize, device: &Device) -> CpgResult<Self> {
        Ok(Self {
            hx: Tensor::zeros((batch, width), DType::F32, device)?,
        })
    }

    pub fn dims(&self) -> CpgResult<(usize, usize)> {
        Ok(self.hx.dims2()?)
    }
}

/// Elman cell: h' = tanh(W_ih·x + b_ih + W_hh·h + b_hh)
#[derive(Debug, Clone)]
pub struct ThalamicCell {
    ih: Linear,
    hh: Linear,
}

impl ThalamicCell {
    pub fn new(input: usize, hidden: usize, vb: VarBuilder) -> CpgResult<Self> {
        Ok(Self {
            ih: candle_nn::linear(input, hidden, vb.pp("ih"))?,
            hh: candle_nn::linear(hidden, hidden, vb.pp("hh"))?,
        })
    }

    pub fn forward(&self, input: &Tensor, hidden: &Tensor) -> CpgResult<Tensor> {
        let pre = (self.ih.forward(input)? + self.hh.forward(hidden)?)?;
        Ok(pre.tanh()?)
    }
}

/// Result of one circuit evaluation
#[derive(Debug, Clone)]
pub struct BasalGangliaOutput {
    /// Action correction, `(batch, num_out)`
    pub correction: Tensor,
    /// Value estimate of `stimulus_t`, `(batch, 1)`
    pub value: Tensor,
    /// Thalamic state after the last loop iteration
    pub hidden: ThalamicState,
}

/// Learned gating scalars, each `(1, 1)`
#[derive(Debug, Clone)]
struct GateParams {
    log_a1: Tensor,
    log_a2: Tensor,
    theta_d1: Tensor,
    theta_d2: Tensor,
    wsg: Tensor,
    wgs: Tensor,
    eps_glat: Tensor,
    eps_slat: Tensor,
}

impl GateParams {
    fn new(vb: &VarBuilder) -> CpgResult<Self> {
        let scalar = |name: &str, v: f64| vb.get_with_hints((1, 1), name, Init::Const(v));
        Ok(Self {
            log_a1: scalar("log_a1", 1.0)?,
            log_a2: scalar("log_a2", 1.0)?,
            theta_d1: scalar("thetad1", 0.0)?,
            theta_d2: scalar("thetad2", 0.0)?,
            wsg: scalar("wsg", 2.0)?,
            wgs: scalar("wgs", -2.0)?,
            eps_glat: scalar("epsilon_glat", 0.05)?,
            eps_slat: scalar("epsilon_slat", 0.05)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BasalGangliaCircuit {
    config: BasalGangliaConfig,
    value_fn: Mlp,
    gates: GateParams,
    /// all-ones minus identity
    lateral_gpe: Tensor,
    lateral_stn: Tensor,
    ones_gpe: Tensor,
    fc_d1gpi: Linear,
    fc_stngpi: Linear,
    fc_jd1: Linear,
    fc_jd2: Linear,
    fc_kd1: Linear,
    fc_kd2: Linear,
    thalamus: ThalamicCell,
    output: Linear,
}

impl BasalGangliaCircuit {
    pub fn new(config: BasalGangliaConfig, vb: VarBuilder) -> CpgResult<Self> {
        config.validate()?;
        let device = vb.device().clone();
        let c = &config;

        let lateral = |n: usize| -> CpgResult<Tensor> {
            Ok((Tensor::ones((n, n), DType::F32, &device)? - Tensor::eye(n, DType::F32, &device)?)?)
        };

        Ok(Self {
            value_fn: Mlp::new(c.num_ctx, &c.value_hidden, vb.pp("vf"))?,
            gates: GateParams::new(&vb)?,
            lateral_gpe: lateral(c.num_gpe)?,
            lateral_stn: lateral(c.num_stn)?,
            ones_gpe: Tensor::ones((c.num_gpe, c.num_gpe), DType::F32, &device)?,
            fc_d1gpi: candle_nn::linear_no_bias(c.ff_dim_in, c.num_gpi, vb.pp("fc_d1gpi"))?,
            fc_stngpi: candle_nn::linear_no_bias(c.num_stn, c.num_gpi, vb.pp("fc_stngpi"))?,
            fc_jd1: candle_nn::linear_no_bias(c.num_ctx, c.ff_dim_in, vb.pp("fc_jd1"))?,
            fc_jd2: candle_nn::linear_no_bias(c.num_ctx, c.ff_dim_in, vb.pp("fc_jd2"))?,
            fc_kd1: candle_nn::linear_no_bias(c.num_ctx, c.ff_dim_in, vb.pp("fc_kd1"))?,
            fc_kd2: candle_nn::linear_no_bias(c.num_ctx, c.ff_dim_in, vb.pp("fc_kd2"))?,
            thalamus: ThalamicCell::new(c.num_gpi, c.num_gpi, vb.pp("thalamus"))?,
            output: candle_nn::linear(c.num_gpi, c.num_out, vb.pp("linear"))?,
            config,
        })
    }

    pub fn config(&self) -> &BasalGangliaConfig {
        &self.config
    }

    /// Value estimate for a batch of stimuli
    pub fn value(&self, stimulus: &Tensor) -> CpgResult<Tensor> {
        self.value_fn.forward(stimulus)
    }

    /// Fresh hidden state seeded like the circuit's reference behaviour
    pub fn initial_state(&self, batch: usize, seed: u64, device: &Device) -> CpgResult<ThalamicState> {
        ThalamicState::random(batch, self.config.num_gpi, seed, device)
    }

    fn check_stimulus(&self, stimulus: &Tensor, name: &str) -> CpgResult<usize> {
        let (batch, width) = stimulus.dims2()?;
        if width != self.config.num_ctx {
            return Err(CpgError::DimensionMismatch {
                expected: self.config.num_ctx,
                got: width,
            });
        }
        check_finite_tensor(stimulus, name)?;
        Ok(batch)
    }

    /// Pathway gates (λ_D1, λ_D2) from the value change, each `(batch, 1)`
    pub fn pathway_gates(&self, delta_v: &Tensor) -> CpgResult<(Tensor, Tensor)> {
        let g = &self.gates;
        let d1 = delta_v
            .broadcast_sub(&g.theta_d1)?
            .broadcast_mul(&g.log_a1.exp()?)?;
        let d2 = delta_v
            .broadcast_sub(&g.theta_d2)?
            .broadcast_mul(&g.log_a2.exp()?)?
            .neg()?;
        Ok((
            candle_nn::ops::sigmoid(&d1)?,
            candle_nn::ops::sigmoid(&d2)?,
        ))
    }

    /// Bounded competitive accumulation in the striatum
    fn striatum(&self, j: &Tensor, k: &Tensor, lam: &Tensor) -> CpgResult<Tensor> {
        let mut v = j.zeros_like()?;
        let one_minus_k = k.affine(-1.0, 1.0)?;
        for _ in 0..self.config.ff_steps {
            v = (j.mul(&v.affine(-1.0, 1.0)?)? + one_minus_k.mul(&v)?)?;
            v = candle_nn::ops::sigmoid(&v.broadcast_mul(lam)?)?;
        }
        Ok(v)
    }

    pub fn forward(
        &self,
        stimulus_t: &Tensor,
        stimulus_t_1: &Tensor,
        hidden: &ThalamicState,
    ) -> CpgResult<BasalGangliaOutput> {
        let batch = self.check_stimulus(stimulus_t, "stimulus_t")?;
        let prev_batch = self.check_stimulus(stimulus_t_1, "stimulus_t_1")?;
        if prev_batch != batch {
            return Err(CpgError::DimensionMismatch {
                expected: batch,
                got: prev_batch,
            });
        }
        let (h_batch, h_width) = hidden.dims()?;
        if h_batch != batch || h_width != self.config.num_gpi {
            return Err(CpgError::DimensionMismatch {
                expected: self.config.num_gpi,
                got: h_width,
            });
        }
        check_finite_tensor(&hidden.hx, "thalamic_state")?;

        let c = &self.config;
        let g = &self.gates;

        let v_t = self.value_fn.forward(stimulus_t)?;
        let v_t_1 = self.value_fn.forward(stimulus_t_1)?;
        let delta_v = (&v_t - &v_t_1)?;
        let (lam_d1, lam_d2) = self.pathway_gates(&delta_v)?;

        let v_d1 = self.striatum(
            &self.fc_jd1.forward(stimulus_t)?,
            &self.fc_kd1.forward(stimulus_t)?,
            &lam_d1,
        )?;
        let v_d2 = self.striatum(
            &self.fc_jd2.forward(stimulus_t)?,
            &self.fc_kd2.forward(stimulus_t)?,
            &lam_d2,
        )?;
        let v_gpi_dp = self.fc_d1gpi.forward(&v_d1)?;

        // lateral couplings; the GPe kernel also carries an all-ones term
        let gpe_kernel = (self.lateral_gpe.broadcast_mul(&g.eps_glat)? + &self.ones_gpe)?.t()?;
        let stn_kernel = self.lateral_stn.broadcast_mul(&g.eps_slat)?.t()?;
        let stn_gpi = self.fc_stngpi.weight().detach().t()?;

        let device = stimulus_t.device();
        let mut v_gpi = Tensor::zeros((batch, c.num_gpi), DType::F32, device)?;
        let mut xgpe = Tensor::zeros((batch, c.num_gpe), DType::F32, device)?;
        let mut xstn = Tensor::zeros((batch, c.num_stn), DType::F32, device)?;
        let mut vstn = xstn.broadcast_mul(&lam_d2)?.tanh()?;
        let mut hx = hidden.hx.clone();

        for _ in 0..c.stn_gpe_iter {
            let dxgpe = ((vstn.broadcast_mul(&g.wsg)? - &xgpe)? + xgpe.matmul(&gpe_kernel)?)?;
            let dxgpe = (dxgpe - &v_d2)?.affine(c.eta_gpe, 0.0)?;
            xgpe = (xgpe + dxgpe)?;

            let dxstn = ((xgpe.broadcast_mul(&g.wgs)? - &xstn)? + vstn.matmul(&stn_kernel)?)?
                .affine(c.eta_stn(), 0.0)?;
            xstn = (xstn + dxstn)?;
            vstn = xstn.broadcast_mul(&lam_d2)?.tanh()?;

            let v_gpi_ip = vstn.matmul(&stn_gpi)?.broadcast_mul(&lam_d2)?;
            let dvgpi = ((v_gpi_ip.affine(2.0, 0.0)? - &v_gpi)? - &v_gpi_dp)?.affine(c.eta_gpi, 0.0)?;
            v_gpi = (v_gpi + dvgpi)?;

            hx = self.thalamus.forward(&v_gpi.neg()?, &hx)?;
        }

        // only the projection of the final thalamic state leaves the loop
        let correction = self.output.forward(&hx)?;
        check_finite_tensor(&correction, "bg_correction")?;
        check_finite_tensor(&v_t, "value")?;
        log::trace!("basal ganglia pass: batch {}, {} loop iterations", batch, c.stn_gpe_iter);

        Ok(BasalGangliaOutput {
            correction,
            value: v_t,
            hidden: ThalamicState { hx },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarMap;

    fn circuit() -> (VarMap, BasalGangliaCircuit) {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let bg = BasalGangliaCircuit::new(BasalGangliaConfig::tiny(), vb.pp("bg")).unwrap();
        (varmap, bg)
    }

    fn stimuli(batch: usize, width: usize) -> (Tensor, Tensor) {
        let device = Device::Cpu;
        let a = Tensor::randn(0f32, 1.0, (batch, width), &device).unwrap();
        let b = Tensor::randn(0f32, 1.0, (batch, width), &device).unwrap();
        (a, b)
    }

    #[test]
    fn test_output_shapes() {
        let (_, bg) = circuit();
        let c = BasalGangliaConfig::tiny();
        let (s_t, s_t_1) = stimuli(3, c.num_ctx);
        let hidden = bg.initial_state(3, 7, &Device::Cpu).unwrap();
        let out = bg.forward(&s_t, &s_t_1, &hidden).unwrap();
        assert_eq!(out.correction.dims(), &[3, c.num_out]);
        assert_eq!(out.value.dims(), &[3, 1]);
        assert_eq!(out.hidden.hx.dims(), &[3, c.num_gpi]);
    }

    #[test]
    fn test_initial_parameter_values() {
        let (varmap, _) = circuit();
        let data = varmap.data().lock().unwrap();
        let value = |name: &str| -> f32 {
            data[name].as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap()[0]
        };
        assert_eq!(value("bg.log_a1"), 1.0);
        assert_eq!(value("bg.thetad2"), 0.0);
        assert_eq!(value("bg.wsg"), 2.0);
        assert_eq!(value("bg.wgs"), -2.0);
        assert!((value("bg.epsilon_glat") - 0.05).abs() < 1e-7);
        assert!(!data.contains_key("bg.fc_stngpi.bias"));
    }

    #[test]
    fn test_gates_move_in_opposite_directions() {
        let (_, bg) = circuit();
        let dv = Tensor::new(&[[-1f32], [0.0], [1.0]], &Device::Cpu).unwrap();
        let (d1, d2) = bg.pathway_gates(&dv).unwrap();
        let d1: Vec<f32> = d1.flatten_all().unwrap().to_vec1().unwrap();
        let d2: Vec<f32> = d2.flatten_all().unwrap().to_vec1().unwrap();
        assert!(d1[0] < d1[1] && d1[1] < d1[2]);
        assert!(d2[0] > d2[1] && d2[1] > d2[2]);
        assert!((d1[1] - 0.5).abs() < 1e-6 && (d2[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_seeded_state_is_reproducible() {
        let device = Device::Cpu;
        let a = ThalamicState::random(2, 5, 42, &device).unwrap();
        let b = ThalamicState::random(2, 5, 42, &device).unwrap();
        let a: Vec<f32> = a.hx.flatten_all().unwrap().to_vec1().unwrap();
        let b: Vec<f32> = b.hx.flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(a, b);
        assert!(a.iter().all(|&v| (0.0..1.0).contains(&v)));
    }

    #[test]
    fn test_wrong_context_width_rejected() {
        let (_, bg) = circuit();
        let (s_t, s_t_1) = stimuli(2, 5);
        let hidden = bg.initial_state(2, 0, &Device::Cpu).unwrap();
        assert!(matches!(
            bg.forward(&s_t, &s_t_1, &hidden),
            Err(CpgError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_hidden_batch_mismatch_rejected() {
        let (_, bg) = circuit();
        let (s_t, s_t_1) = stimuli(2, BasalGangliaConfig::tiny().num_ctx);
        let hidden = bg.initial_state(3, 0, &Device::Cpu).unwrap();
        assert!(bg.forward(&s_t, &s_t_1, &hidden).is_err());
    }
}
