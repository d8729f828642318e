//! Integration Tests for Neuro CPG
//!
//! Cross-module scenarios: oscillators driven through the network, gait
//! tables feeding the CPG, Floquet analysis of the stepped field and the
//! full control network.

use crate::basal_ganglia::ThalamicState;
use crate::config::{BasalGangliaConfig, ControllerConfig, OscillatorConfig};
use crate::control::ControlNetwork;
use crate::cpg::CpgNetwork;
use crate::entrainment::EntrainmentPolynomial;
use crate::error::CpgError;
use crate::floquet::{FloquetAnalyzer, LinearField, ModifiedHopfField};
use crate::gait::{Direction, Gait, GaitCommand, GaitParameters, Task};
use crate::oscillator::{OscillatorState, PhaseOscillator};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use nalgebra::{DMatrix, DVector};
use ndarray::Array1;
use std::f64::consts::PI;
use std::sync::Arc;

fn two_leg_config() -> OscillatorConfig {
    let mut config = OscillatorConfig::default();
    config.num_legs = 2;
    config.leg_phase_offsets = vec![0.0; 2];
    config
}

fn to_vec(t: &Tensor) -> Vec<f32> {
    t.flatten_all().unwrap().to_vec1().unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
// OSCILLATOR INTEGRATION TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod oscillator_tests {
    use super::*;

    #[test]
    fn test_limit_cycle_from_any_radius() {
        let osc = PhaseOscillator::new(&OscillatorConfig::default());
        let radii = [0.01, 0.25, 0.9, 1.1, 1.75, 2.0];
        for omega in [0.5, 3.0, -6.0] {
            let initial = OscillatorState::from_polar(
                &Array1::from(radii.to_vec()),
                &Array1::from_elem(radii.len(), 0.3),
            )
            .unwrap();
            let n = radii.len();
            let traj = osc
                .run(&Array1::from_elem(n, omega), &Array1::ones(n), &initial, 4000, 0.01)
                .unwrap();
            for r in traj.last().unwrap().radius().iter() {
                assert!((r - 1.0).abs() < 1e-3, "omega {} radius {}", omega, r);
            }
        }
    }

    #[test]
    fn test_amplitude_sets_cycle_radius() {
        let osc = PhaseOscillator::new(&OscillatorConfig::default());
        let mu = Array1::from(vec![0.25, 0.64]);
        let traj = osc
            .run(&Array1::from_elem(2, 2.0), &mu, &OscillatorState::unit(2), 3000, 0.01)
            .unwrap();
        let r = traj.last().unwrap().radius();
        assert!((r[0] - 0.5).abs() < 1e-3);
        assert!((r[1] - 0.8).abs() < 1e-3);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ENTRAINMENT ARTIFACT TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod entrainment_tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fit_anchor_and_idempotence() {
        let config = OscillatorConfig::default();
        let a = EntrainmentPolynomial::fit(&config.thresholds, config.degree, config.sampling_step)
            .unwrap();
        let b = EntrainmentPolynomial::fit(&config.thresholds, config.degree, config.sampling_step)
            .unwrap();
        assert_eq!(a, b);
        let residual = a.max_residual(&config.thresholds, config.sampling_step).unwrap();
        assert!((a.evaluate(config.thresholds[1]) - 0.75).abs() <= residual + 1e-9);
    }

    #[test]
    fn test_loaded_coefficients_drive_identical_network() {
        let config = OscillatorConfig::default();
        let fitted = EntrainmentPolynomial::from_config(&config).unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("coef.safetensors");
        fitted.save(&path).unwrap();
        let loaded = EntrainmentPolynomial::load(&path).unwrap();

        let mut a = CpgNetwork::new(&config, Arc::new(fitted)).unwrap();
        let mut b = CpgNetwork::new(&config, Arc::new(loaded)).unwrap();
        let omega = Array1::from(vec![0.5, 1.5, 2.5, 3.5]);
        let mu = Array1::ones(4);
        let offsets = Array1::from(vec![0.0, PI, PI / 2.0, 0.0]);
        let ra = a.run(&omega, &mu, &offsets, 200, 0.01).unwrap();
        let rb = b.run(&omega, &mu, &offsets, 200, 0.01).unwrap();
        assert_eq!(ra, rb);
    }

    #[test]
    fn test_missing_artifact_is_serialization_error() {
        let dir = TempDir::new().unwrap();
        let err = EntrainmentPolynomial::load(dir.path().join("absent.safetensors")).unwrap_err();
        assert!(matches!(err, CpgError::Serialization(_)));
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PHASE COUPLING TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod coupling_tests {
    use super::*;

    #[test]
    fn test_offset_pi_converges_to_anti_phase() {
        let config = two_leg_config();
        // constant β = 0.5: rotation-invariant oscillator
        let poly = Arc::new(EntrainmentPolynomial::from_coefficients(vec![0.5]).unwrap());
        let mut net = CpgNetwork::new(&config, poly).unwrap();
        net.reset(OscillatorState::unit(2)).unwrap();

        let omega = Array1::from_elem(2, 2.0 * PI);
        let mu = Array1::ones(2);
        let offsets = Array1::from(vec![0.0, PI]);
        net.run(&omega, &mu, &offsets, 20_000, 1e-3).unwrap();

        let diff = net.coupled_state().phase_difference(1, 0).abs();
        assert!((diff - PI).abs() < 0.05, "phase difference {}", diff);
    }

    #[test]
    fn test_equal_offsets_converge_to_same_phase() {
        let config = two_leg_config();
        let poly = Arc::new(EntrainmentPolynomial::from_config(&config).unwrap());
        let mut net = CpgNetwork::new(&config, poly).unwrap();
        net.reset(OscillatorState::from_phases(&[0.0, 2.0], 1.0)).unwrap();

        let omega = Array1::from_elem(2, 1.5);
        let mu = Array1::ones(2);
        let offsets = Array1::zeros(2);
        net.run(&omega, &mu, &offsets, 30_000, 1e-3).unwrap();

        let diff = net.coupled_state().phase_difference(1, 0);
        assert!(diff.abs() < 0.05, "phase difference {}", diff);
    }

    #[test]
    fn test_trot_gait_leg_relations() {
        let config = OscillatorConfig::default();
        let params =
            GaitParameters::select(Gait::Trot, Task::Straight, Direction::Forward, &config)
                .unwrap();
        let poly = Arc::new(EntrainmentPolynomial::from_config(&config).unwrap());
        let mut net = CpgNetwork::new(&config, poly).unwrap();
        net.reset(params.initial_state()).unwrap();

        let cmd = GaitCommand::from_action(&[0.5, 1.0], &params.heading).unwrap();
        let offsets = params.phase_offsets();
        let steps = net.run(&cmd.omega, &cmd.mu, &offsets, 20_000, 1e-3).unwrap();
        let last = &steps.last().unwrap().coupled;

        assert!(last.is_finite());
        assert!(last.phase_difference(2, 0).abs() < 0.1);
        assert!((last.phase_difference(1, 0).abs() - PI).abs() < 0.1);
        assert_eq!(net.stability().count(), 0);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// FLOQUET TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod floquet_tests {
    use super::*;

    #[test]
    fn test_multi_leg_monodromy_identity_at_zero() {
        let config = OscillatorConfig::default();
        let poly = Arc::new(EntrainmentPolynomial::from_config(&config).unwrap());
        let net = CpgNetwork::new(&config, poly).unwrap();
        let field =
            ModifiedHopfField::new(net.oscillator(), &[1.0, 1.0, 1.0, 1.0], &[1.0; 4]).unwrap();
        let analyzer = FloquetAnalyzer::new(field, 1e-3).unwrap();
        let z0 = ModifiedHopfField::state_vector(&OscillatorState::from_phases(
            &[0.1, 1.0, 2.0, 3.0],
            1.0,
        ));
        assert_eq!(analyzer.monodromy(0.0, &z0).unwrap(), DMatrix::identity(8, 8));
    }

    #[test]
    fn test_linear_monodromy_refines_with_step() {
        let a = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, -4.0, -0.5]);
        let t = 2.0;
        let z0 = DVector::from_vec(vec![1.0, 0.0]);
        let reference = FloquetAnalyzer::new(LinearField::new(a.clone()).unwrap(), 1e-5)
            .unwrap()
            .monodromy(t, &z0)
            .unwrap();
        let coarse = FloquetAnalyzer::new(LinearField::new(a.clone()).unwrap(), 1e-2)
            .unwrap()
            .monodromy(t, &z0)
            .unwrap();
        let fine = FloquetAnalyzer::new(LinearField::new(a).unwrap(), 1e-3)
            .unwrap()
            .monodromy(t, &z0)
            .unwrap();
        assert!((fine - &reference).norm() < (coarse - &reference).norm());
    }

    #[test]
    fn test_spectrum_along_stepped_trajectory() {
        let config = OscillatorConfig::default();
        let poly = Arc::new(EntrainmentPolynomial::from_config(&config).unwrap());
        let net = CpgNetwork::new(&config, poly).unwrap();
        let field = ModifiedHopfField::new(net.oscillator(), &[2.0], &[1.0]).unwrap();
        let analyzer = FloquetAnalyzer::new(field, 1e-3).unwrap();
        let spectrum = analyzer
            .spectrum(analyzer.natural_period(), &analyzer.cycle_origin())
            .unwrap();
        assert_eq!(spectrum.left_eigenvectors.len(), 2);
        assert!(spectrum.exponents[0].re < spectrum.exponents[1].re + 1e-12);
        assert!(matches!(
            analyzer.infinitesimal_shape_response(0.0),
            Err(CpgError::UnsupportedOperation(_))
        ));
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CONTROL NETWORK TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod control_tests {
    use super::*;

    fn network() -> (ControllerConfig, ControlNetwork) {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let config = ControllerConfig::tiny();
        let net = ControlNetwork::new(&config, vb).unwrap();
        (config, net)
    }

    fn context(config: &BasalGangliaConfig, batch: usize) -> (Tensor, Tensor) {
        let device = Device::Cpu;
        (
            Tensor::randn(0f32, 1.0, (batch, config.num_ctx), &device).unwrap(),
            Tensor::randn(0f32, 1.0, (batch, config.num_ctx), &device).unwrap(),
        )
    }

    #[test]
    fn test_fixed_hidden_state_is_deterministic() {
        let (config, net) = network();
        let (s_t, s_t_1) = context(&config.basal_ganglia, 3);
        let hidden = net.initial_state(3, 11, &Device::Cpu).unwrap();

        let a = net.forward(&s_t, &s_t_1, &hidden).unwrap();
        let b = net.forward(&s_t, &s_t_1, &hidden).unwrap();
        assert_eq!(to_vec(&a.action), to_vec(&b.action));
        assert_eq!(to_vec(&a.value), to_vec(&b.value));
        assert_eq!(to_vec(&a.hidden.hx), to_vec(&b.hidden.hx));
    }

    #[test]
    fn test_seed_changes_output_by_bounded_amount() {
        let (config, net) = network();
        let (s_t, s_t_1) = context(&config.basal_ganglia, 2);
        let device = Device::Cpu;
        let a = net
            .basal_ganglia()
            .forward(&s_t, &s_t_1, &ThalamicState::random(2, config.basal_ganglia.num_gpi, 1, &device).unwrap())
            .unwrap();
        let b = net
            .basal_ganglia()
            .forward(&s_t, &s_t_1, &ThalamicState::random(2, config.basal_ganglia.num_gpi, 2, &device).unwrap())
            .unwrap();
        let (ca, cb) = (to_vec(&a.correction), to_vec(&b.correction));
        assert_ne!(ca, cb);
        // both hidden states are bounded, so the projection difference is too
        assert!(ca.iter().zip(&cb).all(|(x, y)| (x - y).abs() < 10.0));
        // the value pathway ignores the hidden state entirely
        assert_eq!(to_vec(&a.value), to_vec(&b.value));
    }

    #[test]
    fn test_hidden_state_threads_across_calls() {
        let (config, net) = network();
        let (s_t, s_t_1) = context(&config.basal_ganglia, 1);
        let h0 = net.initial_state(1, 5, &Device::Cpu).unwrap();
        let first = net.forward(&s_t, &s_t_1, &h0).unwrap();
        let second = net.forward(&s_t, &s_t_1, &first.hidden).unwrap();
        assert!(to_vec(&second.hidden.hx).iter().all(|v| v.abs() <= 1.0));
        assert!(to_vec(&second.action).iter().all(|v| v.abs() < 1.0));
    }

    #[test]
    fn test_nan_stimulus_triggers_fault() {
        let (config, net) = network();
        let (s_t, s_t_1) = context(&config.basal_ganglia, 2);
        let hidden = net.initial_state(2, 0, &Device::Cpu).unwrap();

        let mut poisoned = to_vec(&s_t);
        poisoned[3] = f32::NAN;
        let poisoned = Tensor::from_vec(poisoned, s_t.dims(), &Device::Cpu).unwrap();

        match net.forward(&poisoned, &s_t_1, &hidden) {
            Err(CpgError::NumericalFault { tensor }) => assert_eq!(tensor, "stimulus_t"),
            other => panic!("expected numerical fault, got {:?}", other.map(|o| o.action)),
        }
        match net.forward(&s_t, &poisoned, &hidden) {
            Err(CpgError::NumericalFault { tensor }) => assert_eq!(tensor, "stimulus_t_1"),
            other => panic!("expected numerical fault, got {:?}", other.map(|o| o.action)),
        }
    }
}
