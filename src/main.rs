//! Neuro CPG Demo
//!
//! Walks through the locomotion controller end to end:
//! - Entrainment polynomial fit
//! - Gait selection and episode-start state
//! - Driver/coupled CPG stepping
//! - Floquet spectrum of the modified oscillator
//! - One basal-ganglia / motor-cortex pass mapped onto a gait command

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use neuro_cpg::prelude::*;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("╔══════════════════════════════════════════════════════════════════════╗");
    println!("║  Neuro CPG - Oscillator Locomotion with Basal-Ganglia Gating         ║");
    println!("╚══════════════════════════════════════════════════════════════════════╝\n");

    let config = OscillatorConfig::default();

    // 1. β(ω) fit
    let poly = Arc::new(demo_entrainment(&config)?);

    // 2. Gait tables
    let params = demo_gait(&config)?;

    // 3. CPG stepping
    demo_cpg(&config, poly.clone(), &params)?;

    // 4. Floquet analysis
    demo_floquet(&config, poly)?;

    // 5. Control network
    demo_control(&params)?;

    println!("\n✓ All demonstrations completed successfully!");
    Ok(())
}

fn banner(title: &str) {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  {}", title);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
}

fn demo_entrainment(config: &OscillatorConfig) -> Result<EntrainmentPolynomial, Box<dyn std::error::Error>> {
    banner("1. ENTRAINMENT POLYNOMIAL");

    let poly = EntrainmentPolynomial::from_config(config)?;
    let residual = poly.max_residual(&config.thresholds, config.sampling_step)?;
    println!("Degree {} fit, max residual {:.4}", poly.degree(), residual);
    for omega in [0.5, 1.5, 2.5, 3.5, 4.5] {
        println!("  β({:.1}) = {:.4}", omega, poly.evaluate(omega));
    }
    println!();
    Ok(poly)
}

fn demo_gait(config: &OscillatorConfig) -> Result<GaitParameters, Box<dyn std::error::Error>> {
    banner("2. GAIT SELECTION");

    let params = GaitParameters::select(Gait::Trot, Task::Straight, Direction::Forward, config)?;
    println!("Gait:       {} / {} / {}", params.gait, params.task, params.direction);
    println!("γ:          {:?}", params.phase_fractions.to_vec());
    println!("Heading:    {:?}", params.heading.to_vec());
    println!("Duty:       {}", params.duty_factor);
    let start = params.initial_state();
    println!("Start φ:    {:.3?}\n", start.phase().to_vec());
    Ok(params)
}

fn demo_cpg(
    config: &OscillatorConfig,
    poly: Arc<EntrainmentPolynomial>,
    params: &GaitParameters,
) -> Result<(), Box<dyn std::error::Error>> {
    banner("3. CPG NETWORK");

    let mut network = CpgNetwork::new(config, poly.clone())?;
    network.reset(params.initial_state())?;

    let command = GaitCommand::from_action(&[0.5, 1.0], &params.heading)?;
    let offsets = params.phase_offsets();
    let dt = 1e-3;
    let steps = network.run(&command.omega, &command.mu, &offsets, 10_000, dt)?;

    let last = network.coupled_state();
    println!("After {} steps (dt = {}):", steps.len(), dt);
    println!("  radius:          {:.4?}", last.radius().to_vec());
    println!("  φ1 − φ0:         {:.4}", last.phase_difference(1, 0));
    println!("  φ2 − φ0:         {:.4}", last.phase_difference(2, 0));
    println!("  β clamps:        {}", network.stability().count());

    #[cfg(feature = "feedback")]
    {
        let mut fb = FeedbackCpg::new(config, poly)?;
        fb.reset(params.initial_state(), &command.mu, &offsets)?;
        let trace = fb.run(&command.omega, &command.mu, &offsets, 2_000, dt)?;
        if let Some(step) = trace.last() {
            let drift = step.drift.radius().fold(0.0_f64, |m, &r| m.max(r));
            println!("  feedback drift:  {:.2e}", drift);
        }
    }
    println!();
    Ok(())
}

fn demo_floquet(
    config: &OscillatorConfig,
    poly: Arc<EntrainmentPolynomial>,
) -> Result<(), Box<dyn std::error::Error>> {
    banner("4. FLOQUET ANALYSIS");

    let oscillator = ModifiedHopfOscillator::new(config, poly);
    let field = ModifiedHopfField::new(&oscillator, &[2.0], &[1.0])?;
    let analyzer = FloquetAnalyzer::new(field, 1e-3)?;
    let period = analyzer.natural_period();
    let origin = analyzer.cycle_origin();
    let spectrum = analyzer.spectrum(period, &origin)?;

    println!("Period T = {:.4}", period);
    for (rho, kappa) in spectrum.multipliers.iter().zip(spectrum.exponents.iter()) {
        println!("  ρ = {:.4}   κ = {:.4}", rho, kappa);
    }
    let (kappa, v) = spectrum.slowest_isostable();
    let q = analyzer.input_sensitivity(period / 2.0, &origin, kappa, v, 1.0)?;
    println!("  Q(T/2) = {:.4?}\n", q.iter().map(|c| c.re).collect::<Vec<_>>());
    Ok(())
}

fn demo_control(params: &GaitParameters) -> Result<(), Box<dyn std::error::Error>> {
    banner("5. CONTROL NETWORK");

    let device = Device::Cpu;
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let config = ControllerConfig::tiny();
    let network = ControlNetwork::new(&config, vb)?;

    let ctx = config.basal_ganglia.num_ctx;
    let s_t = Tensor::randn(0f32, 1.0, (1, ctx), &device)?;
    let s_t_1 = Tensor::randn(0f32, 1.0, (1, ctx), &device)?;
    let hidden = network.initial_state(1, 0, &device)?;
    let out = network.forward(&s_t, &s_t_1, &hidden)?;

    let action: Vec<f64> = out
        .action
        .flatten_all()?
        .to_vec1::<f32>()?
        .into_iter()
        .map(f64::from)
        .collect();
    let value: Vec<f32> = out.value.flatten_all()?.to_vec1()?;
    println!("Action:  {:.4?}", action);
    println!("Value:   {:.4?}", value);

    // frequency must be positive for the oscillators to advance
    let scaled: Vec<f64> = action.iter().map(|a| (a + 1.0) / 2.0).collect();
    let command = GaitCommand::from_action(&scaled, &params.heading)?;
    println!("ω:       {:.4?}", command.omega.to_vec());
    println!("μ:       {:.4?}", command.mu.to_vec());
    Ok(())
}
