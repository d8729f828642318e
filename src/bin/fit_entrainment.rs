//! # Entrainment Polynomial Fitting CLI
//!
//! Fit β(ω) once, store it as safetensors, and compare the plain and
//! modified Hopf oscillators driven at a few frequencies.
//!
//! ## Usage
//!
//! ```bash
//! # Fit with default thresholds and write coef.safetensors
//! cargo run --bin fit_entrainment
//!
//! # Fit from a controller config and simulate 5000 steps
//! cargo run --bin fit_entrainment -- -c config.json -o artifacts/coef.safetensors \
//!     --simulate 5000 --dt 0.001
//! ```

use clap::Parser;
use ndarray::Array1;
use neuro_cpg::{
    ControllerConfig, EntrainmentPolynomial, ModifiedHopfOscillator, OscillatorConfig,
    OscillatorState, PhaseOscillator,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Entrainment polynomial fitter
#[derive(Parser, Debug)]
#[command(name = "fit_entrainment")]
#[command(about = "Fit the frequency-to-duty-factor polynomial and inspect the oscillators")]
struct Args {
    /// Controller config (JSON); oscillator defaults are used when omitted
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Polynomial degree (overrides the config)
    #[arg(long, short = 'd')]
    degree: Option<usize>,

    /// Sampling step of the target curve (overrides the config)
    #[arg(long, short = 's')]
    step: Option<f64>,

    /// Where to write the coefficients
    #[arg(long, short = 'o', default_value = "coef.safetensors")]
    output: PathBuf,

    /// Number of table rows between 0 and the last threshold
    #[arg(long, default_value = "12")]
    table_rows: usize,

    /// Simulate plain vs. modified oscillators for this many steps (0 = skip)
    #[arg(long, default_value = "0")]
    simulate: usize,

    /// Integration step for the simulation
    #[arg(long, default_value = "0.001")]
    dt: f64,

    /// Frequencies (rad/s) driven during the simulation
    #[arg(long, value_delimiter = ',', default_value = "0.5,1.5,2.5,3.5")]
    omega: Vec<f64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            println!("[LOAD] Config: {}", path.display());
            ControllerConfig::from_json_file(path)?.oscillator
        }
        None => OscillatorConfig::default(),
    };
    if let Some(degree) = args.degree {
        config.degree = degree;
    }
    if let Some(step) = args.step {
        config.sampling_step = step;
    }

    println!("Entrainment Polynomial Fit");
    println!("==========================\n");
    println!("  thresholds: {:?}", config.thresholds);
    println!("  degree:     {}", config.degree);
    println!("  step:       {}", config.sampling_step);

    let poly = EntrainmentPolynomial::from_config(&config)?;
    let residual = poly.max_residual(&config.thresholds, config.sampling_step)?;
    poly.save(&args.output)?;
    println!("\n[SAVE] {} (max residual {:.4})\n", args.output.display(), residual);

    print_table(&poly, &config, args.table_rows.max(2));

    if args.simulate > 0 {
        simulate(&config, Arc::new(poly), &args.omega, args.simulate, args.dt)?;
    }
    Ok(())
}

fn print_table(poly: &EntrainmentPolynomial, config: &OscillatorConfig, rows: usize) {
    let end = config.thresholds[config.thresholds.len() - 1];
    println!("  {:>8}  {:>8}  {:>8}", "omega", "target", "beta");
    println!("  {:->8}  {:->8}  {:->8}", "", "", "");
    for i in 0..rows {
        let omega = end * i as f64 / (rows - 1) as f64;
        println!(
            "  {:>8.3}  {:>8.3}  {:>8.4}",
            omega,
            neuro_cpg::target_beta(&config.thresholds, omega),
            poly.evaluate(omega)
        );
    }
    println!();
}

fn simulate(
    config: &OscillatorConfig,
    poly: Arc<EntrainmentPolynomial>,
    omegas: &[f64],
    steps: usize,
    dt: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    let n = omegas.len();
    let omega = Array1::from(omegas.to_vec());
    let mu = Array1::ones(n);
    let initial = OscillatorState::unit(n);

    let plain = PhaseOscillator::new(config);
    let modified = ModifiedHopfOscillator::new(config, poly);

    let plain_traj = plain.run(&omega, &mu, &initial, steps, dt)?;
    let (mod_traj, rates) = modified.run(&omega, &mu, &initial, steps, dt)?;

    let plain_last = plain_traj.last().map(|s| s.radius()).unwrap_or_else(|| initial.radius());
    let mod_last = mod_traj.last().map(|s| s.radius()).unwrap_or_else(|| initial.radius());
    let mean_rate = rates
        .iter()
        .fold(Array1::<f64>::zeros(n), |acc, w| acc + w)
        / steps as f64;

    println!("Simulation: {} steps, dt = {}", steps, dt);
    println!(
        "  {:>8}  {:>8}  {:>10}  {:>10}  {:>10}  {:>10}",
        "omega", "beta", "r plain", "r mod", "w plain", "w mod"
    );
    for i in 0..n {
        println!(
            "  {:>8.3}  {:>8.4}  {:>10.5}  {:>10.5}  {:>10.4}  {:>10.4}",
            omega[i],
            modified.duty_factor(omega[i]),
            plain_last[i],
            mod_last[i],
            2.0 * config.phase_rate_scale * omega[i].abs(),
            mean_rate[i]
        );
    }
    if modified.stability().count() > 0 {
        println!(
            "\n[WARN] β clamped {} times; consider frequencies inside the fitted range",
            modified.stability().count()
        );
    }
    Ok(())
}
