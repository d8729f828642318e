//! # Neuro CPG
//!
//! Rhythm generation and action gating for legged locomotion: a coupled
//! Hopf-oscillator central pattern generator (CPG) with frequency-dependent
//! swing/stance asymmetry, its Floquet linearisation, and a basal-ganglia /
//! thalamus / motor-cortex circuit that turns sensory context into actions.
//!
//! ## Features
//! - Plain and modified Hopf oscillators batched over legs
//! - Entrainment polynomial β(ω) fitted once and stored as safetensors
//! - Driver/coupled CPG network with per-leg phase offsets
//! - Monodromy, Floquet spectrum and isostable sensitivities
//! - Basal-ganglia circuit with explicit thalamic state (candle)
//! - Optional closed-loop drift correction (`feedback` feature)
//!
//! ## Architecture
//!
//! ```text
//!   sensory context (s_t, s_t-1)
//!            │
//!   ┌────────┴─────────┐
//!   │ BasalGanglia     │── value v_t
//!   │  D1/D2 ▸ GPe/STN │
//!   │  ▸ GPi ▸ thalamus│
//!   └────────┬─────────┘
//!            │ correction
//!   MotorBlend: tanh(cortex(s_t) + correction) ── action
//!            │
//!   GaitCommand (ω, μ per leg)
//!            │
//!   ┌────────┴─────────┐
//!   │ CpgNetwork       │   driver (Hopf) ─R(γ)─▶ coupled (modified Hopf)
//!   │  β(ω) ◀ Entrain. │
//!   └────────┬─────────┘
//!            │
//!   oscillator state per leg ──▶ joint targets (caller)
//! ```

// Ambient
pub mod config;
pub mod error;
pub mod stability;

// Oscillators
pub mod entrainment;
pub mod oscillator;
pub mod gait;
pub mod cpg;
pub mod floquet;
#[cfg(feature = "feedback")]
pub mod feedback;

// Neural circuit
pub mod mlp;
pub mod basal_ganglia;
pub mod motor;
pub mod control;

// Integration tests
#[cfg(test)]
mod tests;

pub use config::{BasalGangliaConfig, ControllerConfig, MotorCortexConfig, OscillatorConfig};
pub use error::CpgError;
pub use stability::{check_finite_array, check_finite_tensor, StabilityMonitor, StabilityWarning};

pub use entrainment::{sample_target_curve, target_beta, EntrainmentPolynomial, BETA_ANCHORS};
pub use oscillator::{
    swing_stance_selector, ModifiedHopfOscillator, OscillatorState, PhaseOscillator, RateTerms,
};
pub use gait::{Direction, Gait, GaitCommand, GaitParameters, Task};
pub use cpg::{CpgNetwork, CpgStep};
pub use floquet::{
    FloquetAnalyzer, FloquetSpectrum, LinearField, ModifiedHopfField, VectorField,
};
#[cfg(feature = "feedback")]
pub use feedback::{FeedbackCpg, FeedbackStep};

pub use mlp::Mlp;
pub use basal_ganglia::{BasalGangliaCircuit, BasalGangliaOutput, ThalamicCell, ThalamicState};
pub use motor::MotorBlend;
pub use control::{trainable_vars, ControlNetwork, ControlOutput, ParamTag};

/// Result type for CPG and circuit operations
pub type CpgResult<T> = Result<T, CpgError>;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BasalGangliaCircuit,
        BasalGangliaConfig,
        ControlNetwork,
        ControllerConfig,
        CpgError,
        CpgNetwork,
        CpgResult,
        Direction,
        EntrainmentPolynomial,
        FloquetAnalyzer,
        Gait,
        GaitCommand,
        GaitParameters,
        ModifiedHopfField,
        ModifiedHopfOscillator,
        MotorBlend,
        OscillatorConfig,
        OscillatorState,
        PhaseOscillator,
        Task,
        ThalamicState,
    };
    #[cfg(feature = "feedback")]
    pub use crate::FeedbackCpg;
}
