//! Numerical health checks
//!
//! Two kinds of problems are tracked here:
//! - **Faults**: NaN/Inf in an oscillator state or circuit activation. These
//!   abort the current step and surface as [`CpgError::NumericalFault`].
//! - **Stability warnings**: β(ω) evaluated close to 0 or 1, where the
//!   swing/stance rates blow up. The value is clamped and the event is
//!   logged and counted; stepping continues.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use candle_core::{DType, Tensor};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::CpgError;
use crate::CpgResult;

const WARN_EVERY: u64 = 1000;

/// A β(ω) evaluation that had to be clamped away from {0, 1}
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityWarning {
    /// Commanded angular frequency
    pub omega: f64,
    /// Unclamped polynomial value
    pub beta: f64,
    /// Value actually used
    pub clamped: f64,
}

/// Counts stability warnings; shareable across concurrent evaluations
#[derive(Debug, Default)]
pub struct StabilityMonitor {
    count: AtomicU64,
    last: Mutex<Option<StabilityWarning>>,
}

impl StabilityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and log a clamping event
    pub fn record(&self, warning: StabilityWarning) {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        // Out-of-range commands tend to persist for whole episodes.
        let level = if n == 1 || n % WARN_EVERY == 0 {
            log::Level::Warn
        } else {
            log::Level::Debug
        };
        log::log!(
            level,
            "beta({:.4}) = {:.6} outside validated range, clamped to {:.6} ({} warnings)",
            warning.omega,
            warning.beta,
            warning.clamped,
            n
        );
        if let Ok(mut last) = self.last.lock() {
            *last = Some(warning);
        }
    }

    /// Number of warnings recorded since creation or the last reset
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn last(&self) -> Option<StabilityWarning> {
        self.last.lock().ok().and_then(|guard| *guard)
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        if let Ok(mut last) = self.last.lock() {
            *last = None;
        }
    }
}

/// Fail with a [`CpgError::NumericalFault`] naming `name` if any value is NaN/Inf
pub fn check_finite_array(values: &Array1<f64>, name: &str) -> CpgResult<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(CpgError::numerical(name))
    }
}

/// Tensor counterpart of [`check_finite_array`]
pub fn check_finite_tensor(tensor: &Tensor, name: &str) -> CpgResult<()> {
    let values: Vec<f64> = tensor.to_dtype(DType::F64)?.flatten_all()?.to_vec1()?;
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        log::debug!("non-finite values in {}", name);
        Err(CpgError::numerical(name))
    }
}
