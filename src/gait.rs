//! Quadruped gait tables
//!
//! A gait fixes the relative phase γ of each leg (as a fraction of a cycle)
//! and its duty factor. The task and direction then permute γ and choose
//! the heading-control signs that flip the oscillation direction per leg.
//!
//! ```text
//! legs:   0 ── 1      heading signs multiply the commanded ω
//!         │    │      (a negative ω runs the leg backwards)
//!         3 ── 2
//! ```
//!
//! Everything here is a pure lookup and is fixed once per gait switch.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::config::OscillatorConfig;
use crate::error::CpgError;
use crate::oscillator::OscillatorState;
use crate::CpgResult;

/// The gait tables describe quadrupeds only
pub const GAIT_LEGS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gait {
    DsCrawl,
    LsCrawl,
    Trot,
    Pace,
    Bound,
    TransverseGallop,
    RotaryGallop,
    Turn,
}

impl Gait {
    pub const ALL: [Gait; 8] = [
        Gait::DsCrawl,
        Gait::LsCrawl,
        Gait::Trot,
        Gait::Pace,
        Gait::Bound,
        Gait::TransverseGallop,
        Gait::RotaryGallop,
        Gait::Turn,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Gait::DsCrawl => "ds_crawl",
            Gait::LsCrawl => "ls_crawl",
            Gait::Trot => "trot",
            Gait::Pace => "pace",
            Gait::Bound => "bound",
            Gait::TransverseGallop => "transverse_gallop",
            Gait::RotaryGallop => "rotary_gallop",
            Gait::Turn => "turn",
        }
    }

    /// Relative leg phases as cycle fractions
    pub fn phase_fractions(&self) -> [f64; GAIT_LEGS] {
        match self {
            Gait::DsCrawl => [0.0, 0.5, 0.75, 0.25],
            Gait::LsCrawl => [0.0, 0.5, 0.25, 0.75],
            Gait::Trot => [0.0, 0.5, 0.0, 0.5],
            Gait::Pace => [0.0, 0.5, 0.5, 0.0],
            Gait::Bound => [0.0, 0.0, 0.5, 0.5],
            Gait::TransverseGallop => [0.0, 0.1, 0.6, 0.5],
            Gait::RotaryGallop => [0.0, 0.1, 0.5, 0.6],
            Gait::Turn => [0.0; GAIT_LEGS],
        }
    }

    /// Fraction of the cycle each foot spends on the ground
    pub fn duty_factor(&self) -> f64 {
        match self {
            Gait::DsCrawl | Gait::LsCrawl => 0.75,
            Gait::Trot | Gait::Pace | Gait::Turn => 0.5,
            Gait::Bound | Gait::TransverseGallop | Gait::RotaryGallop => 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Straight,
    Rotate,
    Turn,
}

impl Task {
    pub const ALL: [Task; 3] = [Task::Straight, Task::Rotate, Task::Turn];

    pub fn name(&self) -> &'static str {
        match self {
            Task::Straight => "straight",
            Task::Rotate => "rotate",
            Task::Turn => "turn",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Forward,
        Direction::Backward,
        Direction::Left,
        Direction::Right,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

macro_rules! impl_name_parsing {
    ($ty:ty, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $ty {
            type Err = CpgError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$ty>::ALL
                    .into_iter()
                    .find(|v| v.name() == s)
                    .ok_or_else(|| CpgError::Configuration(format!("unknown {} '{}'", $what, s)))
            }
        }
    };
}

impl_name_parsing!(Gait, "gait");
impl_name_parsing!(Task, "task");
impl_name_parsing!(Direction, "direction");

/// Per-leg phase layout and heading signs for one gait/task/direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaitParameters {
    pub gait: Gait,
    pub task: Task,
    pub direction: Direction,
    /// Initial leg phases γ (cycle fractions)
    pub phase_fractions: Array1<f64>,
    /// Sign applied to each leg's commanded frequency
    pub heading: Array1<f64>,
    pub duty_factor: f64,
    /// Static per-leg offsets from the configuration (cycle fractions)
    pub leg_offsets: Array1<f64>,
}

impl GaitParameters {
    pub fn select(
        gait: Gait,
        task: Task,
        direction: Direction,
        config: &OscillatorConfig,
    ) -> CpgResult<Self> {
        if config.num_legs != GAIT_LEGS || config.leg_phase_offsets.len() != GAIT_LEGS {
            return Err(CpgError::Configuration(format!(
                "gait tables need {} legs, config has {}",
                GAIT_LEGS, config.num_legs
            )));
        }

        if task == Task::Rotate && !matches!(gait, Gait::DsCrawl | Gait::LsCrawl | Gait::Trot) {
            return Err(CpgError::Configuration(format!(
                "gait '{}' cannot rotate in place",
                gait
            )));
        }

        let mut gamma = gait.phase_fractions();
        let heading: [f64; GAIT_LEGS] = match (task, direction) {
            (Task::Straight, Direction::Forward) => [1.0, -1.0, -1.0, 1.0],
            (Task::Straight, Direction::Backward) => {
                gamma.rotate_right(2);
                [-1.0, 1.0, 1.0, -1.0]
            }
            (Task::Straight, Direction::Left) => {
                gamma.rotate_left(1);
                [1.0, 1.0, -1.0, -1.0]
            }
            (Task::Straight, Direction::Right) => {
                gamma.rotate_right(1);
                [-1.0, -1.0, 1.0, 1.0]
            }
            (Task::Rotate, Direction::Left) => {
                gamma = [0.75, 0.5, 0.25, 0.0];
                [1.0; GAIT_LEGS]
            }
            (Task::Rotate, Direction::Right) => {
                gamma = [0.0, 0.25, 0.5, 0.75];
                [-1.0; GAIT_LEGS]
            }
            (Task::Turn, Direction::Left | Direction::Right) => [1.0, -1.0, -1.0, 1.0],
            (Task::Rotate | Task::Turn, Direction::Forward | Direction::Backward) => {
                return Err(CpgError::Configuration(format!(
                    "task '{}' cannot move '{}'",
                    task, direction
                )))
            }
        };

        log::debug!("selected {}/{}/{} with gamma {:?}", gait, task, direction, gamma);
        Ok(Self {
            gait,
            task,
            direction,
            phase_fractions: Array1::from(gamma.to_vec()),
            heading: Array1::from(heading.to_vec()),
            duty_factor: gait.duty_factor(),
            leg_offsets: Array1::from(config.leg_phase_offsets.clone()),
        })
    }

    /// Leg phase offsets in radians, as consumed by the CPG coupling
    pub fn phase_offsets(&self) -> Array1<f64> {
        self.phase_fractions.mapv(|g| 2.0 * PI * g)
    }

    /// Episode-start oscillator state
    ///
    /// Each leg starts at φ = γ + offset (wrapped so that exactly one cycle
    /// maps to 0) shifted by `cos(2πφ)·3(1−duty)/8`, on the unit circle.
    pub fn initial_state(&self) -> OscillatorState {
        let skew = 3.0 * (1.0 - self.duty_factor) / 8.0;
        let phases: Vec<f64> = self
            .phase_fractions
            .iter()
            .zip(self.leg_offsets.iter())
            .map(|(&g, &o)| {
                let phi = if (g + o - 1.0).abs() < 1e-12 { 0.0 } else { g + o };
                let phi = phi + (2.0 * PI * phi).cos() * skew;
                2.0 * PI * phi
            })
            .collect();
        OscillatorState::from_phases(&phases, 1.0)
    }
}

/// Per-leg frequency and amplitude derived from a policy action
#[derive(Debug, Clone, PartialEq)]
pub struct GaitCommand {
    /// Signed angular frequency per leg (rad/s)
    pub omega: Array1<f64>,
    /// Target amplitude per leg
    pub mu: Array1<f64>,
}

impl GaitCommand {
    /// Map `(frequency, amplitude)` pairs onto legs.
    ///
    /// A 2-wide action drives all legs alike; a 4-wide action gives legs
    /// 0 and 3 the first pair and legs 1 and 2 the second.
    pub fn from_action(action: &[f64], heading: &Array1<f64>) -> CpgResult<Self> {
        if heading.len() != GAIT_LEGS {
            return Err(CpgError::DimensionMismatch {
                expected: GAIT_LEGS,
                got: heading.len(),
            });
        }
        let pairs: [usize; GAIT_LEGS] = match action.len() {
            2 => [0, 0, 0, 0],
            4 => [0, 1, 1, 0],
            n => {
                return Err(CpgError::Configuration(format!(
                    "action must have 2 or 4 entries, got {}",
                    n
                )))
            }
        };
        let omega = pairs
            .iter()
            .zip(heading.iter())
            .map(|(&p, &h)| 2.0 * PI * action[2 * p] * h)
            .collect();
        let mu = pairs.iter().map(|&p| action[2 * p + 1]).collect();
        Ok(Self { omega, mu })
    }
}
