//! Engine configuration.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use spacecal_core::{EulerConvention, Real};
use spacecal_linear::{JointSolveOptions, RotationSolveOptions};

/// Sampling speed tier; slower tiers collect more samples per phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationSpeed {
    #[default]
    Fast,
    Slow,
    VerySlow,
}

impl CalibrationSpeed {
    /// Samples collected in each two-phase sampling state.
    pub fn sample_count(self) -> usize {
        match self {
            Self::Fast => 100,
            Self::Slow => 250,
            Self::VerySlow => 500,
        }
    }
}

/// Which solver drives the `Translation` phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverMode {
    /// Kabsch rotation followed by a translation solve on a fresh buffer.
    #[default]
    TwoPhase,
    /// Rotation phase as in `TwoPhase`, then the 24-unknown joint solve
    /// replaces both rotation and translation.
    Joint,
}

/// Tick intervals (seconds) the host is asked to honour per state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateIntervals {
    /// Idle re-assertion of the committed profile.
    pub idle: Real,
    /// Live re-application while the operator edits the result.
    pub editing: Real,
    /// Sampling states; zero means every tick.
    pub sampling: Real,
}

impl Default for UpdateIntervals {
    fn default() -> Self {
        Self {
            idle: 1.0,
            editing: 0.1,
            sampling: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub speed: CalibrationSpeed,
    pub mode: SolverMode,
    pub rotation: RotationSolveOptions,
    pub joint: JointSolveOptions,
    /// Euler convention used when reporting solved rotations.
    pub convention: EulerConvention,
    pub intervals: UpdateIntervals,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.rotation.validate()?;
        self.joint.validate()?;
        ensure!(
            self.intervals.idle > 0.0 && self.intervals.editing > 0.0,
            "idle and editing intervals must be positive"
        );
        ensure!(
            self.intervals.sampling >= 0.0,
            "sampling interval must be non-negative"
        );
        Ok(())
    }
}
