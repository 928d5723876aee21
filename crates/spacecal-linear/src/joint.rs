//! Single-phase joint solve of the transform between two tracking systems.
//!
//! Each sample relates the raw target pose `T` and the reference pose `P`
//! through two unknown 3x4 affine maps,
//!
//! ```text
//! T * L = G * P
//! ```
//!
//! where `G` maps the reference system into the target system and `L` is the
//! inverse body offset between the rigidly linked devices. The 24 entries of
//! `G` and `L` are found from normal equations accumulated sample by sample,
//! so no sample buffer needs to be retained.

use log::debug;
use nalgebra::{SMatrix, SVector};
use serde::{Deserialize, Serialize};
use spacecal_core::{project_to_so3, Mat3, Mat34, Real, Sample, Vec3};
use thiserror::Error;

const UNKNOWNS: usize = 24;
const MIN_SAMPLES: usize = 3;
const PIVOT_TOLERANCE: Real = 1e-12;

type NormalMatrix = SMatrix<Real, UNKNOWNS, UNKNOWNS>;
type NormalVector = SVector<Real, UNKNOWNS>;

#[derive(Debug, Error, PartialEq)]
pub enum JointError {
    #[error("need at least {min} valid samples, got {got}")]
    InsufficientSamples { got: usize, min: usize },
    #[error("normal equations are singular")]
    Singular,
    #[error("solved transform has a degenerate rotation block")]
    Degenerate,
    #[error("invalid joint solve options: {0}")]
    InvalidOptions(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointSolveOptions {
    /// Samples accumulated before the solve runs.
    pub sample_count: usize,
    /// Report and apply the uniform scale between the two systems.
    pub estimate_scale: bool,
}

impl Default for JointSolveOptions {
    fn default() -> Self {
        Self {
            sample_count: 205,
            estimate_scale: false,
        }
    }
}

impl JointSolveOptions {
    pub fn validate(&self) -> Result<(), JointError> {
        if self.sample_count < MIN_SAMPLES {
            return Err(JointError::InvalidOptions(format!(
                "sample_count must be at least {MIN_SAMPLES}, got {}",
                self.sample_count
            )));
        }
        Ok(())
    }
}

/// Result of the joint solve, expressed as the target-to-reference
/// calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointEstimate {
    pub rotation: Mat3,
    /// Translation in meters.
    pub translation: Vec3,
    /// Scale applied to raw target positions; `1.0` unless scale estimation
    /// is enabled.
    pub scale: Real,
    /// Scale measured from `G` regardless of `estimate_scale`.
    pub measured_scale: Real,
    /// Reference-to-target map `G`.
    pub g: Mat34,
    /// Inverse body offset `L`.
    pub l: Mat34,
    pub sample_count: usize,
}

#[inline]
fn g_index(row: usize, col: usize) -> usize {
    4 * row + col
}

#[inline]
fn l_index(row: usize, col: usize) -> usize {
    12 + 4 * row + col
}

/// Running normal equations `A^T A x = A^T b` of the joint system.
#[derive(Debug, Clone)]
pub struct JointAccumulator {
    ata: NormalMatrix,
    atb: NormalVector,
    count: usize,
}

impl Default for JointAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl JointAccumulator {
    pub fn new() -> Self {
        Self {
            ata: NormalMatrix::zeros(),
            atb: NormalVector::zeros(),
            count: 0,
        }
    }

    /// Fold one sample into the normal equations. Invalid samples are
    /// ignored; returns whether the sample was used.
    pub fn add_sample(&mut self, sample: &Sample) -> bool {
        if !sample.valid {
            return false;
        }

        let t = sample.target.to_matrix34();
        let p = sample.reference.to_matrix34();
        // Homogeneous bottom row of the reference pose.
        let p_h = |k: usize, c: usize| if k < 3 { p[(k, c)] } else if c == 3 { 1.0 } else { 0.0 };

        for r in 0..3 {
            for c in 0..4 {
                let mut a = NormalVector::zeros();
                for k in 0..3 {
                    a[l_index(k, c)] = t[(r, k)];
                }
                for k in 0..4 {
                    a[g_index(r, k)] = -p_h(k, c);
                }
                let b = if c == 3 { -t[(r, 3)] } else { 0.0 };

                self.ata += a * a.transpose();
                self.atb += a * b;
            }
        }

        self.count += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Solve the accumulated system once.
    pub fn solve(&self, opts: &JointSolveOptions) -> Result<JointEstimate, JointError> {
        if self.count < MIN_SAMPLES {
            return Err(JointError::InsufficientSamples {
                got: self.count,
                min: MIN_SAMPLES,
            });
        }

        let lu = self.ata.full_piv_lu();
        let pivots = lu.u().diagonal().abs();
        if pivots.max() <= 0.0 || pivots.min() <= PIVOT_TOLERANCE * pivots.max() {
            return Err(JointError::Singular);
        }
        let x = lu.solve(&self.atb).ok_or(JointError::Singular)?;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(JointError::Singular);
        }

        let mut g = Mat34::zeros();
        let mut l = Mat34::zeros();
        for r in 0..3 {
            for c in 0..4 {
                g[(r, c)] = x[g_index(r, c)];
                l[(r, c)] = x[l_index(r, c)];
            }
        }

        let g_rot: Mat3 = g.fixed_view::<3, 3>(0, 0).into_owned();
        let g_trans: Vec3 = g.column(3).into_owned();

        let measured_scale = g_rot.singular_values().mean();
        if !measured_scale.is_finite() || measured_scale < 1e-9 {
            return Err(JointError::Degenerate);
        }
        let r_g = project_to_so3(&g_rot).ok_or(JointError::Degenerate)?;

        let rotation = r_g.transpose();
        let translation = -(rotation * g_trans) / measured_scale;
        let scale = if opts.estimate_scale {
            1.0 / measured_scale
        } else {
            1.0
        };

        debug!(
            "joint solve over {} samples: measured scale {:.5}",
            self.count, measured_scale
        );

        Ok(JointEstimate {
            rotation,
            translation,
            scale,
            measured_scale,
            g,
            l,
            sample_count: self.count,
        })
    }
}

/// Accumulate `samples` and solve in one call.
pub fn estimate_joint(
    samples: &[Sample],
    opts: &JointSolveOptions,
) -> Result<JointEstimate, JointError> {
    let mut acc = JointAccumulator::new();
    for sample in samples {
        acc.add_sample(sample);
    }
    acc.solve(opts)
}
