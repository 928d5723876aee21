use log::debug;
use serde::{Deserialize, Serialize};
use spacecal_core::{Mat3, Real, Sample, Vec3};
use thiserror::Error;

use crate::collect_deltas;

#[derive(Debug, Error, PartialEq)]
pub enum RotationError {
    #[error("need at least {min} valid rotation deltas, got {got}")]
    InsufficientDeltas { got: usize, min: usize },
    #[error("rotation axes span less than a plane (singular value ratio {ratio:.2e})")]
    Degenerate { ratio: Real },
    #[error("axis sets differ in length: {reference} reference vs {target} target")]
    MismatchedAxes { reference: usize, target: usize },
    #[error("svd failed")]
    SvdFailed,
    #[error("invalid rotation solve options: {0}")]
    InvalidOptions(String),
}

/// Thresholds applied while extracting deltas and solving for the rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationSolveOptions {
    /// Minimum number of valid deltas before the SVD is attempted.
    pub min_deltas: usize,
    /// Minimum ratio between the second-largest and largest singular value
    /// of the axis cross-covariance.
    pub min_singular_ratio: Real,
    /// Minimum rotation angle (radians) both devices must show between two
    /// samples.
    pub min_delta_angle: Real,
    /// Minimum norm of the unnormalized rotation axis.
    pub min_axis_norm: Real,
}

impl Default for RotationSolveOptions {
    fn default() -> Self {
        Self {
            min_deltas: 6,
            min_singular_ratio: 1e-3,
            min_delta_angle: 0.4,
            min_axis_norm: 0.01,
        }
    }
}

impl RotationSolveOptions {
    pub fn validate(&self) -> Result<(), RotationError> {
        if self.min_deltas < 3 {
            return Err(RotationError::InvalidOptions(format!(
                "min_deltas must be at least 3, got {}",
                self.min_deltas
            )));
        }
        if !(0.0..1.0).contains(&self.min_singular_ratio) {
            return Err(RotationError::InvalidOptions(format!(
                "min_singular_ratio must lie in [0, 1), got {}",
                self.min_singular_ratio
            )));
        }
        if !(0.0..std::f64::consts::PI).contains(&self.min_delta_angle) {
            return Err(RotationError::InvalidOptions(format!(
                "min_delta_angle must lie in [0, pi), got {}",
                self.min_delta_angle
            )));
        }
        if self.min_axis_norm < 0.0 {
            return Err(RotationError::InvalidOptions(format!(
                "min_axis_norm must be non-negative, got {}",
                self.min_axis_norm
            )));
        }
        Ok(())
    }
}

/// Rotation mapping target-system axes onto reference-system axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationEstimate {
    pub rotation: Mat3,
    /// Valid samples the deltas were built from.
    pub sample_count: usize,
    pub delta_count: usize,
    /// Singular values of the centered cross-covariance, descending.
    pub singular_values: Vec3,
}

/// Best-fit proper rotation `R` with `reference[k] ~ R * target[k]`.
///
/// Both point sets are centered before the cross-covariance is formed; the
/// reflection case is corrected by flipping the singular vector paired with
/// the smallest singular value. Returns the rotation and the singular values
/// sorted in descending order.
pub fn kabsch(reference: &[Vec3], target: &[Vec3]) -> Result<(Mat3, Vec3), RotationError> {
    if reference.len() != target.len() {
        return Err(RotationError::MismatchedAxes {
            reference: reference.len(),
            target: target.len(),
        });
    }
    if reference.is_empty() {
        return Err(RotationError::InsufficientDeltas { got: 0, min: 1 });
    }

    let n = reference.len() as Real;
    let ref_centroid = reference.iter().sum::<Vec3>() / n;
    let target_centroid = target.iter().sum::<Vec3>() / n;

    let mut h = Mat3::zeros();
    for (r, t) in reference.iter().zip(target.iter()) {
        h += (r - ref_centroid) * (t - target_centroid).transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u.ok_or(RotationError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(RotationError::SvdFailed)?;
    let s = svd.singular_values;

    let mut weakest = 0;
    for k in 1..3 {
        if s[k] < s[weakest] {
            weakest = k;
        }
    }

    let mut correction = Vec3::repeat(1.0);
    if (u * v_t).determinant() < 0.0 {
        correction[weakest] = -1.0;
    }
    let rotation = u * Mat3::from_diagonal(&correction) * v_t;

    let mut sorted = [s[0], s[1], s[2]];
    sorted.sort_by(|a, b| b.total_cmp(a));

    Ok((rotation, Vec3::new(sorted[0], sorted[1], sorted[2])))
}

/// Estimate the rotation between two tracking systems from rigidly linked
/// device samples.
///
/// Every unordered pair of valid samples contributes one delta; the
/// resulting axis pairs are aligned with [`kabsch`].
pub fn estimate_rotation(
    samples: &[Sample],
    opts: &RotationSolveOptions,
) -> Result<RotationEstimate, RotationError> {
    opts.validate()?;

    let sample_count = samples.iter().filter(|s| s.valid).count();
    let deltas = collect_deltas(samples, opts);
    if deltas.len() < opts.min_deltas {
        return Err(RotationError::InsufficientDeltas {
            got: deltas.len(),
            min: opts.min_deltas,
        });
    }

    let ref_axes: Vec<Vec3> = deltas.iter().map(|d| d.ref_axis).collect();
    let target_axes: Vec<Vec3> = deltas.iter().map(|d| d.target_axis).collect();
    let (rotation, singular_values) = kabsch(&ref_axes, &target_axes)?;

    let ratio = if singular_values[0] > Real::EPSILON {
        singular_values[1] / singular_values[0]
    } else {
        0.0
    };
    if ratio < opts.min_singular_ratio {
        debug!(
            "rotation solve rejected: singular values {:.3e} {:.3e} {:.3e}",
            singular_values[0], singular_values[1], singular_values[2]
        );
        return Err(RotationError::Degenerate { ratio });
    }

    debug!(
        "rotation solved from {} samples / {} deltas, singular values {:.3e} {:.3e} {:.3e}",
        sample_count, deltas.len(), singular_values[0], singular_values[1], singular_values[2]
    );

    Ok(RotationEstimate {
        rotation,
        sample_count,
        delta_count: deltas.len(),
        singular_values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;

    #[test]
    fn kabsch_recovers_known_rotation_of_axes() {
        let truth = Rotation3::from_euler_angles(0.3, -0.5, 1.2).into_inner();
        let target = vec![
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.6, 0.8, 0.0),
            Vec3::new(0.0, -0.6, 0.8),
        ];
        let reference: Vec<Vec3> = target.iter().map(|t| truth * t).collect();

        let (r, s) = kabsch(&reference, &target).unwrap();
        assert!((r - truth).norm() < 1e-9, "r = {r}");
        assert!(s[0] >= s[1] && s[1] >= s[2]);
    }

    #[test]
    fn kabsch_rejects_mismatched_sets() {
        let err = kabsch(&[Vec3::x()], &[]).unwrap_err();
        assert_eq!(
            err,
            RotationError::MismatchedAxes {
                reference: 1,
                target: 0
            }
        );
    }

    #[test]
    fn too_few_samples_are_reported_with_counts() {
        let err = estimate_rotation(&[], &RotationSolveOptions::default()).unwrap_err();
        assert_eq!(err, RotationError::InsufficientDeltas { got: 0, min: 6 });
    }

    #[test]
    fn options_are_validated() {
        let opts = RotationSolveOptions {
            min_singular_ratio: 2.0,
            ..RotationSolveOptions::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(RotationError::InvalidOptions(_))
        ));
        assert!(RotationSolveOptions::default().validate().is_ok());
    }
}
