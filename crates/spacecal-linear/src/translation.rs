use log::debug;
use nalgebra::{DMatrix, DVector};
use spacecal_core::{Mat3, Real, Sample, Vec3};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TranslationError {
    #[error("need at least {min} valid samples, got {got}")]
    InsufficientSamples { got: usize, min: usize },
    #[error("device orientations do not vary enough to fix the translation")]
    Degenerate,
    #[error("linear solve failed during translation estimation")]
    SolveFailed,
}

/// Translation (meters) completing a known rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranslationEstimate {
    pub translation: Vec3,
    pub sample_count: usize,
    /// Root-mean-square residual of the stacked system, meters.
    pub rms_residual: Real,
}

const MIN_SAMPLES: usize = 2;
const RANK_TOLERANCE: Real = 1e-9;

/// Solve for the translation `t` of the target-to-reference transform once
/// its rotation is known.
///
/// Each raw target pose is first rotated by `rotation`. For every pair of
/// samples `(i, j)` the body offset between the rigidly linked devices must
/// stay constant, which gives
/// `Q_j (p_ref_j - p_tgt_j) - Q_i (p_ref_i - p_tgt_i) = (Q_j - Q_i) t`
/// once with `Q = R_ref^T` and once with `Q = R_tgt^T`. The stacked system is
/// solved in the least-squares sense via SVD.
pub fn estimate_translation(
    samples: &[Sample],
    rotation: &Mat3,
) -> Result<TranslationEstimate, TranslationError> {
    let aligned: Vec<(Mat3, Mat3, Vec3)> = samples
        .iter()
        .filter(|s| s.valid)
        .map(|s| {
            let target_rot = rotation * s.target.rotation;
            let offset = s.reference.translation - rotation * s.target.translation;
            (
                s.reference.rotation.transpose(),
                target_rot.transpose(),
                offset,
            )
        })
        .collect();

    let n = aligned.len();
    if n < MIN_SAMPLES {
        return Err(TranslationError::InsufficientSamples {
            got: n,
            min: MIN_SAMPLES,
        });
    }

    let pairs = n * (n - 1) / 2;
    let mut a = DMatrix::<Real>::zeros(6 * pairs, 3);
    let mut b = DVector::<Real>::zeros(6 * pairs);

    let mut row = 0;
    for i in 0..n {
        for j in 0..i {
            let (ref_i, tgt_i, d_i) = &aligned[i];
            let (ref_j, tgt_j, d_j) = &aligned[j];
            for (q_i, q_j) in [(ref_i, ref_j), (tgt_i, tgt_j)] {
                a.view_mut((row, 0), (3, 3)).copy_from(&(q_j - q_i));
                b.rows_mut(row, 3).copy_from(&(q_j * d_j - q_i * d_i));
                row += 3;
            }
        }
    }

    let svd = a.clone().svd(true, true);
    let s = &svd.singular_values;
    let largest = s.max();
    if largest <= RANK_TOLERANCE || s.min() / largest < RANK_TOLERANCE {
        return Err(TranslationError::Degenerate);
    }

    let x = svd
        .solve(&b, 1e-12)
        .map_err(|_| TranslationError::SolveFailed)?;
    let translation = Vec3::new(x[0], x[1], x[2]);

    let residual = &a * &x - &b;
    let rms_residual = (residual.norm_squared() / (b.len() as Real)).sqrt();

    debug!(
        "translation solved from {} samples ({} pairs), rms residual {:.4} m",
        n, pairs, rms_residual
    );

    Ok(TranslationEstimate {
        translation,
        sample_count: n,
        rms_residual,
    })
}
