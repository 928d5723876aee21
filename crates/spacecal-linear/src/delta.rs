use log::debug;
use spacecal_core::{angle_from_rotation, axis_from_rotation, Sample, Vec3};

use crate::RotationSolveOptions;

/// Rotation axes both devices exhibited between two capture instants.
///
/// Axes are unit length when `valid`; an invalid delta carries zero axes and
/// must not be fed to a solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaSample {
    pub ref_axis: Vec3,
    pub target_axis: Vec3,
    pub valid: bool,
}

impl DeltaSample {
    fn invalid() -> Self {
        Self {
            ref_axis: Vec3::zeros(),
            target_axis: Vec3::zeros(),
            valid: false,
        }
    }
}

/// Relative rotation axes between `s1` and `s2`.
///
/// The pair is rejected unless both devices turned by more than
/// `opts.min_delta_angle` and both unnormalized axes are longer than
/// `opts.min_axis_norm`.
pub fn delta_rotation(s1: &Sample, s2: &Sample, opts: &RotationSolveOptions) -> DeltaSample {
    if !s1.valid || !s2.valid {
        return DeltaSample::invalid();
    }

    let d_ref = s1.reference.rotation * s2.reference.rotation.transpose();
    let d_target = s1.target.rotation * s2.target.rotation.transpose();

    let ref_angle = angle_from_rotation(&d_ref);
    let target_angle = angle_from_rotation(&d_target);
    if ref_angle <= opts.min_delta_angle || target_angle <= opts.min_delta_angle {
        return DeltaSample::invalid();
    }

    let ref_axis = axis_from_rotation(&d_ref);
    let target_axis = axis_from_rotation(&d_target);
    if ref_axis.norm() <= opts.min_axis_norm || target_axis.norm() <= opts.min_axis_norm {
        return DeltaSample::invalid();
    }

    match (ref_axis.try_normalize(0.0), target_axis.try_normalize(0.0)) {
        (Some(ref_axis), Some(target_axis)) => DeltaSample {
            ref_axis,
            target_axis,
            valid: true,
        },
        _ => DeltaSample::invalid(),
    }
}

/// Valid deltas over every unordered pair of valid samples.
pub fn collect_deltas(samples: &[Sample], opts: &RotationSolveOptions) -> Vec<DeltaSample> {
    let valid: Vec<&Sample> = samples.iter().filter(|s| s.valid).collect();
    let mut deltas = Vec::new();
    let mut rejected = 0usize;

    for i in 0..valid.len() {
        for j in (i + 1)..valid.len() {
            let delta = delta_rotation(valid[i], valid[j], opts);
            if delta.valid {
                deltas.push(delta);
            } else {
                rejected += 1;
            }
        }
    }

    debug!(
        "delta extraction: {} samples, {} deltas kept, {} rejected",
        valid.len(),
        deltas.len(),
        rejected
    );
    deltas
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;
    use spacecal_core::{Mat3, Pose};

    fn sample_with(ref_rot: Mat3, target_rot: Mat3) -> Sample {
        Sample::new(
            Pose::new(ref_rot, Vec3::zeros()),
            Pose::new(target_rot, Vec3::zeros()),
        )
    }

    fn rot(axis: Vec3, angle: f64) -> Mat3 {
        Rotation3::from_scaled_axis(axis.normalize() * angle).into_inner()
    }

    #[test]
    fn small_rotation_is_rejected_regardless_of_axis() {
        let opts = RotationSolveOptions::default();
        for axis in [Vec3::x(), Vec3::y(), Vec3::z(), Vec3::new(1.0, -2.0, 0.5)] {
            let s1 = sample_with(Mat3::identity(), Mat3::identity());
            let s2 = sample_with(rot(axis, 0.39), rot(axis, 0.39));
            assert!(!delta_rotation(&s1, &s2, &opts).valid, "axis {axis:?}");
        }
    }

    #[test]
    fn rejection_requires_both_devices_to_turn() {
        let opts = RotationSolveOptions::default();
        let s1 = sample_with(Mat3::identity(), Mat3::identity());
        let s2 = sample_with(rot(Vec3::z(), 1.0), rot(Vec3::z(), 0.1));
        assert!(!delta_rotation(&s1, &s2, &opts).valid);
    }

    #[test]
    fn axes_are_unit_and_follow_the_relative_rotation() {
        let opts = RotationSolveOptions::default();
        let s1 = sample_with(rot(Vec3::x(), 0.2), rot(Vec3::x(), 0.2));
        let s2 = sample_with(
            rot(Vec3::y(), 1.0) * rot(Vec3::x(), 0.2),
            rot(Vec3::y(), 1.0) * rot(Vec3::x(), 0.2),
        );
        let delta = delta_rotation(&s1, &s2, &opts);
        assert!(delta.valid);
        assert!((delta.ref_axis.norm() - 1.0).abs() < 1e-12);
        // s1 * s2^T is a rotation by -1 rad about y.
        assert!((delta.ref_axis + Vec3::y()).norm() < 1e-9, "{:?}", delta.ref_axis);
        assert!((delta.target_axis - delta.ref_axis).norm() < 1e-9);
    }

    #[test]
    fn invalid_samples_produce_no_deltas() {
        let opts = RotationSolveOptions::default();
        let good = sample_with(Mat3::identity(), Mat3::identity());
        let turned = sample_with(rot(Vec3::z(), 1.0), rot(Vec3::z(), 1.0));
        let samples = [good, Sample::invalid(), turned];
        assert_eq!(collect_deltas(&samples, &opts).len(), 1);
    }
}
