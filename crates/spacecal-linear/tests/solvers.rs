use nalgebra::{Rotation3, Translation3};
use rand::{rngs::StdRng, Rng, SeedableRng};
use spacecal_core::synthetic::{rig_samples, PoseGenerator};
use spacecal_core::{rotation_distance, Iso3, Mat3, Pose, Quat, Real, Sample, Vec3};
use spacecal_linear::{
    delta_rotation, estimate_joint, estimate_rotation, estimate_translation, kabsch,
    JointAccumulator, JointSolveOptions, RotationError, RotationSolveOptions,
};

fn rot_matrix(iso: &Iso3) -> Mat3 {
    iso.rotation.to_rotation_matrix().into_inner()
}

fn yaw(deg: Real) -> Quat {
    Quat::from_axis_angle(&Vec3::z_axis(), deg.to_radians())
}

#[test]
fn rotation_is_recovered_from_random_rig_motion() {
    let mut poses = PoseGenerator::new(11);
    let calibration = poses.isometry(std::f64::consts::PI, 1.0);
    let offset = poses.isometry(0.8, 0.2);
    let references = poses.reference_poses(60, 1.5);
    let samples = rig_samples(&calibration, &offset, &references);

    let estimate = estimate_rotation(&samples, &RotationSolveOptions::default()).unwrap();
    let err_deg = rotation_distance(&estimate.rotation, &rot_matrix(&calibration)).to_degrees();

    assert_eq!(estimate.sample_count, 60);
    assert!(estimate.delta_count >= 6);
    assert!(err_deg < 0.5, "rotation error {err_deg} deg");
}

#[test]
fn kabsch_output_is_a_proper_rotation_for_mirrored_axes() {
    let mut rng = StdRng::seed_from_u64(5);
    let mirror = Mat3::from_diagonal(&Vec3::new(1.0, 1.0, -1.0));
    let target: Vec<Vec3> = (0..20)
        .map(|_| {
            Vec3::new(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
            )
        })
        .collect();
    let reference: Vec<Vec3> = target.iter().map(|t| mirror * t).collect();

    let (r, _) = kabsch(&reference, &target).unwrap();
    assert!((r.determinant() - 1.0).abs() < 1e-9, "det = {}", r.determinant());
    assert!((r.transpose() * r - Mat3::identity()).norm() < 1e-9);
}

#[test]
fn deltas_below_threshold_are_always_rejected() {
    let mut rng = StdRng::seed_from_u64(17);
    let mut poses = PoseGenerator::new(18);
    let opts = RotationSolveOptions::default();

    for _ in 0..200 {
        let start = poses.rotation(std::f64::consts::PI);
        let axis = poses.rotation(std::f64::consts::PI) * Vec3::x();
        let angle = rng.random_range(0.0..0.399);
        let step = Quat::from_scaled_axis(axis * angle);

        let s1 = Sample::new(
            Pose::from_isometry(&Iso3::from_parts(Translation3::identity(), start)),
            Pose::from_isometry(&Iso3::from_parts(Translation3::identity(), start)),
        );
        let moved = step * start;
        let s2 = Sample::new(
            Pose::from_isometry(&Iso3::from_parts(Translation3::identity(), moved)),
            Pose::from_isometry(&Iso3::from_parts(Translation3::identity(), moved)),
        );

        assert!(!delta_rotation(&s1, &s2, &opts).valid, "angle {angle}");
    }
}

#[test]
fn pure_spin_about_one_axis_is_degenerate() {
    let calibration = Iso3::from_parts(Translation3::identity(), yaw(90.0));
    let references: Vec<Iso3> = (0..100)
        .map(|k| Iso3::from_parts(Translation3::identity(), yaw(5.0 * k as Real)))
        .collect();
    let samples = rig_samples(&calibration, &Iso3::identity(), &references);

    let err = estimate_rotation(&samples, &RotationSolveOptions::default()).unwrap_err();
    assert!(matches!(err, RotationError::Degenerate { .. }), "{err:?}");
}

#[test]
fn two_phase_solve_recovers_translation() {
    let mut poses = PoseGenerator::new(23);
    let calibration = poses.isometry(2.0, 1.5);
    let offset = poses.isometry(0.5, 0.15);
    let references = poses.reference_poses(40, 1.0);
    let samples = rig_samples(&calibration, &offset, &references);

    let rotation = estimate_rotation(&samples, &RotationSolveOptions::default())
        .unwrap()
        .rotation;
    let estimate = estimate_translation(&samples, &rotation).unwrap();

    let err = (estimate.translation - calibration.translation.vector).norm();
    assert!(err < 1e-6, "translation error {err} m");
    assert!(estimate.rms_residual < 1e-6);
}

#[test]
fn joint_solve_recovers_random_transforms_with_identity_offset() {
    for seed in [1u64, 2, 3] {
        let mut poses = PoseGenerator::new(seed);
        let calibration = poses.isometry(std::f64::consts::PI, 2.0);
        let references = poses.reference_poses(12, 1.5);
        let samples = rig_samples(&calibration, &Iso3::identity(), &references);

        let estimate = estimate_joint(&samples, &JointSolveOptions::default()).unwrap();
        let rot_err = rotation_distance(&estimate.rotation, &rot_matrix(&calibration));
        let trans_err = (estimate.translation - calibration.translation.vector).norm();

        assert!(rot_err < 1e-6, "seed {seed}: rotation error {rot_err}");
        assert!(trans_err < 1e-6, "seed {seed}: translation error {trans_err}");
        assert!((estimate.measured_scale - 1.0).abs() < 1e-6);
        assert_eq!(estimate.scale, 1.0);
        assert!((estimate.l.fixed_view::<3, 3>(0, 0) - Mat3::identity()).norm() < 1e-6);
    }
}

#[test]
fn joint_solve_handles_body_offset() {
    let mut poses = PoseGenerator::new(42);
    let calibration = poses.isometry(2.5, 1.0);
    let offset = poses.isometry(1.0, 0.3);
    let references = poses.reference_poses(15, 1.0);
    let samples = rig_samples(&calibration, &offset, &references);

    let mut acc = JointAccumulator::new();
    for sample in &samples {
        assert!(acc.add_sample(sample));
    }
    assert_eq!(acc.len(), 15);
    let estimate = acc.solve(&JointSolveOptions::default()).unwrap();

    let rot_err = rotation_distance(&estimate.rotation, &rot_matrix(&calibration));
    let trans_err = (estimate.translation - calibration.translation.vector).norm();
    assert!(rot_err < 1e-6, "rotation error {rot_err}");
    assert!(trans_err < 1e-6, "translation error {trans_err}");

    let inverse_offset = offset.inverse().to_homogeneous();
    let l_err = (estimate.l - inverse_offset.fixed_view::<3, 4>(0, 0)).norm();
    assert!(l_err < 1e-6, "offset error {l_err}");
}

#[test]
fn joint_solve_estimates_uniform_scale() {
    let system_scale = 1.25;
    let mut poses = PoseGenerator::new(9);
    let calibration = poses.isometry(1.5, 1.0);
    let references = poses.reference_poses(20, 1.0);

    let samples: Vec<Sample> = rig_samples(&calibration, &Iso3::identity(), &references)
        .into_iter()
        .map(|mut s| {
            s.target.translation /= system_scale;
            s
        })
        .collect();

    let opts = JointSolveOptions {
        estimate_scale: true,
        ..JointSolveOptions::default()
    };
    let estimate = estimate_joint(&samples, &opts).unwrap();

    assert!(
        (estimate.scale - system_scale).abs() < 1e-6,
        "scale = {}",
        estimate.scale
    );
    let trans_err = (estimate.translation - calibration.translation.vector).norm();
    assert!(trans_err < 1e-6, "translation error {trans_err}");
    let rot_err = rotation_distance(
        &estimate.rotation,
        &Rotation3::from(calibration.rotation).into_inner(),
    );
    assert!(rot_err < 1e-6, "rotation error {rot_err}");
}
