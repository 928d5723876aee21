//! Device poses and the paired samples collected during calibration.

use nalgebra::{Rotation3, Translation3};
use serde::{Deserialize, Serialize};

use crate::{Iso3, Mat3, Mat34, Quat, Real, Vec3};

/// Orientation and position (meters) of one tracked device, expressed in the
/// raw frame of the tracking system that reports it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rotation: Mat3,
    pub translation: Vec3,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(rotation: Mat3, translation: Vec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Mat3::identity(), Vec3::zeros())
    }

    /// Build a pose from a `[R | t]` 3x4 block.
    pub fn from_matrix34(m: &Mat34) -> Self {
        Self {
            rotation: m.fixed_view::<3, 3>(0, 0).into_owned(),
            translation: m.column(3).into_owned(),
        }
    }

    /// Build a pose from a row-major `[R | t]` block, the layout tracking
    /// runtimes hand out.
    pub fn from_rows(rows: &[[Real; 4]; 3]) -> Self {
        let mut m = Mat34::zeros();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                m[(r, c)] = *value;
            }
        }
        Self::from_matrix34(&m)
    }

    pub fn from_isometry(iso: &Iso3) -> Self {
        Self {
            rotation: iso.rotation.to_rotation_matrix().into_inner(),
            translation: iso.translation.vector,
        }
    }

    pub fn to_matrix34(&self) -> Mat34 {
        let mut m = Mat34::zeros();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.rotation);
        m.set_column(3, &self.translation);
        m
    }

    /// Rigid isometry view of the pose; the rotation block is assumed to be
    /// orthonormal.
    pub fn to_isometry(&self) -> Iso3 {
        let rot = Quat::from_rotation_matrix(&Rotation3::from_matrix_unchecked(self.rotation));
        Iso3::from_parts(Translation3::from(self.translation), rot)
    }
}

/// Reference and target poses captured on the same tick.
///
/// A sample is invalid when either device was not actively tracking at
/// capture time; invalid samples never reach a solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub reference: Pose,
    pub target: Pose,
    pub valid: bool,
}

impl Sample {
    pub fn new(reference: Pose, target: Pose) -> Self {
        Self {
            reference,
            target,
            valid: true,
        }
    }

    pub fn invalid() -> Self {
        Self {
            reference: Pose::identity(),
            target: Pose::identity(),
            valid: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_block_is_read_in_order() {
        let pose = Pose::from_rows(&[
            [1.0, 0.0, 0.0, 0.5],
            [0.0, 0.0, -1.0, 1.5],
            [0.0, 1.0, 0.0, -2.0],
        ]);
        assert_eq!(pose.translation, Vec3::new(0.5, 1.5, -2.0));
        assert_eq!(pose.rotation[(1, 2)], -1.0);
        assert_eq!(pose.rotation[(2, 1)], 1.0);
        assert_eq!(pose.to_matrix34()[(2, 3)], -2.0);
    }

    #[test]
    fn isometry_conversion_preserves_pose() {
        let iso = Iso3::from_parts(
            Translation3::new(0.1, -0.2, 0.3),
            Quat::from_euler_angles(0.2, 0.4, -0.6),
        );
        let pose = Pose::from_isometry(&iso);
        let back = pose.to_isometry();
        assert!((back.translation.vector - iso.translation.vector).norm() < 1e-12);
        assert!(back.rotation.angle_to(&iso.rotation) < 1e-6);
    }

    #[test]
    fn invalid_sample_is_flagged() {
        assert!(!Sample::invalid().valid);
        assert!(Sample::new(Pose::identity(), Pose::identity()).valid);
    }
}
