use nalgebra::{Isometry3, Matrix3, Matrix3x4, Matrix4, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

pub type Real = f64;

pub type Vec3 = Vector3<Real>;
pub type Mat3 = Matrix3<Real>;
pub type Mat4 = Matrix4<Real>;
pub type Mat34 = Matrix3x4<Real>;
pub type Iso3 = Isometry3<Real>;
pub type Quat = UnitQuaternion<Real>;

/// Unnormalized rotation axis of `r`: `(r21 - r12, r02 - r20, r10 - r01)`.
///
/// The norm equals `2 sin(angle)`, so it collapses towards zero both for tiny
/// rotations and for rotations close to a half turn.
pub fn axis_from_rotation(r: &Mat3) -> Vec3 {
    Vec3::new(
        r[(2, 1)] - r[(1, 2)],
        r[(0, 2)] - r[(2, 0)],
        r[(1, 0)] - r[(0, 1)],
    )
}

/// Rotation angle of `r` in radians, `acos((trace - 1) / 2)`.
pub fn angle_from_rotation(r: &Mat3) -> Real {
    ((r.trace() - 1.0) * 0.5).clamp(-1.0, 1.0).acos()
}

/// Project a general 3x3 matrix to the closest rotation matrix (SO(3))
/// using SVD.
///
/// Returns `None` if the decomposition does not produce both singular
/// vector sets.
pub fn project_to_so3(m: &Mat3) -> Option<Mat3> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;

    // Ensure det(R) > 0
    if r.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r = u_flipped * v_t;
    }
    Some(r)
}

/// Angle in radians of the relative rotation between `a` and `b`.
pub fn rotation_distance(a: &Mat3, b: &Mat3) -> Real {
    angle_from_rotation(&(a.transpose() * b))
}

/// How Euler angles are read out of (and written back into) a rotation.
///
/// Runtimes whose forward axis is `-Z` report roll with the opposite sign;
/// `InvertRoll` negates roll in both directions so that a stored result always
/// reconstructs the rotation it was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EulerConvention {
    #[default]
    Standard,
    InvertRoll,
}

impl EulerConvention {
    fn roll_sign(self) -> Real {
        match self {
            Self::Standard => 1.0,
            Self::InvertRoll => -1.0,
        }
    }
}

/// Yaw/pitch/roll in degrees, composed as `Rz(yaw) * Ry(pitch) * Rx(roll)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EulerAngles {
    pub yaw: Real,
    pub pitch: Real,
    pub roll: Real,
}

impl EulerAngles {
    pub fn new(yaw: Real, pitch: Real, roll: Real) -> Self {
        Self { yaw, pitch, roll }
    }

    /// Extract angles from a proper rotation matrix.
    pub fn from_matrix(r: &Mat3, convention: EulerConvention) -> Self {
        let (roll, pitch, yaw) = Rotation3::from_matrix_unchecked(*r).euler_angles();
        Self {
            yaw: yaw.to_degrees(),
            pitch: pitch.to_degrees(),
            roll: convention.roll_sign() * roll.to_degrees(),
        }
    }

    pub fn to_matrix(&self, convention: EulerConvention) -> Mat3 {
        Rotation3::from_euler_angles(
            convention.roll_sign() * self.roll.to_radians(),
            self.pitch.to_radians(),
            self.yaw.to_radians(),
        )
        .into_inner()
    }

    pub fn to_quaternion(&self, convention: EulerConvention) -> Quat {
        Quat::from_rotation_matrix(&Rotation3::from_matrix_unchecked(
            self.to_matrix(convention),
        ))
    }
}
