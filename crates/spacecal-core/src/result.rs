//! The terminal artifact of a calibration run.

use serde::{Deserialize, Serialize};

use crate::{EulerAngles, EulerConvention, Mat3, Quat, Real, Vec3};

const CENTIMETERS_PER_METER: Real = 100.0;

/// Transform that maps the target tracking system into the reference one.
///
/// A raw target position `p` is displayed at `R * (scale * p) + t`, with `R`
/// rebuilt from `rotation` under `convention` and `t` the translation
/// converted to meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// Euler angles in degrees.
    pub rotation: EulerAngles,
    /// Translation in centimeters.
    pub translation: Vec3,
    #[serde(default = "default_scale")]
    pub scale: Real,
    #[serde(default)]
    pub convention: EulerConvention,
}

fn default_scale() -> Real {
    1.0
}

impl Default for CalibrationResult {
    fn default() -> Self {
        Self {
            rotation: EulerAngles::default(),
            translation: Vec3::zeros(),
            scale: 1.0,
            convention: EulerConvention::Standard,
        }
    }
}

impl CalibrationResult {
    /// Build a result from a rotation matrix and a translation in meters.
    pub fn from_rotation_translation(
        rotation: &Mat3,
        translation_m: &Vec3,
        convention: EulerConvention,
    ) -> Self {
        Self {
            rotation: EulerAngles::from_matrix(rotation, convention),
            translation: translation_m * CENTIMETERS_PER_METER,
            scale: 1.0,
            convention,
        }
    }

    pub fn rotation_matrix(&self) -> Mat3 {
        self.rotation.to_matrix(self.convention)
    }

    pub fn rotation_quaternion(&self) -> Quat {
        self.rotation.to_quaternion(self.convention)
    }

    pub fn set_rotation(&mut self, rotation: &Mat3) {
        self.rotation = EulerAngles::from_matrix(rotation, self.convention);
    }

    pub fn translation_meters(&self) -> Vec3 {
        self.translation / CENTIMETERS_PER_METER
    }

    pub fn set_translation_meters(&mut self, translation_m: &Vec3) {
        self.translation = translation_m * CENTIMETERS_PER_METER;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation_distance;
    use nalgebra::Rotation3;

    #[test]
    fn translation_is_stored_in_centimeters() {
        let result = CalibrationResult::from_rotation_translation(
            &Mat3::identity(),
            &Vec3::new(0.1, -0.25, 1.0),
            EulerConvention::Standard,
        );
        assert!((result.translation - Vec3::new(10.0, -25.0, 100.0)).norm() < 1e-12);
        assert!((result.translation_meters() - Vec3::new(0.1, -0.25, 1.0)).norm() < 1e-12);
        assert_eq!(result.scale, 1.0);
    }

    #[test]
    fn rotation_survives_json_roundtrip() {
        let rot = Rotation3::from_euler_angles(0.1, 0.2, -0.3).into_inner();
        let result = CalibrationResult::from_rotation_translation(
            &rot,
            &Vec3::zeros(),
            EulerConvention::InvertRoll,
        );
        let json = serde_json::to_string(&result).unwrap();
        let restored: CalibrationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.convention, EulerConvention::InvertRoll);
        assert!(rotation_distance(&restored.rotation_matrix(), &rot) < 1e-6);
    }

    #[test]
    fn missing_scale_defaults_to_one() {
        let json = r#"{"rotation":{"yaw":1.0,"pitch":2.0,"roll":3.0},"translation":[1.0,2.0,3.0]}"#;
        let restored: CalibrationResult = serde_json::from_str(json).unwrap();
        assert_eq!(restored.scale, 1.0);
        assert_eq!(restored.convention, EulerConvention::Standard);
    }
}
