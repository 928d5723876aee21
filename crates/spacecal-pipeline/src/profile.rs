use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use spacecal_core::CalibrationResult;

use crate::CalibrationSpeed;

/// Persisted calibration together with the tracking systems it relates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub reference_tracking_system: String,
    pub target_tracking_system: String,
    pub result: CalibrationResult,
    #[serde(default)]
    pub speed: CalibrationSpeed,
    /// Set once a calibration run or a committed edit produced `result`.
    #[serde(default)]
    pub valid: bool,
}

impl Profile {
    pub fn new(
        reference_tracking_system: impl Into<String>,
        target_tracking_system: impl Into<String>,
        result: CalibrationResult,
        speed: CalibrationSpeed,
    ) -> Self {
        Self {
            reference_tracking_system: reference_tracking_system.into(),
            target_tracking_system: target_tracking_system.into(),
            result,
            speed,
            valid: true,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("failed to parse calibration profile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacecal_core::{EulerAngles, Vec3};

    #[test]
    fn json_roundtrip_keeps_systems_and_result() {
        let mut result = CalibrationResult::default();
        result.rotation = EulerAngles::new(90.0, 0.0, 5.0);
        result.translation = Vec3::new(10.0, 0.0, -3.5);
        let profile = Profile::new("lighthouse", "oculus", result, CalibrationSpeed::Slow);

        let restored = Profile::from_json(&profile.to_json().unwrap()).unwrap();
        assert_eq!(restored, profile);
    }

    #[test]
    fn garbage_is_reported() {
        let err = Profile::from_json("{").unwrap_err();
        assert!(err.to_string().contains("calibration profile"));
    }
}
