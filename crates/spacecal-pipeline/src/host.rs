//! Collaborator interface between the engine and the tracking runtime.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use spacecal_core::{CalibrationResult, Pose, Quat, Real, Vec3};

use crate::{Message, Profile};

/// Runtime identifier of a tracked device.
pub type DeviceId = u32;

/// Latest pose of one device and whether it is actively tracked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedPose {
    pub pose: Pose,
    pub valid: bool,
}

impl TrackedPose {
    pub fn tracked(pose: Pose) -> Self {
        Self { pose, valid: true }
    }

    pub fn lost() -> Self {
        Self {
            pose: Pose::identity(),
            valid: false,
        }
    }
}

/// Offset the runtime applies to every pose reported for one device.
///
/// A displayed position is `rotation * (scale * p) + translation`; absent
/// fields leave the corresponding part of the current offset untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceTransform {
    pub enabled: bool,
    /// Meters.
    pub translation: Option<Vec3>,
    pub rotation: Option<Quat>,
    pub scale: Option<Real>,
}

impl DeviceTransform {
    /// Offset that leaves poses untouched.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            translation: Some(Vec3::zeros()),
            rotation: Some(Quat::identity()),
            scale: None,
        }
    }

    /// Rotation-only offset pushed after the rotation phase.
    pub fn rotation_only(rotation: Quat) -> Self {
        Self {
            enabled: true,
            translation: Some(Vec3::zeros()),
            rotation: Some(rotation),
            scale: None,
        }
    }

    /// Full offset for a calibration result.
    pub fn from_result(result: &CalibrationResult) -> Self {
        Self {
            enabled: true,
            translation: Some(result.translation_meters()),
            rotation: Some(result.rotation_quaternion()),
            scale: Some(result.scale),
        }
    }
}

/// Services the engine needs from the tracking runtime.
///
/// Every call may fail; the engine wraps failures with context and returns
/// them from [`crate::CalibrationEngine::tick`] without retrying.
pub trait CalibrationHost {
    /// Refresh pose snapshots; called once at the start of every tick.
    fn refresh_poses(&mut self) -> Result<()> {
        Ok(())
    }

    fn device_pose(&mut self, id: DeviceId) -> Result<TrackedPose>;

    fn apply_device_transform(&mut self, id: DeviceId, transform: &DeviceTransform) -> Result<()>;

    fn clear_device_transform(&mut self, id: DeviceId) -> Result<()> {
        self.apply_device_transform(id, &DeviceTransform::disabled())
    }

    fn persist_profile(&mut self, profile: &Profile) -> Result<()>;

    fn load_profile(&mut self) -> Result<Option<Profile>>;

    /// Devices currently reported by the named tracking system.
    fn devices_in_system(&mut self, _system: &str) -> Result<Vec<DeviceId>> {
        Ok(Vec::new())
    }

    /// Operator-facing text; progress is reported separately.
    fn report_message(&mut self, _message: &Message) {}

    fn report_progress(&mut self, _current: usize, _target: usize) {}
}
