//! Calibration states and their transition table.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationState {
    /// Idle; the committed profile is periodically re-applied.
    #[default]
    None,
    /// Validating the selected devices before sampling.
    Begin,
    /// Collecting samples for the rotation solve.
    Rotation,
    /// Collecting samples for the translation (or joint) solve.
    Translation,
    /// Operator is hand-editing the working result.
    Editing,
    /// Operator is dragging the calibration with the reference device.
    Referencing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationEvent {
    Start,
    DevicesReady,
    DevicesMissing,
    RotationSolved,
    TranslationSolved,
    SolveFailed,
    Abort,
    Edit,
    Commit,
    Cancel,
    Grab,
    Release,
}

impl CalibrationEvent {
    pub const ALL: [CalibrationEvent; 12] = [
        Self::Start,
        Self::DevicesReady,
        Self::DevicesMissing,
        Self::RotationSolved,
        Self::TranslationSolved,
        Self::SolveFailed,
        Self::Abort,
        Self::Edit,
        Self::Commit,
        Self::Cancel,
        Self::Grab,
        Self::Release,
    ];
}

impl CalibrationState {
    pub const ALL: [CalibrationState; 6] = [
        Self::None,
        Self::Begin,
        Self::Rotation,
        Self::Translation,
        Self::Editing,
        Self::Referencing,
    ];

    /// Successor of `self` under `event`, or `None` when the event is not
    /// defined for this state.
    pub fn next(self, event: CalibrationEvent) -> Option<CalibrationState> {
        use CalibrationEvent as E;
        use CalibrationState as S;

        match (self, event) {
            (S::None, E::Start) => Some(S::Begin),
            (S::None, E::Edit) => Some(S::Editing),

            (S::Begin, E::DevicesReady) => Some(S::Rotation),
            (S::Begin, E::DevicesMissing | E::Abort) => Some(S::None),

            (S::Rotation, E::RotationSolved) => Some(S::Translation),
            (S::Rotation, E::SolveFailed | E::Abort) => Some(S::None),

            (S::Translation, E::TranslationSolved | E::SolveFailed | E::Abort) => Some(S::None),

            (S::Editing, E::Commit | E::Cancel) => Some(S::None),
            (S::Editing, E::Grab) => Some(S::Referencing),
            (S::Editing, E::Start) => Some(S::Begin),

            (S::Referencing, E::Release) => Some(S::Editing),
            (S::Referencing, E::Cancel) => Some(S::None),

            _ => None,
        }
    }

    /// States in which one sample is captured per tick.
    pub fn is_sampling(self) -> bool {
        matches!(self, Self::Rotation | Self::Translation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_reaches_rotation_only_when_devices_are_ready() {
        for event in CalibrationEvent::ALL {
            let next = CalibrationState::Begin.next(event);
            if next == Some(CalibrationState::Rotation) {
                assert_eq!(event, CalibrationEvent::DevicesReady);
            }
        }
    }

    #[test]
    fn every_state_can_get_back_to_idle() {
        for state in CalibrationState::ALL {
            if state == CalibrationState::None {
                continue;
            }
            let back = CalibrationEvent::ALL
                .iter()
                .filter_map(|e| state.next(*e))
                .any(|s| s == CalibrationState::None);
            assert!(back, "{state:?} has no path to None");
        }
    }

    #[test]
    fn sampling_states() {
        assert!(CalibrationState::Rotation.is_sampling());
        assert!(CalibrationState::Translation.is_sampling());
        assert!(!CalibrationState::Editing.is_sampling());
    }
}
