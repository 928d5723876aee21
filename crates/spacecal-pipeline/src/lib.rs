//! Calibration state machine aligning one tracking system to another.
//!
//! The [`CalibrationEngine`] is driven by a host loop through
//! [`CalibrationEngine::tick`]; everything it needs from the tracking runtime
//! goes through the [`CalibrationHost`] trait.

mod config;
mod engine;
mod host;
mod messages;
mod profile;
mod state;

pub use config::*;
pub use engine::*;
pub use host::*;
pub use messages::*;
pub use profile::*;
pub use state::*;
