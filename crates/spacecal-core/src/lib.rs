//! Core math and data types for `spacecal`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec3`, `Mat3`, `Iso3`, ...),
//! - rotation helpers (axis/angle extraction, SO(3) projection, Euler angles),
//! - the pose/sample data model shared by the solvers and the engine,
//! - the [`CalibrationResult`] produced by a calibration run.

/// Linear algebra type aliases and rotation helpers.
mod math;
/// Device poses and paired samples.
mod pose;
/// Calibration result in operator-facing units.
mod result;
/// Deterministic synthetic rig generation helpers.
///
/// Public so that integration tests across the workspace can share it.
pub mod synthetic;

pub use math::*;
pub use pose::*;
pub use result::*;
