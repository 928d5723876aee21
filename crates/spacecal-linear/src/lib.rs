//! Closed-form solvers relating two tracking systems from rigidly linked
//! device samples.
//!
//! - [`collect_deltas`] / [`delta_rotation`]: relative rotation axes between
//!   sample pairs,
//! - [`estimate_rotation`]: Kabsch alignment of those axes,
//! - [`estimate_translation`]: translation once the rotation is known,
//! - [`JointAccumulator`] / [`estimate_joint`]: single-phase 24-unknown solve.

mod delta;
mod joint;
mod rotation;
mod translation;

pub use delta::*;
pub use joint::*;
pub use rotation::*;
pub use translation::*;
