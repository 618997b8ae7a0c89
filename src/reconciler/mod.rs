//! Reconciler - turns two committed primitive trees into a patch script.
//!
//! The scheduler calls [`diff`] once per cycle with the previously
//! committed tree and the freshly materialized one; the resulting
//! [`PatchScript`] is the only thing the drawing backend ever sees.

mod diff;
mod patch;

pub use diff::diff;
pub use patch::{apply_patch, NodePath, PatchOp, PatchScript};
