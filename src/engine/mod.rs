//! Rendering engine - instance arena, materializer, and effect runner.
//!
//! The engine owns the persistent side of the component model:
//! - Arena: slab allocation of instances, dirty flag propagation
//! - Materializer: expands a component tree into a primitive tree, reusing
//!   instances by type/key identity and collecting the effect batch
//! - Effect runner: executes the batch after commit with per-callback
//!   panic isolation
//!
//! # Architecture
//!
//! Instances are NOT objects with behavior. They are arena slots holding
//! hook state, the last render output, and dirty flags:
//!
//! ```text
//! Id 0: App     (parent=None, dirty=CHILD_DIRTY, hooks=[])
//! Id 1: Counter (parent=0,    dirty=SELF_DIRTY,  hooks=[state, effect])
//! Id 2: Header  (parent=0,    dirty=empty,       hooks=[])
//! ```
//!
//! A pass re-executes only the renders it must: self-dirty instances (and
//! fresh mounts) render, child-dirty ancestors re-walk their stored output,
//! clean subtrees return their committed primitive tree as-is.

pub(crate) mod arena;
pub(crate) mod effects;
pub(crate) mod materializer;

pub use arena::InstanceId;
