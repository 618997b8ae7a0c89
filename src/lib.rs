//! # ember-tui
//!
//! Reactive terminal UI engine with a component/hook model.
//!
//! Applications describe their UI as pure render functions over props and
//! hook state; the engine materializes those descriptions into a primitive
//! tree, keeps per-instance state alive across renders, and hands the
//! drawing backend a minimal patch script per cycle.
//!
//! The render pipeline is a batched cycle:
//! ```text
//! setter calls → update queue → materialize → diff → backend apply → effects
//! ```
//!
//! State never mutates in place: setters enqueue updates into the
//! scheduler's thread-safe intake, and every update queued before a cycle
//! lands in exactly that one cycle.
//!
//! ## Modules
//!
//! - [`types`] - Prop values, prop records, text attributes
//! - [`element`] - Component/primitive descriptions and the primitive tree
//! - [`hooks`] - State cells, effects, handles, the render `Scope`
//! - [`engine`] - Instance arena, materializer, effect runner
//! - [`scheduler`] - Update intake and the render cycle driver
//! - [`reconciler`] - Tree diffing into patch scripts
//! - [`renderer`] - Backend seam, recording and crossterm backends
//! - [`task`] - Background tasks with effect-tied cancellation
//!
//! ## Example
//!
//! ```ignore
//! fn counter(_props: &Props, scope: &mut Scope) -> Result<Element, EngineError> {
//!     let (count, set_count) = scope.state(0i64)?;
//!     let on_press = Callback::new(move || set_count.update(|n| n + 1));
//!     Ok(primitive(
//!         "text",
//!         Props::new()
//!             .with("content", format!("count: {count}"))
//!             .with("on_press", on_press),
//!     ))
//! }
//!
//! const COUNTER: ComponentType = ComponentType::new("Counter", counter);
//!
//! let mut scheduler = Scheduler::new(TermBackend::new()?);
//! scheduler.start(ComponentDesc::new(COUNTER, Props::new()))?;
//! scheduler.run()?;
//! ```

pub mod element;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod reconciler;
pub mod renderer;
pub mod scheduler;
pub mod task;
pub mod types;

// Re-export the application-facing surface.
pub use element::{
    component, primitive, ComponentDesc, ComponentType, Element, PrimitiveDesc, PrimitiveNode,
    RenderFn,
};
pub use engine::InstanceId;
pub use error::{EffectFailure, EngineError};
pub use hooks::{Cleanup, Handle, Scope, Setter};
pub use reconciler::{diff, NodePath, PatchOp, PatchScript};
pub use renderer::{Backend, RecordingBackend, TermBackend};
pub use scheduler::{Scheduler, SchedulerHandle};
pub use task::{spawn, CancelToken, TaskHandle};
pub use types::{Attr, Callback, Props, Value};
