//! Engine error taxonomy.
//!
//! Failures during a cycle surface to whatever invoked
//! [`Scheduler::run_cycle`](crate::scheduler::Scheduler::run_cycle); the
//! engine never swallows a hook-order violation.

use std::io;

/// A single failed effect or cleanup, captured from a panic payload.
#[derive(Debug)]
pub struct EffectFailure {
    /// Name of the component the effect belongs to.
    pub component: &'static str,
    /// Whether the failure happened in a cleanup (vs. the effect body).
    pub in_cleanup: bool,
    /// Stringified panic payload.
    pub message: String,
}

impl std::fmt::Display for EffectFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = if self.in_cleanup { "cleanup" } else { "effect" };
        write!(f, "{} of `{}` panicked: {}", phase, self.component, self.message)
    }
}

/// Errors surfaced out of a render cycle.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A render execution touched a different number of hook slots than its
    /// previous execution. Slot addressing is corrupted; the cycle aborts.
    #[error(
        "component `{component}` used {actual} hooks, previous render used {expected}; \
         hooks must be called in the same number and order on every render"
    )]
    HookArity {
        component: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A hook call found a slot of a different kind at its index (e.g. a
    /// state call where the previous render placed an effect).
    #[error(
        "component `{component}` hook #{index} changed from {was} to {now}; \
         hooks must be called in the same order on every render"
    )]
    HookKind {
        component: &'static str,
        index: usize,
        was: &'static str,
        now: &'static str,
    },

    /// A state cell was re-read at a different Rust type.
    #[error("component `{component}` state cell #{index} was read at a different type")]
    HookType {
        component: &'static str,
        index: usize,
    },

    /// A render execution failed. The previously committed tree remains the
    /// last successfully drawn state.
    #[error("render of `{component}` failed: {message}")]
    Render {
        component: &'static str,
        message: String,
    },

    /// One or more effects or cleanups failed. The remaining effects in the
    /// batch still ran; failures are reported together afterwards.
    #[error("{} effect(s) failed; first: {}", .0.len(), .0[0])]
    Effects(Vec<EffectFailure>),

    /// The drawing backend failed to apply a patch script.
    #[error("backend failed to apply patch")]
    Backend(#[from] io::Error),
}

impl EngineError {
    /// Construct a render failure for a named component.
    pub fn render(component: &'static str, message: impl Into<String>) -> Self {
        Self::Render {
            component,
            message: message.into(),
        }
    }
}
