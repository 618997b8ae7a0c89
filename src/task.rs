//! Background tasks spawned from effects.
//!
//! Render functions must stay synchronous and non-blocking, so anything
//! long-running goes through [`spawn`], typically from inside an effect.
//! A task reports back only via a [`Setter`](crate::Setter) - never by
//! touching instance state directly. Cancellation is cooperative: the
//! engine flips the token when the owning effect's cleanup runs, the task
//! polls it at its own convenient points.
//!
//! # Example
//!
//! ```ignore
//! scope.effect(Some(vec![]), move || {
//!     let task = task::spawn(move |token| {
//!         while !token.is_cancelled() {
//!             set_tick.update(|t| t + 1);
//!             thread::sleep(Duration::from_secs(1));
//!         }
//!     });
//!     Some(task.cancel_on_cleanup())
//! })?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::trace;

use crate::hooks::Cleanup;

/// Cooperative cancellation flag handed to the task body.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Handle to a spawned task. Dropping the handle detaches the task; it
/// keeps running until its body returns or observes cancellation.
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Flip the cancellation token. Does not block.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether the task body has returned.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Block until the task body returns. A panicking task body is
    /// swallowed here; the task already ran detached from the render
    /// thread.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    /// Consume the handle into an effect cleanup that cancels the task.
    ///
    /// This ties the task's lifetime to the owning effect: the engine runs
    /// the cleanup when the effect's deps change or its instance unmounts.
    pub fn cancel_on_cleanup(self) -> Cleanup {
        Box::new(move || {
            trace!("cancelling background task");
            self.cancel();
        })
    }
}

/// Run `f` on a background thread with a cancellation token.
pub fn spawn(f: impl FnOnce(CancelToken) + Send + 'static) -> TaskHandle {
    let cancelled = Arc::new(AtomicBool::new(false));
    let token = CancelToken {
        cancelled: Arc::clone(&cancelled),
    };
    let thread = thread::spawn(move || f(token));
    TaskHandle {
        cancelled,
        thread: Some(thread),
    }
}

// =============================================================================
// Tests
// =============================================================================
