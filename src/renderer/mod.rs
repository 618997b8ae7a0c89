//! Drawing backend seam.
//!
//! The engine's only output surface is [`Backend::apply`]: once per cycle
//! the scheduler hands the backend a patch script describing how the
//! committed primitive tree changed. Backends keep their own retained copy
//! of the tree (via [`apply_patch`]) and draw however they like; primitive
//! kinds and their visual meaning are entirely the backend's business.

mod term;

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

pub use term::TermBackend;

use crate::element::PrimitiveNode;
use crate::reconciler::{apply_patch, PatchScript};

/// One-way sink for patch scripts. Operations must be applied in script
/// order; each script assumes the tree state left by the previous one.
pub trait Backend {
    fn apply(&mut self, script: &PatchScript) -> io::Result<()>;
}

// =============================================================================
// Recording backend
// =============================================================================

#[derive(Default)]
struct Recorded {
    tree: Option<PrimitiveNode>,
    scripts: Vec<PatchScript>,
}

/// Test backend that retains the tree and records every script it was
/// handed. Clones share the same recording, so a test can keep one clone
/// and give the other to the scheduler.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The retained tree after every applied script.
    pub fn tree(&self) -> Option<PrimitiveNode> {
        self.lock().tree.clone()
    }

    /// All scripts applied so far, in order.
    pub fn scripts(&self) -> Vec<PatchScript> {
        self.lock().scripts.clone()
    }

    /// Number of scripts applied, counting empty ones.
    pub fn script_count(&self) -> usize {
        self.lock().scripts.len()
    }

    /// Number of applied scripts that contained at least one operation.
    pub fn nonempty_script_count(&self) -> usize {
        self.lock().scripts.iter().filter(|s| !s.is_empty()).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for RecordingBackend {
    fn apply(&mut self, script: &PatchScript) -> io::Result<()> {
        let mut inner = self.lock();
        apply_patch(&mut inner.tree, script);
        inner.scripts.push(script.clone());
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
