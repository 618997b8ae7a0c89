//! Instance arena - slab allocation for persistent component instances.
//!
//! Instances are the durable counterpart of tree positions across
//! materialization passes. The arena owns every instance, hands out plain
//! index ids, and keeps a free-index pool for O(1) reuse. Parent links
//! exist only for upward dirty propagation and diagnostics; ownership is
//! strictly parent-to-child through the `children` lists.

use crate::element::{ComponentType, Element, PrimitiveNode};
use crate::hooks::HookStore;
use crate::types::Props;

// =============================================================================
// Ids and dirty flags
// =============================================================================

/// Identity of an instance within the arena.
///
/// Ids are generational: releasing a slot bumps its generation, so an id
/// held past its instance's unmount (e.g. inside a setter queued from a
/// background task) can never alias a later instance reusing the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId {
    index: usize,
    generation: u32,
}

impl InstanceId {
    pub(crate) fn from_raw(index: usize) -> Self {
        Self {
            index,
            generation: 0,
        }
    }

    pub(crate) fn index(self) -> usize {
        self.index
    }
}

bitflags::bitflags! {
    /// Per-instance dirty state driving the next materialization pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub(crate) struct DirtyFlags: u8 {
        /// This instance's state changed - its render must re-execute.
        const SELF_DIRTY = 1 << 0;
        /// Some descendant is dirty - children must be re-materialized,
        /// but this instance's own render output is still valid.
        const CHILD_DIRTY = 1 << 1;
    }
}

// =============================================================================
// Instance
// =============================================================================

/// The persistent, identity-bearing counterpart of a tree position.
pub(crate) struct Instance {
    pub(crate) parent: Option<InstanceId>,
    pub(crate) ty: ComponentType,
    pub(crate) key: Option<String>,
    pub(crate) props: Props,
    pub(crate) hooks: HookStore,
    /// Component-child instances in encounter (pre-order) order of the last
    /// completed render.
    pub(crate) children: Vec<InstanceId>,
    /// Shallow element tree produced by the last render execution. Re-walked
    /// when only a descendant is dirty, so clean ancestors on the dirty path
    /// do not re-execute their render.
    pub(crate) rendered: Option<Element>,
    /// Fully materialized primitive subtree from the last pass.
    pub(crate) committed: Option<PrimitiveNode>,
    pub(crate) dirty: DirtyFlags,
}

impl Instance {
    fn new(ty: ComponentType, key: Option<String>, props: Props, parent: Option<InstanceId>) -> Self {
        Self {
            parent,
            ty,
            key,
            props,
            hooks: HookStore::default(),
            children: Vec::new(),
            rendered: None,
            committed: None,
            // A fresh instance always renders on its first pass.
            dirty: DirtyFlags::SELF_DIRTY,
        }
    }
}

// =============================================================================
// Arena
// =============================================================================

#[derive(Default)]
struct Slot {
    generation: u32,
    instance: Option<Instance>,
}

/// Slab of instances with a free pool for index reuse.
#[derive(Default)]
pub(crate) struct InstanceArena {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl InstanceArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Allocate a new instance, reusing a freed index when available.
    pub(crate) fn allocate(
        &mut self,
        ty: ComponentType,
        key: Option<String>,
        props: Props,
        parent: Option<InstanceId>,
    ) -> InstanceId {
        let instance = Instance::new(ty, key, props, parent);
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.instance = Some(instance);
            InstanceId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                instance: Some(instance),
            });
            InstanceId {
                index: self.slots.len() - 1,
                generation: 0,
            }
        }
    }

    pub(crate) fn get(&self, id: InstanceId) -> Option<&Instance> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.instance.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: InstanceId) -> Option<&mut Instance> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.instance.as_mut())
    }

    pub(crate) fn contains(&self, id: InstanceId) -> bool {
        self.get(id).is_some()
    }

    /// Release an instance and, recursively, every descendant. Hook
    /// cleanups must be collected by the caller beforehand.
    pub(crate) fn release(&mut self, id: InstanceId) {
        let Some(slot) = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
        else {
            return;
        };
        let Some(instance) = slot.instance.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);
        for child in instance.children {
            self.release(child);
        }
        self.free.push(id.index());
    }

    /// Number of live instances.
    pub(crate) fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.instance.is_some()).count()
    }

    /// Mark an instance dirty and propagate child-dirty up to the root.
    ///
    /// Returns false if the instance no longer exists (e.g. an update
    /// addressed to an instance unmounted before the flush).
    pub(crate) fn mark_dirty(&mut self, id: InstanceId) -> bool {
        let Some(instance) = self.get_mut(id) else {
            return false;
        };
        instance.dirty.insert(DirtyFlags::SELF_DIRTY);
        let mut cursor = instance.parent;
        while let Some(parent_id) = cursor {
            let Some(parent) = self.get_mut(parent_id) else {
                break;
            };
            if parent.dirty.contains(DirtyFlags::CHILD_DIRTY) {
                break; // Path above is already marked.
            }
            parent.dirty.insert(DirtyFlags::CHILD_DIRTY);
            cursor = parent.parent;
        }
        true
    }
}

// =============================================================================
// Tests
// =============================================================================
