//! Hook store - per-instance state cells, effect records, and handles.
//!
//! Hook slots are addressed purely by call order: slot N always denotes the
//! same logical hook across renders of one instance. The store keeps an
//! ordered slot list and an index cursor that resets at the start of each
//! render execution; a render that touches a different number or kind of
//! slots than its previous execution corrupts slot addressing and aborts
//! the cycle with a diagnosable error.
//!
//! # Example
//!
//! ```ignore
//! fn counter(_props: &Props, scope: &mut Scope) -> Result<Element, EngineError> {
//!     let (count, set_count) = scope.state(0i64)?;
//!     scope.effect(Some(vec![count.into()]), move || {
//!         // runs after commit whenever `count` changed
//!         None
//!     })?;
//!     Ok(primitive("text", Props::new().with("content", format!("{count}"))))
//! }
//! ```

use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use crate::engine::arena::InstanceId;
use crate::error::EngineError;
use crate::scheduler::{Update, UpdateQueue};
use crate::types::{deps_changed, Value};

// =============================================================================
// Slot types
// =============================================================================

/// A cleanup returned by an effect, run before the effect's next execution
/// or when the owning instance unmounts.
pub type Cleanup = Box<dyn FnOnce()>;

/// An effect body: runs after commit, optionally yielding a cleanup.
pub type EffectBody = Box<dyn FnOnce() -> Option<Cleanup>>;

/// A state cell: type-erased current value. The `Send` bound lets setters
/// deliver replacement values from any execution context.
pub(crate) struct StateCell {
    pub(crate) value: Box<dyn Any + Send>,
}

/// An effect record: dependency snapshot, the body pending execution, and
/// the cleanup stored by the previous run.
pub(crate) struct EffectRecord {
    pub(crate) deps: Option<Vec<Value>>,
    pub(crate) body: Option<EffectBody>,
    pub(crate) cleanup: Option<Cleanup>,
    pub(crate) pending: bool,
}

/// A handle cell: shared mutable storage that survives renders without
/// scheduling re-renders when written.
pub(crate) struct HandleCell {
    pub(crate) value: Rc<dyn Any>,
}

pub(crate) enum HookSlot {
    State(StateCell),
    Effect(EffectRecord),
    Handle(HandleCell),
}

impl HookSlot {
    fn kind_name(&self) -> &'static str {
        match self {
            HookSlot::State(_) => "state",
            HookSlot::Effect(_) => "effect",
            HookSlot::Handle(_) => "handle",
        }
    }
}

// =============================================================================
// Hook store
// =============================================================================

/// Ordered hook slots for one instance, with the per-render cursor.
#[derive(Default)]
pub(crate) struct HookStore {
    pub(crate) slots: Vec<HookSlot>,
    cursor: usize,
    /// Set after the first completed render; from then on the slot list is
    /// fixed and every render must walk it exactly.
    sealed: bool,
}

impl HookStore {
    /// Reset the cursor for a new render execution.
    pub(crate) fn begin_render(&mut self) {
        self.cursor = 0;
    }

    /// Verify the render touched every slot, then seal the slot list.
    pub(crate) fn finish_render(&mut self, component: &'static str) -> Result<(), EngineError> {
        if self.sealed && self.cursor != self.slots.len() {
            return Err(EngineError::HookArity {
                component,
                expected: self.slots.len(),
                actual: self.cursor,
            });
        }
        self.sealed = true;
        Ok(())
    }

    /// Indices of effect slots currently pending, in declaration order.
    pub(crate) fn pending_effects(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                HookSlot::Effect(record) if record.pending => Some(i),
                _ => None,
            })
            .collect()
    }

    /// Take every stored cleanup, in declaration order. Used on unmount;
    /// pending-but-never-run effect bodies are discarded.
    pub(crate) fn take_cleanups(&mut self) -> Vec<Cleanup> {
        self.slots
            .iter_mut()
            .filter_map(|slot| match slot {
                HookSlot::Effect(record) => {
                    record.pending = false;
                    record.body = None;
                    record.cleanup.take()
                }
                _ => None,
            })
            .collect()
    }

    fn next_index(
        &mut self,
        component: &'static str,
        kind: &'static str,
    ) -> Result<(usize, bool), EngineError> {
        let index = self.cursor;
        self.cursor += 1;
        if index < self.slots.len() {
            let was = self.slots[index].kind_name();
            if was != kind {
                return Err(EngineError::HookKind {
                    component,
                    index,
                    was,
                    now: kind,
                });
            }
            Ok((index, false))
        } else if self.sealed {
            // More hook calls than the previous render performed.
            Err(EngineError::HookArity {
                component,
                expected: self.slots.len(),
                actual: self.cursor,
            })
        } else {
            Ok((index, true))
        }
    }
}

// =============================================================================
// Setter
// =============================================================================

/// The write half of a state cell.
///
/// Setters never mutate synchronously: they enqueue a pending value into
/// the scheduler's intake and wake the render thread. Safe to call from any
/// execution context - this queue is the sole thread-safe entry into the
/// render thread.
pub struct Setter<T> {
    queue: Arc<UpdateQueue>,
    instance: InstanceId,
    slot: usize,
    _value: PhantomData<fn(T)>,
}

impl<T> std::fmt::Debug for Setter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Setter")
            .field("instance", &self.instance)
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            instance: self.instance,
            slot: self.slot,
            _value: PhantomData,
        }
    }
}

impl<T: Clone + Send + 'static> Setter<T> {
    /// Enqueue a replacement value for the next cycle.
    pub fn set(&self, value: T) {
        self.queue.push(Update::new(
            self.instance,
            self.slot,
            Box::new(move |cell| {
                *cell = Box::new(value);
            }),
        ));
    }

    /// Enqueue a transformation, applied to the latest pending-or-current
    /// value at flush time. N queued transformations compose in call order
    /// within a single cycle.
    pub fn update(&self, f: impl FnOnce(T) -> T + Send + 'static) {
        self.queue.push(Update::new(
            self.instance,
            self.slot,
            Box::new(move |cell| {
                if let Some(current) = cell.downcast_mut::<T>() {
                    let next = f(current.clone());
                    *current = next;
                } else {
                    tracing::warn!("state updater dropped: cell type changed");
                }
            }),
        ));
    }

    /// Whether two setters address the same state cell.
    pub fn same_slot(&self, other: &Self) -> bool {
        self.instance == other.instance && self.slot == other.slot
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Shared mutable storage that persists across renders of one instance.
///
/// Writing a handle does not schedule a re-render; use it for values the
/// UI does not depend on (scroll bookkeeping, caches, task handles held
/// outside effect cleanups).
pub struct Handle<T> {
    cell: Rc<RefCell<T>>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T: 'static> Handle<T> {
    /// Read via closure.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.cell.borrow())
    }

    /// Mutate via closure.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.cell.borrow_mut())
    }

    /// Replace the stored value.
    pub fn set(&self, value: T) {
        *self.cell.borrow_mut() = value;
    }
}

impl<T: Clone + 'static> Handle<T> {
    /// Clone the stored value out.
    pub fn get(&self) -> T {
        self.cell.borrow().clone()
    }
}

// =============================================================================
// Scope - the hook surface bound to the executing instance
// =============================================================================

/// The hook surface handed to a render function, bound to "the instance and
/// call index currently executing".
pub struct Scope<'a> {
    store: &'a mut HookStore,
    instance: InstanceId,
    component: &'static str,
    queue: Arc<UpdateQueue>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(
        store: &'a mut HookStore,
        instance: InstanceId,
        component: &'static str,
        queue: Arc<UpdateQueue>,
    ) -> Self {
        store.begin_render();
        Self {
            store,
            instance,
            component,
            queue,
        }
    }

    /// Name of the component currently rendering.
    pub fn component(&self) -> &'static str {
        self.component
    }

    /// A persistent state cell.
    ///
    /// The first call for this slot stores `initial`; later calls return
    /// the stored value and ignore `initial`. The returned [`Setter`]
    /// enqueues changes for the next cycle rather than mutating in place.
    pub fn state<T>(&mut self, initial: T) -> Result<(T, Setter<T>), EngineError>
    where
        T: Clone + Send + 'static,
    {
        let (index, fresh) = self.store.next_index(self.component, "state")?;
        if fresh {
            self.store.slots.push(HookSlot::State(StateCell {
                value: Box::new(initial),
            }));
        }

        let HookSlot::State(cell) = &self.store.slots[index] else {
            unreachable!("slot kind checked by next_index");
        };
        let value = cell
            .value
            .downcast_ref::<T>()
            .cloned()
            .ok_or(EngineError::HookType {
                component: self.component,
                index,
            })?;

        let setter = Setter {
            queue: Arc::clone(&self.queue),
            instance: self.instance,
            slot: index,
            _value: PhantomData,
        };
        Ok((value, setter))
    }

    /// Register an effect for this slot.
    ///
    /// The body does not run now: it is queued for the effect runner after
    /// this pass commits, and only if the dependency snapshot differs from
    /// the previous render's (shallow, element by element). `None` deps
    /// means always pending; `Some(vec![])` means first render only.
    pub fn effect<F>(&mut self, deps: Option<Vec<Value>>, body: F) -> Result<(), EngineError>
    where
        F: FnOnce() -> Option<Cleanup> + 'static,
    {
        let (index, fresh) = self.store.next_index(self.component, "effect")?;
        if fresh {
            self.store.slots.push(HookSlot::Effect(EffectRecord {
                deps,
                body: Some(Box::new(body)),
                cleanup: None,
                pending: true,
            }));
            return Ok(());
        }

        let HookSlot::Effect(record) = &mut self.store.slots[index] else {
            unreachable!("slot kind checked by next_index");
        };
        if deps_changed(record.deps.as_deref(), deps.as_deref()) {
            record.deps = deps;
            record.body = Some(Box::new(body));
            record.pending = true;
        }
        Ok(())
    }

    /// A persistent [`Handle`] cell, created on first call.
    pub fn handle<T: 'static>(&mut self, initial: impl FnOnce() -> T) -> Result<Handle<T>, EngineError> {
        let (index, fresh) = self.store.next_index(self.component, "handle")?;
        if fresh {
            self.store.slots.push(HookSlot::Handle(HandleCell {
                value: Rc::new(RefCell::new(initial())),
            }));
        }

        let HookSlot::Handle(cell) = &self.store.slots[index] else {
            unreachable!("slot kind checked by next_index");
        };
        let cell = Rc::clone(&cell.value)
            .downcast::<RefCell<T>>()
            .map_err(|_| EngineError::HookType {
                component: self.component,
                index,
            })?;
        Ok(Handle { cell })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::arena::InstanceId;

    fn scope_parts() -> (HookStore, Arc<UpdateQueue>) {
        (HookStore::default(), Arc::new(UpdateQueue::new()))
    }

    #[test]
    fn test_state_stores_initial_once() {
        let (mut store, queue) = scope_parts();
        let id = InstanceId::from_raw(0);

        {
            let mut scope = Scope::new(&mut store, id, "Test", Arc::clone(&queue));
            let (value, _setter) = scope.state(7i64).unwrap();
            assert_eq!(value, 7);
            scope.store.finish_render("Test").unwrap();
        }

        // Second render: initial is ignored.
        let mut scope = Scope::new(&mut store, id, "Test", queue);
        let (value, _setter) = scope.state(99i64).unwrap();
        assert_eq!(value, 7);
        scope.store.finish_render("Test").unwrap();
    }

    #[test]
    fn test_setter_enqueues_without_mutating() {
        let (mut store, queue) = scope_parts();
        let id = InstanceId::from_raw(0);

        let setter = {
            let mut scope = Scope::new(&mut store, id, "Test", Arc::clone(&queue));
            let (_, setter) = scope.state(1i64).unwrap();
            scope.store.finish_render("Test").unwrap();
            setter
        };

        setter.set(5);
        // Value unchanged until the scheduler flushes the queue.
        let mut scope = Scope::new(&mut store, id, "Test", Arc::clone(&queue));
        let (value, _) = scope.state(1i64).unwrap();
        assert_eq!(value, 1);
        scope.store.finish_render("Test").unwrap();

        assert_eq!(queue.drain().len(), 1);
    }

    #[test]
    fn test_arity_violation_fewer_calls() {
        let (mut store, queue) = scope_parts();
        let id = InstanceId::from_raw(0);

        {
            let mut scope = Scope::new(&mut store, id, "Test", Arc::clone(&queue));
            scope.state(1i64).unwrap();
            scope.state(2i64).unwrap();
            scope.store.finish_render("Test").unwrap();
        }

        let mut scope = Scope::new(&mut store, id, "Test", queue);
        scope.state(1i64).unwrap();
        let err = scope.store.finish_render("Test").unwrap_err();
        assert!(matches!(
            err,
            EngineError::HookArity {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_arity_violation_extra_call() {
        let (mut store, queue) = scope_parts();
        let id = InstanceId::from_raw(0);

        {
            let mut scope = Scope::new(&mut store, id, "Test", Arc::clone(&queue));
            scope.state(1i64).unwrap();
            scope.store.finish_render("Test").unwrap();
        }

        let mut scope = Scope::new(&mut store, id, "Test", queue);
        scope.state(1i64).unwrap();
        let err = scope.state(2i64).unwrap_err();
        assert!(matches!(err, EngineError::HookArity { .. }));
    }

    #[test]
    fn test_kind_violation() {
        let (mut store, queue) = scope_parts();
        let id = InstanceId::from_raw(0);

        {
            let mut scope = Scope::new(&mut store, id, "Test", Arc::clone(&queue));
            scope.state(1i64).unwrap();
            scope.store.finish_render("Test").unwrap();
        }

        let mut scope = Scope::new(&mut store, id, "Test", queue);
        let err = scope.effect(None, || None).unwrap_err();
        assert!(matches!(
            err,
            EngineError::HookKind {
                was: "state",
                now: "effect",
                ..
            }
        ));
    }

    #[test]
    fn test_effect_pending_on_first_render_only_with_empty_deps() {
        let (mut store, queue) = scope_parts();
        let id = InstanceId::from_raw(0);

        {
            let mut scope = Scope::new(&mut store, id, "Test", Arc::clone(&queue));
            scope.effect(Some(vec![]), || None).unwrap();
            scope.store.finish_render("Test").unwrap();
        }
        assert_eq!(store.pending_effects(), vec![0]);

        // Simulate the runner consuming the effect.
        if let HookSlot::Effect(record) = &mut store.slots[0] {
            record.pending = false;
            record.body = None;
        }

        let mut scope = Scope::new(&mut store, id, "Test", queue);
        scope.effect(Some(vec![]), || None).unwrap();
        scope.store.finish_render("Test").unwrap();
        assert!(store.pending_effects().is_empty());
    }

    #[test]
    fn test_effect_repends_when_deps_change() {
        let (mut store, queue) = scope_parts();
        let id = InstanceId::from_raw(0);

        {
            let mut scope = Scope::new(&mut store, id, "Test", Arc::clone(&queue));
            scope.effect(Some(vec![Value::Int(1)]), || None).unwrap();
            scope.store.finish_render("Test").unwrap();
        }
        if let HookSlot::Effect(record) = &mut store.slots[0] {
            record.pending = false;
            record.body = None;
        }

        let mut scope = Scope::new(&mut store, id, "Test", queue);
        scope.effect(Some(vec![Value::Int(2)]), || None).unwrap();
        scope.store.finish_render("Test").unwrap();
        assert_eq!(store.pending_effects(), vec![0]);
    }

    #[test]
    fn test_handle_persists_and_does_not_queue() {
        let (mut store, queue) = scope_parts();
        let id = InstanceId::from_raw(0);

        {
            let mut scope = Scope::new(&mut store, id, "Test", Arc::clone(&queue));
            let handle = scope.handle(|| 10i64).unwrap();
            handle.set(42);
            scope.store.finish_render("Test").unwrap();
        }

        let mut scope = Scope::new(&mut store, id, "Test", Arc::clone(&queue));
        let handle = scope.handle(|| 10i64).unwrap();
        assert_eq!(handle.get(), 42);
        scope.store.finish_render("Test").unwrap();

        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_take_cleanups_discards_pending_bodies() {
        let (mut store, queue) = scope_parts();
        let id = InstanceId::from_raw(0);

        {
            let mut scope = Scope::new(&mut store, id, "Test", queue);
            scope.effect(None, || Some(Box::new(|| {}))).unwrap();
            scope.store.finish_render("Test").unwrap();
        }
        if let HookSlot::Effect(record) = &mut store.slots[0] {
            record.pending = false;
            record.body = None;
            record.cleanup = Some(Box::new(|| {}));
        }

        let cleanups = store.take_cleanups();
        assert_eq!(cleanups.len(), 1);
        assert!(store.pending_effects().is_empty());
    }
}
