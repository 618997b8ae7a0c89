//! Scheduler - the single authority for when a render cycle occurs.
//!
//! Setter calls never mutate state in place: they enqueue an [`Update`]
//! into the intake queue, the only thread-safe entry into the render
//! thread. A cycle drains the queue, applies the queued updates in call
//! order, marks the touched instances dirty, materializes from the root,
//! diffs against the previously committed tree, hands the patch script to
//! the backend, and finally runs the effect batch. Updates that arrive
//! while effects run are left in the queue for a further cycle - effects
//! never observe a half-committed tree.
//!
//! # Example
//!
//! ```ignore
//! let mut scheduler = Scheduler::new(TermBackend::new()?);
//! let handle = scheduler.handle();
//! scheduler.start(ComponentDesc::new(APP, Props::new()))?;
//! scheduler.run()?; // blocks until handle.stop()
//! ```

use std::any::Any;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::element::{ComponentDesc, PrimitiveNode};
use crate::engine::arena::{InstanceArena, InstanceId};
use crate::engine::effects::run_batch;
use crate::engine::materializer::{run_pass, unmount_tree};
use crate::error::EngineError;
use crate::hooks::HookSlot;
use crate::reconciler::diff;
use crate::renderer::Backend;

// =============================================================================
// Update intake
// =============================================================================

/// A queued state change: which cell, and how to transform it.
///
/// The apply closure receives the cell's latest pending-or-current boxed
/// value; plain `set` replaces it, `update` transforms it. Queued closures
/// for one cell compose in call order within a cycle.
pub(crate) struct Update {
    instance: InstanceId,
    slot: usize,
    apply: Box<dyn FnOnce(&mut Box<dyn Any + Send>) + Send>,
}

impl Update {
    pub(crate) fn new(
        instance: InstanceId,
        slot: usize,
        apply: Box<dyn FnOnce(&mut Box<dyn Any + Send>) + Send>,
    ) -> Self {
        Self {
            instance,
            slot,
            apply,
        }
    }
}

#[derive(Default)]
struct Intake {
    updates: Vec<Update>,
    stopped: bool,
    woken: bool,
}

/// Thread-safe intake for update requests, shared by every setter.
///
/// N pushes between two flushes coalesce into exactly one cycle.
pub(crate) struct UpdateQueue {
    intake: Mutex<Intake>,
    cvar: Condvar,
}

impl UpdateQueue {
    pub(crate) fn new() -> Self {
        Self {
            intake: Mutex::new(Intake::default()),
            cvar: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Intake> {
        self.intake.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, update: Update) {
        self.lock().updates.push(update);
        self.cvar.notify_one();
    }

    /// Take every queued update, in push order.
    pub(crate) fn drain(&self) -> Vec<Update> {
        std::mem::take(&mut self.lock().updates)
    }

    pub(crate) fn stop(&self) {
        self.lock().stopped = true;
        self.cvar.notify_all();
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Request one wakeup of the waiting render thread without queueing
    /// an update.
    pub(crate) fn wake(&self) {
        self.lock().woken = true;
        self.cvar.notify_all();
    }

    /// Block until an update is queued, `wake` is called, or the queue is
    /// stopped.
    pub(crate) fn wait(&self) {
        let mut intake = self.lock();
        while intake.updates.is_empty() && !intake.stopped && !intake.woken {
            intake = self
                .cvar
                .wait(intake)
                .unwrap_or_else(PoisonError::into_inner);
        }
        intake.woken = false;
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable cross-thread control for a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    queue: Arc<UpdateQueue>,
}

impl SchedulerHandle {
    /// Ask the scheduler's driving loop to exit.
    pub fn stop(&self) {
        self.queue.stop();
    }

    /// Wake a blocked [`Scheduler::run`] without queueing an update.
    pub fn wake(&self) {
        self.queue.wake();
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Owns the instance arena, the committed tree, the intake queue, and the
/// drawing backend; drives render cycles.
pub struct Scheduler {
    queue: Arc<UpdateQueue>,
    arena: InstanceArena,
    backend: Box<dyn Backend>,
    root_desc: Option<ComponentDesc>,
    root: Option<InstanceId>,
    committed: Option<PrimitiveNode>,
}

impl Scheduler {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self {
            queue: Arc::new(UpdateQueue::new()),
            arena: InstanceArena::new(),
            backend: Box::new(backend),
            root_desc: None,
            root: None,
            committed: None,
        }
    }

    /// A control handle, safe to hand to other threads.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            queue: Arc::clone(&self.queue),
        }
    }

    /// The tree committed by the last completed cycle.
    pub fn committed(&self) -> Option<&PrimitiveNode> {
        self.committed.as_ref()
    }

    /// Mount `root` and run one initial cycle. Calling `start` again
    /// replaces the root description and forces a cycle, reusing the root
    /// instance when its type and key still match.
    pub fn start(&mut self, root: ComponentDesc) -> Result<(), EngineError> {
        self.root_desc = Some(root.clone());
        self.cycle(&root)
    }

    /// Flush queued updates and, if anything is dirty, run one full cycle.
    /// Returns false when there was nothing to do.
    pub fn run_cycle(&mut self) -> Result<bool, EngineError> {
        let Some(desc) = self.root_desc.clone() else {
            return Ok(false);
        };
        let dirtied = self.flush_updates();
        if !dirtied && self.committed.is_some() {
            return Ok(false);
        }
        self.cycle(&desc)?;
        Ok(true)
    }

    /// One non-blocking scheduling step: runs a cycle if work is pending.
    /// Returns false once the scheduler has been stopped.
    pub fn tick(&mut self) -> Result<bool, EngineError> {
        if self.queue.is_stopped() {
            return Ok(false);
        }
        self.run_cycle()?;
        Ok(true)
    }

    /// Blocking driver: process cycles and sleep between them until the
    /// handle stops the queue.
    pub fn run(&mut self) -> Result<(), EngineError> {
        loop {
            if self.queue.is_stopped() {
                return Ok(());
            }
            self.run_cycle()?;
            if self.queue.is_stopped() {
                return Ok(());
            }
            self.queue.wait();
        }
    }

    /// Tear down: stop the queue, unmount the whole tree, and run the
    /// collected cleanups.
    pub fn shutdown(mut self) -> Result<(), EngineError> {
        self.queue.stop();
        let Some(root) = self.root.take() else {
            return Ok(());
        };
        let batch = unmount_tree(&mut self.arena, &self.queue, root);
        run_batch(&mut self.arena, batch)
    }

    /// Apply every queued update to its state cell, in call order, and
    /// mark the touched instances dirty. Returns whether anything was
    /// actually dirtied.
    fn flush_updates(&mut self) -> bool {
        let mut dirtied = false;
        for update in self.queue.drain() {
            let Update {
                instance,
                slot,
                apply,
            } = update;
            match self
                .arena
                .get_mut(instance)
                .and_then(|i| i.hooks.slots.get_mut(slot))
            {
                Some(HookSlot::State(cell)) => {
                    apply(&mut cell.value);
                    dirtied |= self.arena.mark_dirty(instance);
                }
                Some(_) => {
                    warn!(?instance, slot, "update addressed a non-state slot; dropped");
                }
                None => {
                    // The target was unmounted between the setter call and
                    // this flush.
                    warn!(?instance, slot, "update for dead instance dropped");
                }
            }
        }
        dirtied
    }

    /// One full cycle: materialize, diff, commit, draw, run effects.
    fn cycle(&mut self, desc: &ComponentDesc) -> Result<(), EngineError> {
        let out = run_pass(&mut self.arena, &self.queue, &mut self.root, desc)?;
        let script = diff(self.committed.as_ref(), &out.tree);
        debug!(
            ops = script.len(),
            rendered = out.stats.rendered,
            reused = out.stats.reused,
            mounted = out.stats.mounted,
            unmounted = out.stats.unmounted,
            "cycle committed"
        );
        self.backend.apply(&script)?;
        self.committed = Some(out.tree);
        // Updates queued by effect bodies stay in the intake for the next
        // cycle; they never re-enter this one.
        run_batch(&mut self.arena, out.effects)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{primitive, ComponentType, Element};
    use crate::hooks::Scope;
    use crate::renderer::RecordingBackend;
    use crate::types::{Callback, Props, Value};

    fn counter(_: &Props, scope: &mut Scope<'_>) -> Result<Element, EngineError> {
        let (n, set_n) = scope.state(0i64)?;
        let on_press = Callback::new(move || set_n.update(|v| v + 1));
        Ok(primitive(
            "text",
            Props::new()
                .with("content", format!("{n}"))
                .with("on_press", on_press),
        ))
    }

    fn counter_desc() -> ComponentDesc {
        ComponentDesc::new(ComponentType::new("Counter", counter), Props::new())
    }

    fn content_of(tree: &PrimitiveNode) -> &str {
        tree.props.get("content").and_then(Value::as_str).unwrap_or("")
    }

    fn press(backend: &RecordingBackend) -> Callback {
        backend
            .tree()
            .unwrap()
            .props
            .get("on_press")
            .and_then(Value::as_callback)
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_two_setter_calls_one_cycle() {
        let backend = RecordingBackend::new();
        let mut scheduler = Scheduler::new(backend.clone());
        scheduler.start(counter_desc()).unwrap();
        assert_eq!(content_of(&backend.tree().unwrap()), "0");

        // Two activations before the next cycle.
        let on_press = press(&backend);
        on_press.call();
        on_press.call();

        assert!(scheduler.run_cycle().unwrap());
        assert_eq!(content_of(&backend.tree().unwrap()), "2");
        // The backend's retained tree tracks the committed tree exactly.
        assert_eq!(backend.tree().as_ref(), scheduler.committed());
        // Coalesced: no further cycle is pending.
        assert!(!scheduler.run_cycle().unwrap());
        assert_eq!(backend.script_count(), 2);
    }

    #[test]
    fn test_queued_updaters_compose_in_call_order() {
        let backend = RecordingBackend::new();
        let mut scheduler = Scheduler::new(backend.clone());
        scheduler.start(counter_desc()).unwrap();

        let on_press = press(&backend);
        on_press.call(); // 0 -> 1 (update)
        on_press.call(); // 1 -> 2 (update)
        on_press.call(); // 2 -> 3 (update)
        assert!(scheduler.run_cycle().unwrap());
        assert_eq!(content_of(&backend.tree().unwrap()), "3");
    }

    #[test]
    fn test_unchanged_rerender_produces_empty_script() {
        let backend = RecordingBackend::new();
        let mut scheduler = Scheduler::new(backend.clone());
        scheduler.start(counter_desc()).unwrap();

        // Force a render with identical output.
        scheduler.start(counter_desc()).unwrap();
        let scripts = backend.scripts();
        assert_eq!(scripts.len(), 2);
        assert!(scripts[1].is_empty());
    }

    #[test]
    fn test_run_cycle_without_start_is_a_noop() {
        let mut scheduler = Scheduler::new(RecordingBackend::new());
        assert!(!scheduler.run_cycle().unwrap());
    }

    fn effectful(props: &Props, scope: &mut Scope<'_>) -> Result<Element, EngineError> {
        let x = props.get("x").and_then(Value::as_int).unwrap_or(0);
        let on_run = props.get("on_run").and_then(Value::as_callback).cloned();
        let on_cleanup = props.get("on_cleanup").and_then(Value::as_callback).cloned();
        scope.effect(Some(vec![Value::Int(x)]), move || {
            if let Some(cb) = &on_run {
                cb.call();
            }
            Some(Box::new(move || {
                if let Some(cb) = &on_cleanup {
                    cb.call();
                }
            }))
        })?;
        Ok(primitive("text", Props::new().with("content", format!("{x}"))))
    }

    fn effectful_desc(x: i64, runs: &Arc<Mutex<u32>>, cleanups: &Arc<Mutex<u32>>) -> ComponentDesc {
        let (runs, cleanups) = (Arc::clone(runs), Arc::clone(cleanups));
        ComponentDesc::new(
            ComponentType::new("Effectful", effectful),
            Props::new()
                .with("x", x)
                .with("on_run", Callback::new(move || *runs.lock().unwrap() += 1))
                .with(
                    "on_cleanup",
                    Callback::new(move || *cleanups.lock().unwrap() += 1),
                ),
        )
    }

    #[test]
    fn test_effect_reruns_cleanup_then_body_on_dep_change() {
        let runs = Arc::new(Mutex::new(0u32));
        let cleanups = Arc::new(Mutex::new(0u32));
        let mut scheduler = Scheduler::new(RecordingBackend::new());

        scheduler.start(effectful_desc(1, &runs, &cleanups)).unwrap();
        assert_eq!((*runs.lock().unwrap(), *cleanups.lock().unwrap()), (1, 0));

        // Same dep: nothing runs. The prop callbacks are fresh closures
        // each time, but they are not part of the dependency array.
        scheduler.start(effectful_desc(1, &runs, &cleanups)).unwrap();
        assert_eq!((*runs.lock().unwrap(), *cleanups.lock().unwrap()), (1, 0));

        // Changed dep: cleanup then body, exactly once.
        scheduler.start(effectful_desc(2, &runs, &cleanups)).unwrap();
        assert_eq!((*runs.lock().unwrap(), *cleanups.lock().unwrap()), (2, 1));
    }

    fn holder(props: &Props, _: &mut Scope<'_>) -> Result<Element, EngineError> {
        let show = props.get("show").and_then(Value::as_bool).unwrap_or(true);
        let mut children = Vec::new();
        if show {
            // The child carries the shared counters through its own props.
            let mut child_props = Props::new().with("x", 7);
            if let Some(on_run) = props.get("on_run") {
                child_props.set("on_run", on_run.clone());
            }
            if let Some(on_cleanup) = props.get("on_cleanup") {
                child_props.set("on_cleanup", on_cleanup.clone());
            }
            children.push(Element::Component(ComponentDesc::new(
                ComponentType::new("Effectful", effectful),
                child_props,
            )));
        }
        Ok(Element::Primitive(
            crate::element::PrimitiveDesc::new("box", Props::new()).with_children(children),
        ))
    }

    #[test]
    fn test_unmount_runs_each_cleanup_exactly_once() {
        let runs = Arc::new(Mutex::new(0u32));
        let cleanups = Arc::new(Mutex::new(0u32));
        let (r, c) = (Arc::clone(&runs), Arc::clone(&cleanups));
        let props = |show: bool| {
            Props::new()
                .with("show", show)
                .with("on_run", Callback::new({
                    let r = Arc::clone(&r);
                    move || *r.lock().unwrap() += 1
                }))
                .with("on_cleanup", Callback::new({
                    let c = Arc::clone(&c);
                    move || *c.lock().unwrap() += 1
                }))
        };
        let ty = ComponentType::new("Holder", holder);

        let mut scheduler = Scheduler::new(RecordingBackend::new());
        scheduler.start(ComponentDesc::new(ty, props(true))).unwrap();
        assert_eq!(*runs.lock().unwrap(), 1);

        scheduler.start(ComponentDesc::new(ty, props(false))).unwrap();
        assert_eq!(*cleanups.lock().unwrap(), 1);

        // Further cycles touch the unmounted child never again.
        scheduler.start(ComponentDesc::new(ty, props(false))).unwrap();
        assert_eq!(*runs.lock().unwrap(), 1);
        assert_eq!(*cleanups.lock().unwrap(), 1);
    }

    fn self_starter(_: &Props, scope: &mut Scope<'_>) -> Result<Element, EngineError> {
        let (n, set_n) = scope.state(0i64)?;
        scope.effect(Some(vec![]), move || {
            // Queued during the effect run: must land in a later cycle.
            set_n.set(10);
            None
        })?;
        Ok(primitive("text", Props::new().with("content", format!("{n}"))))
    }

    #[test]
    fn test_update_during_effects_schedules_next_cycle() {
        let backend = RecordingBackend::new();
        let mut scheduler = Scheduler::new(backend.clone());
        scheduler
            .start(ComponentDesc::new(
                ComponentType::new("SelfStarter", self_starter),
                Props::new(),
            ))
            .unwrap();
        // The effect's setter did not re-enter the initial cycle.
        assert_eq!(content_of(&backend.tree().unwrap()), "0");

        assert!(scheduler.run_cycle().unwrap());
        assert_eq!(content_of(&backend.tree().unwrap()), "10");
        assert!(!scheduler.run_cycle().unwrap());
    }

    fn blank(_: &Props, _: &mut Scope<'_>) -> Result<Element, EngineError> {
        Ok(primitive("text", Props::new().with("content", "blank")))
    }

    #[test]
    fn test_update_for_unmounted_instance_is_dropped() {
        let backend = RecordingBackend::new();
        let mut scheduler = Scheduler::new(backend.clone());
        scheduler.start(counter_desc()).unwrap();
        let on_press = press(&backend);

        // Replace the root with a different component; the counter unmounts
        // but its setter is still alive inside the callback.
        scheduler
            .start(ComponentDesc::new(ComponentType::new("Blank", blank), Props::new()))
            .unwrap();

        on_press.call();
        assert!(!scheduler.run_cycle().unwrap());
        assert_eq!(content_of(&backend.tree().unwrap()), "blank");
    }

    #[test]
    fn test_setter_from_another_thread() {
        let backend = RecordingBackend::new();
        let mut scheduler = Scheduler::new(backend.clone());
        scheduler.start(counter_desc()).unwrap();

        let on_press = press(&backend);
        let worker = std::thread::spawn(move || {
            on_press.call();
        });
        worker.join().unwrap();

        assert!(scheduler.run_cycle().unwrap());
        assert_eq!(content_of(&backend.tree().unwrap()), "1");
    }

    #[test]
    fn test_stop_unblocks_run() {
        let backend = RecordingBackend::new();
        let mut scheduler = Scheduler::new(backend);
        scheduler.start(counter_desc()).unwrap();

        let handle = scheduler.handle();
        let stopper = std::thread::spawn(move || {
            handle.stop();
        });
        scheduler.run().unwrap();
        stopper.join().unwrap();
    }

    #[test]
    fn test_shutdown_runs_unmount_cleanups() {
        let runs = Arc::new(Mutex::new(0u32));
        let cleanups = Arc::new(Mutex::new(0u32));
        let mut scheduler = Scheduler::new(RecordingBackend::new());
        scheduler.start(effectful_desc(1, &runs, &cleanups)).unwrap();

        scheduler.shutdown().unwrap();
        assert_eq!(*cleanups.lock().unwrap(), 1);
    }

    #[test]
    fn test_keyed_swap_emits_moves_only() {
        fn swapper(props: &Props, _: &mut Scope<'_>) -> Result<Element, EngineError> {
            let swapped = props.get("swapped").and_then(Value::as_bool).unwrap_or(false);
            let mut labels = vec![("1", "A"), ("2", "B")];
            if swapped {
                labels.reverse();
            }
            let children = labels
                .into_iter()
                .map(|(key, label)| {
                    Element::Primitive(
                        crate::element::PrimitiveDesc::new(
                            "text",
                            Props::new().with("content", label),
                        )
                        .with_key(key),
                    )
                })
                .collect();
            Ok(Element::Primitive(
                crate::element::PrimitiveDesc::new("box", Props::new()).with_children(children),
            ))
        }
        let ty = ComponentType::new("Swapper", swapper);

        let backend = RecordingBackend::new();
        let mut scheduler = Scheduler::new(backend.clone());
        scheduler
            .start(ComponentDesc::new(ty, Props::new().with("swapped", false)))
            .unwrap();
        scheduler
            .start(ComponentDesc::new(ty, Props::new().with("swapped", true)))
            .unwrap();

        let scripts = backend.scripts();
        let (inserts, removes, _, moves) = scripts[1].op_counts();
        assert_eq!(inserts, 0);
        assert_eq!(removes, 0);
        assert!(moves >= 1);
    }
}
