//! Effect runner - executes the cycle's effect batch after commit.
//!
//! Effects run strictly in the order the materializer supplied (pre-order
//! over the tree, declaration order within an instance). An effect whose
//! previous run produced a cleanup gets that cleanup run immediately before
//! its new body - or instead of any body, on unmount. Every cleanup and
//! body is panic-isolated: a failure is recorded and the rest of the batch
//! still runs, with the accumulated failures surfaced afterwards.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::trace;

use crate::engine::arena::InstanceArena;
use crate::engine::materializer::EffectOp;
use crate::error::{EffectFailure, EngineError};
use crate::hooks::HookSlot;

/// Stringify a panic payload for diagnostics.
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run the effect batch. Failures do not stop the batch; they are
/// collected and returned together once every entry has been attempted.
pub(crate) fn run_batch(arena: &mut InstanceArena, batch: Vec<EffectOp>) -> Result<(), EngineError> {
    let mut failures: Vec<EffectFailure> = Vec::new();

    for op in batch {
        match op {
            EffectOp::Cleanup { component, cleanup } => {
                trace!(component, "running unmount cleanup");
                if let Err(payload) = catch_unwind(AssertUnwindSafe(cleanup)) {
                    failures.push(EffectFailure {
                        component,
                        in_cleanup: true,
                        message: panic_message(payload),
                    });
                }
            }
            EffectOp::Run {
                instance,
                component,
                slot,
            } => {
                // The instance may have been unmounted later in the same
                // pass; its cleanups were queued separately.
                let Some(record) = arena.get_mut(instance).and_then(|i| match i.hooks.slots.get_mut(slot) {
                    Some(HookSlot::Effect(record)) => Some(record),
                    _ => None,
                }) else {
                    continue;
                };
                if !record.pending {
                    continue;
                }
                record.pending = false;
                let cleanup = record.cleanup.take();
                let Some(body) = record.body.take() else {
                    continue;
                };

                if let Some(cleanup) = cleanup {
                    trace!(component, slot, "running effect cleanup");
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(cleanup)) {
                        failures.push(EffectFailure {
                            component,
                            in_cleanup: true,
                            message: panic_message(payload),
                        });
                    }
                }

                trace!(component, slot, "running effect");
                match catch_unwind(AssertUnwindSafe(body)) {
                    Ok(new_cleanup) => {
                        // The instance may have vanished if an earlier
                        // entry's callback unmounted it; re-resolve.
                        if let Some(record) =
                            arena.get_mut(instance).and_then(|i| match i.hooks.slots.get_mut(slot) {
                                Some(HookSlot::Effect(record)) => Some(record),
                                _ => None,
                            })
                        {
                            record.cleanup = new_cleanup;
                        }
                    }
                    Err(payload) => {
                        failures.push(EffectFailure {
                            component,
                            in_cleanup: false,
                            message: panic_message(payload),
                        });
                    }
                }
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Effects(failures))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{primitive, ComponentType, Element};
    use crate::engine::arena::InstanceId;
    use crate::error::EngineError;
    use crate::hooks::{EffectRecord, HookStore, Scope};
    use crate::types::Props;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn render_noop(_: &Props, _: &mut Scope<'_>) -> Result<Element, EngineError> {
        Ok(primitive("text", Props::new()))
    }

    fn instance_with_effects(
        arena: &mut InstanceArena,
        records: Vec<EffectRecord>,
    ) -> InstanceId {
        let id = arena.allocate(
            ComponentType::new("Test", render_noop),
            None,
            Props::new(),
            None,
        );
        let instance = arena.get_mut(id).unwrap();
        let mut store = HookStore::default();
        for record in records {
            store.slots.push(HookSlot::Effect(record));
        }
        instance.hooks = store;
        id
    }

    fn record(body: crate::hooks::EffectBody) -> EffectRecord {
        EffectRecord {
            deps: None,
            body: Some(body),
            cleanup: None,
            pending: true,
        }
    }

    #[test]
    fn test_runs_in_order_and_stores_cleanup() {
        let mut arena = InstanceArena::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (l1, l2) = (Rc::clone(&log), Rc::clone(&log));

        let id = instance_with_effects(
            &mut arena,
            vec![
                record(Box::new(move || {
                    l1.borrow_mut().push("first");
                    None
                })),
                record(Box::new(move || {
                    l2.borrow_mut().push("second");
                    Some(Box::new(|| {}))
                })),
            ],
        );

        let batch = vec![
            EffectOp::Run {
                instance: id,
                component: "Test",
                slot: 0,
            },
            EffectOp::Run {
                instance: id,
                component: "Test",
                slot: 1,
            },
        ];
        run_batch(&mut arena, batch).unwrap();

        assert_eq!(*log.borrow(), vec!["first", "second"]);
        let instance = arena.get(id).unwrap();
        let HookSlot::Effect(record) = &instance.hooks.slots[1] else {
            panic!("expected effect slot");
        };
        assert!(record.cleanup.is_some());
        assert!(!record.pending);
    }

    #[test]
    fn test_cleanup_runs_before_new_body() {
        let mut arena = InstanceArena::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (body_log, cleanup_log) = (Rc::clone(&log), Rc::clone(&log));

        let mut rec = record(Box::new(move || {
            body_log.borrow_mut().push("body");
            None
        }));
        rec.cleanup = Some(Box::new(move || {
            cleanup_log.borrow_mut().push("cleanup");
        }));
        let id = instance_with_effects(&mut arena, vec![rec]);

        run_batch(
            &mut arena,
            vec![EffectOp::Run {
                instance: id,
                component: "Test",
                slot: 0,
            }],
        )
        .unwrap();

        assert_eq!(*log.borrow(), vec!["cleanup", "body"]);
    }

    #[test]
    fn test_panicking_effect_does_not_block_siblings() {
        let mut arena = InstanceArena::new();
        let ran = Rc::new(RefCell::new(false));
        let ran_clone = Rc::clone(&ran);

        let id = instance_with_effects(
            &mut arena,
            vec![
                record(Box::new(|| panic!("effect exploded"))),
                record(Box::new(move || {
                    *ran_clone.borrow_mut() = true;
                    None
                })),
            ],
        );

        let err = run_batch(
            &mut arena,
            vec![
                EffectOp::Run {
                    instance: id,
                    component: "Test",
                    slot: 0,
                },
                EffectOp::Run {
                    instance: id,
                    component: "Test",
                    slot: 1,
                },
            ],
        )
        .unwrap_err();

        assert!(*ran.borrow(), "second effect should still run");
        let EngineError::Effects(failures) = err else {
            panic!("expected effects error");
        };
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.contains("effect exploded"));
        assert!(!failures[0].in_cleanup);
    }

    #[test]
    fn test_panicking_unmount_cleanup_isolated() {
        let mut arena = InstanceArena::new();
        let sibling_ran = Rc::new(RefCell::new(false));
        let sibling_clone = Rc::clone(&sibling_ran);

        let batch = vec![
            EffectOp::Cleanup {
                component: "Gone",
                cleanup: Box::new(|| panic!("cleanup exploded")),
            },
            EffectOp::Cleanup {
                component: "AlsoGone",
                cleanup: Box::new(move || {
                    *sibling_clone.borrow_mut() = true;
                }),
            },
        ];

        let err = run_batch(&mut arena, batch).unwrap_err();
        assert!(*sibling_ran.borrow(), "sibling cleanup should still run");
        let EngineError::Effects(failures) = err else {
            panic!("expected effects error");
        };
        assert_eq!(failures.len(), 1);
        assert!(failures[0].in_cleanup);
    }
}
