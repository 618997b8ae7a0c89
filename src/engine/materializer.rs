//! Materializer - expands a component tree into a primitive tree.
//!
//! One pass walks the element tree a render execution produced, reusing or
//! discarding child instances by type/key identity, recursing into
//! primitive children, and collecting pending effects in pre-order. Clean
//! subtrees (not dirty, identical props) short-circuit to their committed
//! output; ancestors that are only on a dirty descendant's path re-walk
//! their stored shallow element tree without re-executing their render.
//!
//! # Reuse policy
//!
//! Component children are matched against the previous pass's children in
//! encounter (pre-order) order. A keyed element matches the previous child
//! with the same (type, key) wherever it sits; an unkeyed element matches
//! the previous child at the same encounter position iff the types match
//! and that child is unkeyed. Every unmatched previous child is unmounted:
//! its stored cleanups (children first) join the cycle's effect batch and
//! its arena slot is released.

use std::mem;
use std::sync::Arc;

use tracing::trace;

use crate::element::{ComponentDesc, Element, PrimitiveNode};
use crate::engine::arena::{DirtyFlags, InstanceArena, InstanceId};
use crate::error::EngineError;
use crate::hooks::{Cleanup, Scope};
use crate::scheduler::UpdateQueue;

// =============================================================================
// Pass output
// =============================================================================

/// One entry of the cycle's effect batch, in execution order.
pub(crate) enum EffectOp {
    /// Run the pending effect stored at `slot` of `instance`.
    Run {
        instance: InstanceId,
        component: &'static str,
        slot: usize,
    },
    /// Run a cleanup taken from an unmounted instance.
    Cleanup {
        component: &'static str,
        cleanup: Cleanup,
    },
}

impl std::fmt::Debug for EffectOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EffectOp::Run {
                instance,
                component,
                slot,
            } => f
                .debug_struct("Run")
                .field("instance", instance)
                .field("component", component)
                .field("slot", slot)
                .finish(),
            EffectOp::Cleanup { component, .. } => f
                .debug_struct("Cleanup")
                .field("component", component)
                .finish_non_exhaustive(),
        }
    }
}

/// Counters for one materialization pass, reported at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PassStats {
    pub rendered: usize,
    pub reused: usize,
    pub mounted: usize,
    pub unmounted: usize,
}

/// Result of a completed pass: the new primitive tree plus the ordered
/// effect batch for the effect runner.
#[derive(Debug)]
pub(crate) struct PassOutput {
    pub tree: PrimitiveNode,
    pub effects: Vec<EffectOp>,
    pub stats: PassStats,
}

// =============================================================================
// Child matching
// =============================================================================

struct PrevChild {
    id: InstanceId,
    ty: crate::element::ComponentType,
    key: Option<String>,
    consumed: bool,
}

/// Matches the component elements of one render output against the
/// previous pass's child instances.
struct ChildMatcher {
    prev: Vec<PrevChild>,
    position: usize,
    new_children: Vec<InstanceId>,
}

impl ChildMatcher {
    fn new(arena: &InstanceArena, prev_children: &[InstanceId]) -> Self {
        let prev = prev_children
            .iter()
            .filter_map(|&id| {
                let instance = arena.get(id)?;
                Some(PrevChild {
                    id,
                    ty: instance.ty,
                    key: instance.key.clone(),
                    consumed: false,
                })
            })
            .collect();
        Self {
            prev,
            position: 0,
            new_children: Vec::new(),
        }
    }

    /// Find the reusable previous child for the next component element.
    fn match_next(&mut self, desc: &ComponentDesc) -> Option<InstanceId> {
        let position = self.position;
        self.position += 1;

        if let Some(key) = &desc.key {
            let found = self.prev.iter_mut().find(|prev| {
                !prev.consumed && prev.ty == desc.ty && prev.key.as_ref() == Some(key)
            })?;
            found.consumed = true;
            return Some(found.id);
        }

        let prev = self.prev.get_mut(position)?;
        if !prev.consumed && prev.ty == desc.ty && prev.key.is_none() {
            prev.consumed = true;
            Some(prev.id)
        } else {
            None
        }
    }

    fn record(&mut self, id: InstanceId) {
        self.new_children.push(id);
    }

    fn leftovers(&self) -> Vec<InstanceId> {
        self.prev
            .iter()
            .filter(|prev| !prev.consumed)
            .map(|prev| prev.id)
            .collect()
    }
}

// =============================================================================
// Pass
// =============================================================================

pub(crate) struct Pass<'a> {
    arena: &'a mut InstanceArena,
    queue: &'a Arc<UpdateQueue>,
    effects: Vec<EffectOp>,
    stats: PassStats,
}

/// Materialize `desc` at the root position, reusing `*root` when its
/// type/key identity matches.
pub(crate) fn run_pass(
    arena: &mut InstanceArena,
    queue: &Arc<UpdateQueue>,
    root: &mut Option<InstanceId>,
    desc: &ComponentDesc,
) -> Result<PassOutput, EngineError> {
    let mut pass = Pass {
        arena,
        queue,
        effects: Vec::new(),
        stats: PassStats::default(),
    };

    let reuse = root.filter(|&id| {
        pass.arena
            .get(id)
            .is_some_and(|instance| instance.ty == desc.ty && instance.key == desc.key)
    });
    if reuse.is_none()
        && let Some(old) = root.take()
    {
        pass.unmount(old);
    }

    let (id, tree) = pass.materialize_component(desc, reuse, None)?;
    *root = Some(id);

    Ok(PassOutput {
        tree,
        effects: pass.effects,
        stats: pass.stats,
    })
}

/// Unmount a whole subtree outside a materialization pass, returning the
/// cleanup batch in children-first order. Used at scheduler shutdown.
pub(crate) fn unmount_tree(
    arena: &mut InstanceArena,
    queue: &Arc<UpdateQueue>,
    id: InstanceId,
) -> Vec<EffectOp> {
    let mut pass = Pass {
        arena,
        queue,
        effects: Vec::new(),
        stats: PassStats::default(),
    };
    pass.unmount(id);
    pass.effects
}

impl Pass<'_> {
    /// Materialize one component occurrence, reusing `reuse` if supplied.
    fn materialize_component(
        &mut self,
        desc: &ComponentDesc,
        reuse: Option<InstanceId>,
        parent: Option<InstanceId>,
    ) -> Result<(InstanceId, PrimitiveNode), EngineError> {
        let (id, fresh) = match reuse {
            Some(id) => {
                let instance = self
                    .arena
                    .get_mut(id)
                    .expect("matched child must be alive");
                if instance.props != desc.props {
                    instance.props = desc.props.clone();
                    instance.dirty.insert(DirtyFlags::SELF_DIRTY);
                }
                (id, false)
            }
            None => {
                self.stats.mounted += 1;
                let id = self
                    .arena
                    .allocate(desc.ty, desc.key.clone(), desc.props.clone(), parent);
                (id, true)
            }
        };

        let instance = self.arena.get_mut(id).expect("instance just resolved");
        let dirty = instance.dirty;

        let result = if dirty.contains(DirtyFlags::SELF_DIRTY) || instance.committed.is_none() {
            self.render_and_expand(id)
        } else if dirty.contains(DirtyFlags::CHILD_DIRTY) {
            self.expand_stored(id)
        } else {
            self.stats.reused += 1;
            trace!(component = instance.ty.name(), "reusing committed subtree");
            Ok((id, instance.committed.clone().expect("clean instance has output")))
        };

        // A fresh mount that failed to materialize is reachable from
        // nowhere; free it before the error unwinds.
        if result.is_err() && fresh {
            self.arena.release(id);
        }
        result
    }

    /// Re-execute the instance's render, then expand its element tree.
    fn render_and_expand(&mut self, id: InstanceId) -> Result<(InstanceId, PrimitiveNode), EngineError> {
        let instance = self.arena.get_mut(id).expect("instance is alive");
        let ty = instance.ty;
        let props = instance.props.clone();
        let mut hooks = mem::take(&mut instance.hooks);
        let prev_children = mem::take(&mut instance.children);

        trace!(component = ty.name(), "rendering");
        let rendered = {
            let mut scope = Scope::new(&mut hooks, id, ty.name(), Arc::clone(self.queue));
            ty.render()(&props, &mut scope)
        };
        let arity = rendered
            .as_ref()
            .map_or(Ok(()), |_| hooks.finish_render(ty.name()));

        // Effects are collected here, before recursing into children, which
        // yields the pre-order batch the effect runner requires.
        let pending = hooks.pending_effects();

        // The hook store goes back even when the render failed, so state
        // survives an aborted cycle.
        let instance = self.arena.get_mut(id).expect("instance is alive");
        instance.hooks = hooks;

        let element = match (rendered, arity) {
            (Ok(element), Ok(())) => element,
            (Err(err), _) | (_, Err(err)) => {
                self.arena.get_mut(id).expect("instance is alive").children = prev_children;
                return Err(err);
            }
        };

        for slot in pending {
            self.effects.push(EffectOp::Run {
                instance: id,
                component: ty.name(),
                slot,
            });
        }
        self.stats.rendered += 1;

        let tree = self.expand_children(id, &element, prev_children)?;

        let instance = self.arena.get_mut(id).expect("instance is alive");
        instance.rendered = Some(element);
        instance.committed = Some(tree.clone());
        instance.dirty = DirtyFlags::empty();
        Ok((id, tree))
    }

    /// The instance's own output is valid but a descendant is dirty:
    /// re-walk the stored element tree without re-executing render.
    fn expand_stored(&mut self, id: InstanceId) -> Result<(InstanceId, PrimitiveNode), EngineError> {
        let instance = self.arena.get_mut(id).expect("instance is alive");
        let Some(element) = instance.rendered.clone() else {
            // No stored output to re-walk; fall back to a full render.
            instance.dirty.insert(DirtyFlags::SELF_DIRTY);
            return self.render_and_expand(id);
        };
        let prev_children = mem::take(&mut instance.children);

        let tree = self.expand_children(id, &element, prev_children)?;

        let instance = self.arena.get_mut(id).expect("instance is alive");
        instance.committed = Some(tree.clone());
        instance.dirty = DirtyFlags::empty();
        Ok((id, tree))
    }

    /// Expand an element tree into a primitive tree, matching component
    /// elements against the previous pass's children and unmounting the
    /// leftovers.
    fn expand_children(
        &mut self,
        id: InstanceId,
        element: &Element,
        prev_children: Vec<InstanceId>,
    ) -> Result<PrimitiveNode, EngineError> {
        let mut matcher = ChildMatcher::new(self.arena, &prev_children);
        let tree = self.expand_element(element, id, &mut matcher);

        if tree.is_ok() {
            for leftover in matcher.leftovers() {
                self.unmount(leftover);
            }
        }
        let new_children = matcher.new_children;
        if tree.is_err() {
            // Instances mounted by the aborted expansion are not reachable
            // from the restored child list; free them now.
            for &child in &new_children {
                if !prev_children.contains(&child) {
                    self.arena.release(child);
                }
            }
        }
        let instance = self.arena.get_mut(id).expect("instance is alive");
        instance.children = if tree.is_ok() { new_children } else { prev_children };
        tree
    }

    fn expand_element(
        &mut self,
        element: &Element,
        parent: InstanceId,
        matcher: &mut ChildMatcher,
    ) -> Result<PrimitiveNode, EngineError> {
        match element {
            Element::Primitive(desc) => {
                let mut children = Vec::with_capacity(desc.children.len());
                for child in &desc.children {
                    children.push(self.expand_element(child, parent, matcher)?);
                }
                Ok(PrimitiveNode {
                    kind: desc.kind,
                    key: desc.key.clone(),
                    props: desc.props.clone(),
                    children,
                })
            }
            Element::Component(desc) => {
                let reuse = matcher.match_next(desc);
                let (id, subtree) = self.materialize_component(desc, reuse, Some(parent))?;
                matcher.record(id);
                Ok(subtree)
            }
        }
    }

    /// Unmount an instance: queue its cleanups (children first) and release
    /// its arena slot together with all descendants.
    fn unmount(&mut self, id: InstanceId) {
        self.collect_unmount_cleanups(id);
        self.arena.release(id);
    }

    fn collect_unmount_cleanups(&mut self, id: InstanceId) {
        let Some(instance) = self.arena.get_mut(id) else {
            return;
        };
        let component = instance.ty.name();
        let children = instance.children.clone();
        for child in children {
            self.collect_unmount_cleanups(child);
        }

        let instance = self.arena.get_mut(id).expect("instance still allocated");
        let cleanups = instance.hooks.take_cleanups();
        trace!(component, cleanups = cleanups.len(), "unmounting");
        self.stats.unmounted += 1;
        for cleanup in cleanups {
            self.effects.push(EffectOp::Cleanup { component, cleanup });
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
