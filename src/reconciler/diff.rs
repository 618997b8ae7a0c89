//! Tree differ - computes the patch script between two primitive trees.
//!
//! Comparison is node-by-node: a kind mismatch replaces the subtree, a
//! kind match emits a props-only update and recurses into children. Child
//! lists with explicit keys are matched by key to detect moves; unkeyed
//! lists are matched purely by position. Move and remove indices are
//! computed against a simulated working copy of the old child list, so
//! applying the script operations in order is always correct.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::element::PrimitiveNode;
use crate::reconciler::patch::{NodePath, PatchOp, PatchScript};
use crate::types::Value;

/// Diff the previous committed tree against the newly materialized one.
///
/// `None` for the previous tree means nothing has been drawn yet; the
/// whole new tree is inserted at the root.
pub fn diff(prev: Option<&PrimitiveNode>, next: &PrimitiveNode) -> PatchScript {
    let mut script = PatchScript::new();
    match prev {
        None => script.push(PatchOp::Insert {
            path: vec![],
            node: next.clone(),
        }),
        Some(prev) => {
            let mut path = Vec::new();
            diff_node(prev, next, &mut path, &mut script);
        }
    }
    script
}

fn diff_node(prev: &PrimitiveNode, next: &PrimitiveNode, path: &mut NodePath, script: &mut PatchScript) {
    if prev.kind != next.kind {
        script.push(PatchOp::Remove { path: path.clone() });
        script.push(PatchOp::Insert {
            path: path.clone(),
            node: next.clone(),
        });
        return;
    }

    let (set, unset) = prop_delta(prev, next);
    if !set.is_empty() || !unset.is_empty() {
        script.push(PatchOp::Update {
            path: path.clone(),
            set,
            unset,
        });
    }

    let keyed = prev.children.iter().chain(next.children.iter()).any(|c| c.key.is_some());
    if keyed {
        diff_children_keyed(prev, next, path, script);
    } else {
        diff_children_positional(prev, next, path, script);
    }
}

/// Props present in `next` but changed or missing in `prev` go into `set`;
/// props present only in `prev` go into `unset`.
fn prop_delta(prev: &PrimitiveNode, next: &PrimitiveNode) -> (Vec<(&'static str, Value)>, Vec<&'static str>) {
    let mut set = Vec::new();
    for (name, value) in next.props.iter() {
        if prev.props.get(name) != Some(value) {
            set.push((name, value.clone()));
        }
    }
    let unset: Vec<&'static str> = prev
        .props
        .iter()
        .filter(|(name, _)| !next.props.contains(name))
        .map(|(name, _)| name)
        .collect();
    (set, unset)
}

// =============================================================================
// Positional (unkeyed) children
// =============================================================================

fn diff_children_positional(
    prev: &PrimitiveNode,
    next: &PrimitiveNode,
    path: &mut NodePath,
    script: &mut PatchScript,
) {
    let common = prev.children.len().min(next.children.len());
    for index in 0..common {
        path.push(index);
        diff_node(&prev.children[index], &next.children[index], path, script);
        path.pop();
    }
    for (index, child) in next.children.iter().enumerate().skip(common) {
        let mut child_path = path.clone();
        child_path.push(index);
        script.push(PatchOp::Insert {
            path: child_path,
            node: child.clone(),
        });
    }
    // Trailing removes go out highest-index-first so each index is still
    // valid when its operation is applied.
    for index in (common..prev.children.len()).rev() {
        let mut child_path = path.clone();
        child_path.push(index);
        script.push(PatchOp::Remove { path: child_path });
    }
}

// =============================================================================
// Keyed children
// =============================================================================

/// Keyed reconciliation over a simulated working list.
///
/// The working list starts as the old child order and is mutated in step
/// with every emitted operation, so `from`/`to`/removal indices always
/// describe the intermediate tree the backend actually holds at that point
/// in the script.
fn diff_children_keyed(
    prev: &PrimitiveNode,
    next: &PrimitiveNode,
    path: &mut NodePath,
    script: &mut PatchScript,
) {
    // Key -> old index. A duplicate key among old siblings is a structural
    // error; the later sibling wins the key and the earlier one degrades
    // to an unmatched (remove/insert) node.
    let mut by_key: HashMap<&str, usize> = HashMap::new();
    for (index, child) in prev.children.iter().enumerate() {
        if let Some(key) = child.key.as_deref()
            && by_key.insert(key, index).is_some()
        {
            warn!(key, kind = child.kind, "duplicate key among siblings, falling back to positional matching");
        }
    }

    // Pair the n-th unkeyed new child with the n-th unkeyed old child of
    // the same kind, so keys mixed into an otherwise positional list do
    // not force churn on their unkeyed neighbors.
    let unkeyed_old: Vec<usize> = prev
        .children
        .iter()
        .enumerate()
        .filter(|(_, c)| c.key.is_none())
        .map(|(i, _)| i)
        .collect();

    let mut consumed: HashSet<usize> = HashSet::new();
    let mut seen_keys: HashSet<&str> = HashSet::new();
    let mut unkeyed_rank = 0usize;
    let mut matches: Vec<Option<usize>> = Vec::with_capacity(next.children.len());
    for child in &next.children {
        let matched = match child.key.as_deref() {
            Some(key) => {
                if !seen_keys.insert(key) {
                    warn!(key, kind = child.kind, "duplicate key among siblings, falling back to positional matching");
                    None
                } else {
                    by_key.get(key).copied().filter(|index| !consumed.contains(index))
                }
            }
            None => {
                let candidate = unkeyed_old.get(unkeyed_rank).copied();
                unkeyed_rank += 1;
                candidate
                    .filter(|&index| prev.children[index].kind == child.kind)
                    .filter(|index| !consumed.contains(index))
            }
        };
        if let Some(index) = matched {
            consumed.insert(index);
        }
        matches.push(matched);
    }

    // Working copy of the old child list, tracked by old index. Removals
    // first, highest simulated index first.
    let mut working: Vec<Option<usize>> = (0..prev.children.len()).map(Some).collect();
    for position in (0..working.len()).rev() {
        let old_index = working[position];
        if old_index.is_none_or(|index| !consumed.contains(&index)) {
            let mut child_path = path.clone();
            child_path.push(position);
            script.push(PatchOp::Remove { path: child_path });
            working.remove(position);
        }
    }

    // Walk target positions: move survivors into place, insert the rest.
    for (target, child) in next.children.iter().enumerate() {
        match matches[target] {
            Some(old_index) => {
                let current = working
                    .iter()
                    .position(|entry| *entry == Some(old_index))
                    .unwrap_or(target);
                if current != target {
                    script.push(PatchOp::Move {
                        parent: path.clone(),
                        from: current,
                        to: target,
                    });
                    let entry = working.remove(current);
                    working.insert(target, entry);
                }
                path.push(target);
                diff_node(&prev.children[old_index], child, path, script);
                path.pop();
            }
            None => {
                let mut child_path = path.clone();
                child_path.push(target);
                script.push(PatchOp::Insert {
                    path: child_path,
                    node: child.clone(),
                });
                working.insert(target, None);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
