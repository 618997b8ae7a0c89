//! Patch scripts - the ordered operation sequences handed to the backend.
//!
//! A patch script transforms the previously committed primitive tree into
//! the new one. Operations address nodes by child-index paths from the
//! root and must be applied strictly in sequence: every index refers to
//! the tree as already modified by the preceding operations.

use crate::element::PrimitiveNode;
use crate::types::Value;

/// Child-index path from the root. Empty path = the root node itself.
pub type NodePath = Vec<usize>;

/// One transform step against the retained tree.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    /// Insert a subtree. The path's last segment is the insertion index
    /// within the parent (an empty path replaces/creates the root).
    Insert { path: NodePath, node: PrimitiveNode },
    /// Remove the subtree at `path`.
    Remove { path: NodePath },
    /// Update properties of the node at `path`: `set` overwrites or adds,
    /// `unset` deletes. Children are untouched.
    Update {
        path: NodePath,
        set: Vec<(&'static str, Value)>,
        unset: Vec<&'static str>,
    },
    /// Move the child of the node at `parent` from index `from` to `to`.
    Move {
        parent: NodePath,
        from: usize,
        to: usize,
    },
}

/// An ordered, minimal operation sequence. Produced fresh each cycle.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PatchScript {
    pub ops: Vec<PatchOp>,
}

impl PatchScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub(crate) fn push(&mut self, op: PatchOp) {
        self.ops.push(op);
    }

    /// Count operations of each kind: (inserts, removes, updates, moves).
    pub fn op_counts(&self) -> (usize, usize, usize, usize) {
        let mut counts = (0, 0, 0, 0);
        for op in &self.ops {
            match op {
                PatchOp::Insert { .. } => counts.0 += 1,
                PatchOp::Remove { .. } => counts.1 += 1,
                PatchOp::Update { .. } => counts.2 += 1,
                PatchOp::Move { .. } => counts.3 += 1,
            }
        }
        counts
    }
}

/// Apply a patch script to a retained tree.
///
/// This is the reference consumer of the script semantics: backends keep a
/// retained `Option<PrimitiveNode>` and feed every script through here (the
/// test suite uses it to check script completeness against the committed
/// tree).
pub fn apply_patch(root: &mut Option<PrimitiveNode>, script: &PatchScript) {
    for op in &script.ops {
        match op {
            PatchOp::Insert { path, node } => {
                if path.is_empty() {
                    *root = Some(node.clone());
                } else if let Some((index, parent_path)) = path.split_last()
                    && let Some(parent) = node_at_mut(root, parent_path)
                {
                    let index = (*index).min(parent.children.len());
                    parent.children.insert(index, node.clone());
                }
            }
            PatchOp::Remove { path } => {
                if path.is_empty() {
                    *root = None;
                } else if let Some((index, parent_path)) = path.split_last()
                    && let Some(parent) = node_at_mut(root, parent_path)
                    && *index < parent.children.len()
                {
                    parent.children.remove(*index);
                }
            }
            PatchOp::Update { path, set, unset } => {
                if let Some(node) = node_at_mut(root, path) {
                    for (name, value) in set {
                        node.props.set(name, value.clone());
                    }
                    if !unset.is_empty() {
                        let keep: Vec<_> = node
                            .props
                            .iter()
                            .filter(|(name, _)| !unset.contains(name))
                            .map(|(name, value)| (name, value.clone()))
                            .collect();
                        node.props = keep.into_iter().collect();
                    }
                }
            }
            PatchOp::Move { parent, from, to } => {
                if let Some(node) = node_at_mut(root, parent)
                    && *from < node.children.len()
                {
                    let child = node.children.remove(*from);
                    let to = (*to).min(node.children.len());
                    node.children.insert(to, child);
                }
            }
        }
    }
}

fn node_at_mut<'a>(root: &'a mut Option<PrimitiveNode>, path: &[usize]) -> Option<&'a mut PrimitiveNode> {
    let mut node = root.as_mut()?;
    for &index in path {
        node = node.children.get_mut(index)?;
    }
    Some(node)
}

// =============================================================================
// Tests
// =============================================================================
