//! Live-DOM forest bookkeeping.
//!
//! Tracks which DOM nodes are currently attached under a document root, as a
//! `parent -> children` map over multiple roots. Nodes in the live DOM must
//! not be aged out, so detaching a subtree is what turns "attached" into a
//! recordable last use for every node it dissolves.
//!
//! Reparenting is not atomic in the trace: a node moved within the DOM can
//! produce its attach-at-new-position event before the remove-at-old-position
//! event. The two-parent set marks nodes in that transient state; a detach
//! traversal that reaches a marked node unmarks it and leaves its subtree
//! alone, because the node survived at its other attachment point.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use thiserror::Error;

use crate::record::ObjectId;

// ---------------------------------------------------------------------------
// DomForestError
// ---------------------------------------------------------------------------

/// Trace-model violations detected by DOM bookkeeping. All fatal.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DomForestError {
    #[error("node {child} is not a child of {parent} in the live DOM")]
    ChildNotUnderParent { parent: ObjectId, child: ObjectId },

    #[error("node {child} attached under a third parent while already double-parented")]
    TwoParentCorruption { child: ObjectId },

    #[error("node {node} missing from the live DOM while detaching {child} from {parent}")]
    DetachedNodeMissing {
        node: ObjectId,
        parent: ObjectId,
        child: ObjectId,
    },
}

// ---------------------------------------------------------------------------
// DomForest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct DomForest {
    parent_to_children: BTreeMap<ObjectId, BTreeSet<ObjectId>>,
    two_parent: BTreeSet<ObjectId>,
}

impl DomForest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Establish `node` as a root with no children. A run can establish
    /// several roots (document, detached fragments re-rooted by the driver).
    pub fn add_root(&mut self, node: ObjectId) {
        self.parent_to_children.insert(node, BTreeSet::new());
    }

    /// Whether `node` currently has a forest entry.
    pub fn contains(&self, node: ObjectId) -> bool {
        self.parent_to_children.contains_key(&node)
    }

    /// Children recorded under `node`, if it is in the forest.
    pub fn children(&self, node: ObjectId) -> Option<&BTreeSet<ObjectId>> {
        self.parent_to_children.get(&node)
    }

    pub fn is_two_parent(&self, node: ObjectId) -> bool {
        self.two_parent.contains(&node)
    }

    pub fn len(&self) -> usize {
        self.parent_to_children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent_to_children.is_empty()
    }

    /// Attach `child` under `parent`. Ignored unless `parent` is in the
    /// forest; returns whether the attachment happened.
    ///
    /// A child that already has a forest entry keeps it and is marked as
    /// transiently double-parented instead.
    pub fn attach(&mut self, parent: ObjectId, child: ObjectId) -> Result<bool, DomForestError> {
        let Some(children) = self.parent_to_children.get_mut(&parent) else {
            return Ok(false);
        };
        children.insert(child);
        if self.parent_to_children.contains_key(&child) {
            // The node already had a parent: reparent seen before remove.
            if !self.two_parent.insert(child) {
                return Err(DomForestError::TwoParentCorruption { child });
            }
        } else {
            self.parent_to_children.insert(child, BTreeSet::new());
        }
        Ok(true)
    }

    /// Drop `node`'s forest entry without touching its children's entries or
    /// its parent's child set. Returns whether the entry existed.
    pub fn remove(&mut self, node: ObjectId) -> bool {
        self.parent_to_children.remove(&node).is_some()
    }

    /// Detach `child` from `parent` and dissolve the subtree below it.
    ///
    /// Returns the nodes whose forest entries were deleted, in visit order;
    /// the caller stamps each one as last-used-at-removal. A visited node in
    /// the two-parent set is unmarked, kept, and not descended into — it
    /// survived at its other attachment point. Ignored (empty result) unless
    /// `parent` is in the forest.
    pub fn detach(
        &mut self,
        parent: ObjectId,
        child: ObjectId,
    ) -> Result<Vec<ObjectId>, DomForestError> {
        let Some(children) = self.parent_to_children.get_mut(&parent) else {
            return Ok(Vec::new());
        };
        if !children.remove(&child) {
            return Err(DomForestError::ChildNotUnderParent { parent, child });
        }

        let mut removed = Vec::new();
        let mut worklist = VecDeque::new();
        worklist.push_back(child);
        while let Some(node) = worklist.pop_front() {
            if self.two_parent.remove(&node) {
                continue;
            }
            let grandchildren = self.parent_to_children.remove(&node).ok_or(
                DomForestError::DetachedNodeMissing {
                    node,
                    parent,
                    child,
                },
            )?;
            worklist.extend(grandchildren);
            removed.push(node);
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
