//! # Identity & MetaData Graph
//!
//! The single shared index of `MetaData` rows, keyed by entity id.
//!
//! Reads (`read`, `check`, `descendants_of`, `trail_of`) are public. Every
//! write is `pub(crate)` so that only the mutation protocol and the session's
//! feed/load paths can change graph structure.
//!
//! Both walks are iterative and bounded: a visited set plus a hard cap
//! (`MAX_TRAVERSAL_DEPTH`, `MAX_TRAIL_LENGTH`) guarantees termination even
//! when the stored rows are self-referential or dangling.

use crate::metadata::MetaData;
use crate::primitives::{MAX_TRAIL_LENGTH, MAX_TRAVERSAL_DEPTH};
use crate::{EntityId, Identity};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// META INDEX
// =============================================================================

/// All `MetaData` rows of a session.
///
/// Uses `BTreeMap` so that listings and walks are reproducible.
#[derive(Debug, Clone, Default)]
pub struct MetaIndex {
    rows: BTreeMap<EntityId, MetaData>,
}

/// A parent/child pair whose two halves disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenLink {
    pub parent: Identity,
    pub child: Identity,
}

impl MetaIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the row for `id`.
    #[must_use]
    pub fn read(&self, id: &EntityId) -> Option<&MetaData> {
        self.rows.get(id)
    }

    /// Existence test used as the precondition of every mutation.
    #[must_use]
    pub fn check(&self, id: &EntityId) -> bool {
        self.rows.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetaData> {
        self.rows.values()
    }

    /// Rows with no parent.
    pub fn roots(&self) -> impl Iterator<Item = &MetaData> {
        self.rows.values().filter(|row| row.parent.is_none())
    }

    /// Depth-first, pre-order walk of the children index below `id`.
    ///
    /// `max_depth = Some(1)` returns direct children only; `None` walks the
    /// whole subtree (still capped at `MAX_TRAVERSAL_DEPTH`). Returns an empty
    /// list when `id` is absent. Child entries whose own row is missing are
    /// reported but not expanded.
    #[must_use]
    pub fn descendants_of(&self, id: &EntityId, max_depth: Option<usize>) -> Vec<Identity> {
        let mut out = Vec::new();
        let Some(root) = self.rows.get(id) else {
            return out;
        };

        let limit = max_depth
            .unwrap_or(MAX_TRAVERSAL_DEPTH)
            .min(MAX_TRAVERSAL_DEPTH);
        if limit == 0 {
            return out;
        }

        let mut visited = BTreeSet::new();
        visited.insert(root.id.clone());

        let mut stack: Vec<(Identity, usize)> = root
            .child_identities()
            .rev()
            .map(|child| (child.clone(), 1))
            .collect();

        while let Some((current, depth)) = stack.pop() {
            if !visited.insert(current.id.clone()) {
                continue;
            }
            if depth < limit
                && let Some(row) = self.rows.get(&current.id)
            {
                stack.extend(
                    row.child_identities()
                        .rev()
                        .map(|child| (child.clone(), depth.saturating_add(1))),
                );
            }
            out.push(current);
        }

        out
    }

    /// Ancestors of `id`, nearest first.
    ///
    /// Stops at a parent pointer that loops back onto the trail, at a parent
    /// without a row, or after `MAX_TRAIL_LENGTH` steps.
    #[must_use]
    pub fn trail_of(&self, id: &EntityId) -> Vec<Identity> {
        let mut trail = Vec::new();
        let Some(mut current) = self.rows.get(id) else {
            return trail;
        };

        let mut seen = BTreeSet::new();
        seen.insert(current.id.clone());

        while let Some(parent) = &current.parent {
            if trail.len() >= MAX_TRAIL_LENGTH || !seen.insert(parent.id.clone()) {
                break;
            }
            trail.push(parent.clone());
            match self.rows.get(&parent.id) {
                Some(row) => current = row,
                None => break,
            }
        }

        trail
    }

    /// `true` if `ancestor` appears on the trail of `id`.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: &EntityId, id: &EntityId) -> bool {
        self.trail_of(id).iter().any(|step| &step.id == ancestor)
    }

    /// Every parent/child pair that is not reciprocal.
    ///
    /// An empty result means each `parent` pointer has a matching children
    /// entry and each children entry points back through `parent`.
    #[must_use]
    pub fn broken_links(&self) -> Vec<BrokenLink> {
        let mut broken = Vec::new();
        for row in self.rows.values() {
            if let Some(parent) = &row.parent {
                let reciprocal = self
                    .rows
                    .get(&parent.id)
                    .is_some_and(|p| p.has_child(&row.identity()));
                if !reciprocal {
                    broken.push(BrokenLink {
                        parent: parent.clone(),
                        child: row.identity(),
                    });
                }
            }
            for child in row.child_identities() {
                let reciprocal = self
                    .rows
                    .get(&child.id)
                    .and_then(|c| c.parent.as_ref())
                    .is_some_and(|p| p.id == row.id);
                if !reciprocal {
                    broken.push(BrokenLink {
                        parent: row.identity(),
                        child: child.clone(),
                    });
                }
            }
        }
        broken
    }

    // =========================================================================
    // WRITES (mutation protocol only)
    // =========================================================================

    pub(crate) fn insert(&mut self, row: MetaData) {
        self.rows.insert(row.id.clone(), row);
    }

    pub(crate) fn remove(&mut self, id: &EntityId) -> Option<MetaData> {
        self.rows.remove(id)
    }

    pub(crate) fn get_mut(&mut self, id: &EntityId) -> Option<&mut MetaData> {
        self.rows.get_mut(id)
    }

    /// Points `child` at `parent` and records the reciprocal entry.
    ///
    /// Both rows must exist; returns `false` and changes nothing otherwise.
    pub(crate) fn link(&mut self, child: &Identity, parent: &Identity) -> bool {
        if !self.check(&child.id) || !self.check(&parent.id) {
            return false;
        }
        if let Some(row) = self.rows.get_mut(&child.id) {
            row.parent = Some(parent.clone());
        }
        if let Some(row) = self.rows.get_mut(&parent.id) {
            row.insert_child(child.clone());
        }
        true
    }

    /// Clears `child`'s parent pointer and the parent's entry for it.
    ///
    /// Returns the former parent, if any.
    pub(crate) fn unlink(&mut self, child: &Identity) -> Option<Identity> {
        let parent = self.rows.get_mut(&child.id)?.parent.take()?;
        if let Some(row) = self.rows.get_mut(&parent.id) {
            row.remove_child(child);
        }
        Some(parent)
    }

    /// Drops one-sided links left behind by rows that were never persisted.
    ///
    /// Returns the number of entries removed.
    pub(crate) fn repair(&mut self) -> usize {
        let broken = self.broken_links();
        let mut fixed = 0usize;
        for link in broken {
            let child_points_back = self
                .rows
                .get(&link.child.id)
                .and_then(|c| c.parent.as_ref())
                .is_some_and(|p| p.id == link.parent.id);
            if child_points_back {
                // parent row missing or lacking the entry: re-add when the parent exists
                if let Some(parent) = self.rows.get_mut(&link.parent.id) {
                    parent.insert_child(link.child.clone());
                } else if let Some(child) = self.rows.get_mut(&link.child.id) {
                    child.parent = None;
                }
            } else if let Some(parent) = self.rows.get_mut(&link.parent.id) {
                parent.remove_child(&link.child);
            }
            fixed = fixed.saturating_add(1);
        }
        fixed
    }
}

// =============================================================================
// TESTS
// =============================================================================
