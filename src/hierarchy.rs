//! The tag hierarchy, held in memory as an arena keyed by tag ID.
//!
//! Every walk here carries a visited set. If the stored parent links ever
//! loop, walks fail with [`HierarchyError::CycleDetected`] instead of spinning
//! forever.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{error::HierarchyError, models::TagId};

/// A snapshot of the tag forest: who each tag's parent is, and the reverse.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TagTree {
    parents: HashMap<TagId, Option<TagId>>,
    children: HashMap<TagId, Vec<TagId>>,
}

impl TagTree {
    /// Builds the tree from `(tag, parent)` edges.
    pub fn from_edges(edges: impl IntoIterator<Item = (TagId, Option<TagId>)>) -> Self {
        let mut tree = Self::default();

        for (tag, parent) in edges {
            tree.parents.insert(tag, parent);
            tree.children.entry(tag).or_default();

            if let Some(parent) = parent {
                tree.children.entry(parent).or_default().push(tag);
            }
        }

        // keep walks deterministic
        for kids in tree.children.values_mut() {
            kids.sort_unstable();
        }

        tree
    }

    pub fn contains(&self, tag: TagId) -> bool {
        self.parents.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// The direct parent of `tag`.
    pub fn parent(&self, tag: TagId) -> Result<Option<TagId>, HierarchyError> {
        self.parents
            .get(&tag)
            .copied()
            .ok_or(HierarchyError::UnknownTag(tag))
    }

    /// The direct children of `tag`, in ID order.
    pub fn children(&self, tag: TagId) -> Result<&[TagId], HierarchyError> {
        self.children
            .get(&tag)
            .map(Vec::as_slice)
            .ok_or(HierarchyError::UnknownTag(tag))
    }

    /// Every ancestor of `tag`, nearest first. `tag` itself isn't included.
    pub fn ancestors(&self, tag: TagId) -> Result<Vec<TagId>, HierarchyError> {
        let mut seen = HashSet::from([tag]);
        let mut out = Vec::new();
        let mut current = self.parent(tag)?;

        while let Some(parent) = current {
            if !seen.insert(parent) {
                tracing::error!("Tag `{tag}` has itself as an ancestor (via `{parent}`).");
                return Err(HierarchyError::CycleDetected(parent));
            }

            out.push(parent);
            current = self.parent(parent)?;
        }

        Ok(out)
    }

    /// Returns `explicit` plus every ancestor of every tag within it.
    ///
    /// The result is a fixed point: closing an already-closed set changes
    /// nothing.
    pub fn close_over_ancestors(
        &self,
        explicit: &BTreeSet<TagId>,
    ) -> Result<BTreeSet<TagId>, HierarchyError> {
        let mut closed = explicit.clone();

        for tag in explicit {
            // overlapping chains are fine. the set dedupes them
            for ancestor in self.ancestors(*tag)? {
                closed.insert(ancestor);
            }
        }

        Ok(closed)
    }

    /// Every descendant of `tag`, in pre-order. `tag` itself isn't included.
    pub fn descendants(&self, tag: TagId) -> Result<Vec<TagId>, HierarchyError> {
        let mut seen = HashSet::from([tag]);
        let mut out = Vec::new();
        let mut stack: Vec<TagId> = self.children(tag)?.iter().rev().copied().collect();

        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                return Err(HierarchyError::CycleDetected(next));
            }

            out.push(next);
            stack.extend(self.children(next)?.iter().rev().copied());
        }

        Ok(out)
    }

    /// The order that `tag`'s subtree must be removed in: every child before
    /// its parent (post-order), ending with `tag` itself.
    pub fn deletion_order(&self, tag: TagId) -> Result<Vec<TagId>, HierarchyError> {
        // (tag, whether its children were already pushed)
        let mut stack = vec![(tag, false)];
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        while let Some((next, expanded)) = stack.pop() {
            if expanded {
                out.push(next);
                continue;
            }

            if !seen.insert(next) {
                return Err(HierarchyError::CycleDetected(next));
            }

            stack.push((next, true));
            for child in self.children(next)?.iter().rev() {
                stack.push((*child, false));
            }
        }

        Ok(out)
    }

    /// Whether giving `tag` the parent `new_parent` would create a loop.
    pub fn would_cycle(&self, tag: TagId, new_parent: TagId) -> Result<bool, HierarchyError> {
        if tag == new_parent {
            return Ok(true);
        }

        Ok(self.ancestors(new_parent)?.contains(&tag))
    }
}
