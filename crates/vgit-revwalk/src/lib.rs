//! Commit graph traversal over the object store.
//!
//! Everything here is derived from two lookups: a commit's parents and
//! its tree. The walk is a depth-first traversal with `parent[0]`
//! visited first, which makes first-parent chains come out contiguous.

mod merge_base;
mod walk;

#[cfg(test)]
pub(crate) mod test_support;

pub use walk::{Walk, WalkOptions};

use std::collections::HashSet;

use vgit_hash::ObjectId;
use vgit_odb::ObjectStore;

/// Errors from graph traversal.
#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error(transparent)]
    Odb(#[from] vgit_odb::OdbError),
}

/// Read-side view of the commit DAG.
pub struct CommitGraph<'a> {
    store: &'a ObjectStore,
}

impl<'a> CommitGraph<'a> {
    pub fn new(store: &'a ObjectStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &'a ObjectStore {
        self.store
    }

    /// Parent OIDs of a commit, in recorded order.
    pub fn parents(&self, oid: &ObjectId) -> Result<Vec<ObjectId>, WalkError> {
        Ok(self.store.commits().load(oid)?.parents)
    }

    /// Root tree of a commit.
    pub fn tree_of(&self, oid: &ObjectId) -> Result<ObjectId, WalkError> {
        Ok(self.store.commits().load(oid)?.tree)
    }

    /// Depth-first ancestry walk from `starts`.
    pub fn walk(&self, starts: &[ObjectId], options: WalkOptions) -> Walk<'a, '_> {
        Walk::new(self, starts, options)
    }

    /// All ancestors of `oid`, including itself.
    pub fn ancestor_set(&self, oid: &ObjectId) -> Result<HashSet<ObjectId>, WalkError> {
        let mut set = HashSet::new();
        for step in self.walk(&[*oid], WalkOptions::default()) {
            set.insert(step?);
        }
        Ok(set)
    }

    /// Most-recent common ancestor of `a` and `b` (`None` for disjoint
    /// histories).
    ///
    /// Accumulates `a`'s ancestors, then probes them with `b`'s ancestry
    /// in walk order: the first hit is the merge base.
    pub fn merge_base(&self, a: &ObjectId, b: &ObjectId) -> Result<Option<ObjectId>, WalkError> {
        merge_base::merge_base(self, a, b)
    }

    /// Whether `ancestor` is a strict ancestor of `descendant`.
    /// A commit is not its own ancestor.
    pub fn is_ancestor(
        &self,
        ancestor: &ObjectId,
        descendant: &ObjectId,
    ) -> Result<bool, WalkError> {
        merge_base::is_ancestor(self, ancestor, descendant)
    }
}
