use std::collections::HashSet;

use vgit_hash::ObjectId;

use crate::{CommitGraph, WalkError};

/// Options for an ancestry walk.
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Stop after emitting this many commits.
    pub limit: Option<usize>,
    /// Barrier commits: emitted as encountered but never traversed past.
    pub stop_at: HashSet<ObjectId>,
    /// Follow only `parent[0]` links.
    pub first_parent_only: bool,
}

/// Depth-first ancestry iterator.
///
/// Each commit is yielded at most once. Parents are pushed in reverse
/// order so `parent[0]` is visited before later parents at a merge.
pub struct Walk<'store, 'graph> {
    graph: &'graph CommitGraph<'store>,
    stack: Vec<ObjectId>,
    visited: HashSet<ObjectId>,
    options: WalkOptions,
    emitted: usize,
    failed: bool,
}

impl<'store, 'graph> Walk<'store, 'graph> {
    pub(crate) fn new(
        graph: &'graph CommitGraph<'store>,
        starts: &[ObjectId],
        options: WalkOptions,
    ) -> Self {
        // Reversed so the first start is popped (and emitted) first.
        let stack: Vec<ObjectId> = starts.iter().rev().copied().collect();
        Self {
            graph,
            stack,
            visited: HashSet::new(),
            options,
            emitted: 0,
            failed: false,
        }
    }
}

impl Iterator for Walk<'_, '_> {
    type Item = Result<ObjectId, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Some(limit) = self.options.limit {
            if self.emitted >= limit {
                return None;
            }
        }

        while let Some(oid) = self.stack.pop() {
            if !self.visited.insert(oid) {
                continue;
            }

            if !self.options.stop_at.contains(&oid) {
                let parents = match self.graph.parents(&oid) {
                    Ok(parents) => parents,
                    Err(e) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                };
                if self.options.first_parent_only {
                    if let Some(first) = parents.first() {
                        self.stack.push(*first);
                    }
                } else {
                    for parent in parents.iter().rev() {
                        self.stack.push(*parent);
                    }
                }
            }

            self.emitted += 1;
            return Some(Ok(oid));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit, linear_chain};
    use vgit_odb::ObjectStore;

    #[test]
    fn linear_history_newest_first() {
        let store = ObjectStore::in_memory();
        let chain = linear_chain(&store, 4); // c0 <- c1 <- c2 <- c3

        let graph = CommitGraph::new(&store);
        let walked: Vec<ObjectId> = graph
            .walk(&[chain[3]], WalkOptions::default())
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(walked, vec![chain[3], chain[2], chain[1], chain[0]]);
    }

    #[test]
    fn merge_visits_first_parent_side_first() {
        let store = ObjectStore::in_memory();
        //   root <- a <- merge
        //      \__ b __/
        let root = commit(&store, &[], "root");
        let a = commit(&store, &[root], "a");
        let b = commit(&store, &[root], "b");
        let merge = commit(&store, &[a, b], "merge");

        let graph = CommitGraph::new(&store);
        let walked: Vec<ObjectId> = graph
            .walk(&[merge], WalkOptions::default())
            .map(|r| r.unwrap())
            .collect();
        // DFS: merge, then the whole first-parent side, then b.
        assert_eq!(walked, vec![merge, a, root, b]);
    }

    #[test]
    fn each_commit_emitted_once() {
        let store = ObjectStore::in_memory();
        let root = commit(&store, &[], "root");
        let a = commit(&store, &[root], "a");
        let b = commit(&store, &[root], "b");
        let merge = commit(&store, &[a, b], "merge");

        let graph = CommitGraph::new(&store);
        let walked: Vec<ObjectId> = graph
            .walk(&[merge], WalkOptions::default())
            .map(|r| r.unwrap())
            .collect();
        let unique: HashSet<_> = walked.iter().collect();
        assert_eq!(unique.len(), walked.len());
        assert_eq!(walked.len(), 4);
    }

    #[test]
    fn limit_truncates() {
        let store = ObjectStore::in_memory();
        let chain = linear_chain(&store, 5);
        let graph = CommitGraph::new(&store);

        let walked: Vec<ObjectId> = graph
            .walk(
                &[chain[4]],
                WalkOptions {
                    limit: Some(2),
                    ..Default::default()
                },
            )
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(walked, vec![chain[4], chain[3]]);
    }

    #[test]
    fn stop_at_is_a_barrier() {
        let store = ObjectStore::in_memory();
        let chain = linear_chain(&store, 4);
        let graph = CommitGraph::new(&store);

        let mut stop = HashSet::new();
        stop.insert(chain[1]);
        let walked: Vec<ObjectId> = graph
            .walk(
                &[chain[3]],
                WalkOptions {
                    stop_at: stop,
                    ..Default::default()
                },
            )
            .map(|r| r.unwrap())
            .collect();
        // chain[1] is emitted but chain[0] is never reached.
        assert_eq!(walked, vec![chain[3], chain[2], chain[1]]);
    }

    #[test]
    fn first_parent_only_skips_merge_branches() {
        let store = ObjectStore::in_memory();
        let root = commit(&store, &[], "root");
        let a = commit(&store, &[root], "a");
        let b = commit(&store, &[root], "b");
        let merge = commit(&store, &[a, b], "merge");

        let graph = CommitGraph::new(&store);
        let walked: Vec<ObjectId> = graph
            .walk(
                &[merge],
                WalkOptions {
                    first_parent_only: true,
                    ..Default::default()
                },
            )
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(walked, vec![merge, a, root]);
    }

    #[test]
    fn missing_commit_surfaces_error() {
        let store = ObjectStore::in_memory();
        let graph = CommitGraph::new(&store);
        let ghost = ObjectId([9u8; 20]);

        let results: Vec<_> = graph.walk(&[ghost], WalkOptions::default()).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }
}
