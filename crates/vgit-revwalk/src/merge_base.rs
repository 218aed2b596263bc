//! Ancestor tests and merge-base search.

use vgit_hash::ObjectId;

use crate::walk::WalkOptions;
use crate::{CommitGraph, WalkError};

/// First common ancestor: accumulate `a`'s ancestor set, then walk `b`'s
/// ancestry and return the first member encountered.
pub(crate) fn merge_base(
    graph: &CommitGraph<'_>,
    a: &ObjectId,
    b: &ObjectId,
) -> Result<Option<ObjectId>, WalkError> {
    let reachable_from_a = graph.ancestor_set(a)?;
    for step in graph.walk(&[*b], WalkOptions::default()) {
        let oid = step?;
        if reachable_from_a.contains(&oid) {
            return Ok(Some(oid));
        }
    }
    Ok(None)
}

/// Strict ancestor test: walk `descendant`'s parents (never `descendant`
/// itself), looking for `ancestor`.
pub(crate) fn is_ancestor(
    graph: &CommitGraph<'_>,
    ancestor: &ObjectId,
    descendant: &ObjectId,
) -> Result<bool, WalkError> {
    let parents = graph.parents(descendant)?;
    for step in graph.walk(&parents, WalkOptions::default()) {
        if step? == *ancestor {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use crate::test_support::{commit, linear_chain};
    use crate::CommitGraph;
    use vgit_odb::ObjectStore;

    #[test]
    fn merge_base_of_diverged_branches() {
        let store = ObjectStore::in_memory();
        // root <- a1 <- a2
        //     \<- b1
        let root = commit(&store, &[], "root");
        let a1 = commit(&store, &[root], "a1");
        let a2 = commit(&store, &[a1], "a2");
        let b1 = commit(&store, &[root], "b1");

        let graph = CommitGraph::new(&store);
        assert_eq!(graph.merge_base(&a2, &b1).unwrap(), Some(root));
        assert_eq!(graph.merge_base(&b1, &a2).unwrap(), Some(root));

        // The base is an ancestor of both sides.
        assert!(graph.is_ancestor(&root, &a2).unwrap());
        assert!(graph.is_ancestor(&root, &b1).unwrap());
    }

    #[test]
    fn merge_base_when_one_contains_the_other() {
        let store = ObjectStore::in_memory();
        let chain = linear_chain(&store, 3);
        let graph = CommitGraph::new(&store);

        // The older commit is itself the base.
        assert_eq!(
            graph.merge_base(&chain[0], &chain[2]).unwrap(),
            Some(chain[0])
        );
        assert_eq!(
            graph.merge_base(&chain[2], &chain[0]).unwrap(),
            Some(chain[0])
        );
        // Identical inputs: the commit itself.
        assert_eq!(
            graph.merge_base(&chain[1], &chain[1]).unwrap(),
            Some(chain[1])
        );
    }

    #[test]
    fn disjoint_histories_have_no_base() {
        let store = ObjectStore::in_memory();
        let a = commit(&store, &[], "island a");
        let b = commit(&store, &[], "island b");
        let graph = CommitGraph::new(&store);
        assert_eq!(graph.merge_base(&a, &b).unwrap(), None);
    }

    #[test]
    fn is_ancestor_is_strict() {
        let store = ObjectStore::in_memory();
        let chain = linear_chain(&store, 3);
        let graph = CommitGraph::new(&store);

        assert!(graph.is_ancestor(&chain[0], &chain[2]).unwrap());
        assert!(graph.is_ancestor(&chain[1], &chain[2]).unwrap());
        // Not reflexive, not reversed.
        assert!(!graph.is_ancestor(&chain[2], &chain[2]).unwrap());
        assert!(!graph.is_ancestor(&chain[2], &chain[0]).unwrap());
    }

    #[test]
    fn is_ancestor_through_merge() {
        let store = ObjectStore::in_memory();
        let root = commit(&store, &[], "root");
        let a = commit(&store, &[root], "a");
        let b = commit(&store, &[root], "b");
        let merge = commit(&store, &[a, b], "merge");

        let graph = CommitGraph::new(&store);
        assert!(graph.is_ancestor(&b, &merge).unwrap());
        assert!(graph.is_ancestor(&root, &merge).unwrap());
        assert!(!graph.is_ancestor(&merge, &b).unwrap());
    }
}
