//! Small graph-building helpers shared by the walk tests.

use bstr::BString;
use vgit_hash::{ObjectId, EMPTY_TREE_OID};
use vgit_object::Commit;
use vgit_odb::ObjectStore;
use vgit_utils::{GitDate, Signature};

fn sig(message: &str) -> Signature {
    // Deterministic timestamps keyed off the message keep OIDs distinct.
    let bump: i64 = message.bytes().map(|b| b as i64).sum();
    Signature {
        name: BString::from("Test"),
        email: BString::from("test@example.com"),
        date: GitDate::new(1_700_000_000 + bump, 0),
    }
}

/// Store a commit with the empty tree and the given parents.
pub(crate) fn commit(store: &ObjectStore, parents: &[ObjectId], message: &str) -> ObjectId {
    let commit = Commit {
        tree: EMPTY_TREE_OID,
        parents: parents.to_vec(),
        author: sig(message),
        committer: sig(message),
        encoding: None,
        gpgsig: None,
        message: BString::from(format!("{message}\n")),
    };
    store.commits().store(&commit).unwrap()
}

/// Build `len` commits in a line; index 0 is the root.
pub(crate) fn linear_chain(store: &ObjectStore, len: usize) -> Vec<ObjectId> {
    let mut chain = Vec::with_capacity(len);
    for i in 0..len {
        let parents: Vec<ObjectId> = chain.last().copied().into_iter().collect();
        chain.push(commit(store, &parents, &format!("commit {i}")));
    }
    chain
}
