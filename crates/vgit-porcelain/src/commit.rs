//! Commit creation.

use bstr::BString;
use vgit_hash::ObjectId;
use vgit_object::Commit;
use vgit_ref::RefName;
use vgit_repository::Repository;
use vgit_utils::{GitDate, Signature};

use crate::PorcelainError;

/// Options for [`commit`].
#[derive(Debug, Clone)]
pub struct CommitOptions {
    pub message: BString,
    pub author: Signature,
    /// Defaults to the author.
    pub committer: Option<Signature>,
    /// Allow a commit whose tree equals its parent's.
    pub allow_empty: bool,
}

impl CommitOptions {
    pub fn new(message: impl Into<BString>, author: Signature) -> Self {
        Self {
            message: message.into(),
            author,
            committer: None,
            allow_empty: false,
        }
    }

    /// A throwaway identity for tests and tooling.
    pub fn with_default_author(message: impl Into<BString>) -> Self {
        Self::new(
            message,
            Signature {
                name: BString::from("vgit"),
                email: BString::from("vgit@localhost"),
                date: GitDate::now(),
            },
        )
    }
}

/// A created commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub oid: ObjectId,
    pub tree: ObjectId,
    /// The merge parent consumed from `MERGE_HEAD`, if this commit
    /// concluded a merge.
    pub merged_parent: Option<ObjectId>,
}

/// Commit the staged tree.
///
/// Writes are ordered tree -> commit -> ref, and the ref update is a
/// compare-and-swap against the head observed at the start, so a crash
/// at any prefix leaves at worst unreferenced objects. An open merge
/// (`MERGE_HEAD`) contributes the second parent and is concluded.
pub fn commit(repo: &Repository, options: CommitOptions) -> Result<CommitResult, PorcelainError> {
    let index = repo.index()?;
    if index.has_conflicts() {
        return Err(PorcelainError::Index(
            vgit_index::IndexError::HasConflicts(index.conflicted_paths()),
        ));
    }

    let head = repo.head_oid()?;
    let merge_head = repo.state_ref("MERGE_HEAD")?;

    let tree = index.write_tree(repo.store())?;

    if !options.allow_empty && merge_head.is_none() {
        let parent_tree = match head {
            Some(parent) => Some(repo.store().commits().load(&parent)?.tree),
            None => None,
        };
        if parent_tree == Some(tree) {
            return Err(PorcelainError::NothingToCommit);
        }
    }

    let mut parents: Vec<ObjectId> = head.into_iter().collect();
    if let Some(merged) = merge_head {
        parents.push(merged);
    }

    let committer = options.committer.unwrap_or_else(|| options.author.clone());
    let commit = Commit {
        tree,
        parents,
        author: options.author,
        committer,
        encoding: None,
        gpgsig: None,
        message: options.message,
    };
    let oid = repo.store().commits().store(&commit)?;

    // Ref update last; only after the object is durable.
    match repo.head_branch()? {
        Some(branch) => repo.refs().compare_and_swap(&branch, head, Some(oid))?,
        None => {
            // Detached HEAD advances directly.
            repo.refs().set(&RefName::head(), &oid)?;
        }
    }

    if merge_head.is_some() {
        repo.clear_state_ref("MERGE_HEAD")?;
    }

    Ok(CommitResult {
        oid,
        tree,
        merged_parent: merge_head,
    })
}
