//! Rebase: replay commits one at a time onto a new base.
//!
//! State persists under `<gitdir>/rebase-merge/` so a conflicted rebase
//! survives process restarts: `onto`, `orig-head`, `head-name`, the
//! remaining `todo` and the `done` list. `REBASE_HEAD` names the commit
//! being replayed while stopped.

use std::fs;
use std::path::PathBuf;

use bstr::BString;
use vgit_hash::{ObjectId, EMPTY_TREE_OID};
use vgit_object::Commit;
use vgit_ref::RefName;
use vgit_repository::{CheckoutOptions, Repository};
use vgit_revwalk::{CommitGraph, WalkOptions};

use crate::tree::merge_trees;
use crate::{MergeError, MergeOptions};

/// How a rebase (or one of its resume operations) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebaseStatus {
    /// Nothing to replay: upstream already contains the head.
    UpToDate,
    /// The head could simply advance to `onto`.
    FastForward,
    /// All commits replayed; the branch now sits on the new history.
    Ok,
    /// Paused on a conflicted commit; resolve and continue (or skip or
    /// abort). State is on disk.
    Stopped,
    /// `continue` was called while conflicts are still staged.
    Conflicts,
    /// Structural failure (set by callers mapping hard errors).
    Failed,
    /// The rebase was rolled back to the original head.
    Aborted,
}

/// The typed result of a rebase step.
#[derive(Debug, Clone)]
pub struct RebaseResult {
    pub status: RebaseStatus,
    /// Branch tip after the operation (when it moved).
    pub new_head: Option<ObjectId>,
    /// The commit being replayed when stopped.
    pub stopped_at: Option<ObjectId>,
    /// Conflicted paths when stopped.
    pub conflicts: Vec<BString>,
}

impl RebaseResult {
    fn done(status: RebaseStatus, new_head: ObjectId) -> Self {
        Self {
            status,
            new_head: Some(new_head),
            stopped_at: None,
            conflicts: Vec::new(),
        }
    }
}

/// On-disk rebase state.
struct RebaseState {
    onto: ObjectId,
    orig_head: ObjectId,
    head_name: Option<RefName>,
    /// Commits still to replay, oldest first.
    todo: Vec<ObjectId>,
    /// Tip of the rewritten history so far.
    current: ObjectId,
}

impl RebaseState {
    fn dir(repo: &Repository) -> PathBuf {
        repo.git_dir().join("rebase-merge")
    }

    fn save(&self, repo: &Repository) -> Result<(), MergeError> {
        let dir = Self::dir(repo);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("onto"), format!("{}\n", self.onto.to_hex()))?;
        fs::write(
            dir.join("orig-head"),
            format!("{}\n", self.orig_head.to_hex()),
        )?;
        fs::write(
            dir.join("head-name"),
            match &self.head_name {
                Some(name) => format!("{name}\n"),
                None => "detached\n".to_string(),
            },
        )?;
        let todo: String = self
            .todo
            .iter()
            .map(|oid| format!("{}\n", oid.to_hex()))
            .collect();
        fs::write(dir.join("todo"), todo)?;
        fs::write(dir.join("current"), format!("{}\n", self.current.to_hex()))?;
        Ok(())
    }

    fn load(repo: &Repository) -> Result<Option<Self>, MergeError> {
        let dir = Self::dir(repo);
        if !dir.is_dir() {
            return Ok(None);
        }
        let read_oid = |name: &str| -> Result<ObjectId, MergeError> {
            let text = fs::read_to_string(dir.join(name))?;
            ObjectId::from_hex(text.trim())
                .map_err(|e| MergeError::Io(std::io::Error::other(e.to_string())))
        };
        let head_name = {
            let text = fs::read_to_string(dir.join("head-name"))?;
            let trimmed = text.trim();
            (trimmed != "detached")
                .then(|| RefName::new(trimmed))
                .transpose()?
        };
        let todo = fs::read_to_string(dir.join("todo"))?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                ObjectId::from_hex(l.trim())
                    .map_err(|e| MergeError::Io(std::io::Error::other(e.to_string())))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Self {
            onto: read_oid("onto")?,
            orig_head: read_oid("orig-head")?,
            head_name,
            todo,
            current: read_oid("current")?,
        }))
    }

    fn clear(repo: &Repository) -> Result<(), MergeError> {
        let dir = Self::dir(repo);
        if dir.is_dir() {
            fs::remove_dir_all(&dir)?;
        }
        repo.clear_state_ref("REBASE_HEAD")?;
        Ok(())
    }
}

/// Rebase the current head onto `onto`, replaying everything in
/// `upstream..head`.
pub fn rebase(
    repo: &Repository,
    upstream: &ObjectId,
    onto: &ObjectId,
) -> Result<RebaseResult, MergeError> {
    let head = repo
        .head_oid()?
        .ok_or(vgit_repository::RepoError::UnbornHead)?;
    let graph = CommitGraph::new(repo.store());

    // Everything reachable from head but not from upstream, oldest
    // first. Merge commits are dropped: replay linearizes.
    let exclude = graph.ancestor_set(upstream)?;
    let mut todo: Vec<ObjectId> = Vec::new();
    for step in graph.walk(&[head], WalkOptions::default()) {
        let oid = step?;
        if !exclude.contains(&oid) && !repo.store().commits().load(&oid)?.is_merge() {
            todo.push(oid);
        }
    }
    todo.reverse();

    if todo.is_empty() || graph.is_ancestor(&head, onto)? || head == *onto {
        if head != *onto && graph.is_ancestor(&head, onto)? {
            // Pure advance.
            move_head(repo, head, *onto)?;
            return Ok(RebaseResult::done(RebaseStatus::FastForward, *onto));
        }
        return Ok(RebaseResult::done(RebaseStatus::UpToDate, head));
    }

    repo.set_state_ref("ORIG_HEAD", &head)?;
    let state = RebaseState {
        onto: *onto,
        orig_head: head,
        head_name: repo.head_branch()?,
        todo,
        current: *onto,
    };
    state.save(repo)?;

    run_todo(repo, state)
}

/// Resume after resolving conflicts: commit the staged resolution for
/// the stopped commit, then replay the rest.
pub fn rebase_continue(repo: &Repository) -> Result<RebaseResult, MergeError> {
    let Some(mut state) = RebaseState::load(repo)? else {
        return Ok(RebaseResult {
            status: RebaseStatus::Failed,
            new_head: None,
            stopped_at: None,
            conflicts: Vec::new(),
        });
    };

    let index = repo.index()?;
    if index.has_conflicts() {
        return Ok(RebaseResult {
            status: RebaseStatus::Conflicts,
            new_head: None,
            stopped_at: state.todo.first().copied(),
            conflicts: index.conflicted_paths(),
        });
    }

    // The staged tree is the resolution of the stopped commit.
    let replayed = state.todo.remove(0);
    let template = repo.store().commits().load(&replayed)?;
    let tree = index.write_tree(repo.store())?;
    state.current = commit_like(repo, &template, tree, state.current)?;
    repo.clear_state_ref("REBASE_HEAD")?;
    state.save(repo)?;

    run_todo(repo, state)
}

/// Drop the stopped commit and replay the rest.
pub fn rebase_skip(repo: &Repository) -> Result<RebaseResult, MergeError> {
    let Some(mut state) = RebaseState::load(repo)? else {
        return Ok(RebaseResult {
            status: RebaseStatus::Failed,
            new_head: None,
            stopped_at: None,
            conflicts: Vec::new(),
        });
    };
    if !state.todo.is_empty() {
        state.todo.remove(0);
    }
    repo.clear_state_ref("REBASE_HEAD")?;
    // Reset the index and worktree to the rewritten tip before resuming.
    reset_to(repo, state.current)?;
    state.save(repo)?;
    run_todo(repo, state)
}

/// Roll everything back to the original head.
pub fn rebase_abort(repo: &Repository) -> Result<RebaseResult, MergeError> {
    let Some(state) = RebaseState::load(repo)? else {
        return Ok(RebaseResult {
            status: RebaseStatus::Failed,
            new_head: None,
            stopped_at: None,
            conflicts: Vec::new(),
        });
    };

    if let Some(branch) = &state.head_name {
        repo.refs().set(branch, &state.orig_head)?;
    }
    reset_to(repo, state.orig_head)?;
    RebaseState::clear(repo)?;

    Ok(RebaseResult::done(RebaseStatus::Aborted, state.orig_head))
}

/// Replay the remaining todo list.
fn run_todo(repo: &Repository, mut state: RebaseState) -> Result<RebaseResult, MergeError> {
    let options = MergeOptions::default();

    while let Some(&next) = state.todo.first() {
        let commit = repo.store().commits().load(&next)?;
        let base_tree = match commit.first_parent() {
            Some(parent) => repo.store().commits().load(parent)?.tree,
            None => EMPTY_TREE_OID,
        };
        let current_tree = repo.store().commits().load(&state.current)?.tree;

        let outcome = merge_trees(
            repo.store(),
            &base_tree,
            &current_tree,
            &commit.tree,
            &options,
        )?;

        if !outcome.is_clean() {
            // Stop: project the conflicted tree, stage the stages, save.
            state.save(repo)?;
            repo.set_state_ref("REBASE_HEAD", &next)?;

            repo.worktree().checkout_tree(
                &outcome.tree,
                &CheckoutOptions {
                    force: true,
                    ..Default::default()
                },
            )?;

            let mut index = repo.index()?;
            index.set_path(repo.git_dir().join("index"));
            index.read_tree(
                repo.store(),
                &outcome.tree,
                vgit_index::ReadTreeOptions::default(),
            )?;
            let mut conflicted = Vec::new();
            for conflict in &outcome.conflicts {
                index.set_conflict(
                    &conflict.path,
                    conflict.base,
                    conflict.ours,
                    conflict.theirs,
                );
                conflicted.push(conflict.path.clone());
            }
            index.write()?;

            return Ok(RebaseResult {
                status: RebaseStatus::Stopped,
                new_head: None,
                stopped_at: Some(next),
                conflicts: conflicted,
            });
        }

        state.todo.remove(0);
        state.current = commit_like(repo, &commit, outcome.tree, state.current)?;
        state.save(repo)?;
    }

    // All replayed: move the branch, project the final tree, clean up.
    if let Some(branch) = &state.head_name {
        repo.refs().set(branch, &state.current)?;
    }
    reset_to(repo, state.current)?;
    let new_head = state.current;
    RebaseState::clear(repo)?;

    Ok(RebaseResult::done(RebaseStatus::Ok, new_head))
}

/// Store a commit reusing `template`'s author/committer/message with a
/// new tree and parent. Signatures do not survive rewriting.
fn commit_like(
    repo: &Repository,
    template: &Commit,
    tree: ObjectId,
    parent: ObjectId,
) -> Result<ObjectId, MergeError> {
    let commit = Commit {
        tree,
        parents: vec![parent],
        author: template.author.clone(),
        committer: template.committer.clone(),
        encoding: template.encoding.clone(),
        gpgsig: None,
        message: template.message.clone(),
    };
    Ok(repo.store().commits().store(&commit)?)
}

fn move_head(repo: &Repository, from: ObjectId, to: ObjectId) -> Result<(), MergeError> {
    if let Some(branch) = repo.head_branch()? {
        repo.refs()
            .compare_and_swap(&branch, Some(from), Some(to))?;
    }
    reset_to(repo, to)?;
    Ok(())
}

/// Hard-project a commit's tree into the worktree and index.
fn reset_to(repo: &Repository, commit: ObjectId) -> Result<(), MergeError> {
    let tree = repo.store().commits().load(&commit)?.tree;
    repo.worktree().checkout_tree(
        &tree,
        &CheckoutOptions {
            force: true,
            ..Default::default()
        },
    )?;
    let mut index = repo.index()?;
    index.set_path(repo.git_dir().join("index"));
    index.read_tree(
        repo.store(),
        &tree,
        vgit_index::ReadTreeOptions::default(),
    )?;
    index.write()?;
    Ok(())
}
