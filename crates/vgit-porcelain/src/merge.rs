//! The `merge` command.

use bstr::BString;
use vgit_hash::ObjectId;
use vgit_index::ReadTreeOptions;
use vgit_merge::{analyze, merge_trees, MergeAnalysis, MergeOptions};
use vgit_object::Commit;
use vgit_ref::RefName;
use vgit_repository::{resolve_revision, CheckoutOptions, Repository};
use vgit_revwalk::CommitGraph;
use vgit_utils::Signature;

use crate::{require_clean_state, PorcelainError};

/// How the merge concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStatus {
    /// Theirs was already contained in ours; nothing changed.
    UpToDate,
    /// Ours advanced to theirs with no new commit.
    FastForward,
    /// A merge commit was created.
    Merged,
    /// Conflicts were staged; `MERGE_HEAD` is set, commit concludes.
    Conflicts,
    /// Structural failure (missing objects, unrelated histories).
    Failed,
}

/// Options for [`merge`].
#[derive(Debug, Clone, Default)]
pub struct MergeCommandOptions {
    /// Create a merge commit even when a fast-forward would do.
    pub no_ff: bool,
    /// Strategy knobs forwarded to the tree merge.
    pub merge: MergeOptions,
    /// Identity for any created merge commit.
    pub author: Option<Signature>,
    /// Message for any created merge commit.
    pub message: Option<BString>,
    /// Allow merging histories with no common ancestor.
    pub allow_unrelated: bool,
}

/// The typed `merge` result.
#[derive(Debug, Clone)]
pub struct MergeCommandResult {
    pub status: MergeStatus,
    pub new_head: Option<ObjectId>,
    /// Conflicted paths when `status == Conflicts`.
    pub conflicts: Vec<BString>,
}

/// Merge a revision into the current branch.
pub fn merge(
    repo: &Repository,
    theirs_rev: &str,
    options: &MergeCommandOptions,
) -> Result<MergeCommandResult, PorcelainError> {
    require_clean_state(repo)?;

    let ours = repo
        .head_oid()?
        .ok_or(vgit_repository::RepoError::UnbornHead)?;
    let theirs = resolve_revision(repo, theirs_rev)?;

    let graph = CommitGraph::new(repo.store());
    let base = match analyze(&graph, &ours, &theirs)? {
        MergeAnalysis::UpToDate => {
            return Ok(MergeCommandResult {
                status: MergeStatus::UpToDate,
                new_head: Some(ours),
                conflicts: Vec::new(),
            })
        }
        MergeAnalysis::FastForward if !options.no_ff => {
            move_to(repo, ours, theirs)?;
            return Ok(MergeCommandResult {
                status: MergeStatus::FastForward,
                new_head: Some(theirs),
                conflicts: Vec::new(),
            });
        }
        MergeAnalysis::FastForward => ours,
        MergeAnalysis::Diverged { base } => base,
        MergeAnalysis::Unrelated if options.allow_unrelated => vgit_hash::ZERO_OID,
        MergeAnalysis::Unrelated => {
            return Ok(MergeCommandResult {
                status: MergeStatus::Failed,
                new_head: None,
                conflicts: Vec::new(),
            })
        }
    };

    let base_tree = if base.is_zero() {
        vgit_hash::EMPTY_TREE_OID
    } else {
        repo.store().commits().load(&base)?.tree
    };
    let ours_tree = repo.store().commits().load(&ours)?.tree;
    let theirs_tree = repo.store().commits().load(&theirs)?.tree;

    let outcome = merge_trees(
        repo.store(),
        &base_tree,
        &ours_tree,
        &theirs_tree,
        &options.merge,
    )?;

    // Project the merged tree (markers included when conflicted).
    repo.worktree().checkout_tree(
        &outcome.tree,
        &CheckoutOptions {
            force: true,
            ..Default::default()
        },
    )?;
    let mut index = repo.index()?;
    index.set_path(repo.git_dir().join("index"));
    index.read_tree(repo.store(), &outcome.tree, ReadTreeOptions::default())?;

    if !outcome.is_clean() {
        // Stage the three sides and leave the merge open.
        let mut conflicts = Vec::new();
        for conflict in &outcome.conflicts {
            index.set_conflict(
                &conflict.path,
                conflict.base,
                conflict.ours,
                conflict.theirs,
            );
            conflicts.push(conflict.path.clone());
        }
        index.write()?;
        repo.set_state_ref("MERGE_HEAD", &theirs)?;
        repo.set_state_ref("ORIG_HEAD", &ours)?;
        return Ok(MergeCommandResult {
            status: MergeStatus::Conflicts,
            new_head: None,
            conflicts,
        });
    }
    index.write()?;

    // Clean: record the merge commit, first parent ours.
    let author = options.author.clone().unwrap_or_else(|| Signature {
        name: BString::from("vgit"),
        email: BString::from("vgit@localhost"),
        date: vgit_utils::GitDate::now(),
    });
    let message = options.message.clone().unwrap_or_else(|| {
        BString::from(format!("Merge {theirs_rev}\n"))
    });
    let commit = Commit {
        tree: outcome.tree,
        parents: vec![ours, theirs],
        author: author.clone(),
        committer: author,
        encoding: None,
        gpgsig: None,
        message,
    };
    let merge_oid = repo.store().commits().store(&commit)?;
    move_to(repo, ours, merge_oid)?;

    Ok(MergeCommandResult {
        status: MergeStatus::Merged,
        new_head: Some(merge_oid),
        conflicts: Vec::new(),
    })
}

/// Advance the current branch (or detached HEAD) from `from` to `to`.
fn move_to(repo: &Repository, from: ObjectId, to: ObjectId) -> Result<(), PorcelainError> {
    match repo.head_branch()? {
        Some(branch) => repo.refs().compare_and_swap(&branch, Some(from), Some(to))?,
        None => repo.refs().set(&RefName::head(), &to)?,
    }
    let tree = repo.store().commits().load(&to)?.tree;
    repo.worktree().checkout_tree(
        &tree,
        &CheckoutOptions {
            force: true,
            ..Default::default()
        },
    )?;
    let mut index = repo.index()?;
    index.set_path(repo.git_dir().join("index"));
    index.read_tree(repo.store(), &tree, ReadTreeOptions::default())?;
    index.write()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{add, branch_create, checkout, commit as commit_cmd, CommitOptions};
    use vgit_object::FileMode;
    use vgit_repository::init;

    fn write(repo: &Repository, path: &str, content: &[u8]) {
        repo.worktree()
            .write_content(&BString::from(path), content, FileMode::Regular)
            .unwrap();
    }

    fn quick_commit(repo: &Repository, path: &str, content: &[u8], msg: &str) -> ObjectId {
        write(repo, path, content);
        add(repo, &[path]).unwrap();
        commit_cmd(repo, CommitOptions::with_default_author(msg))
            .unwrap()
            .oid
    }

    /// main: A -> B; feat branches at A and adds C.
    fn fixture() -> (tempfile::TempDir, Repository, ObjectId, ObjectId, ObjectId) {
        let dir = tempfile::tempdir().unwrap();
        let repo = init(dir.path()).unwrap();
        let a = quick_commit(&repo, "base.txt", b"base\n", "A");
        branch_create(&repo, "feat", None).unwrap();
        let b = quick_commit(&repo, "main.txt", b"main\n", "B");
        checkout(&repo, "feat", false).unwrap();
        let c = quick_commit(&repo, "feat.txt", b"feat\n", "C");
        (dir, repo, a, b, c)
    }

    #[test]
    fn fast_forward_advances_ref_only() {
        let (dir, repo, a, _b, c) = fixture();
        // "behind" parks at A, strictly behind feat's C.
        branch_create(&repo, "behind", Some(&a.to_hex())).unwrap();
        checkout(&repo, "behind", false).unwrap();
        let result = merge(&repo, "feat", &MergeCommandOptions::default()).unwrap();

        assert_eq!(result.status, MergeStatus::FastForward);
        assert_eq!(result.new_head, Some(c));
        // No merge commit: the tip IS feat's tip.
        let tip = repo.store().commits().load(&c).unwrap();
        assert_eq!(tip.parents.len(), 1);
        assert!(dir.path().join("feat.txt").exists());
    }

    #[test]
    fn no_ff_creates_merge_commit() {
        let (_dir, repo, a, _b, c) = fixture();
        branch_create(&repo, "behind", Some(&a.to_hex())).unwrap();
        checkout(&repo, "behind", false).unwrap();

        let result = merge(
            &repo,
            "feat",
            &MergeCommandOptions {
                no_ff: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(result.status, MergeStatus::Merged);
        let merge_commit = repo
            .store()
            .commits()
            .load(&result.new_head.unwrap())
            .unwrap();
        assert_eq!(merge_commit.parents, vec![a, c]);
    }

    #[test]
    fn diverged_branches_merge_cleanly() {
        let (dir, repo, _a, b, c) = fixture();
        checkout(&repo, "main", false).unwrap();

        let result = merge(&repo, "feat", &MergeCommandOptions::default()).unwrap();
        assert_eq!(result.status, MergeStatus::Merged);

        let merge_commit = repo
            .store()
            .commits()
            .load(&result.new_head.unwrap())
            .unwrap();
        assert_eq!(merge_commit.parents, vec![b, c]);
        assert!(dir.path().join("main.txt").exists());
        assert!(dir.path().join("feat.txt").exists());
    }

    #[test]
    fn already_merged_is_up_to_date() {
        let (_dir, repo, _a, _b, _c) = fixture();
        checkout(&repo, "main", false).unwrap();
        merge(&repo, "feat", &MergeCommandOptions::default()).unwrap();

        let again = merge(&repo, "feat", &MergeCommandOptions::default()).unwrap();
        assert_eq!(again.status, MergeStatus::UpToDate);
    }

    #[test]
    fn conflicting_merge_stops_with_merge_head() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init(dir.path()).unwrap();
        quick_commit(&repo, "f.txt", b"A\nB\nC\n", "base");
        branch_create(&repo, "feat", None).unwrap();
        let ours = quick_commit(&repo, "f.txt", b"A\nX\nC\n", "ours");
        checkout(&repo, "feat", false).unwrap();
        let theirs = quick_commit(&repo, "f.txt", b"A\nY\nC\n", "theirs");
        checkout(&repo, "main", false).unwrap();

        let result = merge(&repo, "feat", &MergeCommandOptions::default()).unwrap();
        assert_eq!(result.status, MergeStatus::Conflicts);
        assert_eq!(result.conflicts, vec![BString::from("f.txt")]);
        assert_eq!(repo.state_ref("MERGE_HEAD").unwrap(), Some(theirs));
        assert_eq!(repo.state_ref("ORIG_HEAD").unwrap(), Some(ours));

        // Worktree holds markers; index holds stages 1-3.
        let text = std::fs::read_to_string(dir.path().join("f.txt")).unwrap();
        assert!(text.contains("<<<<<<<"));
        assert!(repo.index().unwrap().has_conflicts());

        // Resolving and committing concludes the merge with two parents.
        write(&repo, "f.txt", b"A\nZ\nC\n");
        add(&repo, &["f.txt"]).unwrap();
        let concluded =
            commit_cmd(&repo, CommitOptions::with_default_author("merged")).unwrap();
        assert_eq!(concluded.merged_parent, Some(theirs));
        assert_eq!(repo.state_ref("MERGE_HEAD").unwrap(), None);
        let stored = repo.store().commits().load(&concluded.oid).unwrap();
        assert_eq!(stored.parents, vec![ours, theirs]);
    }

    #[test]
    fn unrelated_histories_fail_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init(dir.path()).unwrap();
        quick_commit(&repo, "a.txt", b"a\n", "rooted");

        // A second, parentless line of history.
        let orphan_tree = repo.index().unwrap().write_tree(repo.store()).unwrap();
        let orphan = repo
            .store()
            .commits()
            .store(&Commit {
                tree: orphan_tree,
                parents: vec![],
                author: Signature {
                    name: BString::from("O"),
                    email: BString::from("o@x"),
                    date: vgit_utils::GitDate::new(1, 0),
                },
                committer: Signature {
                    name: BString::from("O"),
                    email: BString::from("o@x"),
                    date: vgit_utils::GitDate::new(1, 0),
                },
                encoding: None,
                gpgsig: None,
                message: BString::from("island\n"),
            })
            .unwrap();

        let result = merge(
            &repo,
            &orphan.to_hex(),
            &MergeCommandOptions::default(),
        )
        .unwrap();
        assert_eq!(result.status, MergeStatus::Failed);
    }
}
