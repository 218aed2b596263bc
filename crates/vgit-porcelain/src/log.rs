//! History listing.

use bstr::BString;
use vgit_hash::ObjectId;
use vgit_repository::{resolve_revision, Repository};
use vgit_revwalk::{CommitGraph, WalkOptions};
use vgit_utils::Signature;

use crate::PorcelainError;

/// Options for [`log`].
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Start point (defaults to `HEAD`).
    pub from: Option<String>,
    pub limit: Option<usize>,
    pub first_parent_only: bool,
}

/// One history entry.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub oid: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub summary: BString,
    pub message: BString,
}

/// Walk history from a revision, newest first.
pub fn log(repo: &Repository, options: &LogOptions) -> Result<Vec<LogEntry>, PorcelainError> {
    let start = match &options.from {
        Some(rev) => resolve_revision(repo, rev)?,
        None => match repo.head_oid()? {
            Some(oid) => oid,
            None => return Ok(Vec::new()),
        },
    };

    let graph = CommitGraph::new(repo.store());
    let mut entries = Vec::new();
    let walk = graph.walk(
        &[start],
        WalkOptions {
            limit: options.limit,
            first_parent_only: options.first_parent_only,
            ..Default::default()
        },
    );
    for step in walk {
        let oid = step?;
        let commit = repo.store().commits().load(&oid)?;
        entries.push(LogEntry {
            oid,
            parents: commit.parents.clone(),
            author: commit.author.clone(),
            summary: commit.summary().into(),
            message: commit.message,
        });
    }
    Ok(entries)
}
