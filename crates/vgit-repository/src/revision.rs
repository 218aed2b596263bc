//! Revision expressions: `HEAD`, branch names, hex OIDs, `~N`, `^N`.

use vgit_hash::ObjectId;
use vgit_ref::RefName;
use vgit_revwalk::CommitGraph;

use crate::{RepoError, Repository};

/// Resolve a revision expression to a commit OID.
///
/// Supported: full ref names, short branch/tag names, `HEAD`, 40-hex
/// OIDs, and trailing `~N` (follow first parents N times) / `^N` (take
/// the Nth parent, 1-based), combinable as in `HEAD~2^2`.
pub fn resolve_revision(repo: &Repository, expr: &str) -> Result<ObjectId, RepoError> {
    let (base, steps) = split_steps(expr)?;
    let mut oid = resolve_base(repo, base)?;

    let graph = CommitGraph::new(repo.store());
    for step in steps {
        oid = apply_step(&graph, oid, step, expr)?;
    }
    Ok(oid)
}

#[derive(Debug, Clone, Copy)]
enum Step {
    /// `~N`: first parent, N times.
    FirstParents(usize),
    /// `^N`: the Nth parent (1-based); `^0` is the commit itself.
    NthParent(usize),
}

/// Split `expr` into the base name and its trailing steps.
fn split_steps(expr: &str) -> Result<(&str, Vec<Step>), RepoError> {
    let bad = || RepoError::InvalidRevision(expr.to_string());

    let cut = expr.find(['~', '^']).unwrap_or(expr.len());
    let (base, mut rest) = expr.split_at(cut);
    if base.is_empty() {
        return Err(bad());
    }

    let mut steps = Vec::new();
    while !rest.is_empty() {
        let op = rest.as_bytes()[0];
        rest = &rest[1..];
        let digits_len = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        let count: usize = if digits_len == 0 {
            1
        } else {
            rest[..digits_len].parse().map_err(|_| bad())?
        };
        rest = &rest[digits_len..];
        steps.push(match op {
            b'~' => Step::FirstParents(count),
            b'^' => Step::NthParent(count),
            _ => unreachable!("split on ~ and ^ only"),
        });
    }
    Ok((base, steps))
}

fn resolve_base(repo: &Repository, base: &str) -> Result<ObjectId, RepoError> {
    // Exact ref (HEAD, refs/heads/x, MERGE_HEAD, ...).
    if let Ok(name) = RefName::new(base) {
        if let Some(resolved) = repo.refs().resolve(&name)? {
            return Ok(resolved.oid);
        }
    }
    // Short branch, then tag.
    for long in [format!("refs/heads/{base}"), format!("refs/tags/{base}")] {
        if let Ok(name) = RefName::new(&long) {
            if let Some(resolved) = repo.refs().resolve(&name)? {
                // Tags may point at tag objects; peel to the commit.
                return peel_to_commit(repo, resolved.oid);
            }
        }
    }
    // Full hex OID.
    if base.len() == ObjectId::HEX_LEN {
        if let Ok(oid) = ObjectId::from_hex(base) {
            if repo.store().has(&oid)? {
                return Ok(oid);
            }
        }
    }
    Err(RepoError::InvalidRevision(base.to_string()))
}

/// Follow annotated tag objects down to the commit they name.
pub fn peel_to_commit(repo: &Repository, mut oid: ObjectId) -> Result<ObjectId, RepoError> {
    loop {
        match repo.store().info(&oid)?.obj_type {
            vgit_object::ObjectType::Tag => {
                oid = repo.store().tags().load(&oid)?.object;
            }
            _ => return Ok(oid),
        }
    }
}

fn apply_step(
    graph: &CommitGraph<'_>,
    oid: ObjectId,
    step: Step,
    expr: &str,
) -> Result<ObjectId, RepoError> {
    let bad = || RepoError::InvalidRevision(expr.to_string());
    match step {
        Step::FirstParents(n) => {
            let mut current = oid;
            for _ in 0..n {
                current = *graph.parents(&current)?.first().ok_or_else(bad)?;
            }
            Ok(current)
        }
        Step::NthParent(0) => Ok(oid),
        Step::NthParent(n) => graph
            .parents(&oid)?
            .get(n - 1)
            .copied()
            .ok_or_else(bad),
    }
}
