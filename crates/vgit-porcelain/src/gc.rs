//! Garbage collection: quick-pack loose objects, prune the unreachable,
//! consolidate small packs.

use std::collections::HashSet;

use vgit_hash::ObjectId;
use vgit_object::ObjectType;
use vgit_pack::consolidate::{ConsolidateConfig, Consolidator};
use vgit_pack::delta::{compute_delta, plan_window_deltas, WindowConfig};
use vgit_pack::write::PackWriter;
use vgit_repository::Repository;
use vgit_revwalk::{CommitGraph, WalkOptions};

use crate::PorcelainError;

/// Options for [`gc`].
#[derive(Debug, Clone)]
pub struct GcOptions {
    /// Delete unreachable loose objects.
    pub prune: bool,
    /// Window-deltify tuning for the quick pack.
    pub window: WindowConfig,
    /// Consolidation thresholds.
    pub consolidate: ConsolidateConfig,
}

impl Default for GcOptions {
    fn default() -> Self {
        Self {
            prune: true,
            window: WindowConfig::default(),
            consolidate: ConsolidateConfig::default(),
        }
    }
}

/// What a gc run did.
#[derive(Debug, Clone, Default)]
pub struct GcResult {
    /// Reachable loose objects moved into the new pack.
    pub packed: usize,
    /// How many of those were stored as deltas.
    pub deltified: usize,
    /// Unreachable loose objects deleted.
    pub pruned: usize,
    /// Whether small packs were merged afterwards.
    pub consolidated: bool,
}

/// Run garbage collection.
///
/// Reachability roots are every ref plus the operation state refs; the
/// closure covers commits, trees, and blobs. Loose reachable objects are
/// packed (delta-compressed by the sliding-window pass), their loose
/// copies removed, unreachable loose objects pruned, and finally small
/// packs are merged when the thresholds say so.
pub fn gc(repo: &Repository, options: &GcOptions) -> Result<GcResult, PorcelainError> {
    let reachable = reachable_set(repo)?;
    let loose = repo.store().list_loose()?;

    let mut result = GcResult::default();

    // Partition the loose set.
    let mut pack_set: Vec<ObjectId> = Vec::new();
    let mut prune_set: Vec<ObjectId> = Vec::new();
    for oid in loose {
        if reachable.contains(&oid) {
            pack_set.push(oid);
        } else {
            prune_set.push(oid);
        }
    }

    if !pack_set.is_empty() {
        result.packed = pack_set.len();
        result.deltified = write_quick_pack(repo, &pack_set, options.window)?;
        repo.store().refresh_packs()?;
        for oid in &pack_set {
            repo.store().delete(oid)?;
        }
    }

    if options.prune {
        for oid in &prune_set {
            repo.store().delete(oid)?;
        }
        result.pruned = prune_set.len();
    }

    // Consolidate if the pack population crossed the thresholds.
    let pack_dir = repo.git_dir().join("objects/pack");
    let consolidator = Consolidator::new(&pack_dir).with_config(options.consolidate);
    if consolidator.should_consolidate()? {
        let store = repo.store();
        let resolver = |oid: &ObjectId| -> Option<(ObjectType, Vec<u8>)> {
            store.load(oid).ok()
        };
        if consolidator.consolidate(&resolver)?.is_some() {
            result.consolidated = true;
            repo.store().refresh_packs()?;
        }
    }

    Ok(result)
}

/// Everything reachable from refs and operation state refs.
fn reachable_set(repo: &Repository) -> Result<HashSet<ObjectId>, PorcelainError> {
    let mut roots: Vec<ObjectId> = Vec::new();
    for reference in repo.refs().list("refs")? {
        if let Some(oid) = reference.target_oid() {
            roots.push(oid);
        }
    }
    if let Some(head) = repo.head_oid()? {
        roots.push(head);
    }
    for marker in ["MERGE_HEAD", "ORIG_HEAD", "CHERRY_PICK_HEAD", "REVERT_HEAD", "REBASE_HEAD"] {
        if let Some(oid) = repo.state_ref(marker)? {
            roots.push(oid);
        }
    }

    let mut reachable = HashSet::new();
    let graph = CommitGraph::new(repo.store());

    for root in roots {
        let mut commit_roots = Vec::new();
        match repo.store().info(&root)?.obj_type {
            ObjectType::Commit => commit_roots.push(root),
            ObjectType::Tag => {
                reachable.insert(root);
                let tag = repo.store().tags().load(&root)?;
                match tag.target_type {
                    ObjectType::Commit => commit_roots.push(tag.object),
                    _ => collect_tree(repo, &tag.object, &mut reachable)?,
                }
            }
            ObjectType::Tree => collect_tree(repo, &root, &mut reachable)?,
            ObjectType::Blob => {
                reachable.insert(root);
            }
        }

        for step in graph.walk(&commit_roots, WalkOptions::default()) {
            let commit_oid = step?;
            if !reachable.insert(commit_oid) {
                continue;
            }
            let commit = repo.store().commits().load(&commit_oid)?;
            collect_tree(repo, &commit.tree, &mut reachable)?;
        }
    }

    Ok(reachable)
}

fn collect_tree(
    repo: &Repository,
    tree_oid: &ObjectId,
    reachable: &mut HashSet<ObjectId>,
) -> Result<(), PorcelainError> {
    if !reachable.insert(*tree_oid) {
        return Ok(());
    }
    let tree = repo.store().trees().load(tree_oid)?;
    for entry in tree.iter() {
        if entry.mode.is_dir() {
            collect_tree(repo, &entry.oid, reachable)?;
        } else if !entry.mode.is_gitlink() {
            reachable.insert(entry.oid);
        }
    }
    Ok(())
}

/// Pack the given objects, deltifying pairs chosen by the window pass.
/// Returns how many entries went in as deltas.
fn write_quick_pack(
    repo: &Repository,
    oids: &[ObjectId],
    window: WindowConfig,
) -> Result<usize, PorcelainError> {
    let store = repo.store();

    let mut metas: Vec<(ObjectId, ObjectType, u64)> = Vec::with_capacity(oids.len());
    for oid in oids {
        let info = store.info(oid)?;
        metas.push((*oid, info.obj_type, info.size as u64));
    }

    let pairs = plan_window_deltas(&metas, window);
    let mut delta_target: std::collections::HashMap<ObjectId, ObjectId> = pairs
        .into_iter()
        .map(|pair| (pair.target, pair.base))
        .collect();

    let mut writer = PackWriter::create(repo.git_dir().join("objects/pack"))?;
    let mut deltified = 0;

    // Bases (and unpaired objects) first, as full entries.
    for (oid, obj_type, _) in &metas {
        if delta_target.contains_key(oid) {
            continue;
        }
        let (_, content) = repo.read_object(oid)?;
        writer.add_object(*obj_type, &content)?;
    }

    // Then the planned delta targets.
    for (oid, _, _) in &metas {
        let Some(base_oid) = delta_target.remove(oid) else {
            continue;
        };
        let (_, base) = repo.read_object(&base_oid)?;
        let (obj_type, target) = repo.read_object(oid)?;

        let delta = compute_delta(&base, &target);
        if delta.len() < target.len() {
            writer.add_delta(&base_oid, *oid, &delta)?;
            deltified += 1;
        } else {
            writer.add_object(obj_type, &target)?;
        }
    }

    writer.finish()?;
    Ok(deltified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{add, commit, CommitOptions};
    use bstr::BString;
    use vgit_object::FileMode;
    use vgit_repository::init;

    fn quick_commit(repo: &Repository, path: &str, content: &[u8], msg: &str) {
        repo.worktree()
            .write_content(&BString::from(path), content, FileMode::Regular)
            .unwrap();
        add(repo, &[path]).unwrap();
        commit(repo, CommitOptions::with_default_author(msg)).unwrap();
    }

    #[test]
    fn gc_packs_reachable_loose_objects() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init(dir.path()).unwrap();
        quick_commit(&repo, "f.txt", &b"content line\n".repeat(30), "c1");
        quick_commit(&repo, "f.txt", &b"content line\n".repeat(31), "c2");

        let before = repo.store().list_loose().unwrap().len();
        assert!(before >= 6); // 2 commits, 2 trees, 2 blobs

        let result = gc(&repo, &GcOptions::default()).unwrap();
        assert_eq!(result.packed, before);
        assert!(result.deltified >= 1, "near-identical blobs should pair");

        // Loose copies are gone; everything still reads.
        assert!(repo.store().list_loose().unwrap().is_empty());
        let head = repo.head_oid().unwrap().unwrap();
        let head_commit = repo.store().commits().load(&head).unwrap();
        assert_eq!(head_commit.message, "c2");
    }

    #[test]
    fn gc_prunes_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init(dir.path()).unwrap();
        quick_commit(&repo, "f.txt", b"kept\n", "c1");

        // An orphan blob nothing references.
        let orphan = repo.store().blobs().store(b"orphaned bytes\n").unwrap();

        let result = gc(&repo, &GcOptions::default()).unwrap();
        assert_eq!(result.pruned, 1);
        assert!(!repo.store().has(&orphan).unwrap());
    }

    #[test]
    fn gc_without_prune_keeps_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init(dir.path()).unwrap();
        quick_commit(&repo, "f.txt", b"kept\n", "c1");
        let orphan = repo.store().blobs().store(b"orphaned bytes\n").unwrap();

        let options = GcOptions {
            prune: false,
            ..Default::default()
        };
        let result = gc(&repo, &options).unwrap();
        assert_eq!(result.pruned, 0);
        assert!(repo.store().has(&orphan).unwrap());
    }

    #[test]
    fn repeated_gc_consolidates_small_packs() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init(dir.path()).unwrap();

        // Each gc leaves one new small pack behind.
        let aggressive = GcOptions {
            consolidate: ConsolidateConfig {
                small_pack_threshold: 1024 * 1024,
                max_packs: 50,
                max_small_packs: 2,
            },
            ..Default::default()
        };
        for i in 0..4 {
            quick_commit(
                &repo,
                "f.txt",
                format!("round {i}\n").as_bytes(),
                &format!("c{i}"),
            );
            gc(&repo, &aggressive).unwrap();
        }

        let pack_dir = repo.git_dir().join("objects/pack");
        let packs = Consolidator::new(&pack_dir).scan().unwrap();
        assert!(
            packs.len() <= 3,
            "consolidation should bound pack growth, found {}",
            packs.len()
        );

        // History remains fully readable after repacking.
        let head = repo.head_oid().unwrap().unwrap();
        let graph = CommitGraph::new(repo.store());
        let count = graph
            .walk(&[head], WalkOptions::default())
            .count();
        assert_eq!(count, 4);
    }
}
