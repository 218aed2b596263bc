//! Rename detection: pair deleted and added files by content.

use rayon::prelude::*;
use vgit_odb::ObjectStore;

use crate::similarity::{similarity_score, SimilarityIndex};
use crate::{ChangeKind, DiffError, TreeDiff};

/// Default similarity threshold (percent) for a rename match.
pub const DEFAULT_RENAME_THRESHOLD: u8 = 50;

/// Rewrite matching delete/add pairs in `diff` into renames.
///
/// Exact OID matches pair first at similarity 100. Remaining pairs are
/// scored by content fingerprint; the best-scoring addition at or above
/// `threshold` wins for each deletion. Binary blobs never match.
pub fn detect_renames(
    store: &ObjectStore,
    diff: &mut TreeDiff,
    threshold: u8,
) -> Result<(), DiffError> {
    let deleted: Vec<usize> = indices_of(diff, ChangeKind::Deleted);
    let added: Vec<usize> = indices_of(diff, ChangeKind::Added);
    if deleted.is_empty() || added.is_empty() {
        return Ok(());
    }

    let mut taken_deleted = vec![false; deleted.len()];
    let mut taken_added = vec![false; added.len()];
    let mut pairs: Vec<(usize, usize, u8)> = Vec::new();

    // Pass 1: exact content matches (same OID).
    for (di, &del_idx) in deleted.iter().enumerate() {
        let del_oid = diff.changes[del_idx].old_oid;
        for (ai, &add_idx) in added.iter().enumerate() {
            if taken_added[ai] {
                continue;
            }
            if del_oid.is_some() && del_oid == diff.changes[add_idx].new_oid {
                taken_deleted[di] = true;
                taken_added[ai] = true;
                pairs.push((del_idx, add_idx, 100));
                break;
            }
        }
    }

    // Pass 2: fuzzy matches for what remains.
    if threshold < 100 {
        // Load and fingerprint each remaining addition once.
        let open_added: Vec<(usize, Vec<u8>)> = added
            .iter()
            .enumerate()
            .filter(|(ai, _)| !taken_added[*ai])
            .filter_map(|(ai, &add_idx)| {
                let oid = diff.changes[add_idx].new_oid?;
                store.blobs().load(&oid).ok().map(|data| (ai, data))
            })
            .collect();
        let added_indexes: Vec<(usize, SimilarityIndex)> = open_added
            .par_iter()
            .map(|(ai, data)| (*ai, SimilarityIndex::from_content(data)))
            .collect();

        for (di, &del_idx) in deleted.iter().enumerate() {
            if taken_deleted[di] {
                continue;
            }
            let Some(del_oid) = diff.changes[del_idx].old_oid else {
                continue;
            };
            let Ok(old_data) = store.blobs().load(&del_oid) else {
                continue;
            };
            if crate::similarity::is_binary(&old_data) {
                continue;
            }
            let old_index = SimilarityIndex::from_content(&old_data);

            let best = added_indexes
                .par_iter()
                .filter(|(ai, _)| !taken_added[*ai])
                .map(|(ai, index)| (*ai, old_index.score(index)))
                .filter(|&(_, score)| score >= threshold)
                .max_by_key(|&(_, score)| score);

            if let Some((ai, score)) = best {
                taken_deleted[di] = true;
                taken_added[ai] = true;
                pairs.push((del_idx, added[ai], score));
            }
        }
    }

    apply_pairs(diff, pairs);
    Ok(())
}

/// Convenience wrapper scoring two blobs directly (used by merge when it
/// already has both contents in hand).
pub fn blobs_similar(a: &[u8], b: &[u8], threshold: u8) -> Option<u8> {
    let score = similarity_score(a, b);
    (score >= threshold).then_some(score)
}

fn indices_of(diff: &TreeDiff, kind: ChangeKind) -> Vec<usize> {
    diff.changes
        .iter()
        .enumerate()
        .filter(|(_, c)| c.kind == kind)
        .map(|(i, _)| i)
        .collect()
}

/// Fold each (deleted, added) pair into one renamed entry.
fn apply_pairs(diff: &mut TreeDiff, pairs: Vec<(usize, usize, u8)>) {
    let mut consumed: Vec<usize> = Vec::with_capacity(pairs.len());
    for (del_idx, add_idx, score) in pairs {
        let old_path = diff.changes[del_idx].old_path.clone();
        let old_oid = diff.changes[del_idx].old_oid;
        let old_mode = diff.changes[del_idx].old_mode;

        let renamed = &mut diff.changes[add_idx];
        renamed.kind = ChangeKind::Renamed;
        renamed.old_path = old_path;
        renamed.old_oid = old_oid;
        renamed.old_mode = old_mode;
        renamed.similarity = Some(score);

        consumed.push(del_idx);
    }

    consumed.sort_unstable();
    for idx in consumed.into_iter().rev() {
        diff.changes.remove(idx);
    }
}
