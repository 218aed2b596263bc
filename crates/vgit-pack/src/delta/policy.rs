//! Deltification decisions: which candidate, if any, becomes the base.

use vgit_hash::ObjectId;
use vgit_object::ObjectType;

use super::candidates::{CandidateFinder, DeltaCandidate, DeltaTarget};
use super::compute::compute_delta;

/// Limits and thresholds governing delta selection.
#[derive(Debug, Clone, Copy)]
pub struct DeltaPolicy {
    /// A candidate already this deep in a chain is rejected.
    pub max_chain_depth: usize,
    /// Targets larger than this are stored whole.
    pub max_target_size: u64,
    /// Minimum estimated savings ratio for a candidate to be worth
    /// computing, and minimum actual ratio for a delta to be kept.
    pub min_ratio: f64,
    /// How many candidates to try per target.
    pub max_candidates: usize,
}

impl Default for DeltaPolicy {
    fn default() -> Self {
        Self {
            max_chain_depth: 50,
            max_target_size: 16 * 1024 * 1024,
            min_ratio: 0.5,
            max_candidates: 10,
        }
    }
}

/// Context the policy needs about existing delta chains.
pub trait ChainInfo {
    /// Current chain depth of `oid` (0 for a full object).
    fn depth(&self, oid: &ObjectId) -> usize;
    /// Whether `oid`'s chain passes through `target` (would form a cycle).
    fn chain_contains(&self, oid: &ObjectId, target: &ObjectId) -> bool;
}

/// Chain info for a store with no deltas yet.
pub struct NoChains;

impl ChainInfo for NoChains {
    fn depth(&self, _oid: &ObjectId) -> usize {
        0
    }
    fn chain_contains(&self, _oid: &ObjectId, _target: &ObjectId) -> bool {
        false
    }
}

impl DeltaPolicy {
    /// Whether `candidate` may serve as a base for `target`.
    pub fn admits(
        &self,
        target: &DeltaTarget,
        candidate: &DeltaCandidate,
        chains: &dyn ChainInfo,
    ) -> bool {
        target.obj_type == candidate.obj_type
            && chains.depth(&candidate.oid) < self.max_chain_depth
            && target.size <= self.max_target_size
            && candidate.similarity >= self.min_ratio
            && !chains.chain_contains(&candidate.oid, &target.oid)
    }

    /// Cheap pre-check before paying for a delta computation: wildly
    /// mismatched sizes can never reach the savings threshold.
    pub fn worth_trying(&self, base_size: u64, target_size: u64) -> bool {
        if target_size == 0 {
            return false;
        }
        // A delta can at best cost ~0 for shared content; if the base is
        // much smaller than the target, most of the target must be
        // inserted literally and the ratio cannot be met.
        let max_copyable = base_size.min(target_size) as f64;
        max_copyable / target_size as f64 >= self.min_ratio
    }
}

/// The winning delta for a target.
#[derive(Debug, Clone)]
pub struct BestDelta {
    pub base: ObjectId,
    pub delta: Vec<u8>,
    /// Bytes saved versus storing the target whole.
    pub savings: u64,
}

/// Enumerate candidates, compute deltas for the plausible ones, and keep
/// the best. Returns `None` when no candidate qualifies — that is not an
/// error, just "store it whole".
pub fn find_best_delta(
    target: &DeltaTarget,
    target_data: &[u8],
    finder: &dyn CandidateFinder,
    policy: &DeltaPolicy,
    chains: &dyn ChainInfo,
    mut load_base: impl FnMut(&ObjectId) -> Option<Vec<u8>>,
) -> Option<BestDelta> {
    let mut best: Option<BestDelta> = None;

    for candidate in finder
        .candidates(target)
        .into_iter()
        .filter(|c| policy.admits(target, c, chains))
        .take(policy.max_candidates)
    {
        if !policy.worth_trying(candidate.size, target.size) {
            continue;
        }
        let Some(base_data) = load_base(&candidate.oid) else {
            continue;
        };

        let delta = compute_delta(&base_data, target_data);
        if delta.len() >= target_data.len() {
            continue;
        }
        let ratio = 1.0 - delta.len() as f64 / target_data.len() as f64;
        if ratio < policy.min_ratio {
            continue;
        }

        let savings = (target_data.len() - delta.len()) as u64;
        if best.as_ref().map_or(true, |b| savings > b.savings) {
            best = Some(BestDelta {
                base: candidate.oid,
                delta,
                savings,
            });
        }
    }

    best
}

/// Tuning for the sliding-window deltify pass.
#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    /// How many preceding same-type objects to consider.
    pub window: usize,
    /// Minimum size-similarity estimate to keep a pair.
    pub min_savings: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window: 10,
            min_savings: 0.5,
        }
    }
}

/// A planned base/target pairing from the window pass.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaPair {
    pub base: ObjectId,
    pub target: ObjectId,
    pub estimated_savings: f64,
}

/// Plan deltification pairs for a batch of objects (used by gc and the
/// quick pack after commit).
///
/// Objects are sorted by `(type, size ascending)` so near-sized objects
/// of the same type become neighbors; each object is then paired with
/// the nearest-size unpicked neighbor among the previous `window`
/// entries.
pub fn plan_window_deltas(
    objects: &[(ObjectId, ObjectType, u64)],
    config: WindowConfig,
) -> Vec<DeltaPair> {
    let mut sorted: Vec<_> = objects.to_vec();
    sorted.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)).then(a.0.cmp(&b.0)));

    let mut picked = vec![false; sorted.len()];
    let mut pairs = Vec::new();

    for i in 0..sorted.len() {
        if picked[i] {
            continue;
        }
        let (target_oid, target_type, target_size) = sorted[i];
        let window_start = i.saturating_sub(config.window);

        let best = (window_start..i)
            .filter(|&j| !picked[j] && sorted[j].1 == target_type)
            .map(|j| {
                let base_size = sorted[j].2;
                let max = base_size.max(target_size).max(1) as f64;
                let estimate = base_size.min(target_size) as f64 / max;
                (j, estimate)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((j, estimate)) = best {
            if estimate >= config.min_savings {
                // Both ends leave the pool: pairs stay disjoint, chains
                // stay depth one until a later pass re-deltifies.
                picked[j] = true;
                picked[i] = true;
                pairs.push(DeltaPair {
                    base: sorted[j].0,
                    target: target_oid,
                    estimated_savings: estimate,
                });
            }
        }
    }

    pairs
}
