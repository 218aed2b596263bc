//! Candidate base selection for deltification.
//!
//! A [`CandidateFinder`] answers one question: given a target object,
//! which stored objects might make good delta bases? Finders only rank;
//! the decision policy (`policy` module) filters and the best-delta
//! search does the actual byte comparison.

use std::collections::HashSet;

use bstr::BString;
use vgit_hash::ObjectId;
use vgit_object::ObjectType;

/// Why a candidate was proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateReason {
    /// Previous version at the same working-copy path.
    PathHistory,
    /// A base of comparable size.
    SimilarSize,
    /// Same-path entry in a parent commit's tree.
    CommitTree,
}

/// A proposed delta base.
#[derive(Debug, Clone)]
pub struct DeltaCandidate {
    pub oid: ObjectId,
    pub obj_type: ObjectType,
    pub size: u64,
    /// Estimated similarity in [0, 1]; drives the policy's savings estimate.
    pub similarity: f64,
    pub reason: CandidateReason,
}

/// The object we want to deltify.
#[derive(Debug, Clone)]
pub struct DeltaTarget {
    pub oid: ObjectId,
    pub obj_type: ObjectType,
    pub size: u64,
    /// Working-copy path, when the caller knows it.
    pub path: Option<BString>,
}

/// Yields candidate bases for a target.
pub trait CandidateFinder: Send + Sync {
    fn candidates(&self, target: &DeltaTarget) -> Vec<DeltaCandidate>;
}

/// Previous versions seen at each working-copy path. The strongest
/// signal available: same path, adjacent history.
#[derive(Default)]
pub struct PathHistoryFinder {
    history: std::collections::HashMap<BString, Vec<(ObjectId, ObjectType, u64)>>,
}

const PATH_HISTORY_SIMILARITY: f64 = 0.9;

impl PathHistoryFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `path` held `oid` at some point. Most recent last.
    pub fn record(&mut self, path: BString, oid: ObjectId, obj_type: ObjectType, size: u64) {
        self.history
            .entry(path)
            .or_default()
            .push((oid, obj_type, size));
    }
}

impl CandidateFinder for PathHistoryFinder {
    fn candidates(&self, target: &DeltaTarget) -> Vec<DeltaCandidate> {
        let Some(path) = target.path.as_ref() else {
            return Vec::new();
        };
        let Some(versions) = self.history.get(path) else {
            return Vec::new();
        };
        // Most recent versions first.
        versions
            .iter()
            .rev()
            .filter(|(oid, _, _)| *oid != target.oid)
            .map(|&(oid, obj_type, size)| DeltaCandidate {
                oid,
                obj_type,
                size,
                similarity: PATH_HISTORY_SIMILARITY,
                reason: CandidateReason::PathHistory,
            })
            .collect()
    }
}

/// Bases whose size is within a tolerance band of the target's.
pub struct SimilarSizeFinder {
    pool: Vec<(ObjectId, ObjectType, u64)>,
    /// Candidate sizes must lie in `[size / tolerance, size * tolerance]`.
    tolerance: f64,
}

impl SimilarSizeFinder {
    pub fn new(pool: Vec<(ObjectId, ObjectType, u64)>) -> Self {
        Self {
            pool,
            tolerance: 2.0,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance.max(1.0);
        self
    }
}

impl CandidateFinder for SimilarSizeFinder {
    fn candidates(&self, target: &DeltaTarget) -> Vec<DeltaCandidate> {
        let size = target.size as f64;
        let lo = size / self.tolerance;
        let hi = size * self.tolerance;

        let mut found: Vec<DeltaCandidate> = self
            .pool
            .iter()
            .filter(|(oid, obj_type, cand_size)| {
                *oid != target.oid
                    && *obj_type == target.obj_type
                    && (*cand_size as f64) >= lo
                    && (*cand_size as f64) <= hi
            })
            .map(|&(oid, obj_type, cand_size)| {
                let max = (cand_size.max(target.size)) as f64;
                let diff = cand_size.abs_diff(target.size) as f64;
                DeltaCandidate {
                    oid,
                    obj_type,
                    size: cand_size,
                    similarity: if max == 0.0 { 1.0 } else { 1.0 - diff / max },
                    reason: CandidateReason::SimilarSize,
                }
            })
            .collect();
        // Closest sizes first.
        found.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        found
    }
}

/// Same-path entries from parent commits' trees.
#[derive(Default)]
pub struct CommitTreeFinder {
    entries: std::collections::HashMap<BString, (ObjectId, ObjectType, u64)>,
}

const COMMIT_TREE_SIMILARITY: f64 = 0.8;

impl CommitTreeFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a `path -> blob` mapping from a parent tree.
    pub fn record(&mut self, path: BString, oid: ObjectId, obj_type: ObjectType, size: u64) {
        self.entries.insert(path, (oid, obj_type, size));
    }
}

impl CandidateFinder for CommitTreeFinder {
    fn candidates(&self, target: &DeltaTarget) -> Vec<DeltaCandidate> {
        let Some(path) = target.path.as_ref() else {
            return Vec::new();
        };
        match self.entries.get(path) {
            Some(&(oid, obj_type, size)) if oid != target.oid => vec![DeltaCandidate {
                oid,
                obj_type,
                size,
                similarity: COMMIT_TREE_SIMILARITY,
                reason: CandidateReason::CommitTree,
            }],
            _ => Vec::new(),
        }
    }
}

/// Ordered union of finders, de-duplicated by OID (first proposal wins).
#[derive(Default)]
pub struct CompositeFinder {
    finders: Vec<Box<dyn CandidateFinder>>,
}

impl CompositeFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, finder: Box<dyn CandidateFinder>) {
        self.finders.push(finder);
    }
}

impl CandidateFinder for CompositeFinder {
    fn candidates(&self, target: &DeltaTarget) -> Vec<DeltaCandidate> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for finder in &self.finders {
            for candidate in finder.candidates(target) {
                if seen.insert(candidate.oid) {
                    out.push(candidate);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        ObjectId(bytes)
    }

    fn target(size: u64, path: Option<&str>) -> DeltaTarget {
        DeltaTarget {
            oid: oid(0xff),
            obj_type: ObjectType::Blob,
            size,
            path: path.map(BString::from),
        }
    }

    #[test]
    fn path_history_most_recent_first() {
        let mut finder = PathHistoryFinder::new();
        finder.record("src/a.rs".into(), oid(1), ObjectType::Blob, 100);
        finder.record("src/a.rs".into(), oid(2), ObjectType::Blob, 110);

        let found = finder.candidates(&target(120, Some("src/a.rs")));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].oid, oid(2));
        assert_eq!(found[0].similarity, 0.9);
        assert_eq!(found[0].reason, CandidateReason::PathHistory);
    }

    #[test]
    fn path_history_needs_a_path() {
        let mut finder = PathHistoryFinder::new();
        finder.record("x".into(), oid(1), ObjectType::Blob, 10);
        assert!(finder.candidates(&target(10, None)).is_empty());
    }

    #[test]
    fn similar_size_band_and_ranking() {
        let finder = SimilarSizeFinder::new(vec![
            (oid(1), ObjectType::Blob, 100),
            (oid(2), ObjectType::Blob, 95),
            (oid(3), ObjectType::Blob, 500), // out of band for target 100
            (oid(4), ObjectType::Tree, 100), // wrong type
        ]);

        let found = finder.candidates(&target(100, None));
        assert_eq!(found.len(), 2);
        // Exact size match ranks first.
        assert_eq!(found[0].oid, oid(1));
        assert_eq!(found[0].similarity, 1.0);
        assert!(found[1].similarity < 1.0);
    }

    #[test]
    fn commit_tree_same_path_only() {
        let mut finder = CommitTreeFinder::new();
        finder.record("README".into(), oid(7), ObjectType::Blob, 40);

        assert_eq!(finder.candidates(&target(42, Some("README"))).len(), 1);
        assert!(finder.candidates(&target(42, Some("other"))).is_empty());
    }

    #[test]
    fn composite_dedupes_by_oid_in_order() {
        let mut path_finder = PathHistoryFinder::new();
        path_finder.record("p".into(), oid(1), ObjectType::Blob, 50);

        let size_finder =
            SimilarSizeFinder::new(vec![(oid(1), ObjectType::Blob, 50), (oid(2), ObjectType::Blob, 60)]);

        let mut composite = CompositeFinder::new();
        composite.push(Box::new(path_finder));
        composite.push(Box::new(size_finder));

        let found = composite.candidates(&target(55, Some("p")));
        assert_eq!(found.len(), 2);
        // oid(1) keeps its PathHistory attribution (first finder wins).
        assert_eq!(found[0].oid, oid(1));
        assert_eq!(found[0].reason, CandidateReason::PathHistory);
        assert_eq!(found[1].oid, oid(2));
    }

    #[test]
    fn target_itself_never_proposed() {
        let finder = SimilarSizeFinder::new(vec![(oid(0xff), ObjectType::Blob, 100)]);
        assert!(finder.candidates(&target(100, None)).is_empty());
    }
}
