//! Pack consolidation: merge many small packs into one.
//!
//! Every commit-time quick pack adds a file to `objects/pack`; left
//! alone, reads degrade into a scan over dozens of indexes. The
//! consolidator unions the objects of small packs into one new pack,
//! writing the replacement fully before deleting any victim. Delta
//! entries are materialized as full objects on the way through; a later
//! deltify pass re-compresses.

use std::path::{Path, PathBuf};

use vgit_hash::ObjectId;
use vgit_object::ObjectType;

use crate::pack::PackFile;
use crate::write::{PackHandle, PackWriter};
use crate::PackError;

/// Thresholds controlling when consolidation runs.
#[derive(Debug, Clone, Copy)]
pub struct ConsolidateConfig {
    /// Packs at or below this size are "small" and eligible for merging.
    pub small_pack_threshold: u64,
    /// Consolidate when the directory holds more packs than this.
    pub max_packs: usize,
    /// Consolidate when more small packs than this have accumulated.
    pub max_small_packs: usize,
}

impl Default for ConsolidateConfig {
    fn default() -> Self {
        Self {
            small_pack_threshold: 1024 * 1024,
            max_packs: 50,
            max_small_packs: 10,
        }
    }
}

/// What a consolidation run did.
#[derive(Debug)]
pub struct ConsolidateOutcome {
    pub new_pack: PackHandle,
    /// Deleted `.pack` paths (each had its `.idx` removed too).
    pub removed: Vec<PathBuf>,
    pub object_count: u32,
}

/// Merges small packs in one pack directory.
pub struct Consolidator {
    pack_dir: PathBuf,
    config: ConsolidateConfig,
}

impl Consolidator {
    pub fn new(pack_dir: impl AsRef<Path>) -> Self {
        Self {
            pack_dir: pack_dir.as_ref().to_path_buf(),
            config: ConsolidateConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ConsolidateConfig) -> Self {
        self.config = config;
        self
    }

    /// All `.pack` files with their sizes.
    pub fn scan(&self) -> Result<Vec<(PathBuf, u64)>, PackError> {
        let mut packs = Vec::new();
        if !self.pack_dir.is_dir() {
            return Ok(packs);
        }
        for entry in std::fs::read_dir(&self.pack_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "pack") {
                packs.push((path, entry.metadata()?.len()));
            }
        }
        packs.sort();
        Ok(packs)
    }

    /// Whether the policy triggers: too many packs overall, or too many
    /// small ones.
    pub fn should_consolidate(&self) -> Result<bool, PackError> {
        let packs = self.scan()?;
        let small = packs
            .iter()
            .filter(|(_, size)| *size <= self.config.small_pack_threshold)
            .count();
        Ok(packs.len() > self.config.max_packs || small > self.config.max_small_packs)
    }

    /// Merge all small packs into one new pack.
    ///
    /// `resolver` supplies REF_DELTA bases living outside the victim set
    /// (loose objects, surviving packs). Returns `None` when fewer than
    /// two small packs exist. No victim is deleted until the new pack and
    /// index are fully on disk.
    pub fn consolidate(
        &self,
        resolver: &dyn Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
    ) -> Result<Option<ConsolidateOutcome>, PackError> {
        let victims: Vec<PathBuf> = self
            .scan()?
            .into_iter()
            .filter(|(_, size)| *size <= self.config.small_pack_threshold)
            .map(|(path, _)| path)
            .collect();
        if victims.len() < 2 {
            return Ok(None);
        }

        let opened: Vec<PackFile> = victims
            .iter()
            .map(PackFile::open)
            .collect::<Result<_, _>>()?;

        // A REF_DELTA base may live in a sibling victim rather than
        // outside the set; try the siblings before the caller's resolver.
        let union_resolver = |oid: &ObjectId| -> Option<(ObjectType, Vec<u8>)> {
            for pack in &opened {
                if let Ok(Some(obj)) = pack.read_with(oid, &|o: &ObjectId| resolver(o)) {
                    return Some((obj.obj_type, obj.data));
                }
            }
            resolver(oid)
        };

        let mut writer = PackWriter::create(&self.pack_dir)?;
        for pack in &opened {
            for (oid, offset) in pack.index().iter() {
                if writer.contains(&oid) {
                    continue;
                }
                // Materialize through any delta chain; the new pack holds
                // full objects only, so no cross-pack references survive.
                let obj = pack.read_at_offset(offset, &union_resolver)?;
                writer.add_object(obj.obj_type, &obj.data)?;
            }
        }
        let object_count = writer.num_objects();
        let new_pack = writer.finish()?;

        // Replacement is on disk; now the victims can go. The new pack
        // may collide with a victim name if contents match exactly.
        let mut removed = Vec::new();
        for path in victims {
            if path == new_pack.pack_path {
                continue;
            }
            std::fs::remove_file(&path)?;
            let idx = path.with_extension("idx");
            if idx.exists() {
                std::fs::remove_file(&idx)?;
            }
            removed.push(path);
        }

        Ok(Some(ConsolidateOutcome {
            new_pack,
            removed,
            object_count,
        }))
    }
}
