//! Index entry types.

use bstr::BString;
use vgit_hash::ObjectId;
use vgit_object::FileMode;

use crate::Stage;

/// A single staged path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Repo-relative path, `/`-separated.
    pub path: BString,
    pub oid: ObjectId,
    pub mode: FileMode,
    pub stage: Stage,
    /// Cached filesystem stat data for change detection.
    pub stat: StatData,
    pub flags: EntryFlags,
}

impl IndexEntry {
    /// An entry with no stat cache, as produced by tree reads and merges.
    pub fn from_oid(path: BString, mode: FileMode, oid: ObjectId, stage: Stage) -> Self {
        Self {
            path,
            oid,
            mode,
            stage,
            stat: StatData::default(),
            flags: EntryFlags::default(),
        }
    }
}

/// Stat cache persisted per entry; all-zero when unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatData {
    pub ctime_secs: u32,
    pub ctime_nsecs: u32,
    pub mtime_secs: u32,
    pub mtime_nsecs: u32,
    pub dev: u32,
    pub ino: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
}

impl StatData {
    #[cfg(unix)]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            ctime_secs: meta.ctime() as u32,
            ctime_nsecs: meta.ctime_nsec() as u32,
            mtime_secs: meta.mtime() as u32,
            mtime_nsecs: meta.mtime_nsec() as u32,
            dev: meta.dev() as u32,
            ino: meta.ino() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.len() as u32,
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::time::UNIX_EPOCH;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .unwrap_or_default();
        Self {
            ctime_secs: mtime.as_secs() as u32,
            ctime_nsecs: mtime.subsec_nanos(),
            mtime_secs: mtime.as_secs() as u32,
            mtime_nsecs: mtime.subsec_nanos(),
            dev: 0,
            ino: 0,
            uid: 0,
            gid: 0,
            size: meta.len() as u32,
        }
    }

    /// Whether cached stat data still matches the file on disk. Any
    /// mismatch means the content must be re-hashed.
    pub fn matches(&self, meta: &std::fs::Metadata) -> bool {
        let current = Self::from_metadata(meta);
        if self.size != current.size {
            return false;
        }
        if self.mtime_secs != current.mtime_secs || self.mtime_nsecs != current.mtime_nsecs {
            return false;
        }
        // Inode/device comparisons only count when both sides know them.
        if self.ino != 0 && current.ino != 0 && self.ino != current.ino {
            return false;
        }
        if self.dev != 0 && current.dev != 0 && self.dev != current.dev {
            return false;
        }
        true
    }
}

/// The in-core bits of the 16-bit on-disk flags word (stage bits are
/// carried on the entry itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryFlags {
    /// CE_VALID: trust the stat cache unconditionally.
    pub assume_valid: bool,
}
