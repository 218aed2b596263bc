//! Index file serialization (v2).

use std::io::Write;
use std::path::Path;

use vgit_hash::{Hasher, ObjectId};
use vgit_utils::LockFile;

use crate::read::{ENTRY_FIXED_LEN, SIGNATURE, VERSION};
use crate::{Index, IndexError};

/// Serialize the index to v2 bytes (entries, no extensions, trailer).
pub(crate) fn serialize(index: &Index) -> Result<Vec<u8>, IndexError> {
    let mut out = Vec::new();
    out.extend_from_slice(SIGNATURE);
    out.extend_from_slice(&VERSION.to_be_bytes());
    out.extend_from_slice(&(index.len() as u32).to_be_bytes());

    for entry in index.entries() {
        let start = out.len();
        for word in [
            entry.stat.ctime_secs,
            entry.stat.ctime_nsecs,
            entry.stat.mtime_secs,
            entry.stat.mtime_nsecs,
            entry.stat.dev,
            entry.stat.ino,
            entry.mode.raw(),
            entry.stat.uid,
            entry.stat.gid,
            entry.stat.size,
        ] {
            out.extend_from_slice(&word.to_be_bytes());
        }
        out.extend_from_slice(entry.oid.as_bytes());

        let name_len = entry.path.len().min(0x0FFF) as u16;
        let mut flags_word = name_len;
        flags_word |= (entry.stage.bits() as u16) << 12;
        if entry.flags.assume_valid {
            flags_word |= 0x8000;
        }
        out.extend_from_slice(&flags_word.to_be_bytes());

        out.extend_from_slice(&entry.path);
        // NUL terminator plus padding to an 8-byte entry boundary.
        let entry_len = (ENTRY_FIXED_LEN + entry.path.len() + 8) & !7;
        let written = out.len() - start;
        out.resize(start + entry_len.max(written + 1), 0);
    }

    let checksum = Hasher::digest(&out)?;
    out.extend_from_slice(checksum.as_bytes());
    Ok(out)
}

/// Write through the index lockfile; returns the trailer checksum.
pub(crate) fn write_to(index: &Index, path: &Path) -> Result<ObjectId, IndexError> {
    let bytes = serialize(index)?;
    let checksum = ObjectId::from_bytes(&bytes[bytes.len() - ObjectId::RAW_LEN..])
        .expect("serialize appends a checksum");

    let mut lock = LockFile::acquire(path)?;
    lock.write_all(&bytes)?;
    lock.commit()?;
    Ok(checksum)
}

/// The trailer checksum currently on disk, if the file exists.
pub(crate) fn on_disk_checksum(path: &Path) -> Result<Option<ObjectId>, IndexError> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if data.len() < ObjectId::RAW_LEN {
        return Err(IndexError::InvalidHeader("file too short".into()));
    }
    Ok(Some(
        ObjectId::from_bytes(&data[data.len() - ObjectId::RAW_LEN..])
            .expect("slice is exactly 20 bytes"),
    ))
}
