//! Index file parsing (v2).

use bstr::BString;
use vgit_hash::{Hasher, ObjectId};
use vgit_object::FileMode;

use crate::entry::{EntryFlags, IndexEntry, StatData};
use crate::{Index, IndexError, Stage};

pub(crate) const SIGNATURE: &[u8; 4] = b"DIRC";
pub(crate) const VERSION: u32 = 2;

/// Fixed bytes per entry before the path: 10 u32 stat words + 20-byte
/// OID + 2-byte flags.
pub(crate) const ENTRY_FIXED_LEN: usize = 40 + 20 + 2;

/// Parse an index file.
pub(crate) fn parse(data: &[u8]) -> Result<Index, IndexError> {
    if data.len() < 12 + ObjectId::RAW_LEN {
        return Err(IndexError::InvalidHeader("file too short".into()));
    }

    // Trailer first: everything else is covered by it.
    let content_end = data.len() - ObjectId::RAW_LEN;
    let recorded = ObjectId::from_bytes(&data[content_end..])
        .map_err(|_| IndexError::InvalidHeader("malformed checksum".into()))?;
    let actual = Hasher::digest(&data[..content_end])?;
    if recorded != actual {
        return Err(IndexError::ChecksumMismatch);
    }

    if &data[0..4] != SIGNATURE {
        return Err(IndexError::InvalidHeader(format!(
            "bad signature {:?}",
            &data[0..4]
        )));
    }
    let version = read_u32(&data[4..]);
    if version != VERSION {
        return Err(IndexError::UnsupportedVersion(version));
    }
    let entry_count = read_u32(&data[8..]) as usize;

    let mut index = Index::new();
    let mut cursor = 12;
    for _ in 0..entry_count {
        let (entry, next) = parse_entry(data, cursor, content_end)?;
        index.set(entry);
        cursor = next;
    }
    // Extensions (TREE cache etc.) may follow; they are tolerated and
    // dropped.

    index.on_disk_checksum = Some(recorded);
    Ok(index)
}

fn parse_entry(
    data: &[u8],
    start: usize,
    content_end: usize,
) -> Result<(IndexEntry, usize), IndexError> {
    if start + ENTRY_FIXED_LEN > content_end {
        return Err(IndexError::InvalidEntry {
            offset: start,
            reason: "truncated entry".into(),
        });
    }

    let stat = StatData {
        ctime_secs: read_u32(&data[start..]),
        ctime_nsecs: read_u32(&data[start + 4..]),
        mtime_secs: read_u32(&data[start + 8..]),
        mtime_nsecs: read_u32(&data[start + 12..]),
        dev: read_u32(&data[start + 16..]),
        ino: read_u32(&data[start + 20..]),
        uid: read_u32(&data[start + 28..]),
        gid: read_u32(&data[start + 32..]),
        size: read_u32(&data[start + 36..]),
    };
    let mode_raw = read_u32(&data[start + 24..]);
    let mode = FileMode::from_raw(mode_raw).ok_or_else(|| IndexError::InvalidEntry {
        offset: start,
        reason: format!("bad mode {mode_raw:o}"),
    })?;

    let oid = ObjectId::from_bytes(&data[start + 40..start + 60])
        .map_err(|_| IndexError::InvalidEntry {
            offset: start,
            reason: "bad OID".into(),
        })?;

    let flags_word = u16::from_be_bytes([data[start + 60], data[start + 61]]);
    let assume_valid = flags_word & 0x8000 != 0;
    if flags_word & 0x4000 != 0 {
        return Err(IndexError::InvalidEntry {
            offset: start,
            reason: "extended flags in a v2 index".into(),
        });
    }
    let stage = Stage::from_bits(((flags_word >> 12) & 0x3) as u8)
        .expect("two bits always decode");

    let path_start = start + ENTRY_FIXED_LEN;
    let nul = data[path_start..content_end]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| IndexError::InvalidEntry {
            offset: start,
            reason: "unterminated path".into(),
        })?;
    let path = BString::from(&data[path_start..path_start + nul]);

    // The recorded length is capped at 0xFFF for long paths.
    let recorded_len = (flags_word & 0x0FFF) as usize;
    if nul < 0x0FFF && recorded_len != nul {
        return Err(IndexError::InvalidEntry {
            offset: start,
            reason: format!("path length {nul} disagrees with flags {recorded_len}"),
        });
    }

    // Entries are NUL-padded so the next one starts on an 8-byte
    // boundary relative to the entry table.
    let entry_len = (ENTRY_FIXED_LEN + nul + 8) & !7;
    let next = start + entry_len;
    if next > content_end {
        return Err(IndexError::InvalidEntry {
            offset: start,
            reason: "entry padding past end".into(),
        });
    }

    Ok((
        IndexEntry {
            path,
            oid,
            mode,
            stage,
            stat,
            flags: EntryFlags { assume_valid },
        },
        next,
    ))
}

fn read_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes(data[..4].try_into().unwrap())
}
