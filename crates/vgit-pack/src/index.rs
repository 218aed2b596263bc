//! Pack index v2: reader and builder.
//!
//! ```text
//! Header:  \xff t O c | version (4 bytes, = 2)
//! Fanout:  256 x 4-byte BE cumulative counts
//! OIDs:    N x 20-byte sorted OIDs
//! CRC32:   N x 4-byte CRC of the packed entry bytes
//! Offsets: N x 4-byte offsets (MSB set => index into the 64-bit table)
//! 64-bit:  M x 8-byte offsets (packs > 2 GiB)
//! Trailer: 20-byte pack checksum | 20-byte index checksum
//! ```

use std::path::{Path, PathBuf};

use memmap2::Mmap;
use vgit_hash::{Hasher, ObjectId};

use crate::{PackError, IDX_SIGNATURE, IDX_VERSION};

/// Memory-mapped pack index providing OID -> offset lookup.
pub struct PackIndex {
    data: Mmap,
    num_objects: u32,
    oid_offset: usize,
    crc_offset: usize,
    offset32_offset: usize,
    offset64_offset: usize,
    idx_path: PathBuf,
}

const FANOUT_OFFSET: usize = 8;
const FANOUT_SIZE: usize = 256 * 4;

impl PackIndex {
    /// Open and validate an index file.
    pub fn open(idx_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let idx_path = idx_path.as_ref().to_path_buf();
        let file = std::fs::File::open(&idx_path)?;
        let data = unsafe { Mmap::map(&file)? };

        let hash_len = ObjectId::RAW_LEN;
        if data.len() < FANOUT_OFFSET + FANOUT_SIZE + 2 * hash_len {
            return Err(PackError::InvalidIndex("file too small".into()));
        }
        if data[0..4] != IDX_SIGNATURE {
            return Err(PackError::BadIndexMagic);
        }
        let version = read_u32(&data[4..]);
        if version != IDX_VERSION {
            return Err(PackError::BadIndexVersion(version));
        }

        let num_objects = read_u32(&data[FANOUT_OFFSET + 255 * 4..]);
        let n = num_objects as usize;

        let oid_offset = FANOUT_OFFSET + FANOUT_SIZE;
        let crc_offset = oid_offset + n * hash_len;
        let offset32_offset = crc_offset + n * 4;
        let offset64_offset = offset32_offset + n * 4;

        if data.len() < offset64_offset + 2 * hash_len {
            return Err(PackError::InvalidIndex(format!(
                "file too small for {n} objects"
            )));
        }

        // Fanout must be monotonically non-decreasing.
        let mut prev = 0u32;
        for i in 0..256 {
            let count = read_u32(&data[FANOUT_OFFSET + i * 4..]);
            if count < prev {
                return Err(PackError::InvalidIndex(format!(
                    "fanout not monotonic at byte {i}"
                )));
            }
            prev = count;
        }

        Ok(Self {
            data,
            num_objects,
            oid_offset,
            crc_offset,
            offset32_offset,
            offset64_offset,
            idx_path,
        })
    }

    /// Look up the pack offset for an OID.
    pub fn lookup(&self, oid: &ObjectId) -> Option<u64> {
        let (mut low, mut high) = self.fanout_range(oid.first_byte());
        let target = oid.as_bytes();

        while low < high {
            let mid = low + (high - low) / 2;
            match self.oid_bytes_at(mid).cmp(target) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Some(self.offset_at(mid as u32)),
            }
        }
        None
    }

    /// The OID at a sorted index position.
    pub fn oid_at(&self, index: u32) -> ObjectId {
        let start = self.oid_offset + index as usize * ObjectId::RAW_LEN;
        ObjectId::from_bytes(&self.data[start..start + ObjectId::RAW_LEN])
            .expect("index maps 20-byte OIDs")
    }

    /// The pack offset at a sorted index position.
    pub fn offset_at(&self, index: u32) -> u64 {
        let pos = self.offset32_offset + index as usize * 4;
        let val = read_u32(&self.data[pos..]);
        if val & 0x8000_0000 != 0 {
            let pos64 = self.offset64_offset + ((val & 0x7fff_ffff) as usize) * 8;
            u64::from_be_bytes(self.data[pos64..pos64 + 8].try_into().unwrap())
        } else {
            val as u64
        }
    }

    /// The recorded CRC32 at a sorted index position.
    pub fn crc32_at(&self, index: u32) -> u32 {
        read_u32(&self.data[self.crc_offset + index as usize * 4..])
    }

    /// Sorted position of an OID, if present.
    pub fn position_of(&self, oid: &ObjectId) -> Option<u32> {
        let (mut low, mut high) = self.fanout_range(oid.first_byte());
        let target = oid.as_bytes();
        while low < high {
            let mid = low + (high - low) / 2;
            match self.oid_bytes_at(mid).cmp(target) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Some(mid as u32),
            }
        }
        None
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    pub fn path(&self) -> &Path {
        &self.idx_path
    }

    /// Pack checksum recorded in the trailer.
    pub fn pack_checksum(&self) -> ObjectId {
        let start = self.data.len() - 2 * ObjectId::RAW_LEN;
        ObjectId::from_bytes(&self.data[start..start + ObjectId::RAW_LEN])
            .expect("trailer holds a 20-byte checksum")
    }

    /// Iterate `(oid, offset)` pairs in sorted OID order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, u64)> + '_ {
        (0..self.num_objects).map(|i| (self.oid_at(i), self.offset_at(i)))
    }

    fn fanout_range(&self, first_byte: u8) -> (usize, usize) {
        let end = read_u32(&self.data[FANOUT_OFFSET + first_byte as usize * 4..]) as usize;
        let start = if first_byte == 0 {
            0
        } else {
            read_u32(&self.data[FANOUT_OFFSET + (first_byte as usize - 1) * 4..]) as usize
        };
        (start, end)
    }

    fn oid_bytes_at(&self, index: usize) -> &[u8] {
        let start = self.oid_offset + index * ObjectId::RAW_LEN;
        &self.data[start..start + ObjectId::RAW_LEN]
    }
}

fn read_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes(data[..4].try_into().unwrap())
}

/// Serialize a v2 index for `entries` (`(oid, offset, crc32)`); sorts in
/// place by OID.
pub fn build_index(
    entries: &mut [(ObjectId, u64, u32)],
    pack_checksum: &ObjectId,
) -> Result<Vec<u8>, PackError> {
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut buf = Vec::new();
    buf.extend_from_slice(&IDX_SIGNATURE);
    buf.extend_from_slice(&IDX_VERSION.to_be_bytes());

    let mut fanout = [0u32; 256];
    for (oid, _, _) in entries.iter() {
        fanout[oid.first_byte() as usize] += 1;
    }
    for i in 1..256 {
        fanout[i] += fanout[i - 1];
    }
    for count in fanout {
        buf.extend_from_slice(&count.to_be_bytes());
    }

    for (oid, _, _) in entries.iter() {
        buf.extend_from_slice(oid.as_bytes());
    }
    for (_, _, crc) in entries.iter() {
        buf.extend_from_slice(&crc.to_be_bytes());
    }

    let mut large_offsets: Vec<u64> = Vec::new();
    for (_, offset, _) in entries.iter() {
        if *offset >= 0x8000_0000 {
            buf.extend_from_slice(&(0x8000_0000u32 | large_offsets.len() as u32).to_be_bytes());
            large_offsets.push(*offset);
        } else {
            buf.extend_from_slice(&(*offset as u32).to_be_bytes());
        }
    }
    for offset in &large_offsets {
        buf.extend_from_slice(&offset.to_be_bytes());
    }

    buf.extend_from_slice(pack_checksum.as_bytes());

    let mut hasher = Hasher::new();
    hasher.update(&buf);
    let idx_checksum = hasher.finalize()?;
    buf.extend_from_slice(idx_checksum.as_bytes());

    Ok(buf)
}
