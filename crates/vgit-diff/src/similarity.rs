//! Content similarity scoring for rename detection.
//!
//! Files are fingerprinted as djb2 hashes of 64-byte blocks; two files'
//! similarity is the byte volume of fingerprints they share, as a
//! percentage of the larger file. Line endings are normalized by
//! dropping the CR of CRLF pairs in text, so a CRLF conversion alone
//! does not break a rename match.

use std::collections::HashMap;

/// Block granularity of the fingerprint.
const BLOCK_SIZE: usize = 64;

/// Leading window scanned for NUL bytes to classify binaries.
const BINARY_SNIFF_LEN: usize = 8000;

/// djb2 seed.
const HASH_SEED: u32 = 5381;

/// Whether content should be treated as binary: a NUL byte in the first
/// 8000 bytes.
pub fn is_binary(content: &[u8]) -> bool {
    content[..content.len().min(BINARY_SNIFF_LEN)].contains(&0)
}

/// A multiset of content block fingerprints: `(key, bytes)` pairs sorted
/// by key.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    /// Fingerprint key -> bytes hashed under that key.
    entries: Vec<(u32, u64)>,
    /// Total bytes fingerprinted (after CR stripping).
    total: u64,
}

impl SimilarityIndex {
    /// Fingerprint `content`. For text (non-binary) input, the CR of each
    /// CRLF pair is skipped before hashing.
    pub fn from_content(content: &[u8]) -> Self {
        let text = !is_binary(content);
        let mut map: HashMap<u32, u64> = HashMap::new();
        let mut total = 0u64;

        let mut block_hash = HASH_SEED;
        let mut block_len = 0u64;
        let mut i = 0;
        while i < content.len() {
            let byte = content[i];
            if text && byte == b'\r' && content.get(i + 1) == Some(&b'\n') {
                i += 1;
                continue;
            }
            block_hash = block_hash.wrapping_mul(33).wrapping_add(byte as u32);
            block_len += 1;
            i += 1;

            if block_len == BLOCK_SIZE as u64 {
                *map.entry(block_hash).or_insert(0) += block_len;
                total += block_len;
                block_hash = HASH_SEED;
                block_len = 0;
            }
        }
        if block_len > 0 {
            *map.entry(block_hash).or_insert(0) += block_len;
            total += block_len;
        }

        let mut entries: Vec<(u32, u64)> = map.into_iter().collect();
        entries.sort_by_key(|&(key, _)| key);
        Self { entries, total }
    }

    /// Bytes fingerprinted.
    pub fn total_bytes(&self) -> u64 {
        self.total
    }

    /// Shared byte volume with another index: for each common key, the
    /// smaller byte count on either side.
    pub fn common_bytes(&self, other: &Self) -> u64 {
        let mut common = 0u64;
        let mut a = 0;
        let mut b = 0;
        while a < self.entries.len() && b < other.entries.len() {
            match self.entries[a].0.cmp(&other.entries[b].0) {
                std::cmp::Ordering::Less => a += 1,
                std::cmp::Ordering::Greater => b += 1,
                std::cmp::Ordering::Equal => {
                    common += self.entries[a].1.min(other.entries[b].1);
                    a += 1;
                    b += 1;
                }
            }
        }
        common
    }

    /// Similarity score in percent: `100 * common / max(total_a, total_b)`.
    pub fn score(&self, other: &Self) -> u8 {
        let max = self.total.max(other.total);
        if max == 0 {
            return 100;
        }
        (100 * self.common_bytes(other) / max) as u8
    }
}

/// Score two contents directly. Binary content (NUL in the first 8000
/// bytes) on either side scores 0: binaries are never rename candidates.
pub fn similarity_score(a: &[u8], b: &[u8]) -> u8 {
    if is_binary(a) || is_binary(b) {
        return 0;
    }
    SimilarityIndex::from_content(a).score(&SimilarityIndex::from_content(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_scores_100() {
        let content = b"fn main() {}\n".repeat(40);
        assert_eq!(similarity_score(&content, &content), 100);
    }

    #[test]
    fn unrelated_scores_low() {
        let a: Vec<u8> = (0..4000u32).flat_map(|i| i.to_le_bytes()).collect();
        let b = b"completely different text that shares nothing\n".repeat(100);
        // `a` is binary-free little-endian counters; still nothing shared.
        let a_text: Vec<u8> = a.iter().map(|&x| (x % 26) + b'a').collect();
        assert!(similarity_score(&a_text, &b) < 10);
    }

    #[test]
    fn partial_overlap_scores_proportionally() {
        // ~70% shared: 7 of 10 distinct 64-byte blocks in common.
        let block = |tag: u8| {
            let mut b = vec![tag; BLOCK_SIZE];
            b[0] = tag.wrapping_add(1);
            b
        };
        let mut a = Vec::new();
        let mut b = Vec::new();
        for i in 0..10u8 {
            a.extend_from_slice(&block(i));
            b.extend_from_slice(&block(if i < 7 { i } else { i + 100 }));
        }
        let score = similarity_score(&a, &b);
        assert!((65..=75).contains(&score), "score was {score}");
    }

    #[test]
    fn crlf_conversion_is_invisible() {
        let unix = b"alpha\nbeta\ngamma\ndelta\n".repeat(20);
        let dos: Vec<u8> = String::from_utf8(unix.clone())
            .unwrap()
            .replace('\n', "\r\n")
            .into_bytes();
        assert_eq!(similarity_score(&unix, &dos), 100);
    }

    #[test]
    fn binary_never_matches() {
        let mut binary = b"starts as text".to_vec();
        binary.push(0);
        binary.extend_from_slice(&[1, 2, 3]);
        assert!(is_binary(&binary));
        assert_eq!(similarity_score(&binary, &binary), 0);
    }

    #[test]
    fn nul_past_sniff_window_is_text() {
        let mut content = vec![b'a'; BINARY_SNIFF_LEN];
        content.push(0);
        assert!(!is_binary(&content));
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(similarity_score(b"", b""), 100);
        assert_eq!(similarity_score(b"", b"something"), 0);
    }
}
