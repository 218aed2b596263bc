//! Delta computation: block-indexed matching between base and target.
//!
//! The base is cut into fixed-size blocks which are indexed by content;
//! the target is scanned for matching blocks, which become COPY
//! instructions extended as far as the data agrees. Everything between
//! matches accumulates into INSERT runs.

use std::collections::HashMap;

use super::{encode_copy, encode_insert, write_varint};

/// Tuning for [`compute_delta`].
#[derive(Debug, Clone, Copy)]
pub struct DeltaConfig {
    /// Block granularity of the base index.
    pub block_size: usize,
    /// How many base offsets to keep per identical block (a sliding
    /// window over repeated content).
    pub window: usize,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            block_size: 16,
            window: 10,
        }
    }
}

/// Compute a delta that transforms `base` into `target`, using defaults.
pub fn compute_delta(base: &[u8], target: &[u8]) -> Vec<u8> {
    compute_delta_with(base, target, DeltaConfig::default())
}

/// Compute a delta with explicit tuning.
pub fn compute_delta_with(base: &[u8], target: &[u8], config: DeltaConfig) -> Vec<u8> {
    let block_size = config.block_size.max(1);
    let mut delta = Vec::new();

    delta.extend_from_slice(&write_varint(base.len()));
    delta.extend_from_slice(&write_varint(target.len()));

    if target.is_empty() {
        return delta;
    }

    let index = build_block_index(base, block_size, config.window.max(1));

    let mut tpos = 0;
    let mut pending_insert: Vec<u8> = Vec::new();

    while tpos < target.len() {
        let remaining = target.len() - tpos;

        if remaining >= block_size {
            let block = &target[tpos..tpos + block_size];
            if let Some(offsets) = index.get(block) {
                // Pick the candidate offset with the longest extension.
                let (src_offset, match_len) = offsets
                    .iter()
                    .map(|&off| (off, extend_match(base, off, target, tpos, block_size)))
                    .max_by_key(|&(_, len)| len)
                    .expect("index buckets are non-empty");

                flush_insert(&mut delta, &mut pending_insert);
                emit_copy(&mut delta, src_offset, match_len);
                tpos += match_len;
                continue;
            }
        }

        pending_insert.push(target[tpos]);
        tpos += 1;
        if pending_insert.len() == 127 {
            flush_insert(&mut delta, &mut pending_insert);
        }
    }

    flush_insert(&mut delta, &mut pending_insert);
    delta
}

/// Index non-overlapping base blocks; identical blocks keep up to
/// `window` distinct offsets.
fn build_block_index(
    base: &[u8],
    block_size: usize,
    window: usize,
) -> HashMap<&[u8], Vec<usize>> {
    let mut index: HashMap<&[u8], Vec<usize>> = HashMap::new();
    if base.len() < block_size {
        return index;
    }
    for offset in (0..=base.len() - block_size).step_by(block_size) {
        let block = &base[offset..offset + block_size];
        let bucket = index.entry(block).or_default();
        if bucket.len() < window {
            bucket.push(offset);
        }
    }
    index
}

/// Length of the common run at `base[src_off..]` / `target[tgt_off..]`,
/// at least `block_size`.
fn extend_match(
    base: &[u8],
    src_off: usize,
    target: &[u8],
    tgt_off: usize,
    block_size: usize,
) -> usize {
    let max_len = (base.len() - src_off).min(target.len() - tgt_off);
    let mut len = block_size;
    while len < max_len && base[src_off + len] == target[tgt_off + len] {
        len += 1;
    }
    len
}

fn flush_insert(delta: &mut Vec<u8>, pending: &mut Vec<u8>) {
    for chunk in pending.chunks(127) {
        delta.extend_from_slice(&encode_insert(chunk));
    }
    pending.clear();
}

/// Emit one or more COPY instructions (each at most 24 bits of size).
fn emit_copy(delta: &mut Vec<u8>, offset: usize, mut size: usize) {
    let mut off = offset;
    while size > 0 {
        let chunk = size.min(0x00ff_ffff);
        delta.extend_from_slice(&encode_copy(off as u64, chunk));
        off += chunk;
        size -= chunk;
    }
}
