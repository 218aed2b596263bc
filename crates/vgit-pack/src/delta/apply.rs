//! Delta application: reconstruct a target from a base.

use super::read_varint;
use crate::PackError;

/// Apply a delta instruction stream to `base`, producing the target.
///
/// Validates the declared source size against `base`, bounds-checks every
/// copy, rejects output growing past the declared target size, and
/// requires the final length to match exactly.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, PackError> {
    let mut pos = 0;

    let (source_size, consumed) =
        read_varint(&delta[pos..]).ok_or_else(|| PackError::InvalidDelta {
            offset: 0,
            reason: "truncated source size".into(),
        })?;
    pos += consumed;

    let (target_size, consumed) =
        read_varint(&delta[pos..]).ok_or_else(|| PackError::InvalidDelta {
            offset: pos as u64,
            reason: "truncated target size".into(),
        })?;
    pos += consumed;

    if source_size != base.len() {
        return Err(PackError::InvalidDelta {
            offset: 0,
            reason: format!(
                "source size mismatch: delta says {source_size}, base is {}",
                base.len()
            ),
        });
    }

    let mut output = Vec::with_capacity(target_size);

    while pos < delta.len() {
        let cmd_offset = pos as u64;
        let cmd = delta[pos];
        pos += 1;

        if cmd & 0x80 != 0 {
            // COPY: low 7 bits select which of 4 offset and 3 size bytes follow.
            let mut offset: usize = 0;
            let mut size: usize = 0;

            for i in 0..4 {
                if cmd & (1 << i) != 0 {
                    let byte = *delta.get(pos).ok_or_else(|| PackError::InvalidDelta {
                        offset: cmd_offset,
                        reason: "truncated copy offset".into(),
                    })?;
                    offset |= (byte as usize) << (8 * i);
                    pos += 1;
                }
            }
            for i in 0..3 {
                if cmd & (0x10 << i) != 0 {
                    let byte = *delta.get(pos).ok_or_else(|| PackError::InvalidDelta {
                        offset: cmd_offset,
                        reason: "truncated copy size".into(),
                    })?;
                    size |= (byte as usize) << (8 * i);
                    pos += 1;
                }
            }
            if size == 0 {
                size = 0x10000;
            }

            if offset + size > base.len() {
                return Err(PackError::InvalidDelta {
                    offset: cmd_offset,
                    reason: format!(
                        "copy out of bounds: offset={offset}, size={size}, base_len={}",
                        base.len()
                    ),
                });
            }
            output.extend_from_slice(&base[offset..offset + size]);
        } else if cmd != 0 {
            // INSERT: low 7 bits count the literal bytes that follow.
            let n = cmd as usize;
            if pos + n > delta.len() {
                return Err(PackError::InvalidDelta {
                    offset: cmd_offset,
                    reason: "truncated insert data".into(),
                });
            }
            output.extend_from_slice(&delta[pos..pos + n]);
            pos += n;
        } else {
            return Err(PackError::InvalidDelta {
                offset: cmd_offset,
                reason: "reserved delta opcode 0".into(),
            });
        }

        if output.len() > target_size {
            return Err(PackError::InvalidDelta {
                offset: cmd_offset,
                reason: format!(
                    "output exceeds declared target size {target_size}: {}",
                    output.len()
                ),
            });
        }
    }

    if output.len() != target_size {
        return Err(PackError::InvalidDelta {
            offset: 0,
            reason: format!(
                "target size mismatch: delta says {target_size}, got {}",
                output.len()
            ),
        });
    }

    Ok(output)
}
