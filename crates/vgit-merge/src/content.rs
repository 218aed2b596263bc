//! Line-level three-way content merge.
//!
//! Both sides are diffed against the base; change regions that touch
//! disjoint parts of the base interleave cleanly, overlapping ones with
//! different content become conflicts wrapped in standard markers.

use crate::FileStrategy;

/// Labels used in conflict markers.
#[derive(Debug, Clone)]
pub struct MergeLabels {
    pub ours: String,
    pub theirs: String,
}

impl Default for MergeLabels {
    fn default() -> Self {
        Self {
            ours: "ours".to_string(),
            theirs: "theirs".to_string(),
        }
    }
}

/// The result of a content merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMergeResult {
    pub content: Vec<u8>,
    /// Number of conflicted regions (0 = clean).
    pub conflicts: usize,
}

impl ContentMergeResult {
    pub fn is_clean(&self) -> bool {
        self.conflicts == 0
    }

    fn clean(content: Vec<u8>) -> Self {
        Self {
            content,
            conflicts: 0,
        }
    }
}

/// Merge `ours` and `theirs` against `base`.
pub fn merge_content(
    base: &[u8],
    ours: &[u8],
    theirs: &[u8],
    strategy: FileStrategy,
    labels: &MergeLabels,
) -> ContentMergeResult {
    // Trivial resolutions first.
    if ours == theirs {
        return ContentMergeResult::clean(ours.to_vec());
    }
    if base == ours {
        return ContentMergeResult::clean(theirs.to_vec());
    }
    if base == theirs {
        return ContentMergeResult::clean(ours.to_vec());
    }

    match strategy {
        FileStrategy::Ours => return ContentMergeResult::clean(ours.to_vec()),
        FileStrategy::Theirs => return ContentMergeResult::clean(theirs.to_vec()),
        FileStrategy::Union => {
            let mut content = ours.to_vec();
            if !content.is_empty() && !content.ends_with(b"\n") {
                content.push(b'\n');
            }
            content.extend_from_slice(theirs);
            return ContentMergeResult::clean(content);
        }
        FileStrategy::Merge => {}
    }

    let base_lines = split_lines(base);
    let ours_lines = split_lines(ours);
    let theirs_lines = split_lines(theirs);

    let ours_regions = diff_regions(&base_lines, &ours_lines);
    let theirs_regions = diff_regions(&base_lines, &theirs_lines);

    interleave(
        &base_lines,
        &ours_lines,
        &theirs_lines,
        &ours_regions,
        &theirs_regions,
        labels,
    )
}

/// Split into lines, each keeping its terminator.
fn split_lines(content: &[u8]) -> Vec<&[u8]> {
    if content.is_empty() {
        return Vec::new();
    }
    content.split_inclusive(|&b| b == b'\n').collect()
}

/// A contiguous edit relative to the base: `base_len` lines at
/// `base_start` are replaced by `new_len` lines at `new_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    base_start: usize,
    base_len: usize,
    new_start: usize,
    new_len: usize,
}

impl Region {
    fn base_end(&self) -> usize {
        self.base_start + self.base_len
    }

    fn is_insertion(&self) -> bool {
        self.base_len == 0
    }
}

/// Myers O(ND) line diff, reduced to change regions.
fn diff_regions(old: &[&[u8]], new: &[&[u8]]) -> Vec<Region> {
    let n = old.len();
    let m = new.len();
    let max = n + m;
    if max == 0 {
        return Vec::new();
    }

    let offset = max as isize;
    let idx = |k: isize| (k + offset) as usize;

    // Forward pass, snapshotting the frontier before each round.
    let mut v = vec![0usize; 2 * max + 1];
    let mut trace: Vec<Vec<usize>> = Vec::new();
    let mut found_d = 0;

    'outer: for d in 0..=max as isize {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let down = k == -d || (k != d && v[idx(k - 1)] < v[idx(k + 1)]);
            let mut x = if down { v[idx(k + 1)] } else { v[idx(k - 1)] + 1 };
            let mut y = (x as isize - k) as usize;
            while x < n && y < m && old[x] == new[y] {
                x += 1;
                y += 1;
            }
            v[idx(k)] = x;
            if x >= n && y >= m {
                found_d = d;
                break 'outer;
            }
            k += 2;
        }
    }

    // Backtrack into individual edit steps, then group them.
    #[derive(Clone, Copy)]
    struct EditStep {
        insert: bool,
        old_index: usize,
        new_index: usize,
    }

    let mut steps: Vec<EditStep> = Vec::new();
    let mut x = n;
    let mut y = m;
    for d in (1..=found_d).rev() {
        let v = &trace[d as usize];
        let k = x as isize - y as isize;
        let down = k == -d || (k != d && v[idx(k - 1)] < v[idx(k + 1)]);
        let prev_k = if down { k + 1 } else { k - 1 };
        let prev_x = v[idx(prev_k)];
        let prev_y = (prev_x as isize - prev_k) as usize;

        steps.push(EditStep {
            insert: down,
            old_index: prev_x,
            new_index: prev_y,
        });
        x = prev_x;
        y = prev_y;
    }
    steps.reverse();

    // Contiguous steps collapse into one region.
    let mut regions: Vec<Region> = Vec::new();
    for step in steps {
        let extend = regions.last().is_some_and(|r| {
            step.old_index == r.base_end() && step.new_index == r.new_start + r.new_len
        });
        if extend {
            let last = regions.last_mut().expect("just checked");
            if step.insert {
                last.new_len += 1;
            } else {
                last.base_len += 1;
            }
        } else {
            regions.push(Region {
                base_start: step.old_index,
                base_len: usize::from(!step.insert),
                new_start: step.new_index,
                new_len: usize::from(step.insert),
            });
        }
    }
    regions
}

/// Interleave both sides' change regions over the base.
fn interleave(
    base: &[&[u8]],
    ours: &[&[u8]],
    theirs: &[&[u8]],
    ours_regions: &[Region],
    theirs_regions: &[Region],
    labels: &MergeLabels,
) -> ContentMergeResult {
    let mut out: Vec<u8> = Vec::new();
    let mut conflicts = 0;

    let mut base_pos = 0;
    let mut oi = 0;
    let mut ti = 0;

    while oi < ours_regions.len() || ti < theirs_regions.len() {
        let o = ours_regions.get(oi).copied();
        let t = theirs_regions.get(ti).copied();

        // Regions on disjoint base spans interleave; true overlap (or
        // two insertions at the same point) conflicts.
        let take = match (o, t) {
            (Some(o), Some(t)) => {
                let same_point_inserts =
                    o.is_insertion() && t.is_insertion() && o.base_start == t.base_start;
                if !same_point_inserts && o.base_end() <= t.base_start {
                    Take::Ours(o)
                } else if !same_point_inserts && t.base_end() <= o.base_start {
                    Take::Theirs(t)
                } else {
                    Take::Overlap(o, t)
                }
            }
            (Some(o), None) => Take::Ours(o),
            (None, Some(t)) => Take::Theirs(t),
            (None, None) => unreachable!("loop condition"),
        };

        match take {
            Take::Ours(o) => {
                emit_range(&mut out, base, base_pos, o.base_start);
                emit_range(&mut out, ours, o.new_start, o.new_start + o.new_len);
                base_pos = o.base_end();
                oi += 1;
            }
            Take::Theirs(t) => {
                emit_range(&mut out, base, base_pos, t.base_start);
                emit_range(&mut out, theirs, t.new_start, t.new_start + t.new_len);
                base_pos = t.base_end();
                ti += 1;
            }
            Take::Overlap(o, t) => {
                // Coalesce every further region that intersects the span.
                let mut span_start = o.base_start.min(t.base_start);
                let mut span_end = o.base_end().max(t.base_end());
                let mut o_end = oi + 1;
                let mut t_end = ti + 1;
                loop {
                    let mut grew = false;
                    while ours_regions
                        .get(o_end)
                        .is_some_and(|r| r.base_start < span_end)
                    {
                        span_start = span_start.min(ours_regions[o_end].base_start);
                        span_end = span_end.max(ours_regions[o_end].base_end());
                        o_end += 1;
                        grew = true;
                    }
                    while theirs_regions
                        .get(t_end)
                        .is_some_and(|r| r.base_start < span_end)
                    {
                        span_start = span_start.min(theirs_regions[t_end].base_start);
                        span_end = span_end.max(theirs_regions[t_end].base_end());
                        t_end += 1;
                        grew = true;
                    }
                    if !grew {
                        break;
                    }
                }

                emit_range(&mut out, base, base_pos, span_start);

                let ours_side =
                    replay(base, ours, &ours_regions[oi..o_end], span_start, span_end);
                let theirs_side =
                    replay(base, theirs, &theirs_regions[ti..t_end], span_start, span_end);

                if ours_side == theirs_side {
                    out.extend_from_slice(&ours_side);
                } else {
                    conflicts += 1;
                    out.extend_from_slice(format!("<<<<<<< {}\n", labels.ours).as_bytes());
                    out.extend_from_slice(&ours_side);
                    out.extend_from_slice(b"=======\n");
                    out.extend_from_slice(&theirs_side);
                    out.extend_from_slice(format!(">>>>>>> {}\n", labels.theirs).as_bytes());
                }

                base_pos = span_end;
                oi = o_end;
                ti = t_end;
            }
        }
    }

    emit_range(&mut out, base, base_pos, base.len());
    ContentMergeResult {
        content: out,
        conflicts,
    }
}

enum Take {
    Ours(Region),
    Theirs(Region),
    Overlap(Region, Region),
}

/// One side's text for the base span `[span_start, span_end)`, with its
/// regions applied.
fn replay(
    base: &[&[u8]],
    side: &[&[u8]],
    regions: &[Region],
    span_start: usize,
    span_end: usize,
) -> Vec<u8> {
    let mut out = Vec::new();
    let mut pos = span_start;
    for region in regions {
        emit_range(&mut out, base, pos, region.base_start);
        emit_range(
            &mut out,
            side,
            region.new_start,
            region.new_start + region.new_len,
        );
        pos = region.base_end();
    }
    emit_range(&mut out, base, pos, span_end);
    out
}

fn emit_range(out: &mut Vec<u8>, lines: &[&[u8]], start: usize, end: usize) {
    for line in lines.iter().take(end).skip(start) {
        out.extend_from_slice(line);
    }
}
