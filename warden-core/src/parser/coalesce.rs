//! Hunk coalescing: merge nearby hunks of one file into larger analysis
//! units so a single prompt sees related edits together.
//!
//! Two hunks merge when the new-side gap between them is at most
//! `max_gap_lines` and the combined content stays under `max_chunk_size`
//! bytes. Merged content keeps the first header and joins the parts with a
//! `...` elision line wherever source lines were skipped. The operation is
//! idempotent.

use crate::types::DiffHunk;

/// Options for [`coalesce_hunks`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoalesceOptions {
    /// Maximum new-side gap (in lines) to bridge.
    pub max_gap_lines: u32,
    /// Ceiling for the merged content length, in bytes.
    pub max_chunk_size: usize,
    pub enabled: bool,
}

impl Default for CoalesceOptions {
    fn default() -> Self {
        Self {
            max_gap_lines: 10,
            max_chunk_size: 10_000,
            enabled: true,
        }
    }
}

/// Merges adjacent hunks of one file under the gap/size bounds.
///
/// Input order does not matter (hunks are sorted by `new_start` first);
/// single-element and empty inputs pass through; `enabled = false` is a
/// no-op.
pub fn coalesce_hunks(hunks: Vec<DiffHunk>, opts: &CoalesceOptions) -> Vec<DiffHunk> {
    if !opts.enabled || hunks.len() <= 1 {
        return hunks;
    }

    let mut sorted = hunks;
    sorted.sort_by_key(|h| h.new_start);

    let mut out: Vec<DiffHunk> = Vec::with_capacity(sorted.len());
    for next in sorted {
        let Some(prev) = out.last_mut() else {
            out.push(next);
            continue;
        };

        // Exclusive new-side end of the previous hunk.
        let prev_new_end = prev.new_start + prev.new_count;
        let gap = next.new_start.saturating_sub(prev_new_end);
        let within_gap = next.new_start >= prev_new_end && gap <= opts.max_gap_lines;
        let within_size = prev.content.len() + next.content.len() <= opts.max_chunk_size;

        if within_gap && within_size {
            merge_into(prev, &next, gap);
        } else {
            out.push(next);
        }
    }
    out
}

/// Extends `prev` to also cover `next`. Ranges widen to the union; content
/// appends `next`'s body (header dropped) behind an elision marker when
/// lines were skipped.
fn merge_into(prev: &mut DiffHunk, next: &DiffHunk, gap: u32) {
    prev.old_count = (next.old_start + next.old_count).saturating_sub(prev.old_start);
    prev.new_count = (next.new_start + next.new_count).saturating_sub(prev.new_start);

    if gap > 0 {
        prev.content.push_str("\n...");
        prev.lines.push("...".to_string());
    }
    for line in &next.lines {
        prev.content.push('\n');
        prev.content.push_str(line);
        prev.lines.push(line.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_patch;
    use pretty_assertions::assert_eq;

    fn hunk(old_start: u32, old_count: u32, new_start: u32, new_count: u32) -> DiffHunk {
        let header = format!("@@ -{old_start},{old_count} +{new_start},{new_count} @@");
        let lines: Vec<String> = (0..new_count).map(|i| format!("+l{}", new_start + i)).collect();
        let content = std::iter::once(header.clone())
            .chain(lines.iter().cloned())
            .collect::<Vec<_>>()
            .join("\n");
        DiffHunk {
            old_start,
            old_count,
            new_start,
            new_count,
            header: None,
            content,
            lines,
        }
    }

    #[test]
    fn merges_within_gap_keeps_distant() {
        // Hunks at lines 1..3, 10..12, 100..103; gap limit 10.
        let input = vec![hunk(1, 3, 1, 3), hunk(10, 3, 10, 3), hunk(100, 4, 100, 4)];
        let out = coalesce_hunks(
            input,
            &CoalesceOptions {
                max_gap_lines: 10,
                max_chunk_size: 10_000,
                enabled: true,
            },
        );
        assert_eq!(out.len(), 2);
        let merged = &out[0];
        assert_eq!(merged.new_start, 1);
        assert_eq!(merged.new_count, 12); // 10 + 3 - 1
        assert_eq!(merged.old_start, 1);
        assert_eq!(merged.old_count, 12);
        assert!(merged.content.contains("\n..."));
        assert_eq!(out[1].new_start, 100);
    }

    #[test]
    fn size_ceiling_blocks_merge() {
        let a = hunk(1, 3, 1, 3);
        let b = hunk(5, 3, 5, 3);
        let limit = a.content.len() + b.content.len() - 1;
        let out = coalesce_hunks(
            vec![a, b],
            &CoalesceOptions {
                max_gap_lines: 10,
                max_chunk_size: limit,
                enabled: true,
            },
        );
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn adjacent_hunks_merge_without_elision() {
        let out = coalesce_hunks(
            vec![hunk(1, 3, 1, 3), hunk(4, 2, 4, 2)],
            &CoalesceOptions::default(),
        );
        assert_eq!(out.len(), 1);
        assert!(!out[0].content.contains("..."));
        assert_eq!(out[0].new_count, 5);
    }

    #[test]
    fn disabled_single_and_empty_pass_through() {
        let input = vec![hunk(1, 3, 1, 3), hunk(5, 2, 5, 2)];
        let disabled = CoalesceOptions {
            enabled: false,
            ..CoalesceOptions::default()
        };
        assert_eq!(coalesce_hunks(input.clone(), &disabled).len(), 2);
        assert_eq!(coalesce_hunks(vec![hunk(1, 1, 1, 1)], &CoalesceOptions::default()).len(), 1);
        assert!(coalesce_hunks(Vec::new(), &CoalesceOptions::default()).is_empty());
    }

    #[test]
    fn coalescing_twice_equals_once() {
        let input = vec![hunk(1, 3, 1, 3), hunk(10, 3, 10, 3), hunk(100, 4, 100, 4)];
        let opts = CoalesceOptions::default();
        let once = coalesce_hunks(input, &opts);
        let twice = coalesce_hunks(once.clone(), &opts);
        assert_eq!(once, twice);
    }

    #[test]
    fn merged_unit_reparses_as_one_hunk() {
        let out = coalesce_hunks(
            vec![hunk(1, 2, 1, 2), hunk(6, 2, 6, 2)],
            &CoalesceOptions::default(),
        );
        assert_eq!(out.len(), 1);
        // The inner header was dropped, so the merged content is one hunk.
        assert_eq!(parse_patch(&out[0].content).len(), 1);
    }
}
