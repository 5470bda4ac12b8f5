//! Unified-diff parser.
//!
//! Features:
//! - Works on hunks-only input (file headers `---`/`+++` optional).
//! - Skips metadata lines (`diff --git`, `index `, `\ No newline ...`).
//! - Binary patch heuristics (`GIT binary patch`, `Binary files ... differ`).
//! - Round-trips the synthetic whole-file form `@@ -0,0 +1,N @@`.
//!
//! A hunk's `content` includes its `@@` header line; `lines` does not.

pub mod coalesce;

use crate::types::DiffHunk;

/// Parses a unified diff string into ordered hunks.
///
/// Input without any `@@` header yields an empty sequence. Counts absent
/// from a header (`@@ -3 +7 @@`) default to 1.
pub fn parse_patch(patch: &str) -> Vec<DiffHunk> {
    let mut hunks: Vec<DiffHunk> = Vec::new();
    let mut cur: Option<DiffHunk> = None;

    for line in patch.lines() {
        if let Some(hunk) = parse_hunk_header(line) {
            if let Some(done) = cur.take() {
                hunks.push(done);
            }
            cur = Some(hunk);
            continue;
        }

        if is_metadata_line(line) {
            continue;
        }

        if let Some(h) = cur.as_mut() {
            h.content.push('\n');
            h.content.push_str(line);
            h.lines.push(line.to_string());
        }
        // Prelude before the first `@@` is dropped.
    }

    if let Some(done) = cur.take() {
        hunks.push(done);
    }
    hunks
}

/// Counts `@@` hunk headers in a patch. Always equals
/// `parse_patch(patch).len()` because both use the same header parse.
pub fn count_patch_chunks(patch: &str) -> usize {
    patch
        .lines()
        .filter(|l| parse_hunk_header(l).is_some())
        .count()
}

/// Simple heuristic to detect binary patches or binary-diff messages.
pub fn looks_like_binary_patch(s: &str) -> bool {
    s.contains("GIT binary patch")
        || s.starts_with("Binary files ")
        || (s.starts_with("Files ") && s.contains(" differ"))
}

/// Parses `@@ -<old>[,<n>] +<new>[,<m>] @@[ <scope>]` into an empty hunk
/// carrying the header line as its initial content.
fn parse_hunk_header(line: &str) -> Option<DiffHunk> {
    let rest = line.strip_prefix("@@ -")?;
    let (ranges, tail) = rest.split_once(" @@")?;
    let (old_part, new_part) = ranges.split_once(" +")?;

    let (old_start, old_count) = split_range(old_part)?;
    let (new_start, new_count) = split_range(new_part)?;

    let header = tail
        .strip_prefix(' ')
        .map(str::trim_end)
        .filter(|s| !s.is_empty())
        .map(String::from);

    Some(DiffHunk {
        old_start,
        old_count,
        new_start,
        new_count,
        header,
        content: line.to_string(),
        lines: Vec::new(),
    })
}

/// Splits "12,7" into (12, 7) and "12" into (12, 1).
fn split_range(s: &str) -> Option<(u32, u32)> {
    let s = s.trim();
    if let Some((start, count)) = s.split_once(',') {
        Some((start.parse().ok()?, count.parse().ok()?))
    } else {
        Some((s.parse().ok()?, 1))
    }
}

fn is_metadata_line(line: &str) -> bool {
    line.starts_with("diff --git")
        || line.starts_with("index ")
        || line.starts_with("--- ")
        || line.starts_with("+++ ")
        || line.starts_with("\\ No newline")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TWO_HUNKS: &str = "\
diff --git a/src/db.ts b/src/db.ts
index 11aa..22bb 100644
--- a/src/db.ts
+++ b/src/db.ts
@@ -10,6 +10,7 @@ function query(id: string) {
 const base = 1;
-const q = `select * from t where id = ${id}`;
+const q = sql`select * from t where id = ${id}`;
+audit(q);
 return run(q);
@@ -40,3 +41,3 @@
 a
-b
+c
\\ No newline at end of file";

    #[test]
    fn parses_hunks_and_skips_metadata() {
        let hunks = parse_patch(TWO_HUNKS);
        assert_eq!(hunks.len(), 2);

        let h = &hunks[0];
        assert_eq!((h.old_start, h.old_count), (10, 6));
        assert_eq!((h.new_start, h.new_count), (10, 7));
        assert_eq!(h.header.as_deref(), Some("function query(id: string) {"));
        assert_eq!(h.lines.len(), 5);
        assert!(h.content.starts_with("@@ -10,6 +10,7 @@"));
        assert!(!h.content.contains("diff --git"));

        let h2 = &hunks[1];
        assert_eq!((h2.new_start, h2.new_count), (41, 3));
        assert_eq!(h2.header, None);
        // `\ No newline` marker excluded
        assert_eq!(h2.lines, vec![" a", "-b", "+c"]);
    }

    #[test]
    fn counts_absent_from_header_default_to_one() {
        let hunks = parse_patch("@@ -3 +7 @@\n-x\n+y");
        assert_eq!(hunks.len(), 1);
        assert_eq!((hunks[0].old_start, hunks[0].old_count), (3, 1));
        assert_eq!((hunks[0].new_start, hunks[0].new_count), (7, 1));
    }

    #[test]
    fn empty_and_headerless_input_yield_nothing() {
        assert!(parse_patch("").is_empty());
        assert!(parse_patch("just some text\nwith lines\n").is_empty());
    }

    #[test]
    fn chunk_count_matches_parser() {
        assert_eq!(count_patch_chunks(TWO_HUNKS), parse_patch(TWO_HUNKS).len());
        assert_eq!(count_patch_chunks(""), 0);
        // A `@@`-looking body line is not a header.
        let tricky = "@@ -1,2 +1,2 @@\n+@@ not a header\n x";
        assert_eq!(count_patch_chunks(tricky), 1);
        assert_eq!(parse_patch(tricky).len(), 1);
    }

    #[test]
    fn synthetic_whole_file_form_round_trips() {
        let content = "@@ -0,0 +1,3 @@\n+line one\n+line two\n+line three";
        let hunks = parse_patch(content);
        assert_eq!(hunks.len(), 1);
        let h = &hunks[0];
        assert_eq!((h.old_start, h.old_count), (0, 0));
        assert_eq!((h.new_start, h.new_count), (1, 3));
        assert_eq!(h.lines.len(), 3);
        assert_eq!(h.content, content);

        let empty = parse_patch("@@ -0,0 +0,0 @@");
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].new_count, 0);
        assert!(empty[0].lines.is_empty());
    }

    #[test]
    fn binary_patch_heuristic() {
        assert!(looks_like_binary_patch(
            "Binary files a/logo.png and b/logo.png differ"
        ));
        assert!(looks_like_binary_patch("literal 1234\nGIT binary patch"));
        assert!(!looks_like_binary_patch("@@ -1 +1 @@\n-x\n+y"));
    }
}
