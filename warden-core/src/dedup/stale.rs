//! Stale-comment resolution.
//!
//! A previously posted warden comment whose finding was not re-produced
//! this run is stale: either its file left the diff entirely (orphaned) or
//! the issue was fixed. The transport resolves the returned threads.

use std::collections::BTreeSet;

use tracing::debug;

use crate::dedup::marker::generate_content_hash;
use crate::types::{ExistingComment, Finding};

/// At most this many threads are resolved per run.
pub const STALE_COMMENT_CAP: usize = 50;

/// Line drift tolerated when matching a finding to an old comment.
const LINE_TOLERANCE: u32 = 5;

/// Computes the stale subset of `existing`.
///
/// Only threaded, unresolved warden comments are considered. A comment is
/// stale when its file left the diff entirely (orphaned), or when the
/// file was analysed this run and no finding lands on the same path
/// within ±5 lines with matching content hash or normalised title. Files
/// still in the diff but skipped by the preparer are left alone — absence
/// of a finding there proves nothing.
pub fn resolve_stale(
    existing: &[ExistingComment],
    findings: &[Finding],
    diff_files: &BTreeSet<String>,
    analysed_files: &BTreeSet<String>,
) -> Vec<ExistingComment> {
    let mut stale = Vec::new();

    for comment in existing {
        if comment.thread_id.is_none() || comment.is_resolved || !comment.is_warden {
            continue;
        }

        if !diff_files.contains(&comment.path) {
            // File no longer in the diff: orphaned.
            debug!("stale: {} orphaned ({} out of scope)", comment.id, comment.path);
            stale.push(comment.clone());
        } else if analysed_files.contains(&comment.path)
            && !findings.iter().any(|f| matches_comment(f, comment))
        {
            debug!("stale: {} not re-produced at {}:{}", comment.id, comment.path, comment.line);
            stale.push(comment.clone());
        }

        if stale.len() >= STALE_COMMENT_CAP {
            break;
        }
    }
    stale
}

fn matches_comment(finding: &Finding, comment: &ExistingComment) -> bool {
    let Some(loc) = &finding.location else {
        return false;
    };
    if loc.path != comment.path {
        return false;
    }
    let line = loc.end_line();
    if line.abs_diff(comment.line) > LINE_TOLERANCE {
        return false;
    }
    let hash = generate_content_hash(&finding.title, &finding.description);
    hash == comment.content_hash || normalise(&finding.title) == normalise(&comment.title)
}

fn normalise(s: &str) -> String {
    s.trim().to_lowercase()
}
