//! Cross-run comment deduplication.
//!
//! Two passes, cheap → precise:
//! 1) **Content hash** — exact match on `"<path>:<line>:<hash>"` against
//!    the existing comments fetched from the pull request.
//! 2) **Semantic** — a lightweight LLM compares the remaining findings
//!    against the remaining comments and returns index pairs. Failures
//!    downgrade gracefully to "no matches".
//!
//! The growing mirror: findings a skill will post are absorbed into an
//! in-memory copy of the existing comments so later skills in the same
//! run dedup against them. The mirror has a single writer and is mutated
//! only between skills.

pub mod marker;
pub mod stale;

use serde::Deserialize;
use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use warden_llm::{ChatRequest, LlmService};

use crate::types::{
    DuplicateAction, DuplicateActionKind, ExistingComment, Finding, MatchType,
};
use marker::generate_content_hash;

/// Options for one dedup pass.
#[derive(Debug, Clone, Default)]
pub struct DedupOptions {
    /// Skip the semantic pass even when an LLM is available.
    pub hash_only: bool,
    /// Skill whose attribution is added on `update_warden` actions.
    pub current_skill: Option<String>,
}

/// Outcome: findings that are genuinely new, plus actions for duplicates.
#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub new_findings: Vec<Finding>,
    pub duplicate_actions: Vec<DuplicateAction>,
}

/// The dedup line for a finding: `end_line ?? start_line ?? 0`.
fn finding_line(f: &Finding) -> u32 {
    f.location.as_ref().map(|l| l.end_line()).unwrap_or(0)
}

/// Content-hash key for pass 1.
fn hash_key(path: &str, line: u32, hash: &str) -> String {
    format!("{path}:{line}:{hash}")
}

/// Deduplicates `findings` against `existing` comments.
///
/// `svc` enables the semantic pass; pass `None` (or set `hash_only`) to
/// stay on exact matching only.
pub async fn dedup_findings(
    svc: Option<&LlmService>,
    findings: Vec<Finding>,
    existing: &[ExistingComment],
    opts: &DedupOptions,
    cancel: &CancellationToken,
) -> DedupOutcome {
    let mut outcome = DedupOutcome::default();

    // ---- pass 1: content hash ----
    let mut by_key: HashMap<String, usize> = HashMap::new();
    for (i, c) in existing.iter().enumerate() {
        if c.content_hash.is_empty() {
            continue;
        }
        by_key
            .entry(hash_key(&c.path, c.line, &c.content_hash))
            .or_insert(i);
    }

    let mut remaining: Vec<Finding> = Vec::new();
    let mut matched_existing: Vec<bool> = vec![false; existing.len()];

    for finding in findings {
        let hash = generate_content_hash(&finding.title, &finding.description);
        let path = finding
            .location
            .as_ref()
            .map(|l| l.path.as_str())
            .unwrap_or("");
        let key = hash_key(path, finding_line(&finding), &hash);

        match by_key.get(&key) {
            Some(&idx) => {
                matched_existing[idx] = true;
                outcome
                    .duplicate_actions
                    .push(make_action(finding, &existing[idx], MatchType::Hash));
            }
            None => remaining.push(finding),
        }
    }

    debug!(
        "dedup: hash pass matched {} finding(s), {} remain",
        outcome.duplicate_actions.len(),
        remaining.len()
    );

    // ---- pass 2: semantic ----
    let semantic_candidates: Vec<(usize, &ExistingComment)> = existing
        .iter()
        .enumerate()
        .filter(|(i, _)| !matched_existing[*i])
        .map(|(i, c)| (i, c))
        .collect();

    let svc = match (opts.hash_only, svc) {
        (false, Some(svc)) if !remaining.is_empty() && !semantic_candidates.is_empty() => svc,
        _ => {
            outcome.new_findings = remaining;
            return outcome;
        }
    };
    let pairs = semantic_pairs(svc, &remaining, &semantic_candidates, cancel).await;

    let mut consumed: Vec<bool> = vec![false; remaining.len()];
    for (finding_idx, existing_idx) in pairs {
        let Some(slot) = consumed.get_mut(finding_idx) else {
            continue;
        };
        if *slot {
            continue;
        }
        let Some((_, comment)) = semantic_candidates.get(existing_idx) else {
            continue;
        };
        *slot = true;
        outcome.duplicate_actions.push(make_action(
            remaining[finding_idx].clone(),
            comment,
            MatchType::Semantic,
        ));
    }

    outcome.new_findings = remaining
        .into_iter()
        .zip(consumed)
        .filter_map(|(f, used)| (!used).then_some(f))
        .collect();
    outcome
}

fn make_action(finding: Finding, comment: &ExistingComment, match_type: MatchType) -> DuplicateAction {
    DuplicateAction {
        kind: if comment.is_warden {
            DuplicateActionKind::UpdateWarden
        } else {
            DuplicateActionKind::ReactExternal
        },
        finding,
        existing_comment: comment.clone(),
        match_type,
    }
}

#[derive(Deserialize)]
struct SemanticPair {
    #[serde(alias = "finding_index")]
    #[serde(rename = "findingIndex")]
    finding_index: usize,
    #[serde(alias = "existing_index")]
    #[serde(rename = "existingIndex")]
    existing_index: usize,
}

/// Asks the fast model which finding/comment pairs describe the same
/// issue. Any failure returns an empty set.
async fn semantic_pairs(
    svc: &LlmService,
    findings: &[Finding],
    comments: &[(usize, &ExistingComment)],
    cancel: &CancellationToken,
) -> Vec<(usize, usize)> {
    let mut findings_block = String::new();
    for (i, f) in findings.iter().enumerate() {
        let loc = f
            .location
            .as_ref()
            .map(|l| format!("{}:{}", l.path, l.start_line))
            .unwrap_or_else(|| "-".into());
        findings_block.push_str(&format!(
            "{i}) [{loc}] {} — {}\n",
            f.title,
            excerpt(&f.description, 160)
        ));
    }

    let mut comments_block = String::new();
    for (k, (_, c)) in comments.iter().enumerate() {
        comments_block.push_str(&format!(
            "{k}) [{}:{}] {} — {}\n",
            c.path,
            c.line,
            c.title,
            excerpt(&c.description, 160)
        ));
    }

    let system = "You match new code-review findings against existing review comments. \
Two items match only when they describe the same underlying issue at the same place. \
Return ONLY a JSON array of {\"findingIndex\": n, \"existingIndex\": m} pairs; return [] when nothing matches.";
    let user = format!("New findings:\n{findings_block}\nExisting comments:\n{comments_block}");
    let request = ChatRequest::new(system, &user);

    let raw = match svc.generate_fast(&request, cancel, None).await {
        Ok(out) => out.text,
        Err(e) => {
            warn!("dedup: semantic pass failed, continuing without: {e}");
            return Vec::new();
        }
    };

    parse_semantic_pairs(&raw)
}

/// Lenient parse of the model's pair array.
fn parse_semantic_pairs(raw: &str) -> Vec<(usize, usize)> {
    let trimmed = raw.trim();
    let start = match trimmed.find('[') {
        Some(i) => i,
        None => return Vec::new(),
    };
    let end = match trimmed.rfind(']') {
        Some(i) if i >= start => i,
        _ => return Vec::new(),
    };
    match serde_json::from_str::<Vec<SemanticPair>>(&trimmed[start..=end]) {
        Ok(pairs) => pairs
            .into_iter()
            .map(|p| (p.finding_index, p.existing_index))
            .collect(),
        Err(e) => {
            debug!("dedup: could not parse semantic pairs: {e}");
            Vec::new()
        }
    }
}

fn excerpt(s: &str, n: usize) -> String {
    let flat = s.replace('\n', " ");
    if flat.chars().count() <= n {
        flat
    } else {
        flat.chars().take(n).collect()
    }
}

/* --------------------- growing mirror --------------------- */

/// In-memory copy of the PR's comments that grows as skills post.
///
/// Single writer: the pipeline absorbs each skill's new findings after the
/// skill's dedup pass, so later skills see them as existing comments.
pub struct CommentMirror {
    comments: Vec<ExistingComment>,
    next_synthetic_id: u64,
}

impl CommentMirror {
    pub fn new(existing: Vec<ExistingComment>) -> Self {
        Self {
            comments: existing,
            // High bit set: synthetic ids never collide with provider ids.
            next_synthetic_id: 1 << 62,
        }
    }

    pub fn comments(&self) -> &[ExistingComment] {
        &self.comments
    }

    /// Registers findings the transport is about to post for `skill`.
    pub fn absorb(&mut self, skill: &str, findings: &[Finding]) {
        for f in findings {
            let (path, line) = f
                .location
                .as_ref()
                .map(|l| (l.path.clone(), l.end_line()))
                .unwrap_or_default();
            self.comments.push(ExistingComment {
                id: self.next_synthetic_id,
                path,
                line,
                title: f.title.clone(),
                description: f.description.clone(),
                content_hash: generate_content_hash(&f.title, &f.description),
                thread_id: None,
                is_resolved: false,
                is_warden: true,
                skills: vec![skill.to_string()],
                body: None,
                comment_node_id: None,
            });
            self.next_synthetic_id += 1;
        }
    }
}
