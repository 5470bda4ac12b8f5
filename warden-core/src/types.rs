//! Core data model for the skill execution pipeline.
//!
//! These types are the normalized input/output of the pipeline stages:
//! event contexts in, prepared analysis units through the middle, skill
//! reports and duplicate actions out. Model-facing types (findings,
//! locations, fixes) serialize with camelCase keys because that is the
//! JSON contract the analysis prompt pins down.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use warden_llm::UsageStats;

/// Finding severity; the derived order is the canonical one
/// (`Critical < High < Medium < Low < Info`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A severity threshold that can also be switched off entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeverityThreshold {
    At(Severity),
    Off(OffMarker),
}

/// Serde helper so `"off"` round-trips as a plain string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffMarker {
    Off,
}

impl SeverityThreshold {
    pub const OFF: SeverityThreshold = SeverityThreshold::Off(OffMarker::Off);

    /// Whether a finding of `severity` meets this threshold.
    /// `Off` disables the comparison: nothing matches.
    pub fn includes(self, severity: Severity) -> bool {
        match self {
            SeverityThreshold::At(limit) => severity <= limit,
            SeverityThreshold::Off(_) => false,
        }
    }
}

/// Where a finding points inside the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Repo-relative path with forward slashes.
    pub path: String,
    /// 1-based first line.
    #[serde(alias = "start_line")]
    pub start_line: u32,
    /// Inclusive last line; defaults to `start_line`.
    #[serde(default, alias = "end_line", skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
}

impl Location {
    pub fn end_line(&self) -> u32 {
        self.end_line.unwrap_or(self.start_line)
    }

    pub fn is_multi_line(&self) -> bool {
        self.end_line() > self.start_line
    }
}

/// Machine-applicable fix attached to a finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedFix {
    pub description: String,
    /// Unified diff; must apply cleanly against the referenced file.
    pub diff: String,
}

/// A single reviewable issue produced by analysing one analysis unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Unique within one skill report.
    pub id: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, alias = "suggested_fix", skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<SuggestedFix>,
}

/// Why a file was excluded from analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipReason {
    /// A user-configured pattern declared the file skipped.
    Pattern,
    /// The builtin generated/vendored list matched.
    Builtin,
}

/// A changed file that was excluded from analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub filename: String,
    pub reason: SkipReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Final product of one skill over one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillReport {
    pub skill: String,
    /// One-line human summary.
    pub summary: String,
    /// Already deduplicated within the skill, sorted by `(path, start_line)`.
    pub findings: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageStats>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_files: Vec<SkippedFile>,
    /// Hunks whose analysis failed after retries/repair.
    #[serde(default)]
    pub failed_hunks: u32,
}

impl SkillReport {
    /// Count of findings at `severity`.
    pub fn count_at(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }
}

/// Provider-reported change status of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Removed,
    Modified,
    Renamed,
    Copied,
    Changed,
    Unchanged,
}

/// One changed file in the event, as reported by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    /// Repo-relative path with forward slashes.
    pub filename: String,
    pub status: FileStatus,
    #[serde(default)]
    pub additions: u32,
    #[serde(default)]
    pub deletions: u32,
    /// Unified diff for this file; absent for binary or oversized files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    /// Count of `@@` hunk headers in `patch`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<u32>,
}

/// Pull request metadata plus its changed-file set.
///
/// Synthetic/local runs use `number = 0` and `author = "local"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestContext {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub author: String,
    pub base_branch: String,
    pub head_branch: String,
    pub head_sha: String,
    pub files: Vec<FileChange>,
}

/// Kind of event that triggered this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PullRequest,
    Issues,
    IssueComment,
    PullRequestReview,
    PullRequestReviewComment,
    Schedule,
}

/// Everything the pipeline knows about the triggering event.
///
/// For `schedule` events the `pull_request` field carries the synthetic
/// file set assembled by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventContext {
    pub event_type: EventType,
    pub action: String,
    /// `owner/repo` slug.
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestContext>,
    /// Working tree the context expander reads from.
    pub repo_path: PathBuf,
}

impl EventContext {
    pub fn files(&self) -> &[FileChange] {
        self.pull_request
            .as_ref()
            .map(|pr| pr.files.as_slice())
            .unwrap_or(&[])
    }
}

/// A hunk of a unified diff (continuous block of changes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    /// Scope text after the closing `@@`, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    /// Raw hunk text including the `@@` header line.
    pub content: String,
    /// Diff body lines (`+`/`-`/` ` prefixed), header excluded.
    pub lines: Vec<String>,
}

impl DiffHunk {
    /// Last old-side line covered (inclusive).
    pub fn old_end(&self) -> u32 {
        self.old_start + self.old_count.saturating_sub(1)
    }

    /// Last new-side line covered (inclusive).
    pub fn new_end(&self) -> u32 {
        self.new_start + self.new_count.saturating_sub(1)
    }
}

/// One analysis unit: a hunk plus surrounding working-tree context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HunkWithContext {
    pub filename: String,
    pub hunk: DiffHunk,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
    /// Absolute line number of the first line of `context_before`
    /// (or of the hunk when there is no leading context).
    pub context_start_line: u32,
    /// Language tag derived from the file extension.
    pub language: String,
}

/// A file ready for analysis: per-hunk units or one whole-file unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedFile {
    pub filename: String,
    pub hunks: Vec<HunkWithContext>,
}

/// A review comment already present on the pull request.
///
/// Fetched by the transport; the core only reads these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExistingComment {
    pub id: u64,
    pub path: String,
    pub line: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// 8 hex chars parsed from the embedded marker, when known.
    #[serde(default)]
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub is_resolved: bool,
    #[serde(default)]
    pub is_warden: bool,
    /// Skills listed in the attribution line of a warden comment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_node_id: Option<String>,
}

/// How a duplicated finding maps onto an existing comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateActionKind {
    /// The match is one of our own comments: refresh its attribution.
    UpdateWarden,
    /// The match is somebody else's comment: react instead of reposting.
    ReactExternal,
}

/// How the deduplicator decided two items are the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Hash,
    Semantic,
}

/// Action the transport should take for a deduplicated finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateAction {
    #[serde(rename = "type")]
    pub kind: DuplicateActionKind,
    pub finding: Finding,
    pub existing_comment: ExistingComment,
    pub match_type: MatchType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_total_order() {
        assert!(Severity::Critical < Severity::High);
        assert!(Severity::High < Severity::Medium);
        assert!(Severity::Medium < Severity::Low);
        assert!(Severity::Low < Severity::Info);
    }

    #[test]
    fn severity_serde_round_trip() {
        for s in Severity::ALL {
            let json = serde_json::to_string(&s).unwrap();
            assert_eq!(json, format!("\"{}\"", s.as_str()));
            let back: Severity = serde_json::from_str(&json).unwrap();
            assert_eq!(back, s);
        }
    }

    #[test]
    fn threshold_off_matches_nothing() {
        for s in Severity::ALL {
            assert!(!SeverityThreshold::OFF.includes(s));
        }
    }

    #[test]
    fn threshold_at_high_includes_critical_and_high_only() {
        let t = SeverityThreshold::At(Severity::High);
        assert!(t.includes(Severity::Critical));
        assert!(t.includes(Severity::High));
        assert!(!t.includes(Severity::Medium));
        assert!(!t.includes(Severity::Info));
    }

    #[test]
    fn threshold_parses_off_and_severity() {
        let t: SeverityThreshold = serde_json::from_str("\"off\"").unwrap();
        assert_eq!(t, SeverityThreshold::OFF);
        let t: SeverityThreshold = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(t, SeverityThreshold::At(Severity::Medium));
    }

    #[test]
    fn location_end_line_defaults_to_start() {
        let loc = Location {
            path: "src/a.rs".into(),
            start_line: 7,
            end_line: None,
        };
        assert_eq!(loc.end_line(), 7);
        assert!(!loc.is_multi_line());
    }

    #[test]
    fn finding_parses_model_shaped_json() {
        let raw = r#"{
            "id": "sql-injection",
            "severity": "high",
            "title": "SQL injection",
            "description": "String-built query",
            "location": {"path": "src/db.ts", "startLine": 12, "endLine": 14},
            "suggestedFix": {"description": "parametrize", "diff": "--- a\n+++ b\n"}
        }"#;
        let f: Finding = serde_json::from_str(raw).unwrap();
        assert_eq!(f.severity, Severity::High);
        let loc = f.location.unwrap();
        assert_eq!((loc.start_line, loc.end_line()), (12, 14));
        assert!(f.suggested_fix.is_some());
    }

    #[test]
    fn hunk_end_lines_are_inclusive() {
        let h = DiffHunk {
            old_start: 5,
            old_count: 3,
            new_start: 10,
            new_count: 4,
            header: None,
            content: String::new(),
            lines: vec![],
        };
        assert_eq!(h.old_end(), 7);
        assert_eq!(h.new_end(), 13);
    }
}
