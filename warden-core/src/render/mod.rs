//! Rendering: turn a `SkillReport` into GitHub-shaped payloads.
//!
//! The core never posts anything; the transport consumes these shapes.
//! Inline comment bodies end with the attribution line and the hidden
//! marker so future runs can dedup against them.

use serde::Serialize;

use crate::dedup::marker::{format_attribution, generate_content_hash, generate_marker};
use crate::types::{Finding, Severity, SeverityThreshold, SkillReport};

/// Review verdict, in the transport's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReviewVerdict {
    #[serde(rename = "REQUEST_CHANGES")]
    RequestChanges,
    #[serde(rename = "COMMENT")]
    Comment,
}

/// One inline review comment.
#[derive(Debug, Clone, Serialize)]
pub struct InlineComment {
    pub path: String,
    /// Anchor line (the finding's last line).
    pub line: u32,
    pub side: &'static str,
    /// Set only for multi-line findings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_side: Option<&'static str>,
    pub body: String,
}

/// The review payload: verdict plus its inline comments.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedReview {
    pub event: ReviewVerdict,
    pub comments: Vec<InlineComment>,
}

/// Everything the transport posts for one skill.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<RenderedReview>,
    pub summary_comment: String,
}

/// Options for [`render_skill_report`].
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Emit GitHub suggestion blocks from suggested fixes.
    pub include_suggestions: bool,
    /// Cap on rendered findings (after the severity filter).
    pub max_findings: Option<usize>,
    /// Group the summary's finding list by file.
    pub group_by_file: bool,
    /// Severity filter for commenting; `off` renders nothing inline.
    pub comment_on: SeverityThreshold,
    /// Link target for the hidden-findings note.
    pub check_run_url: Option<String>,
    /// Total findings before filtering, for the hidden-findings note.
    pub total_findings: Option<usize>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            include_suggestions: true,
            max_findings: None,
            group_by_file: true,
            comment_on: SeverityThreshold::At(Severity::Info),
            check_run_url: None,
            total_findings: None,
        }
    }
}

/// Renders one skill report into its GitHub payloads.
pub fn render_skill_report(report: &SkillReport, opts: &RenderOptions) -> RenderedReport {
    // Filter by threshold, cap, sort severity-ascending (critical first).
    let mut rendered: Vec<&Finding> = report
        .findings
        .iter()
        .filter(|f| opts.comment_on.includes(f.severity))
        .collect();
    rendered.sort_by_key(|f| f.severity);
    if let Some(cap) = opts.max_findings {
        rendered.truncate(cap);
    }

    let comments: Vec<InlineComment> = rendered
        .iter()
        .filter_map(|f| inline_comment(f, &report.skill, opts))
        .collect();

    let verdict = if rendered
        .iter()
        .any(|f| matches!(f.severity, Severity::Critical | Severity::High))
    {
        ReviewVerdict::RequestChanges
    } else {
        ReviewVerdict::Comment
    };

    let review = (!rendered.is_empty()).then(|| RenderedReview {
        event: verdict,
        comments,
    });

    RenderedReport {
        review,
        summary_comment: summary_comment(report, &rendered, opts),
    }
}

/// Body: bold title, description, optional suggestion, attribution,
/// hidden marker.
fn inline_comment(finding: &Finding, skill: &str, opts: &RenderOptions) -> Option<InlineComment> {
    let loc = finding.location.as_ref()?;
    let line = loc.end_line();

    let mut body = format!("**{}**\n\n{}\n", finding.title.trim(), finding.description.trim());

    if opts.include_suggestions {
        if let Some(fix) = &finding.suggested_fix {
            if let Some(suggestion) = suggestion_block(&fix.diff) {
                body.push('\n');
                if !fix.description.trim().is_empty() {
                    body.push_str(&format!("{}\n\n", fix.description.trim()));
                }
                body.push_str(&suggestion);
            }
        }
    }

    let hash = generate_content_hash(&finding.title, &finding.description);
    body.push('\n');
    body.push_str(&format_attribution(&[skill.to_string()]));
    body.push('\n');
    body.push_str(&generate_marker(&loc.path, line, &hash));

    Some(InlineComment {
        path: loc.path.clone(),
        line,
        side: "RIGHT",
        start_line: loc.is_multi_line().then_some(loc.start_line),
        start_side: loc.is_multi_line().then_some("RIGHT"),
        body,
    })
}

/// GitHub suggestion block holding the fix's added lines. A diff with no
/// `+` lines (pure deletion) renders an empty suggestion.
fn suggestion_block(diff: &str) -> Option<String> {
    let mut replacement: Vec<&str> = Vec::new();
    let mut saw_hunk_line = false;
    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") || line.starts_with("@@") {
            continue;
        }
        if let Some(rest) = line.strip_prefix('+') {
            replacement.push(rest);
            saw_hunk_line = true;
        } else if line.starts_with('-') {
            saw_hunk_line = true;
        }
    }
    if !saw_hunk_line {
        return None;
    }
    Some(format!("```suggestion\n{}\n```\n", replacement.join("\n")))
}

/// The summary comment: header, severity table, findings (grouped or
/// flat), hidden-findings note, stats footer.
fn summary_comment(report: &SkillReport, rendered: &[&Finding], opts: &RenderOptions) -> String {
    let mut s = format!("## Warden review: {}\n\n{}\n", report.skill, report.summary);

    if !report.findings.is_empty() {
        s.push_str("\n| Severity | Count |\n|---|---|\n");
        for sev in Severity::ALL {
            let n = report.count_at(sev);
            if n > 0 {
                s.push_str(&format!("| {} | {} |\n", sev.as_str(), n));
            }
        }
    }

    if !rendered.is_empty() {
        s.push('\n');
        if opts.group_by_file {
            let mut by_file: Vec<(&str, Vec<&Finding>)> = Vec::new();
            for f in rendered {
                let path = f
                    .location
                    .as_ref()
                    .map(|l| l.path.as_str())
                    .unwrap_or("(no location)");
                match by_file.iter_mut().find(|(p, _)| *p == path) {
                    Some((_, group)) => group.push(f),
                    None => by_file.push((path, vec![f])),
                }
            }
            for (path, group) in by_file {
                s.push_str(&format!("### `{}`\n", path));
                for f in group {
                    s.push_str(&finding_line_item(f));
                }
                s.push('\n');
            }
        } else {
            for f in rendered {
                s.push_str(&finding_line_item(f));
            }
        }
    }

    if let Some(total) = opts.total_findings {
        if total > rendered.len() {
            let hidden = total - rendered.len();
            match &opts.check_run_url {
                Some(url) => s.push_str(&format!(
                    "\n_{hidden} more finding(s) not shown — see the [full report]({url})._\n"
                )),
                None => s.push_str(&format!("\n_{hidden} more finding(s) not shown._\n")),
            }
        }
    }

    s.push_str(&stats_footer(report));
    s
}

fn finding_line_item(f: &Finding) -> String {
    let location = f
        .location
        .as_ref()
        .map(|l| format!(" ({}:{})", l.path, l.start_line))
        .unwrap_or_default();
    format!("- **{}** `{}`{}\n", f.severity, f.title.trim(), location)
}

fn stats_footer(report: &SkillReport) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(ms) = report.duration_ms {
        parts.push(format!("{:.1}s", ms as f64 / 1000.0));
    }
    if let Some(usage) = &report.usage {
        parts.push(format!(
            "{} in / {} out tokens",
            usage.input_tokens, usage.output_tokens
        ));
        if usage.cost_usd > 0.0 {
            parts.push(format!("${:.4}", usage.cost_usd));
        }
    }
    if report.failed_hunks > 0 {
        parts.push(format!("{} failed hunk(s)", report.failed_hunks));
    }
    if !report.skipped_files.is_empty() {
        parts.push(format!("{} skipped file(s)", report.skipped_files.len()));
    }
    if parts.is_empty() {
        return String::new();
    }
    format!("\n<sub>{}</sub>\n", parts.join(" · "))
}
