//! File analyser: run every hunk of one prepared file through the LLM and
//! aggregate the results.
//!
//! Hunks run with bounded concurrency (semaphore + join set). A hunk that
//! fails after retries and the extraction-repair fallback degrades into a
//! `failed_hunks` increment; only authentication and abort propagate.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use warden_llm::{ChatRequest, LlmError, LlmService, RetryObserver, UsageStats};

use crate::errors::{Error, WardenResult};
use crate::review::events::{ProgressEvent, ProgressSink};
use crate::review::extract::{
    Extraction, REPAIR_TAIL_CHARS, build_repair_prompt, extract_findings,
    truncate_for_llm_fallback,
};
use crate::review::prompt::build_prompts;
use crate::skills::SkillDefinition;
use crate::types::{EventContext, Finding, HunkWithContext, PreparedFile};

/// Options for one file's analysis.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzeOptions {
    /// Concurrent hunks per file.
    pub file_concurrency: usize,
    /// Char threshold for the large-prompt notification.
    pub large_prompt_char_threshold: usize,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            file_concurrency: 5,
            large_prompt_char_threshold: crate::review::prompt::LARGE_PROMPT_CHAR_THRESHOLD,
        }
    }
}

/// Aggregated result for one file.
#[derive(Debug, Clone)]
pub struct FileAnalysis {
    pub filename: String,
    pub findings: Vec<Finding>,
    pub usage: UsageStats,
    pub failed_hunks: u32,
}

/// Outcome of one hunk.
enum HunkOutcome {
    Findings(Vec<Finding>, UsageStats),
    Failed(UsageStats),
}

/// Bridges retry callbacks into the progress channel.
struct RetryBridge {
    sink: ProgressSink,
    skill: String,
    filename: String,
}

impl RetryObserver for RetryBridge {
    fn on_retry(&self, attempt: usize, delay_ms: u64, error: &str) {
        self.sink.emit(ProgressEvent::Retry {
            skill: self.skill.clone(),
            filename: self.filename.clone(),
            attempt,
            delay_ms,
            error: error.to_string(),
        });
    }
}

/// Analyses every hunk of `file`; returns aggregated findings and usage.
pub async fn analyse_file(
    svc: Arc<LlmService>,
    event: Arc<EventContext>,
    skill: Arc<SkillDefinition>,
    file: PreparedFile,
    opts: AnalyzeOptions,
    sink: ProgressSink,
    cancel: CancellationToken,
) -> WardenResult<FileAnalysis> {
    let total_hunks = file.hunks.len();
    let sem = Arc::new(Semaphore::new(opts.file_concurrency.max(1)));
    let mut set: JoinSet<WardenResult<HunkOutcome>> = JoinSet::new();

    for (index, unit) in file.hunks.into_iter().enumerate() {
        let svc = svc.clone();
        let event = event.clone();
        let skill = skill.clone();
        let sink = sink.clone();
        let cancel = cancel.clone();
        let sem = sem.clone();
        let filename = file.filename.clone();

        set.spawn(async move {
            let _permit = sem
                .acquire_owned()
                .await
                .map_err(|_| Error::Aborted)?;
            if cancel.is_cancelled() {
                return Err(Error::Aborted);
            }
            analyse_hunk(
                &svc, &event, &skill, &filename, unit, index, total_hunks, &opts, &sink, &cancel,
            )
            .await
        });
    }

    let mut findings: Vec<Finding> = Vec::new();
    let mut usage = UsageStats::default();
    let mut failed_hunks = 0u32;
    let mut completed = 0usize;

    while let Some(joined) = set.join_next().await {
        let outcome = joined.map_err(|e| Error::Validation(format!("join error: {e}")))??;
        completed += 1;
        match outcome {
            HunkOutcome::Findings(mut f, u) => {
                usage.add(&u);
                findings.append(&mut f);
            }
            HunkOutcome::Failed(u) => {
                usage.add(&u);
                failed_hunks += 1;
            }
        }
        sink.emit(ProgressEvent::FileUpdate {
            skill: skill.name.clone(),
            filename: file.filename.clone(),
            completed_hunks: completed,
            total_hunks,
        });
    }

    dedup_within_file(&mut findings);

    Ok(FileAnalysis {
        filename: file.filename,
        findings,
        usage,
        failed_hunks,
    })
}

#[allow(clippy::too_many_arguments)]
async fn analyse_hunk(
    svc: &LlmService,
    event: &EventContext,
    skill: &SkillDefinition,
    filename: &str,
    unit: HunkWithContext,
    index: usize,
    total_hunks: usize,
    opts: &AnalyzeOptions,
    sink: &ProgressSink,
    cancel: &CancellationToken,
) -> WardenResult<HunkOutcome> {
    let prompts = build_prompts(skill, event, &unit);

    let dump_context = event
        .pull_request
        .as_ref()
        .map(|pr| pr.head_sha.as_str())
        .unwrap_or("local");
    crate::telemetry::dump_prompt(
        dump_context,
        &skill.name,
        filename,
        index,
        "review",
        &prompts.system,
        &prompts.user,
    );

    if prompts.char_count() > opts.large_prompt_char_threshold {
        sink.emit(ProgressEvent::LargePrompt {
            skill: skill.name.clone(),
            filename: filename.to_string(),
            estimated_tokens: prompts.estimated_tokens(),
        });
        warn!(
            "analyse: large prompt for {} hunk {} (~{} tokens), submitting anyway",
            filename,
            index,
            prompts.estimated_tokens()
        );
    }

    sink.emit(ProgressEvent::HunkStart {
        skill: skill.name.clone(),
        filename: filename.to_string(),
        hunk_index: index,
        total_hunks,
    });

    let bridge = RetryBridge {
        sink: sink.clone(),
        skill: skill.name.clone(),
        filename: filename.to_string(),
    };

    let mut request = ChatRequest::new(&prompts.system, &prompts.user);
    request.model_override = skill.model.as_deref();

    let mut usage = UsageStats::default();
    let outcome = match svc.generate_review(&request, cancel, Some(&bridge)).await {
        Ok(out) => {
            usage.add(&out.usage);
            match extract_findings(&out.text) {
                Extraction::Success(f) => Some(f),
                Extraction::Failure { error, preview } => {
                    debug!(
                        "analyse: extraction failed for {} hunk {}: {} (preview: {})",
                        filename, index, error, preview
                    );
                    repair_findings(svc, &out.text, cancel, &mut usage).await?
                }
            }
        }
        Err(e) => {
            classify_hunk_error(e)?;
            None
        }
    };

    let result = match outcome {
        Some(raw_findings) => {
            let findings = clamp_locations(raw_findings, filename, &unit);
            sink.emit(ProgressEvent::HunkComplete {
                skill: skill.name.clone(),
                filename: filename.to_string(),
                hunk_index: index,
                findings: findings.len(),
            });
            HunkOutcome::Findings(findings, usage)
        }
        None => {
            warn!("analyse: hunk {} of {} failed", index, filename);
            sink.emit(ProgressEvent::HunkComplete {
                skill: skill.name.clone(),
                filename: filename.to_string(),
                hunk_index: index,
                findings: 0,
            });
            HunkOutcome::Failed(usage)
        }
    };
    Ok(result)
}

/// Auth and abort terminate the run; every other LLM error degrades to a
/// failed hunk.
fn classify_hunk_error(e: LlmError) -> WardenResult<()> {
    if e.is_auth() || e.is_abort() {
        return Err(e.into());
    }
    debug!("analyse: hunk llm call failed: {e}");
    Ok(())
}

/// Best-effort extraction repair on the fast profile.
///
/// `Ok(None)` means the hunk stays failed; fatal errors propagate.
async fn repair_findings(
    svc: &LlmService,
    raw: &str,
    cancel: &CancellationToken,
    usage: &mut UsageStats,
) -> WardenResult<Option<Vec<Finding>>> {
    if !raw.contains(['[', '{']) {
        // No JSON-like region: the repair contract requires one.
        return Ok(None);
    }

    let truncated = truncate_for_llm_fallback(raw, REPAIR_TAIL_CHARS);
    let (system, user) = build_repair_prompt(&truncated);
    let request = ChatRequest::new(&system, &user);

    match svc.generate_fast(&request, cancel, None).await {
        Ok(out) => {
            usage.add(&out.usage);
            match extract_findings(&out.text) {
                Extraction::Success(f) => {
                    debug!("analyse: repair recovered {} finding(s)", f.len());
                    Ok(Some(f))
                }
                Extraction::Failure { error, .. } => {
                    debug!("analyse: repair failed too: {error}");
                    Ok(None)
                }
            }
        }
        Err(e) => {
            classify_hunk_error(e)?;
            Ok(None)
        }
    }
}

/// Forces locations onto this file and into this hunk's range.
///
/// A reported start line inside the hunk-plus-context window is clamped
/// into the hunk's new-line range; outside the window the location is
/// dropped entirely.
fn clamp_locations(findings: Vec<Finding>, filename: &str, unit: &HunkWithContext) -> Vec<Finding> {
    let hunk = &unit.hunk;
    let window_lo = unit.context_start_line.min(hunk.new_start).max(1);
    let window_hi = hunk.new_end() + unit.context_after.len() as u32;
    let hunk_lo = hunk.new_start.max(1);
    let hunk_hi = hunk.new_end().max(hunk_lo);

    findings
        .into_iter()
        .map(|mut f| {
            if let Some(loc) = f.location.take() {
                if loc.start_line >= window_lo && loc.start_line <= window_hi {
                    let start = loc.start_line.clamp(hunk_lo, hunk_hi);
                    let end = loc.end_line().clamp(start, hunk_hi);
                    f.location = Some(crate::types::Location {
                        path: filename.to_string(),
                        start_line: start,
                        end_line: (end > start).then_some(end),
                    });
                } else {
                    debug!(
                        "analyse: dropping out-of-window location {}:{}",
                        loc.path, loc.start_line
                    );
                }
            }
            f
        })
        .collect()
}

/// Collapses findings sharing `(id, path, start_line)` to the first seen.
fn dedup_within_file(findings: &mut Vec<Finding>) {
    let mut seen: HashSet<(String, String, u32)> = HashSet::new();
    findings.retain(|f| {
        let key = (
            f.id.clone(),
            f.location.as_ref().map(|l| l.path.clone()).unwrap_or_default(),
            f.location.as_ref().map(|l| l.start_line).unwrap_or(0),
        );
        seen.insert(key)
    });
}
