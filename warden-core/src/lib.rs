//! Public entry for the warden skill-execution pipeline.
//!
//! Single high-level function to run the whole pipeline for one event:
//!
//! 1) **Schedule** — run every skill task (skill-level concurrency, one
//!    report per skill; one skill's failure never cancels peers).
//! 2) **Dedup** — per skill, match findings against the PR's existing
//!    comments (content hash, then optional LLM semantic pass); findings a
//!    skill will post join the in-memory mirror so later skills see them.
//! 3) **Stale** — warden threads whose findings were not re-produced are
//!    marked for resolution (capped per run).
//! 4) **Render** — GitHub-shaped payloads (inline comments with hidden
//!    markers, summary comment, review verdict) for the transport to post.
//!
//! The pipeline runs to completion for one event; it never posts anything
//! itself and never reads terminals. Cancellation is cooperative via one
//! `CancellationToken` threaded through every layer; only authentication
//! failures and abort terminate a run early.

pub mod dedup;
pub mod errors;
pub mod parser;
pub mod prepare;
pub mod render;
pub mod review;
pub mod runlog;
pub mod skills;
pub mod state;
pub mod telemetry;
pub mod types;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use warden_llm::{LlmService, UsageStats};

use dedup::{CommentMirror, DedupOptions, dedup_findings, stale::resolve_stale};
use errors::WardenResult;
use render::{RenderOptions, RenderedReport, render_skill_report};
use review::{ProgressSink, ScheduleOptions, SkillTask, SkillTaskResult, run_skills};
use runlog::{RunLogWriter, RunSummaryRecord};
use types::{DuplicateAction, EventContext, ExistingComment, SkippedFile};

/// Options for one whole pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub schedule: ScheduleOptions,
    pub dedup: DedupOptions,
    pub render: RenderOptions,
    /// Write the JSONL run log under the state directory.
    pub write_run_log: bool,
}

/// Everything a transport needs after one event.
#[derive(Debug)]
pub struct PipelineOutput {
    /// Per-task outcomes, in input order.
    pub results: Vec<SkillTaskResult>,
    /// Rendered payloads for each task that produced a report, keyed by
    /// position in `results`.
    pub rendered: Vec<(usize, RenderedReport)>,
    /// Duplicate actions across all skills.
    pub duplicate_actions: Vec<DuplicateAction>,
    /// Warden threads to resolve.
    pub stale_comments: Vec<ExistingComment>,
}

/// Runs the full pipeline for one event.
///
/// `existing_comments` is the transport's snapshot of comments already on
/// the pull request (tagged `is_warden` with parsed content hashes where
/// known). The returned payloads are not posted by the core.
pub async fn run_event(
    svc: Arc<LlmService>,
    event: EventContext,
    tasks: Vec<SkillTask>,
    existing_comments: Vec<ExistingComment>,
    opts: PipelineOptions,
    sink: ProgressSink,
    cancel: CancellationToken,
) -> WardenResult<PipelineOutput> {
    let started = Instant::now();
    let event = Arc::new(event);

    let run_log = if opts.write_run_log {
        match RunLogWriter::create(&state::state_dir(), &event.repo_path, Utc::now()).await {
            Ok(writer) => Some(writer),
            Err(e) => {
                warn!("runlog: disabled, could not create log file: {e}");
                None
            }
        }
    } else {
        None
    };

    // ---- 1) run every skill ----
    let mut results = run_skills(
        svc.clone(),
        event.clone(),
        tasks,
        &opts.schedule,
        sink.clone(),
        cancel.clone(),
    )
    .await?;

    // ---- 2) dedup per skill against the growing mirror ----
    let mut mirror = CommentMirror::new(existing_comments);
    let mut duplicate_actions: Vec<DuplicateAction> = Vec::new();
    let mut all_findings = Vec::new();
    let mut all_skipped: Vec<SkippedFile> = Vec::new();
    let mut rendered: Vec<(usize, RenderedReport)> = Vec::new();

    for (index, result) in results.iter_mut().enumerate() {
        let Some(report) = result.report.as_mut() else {
            continue;
        };
        all_findings.extend(report.findings.iter().cloned());
        all_skipped.extend(report.skipped_files.iter().cloned());

        let dedup_opts = DedupOptions {
            hash_only: opts.dedup.hash_only,
            current_skill: Some(report.skill.clone()),
        };
        let total_before = report.findings.len();
        let outcome = dedup_findings(
            Some(svc.as_ref()),
            std::mem::take(&mut report.findings),
            mirror.comments(),
            &dedup_opts,
            &cancel,
        )
        .await;

        debug!(
            "pipeline: {} deduped {} → {} new, {} duplicate(s)",
            report.skill,
            total_before,
            outcome.new_findings.len(),
            outcome.duplicate_actions.len()
        );

        mirror.absorb(&report.skill, &outcome.new_findings);
        report.findings = outcome.new_findings;
        duplicate_actions.extend(outcome.duplicate_actions);

        let render_opts = RenderOptions {
            total_findings: Some(total_before),
            ..opts.render.clone()
        };
        rendered.push((index, render_skill_report(report, &render_opts)));

        if let Some(writer) = &run_log {
            if let Err(e) = writer.append_report(report).await {
                warn!("runlog: failed to append report: {e}");
            }
        }
    }

    // ---- 3) stale threads under the analysed-file scope ----
    let diff_files: BTreeSet<String> = event
        .files()
        .iter()
        .map(|f| f.filename.clone())
        .collect();
    let analysed = analysed_scope(&event, &all_skipped);
    let stale_comments = resolve_stale(mirror.comments(), &all_findings, &diff_files, &analysed);

    // ---- 4) run summary ----
    let mut usage = UsageStats::default();
    let mut findings_total = 0usize;
    let mut failed_hunks = 0u32;
    for result in &results {
        if let Some(report) = &result.report {
            if let Some(u) = &report.usage {
                usage.add(u);
            }
            findings_total += report.findings.len();
            failed_hunks += report.failed_hunks;
        }
    }
    let duration_ms = started.elapsed().as_millis() as u64;
    info!(
        "pipeline: {} skill(s), {} new finding(s), {} duplicate(s), {} stale, {} ms",
        results.len(),
        findings_total,
        duplicate_actions.len(),
        stale_comments.len(),
        duration_ms
    );

    if let Some(writer) = &run_log {
        let record = RunSummaryRecord {
            record: "summary",
            skills: results.len(),
            findings: findings_total,
            failed_hunks,
            duration_ms,
            usage,
        };
        if let Err(e) = writer.append_summary(&record).await {
            warn!("runlog: failed to append summary: {e}");
        }
    }

    Ok(PipelineOutput {
        results,
        rendered,
        duplicate_actions,
        stale_comments,
    })
}

/// Files the preparer processed this run: every changed file minus the
/// skipped ones.
fn analysed_scope(event: &EventContext, skipped: &[SkippedFile]) -> BTreeSet<String> {
    let skipped_names: BTreeSet<&str> = skipped.iter().map(|s| s.filename.as_str()).collect();
    event
        .files()
        .iter()
        .map(|f| f.filename.clone())
        .filter(|name| !skipped_names.contains(name.as_str()))
        .collect()
}
