//! Skill runner: prepare the event's files, analyse them with bounded
//! concurrency, and aggregate one `SkillReport`.
//!
//! Files run in chunked batches: take up to `concurrency`, await all,
//! sleep `batch_delay_ms`, continue. Abort produces no partial report.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use warden_llm::{LlmService, UsageStats};

use crate::errors::{Error, WardenResult};
use crate::prepare::{FilePreparer, PrepareOptions};
use crate::review::analyze::{AnalyzeOptions, FileAnalysis, analyse_file};
use crate::review::events::ProgressSink;
use crate::skills::SkillDefinition;
use crate::types::{EventContext, Finding, Severity, SkillReport};

/// Options for one skill run.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Analyse files concurrently at all.
    pub parallel: bool,
    /// Concurrent files per skill (batch size).
    pub concurrency: usize,
    /// Pause between batch starts.
    pub batch_delay_ms: u64,
    /// Hunk-level options.
    pub analyze: AnalyzeOptions,
    /// Preparation options (patterns, coalescing, context).
    pub prepare: PrepareOptions,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            concurrency: 5,
            batch_delay_ms: 0,
            analyze: AnalyzeOptions::default(),
            prepare: PrepareOptions::default(),
        }
    }
}

/// Partial runner options from an outer layer (trigger config, CLI,
/// environment). Merging walks each named field explicitly; precedence is
/// the caller's: apply environment first, then CLI, then config defaults,
/// then the trigger, so the trigger wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunnerOverrides {
    pub parallel: Option<bool>,
    pub concurrency: Option<usize>,
    pub batch_delay_ms: Option<u64>,
    pub file_concurrency: Option<usize>,
    pub context_lines: Option<u32>,
    pub coalesce_enabled: Option<bool>,
}

impl RunnerOptions {
    /// Applies every set field of `overrides` onto `self`.
    pub fn apply(&mut self, overrides: &RunnerOverrides) {
        if let Some(v) = overrides.parallel {
            self.parallel = v;
        }
        if let Some(v) = overrides.concurrency {
            self.concurrency = v;
        }
        if let Some(v) = overrides.batch_delay_ms {
            self.batch_delay_ms = v;
        }
        if let Some(v) = overrides.file_concurrency {
            self.analyze.file_concurrency = v;
        }
        if let Some(v) = overrides.context_lines {
            self.prepare.context_lines = v;
        }
        if let Some(v) = overrides.coalesce_enabled {
            self.prepare.coalesce.enabled = v;
        }
    }
}

/// Runs one skill over the event and returns its report.
pub async fn run_skill(
    svc: Arc<LlmService>,
    event: Arc<EventContext>,
    skill: Arc<SkillDefinition>,
    opts: &RunnerOptions,
    sink: ProgressSink,
    cancel: CancellationToken,
) -> WardenResult<SkillReport> {
    let started = Instant::now();

    let mut preparer = FilePreparer::new();
    let (prepared, skipped) = preparer.prepare(&event, &opts.prepare).await;
    debug!(
        "runner[{}]: prepared={} skipped={}",
        skill.name,
        prepared.len(),
        skipped.len()
    );

    let batch_size = if opts.parallel {
        opts.concurrency.max(1)
    } else {
        1
    };

    let mut analyses: Vec<FileAnalysis> = Vec::with_capacity(prepared.len());
    let mut pending = prepared.into_iter().peekable();

    while pending.peek().is_some() {
        if cancel.is_cancelled() {
            return Err(Error::Aborted);
        }

        let mut set: JoinSet<WardenResult<FileAnalysis>> = JoinSet::new();
        for file in pending.by_ref().take(batch_size) {
            set.spawn(analyse_file(
                svc.clone(),
                event.clone(),
                skill.clone(),
                file,
                opts.analyze,
                sink.clone(),
                cancel.clone(),
            ));
        }

        while let Some(joined) = set.join_next().await {
            let analysis = joined.map_err(|e| Error::Validation(format!("join error: {e}")))??;
            analyses.push(analysis);
        }

        if opts.batch_delay_ms > 0 && pending.peek().is_some() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Aborted),
                _ = tokio::time::sleep(Duration::from_millis(opts.batch_delay_ms)) => {}
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(Error::Aborted);
    }

    // Aggregate: usage element-wise, findings sorted by (path, start_line).
    let mut usage = UsageStats::default();
    let mut findings: Vec<Finding> = Vec::new();
    let mut failed_hunks = 0u32;
    for analysis in analyses {
        usage.add(&analysis.usage);
        failed_hunks += analysis.failed_hunks;
        findings.extend(analysis.findings);
    }
    findings.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    dedup_by_location(&mut findings);

    let summary = summarize(&skill.name, &findings);
    info!("runner[{}]: {}", skill.name, summary);

    Ok(SkillReport {
        skill: skill.name.clone(),
        summary,
        findings,
        metadata: None,
        duration_ms: Some(started.elapsed().as_millis() as u64),
        usage: Some(usage),
        skipped_files: skipped,
        failed_hunks,
    })
}

/// Stable ordering key; findings without a location sort first. Relative
/// order within the same location is preserved (stable sort).
fn sort_key(f: &Finding) -> (String, u32) {
    match &f.location {
        Some(loc) => (loc.path.clone(), loc.start_line),
        None => (String::new(), 0),
    }
}

/// A report carries at most one finding per `(path, start_line)`; the
/// first in discovery order wins. Location-less findings all survive.
fn dedup_by_location(findings: &mut Vec<Finding>) {
    let mut seen: std::collections::HashSet<(String, u32)> = std::collections::HashSet::new();
    findings.retain(|f| match &f.location {
        Some(loc) => seen.insert((loc.path.clone(), loc.start_line)),
        None => true,
    });
}

/// `"<skill>: found N finding(s) across M file(s) (C critical, H high, …)"`
fn summarize(skill: &str, findings: &[Finding]) -> String {
    let files: BTreeSet<&str> = findings
        .iter()
        .filter_map(|f| f.location.as_ref())
        .map(|l| l.path.as_str())
        .collect();

    let mut s = format!(
        "{}: found {} finding(s) across {} file(s)",
        skill,
        findings.len(),
        files.len()
    );

    let counts: Vec<String> = Severity::ALL
        .iter()
        .filter_map(|sev| {
            let n = findings.iter().filter(|f| f.severity == *sev).count();
            (n > 0).then(|| format!("{} {}", n, sev.as_str()))
        })
        .collect();
    if !counts.is_empty() {
        s.push_str(&format!(" ({})", counts.join(", ")));
    }
    s
}
