//! Multi-skill scheduler: run a list of skill tasks over one event.
//!
//! Skills run in chunked batches of `skill_concurrency` (default: one at a
//! time) with an optional delay between batch starts. One skill's failure
//! is recorded on its own result and never cancels its peers; only
//! authentication failures and the abort signal stop the whole run.
//! Results preserve input order regardless of completion order.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use warden_llm::LlmService;

use crate::errors::{Error, WardenResult};
use crate::review::events::{ProgressEvent, ProgressSink};
use crate::review::runner::{RunnerOptions, run_skill};
use crate::skills::SkillDefinition;
use crate::types::{EventContext, SeverityThreshold, SkillReport};

/// Lazily resolved skill for one task.
///
/// Resolution happens before the runner starts; a failed resolution is
/// recorded on the task's result without touching its peers.
pub enum SkillSource {
    Resolved(Box<SkillDefinition>),
    /// Resolution already failed (loader or remote fetch); the message is
    /// surfaced as the task's error.
    Failed(String),
}

/// One schedulable unit of work.
pub struct SkillTask {
    pub name: String,
    pub display_name: String,
    /// Severity at or above which the caller should fail the check run.
    pub fail_on: Option<SeverityThreshold>,
    pub source: SkillSource,
    pub runner_options: RunnerOptions,
}

/// Terminal outcome for one task, in input order.
#[derive(Debug)]
pub struct SkillTaskResult {
    pub name: String,
    pub report: Option<SkillReport>,
    pub fail_on: Option<SeverityThreshold>,
    pub error: Option<String>,
}

/// Scheduler-level options.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleOptions {
    pub skill_concurrency: usize,
    pub batch_delay_ms: u64,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            skill_concurrency: 1,
            batch_delay_ms: 0,
        }
    }
}

/// Runs every task to a terminal outcome (or until abort).
pub async fn run_skills(
    svc: Arc<LlmService>,
    event: Arc<EventContext>,
    tasks: Vec<SkillTask>,
    opts: &ScheduleOptions,
    sink: ProgressSink,
    cancel: CancellationToken,
) -> WardenResult<Vec<SkillTaskResult>> {
    let total = tasks.len();
    let mut slots: Vec<Option<SkillTaskResult>> = Vec::with_capacity(total);
    slots.resize_with(total, || None);

    let batch_size = opts.skill_concurrency.max(1);
    let mut queue = tasks.into_iter().enumerate().peekable();

    while queue.peek().is_some() {
        if cancel.is_cancelled() {
            return Err(Error::Aborted);
        }

        let mut set: JoinSet<(usize, WardenResult<SkillTaskResult>)> = JoinSet::new();
        for (index, task) in queue.by_ref().take(batch_size) {
            let svc = svc.clone();
            let event = event.clone();
            let sink = sink.clone();
            let cancel = cancel.clone();
            set.spawn(async move {
                let result = run_one(svc, event, task, sink, cancel).await;
                (index, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            let (index, result) =
                joined.map_err(|e| Error::Validation(format!("join error: {e}")))?;
            slots[index] = Some(result?);
        }

        if opts.batch_delay_ms > 0 && queue.peek().is_some() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Aborted),
                _ = tokio::time::sleep(Duration::from_millis(opts.batch_delay_ms)) => {}
            }
        }
    }

    Ok(slots.into_iter().flatten().collect())
}

/// One task to its terminal outcome. Fatal errors (auth/abort) propagate;
/// everything else lands in `result.error`.
async fn run_one(
    svc: Arc<LlmService>,
    event: Arc<EventContext>,
    task: SkillTask,
    sink: ProgressSink,
    cancel: CancellationToken,
) -> WardenResult<SkillTaskResult> {
    sink.emit(ProgressEvent::SkillStart {
        skill: task.display_name.clone(),
    });

    let skill = match task.source {
        SkillSource::Resolved(def) => Arc::new(*def),
        SkillSource::Failed(reason) => {
            warn!("schedule: {} failed to resolve: {}", task.name, reason);
            sink.emit(ProgressEvent::SkillError {
                skill: task.display_name.clone(),
                error: reason.clone(),
            });
            return Ok(SkillTaskResult {
                name: task.name,
                report: None,
                fail_on: task.fail_on,
                error: Some(reason),
            });
        }
    };

    match run_skill(
        svc,
        event,
        skill,
        &task.runner_options,
        sink.clone(),
        cancel,
    )
    .await
    {
        Ok(report) => {
            let analysed_nothing =
                report.findings.is_empty() && report.usage.map_or(true, |u| u.output_tokens == 0);
            if analysed_nothing && report.failed_hunks == 0 {
                sink.emit(ProgressEvent::SkillSkipped {
                    skill: task.display_name.clone(),
                    reason: "no analysable changes".into(),
                });
            } else {
                sink.emit(ProgressEvent::SkillComplete {
                    skill: task.display_name.clone(),
                    findings: report.findings.len(),
                    duration_ms: report.duration_ms.unwrap_or(0),
                });
            }
            info!("schedule: {} done", task.name);
            Ok(SkillTaskResult {
                name: task.name,
                report: Some(report),
                fail_on: task.fail_on,
                error: None,
            })
        }
        Err(e) if e.is_fatal_for_run() => Err(e),
        Err(e) => {
            warn!("schedule: {} errored: {}", task.name, e);
            sink.emit(ProgressEvent::SkillError {
                skill: task.display_name.clone(),
                error: e.to_string(),
            });
            Ok(SkillTaskResult {
                name: task.name,
                report: None,
                fail_on: task.fail_on,
                error: Some(e.to_string()),
            })
        }
    }
}
