//! Thin CLI entry: wire env config, load the event, run the pipeline.
//!
//! Usage: `warden <event.json> [existing-comments.json]`
//!
//! - `WARDEN_SKILLS`  — comma-separated skill names, resolved from the
//!   repository's local skill directories.
//! - `WARDEN_FAIL_ON` — severity threshold ("critical".."info" or "off")
//!   that flips the exit code to 2.
//! - `WARDEN_LLM_*`   — model profiles (see warden-llm).
//!
//! Exit codes: 0 success, 1 fatal, 2 findings at or above the threshold,
//! 130 aborted.

use std::error::Error;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use warden_core::errors::Error as WardenError;
use warden_core::review::{ProgressSink, RunnerOptions, RunnerOverrides, SkillSource, SkillTask};
use warden_core::skills::find_local_skill;
use warden_core::types::{EventContext, ExistingComment, SeverityThreshold};
use warden_core::{PipelineOptions, PipelineOutput, run_event};
use warden_llm::LlmService;

mod skill_file;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env when present.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            error!("fatal: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<ExitCode, Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let Some(event_path) = args.next() else {
        eprintln!("usage: warden <event.json> [existing-comments.json]");
        return Ok(ExitCode::from(1));
    };

    let event: EventContext = serde_json::from_slice(&std::fs::read(&event_path)?)?;
    let existing: Vec<ExistingComment> = match args.next() {
        Some(path) => serde_json::from_slice(&std::fs::read(path)?)?,
        None => Vec::new(),
    };

    let tasks = resolve_tasks(&event.repo_path)?;
    if tasks.is_empty() {
        info!("no skills configured (set WARDEN_SKILLS); nothing to do");
        return Ok(ExitCode::SUCCESS);
    }

    let fail_on = fail_on_from_env()?;
    let svc = Arc::new(LlmService::from_env()?);

    // Ctrl-C aborts every in-flight request and pending sleep.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let opts = PipelineOptions {
        write_run_log: true,
        ..PipelineOptions::default()
    };

    let output = match run_event(
        svc,
        event,
        tasks,
        existing,
        opts,
        ProgressSink::disabled(),
        cancel,
    )
    .await
    {
        Ok(output) => output,
        Err(WardenError::Aborted) => return Ok(ExitCode::from(130)),
        Err(e) => return Err(Box::new(e)),
    };

    print_output(&output)?;
    Ok(exit_code_for(&output, fail_on))
}

/// Resolves `WARDEN_SKILLS` names against the repository's local skill
/// directories; unresolvable names become failed tasks (recorded, not
/// fatal).
fn resolve_tasks(repo_path: &Path) -> Result<Vec<SkillTask>, Box<dyn Error>> {
    let Ok(names) = std::env::var("WARDEN_SKILLS") else {
        return Ok(Vec::new());
    };

    let overrides = runner_overrides_from_env();
    let mut tasks = Vec::new();
    for name in names.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let source = match find_local_skill(repo_path, name) {
            Some(dir) => match skill_file::load_skill(&dir, name) {
                Ok(def) => SkillSource::Resolved(Box::new(def)),
                Err(e) => SkillSource::Failed(format!("failed to load skill '{name}': {e}")),
            },
            None => SkillSource::Failed(format!("skill not found: {name}")),
        };
        let mut runner_options = RunnerOptions::default();
        runner_options.apply(&overrides);
        tasks.push(SkillTask {
            name: name.to_string(),
            display_name: name.to_string(),
            fail_on: None,
            source,
            runner_options,
        });
    }
    Ok(tasks)
}

/// Environment sits at the bottom of the option precedence; trigger
/// config (when a transport supplies one) is applied on top of these.
fn runner_overrides_from_env() -> RunnerOverrides {
    fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
        std::env::var(name).ok()?.trim().parse().ok()
    }
    RunnerOverrides {
        parallel: None,
        concurrency: env_parsed("WARDEN_CONCURRENCY"),
        batch_delay_ms: env_parsed("WARDEN_BATCH_DELAY_MS"),
        file_concurrency: env_parsed("WARDEN_FILE_CONCURRENCY"),
        context_lines: env_parsed("WARDEN_CONTEXT_LINES"),
        coalesce_enabled: env_parsed("WARDEN_COALESCE"),
    }
}

fn fail_on_from_env() -> Result<SeverityThreshold, Box<dyn Error>> {
    match std::env::var("WARDEN_FAIL_ON") {
        Ok(raw) if !raw.trim().is_empty() => {
            let threshold: SeverityThreshold =
                serde_json::from_value(serde_json::Value::String(raw.trim().to_lowercase()))?;
            Ok(threshold)
        }
        _ => Ok(SeverityThreshold::OFF),
    }
}

/// The transport payloads go to stdout as one JSON document.
fn print_output(output: &PipelineOutput) -> Result<(), Box<dyn Error>> {
    let rendered: Vec<serde_json::Value> = output
        .rendered
        .iter()
        .map(|(index, report)| {
            serde_json::json!({
                "task": output.results[*index].name,
                "payload": report,
            })
        })
        .collect();
    let doc = serde_json::json!({
        "rendered": rendered,
        "duplicate_actions": output.duplicate_actions,
        "stale_comments": output.stale_comments,
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

fn exit_code_for(output: &PipelineOutput, fail_on: SeverityThreshold) -> ExitCode {
    let tripped = output.results.iter().any(|result| {
        let threshold = result.fail_on.unwrap_or(fail_on);
        result.report.as_ref().is_some_and(|report| {
            report
                .findings
                .iter()
                .any(|f| threshold.includes(f.severity))
        })
    });
    if tripped {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}
