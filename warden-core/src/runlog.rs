//! Per-run JSONL log under `<state_dir>/runs/`.
//!
//! One JSON object per skill report plus a closing summary record, one per
//! line. Best-effort: logging failures are reported to the caller once at
//! construction and otherwise must not interfere with the run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::errors::WardenResult;
use crate::types::{SkillReport, UsageStats};

/// `<state_dir>/runs/<basename(cwd)>_<iso-with-colons-replaced>.jsonl`
pub fn run_log_path(state_dir: &Path, cwd: &Path, started_at: DateTime<Utc>) -> PathBuf {
    let base = cwd
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("run")
        .to_string();
    let stamp = started_at
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        .replace(':', "-");
    state_dir.join("runs").join(format!("{base}_{stamp}.jsonl"))
}

/// Closing record of a run log.
#[derive(Debug, Serialize)]
pub struct RunSummaryRecord {
    pub record: &'static str,
    pub skills: usize,
    pub findings: usize,
    pub failed_hunks: u32,
    pub duration_ms: u64,
    pub usage: UsageStats,
}

/// Append-only JSONL writer for one run.
pub struct RunLogWriter {
    path: PathBuf,
}

impl RunLogWriter {
    /// Creates the log file (and `runs/` directory) eagerly so permission
    /// problems surface before any skill runs.
    pub async fn create(state_dir: &Path, cwd: &Path, started_at: DateTime<Utc>) -> WardenResult<Self> {
        let path = run_log_path(state_dir, cwd, started_at);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, b"").await?;
        info!("runlog: writing to {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append_report(&self, report: &SkillReport) -> WardenResult<()> {
        self.append_json(report).await
    }

    pub async fn append_summary(&self, summary: &RunSummaryRecord) -> WardenResult<()> {
        self.append_json(summary).await
    }

    async fn append_json<T: Serialize>(&self, value: &T) -> WardenResult<()> {
        use tokio::io::AsyncWriteExt;

        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn path_replaces_colons_and_uses_basename() {
        let at = Utc.with_ymd_and_hms(2026, 7, 31, 12, 30, 5).unwrap();
        let p = run_log_path(Path::new("/state"), Path::new("/home/dev/my-app"), at);
        let name = p.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("my-app_2026-07-31T12-30-05"));
        assert!(!name.contains(':'));
        assert!(p.starts_with("/state/runs"));
    }

    #[tokio::test]
    async fn appends_reports_then_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = RunLogWriter::create(tmp.path(), Path::new("/x/app"), Utc::now())
            .await
            .unwrap();

        let report = SkillReport {
            skill: "sqli".into(),
            summary: "s".into(),
            findings: vec![],
            metadata: None,
            duration_ms: Some(10),
            usage: None,
            skipped_files: vec![],
            failed_hunks: 0,
        };
        writer.append_report(&report).await.unwrap();
        writer
            .append_summary(&RunSummaryRecord {
                record: "summary",
                skills: 1,
                findings: 0,
                failed_hunks: 0,
                duration_ms: 12,
                usage: UsageStats::default(),
            })
            .await
            .unwrap();

        let text = tokio::fs::read_to_string(writer.path()).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"skill\":\"sqli\""));
        assert!(lines[1].contains("\"record\":\"summary\""));
    }
}
