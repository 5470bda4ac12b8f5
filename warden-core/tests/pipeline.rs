//! End-to-end pipeline scenarios against the scripted LLM client.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use warden_core::dedup::marker::generate_content_hash;
use warden_core::render::ReviewVerdict;
use warden_core::review::{
    ProgressEvent, ProgressSink, RunnerOptions, ScheduleOptions, SkillSource, SkillTask,
};
use warden_core::skills::SkillDefinition;
use warden_core::types::{
    DuplicateActionKind, EventContext, EventType, ExistingComment, FileChange, FileStatus,
    MatchType, PullRequestContext, Severity,
};
use warden_core::{PipelineOptions, run_event};
use warden_llm::{LlmError, LlmService, ScriptStep, ScriptedClient};

const DB_PATCH: &str = "@@ -10,6 +10,6 @@ function query(id) {\n const base = 1;\n-const q = `select * from t where id = ${id}`;\n+const q = `select * from t where id = ${id}`; // TODO escape\n const r = run(q);\n audit(r);\n return r;\n done();";

const SQLI_FINDING_JSON: &str = r#"[{
    "id": "sql-injection",
    "severity": "high",
    "title": "SQL injection",
    "description": "The query interpolates user input directly.",
    "location": {"path": "src/db.ts", "startLine": 12}
}]"#;

fn sqli_skill() -> SkillDefinition {
    SkillDefinition {
        name: "sqli".into(),
        description: "Find SQL injection.".into(),
        prompt: "Report string-built SQL queries.".into(),
        model: None,
        allowed_tools: vec![],
        disallowed_tools: vec![],
    }
}

fn task(name: &str, source: SkillSource) -> SkillTask {
    SkillTask {
        name: name.into(),
        display_name: name.into(),
        fail_on: None,
        source,
        runner_options: RunnerOptions::default(),
    }
}

fn file(name: &str, patch: &str) -> FileChange {
    FileChange {
        filename: name.into(),
        status: FileStatus::Modified,
        additions: 1,
        deletions: 1,
        patch: Some(patch.into()),
        chunks: None,
    }
}

fn event(repo_path: &std::path::Path, files: Vec<FileChange>) -> EventContext {
    EventContext {
        event_type: EventType::PullRequest,
        action: "synchronize".into(),
        repository: "acme/app".into(),
        pull_request: Some(PullRequestContext {
            number: 12,
            title: "Query helper".into(),
            body: "Touches the db layer.".into(),
            author: "dev".into(),
            base_branch: "main".into(),
            head_branch: "feat/q".into(),
            head_sha: "abc123def456".into(),
            files,
        }),
        repo_path: repo_path.to_path_buf(),
    }
}

#[tokio::test]
async fn single_hunk_finding_flows_to_rendered_review() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(LlmService::scripted(ScriptedClient::always(
        SQLI_FINDING_JSON,
    )));

    let out = run_event(
        svc,
        event(dir.path(), vec![file("src/db.ts", DB_PATCH)]),
        vec![task("sqli", SkillSource::Resolved(Box::new(sqli_skill())))],
        vec![],
        PipelineOptions::default(),
        ProgressSink::disabled(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(out.results.len(), 1);
    let report = out.results[0].report.as_ref().unwrap();
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].severity, Severity::High);
    let loc = report.findings[0].location.as_ref().unwrap();
    assert_eq!(loc.path, "src/db.ts");
    assert_eq!(loc.start_line, 12);
    assert_eq!(report.failed_hunks, 0);
    assert!(report.summary.contains("found 1 finding(s) across 1 file(s)"));

    let (_, rendered) = &out.rendered[0];
    let review = rendered.review.as_ref().unwrap();
    assert_eq!(review.event, ReviewVerdict::RequestChanges);
    assert_eq!(review.comments.len(), 1);
    assert!(review.comments[0].body.contains("<!-- warden:v1:src/db.ts:12:"));
    assert!(out.duplicate_actions.is_empty());
}

#[tokio::test]
async fn lockfiles_are_skipped_without_llm_calls() {
    let dir = tempfile::tempdir().unwrap();
    let client = ScriptedClient::always("[]");
    let svc = Arc::new(LlmService::scripted(client));
    let (sink, mut rx) = ProgressSink::channel();

    let out = run_event(
        svc.clone(),
        event(
            dir.path(),
            vec![file("pnpm-lock.yaml", "@@ -1 +1 @@\n-a\n+b")],
        ),
        vec![task("sqli", SkillSource::Resolved(Box::new(sqli_skill())))],
        vec![],
        PipelineOptions::default(),
        sink,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let report = out.results[0].report.as_ref().unwrap();
    assert_eq!(report.skipped_files.len(), 1);
    assert_eq!(report.skipped_files[0].filename, "pnpm-lock.yaml");
    assert!(report.findings.is_empty());
    assert_eq!(svc.scripted_review().calls(), 0);

    let mut saw_skipped = false;
    while let Ok(ev) = rx.try_recv() {
        if matches!(ev, ProgressEvent::SkillSkipped { .. }) {
            saw_skipped = true;
        }
    }
    assert!(saw_skipped);
}

#[tokio::test]
async fn rate_limit_retries_once_then_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let client = ScriptedClient::new(vec![
        ScriptStep::Fail(LlmError::RateLimited {
            retry_after_secs: None,
        }),
        ScriptStep::Text(SQLI_FINDING_JSON.into()),
    ]);
    let svc = Arc::new(LlmService::scripted(client));
    let (sink, mut rx) = ProgressSink::channel();

    let out = run_event(
        svc,
        event(dir.path(), vec![file("src/db.ts", DB_PATCH)]),
        vec![task("sqli", SkillSource::Resolved(Box::new(sqli_skill())))],
        vec![],
        PipelineOptions::default(),
        sink,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let report = out.results[0].report.as_ref().unwrap();
    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.failed_hunks, 0);

    let mut retry_attempts = vec![];
    while let Ok(ev) = rx.try_recv() {
        if let ProgressEvent::Retry { attempt, .. } = ev {
            retry_attempts.push(attempt);
        }
    }
    assert_eq!(retry_attempts, vec![1]);
}

#[tokio::test]
async fn hash_duplicate_updates_existing_warden_comment() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(LlmService::scripted(ScriptedClient::always(
        SQLI_FINDING_JSON,
    )));

    let existing = ExistingComment {
        id: 99,
        path: "src/db.ts".into(),
        line: 12,
        title: "SQL injection".into(),
        description: "The query interpolates user input directly.".into(),
        content_hash: generate_content_hash(
            "SQL injection",
            "The query interpolates user input directly.",
        ),
        thread_id: Some("thread-1".into()),
        is_resolved: false,
        is_warden: true,
        skills: vec!["older-skill".into()],
        body: None,
        comment_node_id: None,
    };

    let out = run_event(
        svc,
        event(dir.path(), vec![file("src/db.ts", DB_PATCH)]),
        vec![task("sqli", SkillSource::Resolved(Box::new(sqli_skill())))],
        vec![existing],
        PipelineOptions::default(),
        ProgressSink::disabled(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let report = out.results[0].report.as_ref().unwrap();
    assert!(report.findings.is_empty(), "duplicate must not be re-posted");
    assert_eq!(out.duplicate_actions.len(), 1);
    let action = &out.duplicate_actions[0];
    assert_eq!(action.kind, DuplicateActionKind::UpdateWarden);
    assert_eq!(action.match_type, MatchType::Hash);
    assert_eq!(action.existing_comment.id, 99);
    // Re-produced finding: the existing thread must not be stale.
    assert!(out.stale_comments.is_empty());
}

#[tokio::test]
async fn second_skill_dedups_against_first_via_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(LlmService::scripted(ScriptedClient::always(
        SQLI_FINDING_JSON,
    )));

    let out = run_event(
        svc,
        event(dir.path(), vec![file("src/db.ts", DB_PATCH)]),
        vec![
            task("sqli", SkillSource::Resolved(Box::new(sqli_skill()))),
            task("sqli-again", SkillSource::Resolved(Box::new(sqli_skill()))),
        ],
        vec![],
        PipelineOptions::default(),
        ProgressSink::disabled(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let first = out.results[0].report.as_ref().unwrap();
    let second = out.results[1].report.as_ref().unwrap();
    assert_eq!(first.findings.len(), 1);
    assert!(second.findings.is_empty());
    assert_eq!(out.duplicate_actions.len(), 1);
    assert_eq!(out.duplicate_actions[0].kind, DuplicateActionKind::UpdateWarden);
}

#[tokio::test]
async fn failed_resolution_never_cancels_peers() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(LlmService::scripted(ScriptedClient::always(
        SQLI_FINDING_JSON,
    )));

    let out = run_event(
        svc,
        event(dir.path(), vec![file("src/db.ts", DB_PATCH)]),
        vec![
            task(
                "broken",
                SkillSource::Failed("skill not found: broken".into()),
            ),
            task("sqli", SkillSource::Resolved(Box::new(sqli_skill()))),
        ],
        vec![],
        PipelineOptions {
            schedule: ScheduleOptions {
                skill_concurrency: 2,
                batch_delay_ms: 0,
            },
            ..PipelineOptions::default()
        },
        ProgressSink::disabled(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(out.results.len(), 2);
    assert_eq!(out.results[0].name, "broken");
    assert!(out.results[0].report.is_none());
    assert!(out.results[0].error.as_ref().unwrap().contains("not found"));
    assert_eq!(out.results[1].name, "sqli");
    assert_eq!(out.results[1].report.as_ref().unwrap().findings.len(), 1);
}

#[tokio::test]
async fn auth_failure_terminates_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(LlmService::scripted(ScriptedClient::new(vec![
        ScriptStep::Fail(LlmError::Auth {
            provider: "openai",
            status: 401,
        }),
    ])));

    let err = run_event(
        svc,
        event(dir.path(), vec![file("src/db.ts", DB_PATCH)]),
        vec![task("sqli", SkillSource::Resolved(Box::new(sqli_skill())))],
        vec![],
        PipelineOptions::default(),
        ProgressSink::disabled(),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, warden_core::errors::Error::Llm(ref e) if e.is_auth()));
}

#[tokio::test]
async fn abort_produces_no_partial_output() {
    let dir = tempfile::tempdir().unwrap();
    let svc = Arc::new(LlmService::scripted(ScriptedClient::always(
        SQLI_FINDING_JSON,
    )));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = run_event(
        svc,
        event(dir.path(), vec![file("src/db.ts", DB_PATCH)]),
        vec![task("sqli", SkillSource::Resolved(Box::new(sqli_skill())))],
        vec![],
        PipelineOptions::default(),
        ProgressSink::disabled(),
        cancel,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, warden_core::errors::Error::Aborted));
}

#[tokio::test]
async fn unparsable_output_degrades_to_failed_hunk_after_repair() {
    let dir = tempfile::tempdir().unwrap();
    // Review reply has a JSON-ish region, so the repair path runs; the
    // repair reply is garbage too, so the hunk fails.
    let svc = Arc::new(LlmService::scripted(ScriptedClient::new(vec![
        ScriptStep::Text("I think { this is not valid".into()),
        ScriptStep::Text("still not json".into()),
    ])));

    let out = run_event(
        svc,
        event(dir.path(), vec![file("src/db.ts", DB_PATCH)]),
        vec![task("sqli", SkillSource::Resolved(Box::new(sqli_skill())))],
        vec![],
        PipelineOptions::default(),
        ProgressSink::disabled(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let report = out.results[0].report.as_ref().unwrap();
    assert!(report.findings.is_empty());
    assert_eq!(report.failed_hunks, 1);
    assert!(out.results[0].error.is_none());
}
