//! Prompt builder for one analysis unit.
//!
//! The system prompt carries the skill's instructions verbatim plus the
//! fixed JSON output contract. The user prompt shows the PR metadata, the
//! changed-file list, and the hunk with its surrounding context in fenced
//! blocks. Char counts are reported so callers can flag oversized prompts
//! before submitting them anyway.

use crate::skills::SkillDefinition;
use crate::types::{EventContext, HunkWithContext};

/// Prompts above this size trigger a `LargePrompt` event (~10k tokens at
/// the chars/4 estimate) but are still submitted.
pub const LARGE_PROMPT_CHAR_THRESHOLD: usize = 40_000;

/// Final prompt pair for one analysis unit.
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    pub system: String,
    pub user: String,
}

impl BuiltPrompt {
    pub fn char_count(&self) -> usize {
        self.system.chars().count() + self.user.chars().count()
    }

    /// Rough token estimate: chars / 4.
    pub fn estimated_tokens(&self) -> usize {
        self.char_count() / 4
    }
}

/// The output contract appended to every system prompt. Findings must come
/// back as a bare JSON array so the extractor stays trivial on the happy
/// path.
const OUTPUT_CONTRACT: &str = r#"Respond with a JSON array of finding objects. Each object has the keys:
{"id", "severity", "confidence"?, "title", "description", "location"?, "suggestedFix"?}
- "severity" is one of: "critical", "high", "medium", "low", "info".
- "location" is {"path", "startLine", "endLine"?} with 1-based lines inside the shown hunk.
- "suggestedFix" is {"description", "diff"} where "diff" is a unified diff.
- "id" is a short stable slug, unique per finding.
If there are no findings, return []. Return only the JSON array, no prose."#;

/// Builds the prompt pair for one hunk-with-context.
pub fn build_prompts(
    skill: &SkillDefinition,
    event: &EventContext,
    unit: &HunkWithContext,
) -> BuiltPrompt {
    BuiltPrompt {
        system: build_system_prompt(skill),
        user: build_user_prompt(event, unit),
    }
}

/// System prompt: reviewer role, the skill verbatim, the JSON contract.
pub fn build_system_prompt(skill: &SkillDefinition) -> String {
    let mut s = String::with_capacity(skill.prompt.len() + skill.description.len() + 512);
    s.push_str("You are a code reviewer running the skill \"");
    s.push_str(&skill.name);
    s.push_str("\".\n\n");
    if !skill.description.is_empty() {
        s.push_str(&skill.description);
        s.push_str("\n\n");
    }
    s.push_str(&skill.prompt);
    s.push_str("\n\n");
    s.push_str(OUTPUT_CONTRACT);
    s
}

/// User prompt: PR metadata, changed files, and the formatted hunk block.
pub fn build_user_prompt(event: &EventContext, unit: &HunkWithContext) -> String {
    let mut s = String::new();

    if let Some(pr) = &event.pull_request {
        s.push_str("# Pull Request\n");
        s.push_str(&format!("Title: {}\n", pr.title));
        if !pr.body.trim().is_empty() {
            s.push_str(&format!("Body:\n{}\n", pr.body.trim()));
        }
        s.push('\n');
        s.push_str("# Changed Files\n");
        for file in &pr.files {
            s.push_str(&format!("- {}\n", file.filename));
        }
        s.push('\n');
    }

    s.push_str(&format_hunk_block(unit));
    s
}

/// The `## File / ## Hunk / ### Context` block for one unit.
fn format_hunk_block(unit: &HunkWithContext) -> String {
    let hunk = &unit.hunk;
    let lang = &unit.language;
    let mut s = String::new();

    s.push_str(&format!("## File: {}\n", unit.filename));
    s.push_str(&format!("## Language: {}\n", lang));
    s.push_str(&format!(
        "## Hunk: lines {}-{}\n",
        hunk.new_start,
        hunk.new_end()
    ));
    if let Some(header) = &hunk.header {
        s.push_str(&format!("## Scope: {}\n", header));
    }
    s.push('\n');

    if !unit.context_before.is_empty() {
        let first = unit.context_start_line;
        let last = first + unit.context_before.len() as u32 - 1;
        s.push_str(&format!("### Context Before (lines {first}-{last})\n"));
        s.push_str(&fenced(lang, &unit.context_before));
        s.push('\n');
    }

    s.push_str("### Changes\n");
    s.push_str("```diff\n");
    s.push_str(&hunk.content);
    s.push_str("\n```\n");

    if !unit.context_after.is_empty() {
        let first = hunk.new_end() + 1;
        let last = first + unit.context_after.len() as u32 - 1;
        s.push('\n');
        s.push_str(&format!("### Context After (lines {first}-{last})\n"));
        s.push_str(&fenced(lang, &unit.context_after));
    }

    s
}

fn fenced(lang: &str, lines: &[String]) -> String {
    format!("```{}\n{}\n```\n", lang, lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiffHunk, EventType, FileChange, FileStatus, PullRequestContext};

    fn skill() -> SkillDefinition {
        SkillDefinition {
            name: "sql-injection".into(),
            description: "Finds injectable SQL.".into(),
            prompt: "Look for string-built queries.".into(),
            model: None,
            allowed_tools: vec![],
            disallowed_tools: vec![],
        }
    }

    fn unit() -> HunkWithContext {
        HunkWithContext {
            filename: "src/db.ts".into(),
            hunk: DiffHunk {
                old_start: 10,
                old_count: 2,
                new_start: 10,
                new_count: 3,
                header: Some("function query() {".into()),
                content: "@@ -10,2 +10,3 @@ function query() {\n-a\n+b\n+c".into(),
                lines: vec!["-a".into(), "+b".into(), "+c".into()],
            },
            context_before: vec!["import db from 'db';".into()],
            context_after: vec!["export default query;".into()],
            context_start_line: 9,
            language: "typescript".into(),
        }
    }

    fn event() -> EventContext {
        EventContext {
            event_type: EventType::PullRequest,
            action: "synchronize".into(),
            repository: "acme/app".into(),
            pull_request: Some(PullRequestContext {
                number: 12,
                title: "Add query helper".into(),
                body: "Adds a helper.".into(),
                author: "dev".into(),
                base_branch: "main".into(),
                head_branch: "feat/q".into(),
                head_sha: "abc".into(),
                files: vec![FileChange {
                    filename: "src/db.ts".into(),
                    status: FileStatus::Modified,
                    additions: 2,
                    deletions: 1,
                    patch: None,
                    chunks: None,
                }],
            }),
            repo_path: ".".into(),
        }
    }

    #[test]
    fn system_prompt_embeds_skill_and_contract() {
        let sys = build_system_prompt(&skill());
        assert!(sys.contains("Finds injectable SQL."));
        assert!(sys.contains("Look for string-built queries."));
        assert!(sys.contains("return []"));
        assert!(sys.contains("\"suggestedFix\"?"));
    }

    #[test]
    fn user_prompt_has_pr_files_and_hunk_block() {
        let user = build_user_prompt(&event(), &unit());
        assert!(user.contains("Title: Add query helper"));
        assert!(user.contains("- src/db.ts"));
        assert!(user.contains("## File: src/db.ts"));
        assert!(user.contains("## Language: typescript"));
        assert!(user.contains("## Hunk: lines 10-12"));
        assert!(user.contains("## Scope: function query() {"));
        assert!(user.contains("### Context Before (lines 9-9)"));
        assert!(user.contains("### Context After (lines 13-13)"));
        assert!(user.contains("```diff\n@@ -10,2 +10,3 @@"));
    }

    #[test]
    fn token_estimate_is_chars_over_four() {
        let p = BuiltPrompt {
            system: "x".repeat(100),
            user: "y".repeat(100),
        };
        assert_eq!(p.char_count(), 200);
        assert_eq!(p.estimated_tokens(), 50);
    }
}
