//! File preparation: classify every changed file, parse and coalesce its
//! patch, and expand hunks with working-tree context.
//!
//! Output is two parallel lists: analysis units for the file analyser and
//! skip records that end up in the skill report. The classifier's glob
//! cache and the file-content cache live inside the preparer, so each
//! pipeline run owns its caches.

pub mod classify;
pub mod context;

use tracing::debug;

use crate::parser::coalesce::{CoalesceOptions, coalesce_hunks};
use crate::parser::{looks_like_binary_patch, parse_patch};
use crate::types::{
    DiffHunk, EventContext, FileChange, FileStatus, HunkWithContext, PreparedFile, SkipReason,
    SkippedFile,
};
use classify::{Classification, FileClassifier, FileMode, UserPattern};
use context::{DEFAULT_CONTEXT_LINES, FileContentCache, expand_hunk};

/// Options controlling preparation for one skill.
#[derive(Debug, Clone)]
pub struct PrepareOptions {
    pub user_patterns: Vec<UserPattern>,
    pub coalesce: CoalesceOptions,
    pub context_lines: u32,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            user_patterns: Vec::new(),
            coalesce: CoalesceOptions::default(),
            context_lines: DEFAULT_CONTEXT_LINES,
        }
    }
}

/// Turns an event's changed files into analysis units.
pub struct FilePreparer {
    classifier: FileClassifier,
    cache: FileContentCache,
}

impl FilePreparer {
    pub fn new() -> Self {
        Self {
            classifier: FileClassifier::new(),
            cache: FileContentCache::new(64),
        }
    }

    /// Prepares every changed file of the event.
    pub async fn prepare(
        &mut self,
        event: &EventContext,
        opts: &PrepareOptions,
    ) -> (Vec<PreparedFile>, Vec<SkippedFile>) {
        let mut prepared = Vec::new();
        let mut skipped = Vec::new();

        for change in event.files() {
            match self.classifier.classify(&change.filename, &opts.user_patterns) {
                Classification::Skip(record) => {
                    debug!(
                        "prepare: skip {} ({:?})",
                        record.filename, record.reason
                    );
                    skipped.push(record);
                }
                Classification::Analyse(mode) => {
                    // Binary patches carry nothing a model can review.
                    if change.patch.as_deref().is_some_and(looks_like_binary_patch) {
                        debug!("prepare: skip {} (binary patch)", change.filename);
                        skipped.push(SkippedFile {
                            filename: change.filename.clone(),
                            reason: SkipReason::Builtin,
                            pattern: None,
                        });
                        continue;
                    }
                    if let Some(file) = self.prepare_one(event, change, mode, opts).await {
                        prepared.push(file);
                    }
                }
            }
        }

        debug!(
            "prepare: files={} skipped={}",
            prepared.len(),
            skipped.len()
        );
        (prepared, skipped)
    }

    async fn prepare_one(
        &mut self,
        event: &EventContext,
        change: &FileChange,
        mode: FileMode,
        opts: &PrepareOptions,
    ) -> Option<PreparedFile> {
        let treated_as_new = change.status == FileStatus::Added && change.patch.is_none();
        let hunks: Vec<DiffHunk> = if mode == FileMode::WholeFile || treated_as_new {
            let absolute = event.repo_path.join(&change.filename);
            let lines = self.cache.lines(&absolute).await?;
            vec![synthetic_whole_file_hunk(&lines)]
        } else {
            let patch = change.patch.as_deref()?;
            coalesce_hunks(parse_patch(patch), &opts.coalesce)
        };

        if hunks.is_empty() {
            return None;
        }

        let mut expanded: Vec<HunkWithContext> = Vec::with_capacity(hunks.len());
        for hunk in hunks {
            expanded.push(
                expand_hunk(
                    &mut self.cache,
                    &event.repo_path,
                    &change.filename,
                    hunk,
                    opts.context_lines,
                )
                .await,
            );
        }

        Some(PreparedFile {
            filename: change.filename.clone(),
            hunks: expanded,
        })
    }
}

impl Default for FilePreparer {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the `@@ -0,0 +1,N @@` synthetic hunk covering a whole file.
/// Empty files produce `@@ -0,0 +0,0 @@` with no lines.
fn synthetic_whole_file_hunk(lines: &[String]) -> DiffHunk {
    let count = lines.len() as u32;
    let header_line = if count == 0 {
        "@@ -0,0 +0,0 @@".to_string()
    } else {
        format!("@@ -0,0 +1,{count} @@")
    };

    let mut content = header_line.clone();
    let mut body = Vec::with_capacity(lines.len());
    for line in lines {
        let prefixed = format!("+{line}");
        content.push('\n');
        content.push_str(&prefixed);
        body.push(prefixed);
    }

    DiffHunk {
        old_start: 0,
        old_count: 0,
        new_start: if count == 0 { 0 } else { 1 },
        new_count: count,
        header: None,
        content,
        lines: body,
    }
}
