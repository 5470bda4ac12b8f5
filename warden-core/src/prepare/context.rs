//! Hunk context expansion: read the working-tree file and attach the lines
//! surrounding a hunk, so the model sees the edit in situ.
//!
//! File contents are cached per pipeline (bounded, insertion-order
//! eviction) because one file's hunks all read the same content. Missing
//! and binary files produce empty context instead of errors.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::types::{DiffHunk, HunkWithContext};

/// Bounded cache of working-tree file contents, keyed by absolute path.
///
/// `None` entries record files that were missing or binary so repeated
/// hunks do not retry the read.
pub struct FileContentCache {
    entries: HashMap<PathBuf, Option<Arc<Vec<String>>>>,
    order: VecDeque<PathBuf>,
    capacity: usize,
}

impl FileContentCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Lines of the file at `path`, read once per pipeline.
    pub async fn lines(&mut self, path: &Path) -> Option<Arc<Vec<String>>> {
        if let Some(cached) = self.entries.get(path) {
            return cached.clone();
        }

        let loaded = match tokio::fs::read(path).await {
            Ok(bytes) if bytes.contains(&0) => {
                debug!("context: {} looks binary, no context", path.display());
                None
            }
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Some(Arc::new(
                    text.lines().map(str::to_string).collect::<Vec<_>>(),
                )),
                Err(_) => None,
            },
            Err(_) => None,
        };

        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(path.to_path_buf());
        self.entries.insert(path.to_path_buf(), loaded.clone());
        loaded
    }
}

/// Default number of context lines on each side of a hunk.
pub const DEFAULT_CONTEXT_LINES: u32 = 10;

/// Expands one hunk with `context_lines` of surrounding working-tree
/// content. The file is resolved as `repo_path/filename`.
pub async fn expand_hunk(
    cache: &mut FileContentCache,
    repo_path: &Path,
    filename: &str,
    hunk: DiffHunk,
    context_lines: u32,
) -> HunkWithContext {
    let language = language_for(filename).to_string();
    let absolute = repo_path.join(filename);

    let Some(lines) = cache.lines(&absolute).await else {
        let context_start_line = hunk.new_start.max(1);
        return HunkWithContext {
            filename: filename.to_string(),
            hunk,
            context_before: Vec::new(),
            context_after: Vec::new(),
            context_start_line,
            language,
        };
    };

    let total = lines.len() as u32;
    let first_changed = hunk.new_start.max(1);
    let last_changed = hunk.new_end().min(total.max(1));

    // Leading context: [first_changed - context_lines, first_changed - 1].
    let before_start = first_changed.saturating_sub(context_lines).max(1);
    let context_before: Vec<String> = (before_start..first_changed)
        .filter(|n| *n <= total)
        .map(|n| lines[(n - 1) as usize].clone())
        .collect();

    // Trailing context: [last_changed + 1, last_changed + context_lines].
    let after_end = last_changed.saturating_add(context_lines).min(total);
    let context_after: Vec<String> = ((last_changed + 1)..=after_end)
        .filter(|n| *n >= 1 && *n <= total)
        .map(|n| lines[(n - 1) as usize].clone())
        .collect();

    let context_start_line = if context_before.is_empty() {
        first_changed
    } else {
        before_start
    };

    HunkWithContext {
        filename: filename.to_string(),
        hunk,
        context_before,
        context_after,
        context_start_line,
        language,
    }
}

/// Language tag for the fenced code blocks, derived from the extension.
pub fn language_for(filename: &str) -> &'static str {
    let ext = filename.rsplit('.').next().unwrap_or("");
    match ext {
        "rs" => "rust",
        "ts" | "mts" | "cts" => "typescript",
        "tsx" => "tsx",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "jsx",
        "py" => "python",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "swift" => "swift",
        "rb" => "ruby",
        "php" => "php",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "scala" => "scala",
        "dart" => "dart",
        "sh" | "bash" => "bash",
        "sql" => "sql",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "md" => "markdown",
        "tf" => "hcl",
        "proto" => "protobuf",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DiffHunk;
    use pretty_assertions::assert_eq;

    fn hunk_at(new_start: u32, new_count: u32) -> DiffHunk {
        DiffHunk {
            old_start: new_start,
            old_count: new_count,
            new_start,
            new_count,
            header: None,
            content: format!("@@ -{new_start},{new_count} +{new_start},{new_count} @@"),
            lines: vec![],
        }
    }

    async fn write_numbered(dir: &Path, name: &str, count: usize) {
        let body: String = (1..=count).map(|i| format!("line {i}\n")).collect();
        tokio::fs::write(dir.join(name), body).await.unwrap();
    }

    #[tokio::test]
    async fn context_is_clamped_to_file_bounds() {
        let dir = tempfile::tempdir().unwrap();
        write_numbered(dir.path(), "a.rs", 30).await;
        let mut cache = FileContentCache::new(8);

        let h = expand_hunk(&mut cache, dir.path(), "a.rs", hunk_at(3, 2), 5).await;
        assert_eq!(h.context_before, vec!["line 1", "line 2"]);
        assert_eq!(h.context_start_line, 1);
        assert_eq!(h.context_after.len(), 5); // lines 5..=9
        assert_eq!(h.context_after[0], "line 5");
        assert_eq!(h.language, "rust");

        let tail = expand_hunk(&mut cache, dir.path(), "a.rs", hunk_at(28, 3), 5).await;
        assert_eq!(tail.context_before.len(), 5); // 23..=27
        assert!(tail.context_after.is_empty());
    }

    #[tokio::test]
    async fn missing_and_binary_files_get_empty_context() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("blob.bin"), [0u8, 159, 146, 150])
            .await
            .unwrap();
        let mut cache = FileContentCache::new(8);

        let gone = expand_hunk(&mut cache, dir.path(), "gone.ts", hunk_at(5, 1), 4).await;
        assert!(gone.context_before.is_empty());
        assert!(gone.context_after.is_empty());
        assert_eq!(gone.context_start_line, 5);

        let bin = expand_hunk(&mut cache, dir.path(), "blob.bin", hunk_at(1, 1), 4).await;
        assert!(bin.context_before.is_empty());
        assert!(bin.context_after.is_empty());
    }

    #[tokio::test]
    async fn cache_reads_each_file_once() {
        let dir = tempfile::tempdir().unwrap();
        write_numbered(dir.path(), "a.ts", 10).await;
        let mut cache = FileContentCache::new(8);

        let first = expand_hunk(&mut cache, dir.path(), "a.ts", hunk_at(2, 1), 2).await;
        // Mutate on disk; the cached copy must win for later hunks.
        tokio::fs::write(dir.path().join("a.ts"), "changed\n")
            .await
            .unwrap();
        let second = expand_hunk(&mut cache, dir.path(), "a.ts", hunk_at(2, 1), 2).await;
        assert_eq!(first.context_before, second.context_before);
    }

    #[test]
    fn language_mapping_covers_common_extensions() {
        assert_eq!(language_for("src/db.ts"), "typescript");
        assert_eq!(language_for("x/y.py"), "python");
        assert_eq!(language_for("Makefile"), "");
    }
}
