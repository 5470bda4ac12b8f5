//! File classification: user patterns first, then the builtin
//! generated/vendored list, then the per-hunk default.
//!
//! Glob support: `**/` (zero or more whole path segments), `**` (anything),
//! `*` (anything but `/`), `?` (one char, not `/`). Compiled patterns are
//! cached per classifier instance, never globally.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{SkipReason, SkippedFile};

/// How a file should be analysed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileMode {
    PerHunk,
    WholeFile,
    Skip,
}

/// A user-configured classification rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPattern {
    pub pattern: String,
    pub mode: FileMode,
}

/// Lockfiles, minified/bundled artifacts, vendored trees, and generated
/// files that are never worth LLM attention.
const BUILTIN_SKIP: &[&str] = &[
    // lockfiles
    "**/package-lock.json",
    "**/yarn.lock",
    "**/pnpm-lock.yaml",
    "**/bun.lock",
    "**/bun.lockb",
    "**/Cargo.lock",
    "**/composer.lock",
    "**/Gemfile.lock",
    "**/poetry.lock",
    "**/uv.lock",
    "**/go.sum",
    // minified / bundled
    "**/*.min.js",
    "**/*.min.css",
    "**/*.bundle.js",
    "**/*.map",
    // build output and vendored trees
    "**/dist/**",
    "**/build/**",
    "**/node_modules/**",
    "**/.next/**",
    "**/out/**",
    "**/coverage/**",
    "**/vendor/**",
    // generated-file conventions
    "**/*.generated.*",
    "**/*_generated.*",
    "**/*.pb.go",
    "**/*_pb2.py",
    "**/*.snap",
];

/// Classifies filenames through user + builtin patterns, caching compiled
/// globs for the lifetime of one pipeline.
pub struct FileClassifier {
    compiled: HashMap<String, Regex>,
}

impl FileClassifier {
    pub fn new() -> Self {
        Self {
            compiled: HashMap::new(),
        }
    }

    /// Classification verdict for one filename.
    ///
    /// Returns the mode plus, for skips, the matching pattern and whether
    /// it was user-configured or builtin.
    pub fn classify(&mut self, filename: &str, user_patterns: &[UserPattern]) -> Classification {
        for up in user_patterns {
            if self.matches(&up.pattern, filename) {
                return match up.mode {
                    FileMode::Skip => Classification::Skip(SkippedFile {
                        filename: filename.to_string(),
                        reason: SkipReason::Pattern,
                        pattern: Some(up.pattern.clone()),
                    }),
                    mode => Classification::Analyse(mode),
                };
            }
        }

        for pattern in BUILTIN_SKIP {
            if self.matches(pattern, filename) {
                return Classification::Skip(SkippedFile {
                    filename: filename.to_string(),
                    reason: SkipReason::Builtin,
                    pattern: Some((*pattern).to_string()),
                });
            }
        }

        Classification::Analyse(FileMode::PerHunk)
    }

    /// Glob match with per-instance compilation cache.
    pub fn matches(&mut self, pattern: &str, filename: &str) -> bool {
        let re = self
            .compiled
            .entry(pattern.to_string())
            .or_insert_with(|| compile_glob(pattern));
        re.is_match(filename)
    }
}

impl Default for FileClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Verdict of [`FileClassifier::classify`].
#[derive(Debug, Clone)]
pub enum Classification {
    Analyse(FileMode),
    Skip(SkippedFile),
}

/// Translates one glob into an anchored regex.
fn compile_glob(pattern: &str) -> Regex {
    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push('^');

    let bytes = pattern.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'*' => {
                if bytes.get(i + 1) == Some(&b'*') {
                    if bytes.get(i + 2) == Some(&b'/') {
                        // `**/` — zero or more whole segments
                        re.push_str("(?:[^/]+/)*");
                        i += 3;
                    } else {
                        // `**` — anything, slashes included
                        re.push_str(".*");
                        i += 2;
                    }
                } else {
                    re.push_str("[^/]*");
                    i += 1;
                }
            }
            b'?' => {
                re.push_str("[^/]");
                i += 1;
            }
            c => {
                let ch = c as char;
                if "\\.+()[]{}^$|".contains(ch) {
                    re.push('\\');
                }
                re.push(ch);
                i += 1;
            }
        }
    }

    re.push('$');
    // The translation above always produces a valid expression.
    Regex::new(&re).unwrap_or_else(|_| Regex::new("^$").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, name: &str) -> bool {
        FileClassifier::new().matches(pattern, name)
    }

    #[test]
    fn double_star_slash_spans_segments() {
        assert!(matches("**/*.ts", "a/b/c.ts"));
        assert!(matches("**/*.ts", "c.ts"));
        assert!(!matches("*.ts", "a/b.ts"));
        assert!(matches("*.ts", "b.ts"));
    }

    #[test]
    fn question_mark_is_one_non_slash_char() {
        assert!(matches("a?c.rs", "abc.rs"));
        assert!(!matches("a?c.rs", "a/c.rs"));
        assert!(!matches("a?c.rs", "ac.rs"));
    }

    #[test]
    fn directory_globs_match_nested_and_rooted() {
        assert!(matches("**/node_modules/**", "node_modules/x/y.js"));
        assert!(matches("**/node_modules/**", "pkg/node_modules/y.js"));
        assert!(!matches("**/node_modules/**", "src/modules/y.js"));
    }

    #[test]
    fn literal_dots_do_not_wildcard() {
        assert!(matches("**/*.min.js", "assets/app.min.js"));
        assert!(!matches("**/*.min.js", "assets/appXminYjs"));
    }

    #[test]
    fn builtin_list_skips_lockfiles_and_dist() {
        let mut c = FileClassifier::new();
        for name in ["pnpm-lock.yaml", "sub/yarn.lock", "dist/app.js", "coverage/lcov.info"] {
            match c.classify(name, &[]) {
                Classification::Skip(s) => {
                    assert_eq!(s.reason, SkipReason::Builtin);
                    assert_eq!(s.filename, name);
                }
                other => panic!("expected skip for {name}, got {other:?}"),
            }
        }
    }

    #[test]
    fn user_patterns_take_precedence_in_order() {
        let mut c = FileClassifier::new();
        let patterns = vec![
            UserPattern {
                pattern: "docs/**".into(),
                mode: FileMode::Skip,
            },
            UserPattern {
                pattern: "**/*.sql".into(),
                mode: FileMode::WholeFile,
            },
        ];
        match c.classify("docs/readme.md", &patterns) {
            Classification::Skip(s) => assert_eq!(s.reason, SkipReason::Pattern),
            other => panic!("expected user skip, got {other:?}"),
        }
        match c.classify("migrations/init.sql", &patterns) {
            Classification::Analyse(FileMode::WholeFile) => {}
            other => panic!("expected whole-file, got {other:?}"),
        }
        // A user rule can even rescue a builtin-skipped path.
        let rescue = vec![UserPattern {
            pattern: "dist/keep.js".into(),
            mode: FileMode::PerHunk,
        }];
        match c.classify("dist/keep.js", &rescue) {
            Classification::Analyse(FileMode::PerHunk) => {}
            other => panic!("expected per-hunk, got {other:?}"),
        }
    }

    #[test]
    fn default_is_per_hunk() {
        let mut c = FileClassifier::new();
        match c.classify("src/main.rs", &[]) {
            Classification::Analyse(FileMode::PerHunk) => {}
            other => panic!("expected per-hunk, got {other:?}"),
        }
    }
}
