//! Skill definitions and skill discovery.
//!
//! A skill is a named bundle of review instructions; its on-disk shape is a
//! directory containing a `SKILL.md` file. Parsing the markdown frontmatter
//! is the loader's job (outside this crate); here we resolve *where* skills
//! live — locally under the repository, or inside a fetched remote cache.

pub mod remote;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Resolved skill instructions handed to the skill runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDefinition {
    pub name: String,
    /// Short description embedded into the system prompt.
    pub description: String,
    /// The review instructions themselves, embedded verbatim.
    pub prompt: String,
    /// Per-skill model override, when the skill pins one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Tool allow-list, forwarded to the transport.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_tools: Vec<String>,
    /// Tool deny-list, forwarded to the transport.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disallowed_tools: Vec<String>,
}

/// Local skill roots, in lookup order.
const LOCAL_SKILL_DIRS: &[&str] = &[".warden/skills", ".agents/skills", ".claude/skills"];

/// Finds a locally authored skill directory by name.
pub fn find_local_skill(repo_path: &Path, name: &str) -> Option<PathBuf> {
    for root in LOCAL_SKILL_DIRS {
        let candidate = repo_path.join(root).join(name);
        if candidate.join("SKILL.md").is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Lists skill directories (name → path) under one root. Non-directories
/// and directories without `SKILL.md` are ignored.
pub fn skills_in_dir(root: &Path) -> Vec<(String, PathBuf)> {
    let mut found = Vec::new();
    let Ok(entries) = std::fs::read_dir(root) else {
        return found;
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    for dir in dirs {
        if dir.join("SKILL.md").is_file() {
            if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
                found.push((name.to_string(), dir.clone()));
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn add_skill(root: &Path, rel: &str, name: &str) {
        let dir = root.join(rel).join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("SKILL.md"), "---\nname: x\n---\nbody\n").unwrap();
    }

    #[test]
    fn local_lookup_prefers_warden_dir() {
        let tmp = tempfile::tempdir().unwrap();
        add_skill(tmp.path(), ".claude/skills", "sqli");
        add_skill(tmp.path(), ".warden/skills", "sqli");

        let found = find_local_skill(tmp.path(), "sqli").unwrap();
        assert!(found.ends_with(".warden/skills/sqli"));
        assert!(find_local_skill(tmp.path(), "missing").is_none());
    }

    #[test]
    fn dir_listing_requires_skill_md() {
        let tmp = tempfile::tempdir().unwrap();
        add_skill(tmp.path(), "skills", "a");
        add_skill(tmp.path(), "skills", "b");
        fs::create_dir_all(tmp.path().join("skills/not-a-skill")).unwrap();

        let found = skills_in_dir(&tmp.path().join("skills"));
        let names: Vec<_> = found.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
