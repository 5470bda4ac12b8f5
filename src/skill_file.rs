//! Minimal SKILL.md loader for the CLI.
//!
//! A skill file is YAML frontmatter (name/description/model/tool lists)
//! followed by the prompt body. The pipeline itself only ever sees the
//! resolved `SkillDefinition`.

use std::error::Error;
use std::path::Path;

use serde::Deserialize;

use warden_core::skills::SkillDefinition;

#[derive(Debug, Default, Deserialize)]
struct Frontmatter {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    allowed_tools: Vec<String>,
    #[serde(default)]
    disallowed_tools: Vec<String>,
}

/// Loads `<dir>/SKILL.md` into a definition; `fallback_name` is used when
/// the frontmatter does not name the skill.
pub fn load_skill(dir: &Path, fallback_name: &str) -> Result<SkillDefinition, Box<dyn Error>> {
    let raw = std::fs::read_to_string(dir.join("SKILL.md"))?;
    let (front, body) = split_frontmatter(&raw);

    let meta: Frontmatter = match front {
        Some(yaml) => serde_yaml_ng::from_str(yaml)?,
        None => Frontmatter::default(),
    };

    let prompt = body.trim();
    if prompt.is_empty() {
        return Err("SKILL.md has an empty prompt body".into());
    }

    Ok(SkillDefinition {
        name: meta.name.unwrap_or_else(|| fallback_name.to_string()),
        description: meta.description.unwrap_or_default(),
        prompt: prompt.to_string(),
        model: meta.model,
        allowed_tools: meta.allowed_tools,
        disallowed_tools: meta.disallowed_tools,
    })
}

/// Splits `---\n...\n---\n` frontmatter from the body.
fn split_frontmatter(raw: &str) -> (Option<&str>, &str) {
    let Some(rest) = raw.strip_prefix("---\n") else {
        return (None, raw);
    };
    match rest.split_once("\n---") {
        Some((front, body)) => {
            let body = body.strip_prefix('\n').unwrap_or(body);
            (Some(front), body)
        }
        None => (None, raw),
    }
}
