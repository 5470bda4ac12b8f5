//! Comment markers and attribution lines.
//!
//! Every posted inline comment carries a hidden HTML marker
//! `<!-- warden:v1:<path>:<line>:<hash> -->` so later runs can match it
//! without scraping the visible body, plus a visible attribution line
//! `<sub>warden: skill-a, skill-b</sub>`.
//!
//! The content hash is the first 8 hex chars of
//! `sha256(title + "\n" + description)` — stable across runs for
//! unchanged findings.

use sha2::{Digest, Sha256};

/// Marker prefix; the version segment guards future format changes.
pub const MARKER_PREFIX: &str = "<!-- warden:v1:";
const MARKER_SUFFIX: &str = " -->";

const ATTRIBUTION_PREFIX: &str = "<sub>warden: ";
const ATTRIBUTION_SUFFIX: &str = "</sub>";

/// Parsed marker triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub path: String,
    pub line: u32,
    pub content_hash: String,
}

/// First 8 hex chars of `sha256(title + "\n" + description)`.
pub fn generate_content_hash(title: &str, description: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(description.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..8].to_string()
}

/// `<!-- warden:v1:<path>:<line>:<hash> -->`
pub fn generate_marker(path: &str, line: u32, content_hash: &str) -> String {
    format!("{MARKER_PREFIX}{path}:{line}:{content_hash}{MARKER_SUFFIX}")
}

/// Finds and parses the first marker in a comment body.
///
/// The path may itself contain `:`; the line and hash are taken from the
/// right.
pub fn parse_marker(body: &str) -> Option<Marker> {
    let start = body.find(MARKER_PREFIX)?;
    let after = &body[start + MARKER_PREFIX.len()..];
    let end = after.find(MARKER_SUFFIX)?;
    let triple = &after[..end];

    let mut parts = triple.rsplitn(3, ':');
    let hash = parts.next()?;
    let line = parts.next()?.parse::<u32>().ok()?;
    let path = parts.next()?;
    if path.is_empty() || hash.len() != 8 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    Some(Marker {
        path: path.to_string(),
        line,
        content_hash: hash.to_string(),
    })
}

/// `<sub>warden: a, b</sub>`
pub fn format_attribution(skills: &[String]) -> String {
    format!("{ATTRIBUTION_PREFIX}{}{ATTRIBUTION_SUFFIX}", skills.join(", "))
}

/// Skills listed in the body's attribution line, in order.
pub fn parse_attribution(body: &str) -> Vec<String> {
    for line in body.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(ATTRIBUTION_PREFIX) {
            if let Some(list) = rest.strip_suffix(ATTRIBUTION_SUFFIX) {
                return list
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
        }
    }
    Vec::new()
}

/// Rewrites the attribution line so it also names `new_skill`.
///
/// Returns the body unchanged when the skill is already attributed; when
/// no attribution line exists, one is appended.
pub fn update_warden_comment_body(body: &str, new_skill: &str) -> String {
    let current = parse_attribution(body);
    if current.iter().any(|s| s == new_skill) {
        return body.to_string();
    }

    if current.is_empty() {
        let mut out = body.trim_end().to_string();
        out.push_str("\n\n");
        out.push_str(&format_attribution(&[new_skill.to_string()]));
        return out;
    }

    let mut updated = current;
    updated.push(new_skill.to_string());
    let new_line = format_attribution(&updated);

    body.lines()
        .map(|line| {
            let trimmed = line.trim();
            if trimmed.starts_with(ATTRIBUTION_PREFIX) && trimmed.ends_with(ATTRIBUTION_SUFFIX) {
                new_line.as_str()
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn content_hash_is_stable_and_8_hex() {
        let a = generate_content_hash("SQL injection", "String-built query");
        let b = generate_content_hash("SQL injection", "String-built query");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        // The separator matters: (t, d) must not collide with (t + d, "").
        assert_ne!(
            generate_content_hash("ab", "c"),
            generate_content_hash("a", "bc")
        );
    }

    #[test]
    fn marker_round_trips() {
        let marker = generate_marker("src/db.ts", 42, "0badc0de");
        let parsed = parse_marker(&format!("**Title**\n\nbody\n\n{marker}")).unwrap();
        assert_eq!(
            parsed,
            Marker {
                path: "src/db.ts".into(),
                line: 42,
                content_hash: "0badc0de".into()
            }
        );
    }

    #[test]
    fn marker_survives_colons_in_path() {
        let marker = generate_marker("weird:dir/file.ts", 7, "12345678");
        let parsed = parse_marker(&marker).unwrap();
        assert_eq!(parsed.path, "weird:dir/file.ts");
        assert_eq!(parsed.line, 7);
    }

    #[test]
    fn bad_markers_do_not_parse() {
        assert!(parse_marker("no marker here").is_none());
        assert!(parse_marker("<!-- warden:v1:path:notaline:12345678 -->").is_none());
        assert!(parse_marker("<!-- warden:v1:path:1:tooshort -->").is_none());
    }

    #[test]
    fn attribution_update_appends_once() {
        let body = "**T**\n\ndesc\n\n<sub>warden: sqli</sub>\n<!-- warden:v1:a:1:12345678 -->";
        let updated = update_warden_comment_body(body, "perf");
        assert!(updated.contains("<sub>warden: sqli, perf</sub>"));
        // Already present: unchanged, no duplicates.
        assert_eq!(update_warden_comment_body(&updated, "perf"), updated);
        assert_eq!(parse_attribution(&updated), vec!["sqli", "perf"]);
    }

    #[test]
    fn attribution_added_when_missing() {
        let updated = update_warden_comment_body("just a body", "sqli");
        assert_eq!(parse_attribution(&updated), vec!["sqli"]);
    }
}
