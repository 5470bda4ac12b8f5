//! Findings extraction: recover a JSON findings array from raw model text.
//!
//! Strategy (cheap → tolerant):
//! 1) Strip markdown code fences.
//! 2) From the first `[`: try a straight JSON-array parse.
//! 3) From the first `{`: scan with string/escape awareness and brace
//!    depth, collecting each balanced object; the collected objects form
//!    the array.
//! 4) Both failed: a failure shape carrying a truncated preview.
//!
//! The LLM repair fallback lives with the caller (file analyser); this
//! module provides the repair prompt and the tail truncation it needs.

use tracing::debug;

use crate::types::Finding;

/// Preview length carried in extraction failures.
const PREVIEW_CHARS: usize = 400;

/// Outcome of one extraction attempt.
#[derive(Debug)]
pub enum Extraction {
    Success(Vec<Finding>),
    Failure { error: String, preview: String },
}

impl Extraction {
    pub fn is_success(&self) -> bool {
        matches!(self, Extraction::Success(_))
    }
}

/// Extracts findings from raw model output.
pub fn extract_findings(raw: &str) -> Extraction {
    let stripped = strip_code_fences(raw);

    if let Some(start) = stripped.find('[') {
        if let Some(findings) = try_parse_array(&stripped[start..]) {
            return Extraction::Success(findings);
        }
    }

    if let Some(objects) = collect_balanced_objects(&stripped) {
        if !objects.is_empty() {
            return Extraction::Success(objects);
        }
    }

    Extraction::Failure {
        error: "no JSON findings array in model output".to_string(),
        preview: raw.chars().take(PREVIEW_CHARS).collect(),
    }
}

/// Removes a wrapping ``` / ```json fence pair when present.
fn strip_code_fences(raw: &str) -> String {
    let t = raw.trim();
    if !t.starts_with("```") {
        return t.to_string();
    }
    let body = t
        .trim_start_matches("```json")
        .trim_start_matches("```");
    match body.rfind("```") {
        Some(end) => body[..end].trim().to_string(),
        None => body.trim().to_string(),
    }
}

/// Straight array parse; tolerant of non-finding elements (dropped with a
/// debug line) but strict about the array being valid JSON.
fn try_parse_array(s: &str) -> Option<Vec<Finding>> {
    // Find the matching close bracket by scanning, so trailing prose after
    // the array does not break the parse.
    let end = balanced_end(s, b'[', b']')?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&s[..=end]).ok()?;
    Some(values_to_findings(values))
}

/// Collects every top-level balanced `{...}` object in the text.
fn collect_balanced_objects(s: &str) -> Option<Vec<Finding>> {
    let mut values = Vec::new();
    let mut rest = s;
    loop {
        let Some(start) = rest.find('{') else { break };
        let tail = &rest[start..];
        let Some(end) = balanced_end(tail, b'{', b'}') else {
            break;
        };
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&tail[..=end]) {
            values.push(value);
        }
        rest = &tail[end + 1..];
    }
    if values.is_empty() {
        None
    } else {
        Some(values_to_findings(values))
    }
}

/// Index of the close delimiter balancing the open delimiter at byte 0,
/// honouring JSON strings and `\` escapes.
fn balanced_end(s: &str, open: u8, close: u8) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&open) {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn values_to_findings(values: Vec<serde_json::Value>) -> Vec<Finding> {
    let mut findings = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value::<Finding>(value) {
            Ok(f) => findings.push(f),
            Err(e) => debug!("extract: dropping malformed finding object: {e}"),
        }
    }
    findings
}

/* --------------------- LLM repair fallback --------------------- */

/// Tail budget handed to the repair model.
pub const REPAIR_TAIL_CHARS: usize = 6_000;

/// Truncates raw output for the repair call, preserving the JSON-like
/// region.
///
/// Callers must verify a findings-JSON-like region exists (a `[` or `{` in
/// the text) before calling; when none does, the plain tail is returned
/// and the repair call is unlikely to succeed — no trimming strategy is
/// guessed beyond that.
pub fn truncate_for_llm_fallback(raw: &str, max_chars: usize) -> String {
    let total = raw.chars().count();
    if total <= max_chars {
        return raw.to_string();
    }

    // Prefer the region from the first JSON-like char when that region
    // itself fits the budget (prose followed by JSON near the end).
    if let Some(i) = raw.find(['[', '{']) {
        if raw[i..].chars().count() <= max_chars {
            return raw[i..].to_string();
        }
    }

    // Plain tail otherwise; callers verified a region exists, anything
    // beyond that is explicitly undefined.
    let tail_start_byte = raw
        .char_indices()
        .nth(total - max_chars)
        .map(|(i, _)| i)
        .unwrap_or(0);
    raw[tail_start_byte..].to_string()
}

/// Prompt pair for the repair call on the fast profile.
pub fn build_repair_prompt(truncated: &str) -> (String, String) {
    let system = "You repair malformed JSON. You receive the tail of a code-review \
model's output that was supposed to be a JSON array of finding objects with keys \
{\"id\", \"severity\", \"confidence\"?, \"title\", \"description\", \"location\"?, \"suggestedFix\"?}. \
Reconstruct the intended array. Return only the JSON array; return [] if no findings can be recovered."
        .to_string();
    let user = format!("Model output tail:\n---\n{truncated}\n---");
    (system, user)
}
