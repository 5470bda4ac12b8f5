//! Unified error type for LLM calls.
//!
//! Goals:
//! - Provider-aware mapping (401/403 → Auth, 429 → RateLimited, 5xx → Server).
//! - Classification predicates used by the retry wrapper and the pipeline:
//!   [`LlmError::is_retryable`] and [`LlmError::is_auth`].
//! - Ergonomic `?` via `From<reqwest::Error>`.

use thiserror::Error;

/// Convenient alias for results in this crate.
pub type LlmResult<T> = Result<T, LlmError>;

/// Root error type for LLM provider calls.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Authentication failure (HTTP 401/403). Fatal for the whole run.
    #[error("authentication failed (status {status}): check the API key for {provider}")]
    Auth { provider: &'static str, status: u16 },

    /// Rate limited (HTTP 429). Retryable.
    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Server error (HTTP 5xx). Retryable.
    #[error("server error: status {0}")]
    Server(u16),

    /// Other non-success HTTP status (4xx/3xx). Not retryable.
    #[error("http status error ({status}): {snippet}")]
    HttpStatus { status: u16, snippet: String },

    /// Transport-level timeout. Retryable.
    #[error("request timed out")]
    Timeout,

    /// Connection failure (DNS/refused/reset). Retryable.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Network/transport failure without a more specific shape.
    #[error("network error: {0}")]
    Network(String),

    /// Response body could not be decoded into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// Provider returned a success status but no usable completion.
    #[error("empty completion in provider response")]
    EmptyCompletion,

    /// Provider configuration problem (missing key, bad endpoint, ...).
    #[error("llm config error: {0}")]
    Config(String),

    /// All retry attempts consumed; carries the last underlying error.
    #[error("retries exhausted after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        last: Box<LlmError>,
    },

    /// The cancellation token fired while the call was in flight or sleeping.
    #[error("llm call aborted")]
    Aborted,
}

impl LlmError {
    /// Whether the retry wrapper may try this call again.
    ///
    /// Retryable: 429, 5xx, connect failures, timeouts, raw network errors.
    /// Everything else (auth, other 4xx, decode, config, abort) is terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. }
                | LlmError::Server(_)
                | LlmError::Timeout
                | LlmError::Connect(_)
                | LlmError::Network(_)
        )
    }

    /// Whether this is an authentication failure (fatal for the run).
    pub fn is_auth(&self) -> bool {
        matches!(self, LlmError::Auth { .. })
    }

    /// Whether the error came from the abort signal.
    pub fn is_abort(&self) -> bool {
        matches!(self, LlmError::Aborted)
    }

    /// Maps an HTTP status + body snippet into the right variant.
    pub(crate) fn from_status(provider: &'static str, status: u16, snippet: String) -> Self {
        match status {
            401 | 403 => LlmError::Auth { provider, status },
            429 => LlmError::RateLimited {
                retry_after_secs: None,
            },
            500..=599 => LlmError::Server(status),
            _ => LlmError::HttpStatus { status, snippet },
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return LlmError::Timeout;
        }
        if e.is_connect() {
            return LlmError::Connect(e.to_string());
        }
        if e.is_decode() {
            return LlmError::Decode(e.to_string());
        }
        LlmError::Network(e.to_string())
    }
}

/// Short, single-line body snippet for logs and error messages.
pub(crate) fn make_snippet(body: &str) -> String {
    let flat = body.replace(['\n', '\r'], " ");
    let trimmed = flat.trim();
    if trimmed.chars().count() <= 200 {
        trimmed.to_string()
    } else {
        trimmed.chars().take(200).collect::<String>() + "…"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_covers_auth_rate_limit_and_server() {
        assert!(LlmError::from_status("openai", 401, String::new()).is_auth());
        assert!(LlmError::from_status("openai", 403, String::new()).is_auth());
        assert!(LlmError::from_status("openai", 429, String::new()).is_retryable());
        assert!(LlmError::from_status("openai", 500, String::new()).is_retryable());
        assert!(LlmError::from_status("openai", 503, String::new()).is_retryable());
    }

    #[test]
    fn plain_4xx_is_terminal() {
        let e = LlmError::from_status("openai", 404, "not found".into());
        assert!(!e.is_retryable());
        assert!(!e.is_auth());
    }

    #[test]
    fn transport_errors_are_retryable() {
        assert!(LlmError::Timeout.is_retryable());
        assert!(LlmError::Connect("refused".into()).is_retryable());
        assert!(LlmError::Network("reset".into()).is_retryable());
    }

    #[test]
    fn decode_and_abort_are_terminal() {
        assert!(!LlmError::Decode("bad json".into()).is_retryable());
        assert!(!LlmError::Aborted.is_retryable());
        assert!(LlmError::Aborted.is_abort());
    }

    #[test]
    fn snippet_is_single_line_and_bounded() {
        let s = make_snippet("line one\nline two\n");
        assert_eq!(s, "line one line two");
        let long = "x".repeat(500);
        assert!(make_snippet(&long).chars().count() <= 201);
    }
}
