//! Crate-wide error hierarchy for warden-core.
//!
//! Goals:
//! - Single root `Error` for all public functions.
//! - Focused sub-enums per subsystem (skills, state, config).
//! - Per-hunk failures never surface here — they degrade into the report's
//!   `failed_hunks` counter. Only authentication and abort terminate a run.

use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type WardenResult<T> = Result<T, Error>;

/// Root error type for the warden-core crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Skill resolution failure (local lookup or remote fetch).
    #[error(transparent)]
    Skill(#[from] SkillError),

    /// State-directory failure (cache ledger I/O / JSON).
    #[error(transparent)]
    State(#[from] StateError),

    /// Configuration problems (bad env values, missing settings).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// LLM provider failure that escaped the per-hunk degradation path
    /// (in practice: authentication).
    #[error(transparent)]
    Llm(warden_llm::LlmError),

    /// The abort signal fired; no partial report is produced.
    #[error("run aborted")]
    Aborted,

    /// Input validation errors (bad event shapes, bad options).
    #[error("validation error: {0}")]
    Validation(String),
}

/// Skill resolution and remote fetch errors.
#[derive(Debug, Error)]
pub enum SkillError {
    #[error("skill not found: {0}")]
    NotFound(String),

    #[error("invalid skill ref '{reference}': {reason}")]
    InvalidRef { reference: String, reason: String },

    #[error("remote fetch failed for '{reference}': {detail}")]
    Fetch { reference: String, detail: String },

    #[error("offline and no cached copy of '{0}'")]
    OfflineMiss(String),
}

/// State directory related errors (ledger, run log).
#[derive(Debug, Error)]
pub enum StateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Configuration and setup errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid number in {var}: {reason}")]
    InvalidNumber {
        var: &'static str,
        reason: &'static str,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

// ===== Conversions for `?` ergonomics =====

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::State(StateError::Io(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::State(StateError::Serde(e))
    }
}

impl From<warden_llm::LlmError> for Error {
    fn from(e: warden_llm::LlmError) -> Self {
        if e.is_abort() {
            Error::Aborted
        } else {
            Error::Llm(e)
        }
    }
}

impl Error {
    /// True when this error must terminate the whole run (auth or abort).
    pub fn is_fatal_for_run(&self) -> bool {
        match self {
            Error::Aborted => true,
            Error::Llm(e) => e.is_auth(),
            _ => false,
        }
    }
}
