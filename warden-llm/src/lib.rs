//! LLM client layer for warden.
//!
//! The pipeline in `warden-core` never talks HTTP itself; it goes through
//! [`LlmService`], which owns up to two model profiles:
//!
//! - **review** — the model that analyses change regions (quality).
//! - **fast**   — a lightweight model for extraction repair and semantic
//!   dedup. Falls back to the review profile when not configured.
//!
//! Providers are enum-dispatched (no async-trait, no heap trait objects):
//! an OpenAI-compatible chat-completions client and an Ollama
//! `/api/generate` client. Every call goes through the retry wrapper in
//! [`retry`], which classifies errors via [`LlmError::is_retryable`] /
//! [`LlmError::is_auth`] and honours a cancellation token.

pub mod config;
pub mod error;
pub mod profiles;
pub mod providers;
pub mod retry;
pub mod usage;

pub use config::{ModelConfig, Provider, RetryPolicy};
pub use error::LlmError;
pub use profiles::LlmService;
pub use providers::{ChatRequest, ChatOutcome, LlmClient};
pub use retry::RetryObserver;
pub use usage::UsageStats;

#[cfg(feature = "test-utils")]
pub use providers::script::{ScriptStep, ScriptedClient};
