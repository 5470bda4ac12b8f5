//! Model/profile configuration loaded strictly from environment variables.
//!
//! Two profiles are recognised, each with its own variable prefix:
//!
//! - `WARDEN_LLM_REVIEW_*` — the analysis model (required).
//! - `WARDEN_LLM_FAST_*`   — the lightweight model for repair/semantic
//!   dedup (optional; the service falls back to the review profile).
//!
//! Per prefix:
//! - `{P}_PROVIDER`  = `openai` | `ollama` (required)
//! - `{P}_MODEL`     = model identifier (required)
//! - `{P}_ENDPOINT`  = base URL, `http(s)://...` (required)
//! - `{P}_API_KEY`   = API key (required for openai)
//! - `{P}_TIMEOUT_SECS`, `{P}_MAX_TOKENS`, `{P}_TEMPERATURE`, `{P}_TOP_P`
//! - `{P}_INPUT_USD_PER_MTOK`, `{P}_OUTPUT_USD_PER_MTOK` — optional rates
//!   used to derive `cost_usd` when the provider reports token counts only.

use std::time::Duration;

use crate::error::{LlmError, LlmResult};

/// Supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// OpenAI-compatible chat-completions endpoint.
    OpenAi,
    /// Local/remote Ollama `/api/generate` endpoint.
    Ollama,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::OpenAi => write!(f, "openai"),
            Provider::Ollama => write!(f, "ollama"),
        }
    }
}

/// Configuration for one model profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub provider: Provider,
    /// Model identifier string (e.g. `"gpt-4o-mini"`, `"qwen2.5-coder:7b"`).
    pub model: String,
    /// Base endpoint URL; provider-specific paths are appended.
    pub endpoint: String,
    /// API key (required for OpenAI-compatible endpoints).
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub timeout_secs: Option<u64>,
    /// USD per million input tokens, for cost derivation.
    pub input_usd_per_mtok: Option<f64>,
    /// USD per million output tokens, for cost derivation.
    pub output_usd_per_mtok: Option<f64>,
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(120))
    }
}

/// Backoff parameters for the retry wrapper.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the k-th failed attempt (1-indexed):
    /// `min(max_delay_ms, initial_delay_ms * multiplier^(k-1))`, floored at
    /// 100 ms so a misconfigured policy cannot busy-spin.
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        const MIN_DELAY_MS: u64 = 100;
        let exp = attempt.saturating_sub(1) as i32;
        let raw = (self.initial_delay_ms as f64) * self.backoff_multiplier.powi(exp);
        let capped = raw.min(self.max_delay_ms as f64).max(MIN_DELAY_MS as f64);
        Duration::from_millis(capped as u64)
    }
}

/* ------------------------ Env helpers ------------------------ */

/// Fetches a required, non-empty environment variable.
fn must_env(name: &str) -> LlmResult<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(LlmError::Config(format!(
            "missing required environment variable: {name}"
        ))),
    }
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_opt_parsed<T: std::str::FromStr>(name: &str, expected: &str) -> LlmResult<Option<T>> {
    match env_opt(name) {
        Some(v) => v.parse::<T>().map(Some).map_err(|_| {
            LlmError::Config(format!("invalid number in {name}: expected {expected}"))
        }),
        None => Ok(None),
    }
}

/// Parses a provider name (`openai` / `ollama`, case-insensitive).
pub fn parse_provider(s: &str) -> LlmResult<Provider> {
    match s.trim().to_ascii_lowercase().as_str() {
        "openai" => Ok(Provider::OpenAi),
        "ollama" => Ok(Provider::Ollama),
        other => Err(LlmError::Config(format!("unsupported provider: {other}"))),
    }
}

/// Validates that an endpoint starts with `http://` or `https://`.
pub fn validate_endpoint(var: &str, value: &str) -> LlmResult<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(LlmError::Config(format!(
            "invalid endpoint in {var}: must start with http:// or https://"
        )))
    }
}

/// Loads one profile from `{prefix}_*` variables.
///
/// Returns `Ok(None)` when the prefix is entirely absent (used for the
/// optional fast profile); errors when the profile is half-configured.
pub fn profile_from_env(prefix: &str) -> LlmResult<Option<ModelConfig>> {
    let provider_var = format!("{prefix}_PROVIDER");
    let Some(provider_raw) = env_opt(&provider_var) else {
        return Ok(None);
    };
    let provider = parse_provider(&provider_raw)?;

    let model = must_env(&format!("{prefix}_MODEL"))?;
    let endpoint_var = format!("{prefix}_ENDPOINT");
    let endpoint = must_env(&endpoint_var)?;
    validate_endpoint(&endpoint_var, &endpoint)?;

    let api_key = env_opt(&format!("{prefix}_API_KEY"));
    if provider == Provider::OpenAi && api_key.is_none() {
        return Err(LlmError::Config(format!(
            "missing required environment variable: {prefix}_API_KEY"
        )));
    }

    Ok(Some(ModelConfig {
        provider,
        model,
        endpoint,
        api_key,
        max_tokens: env_opt_parsed(&format!("{prefix}_MAX_TOKENS"), "u32")?,
        temperature: env_opt_parsed(&format!("{prefix}_TEMPERATURE"), "f32")?,
        top_p: env_opt_parsed(&format!("{prefix}_TOP_P"), "f32")?,
        timeout_secs: env_opt_parsed(&format!("{prefix}_TIMEOUT_SECS"), "u64")?,
        input_usd_per_mtok: env_opt_parsed(&format!("{prefix}_INPUT_USD_PER_MTOK"), "f64")?,
        output_usd_per_mtok: env_opt_parsed(&format!("{prefix}_OUTPUT_USD_PER_MTOK"), "f64")?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parsing_is_case_insensitive() {
        assert_eq!(parse_provider("OpenAI").unwrap(), Provider::OpenAi);
        assert_eq!(parse_provider(" ollama ").unwrap(), Provider::Ollama);
        assert!(parse_provider("anthropic").is_err());
    }

    #[test]
    fn endpoint_validation_requires_http_scheme() {
        assert!(validate_endpoint("X", "http://localhost:11434").is_ok());
        assert!(validate_endpoint("X", "https://api.example.com").is_ok());
        assert!(validate_endpoint("X", "localhost:11434").is_err());
    }

    #[test]
    fn backoff_follows_exponential_curve_with_cap() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff_delay(1).as_millis(), 1_000);
        assert_eq!(p.backoff_delay(2).as_millis(), 2_000);
        assert_eq!(p.backoff_delay(3).as_millis(), 4_000);
        // 1000 * 2^9 = 512_000, capped at 30_000.
        assert_eq!(p.backoff_delay(10).as_millis(), 30_000);
    }

    #[test]
    fn backoff_never_drops_below_floor() {
        let p = RetryPolicy {
            max_retries: 3,
            initial_delay_ms: 1,
            backoff_multiplier: 1.0,
            max_delay_ms: 30_000,
        };
        assert_eq!(p.backoff_delay(1).as_millis(), 100);
    }
}
