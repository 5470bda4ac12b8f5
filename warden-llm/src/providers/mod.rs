//! Provider clients (enum-dispatch, no async-trait, no heap objects).

pub mod ollama;
pub mod openai;
#[cfg(feature = "test-utils")]
pub mod script;

use crate::config::{ModelConfig, Provider};
use crate::error::LlmResult;
use crate::usage::UsageStats;

/// One prompt pair headed for a provider.
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    /// Per-call model override; the profile's model when `None`.
    pub model_override: Option<&'a str>,
}

impl<'a> ChatRequest<'a> {
    pub fn new(system: &'a str, user: &'a str) -> Self {
        Self {
            system,
            user,
            model_override: None,
        }
    }
}

/// Completion text plus accounting for one round trip.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub text: String,
    pub usage: UsageStats,
}

/// Thin enum client for dispatch.
pub enum LlmClient {
    OpenAi(openai::OpenAiClient),
    Ollama(ollama::OllamaClient),
    #[cfg(feature = "test-utils")]
    Scripted(script::ScriptedClient),
}

impl LlmClient {
    /// Construct a client based on the given profile config.
    pub fn from_config(cfg: ModelConfig) -> LlmResult<Self> {
        match cfg.provider {
            Provider::OpenAi => Ok(Self::OpenAi(openai::OpenAiClient::new(cfg)?)),
            Provider::Ollama => Ok(Self::Ollama(ollama::OllamaClient::new(cfg)?)),
        }
    }

    /// One non-streaming completion round trip.
    pub async fn chat(&self, req: &ChatRequest<'_>) -> LlmResult<ChatOutcome> {
        match self {
            Self::OpenAi(c) => c.chat(req).await,
            Self::Ollama(c) => c.chat(req).await,
            #[cfg(feature = "test-utils")]
            Self::Scripted(c) => c.chat(req).await,
        }
    }

    /// The profile config backing this client, for cost derivation and logs.
    pub fn config(&self) -> &ModelConfig {
        match self {
            Self::OpenAi(c) => c.config(),
            Self::Ollama(c) => c.config(),
            #[cfg(feature = "test-utils")]
            Self::Scripted(c) => c.config(),
        }
    }
}
