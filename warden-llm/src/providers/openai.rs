//! OpenAI-compatible chat-completions client.
//!
//! Minimal, non-streaming client around `POST {endpoint}/v1/chat/completions`.
//!
//! Constructor validation:
//! - `cfg.provider` must be [`Provider::OpenAi`]
//! - `cfg.api_key` must be present
//! - `cfg.endpoint` must start with http:// or https://
//!
//! Non-2xx statuses are mapped through [`LlmError::from_status`], so 401/403
//! surface as `Auth`, 429 as `RateLimited` (with `Retry-After` when the
//! server sends one), and 5xx as `Server`.

use std::time::Instant;

use reqwest::header;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::{ModelConfig, Provider};
use crate::error::{LlmError, LlmResult, make_snippet};
use crate::providers::{ChatOutcome, ChatRequest};
use crate::usage::UsageStats;

/// Thin client for an OpenAI-compatible API.
#[derive(Debug)]
pub struct OpenAiClient {
    client: reqwest::Client,
    cfg: ModelConfig,
    url_chat: String,
}

impl OpenAiClient {
    /// Creates a new client; validates provider, API key, and endpoint,
    /// then builds a `reqwest::Client` with timeout and default headers.
    pub fn new(cfg: ModelConfig) -> LlmResult<Self> {
        if cfg.provider != Provider::OpenAi {
            return Err(LlmError::Config(
                "OpenAiClient constructed with a non-openai profile".into(),
            ));
        }
        let api_key = cfg
            .api_key
            .clone()
            .ok_or_else(|| LlmError::Config("openai profile requires an API key".into()))?;

        let endpoint = cfg.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(LlmError::Config(format!(
                "invalid endpoint: {}",
                cfg.endpoint
            )));
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| LlmError::Config(format!("invalid API key header: {e}")))?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .default_headers(headers)
            .build()?;

        let url_chat = format!("{}/v1/chat/completions", endpoint.trim_end_matches('/'));

        info!(
            model = %cfg.model,
            endpoint = %cfg.endpoint,
            timeout_secs = cfg.timeout_secs.unwrap_or(120),
            "OpenAiClient initialized"
        );

        Ok(Self {
            client,
            cfg,
            url_chat,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.cfg
    }

    /// Performs a non-streaming chat completion request.
    pub async fn chat(&self, req: &ChatRequest<'_>) -> LlmResult<ChatOutcome> {
        let started = Instant::now();
        let model = req.model_override.unwrap_or(&self.cfg.model);
        let body = ChatCompletionRequest::build(&self.cfg, model, req);

        debug!(
            model = %model,
            prompt_len = req.user.len(),
            system_len = req.system.len(),
            "POST {}", self.url_chat
        );

        let resp = self.client.post(&self.url_chat).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let retry_after = resp
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let text = resp.text().await.unwrap_or_default();
            let snippet = make_snippet(&text);

            error!(
                status,
                %snippet,
                model = %model,
                endpoint = %self.cfg.endpoint,
                latency_ms = started.elapsed().as_millis(),
                "chat completions returned non-success status"
            );

            let mut err = LlmError::from_status("openai", status, snippet);
            if let LlmError::RateLimited {
                retry_after_secs, ..
            } = &mut err
            {
                *retry_after_secs = retry_after;
            }
            return Err(err);
        }

        let out: ChatCompletionResponse = resp.json().await.map_err(|e| {
            LlmError::Decode(format!(
                "serde error: {e}; expected `choices[0].message.content`"
            ))
        })?;

        let mut usage = out
            .usage
            .map(|u| UsageStats {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                cache_read_input_tokens: u.prompt_tokens_details.and_then(|d| d.cached_tokens),
                cache_creation_input_tokens: None,
                cost_usd: 0.0,
            })
            .unwrap_or_default();
        usage.derive_cost(&self.cfg);

        let text = out
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .ok_or(LlmError::EmptyCompletion)?;

        info!(
            model = %model,
            latency_ms = started.elapsed().as_millis(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "chat completion completed"
        );

        Ok(ChatOutcome { text, usage })
    }
}

/* ===========================================================================
HTTP payloads
======================================================================== */

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

impl<'a> ChatCompletionRequest<'a> {
    fn build(cfg: &'a ModelConfig, model: &'a str, req: &ChatRequest<'a>) -> Self {
        let mut messages = Vec::with_capacity(2);
        if !req.system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: req.system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: req.user,
        });
        Self {
            model,
            messages,
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            max_tokens: cfg.max_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageOut,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    cached_tokens: Option<u64>,
}
