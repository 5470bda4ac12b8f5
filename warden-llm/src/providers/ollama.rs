//! Ollama client (`POST {endpoint}/api/generate`, non-streaming).
//!
//! System and user prompts are concatenated into a single prompt; Ollama's
//! `prompt_eval_count` / `eval_count` map onto input/output token counts.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::{ModelConfig, Provider};
use crate::error::{LlmError, LlmResult, make_snippet};
use crate::providers::{ChatOutcome, ChatRequest};
use crate::usage::UsageStats;

/// Concrete Ollama client.
#[derive(Debug)]
pub struct OllamaClient {
    client: reqwest::Client,
    cfg: ModelConfig,
    url_generate: String,
}

impl OllamaClient {
    pub fn new(cfg: ModelConfig) -> LlmResult<Self> {
        if cfg.provider != Provider::Ollama {
            return Err(LlmError::Config(
                "OllamaClient constructed with a non-ollama profile".into(),
            ));
        }
        let endpoint = cfg.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(LlmError::Config(format!(
                "invalid endpoint: {}",
                cfg.endpoint
            )));
        }

        let client = reqwest::Client::builder().timeout(cfg.timeout()).build()?;
        let url_generate = format!("{}/api/generate", endpoint.trim_end_matches('/'));

        info!(
            model = %cfg.model,
            endpoint = %cfg.endpoint,
            "OllamaClient initialized"
        );

        Ok(Self {
            client,
            cfg,
            url_generate,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.cfg
    }

    /// Call `/api/generate` with a combined system+user prompt.
    pub async fn chat(&self, req: &ChatRequest<'_>) -> LlmResult<ChatOutcome> {
        let started = Instant::now();
        let model = req.model_override.unwrap_or(&self.cfg.model);
        let full_prompt = if req.system.is_empty() {
            req.user.to_string()
        } else {
            format!("{}\n\n{}", req.system, req.user)
        };

        let body = GenerateRequest {
            model,
            prompt: &full_prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.cfg.temperature,
                top_p: self.cfg.top_p,
                num_predict: self.cfg.max_tokens,
            },
        };

        debug!(
            model = %model,
            prompt_len = full_prompt.len(),
            "POST {}", self.url_generate
        );

        let resp = self
            .client
            .post(&self.url_generate)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            let snippet = make_snippet(&text);
            error!(
                status,
                %snippet,
                model = %model,
                latency_ms = started.elapsed().as_millis(),
                "ollama generate returned non-success status"
            );
            return Err(LlmError::from_status("ollama", status, snippet));
        }

        let out: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Decode(format!("serde error: {e}; expected `response`")))?;

        let mut usage = UsageStats {
            input_tokens: out.prompt_eval_count.unwrap_or(0),
            output_tokens: out.eval_count.unwrap_or(0),
            cache_read_input_tokens: None,
            cache_creation_input_tokens: None,
            cost_usd: 0.0,
        };
        usage.derive_cost(&self.cfg);

        info!(
            model = %model,
            latency_ms = started.elapsed().as_millis(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "generate completed"
        );

        Ok(ChatOutcome {
            text: out.response,
            usage,
        })
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}
