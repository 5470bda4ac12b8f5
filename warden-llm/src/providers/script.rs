//! Scripted client for tests (behind the `test-utils` feature).
//!
//! Plays back a queue of canned outcomes; records every request it saw so
//! tests can assert on prompt contents. When the queue runs dry the client
//! keeps returning the configured fallback text (`"[]"` by default), which
//! parses as an empty findings array.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::config::{ModelConfig, Provider};
use crate::error::{LlmError, LlmResult};
use crate::providers::{ChatOutcome, ChatRequest};
use crate::usage::UsageStats;

/// One scripted reply.
pub enum ScriptStep {
    Text(String),
    Fail(LlmError),
}

/// Record of one observed call.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub system: String,
    pub user: String,
    pub model_override: Option<String>,
}

pub struct ScriptedClient {
    cfg: ModelConfig,
    steps: Mutex<VecDeque<ScriptStep>>,
    seen: Mutex<Vec<SeenRequest>>,
    fallback: String,
}

impl ScriptedClient {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            cfg: ModelConfig {
                provider: Provider::OpenAi,
                model: "scripted".into(),
                endpoint: "http://scripted.invalid".into(),
                api_key: Some("test".into()),
                max_tokens: None,
                temperature: None,
                top_p: None,
                timeout_secs: None,
                input_usd_per_mtok: None,
                output_usd_per_mtok: None,
            },
            steps: Mutex::new(steps.into()),
            seen: Mutex::new(Vec::new()),
            fallback: "[]".into(),
        }
    }

    /// Replies `text` to every call, forever.
    pub fn always(text: &str) -> Self {
        let mut c = Self::new(Vec::new());
        c.fallback = text.to_string();
        c
    }

    pub fn config(&self) -> &ModelConfig {
        &self.cfg
    }

    /// Requests observed so far, in call order.
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub async fn chat(&self, req: &ChatRequest<'_>) -> LlmResult<ChatOutcome> {
        self.seen.lock().unwrap().push(SeenRequest {
            system: req.system.to_string(),
            user: req.user.to_string(),
            model_override: req.model_override.map(str::to_string),
        });

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(ScriptStep::Fail(e)) => Err(e),
            Some(ScriptStep::Text(t)) => Ok(outcome(t)),
            None => Ok(outcome(self.fallback.clone())),
        }
    }
}

fn outcome(text: String) -> ChatOutcome {
    ChatOutcome {
        text,
        usage: UsageStats {
            input_tokens: 100,
            output_tokens: 20,
            cache_read_input_tokens: None,
            cache_creation_input_tokens: None,
            cost_usd: 0.0,
        },
    }
}
