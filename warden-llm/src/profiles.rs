//! Profile routing: one service, two logical models.
//!
//! - `review` — quality model used for hunk analysis.
//! - `fast`   — lightweight model for extraction repair and semantic
//!   dedup; falls back to `review` when not configured.
//!
//! Construct once, wrap in `Arc`, pass clones to the pipeline.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{ModelConfig, RetryPolicy, profile_from_env};
use crate::error::{LlmError, LlmResult};
use crate::providers::{ChatOutcome, ChatRequest, LlmClient};
use crate::retry::{RetryObserver, chat_with_retry};

/// Shared LLM service owning the review and fast profiles.
pub struct LlmService {
    review: Arc<LlmClient>,
    fast: Option<Arc<LlmClient>>,
    retry: RetryPolicy,
}

impl LlmService {
    pub fn new(review: LlmClient, fast: Option<LlmClient>, retry: RetryPolicy) -> Self {
        Self {
            review: Arc::new(review),
            fast: fast.map(Arc::new),
            retry,
        }
    }

    /// Loads profiles from `WARDEN_LLM_REVIEW_*` / `WARDEN_LLM_FAST_*`.
    ///
    /// The review profile is mandatory; the fast profile is optional.
    pub fn from_env() -> LlmResult<Self> {
        let review_cfg = profile_from_env("WARDEN_LLM_REVIEW")?.ok_or_else(|| {
            LlmError::Config("missing required environment variable: WARDEN_LLM_REVIEW_PROVIDER".into())
        })?;
        let fast_cfg = profile_from_env("WARDEN_LLM_FAST")?;

        info!(
            review.provider = %review_cfg.provider,
            review.model = %review_cfg.model,
            fast_present = fast_cfg.is_some(),
            "LlmService initialized"
        );

        let review = LlmClient::from_config(review_cfg)?;
        let fast = fast_cfg.map(LlmClient::from_config).transpose()?;
        Ok(Self::new(review, fast, RetryPolicy::default()))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn review_config(&self) -> &ModelConfig {
        self.review.config()
    }

    /// One analysis round trip on the review profile, with retry.
    pub async fn generate_review(
        &self,
        req: &ChatRequest<'_>,
        cancel: &CancellationToken,
        observer: Option<&dyn RetryObserver>,
    ) -> LlmResult<ChatOutcome> {
        chat_with_retry(&self.review, req, &self.retry, cancel, observer).await
    }

    /// One round trip on the fast profile (review profile when absent).
    pub async fn generate_fast(
        &self,
        req: &ChatRequest<'_>,
        cancel: &CancellationToken,
        observer: Option<&dyn RetryObserver>,
    ) -> LlmResult<ChatOutcome> {
        let client = self.fast.as_ref().unwrap_or(&self.review);
        chat_with_retry(client, req, &self.retry, cancel, observer).await
    }
}

#[cfg(feature = "test-utils")]
impl LlmService {
    /// Service whose both profiles are the given scripted client.
    pub fn scripted(client: crate::providers::script::ScriptedClient) -> Self {
        Self::new(
            LlmClient::Scripted(client),
            None,
            RetryPolicy {
                max_retries: 3,
                initial_delay_ms: 1,
                backoff_multiplier: 1.0,
                max_delay_ms: 5,
            },
        )
    }

    /// Service with distinct scripted review and fast clients.
    pub fn scripted_pair(
        review: crate::providers::script::ScriptedClient,
        fast: crate::providers::script::ScriptedClient,
    ) -> Self {
        Self::new(
            LlmClient::Scripted(review),
            Some(LlmClient::Scripted(fast)),
            RetryPolicy {
                max_retries: 3,
                initial_delay_ms: 1,
                backoff_multiplier: 1.0,
                max_delay_ms: 5,
            },
        )
    }

    /// Access to the scripted review client, for request assertions.
    pub fn scripted_review(&self) -> &crate::providers::script::ScriptedClient {
        match self.review.as_ref() {
            LlmClient::Scripted(c) => c,
            _ => panic!("review profile is not scripted"),
        }
    }
}
