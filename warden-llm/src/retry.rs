//! Retry wrapper around one prompt/response round trip.
//!
//! Retries only errors classified retryable by [`LlmError::is_retryable`]
//! (429, 5xx, connect failures, timeouts). Auth errors and other 4xx pass
//! through untouched. A 429 carrying `Retry-After` uses that delay instead
//! of the computed backoff, still capped by `max_delay_ms`. The
//! cancellation token interrupts both the in-flight request and any
//! pending backoff sleep.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RetryPolicy;
use crate::error::{LlmError, LlmResult};
use crate::providers::{ChatOutcome, ChatRequest, LlmClient};

/// Observer for retry attempts; the pipeline forwards these into its
/// progress event channel.
pub trait RetryObserver: Send + Sync {
    fn on_retry(&self, attempt: usize, delay_ms: u64, error: &str);
}

/// Runs `client.chat(req)` with exponential backoff.
///
/// Attempt numbering is 1-indexed: `max_retries = 3` allows up to four
/// round trips. Returns [`LlmError::RetriesExhausted`] when the budget is
/// consumed, [`LlmError::Aborted`] when the token fires.
pub async fn chat_with_retry(
    client: &LlmClient,
    req: &ChatRequest<'_>,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    observer: Option<&dyn RetryObserver>,
) -> LlmResult<ChatOutcome> {
    let mut attempt = 0usize;

    loop {
        attempt += 1;

        if cancel.is_cancelled() {
            return Err(LlmError::Aborted);
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(LlmError::Aborted),
            r = client.chat(req) => r,
        };

        let err = match result {
            Ok(out) => {
                if attempt > 1 {
                    debug!(attempt, "llm call succeeded after retries");
                }
                return Ok(out);
            }
            Err(e) => e,
        };

        if !err.is_retryable() {
            return Err(err);
        }
        if attempt > policy.max_retries {
            return Err(LlmError::RetriesExhausted {
                attempts: attempt,
                last: Box::new(err),
            });
        }

        // Retry-After wins over computed backoff, still capped.
        let delay = match &err {
            LlmError::RateLimited {
                retry_after_secs: Some(secs),
            } => {
                let ms = secs.saturating_mul(1_000).min(policy.max_delay_ms);
                std::time::Duration::from_millis(ms)
            }
            _ => policy.backoff_delay(attempt),
        };

        let error_text = err.to_string();
        if let Some(obs) = observer {
            obs.on_retry(attempt, delay.as_millis() as u64, &error_text);
        }
        debug!(
            attempt,
            max = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %error_text,
            "retrying llm call"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(LlmError::Aborted),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
