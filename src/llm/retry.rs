use std::time::Duration;

use tracing::warn;

use crate::models::TraceRecord;

use super::client::{Completion, LlmClient, LlmError, LlmRequest};

/// Bounded retry with doubling backoff for transient provider errors
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff before the first retry; doubles per subsequent retry
    pub initial_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Policy with no waiting between attempts
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff_ms: 0,
        }
    }
}

/// Result of a retried invocation. Failed attempts were still billed, so
/// their traces are carried regardless of the final outcome; on terminal
/// failure the last attempt's trace is also in `failed_attempts`.
#[derive(Debug)]
pub struct CallOutcome {
    pub result: Result<Completion, LlmError>,
    pub failed_attempts: Vec<TraceRecord>,
}

impl CallOutcome {
    /// Every billed trace of this call, failed attempts first
    pub fn all_traces(&self) -> Vec<TraceRecord> {
        let mut traces = self.failed_attempts.clone();
        if let Ok(completion) = &self.result {
            traces.push(completion.trace.clone());
        }
        traces
    }
}

/// Invoke with the policy's bounded retries. `ProviderUnavailable` and
/// `ProviderTimeout` are retried; `ProviderRejected` surfaces immediately.
pub async fn invoke_with_retry(
    client: &dyn LlmClient,
    request: &LlmRequest,
    policy: &RetryPolicy,
) -> CallOutcome {
    let mut failed_attempts = Vec::new();
    let mut backoff_ms = policy.initial_backoff_ms;

    for attempt in 0..=policy.max_retries {
        match client.invoke(request).await {
            Ok(completion) => {
                return CallOutcome {
                    result: Ok(completion),
                    failed_attempts,
                };
            }
            Err(error) => {
                failed_attempts.push(error.trace().clone());
                let exhausted = attempt == policy.max_retries;
                if !error.is_transient() || exhausted {
                    return CallOutcome {
                        result: Err(error),
                        failed_attempts,
                    };
                }
                warn!(
                    label = %request.label,
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    "transient provider error, retrying: {error}"
                );
                if backoff_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    unreachable!("retry loop always returns")
}
