use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::retry::RetryPolicy;

/// Per-step execution limits.
#[derive(Debug, Clone)]
pub struct StepOptions {
    /// How long a single attempt may run before it is cut off.
    pub start_to_close: Duration,
    /// Retry schedule across attempts.
    pub retry: RetryPolicy,
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            start_to_close: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}

/// A step that exhausted its attempts.
#[derive(Debug, Clone, Error)]
#[error("step '{step}' failed after {attempts} attempt(s): {reason}")]
pub struct StepError {
    pub step: String,
    pub attempts: u32,
    pub reason: String,
}

/// Runs `attempt` under the step's timeout and retry schedule.
///
/// Each call to `attempt` produces a fresh future with its own
/// `start_to_close` window. A timeout counts as a failed attempt like
/// any other error. The last failure's text ends up in the returned
/// [`StepError`].
pub async fn execute_step<T, E, F, Fut>(
    step: &str,
    options: &StepOptions,
    mut attempt: F,
) -> Result<T, StepError>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts_made = 0;
    loop {
        attempts_made += 1;
        let outcome = tokio::time::timeout(options.start_to_close, attempt()).await;

        let reason = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("timed out after {:?}", options.start_to_close),
        };

        if !options.retry.should_retry(attempts_made) {
            metrics::counter!("step_failures_total").increment(1);
            return Err(StepError {
                step: step.to_string(),
                attempts: attempts_made,
                reason,
            });
        }

        warn!(step, attempt = attempts_made, %reason, "step attempt failed, retrying");
        metrics::counter!("step_retries_total").increment(1);
        tokio::time::sleep(options.retry.delay_before_attempt(attempts_made + 1)).await;
    }
}
