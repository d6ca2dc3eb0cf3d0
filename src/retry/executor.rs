use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::config::{RetryConfig, RetryPolicyConfig};
use crate::error::{ErrorClass, FlightdeckError, Result};

use super::classifier::{ErrorClassifier, KeywordClassifier};

/// Details of one scheduled retry, passed to the caller's observer
/// before the backoff sleep.
#[derive(Debug, Clone)]
pub struct RetryEvent {
    pub class: ErrorClass,
    /// Attempts charged against this class's own budget so far.
    pub class_attempt: u32,
    /// Attempts across all classes, bounded by the global cap.
    pub total_attempt: u32,
    pub delay: Duration,
    pub error: String,
}

/// Runs a fallible operation under per-class retry policies.
///
/// Each failure is classified, then charged against that class's own
/// `max_attempts` budget — consecutive failures that reclassify to a
/// different class draw from that class's budget instead. A global
/// attempt cap bounds the total number of tries regardless of how the
/// classification wanders, guaranteeing termination.
pub struct RetryExecutor {
    config: RetryConfig,
    classifier: Arc<dyn ErrorClassifier>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            classifier: Arc::new(KeywordClassifier),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_with_observer(operation, |_| {}).await
    }

    /// Like `execute`, invoking `on_retry` once per scheduled retry.
    pub async fn execute_with_observer<T, F, Fut, O>(&self, operation: F, on_retry: O) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
        O: Fn(&RetryEvent),
    {
        let mut attempts_by_class: HashMap<ErrorClass, u32> = HashMap::new();
        let mut total_attempts = 0u32;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            total_attempts += 1;
            let class = self.classifier.classify(&error);
            let policy = self.config.policy(class);
            let class_attempts = attempts_by_class.entry(class).or_insert(0);
            *class_attempts += 1;
            let class_attempts = *class_attempts;

            let class_exhausted = class_attempts >= policy.max_attempts;
            let globally_exhausted = total_attempts >= self.config.global_max_attempts;
            if class_exhausted || globally_exhausted {
                warn!(
                    class = %class,
                    class_attempts,
                    total_attempts,
                    global_cap_hit = globally_exhausted,
                    "Retries exhausted"
                );
                return Err(FlightdeckError::RetryExhausted {
                    class,
                    attempts: total_attempts,
                    message: error.to_string(),
                });
            }

            let delay = next_delay(&policy, class, class_attempts, &error);
            debug!(
                class = %class,
                class_attempts,
                total_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying after backoff"
            );
            on_retry(&RetryEvent {
                class,
                class_attempt: class_attempts,
                total_attempt: total_attempts,
                delay,
                error: error.to_string(),
            });
            tokio::time::sleep(delay).await;
        }
    }
}

/// Delay before the next retry: exponential backoff with jitter, floored
/// by any server-provided Retry-After hint on rate-limit failures. The
/// floor may exceed `max_delay` — the server's number wins.
fn next_delay(
    policy: &RetryPolicyConfig,
    class: ErrorClass,
    attempt: u32,
    error: &FlightdeckError,
) -> Duration {
    let delay = jittered(backoff_delay(policy, attempt), policy.jitter_fraction);
    if class == ErrorClass::RateLimit {
        if let Some(secs) = ErrorClass::extract_retry_after(&error.to_string()) {
            return delay.max(Duration::from_secs(secs));
        }
    }
    delay
}

/// Deterministic backoff component: `min(base * multiplier^(attempt-1), max)`.
/// `attempt` is 1-based (the delay before the first retry uses the base).
fn backoff_delay(policy: &RetryPolicyConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(63);
    let factor = policy.backoff_multiplier.max(1.0).powi(exponent as i32);
    let delay_ms = (policy.base_delay_ms as f64 * factor).min(policy.max_delay_ms as f64);
    Duration::from_millis(delay_ms as u64)
}

fn jittered(delay: Duration, jitter_fraction: f64) -> Duration {
    if jitter_fraction <= 0.0 || delay.is_zero() {
        return delay;
    }
    let jitter_fraction = jitter_fraction.min(1.0);
    let factor = rand::thread_rng().gen_range(1.0 - jitter_fraction..=1.0 + jitter_fraction);
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}
