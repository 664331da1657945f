// src/provider/retry.rs — Retry with exponential backoff for model providers
//
// Wraps any ModelProvider with automatic retry on transient failures.
// Retries: rate limits (429), server errors (5xx), timeouts, connection resets.
// Does NOT retry: bad request (400), auth errors (401, 403), parse failures.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{ChatRequest, ChatResponse, ModelProvider};
use crate::infra::config::RetrySettings;
use crate::infra::errors::TipsError;

const BACKOFF_FACTOR: f64 = 2.0;
const JITTER_FRACTION: f64 = 0.2;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(s: &RetrySettings) -> Self {
        Self {
            max_retries: s.max_retries,
            initial_delay: Duration::from_millis(s.initial_delay_ms),
            backoff_factor: BACKOFF_FACTOR,
            max_delay: Duration::from_millis(s.max_delay_ms),
            jitter_fraction: JITTER_FRACTION,
        }
    }
}

/// A provider wrapper that adds retry with exponential backoff to both
/// `chat()` and `embed()`.
pub struct RetryProvider {
    inner: Arc<dyn ModelProvider>,
    config: RetryConfig,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn ModelProvider>) -> Self {
        Self {
            inner,
            config: RetryConfig::default(),
        }
    }

    pub fn with_config(inner: Arc<dyn ModelProvider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Calculate the delay for a given retry attempt (0-indexed).
    fn delay_for_attempt(&self, attempt: u32, rate_limit_delay: Option<Duration>) -> Duration {
        if let Some(rl_delay) = rate_limit_delay {
            return rl_delay + Duration::from_millis(100);
        }

        let base_ms = self.config.initial_delay.as_millis() as f64
            * self.config.backoff_factor.powi(attempt as i32);
        let capped_ms = base_ms.min(self.config.max_delay.as_millis() as f64);

        let jitter = deterministic_jitter(attempt, self.config.jitter_fraction);
        Duration::from_millis((capped_ms * jitter) as u64)
    }

    async fn with_retries<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T, TipsError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TipsError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retriable() || attempt >= self.config.max_retries => {
                    return Err(e)
                }
                Err(e) => {
                    let delay = self.delay_for_attempt(attempt, rate_limit_delay(&e));
                    tracing::warn!(
                        provider = self.inner.id(),
                        op,
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after error: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Extract rate-limit retry delay from the error, if available.
fn rate_limit_delay(error: &TipsError) -> Option<Duration> {
    match error {
        TipsError::RateLimited { retry_after_ms, .. } if *retry_after_ms > 0 => {
            Some(Duration::from_millis(*retry_after_ms))
        }
        _ => None,
    }
}

/// Deterministic jitter for a given attempt to keep retries reproducible in tests.
/// Returns a multiplier in [1 - fraction, 1 + fraction].
fn deterministic_jitter(attempt: u32, fraction: f64) -> f64 {
    let hash = (attempt.wrapping_mul(2654435761)) as f64 / u32::MAX as f64;
    1.0 + fraction * (2.0 * hash - 1.0)
}

#[async_trait]
impl ModelProvider for RetryProvider {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, TipsError> {
        self.with_retries("chat", || self.inner.chat(request.clone()))
            .await
    }

    async fn embed(&self, model: &str, texts: &[&str]) -> Result<Vec<Vec<f32>>, TipsError> {
        self.with_retries("embed", || self.inner.embed(model, texts))
            .await
    }
}
