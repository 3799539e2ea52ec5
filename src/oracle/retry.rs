//! Bounded exponential backoff decorator, same shape as `legalis-llm`'s
//! `resilience::RetryProvider`.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;

use super::{Oracle, OracleError, OracleResult, TokenUsage};
use crate::schema::{DocumentAnalysis, EmailAnalysis, EntityMatchDecision, ExecutiveSummary, ImageAnalysis, LegalPatterns};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    /// 3 attempts, 1s initial, 30s cap (spec §5).
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let delay_ms = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);
        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }
}

/// Wraps an `Oracle`, retrying only the errors `OracleError::is_retryable`
/// reports (spec §4.4 failure semantics): refusals, incompleteness, and
/// schema-invalid responses are surfaced to the caller immediately.
pub struct RetryingOracle<O> {
    inner: O,
    config: RetryConfig,
}

impl<O: Oracle> RetryingOracle<O> {
    pub fn new(inner: O) -> Self {
        RetryingOracle {
            inner,
            config: RetryConfig::default(),
        }
    }

    pub fn with_config(inner: O, config: RetryConfig) -> Self {
        RetryingOracle { inner, config }
    }
}

macro_rules! retrying_call {
    ($self:expr, $method:ident ( $($arg:expr),* $(,)? )) => {{
        let mut last_err = None;
        for attempt in 0..$self.config.max_attempts {
            if attempt > 0 {
                let delay = $self.config.delay_for_attempt(attempt);
                tracing::debug!(attempt, ?delay, "retrying oracle call");
                sleep(delay).await;
            }
            match $self.inner.$method($($arg),*).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() => {
                    tracing::warn!(attempt, error = %e, "oracle call failed, will retry if attempts remain");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(OracleError::Timeout))
    }};
}

#[async_trait]
impl<O: Oracle> Oracle for RetryingOracle<O> {
    async fn analyze_document(&self, text: &str, prompt: &str, schema: &Value) -> OracleResult<(DocumentAnalysis, TokenUsage)> {
        retrying_call!(self, analyze_document(text, prompt, schema))
    }

    async fn analyze_email(&self, thread_text: &str, prompt: &str, schema: &Value) -> OracleResult<(EmailAnalysis, TokenUsage)> {
        retrying_call!(self, analyze_email(thread_text, prompt, schema))
    }

    async fn analyze_image(&self, bytes: &[u8], mime: &str, prompt: &str, schema: &Value) -> OracleResult<(ImageAnalysis, TokenUsage)> {
        retrying_call!(self, analyze_image(bytes, mime, prompt, schema))
    }

    async fn resolve_entity_pair(
        &self,
        a: &str,
        b: &str,
        contexts: &[String],
        prompt: &str,
        schema: &Value,
    ) -> OracleResult<(EntityMatchDecision, TokenUsage)> {
        retrying_call!(self, resolve_entity_pair(a, b, contexts, prompt, schema))
    }

    async fn summarize_case(&self, correlation_input: &Value, prompt: &str, schema: &Value) -> OracleResult<(ExecutiveSummary, TokenUsage)> {
        retrying_call!(self, summarize_case(correlation_input, prompt, schema))
    }

    async fn detect_legal_patterns(&self, correlation_input: &Value, prompt: &str, schema: &Value) -> OracleResult<(LegalPatterns, TokenUsage)> {
        retrying_call!(self, detect_legal_patterns(correlation_input, prompt, schema))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_for_attempt_follows_spec_bounds() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(cfg.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(cfg.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(cfg.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(cfg.delay_for_attempt(20), cfg.max_delay);
    }
}
