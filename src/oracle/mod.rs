//! The oracle boundary: a typed wrapper over an external structured-output
//! LLM endpoint (spec §4.4). Grounded on `legalis-llm`'s `LLMProvider` trait
//! (`providers.rs`) and its `resilience::RetryProvider` decorator.

mod http;
mod retry;

pub use http::HttpOracle;
pub use retry::{RetryConfig, RetryingOracle};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::hashing::sha256_bytes;
use crate::schema::{DocumentAnalysis, EmailAnalysis, EntityMatchDecision, ExecutiveSummary, ImageAnalysis, LegalPatterns};

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle call timed out")]
    Timeout,
    #[error("oracle rate-limited the request")]
    RateLimited,
    #[error("oracle server error: {0}")]
    ServerError(String),
    #[error("oracle refused to answer: {0}")]
    Refusal(String),
    #[error("oracle returned an incomplete response: {0}")]
    Incomplete(String),
    #[error("oracle response failed schema validation: {0}")]
    SchemaInvalid(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl OracleError {
    /// Transient errors are retried by `RetryingOracle`; everything else is
    /// fatal for the call (spec §4.4 failure semantics).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OracleError::Timeout | OracleError::RateLimited | OracleError::ServerError(_) | OracleError::Transport(_)
        )
    }
}

pub type OracleResult<T> = Result<T, OracleError>;

/// Token usage returned by a call, when the provider reports it (spec §4.4
/// contracts: "Token counts (in/out) are recorded when the provider returns
/// them").
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

/// The six structured-output operations the rest of the system needs from
/// an external oracle (spec §4.4). Every method hashes its own prompt so
/// callers can record `prompt_hash` in the resulting `AnalysisRecord`
/// without re-deriving it.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn analyze_document(&self, text: &str, prompt: &str, schema: &Value) -> OracleResult<(DocumentAnalysis, TokenUsage)>;

    async fn analyze_email(&self, thread_text: &str, prompt: &str, schema: &Value) -> OracleResult<(EmailAnalysis, TokenUsage)>;

    async fn analyze_image(&self, bytes: &[u8], mime: &str, prompt: &str, schema: &Value) -> OracleResult<(ImageAnalysis, TokenUsage)>;

    async fn resolve_entity_pair(
        &self,
        a: &str,
        b: &str,
        contexts: &[String],
        prompt: &str,
        schema: &Value,
    ) -> OracleResult<(EntityMatchDecision, TokenUsage)>;

    async fn summarize_case(&self, correlation_input: &Value, prompt: &str, schema: &Value) -> OracleResult<(ExecutiveSummary, TokenUsage)>;

    /// Cross-evidence legal pattern detection (spec §4.6 Stage 5):
    /// contradictions, corroboration groups, and evidence gaps over the
    /// correlation input supplied as structured context.
    async fn detect_legal_patterns(&self, correlation_input: &Value, prompt: &str, schema: &Value) -> OracleResult<(LegalPatterns, TokenUsage)>;
}

/// SHA-256 of prompt text, stored in `AnalysisParameters.prompt_hash` (spec
/// §4.4 contracts).
pub fn prompt_hash(prompt: &str) -> String {
    sha256_bytes(prompt.as_bytes())
}

/// Parse a raw JSON response body into `T`, mapping shape mismatches to the
/// oracle's own schema-invalid bucket rather than letting serde_json's error
/// leak past this boundary (spec §4.4: "non-retryable schema-validation
/// failures on responses are fatal for that call").
pub(crate) fn parse_structured<T: DeserializeOwned>(raw: &Value) -> OracleResult<T> {
    serde_json::from_value(raw.clone()).map_err(|e| OracleError::SchemaInvalid(e.to_string()))
}

#[cfg(test)]
pub use tests::NullOracle;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        DocumentAnalysis, DocumentType, EmailAnalysis, EntityMatchDecision, ExecutiveSummary, ImageAnalysis, LegalPatterns, LegalSignificance,
        Sentiment,
    };

    /// Test double used by analyzer and correlator unit tests so they never
    /// perform network I/O (spec §4.4, SPEC_FULL §4.4).
    pub struct NullOracle;

    #[async_trait]
    impl Oracle for NullOracle {
        async fn analyze_document(&self, _text: &str, _prompt: &str, _schema: &Value) -> OracleResult<(DocumentAnalysis, TokenUsage)> {
            Ok((
                DocumentAnalysis {
                    summary: "stub summary".to_string(),
                    entities: Vec::new(),
                    document_type: DocumentType::Letter,
                    sentiment: Sentiment::Neutral,
                    legal_significance: LegalSignificance::Low,
                    risk_flags: Vec::new(),
                    confidence_overall: 0.5,
                },
                TokenUsage::default(),
            ))
        }

        async fn analyze_email(&self, _thread_text: &str, _prompt: &str, _schema: &Value) -> OracleResult<(EmailAnalysis, TokenUsage)> {
            Ok((
                EmailAnalysis {
                    thread_summary: "stub thread".to_string(),
                    participants: Vec::new(),
                    communication_pattern: crate::schema::CommunicationPattern::Professional,
                    sentiment_progression: Vec::new(),
                    escalation_events: Vec::new(),
                    legal_significance: LegalSignificance::Low,
                    risk_flags: Vec::new(),
                    timeline: Vec::new(),
                    confidence_overall: 0.5,
                },
                TokenUsage::default(),
            ))
        }

        async fn analyze_image(&self, _bytes: &[u8], _mime: &str, _prompt: &str, _schema: &Value) -> OracleResult<(ImageAnalysis, TokenUsage)> {
            Ok((
                ImageAnalysis {
                    summary: "stub image".to_string(),
                    objects: Vec::new(),
                    ocr_text: None,
                    risk_flags: Vec::new(),
                    confidence_overall: 0.5,
                },
                TokenUsage::default(),
            ))
        }

        async fn resolve_entity_pair(
            &self,
            _a: &str,
            _b: &str,
            _contexts: &[String],
            _prompt: &str,
            _schema: &Value,
        ) -> OracleResult<(EntityMatchDecision, TokenUsage)> {
            Ok((
                EntityMatchDecision {
                    is_same_entity: false,
                    confidence: 0.5,
                    supporting_signals: Vec::new(),
                    conflicting_signals: Vec::new(),
                    reasoning: "stub".to_string(),
                },
                TokenUsage::default(),
            ))
        }

        async fn summarize_case(&self, _correlation_input: &Value, _prompt: &str, _schema: &Value) -> OracleResult<(ExecutiveSummary, TokenUsage)> {
            Ok((
                ExecutiveSummary {
                    summary: "stub case summary".to_string(),
                    key_findings: Vec::new(),
                    recommended_actions: None,
                },
                TokenUsage::default(),
            ))
        }

        async fn detect_legal_patterns(&self, _correlation_input: &Value, _prompt: &str, _schema: &Value) -> OracleResult<(LegalPatterns, TokenUsage)> {
            Ok((LegalPatterns::default(), TokenUsage::default()))
        }
    }

    #[test]
    fn prompt_hash_is_64_hex_chars() {
        let h = prompt_hash("analyze this document");
        assert_eq!(h.len(), 64);
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(OracleError::Timeout.is_retryable());
        assert!(OracleError::RateLimited.is_retryable());
        assert!(!OracleError::Refusal("no".to_string()).is_retryable());
        assert!(!OracleError::SchemaInvalid("bad".to_string()).is_retryable());
    }
}
