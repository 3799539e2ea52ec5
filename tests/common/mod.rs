//! Shared test double for integration tests. `oracle::NullOracle` is
//! `#[cfg(test)]`-gated inside the library crate itself, so it isn't
//! visible here; this is a separate, equally inert implementation kept in
//! sync with the same stub shape.

use async_trait::async_trait;
use evidence_toolkit::oracle::{Oracle, OracleError, OracleResult, TokenUsage};
use evidence_toolkit::schema::{
    CommunicationPattern, DocumentAnalysis, DocumentType, EmailAnalysis, EntityMatchDecision, ExecutiveSummary, ImageAnalysis, LegalPatterns,
    LegalSignificance, Sentiment,
};
use serde_json::Value;

/// Never calls out to a network; every method returns a fixed, valid
/// payload so pipeline tests exercise orchestration, not oracle behavior.
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
                communication_pattern: CommunicationPattern::Professional,
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

/// An oracle whose analyze calls always time out, to exercise failure
/// isolation in the analyze stage.
pub struct FailingOracle;

#[async_trait]
impl Oracle for FailingOracle {
    async fn analyze_document(&self, _text: &str, _prompt: &str, _schema: &Value) -> OracleResult<(DocumentAnalysis, TokenUsage)> {
        Err(OracleError::Timeout)
    }

    async fn analyze_email(&self, _thread_text: &str, _prompt: &str, _schema: &Value) -> OracleResult<(EmailAnalysis, TokenUsage)> {
        Err(OracleError::Timeout)
    }

    async fn analyze_image(&self, _bytes: &[u8], _mime: &str, _prompt: &str, _schema: &Value) -> OracleResult<(ImageAnalysis, TokenUsage)> {
        Err(OracleError::Timeout)
    }

    async fn resolve_entity_pair(
        &self,
        _a: &str,
        _b: &str,
        _contexts: &[String],
        _prompt: &str,
        _schema: &Value,
    ) -> OracleResult<(EntityMatchDecision, TokenUsage)> {
        Err(OracleError::Timeout)
    }

    async fn summarize_case(&self, _correlation_input: &Value, _prompt: &str, _schema: &Value) -> OracleResult<(ExecutiveSummary, TokenUsage)> {
        Err(OracleError::Timeout)
    }

    async fn detect_legal_patterns(&self, _correlation_input: &Value, _prompt: &str, _schema: &Value) -> OracleResult<(LegalPatterns, TokenUsage)> {
        Err(OracleError::Timeout)
    }
}
