//! Per-evidence analysis records: the oracle's structured output, typed and
//! wrapped with the audit metadata required for custody (spec §3 AnalysisRecord,
//! §4.5 DocumentAnalyzer/EmailAnalyzer/ImageAnalyzer).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::common::{round4, round4_opt, validate_unit_interval, Validate};
use super::evidence::EvidenceType;

/// Union of risk flags across analyzers (spec §7). Which subset is legal for
/// a given evidence type is enforced by `RiskFlag::allowed_for`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    Threatening,
    Deadline,
    Pii,
    Confidential,
    TimeSensitive,
    RetaliationIndicators,
    Harassment,
    Discrimination,
    LowQuality,
    TamperingSuspected,
    OcrAmbiguous,
    Nsfw,
}

impl RiskFlag {
    pub fn allowed_for(self, evidence_type: EvidenceType) -> bool {
        use EvidenceType::*;
        use RiskFlag::*;
        match evidence_type {
            Document | Email => matches!(
                self,
                Threatening
                    | Deadline
                    | Pii
                    | Confidential
                    | TimeSensitive
                    | RetaliationIndicators
                    | Harassment
                    | Discrimination
            ),
            Image => matches!(self, LowQuality | TamperingSuspected | OcrAmbiguous | Nsfw | Pii),
            Other => false,
        }
    }

    /// "Critical" flags trigger elevated pattern detection (spec §7).
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            RiskFlag::RetaliationIndicators
                | RiskFlag::Harassment
                | RiskFlag::Discrimination
                | RiskFlag::Threatening
        )
    }
}

pub fn validate_risk_flags(flags: &[RiskFlag], evidence_type: EvidenceType) -> Result<(), String> {
    for flag in flags {
        if !flag.allowed_for(evidence_type) {
            return Err(format!("{flag:?} is not a valid risk flag for {evidence_type:?}"));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------
// DocumentAnalysis (spec §4.5)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentEntityType {
    Person,
    Organization,
    Date,
    LegalTerm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: DocumentEntityType,
    #[serde(serialize_with = "round4")]
    pub confidence: f64,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quoted_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub associated_event: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Email,
    Letter,
    Contract,
    Filing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Hostile,
    Neutral,
    Professional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalSignificance {
    Low,
    Medium,
    High,
    Critical,
}

/// The oracle's structured output for a document (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub summary: String,
    pub entities: Vec<DocumentEntity>,
    pub document_type: DocumentType,
    pub sentiment: Sentiment,
    pub legal_significance: LegalSignificance,
    pub risk_flags: Vec<RiskFlag>,
    #[serde(serialize_with = "round4")]
    pub confidence_overall: f64,
}

/// Word-frequency statistics computed purely locally, never by the oracle
/// (spec §4.5). Kept alongside the oracle output rather than inside it,
/// since it has a different provenance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WordFrequencyStats {
    pub top_words: Vec<(String, u32)>,
    pub total_words: u32,
    pub unique_words: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAnalysisOutput {
    pub local_stats: WordFrequencyStats,
    pub ai: DocumentAnalysis,
}

impl Validate for DocumentAnalysisOutput {
    fn validate(&self) -> Result<(), String> {
        validate_unit_interval("confidence_overall", self.ai.confidence_overall)?;
        for e in &self.ai.entities {
            validate_unit_interval("entity confidence", e.confidence)?;
        }
        validate_risk_flags(&self.ai.risk_flags, EvidenceType::Document)
    }
}

// ---------------------------------------------------------------------
// EmailAnalysis (spec §4.5)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityLevel {
    Executive,
    Management,
    Employee,
    External,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailParticipant {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub authority_level: AuthorityLevel,
    pub message_count: u32,
    #[serde(serialize_with = "round4")]
    pub deference_score: f64,
    pub dominant_topics: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationPattern {
    Professional,
    Escalating,
    Hostile,
    Retaliatory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentProgressionPoint {
    pub sequence: u32,
    pub sentiment: Sentiment,
    #[serde(serialize_with = "round4")]
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub description: String,
    pub severity: LegalSignificance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTimelineItem {
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailAnalysis {
    pub thread_summary: String,
    pub participants: Vec<EmailParticipant>,
    pub communication_pattern: CommunicationPattern,
    pub sentiment_progression: Vec<SentimentProgressionPoint>,
    pub escalation_events: Vec<EscalationEvent>,
    pub legal_significance: LegalSignificance,
    pub risk_flags: Vec<RiskFlag>,
    pub timeline: Vec<EmailTimelineItem>,
    #[serde(serialize_with = "round4")]
    pub confidence_overall: f64,
}

impl Validate for EmailAnalysis {
    fn validate(&self) -> Result<(), String> {
        validate_unit_interval("confidence_overall", self.confidence_overall)?;
        for p in &self.participants {
            validate_unit_interval("deference_score", p.deference_score)?;
        }
        validate_risk_flags(&self.risk_flags, EvidenceType::Email)
    }
}

// ---------------------------------------------------------------------
// ImageAnalysis (spec §4.5)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: String,
    /// Normalized `[x_min, y_min, x_max, y_max]` in `[0, 1]`.
    pub bbox: [f64; 4],
    #[serde(serialize_with = "round4")]
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub summary: String,
    pub objects: Vec<DetectedObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_text: Option<String>,
    pub risk_flags: Vec<RiskFlag>,
    #[serde(serialize_with = "round4")]
    pub confidence_overall: f64,
}

impl Validate for ImageAnalysis {
    fn validate(&self) -> Result<(), String> {
        validate_unit_interval("confidence_overall", self.confidence_overall)?;
        for obj in &self.objects {
            validate_unit_interval("object confidence", obj.confidence)?;
            for coord in obj.bbox {
                if !(0.0..=1.0).contains(&coord) {
                    return Err(format!("bbox coordinate out of [0,1]: {coord}"));
                }
            }
        }
        validate_risk_flags(&self.risk_flags, EvidenceType::Image)
    }
}

/// Normalize risk-flag synonyms the oracle might return into the canonical
/// vocabulary (spec §4.5: "blurry"→low_quality, "uncertain_text"→
/// ocr_ambiguous, "damage"→tampering_suspected).
pub fn normalize_image_risk_flag(raw: &str) -> Option<RiskFlag> {
    match raw.to_lowercase().as_str() {
        "blurry" | "low_quality" | "poor_quality" => Some(RiskFlag::LowQuality),
        "uncertain_text" | "ocr_ambiguous" | "illegible" => Some(RiskFlag::OcrAmbiguous),
        "damage" | "tampering_suspected" | "tampered" | "altered" => Some(RiskFlag::TamperingSuspected),
        "nsfw" | "explicit" => Some(RiskFlag::Nsfw),
        "pii" => Some(RiskFlag::Pii),
        _ => None,
    }
}

// ---------------------------------------------------------------------
// AnalysisRecord envelope (spec §3)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisOutputs {
    Document(DocumentAnalysisOutput),
    Email(EmailAnalysis),
    Image(ImageAnalysis),
}

impl AnalysisOutputs {
    pub fn confidence_overall(&self) -> f64 {
        match self {
            AnalysisOutputs::Document(d) => d.ai.confidence_overall,
            AnalysisOutputs::Email(e) => e.confidence_overall,
            AnalysisOutputs::Image(i) => i.confidence_overall,
        }
    }

    pub fn evidence_type(&self) -> EvidenceType {
        match self {
            AnalysisOutputs::Document(_) => EvidenceType::Document,
            AnalysisOutputs::Email(_) => EvidenceType::Email,
            AnalysisOutputs::Image(_) => EvidenceType::Image,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub revision: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisParameters {
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "round4_opt", default)]
    pub temperature: Option<f64>,
    pub prompt_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage_in: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage_out: Option<u32>,
}

/// One analysis performed on one evidence item (spec §3 AnalysisRecord).
///
/// `analysis_id` is deterministic: `sha256(sha256 || prompt_hash ||
/// model_revision)`, which is what makes re-runs under identical conditions
/// reuse the stored record (P4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub analysis_id: String,
    pub created_at: DateTime<Utc>,
    pub model: ModelInfo,
    pub parameters: AnalysisParameters,
    pub outputs: AnalysisOutputs,
    #[serde(serialize_with = "round4")]
    pub confidence_overall: f64,
}

impl AnalysisRecord {
    pub fn compute_analysis_id(sha256: &str, prompt_hash: &str, model_revision: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(sha256.as_bytes());
        hasher.update(b"|");
        hasher.update(prompt_hash.as_bytes());
        hasher.update(b"|");
        hasher.update(model_revision.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn new(
        sha256: &str,
        model: ModelInfo,
        parameters: AnalysisParameters,
        outputs: AnalysisOutputs,
    ) -> Self {
        let confidence_overall = outputs.confidence_overall();
        let analysis_id =
            Self::compute_analysis_id(sha256, &parameters.prompt_hash, &model.revision);
        AnalysisRecord {
            analysis_id,
            created_at: Utc::now(),
            model,
            parameters,
            outputs,
            confidence_overall,
        }
    }
}

impl Validate for AnalysisRecord {
    fn validate(&self) -> Result<(), String> {
        validate_unit_interval("confidence_overall", self.confidence_overall)?;
        match &self.outputs {
            AnalysisOutputs::Document(d) => d.validate(),
            AnalysisOutputs::Email(e) => e.validate(),
            AnalysisOutputs::Image(i) => i.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_id_is_deterministic() {
        let a = AnalysisRecord::compute_analysis_id("abc", "p1", "gpt-4o-2024-08-06");
        let b = AnalysisRecord::compute_analysis_id("abc", "p1", "gpt-4o-2024-08-06");
        let c = AnalysisRecord::compute_analysis_id("abc", "p2", "gpt-4o-2024-08-06");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn risk_flags_are_scoped_by_evidence_type() {
        assert!(RiskFlag::Threatening.allowed_for(EvidenceType::Document));
        assert!(!RiskFlag::Threatening.allowed_for(EvidenceType::Image));
        assert!(RiskFlag::Pii.allowed_for(EvidenceType::Image));
        assert!(RiskFlag::Pii.allowed_for(EvidenceType::Document));
    }

    #[test]
    fn image_synonym_normalization() {
        assert_eq!(normalize_image_risk_flag("blurry"), Some(RiskFlag::LowQuality));
        assert_eq!(normalize_image_risk_flag("uncertain_text"), Some(RiskFlag::OcrAmbiguous));
        assert_eq!(normalize_image_risk_flag("damage"), Some(RiskFlag::TamperingSuspected));
    }
}
