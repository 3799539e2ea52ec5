//! Cross-evidence correlation output types (spec §3, §4.6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::analysis::LegalSignificance;
use super::common::{round4, validate_unit_interval, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Date,
    EmailAddress,
    Phone,
    DocumentRef,
    Account,
    Address,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Nlp,
    Ocr,
    Manual,
    AiAnalysis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityOccurrence {
    pub evidence_sha256: String,
    pub context: String,
    #[serde(serialize_with = "round4")]
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant_name: Option<String>,
    pub extraction_method: ExtractionMethod,
}

/// An entity that appears in two or more distinct evidence items (spec §4.6
/// Stage 3 filtering).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelatedEntity {
    pub canonical_name: String,
    pub entity_type: EntityType,
    pub occurrences: Vec<EntityOccurrence>,
    #[serde(serialize_with = "round4")]
    pub correlation_confidence: f64,
}

impl CorrelatedEntity {
    pub fn occurrence_count(&self) -> usize {
        self.occurrences.len()
    }

    pub fn distinct_evidence_count(&self) -> usize {
        let mut seen: Vec<&str> = self.occurrences.iter().map(|o| o.evidence_sha256.as_str()).collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }
}

impl Validate for CorrelatedEntity {
    fn validate(&self) -> Result<(), String> {
        if self.distinct_evidence_count() < 2 {
            return Err(format!(
                "{} correlates over fewer than 2 evidence items",
                self.canonical_name
            ));
        }
        validate_unit_interval("correlation_confidence", self.correlation_confidence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DocumentCreated,
    Communication,
    Meeting,
    Deadline,
    Incident,
    Filing,
    PhotoTaken,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub timestamp: DateTime<Utc>,
    pub evidence_sha256: String,
    pub event_type: EventType,
    pub description: String,
    #[serde(serialize_with = "round4")]
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities_involved: Option<Vec<String>>,
}

impl TimelineEvent {
    /// Sort key matching spec §4.6 Stage 4: strictly by timestamp, ties
    /// broken by (evidence_sha256, event_type) lexicographically.
    pub fn sort_key(&self) -> (DateTime<Utc>, &str, &'static str) {
        (self.timestamp, self.evidence_sha256.as_str(), event_type_tag(self.event_type))
    }
}

fn event_type_tag(t: EventType) -> &'static str {
    match t {
        EventType::DocumentCreated => "document_created",
        EventType::Communication => "communication",
        EventType::Meeting => "meeting",
        EventType::Deadline => "deadline",
        EventType::Incident => "incident",
        EventType::Filing => "filing",
        EventType::PhotoTaken => "photo_taken",
        EventType::Other => "other",
    }
}

/// A temporal sequence: events within a sliding window whose participating
/// entities overlap (spec §4.6 Stage 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalSequence {
    pub event_refs: Vec<String>,
    #[serde(serialize_with = "round4")]
    pub pattern_confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineGap {
    pub gap_start: DateTime<Utc>,
    pub gap_end: DateTime<Utc>,
    pub gap_duration_days: f64,
    pub significance: LegalSignificance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionType {
    Temporal,
    Factual,
    EntityMismatch,
    NarrativeConflict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub contradiction_type: ContradictionType,
    pub evidence_pair: [String; 2],
    pub description: String,
    pub severity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Validate for Contradiction {
    fn validate(&self) -> Result<(), String> {
        validate_unit_interval("severity", self.severity)?;
        if let Some(c) = self.confidence {
            validate_unit_interval("confidence", c)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorroborationStrength {
    Weak,
    Moderate,
    Strong,
}

impl CorroborationStrength {
    /// Source-count bucket: {1, 2-3, >=4} (spec §4.6 Stage 5).
    pub fn from_source_count(count: usize) -> Self {
        match count {
            0 | 1 => CorroborationStrength::Weak,
            2 | 3 => CorroborationStrength::Moderate,
            _ => CorroborationStrength::Strong,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorroborationGroup {
    pub evidence_group: Vec<String>,
    pub strength: CorroborationStrength,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceGap {
    pub description: String,
    pub significance: LegalSignificance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_context: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegalPatterns {
    pub contradictions: Vec<Contradiction>,
    pub corroboration: Vec<CorroborationGroup>,
    pub evidence_gaps: Vec<EvidenceGap>,
}

/// Output of the correlator for one case (spec §3 CorrelationResult).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub case_id: String,
    pub entity_correlations: Vec<CorrelatedEntity>,
    pub timeline: Vec<TimelineEvent>,
    pub temporal_sequences: Vec<TemporalSequence>,
    pub timeline_gaps: Vec<TimelineGap>,
    pub legal_patterns: LegalPatterns,
    pub case_summary: CaseSummary,
    pub generated_at: DateTime<Utc>,
}

impl Validate for CorrelationResult {
    fn validate(&self) -> Result<(), String> {
        for e in &self.entity_correlations {
            e.validate()?;
        }
        for w in self.timeline.windows(2) {
            if w[1].sort_key() < w[0].sort_key() {
                return Err("timeline is not sorted".to_string());
            }
        }
        for c in &self.legal_patterns.contradictions {
            c.validate()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Additive case-summary envelope (SPEC_FULL §3): richer than legal_patterns
// alone, consumed only by the package writer's executive summary.
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceCoherence {
    HighlyCoherent,
    MostlyCoherent,
    Mixed,
    ConcerningGaps,
    SignificantConflicts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeTheme {
    pub theme_name: String,
    pub supporting_evidence: Vec<String>,
    #[serde(serialize_with = "round4")]
    pub strength: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSummary {
    pub evidence_coherence: EvidenceCoherence,
    pub narrative_themes: Vec<NarrativeTheme>,
    pub supporting_groups: Vec<CorroborationGroup>,
}

// ---------------------------------------------------------------------
// Oracle I/O for AI-assisted entity resolution (spec §4.6.1)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMatchDecision {
    pub is_same_entity: bool,
    #[serde(serialize_with = "round4")]
    pub confidence: f64,
    pub supporting_signals: Vec<String>,
    pub conflicting_signals: Vec<String>,
    pub reasoning: String,
}

/// Oracle output for `summarize_case` (spec §4.4, consumed by the package
/// writer's `reports/executive_summary.txt`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub summary: String,
    pub key_findings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_actions: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corroboration_strength_buckets() {
        assert_eq!(CorroborationStrength::from_source_count(1), CorroborationStrength::Weak);
        assert_eq!(CorroborationStrength::from_source_count(2), CorroborationStrength::Moderate);
        assert_eq!(CorroborationStrength::from_source_count(3), CorroborationStrength::Moderate);
        assert_eq!(CorroborationStrength::from_source_count(4), CorroborationStrength::Strong);
    }

    #[test]
    fn correlated_entity_requires_two_distinct_items() {
        let entity = CorrelatedEntity {
            canonical_name: "Acme Corp".to_string(),
            entity_type: EntityType::Organization,
            occurrences: vec![EntityOccurrence {
                evidence_sha256: "a".repeat(64),
                context: "ctx".to_string(),
                confidence: 0.9,
                variant_name: None,
                extraction_method: ExtractionMethod::Nlp,
            }],
            correlation_confidence: 0.9,
        };
        assert!(entity.validate().is_err());
    }
}
