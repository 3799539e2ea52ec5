//! Core evidence records: identity, metadata, derived artifacts, and the
//! append-only chain of custody (spec §3, §4.2, §4.3).

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::analysis::AnalysisRecord;
use super::common::{is_known_schema_version, Validate, CURRENT_SCHEMA_VERSION};

/// `EvidenceType` is assigned once at ingest via MIME + extension + the PDF
/// text-extractability probe (spec §3, §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    Document,
    Image,
    Email,
    Other,
}

/// Immutable metadata recorded once at ingest time (spec §3 FileMetadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub sha256: String,
    pub size: u64,
    pub mime_type: String,
    pub original_filename: String,
    pub extension: String,
    pub ingested_at: DateTime<Utc>,
    pub source_modified_at: Option<DateTime<Utc>>,
    pub evidence_type: EvidenceType,
}

impl Validate for FileMetadata {
    fn validate(&self) -> Result<(), String> {
        if self.sha256.len() != 64 || !self.sha256.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("sha256 must be 64 lowercase hex chars: {}", self.sha256));
        }
        if self.sha256.to_lowercase() != self.sha256 {
            return Err("sha256 must be lowercase".to_string());
        }
        if self.size == 0 {
            return Err("size must be >= 1".to_string());
        }
        Ok(())
    }
}

/// Per-evidence computed side data, regeneratable (spec §3 DerivedArtifacts).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DerivedArtifacts {
    pub mime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exif: Option<IndexMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perceptual_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_extractable: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyAction {
    Ingest,
    Analyze,
    Export,
    Correlate,
    Package,
}

/// A single, never-rewritten entry in an evidence item's custody ledger
/// (spec §3 invariant I2: timestamps are monotonic per hash).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainOfCustodyEntry {
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub action: CustodyAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_affected: Option<Vec<String>>,
}

impl ChainOfCustodyEntry {
    pub fn new(actor: impl Into<String>, action: CustodyAction, note: Option<String>) -> Self {
        ChainOfCustodyEntry {
            timestamp: Utc::now(),
            actor: actor.into(),
            action,
            note,
            evidence_affected: None,
        }
    }
}

/// The unit of export: schema_version, optional case, core metadata, the
/// full custody log, and every analysis performed on this evidence item
/// (spec §3 EvidenceBundle, §6 `evidence_bundle.v1.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub schema_version: String,
    pub case_id: Option<String>,
    pub evidence: FileMetadata,
    pub chain_of_custody: Vec<ChainOfCustodyEntry>,
    pub analyses: Vec<AnalysisRecord>,
}

impl EvidenceBundle {
    pub fn new(evidence: FileMetadata, case_id: Option<String>) -> Self {
        EvidenceBundle {
            schema_version: CURRENT_SCHEMA_VERSION.to_string(),
            case_id,
            evidence,
            chain_of_custody: Vec::new(),
            analyses: Vec::new(),
        }
    }

    /// The latest completed analysis, if any (spec §3: "One evidence item
    /// may have multiple analyses ...; the latest completed one is
    /// canonical").
    pub fn canonical_analysis(&self) -> Option<&AnalysisRecord> {
        self.analyses.iter().max_by_key(|a| a.created_at)
    }
}

impl Validate for EvidenceBundle {
    fn validate(&self) -> Result<(), String> {
        if !is_known_schema_version(&self.schema_version) {
            return Err(format!("unknown schema_version: {}", self.schema_version));
        }
        self.evidence.validate()?;
        for (i, entry) in self.chain_of_custody.windows(2).enumerate() {
            if entry[1].timestamp < entry[0].timestamp {
                return Err(format!(
                    "custody entries not monotonic at index {i}: {} < {}",
                    entry[1].timestamp, entry[0].timestamp
                ));
            }
        }
        for analysis in &self.analyses {
            analysis.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> FileMetadata {
        FileMetadata {
            sha256: "a".repeat(64),
            size: 6,
            mime_type: "text/plain".to_string(),
            original_filename: "hello.txt".to_string(),
            extension: ".txt".to_string(),
            ingested_at: Utc::now(),
            source_modified_at: None,
            evidence_type: EvidenceType::Document,
        }
    }

    #[test]
    fn round_trip_is_a_fixed_point() {
        let bundle = EvidenceBundle::new(sample_metadata(), Some("CASE-1".to_string()));
        let json = serde_json::to_string(&bundle).unwrap();
        let parsed: EvidenceBundle = serde_json::from_str(&json).unwrap();
        let json2 = serde_json::to_string(&parsed).unwrap();
        assert_eq!(json, json2);
    }

    #[test]
    fn rejects_unknown_schema_version() {
        let mut bundle = EvidenceBundle::new(sample_metadata(), None);
        bundle.schema_version = "9.9.9".to_string();
        assert!(bundle.validate().is_err());
    }

    #[test]
    fn rejects_non_monotonic_custody() {
        let mut bundle = EvidenceBundle::new(sample_metadata(), None);
        let mut first = ChainOfCustodyEntry::new("system", CustodyAction::Ingest, None);
        first.timestamp = Utc::now();
        let mut second = ChainOfCustodyEntry::new("system", CustodyAction::Analyze, None);
        second.timestamp = first.timestamp - chrono::Duration::seconds(5);
        bundle.chain_of_custody.push(first);
        bundle.chain_of_custody.push(second);
        assert!(bundle.validate().is_err());
    }
}
