//! Property tests for P1 (identity), P2 (idempotent ingest), P3 (custody
//! monotonicity), P5 (bundle round-trip), P7 (correlation determinism under
//! permutation), P8 (hard-link integrity), and P9 (risk-flag closure), per
//! spec.md section 8.

mod common;

use std::fs;
use std::sync::Arc;

use evidence_toolkit::config::RunConfig;
use evidence_toolkit::correlator::Correlator;
use evidence_toolkit::hashing::sha256_bytes;
use evidence_toolkit::schema::{
    AnalysisOutputs, AnalysisParameters, AnalysisRecord, DocumentAnalysis, DocumentAnalysisOutput, DocumentEntity, DocumentEntityType,
    DocumentType, EvidenceBundle, EvidenceType, LegalSignificance, ModelInfo, RiskFlag, Sentiment, WordFrequencyStats,
};
use evidence_toolkit::store::Store;
use proptest::prelude::*;

use common::NullOracle;

const ALL_RISK_FLAGS: &[RiskFlag] = &[
    RiskFlag::Threatening,
    RiskFlag::Deadline,
    RiskFlag::Pii,
    RiskFlag::Confidential,
    RiskFlag::TimeSensitive,
    RiskFlag::RetaliationIndicators,
    RiskFlag::Harassment,
    RiskFlag::Discrimination,
    RiskFlag::LowQuality,
    RiskFlag::TamperingSuspected,
    RiskFlag::OcrAmbiguous,
    RiskFlag::Nsfw,
];

const ALL_EVIDENCE_TYPES: &[EvidenceType] = &[EvidenceType::Document, EvidenceType::Email, EvidenceType::Image, EvidenceType::Other];

proptest! {
    /// P1: ingesting arbitrary bytes yields `sha256 == sha256(bytes)`, and
    /// re-reading the stored raw file re-hashes to the same value.
    #[test]
    fn p1_ingest_identity(bytes in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let store_dir = tempfile::tempdir().unwrap();
        let store = Store::open(store_dir.path()).unwrap();
        let src = tempfile::NamedTempFile::new().unwrap();
        fs::write(src.path(), &bytes).unwrap();

        let result = store.ingest(src.path(), None, "proptest").unwrap();
        prop_assert_eq!(&result.sha256, &sha256_bytes(&bytes));

        let bundle = store.read_bundle(&result.sha256).unwrap().unwrap();
        prop_assert_eq!(bundle.evidence.sha256, sha256_bytes(&bytes));
    }

    /// P2: ingesting identical bytes twice doesn't duplicate the raw file
    /// and only appends one extra `ingest` custody entry.
    #[test]
    fn p2_ingest_is_idempotent(bytes in proptest::collection::vec(any::<u8>(), 1..2048)) {
        let store_dir = tempfile::tempdir().unwrap();
        let store = Store::open(store_dir.path()).unwrap();
        let src = tempfile::NamedTempFile::new().unwrap();
        fs::write(src.path(), &bytes).unwrap();

        let first = store.ingest(src.path(), None, "proptest").unwrap();
        let before = store.read_bundle(&first.sha256).unwrap().unwrap().chain_of_custody.len();

        let second = store.ingest(src.path(), None, "proptest").unwrap();
        let after = store.read_bundle(&second.sha256).unwrap().unwrap().chain_of_custody.len();

        prop_assert_eq!(first.sha256, second.sha256);
        prop_assert!(!second.newly_stored);
        prop_assert_eq!(after, before + 1);
    }

    /// P3: custody timestamps are never decreasing, across any sequence of
    /// ingest/re-ingest calls on the same bytes.
    #[test]
    fn p3_custody_timestamps_are_monotonic(bytes in proptest::collection::vec(any::<u8>(), 1..256), repeats in 1usize..5) {
        let store_dir = tempfile::tempdir().unwrap();
        let store = Store::open(store_dir.path()).unwrap();
        let src = tempfile::NamedTempFile::new().unwrap();
        fs::write(src.path(), &bytes).unwrap();

        let mut sha256 = String::new();
        for _ in 0..repeats {
            sha256 = store.ingest(src.path(), None, "proptest").unwrap().sha256;
        }

        let bundle = store.read_bundle(&sha256).unwrap().unwrap();
        for pair in bundle.chain_of_custody.windows(2) {
            prop_assert!(pair[1].timestamp >= pair[0].timestamp);
        }
    }

    /// P5: serializing then deserializing an ingested bundle round-trips,
    /// and re-serializing the round-tripped value is byte-for-byte
    /// identical to the original serialization.
    #[test]
    fn p5_bundle_round_trips_through_json(bytes in proptest::collection::vec(any::<u8>(), 0..1024)) {
        let store_dir = tempfile::tempdir().unwrap();
        let store = Store::open(store_dir.path()).unwrap();
        let src = tempfile::NamedTempFile::new().unwrap();
        fs::write(src.path(), &bytes).unwrap();

        let result = store.ingest(src.path(), None, "proptest").unwrap();
        let original = store.read_bundle(&result.sha256).unwrap().unwrap();

        let first_json = serde_json::to_vec(&original).unwrap();
        let round_tripped: EvidenceBundle = serde_json::from_slice(&first_json).unwrap();
        let second_json = serde_json::to_vec(&round_tripped).unwrap();

        prop_assert_eq!(first_json, second_json);
        prop_assert_eq!(round_tripped.evidence.sha256, original.evidence.sha256);
    }

    /// P8 (invariant I3): the hard-linked copy of an evidence file under
    /// `cases/<case_id>/` hashes to exactly the sha256 that named it.
    #[test]
    fn p8_case_link_hash_matches_raw_hash(bytes in proptest::collection::vec(any::<u8>(), 1..2048)) {
        let store_dir = tempfile::tempdir().unwrap();
        let store = Store::open(store_dir.path()).unwrap();
        let src = tempfile::NamedTempFile::new().unwrap();
        fs::write(src.path(), &bytes).unwrap();

        let result = store.ingest(src.path(), None, "proptest").unwrap();
        store.link_to_case(&result.sha256, "case-p8").unwrap();

        let bundle = store.read_bundle(&result.sha256).unwrap().unwrap();
        let linked_path = store_dir.path().join("cases").join("case-p8").join(format!("{}{}", result.sha256, bundle.evidence.extension));
        prop_assert!(linked_path.exists());

        let linked_hash = sha256_bytes(&fs::read(&linked_path).unwrap());
        prop_assert_eq!(linked_hash, result.sha256);
    }
}

fn document_analysis_record(sha256: &str, entity_name: &str, context: &str) -> AnalysisRecord {
    let outputs = AnalysisOutputs::Document(DocumentAnalysisOutput {
        local_stats: WordFrequencyStats::default(),
        ai: DocumentAnalysis {
            summary: "summary".to_string(),
            entities: vec![DocumentEntity {
                name: entity_name.to_string(),
                entity_type: DocumentEntityType::Person,
                confidence: 0.9,
                context: context.to_string(),
                relationship: None,
                quoted_text: None,
                associated_event: None,
            }],
            document_type: DocumentType::Letter,
            sentiment: Sentiment::Neutral,
            legal_significance: LegalSignificance::Low,
            risk_flags: Vec::new(),
            confidence_overall: 0.9,
        },
    });
    AnalysisRecord::new(
        sha256,
        ModelInfo {
            name: "test-model".to_string(),
            revision: "test-revision".to_string(),
        },
        AnalysisParameters {
            temperature: Some(0.0),
            prompt_hash: "prompt-hash".to_string(),
            token_usage_in: None,
            token_usage_out: None,
        },
        outputs,
    )
}

/// Ingests two documents sharing an entity into two cases, under opposite
/// ingestion orders, and checks the resulting correlation is the same up to
/// occurrence ordering (P7: correlation determinism under permutation).
#[tokio::test]
async fn p7_correlation_is_order_independent() {
    let store_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(store_dir.path()).unwrap());
    let oracle: Arc<dyn evidence_toolkit::oracle::Oracle> = Arc::new(NullOracle);
    let config = Arc::new(RunConfig::default());

    let doc_a = tempfile::NamedTempFile::new().unwrap();
    fs::write(doc_a.path(), b"letter one").unwrap();
    let doc_b = tempfile::NamedTempFile::new().unwrap();
    fs::write(doc_b.path(), b"letter two").unwrap();

    let ingest_a = store.ingest(doc_a.path(), None, "test").unwrap();
    let ingest_b = store.ingest(doc_b.path(), None, "test").unwrap();

    store
        .write_analysis(
            &ingest_a.sha256,
            document_analysis_record(&ingest_a.sha256, "John Smith", "John Smith raised the issue"),
            "test",
            0,
        )
        .unwrap();
    store
        .write_analysis(
            &ingest_b.sha256,
            document_analysis_record(&ingest_b.sha256, "John Smith", "John Smith responded"),
            "test",
            0,
        )
        .unwrap();

    store.link_to_case(&ingest_a.sha256, "case-forward").unwrap();
    store.link_to_case(&ingest_b.sha256, "case-forward").unwrap();
    store.link_to_case(&ingest_b.sha256, "case-reverse").unwrap();
    store.link_to_case(&ingest_a.sha256, "case-reverse").unwrap();

    let correlator = Correlator::new(Arc::clone(&store), Arc::clone(&oracle), Arc::clone(&config));
    let forward = correlator.correlate("case-forward").await.unwrap();
    let reverse = correlator.correlate("case-reverse").await.unwrap();

    assert_eq!(forward.entity_correlations.len(), reverse.entity_correlations.len());
    for (f, r) in forward.entity_correlations.iter().zip(reverse.entity_correlations.iter()) {
        assert_eq!(f.canonical_name, r.canonical_name);
        assert_eq!(f.entity_type, r.entity_type);

        let mut f_hashes: Vec<&str> = f.occurrences.iter().map(|o| o.evidence_sha256.as_str()).collect();
        let mut r_hashes: Vec<&str> = r.occurrences.iter().map(|o| o.evidence_sha256.as_str()).collect();
        f_hashes.sort_unstable();
        r_hashes.sort_unstable();
        assert_eq!(f_hashes, r_hashes);
    }

    assert_eq!(forward.timeline.len(), reverse.timeline.len());
}

/// P9: every `RiskFlag` is allowed for exactly the evidence types its
/// documented vocabulary covers, with no type silently accepting a flag
/// from another type's vocabulary.
#[test]
fn p9_risk_flag_vocabulary_is_closed_per_evidence_type() {
    for &flag in ALL_RISK_FLAGS {
        let allowed: Vec<EvidenceType> = ALL_EVIDENCE_TYPES.iter().copied().filter(|&t| flag.allowed_for(t)).collect();
        assert!(!allowed.is_empty(), "{flag:?} is not allowed for any evidence type");
        assert!(!allowed.contains(&EvidenceType::Other), "{flag:?} must not be allowed for 'other' evidence");
    }
}
