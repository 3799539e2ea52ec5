//! Stage 5: temporal sequences, timeline gaps, and the oracle-backed legal
//! pattern pass (contradictions, corroboration, evidence gaps) over the
//! correlation data assembled by Stages 1-4 (spec §4.6 Stage 5).
//!
//! Contradictions/corroboration/evidence-gaps are produced by the oracle,
//! given the correlation input as structured context, subject to the
//! oracle's schema. This mirrors `legal_config.py`'s
//! `CORRELATION_PATTERN_PROMPT`, which dispatches exactly this as one
//! structured-output call over entity correlations and timeline events.

use std::sync::Arc;

use serde_json::json;

use crate::error::EtResult;
use crate::oracle::Oracle;
use crate::schema::{AnalysisOutputs, CorrelatedEntity, EvidenceBundle, LegalPatterns, LegalSignificance, RiskFlag, TimelineEvent, TimelineGap};

const PATTERN_PROMPT: &str = "Given entity correlations and timeline events from multiple evidence pieces in a legal \
investigation, identify contradictions (conflicting statements across evidence, typed as factual, temporal, entity \
mismatch, or narrative conflict, each with a severity 0.0-1.0), corroboration groups (evidence supporting the same \
claims, bucketed weak/moderate/strong by source count), and evidence gaps (missing witnesses, missing documentation, \
unexplained absences, beyond the timeline gaps already supplied). Be conservative: only flag patterns with clear \
evidentiary support.";

fn pattern_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["contradictions", "corroboration", "evidence_gaps"],
    })
}

/// Events within a sliding window whose entity sets overlap are grouped
/// (spec §4.6 Stage 5). `pattern_confidence` is the geometric mean of
/// member confidences; sequences shorter than 2 are discarded.
pub fn temporal_sequences(events: &[TimelineEvent], window_hours: f64) -> Vec<crate::schema::TemporalSequence> {
    let mut sequences = Vec::new();
    let window = chrono::Duration::seconds((window_hours * 3600.0) as i64);

    for (i, anchor) in events.iter().enumerate() {
        let Some(anchor_entities) = &anchor.entities_involved else {
            continue;
        };
        if anchor_entities.is_empty() {
            continue;
        }
        let mut member_refs = vec![format!("{}#{:?}", anchor.evidence_sha256, anchor.event_type)];
        let mut confidences = vec![anchor.confidence.max(1e-6)];

        for other in events.iter().skip(i + 1) {
            if other.timestamp - anchor.timestamp > window {
                break;
            }
            let Some(other_entities) = &other.entities_involved else {
                continue;
            };
            if anchor_entities.iter().any(|e| other_entities.contains(e)) {
                member_refs.push(format!("{}#{:?}", other.evidence_sha256, other.event_type));
                confidences.push(other.confidence.max(1e-6));
            }
        }

        if member_refs.len() >= 2 {
            let product: f64 = confidences.iter().product();
            let geometric_mean = product.powf(1.0 / confidences.len() as f64);
            sequences.push(crate::schema::TemporalSequence {
                event_refs: member_refs,
                pattern_confidence: geometric_mean.min(0.99),
            });
        }
    }
    sequences
}

/// Adjacent-event gaps exceeding `gap_days` (spec §4.6 Stage 5). Gaps whose
/// bounding events touch a critical risk flag get elevated significance.
pub fn timeline_gaps(events: &[TimelineEvent], gap_days: f64, critical_hashes: &std::collections::HashSet<String>) -> Vec<TimelineGap> {
    let mut gaps = Vec::new();
    for window in events.windows(2) {
        let duration = window[1].timestamp - window[0].timestamp;
        let duration_days = duration.num_seconds() as f64 / 86_400.0;
        if duration_days < gap_days {
            continue;
        }
        let touches_critical = critical_hashes.contains(&window[0].evidence_sha256) || critical_hashes.contains(&window[1].evidence_sha256);
        let significance = match (touches_critical, duration_days > gap_days * 2.0) {
            (true, true) => LegalSignificance::Critical,
            (true, false) => LegalSignificance::High,
            (false, true) => LegalSignificance::Medium,
            (false, false) => LegalSignificance::Low,
        };
        gaps.push(TimelineGap {
            gap_start: window[0].timestamp,
            gap_end: window[1].timestamp,
            gap_duration_days: duration_days,
            significance,
            context: Some(format!("gap between {} and {}", window[0].evidence_sha256, window[1].evidence_sha256)),
        });
    }
    gaps
}

/// Hashes whose canonical analysis carries a critical risk flag (spec §7),
/// used to elevate gap significance and given to the oracle as context.
pub fn critical_hashes(bundles: &[EvidenceBundle]) -> std::collections::HashSet<String> {
    bundles
        .iter()
        .filter(|b| {
            b.canonical_analysis()
                .is_some_and(|a| risk_flags_of(&a.outputs).into_iter().any(RiskFlag::is_critical))
        })
        .map(|b| b.evidence.sha256.clone())
        .collect()
}

fn risk_flags_of(outputs: &AnalysisOutputs) -> Vec<RiskFlag> {
    match outputs {
        AnalysisOutputs::Document(d) => d.ai.risk_flags.clone(),
        AnalysisOutputs::Email(e) => e.risk_flags.clone(),
        AnalysisOutputs::Image(i) => i.risk_flags.clone(),
    }
}

/// Structured context handed to the oracle: entity correlations, the
/// reconstructed timeline gaps, and which hashes already carry a critical
/// risk flag, so it doesn't have to re-derive Stages 1-4.
fn build_context(bundles: &[EvidenceBundle], entities: &[CorrelatedEntity], gaps: &[TimelineGap]) -> serde_json::Value {
    let critical = critical_hashes(bundles);
    json!({
        "entity_correlations": entities,
        "timeline_gaps": gaps,
        "critical_evidence": critical.into_iter().collect::<Vec<_>>(),
        "evidence_count": bundles.len(),
    })
}

/// Runs the legal-pattern oracle call (spec §4.6 Stage 5) and returns its
/// typed response directly: contradictions, corroboration, and evidence
/// gaps are exactly what the oracle reports, subject to its schema.
pub async fn assemble_legal_patterns(
    bundles: &[EvidenceBundle],
    entities: &[CorrelatedEntity],
    gaps: &[TimelineGap],
    oracle: &Arc<dyn Oracle>,
) -> EtResult<LegalPatterns> {
    if entities.is_empty() {
        return Ok(LegalPatterns::default());
    }
    let context = build_context(bundles, entities, gaps);
    let (patterns, _usage) = oracle.detect_legal_patterns(&context, PATTERN_PROMPT, &pattern_schema()).await?;
    Ok(patterns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporal_sequences_requires_entity_overlap_and_min_length() {
        let t0 = chrono::Utc::now();
        let events = vec![
            TimelineEvent {
                timestamp: t0,
                evidence_sha256: "a".repeat(64),
                event_type: crate::schema::EventType::Communication,
                description: "e1".to_string(),
                confidence: 0.9,
                entities_involved: Some(vec!["John Smith".to_string()]),
            },
            TimelineEvent {
                timestamp: t0 + chrono::Duration::hours(2),
                evidence_sha256: "b".repeat(64),
                event_type: crate::schema::EventType::Communication,
                description: "e2".to_string(),
                confidence: 0.8,
                entities_involved: Some(vec!["John Smith".to_string()]),
            },
        ];
        let seqs = temporal_sequences(&events, 72.0);
        assert_eq!(seqs.len(), 1);
        assert_eq!(seqs[0].event_refs.len(), 2);
    }

    #[tokio::test]
    async fn assemble_legal_patterns_returns_empty_for_no_entities() {
        let oracle: Arc<dyn Oracle> = Arc::new(crate::oracle::NullOracle);
        let patterns = assemble_legal_patterns(&[], &[], &[], &oracle).await.unwrap();
        assert!(patterns.contradictions.is_empty());
        assert!(patterns.corroboration.is_empty());
        assert!(patterns.evidence_gaps.is_empty());
    }
}
