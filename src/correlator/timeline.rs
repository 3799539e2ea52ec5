//! Timeline assembly (spec §4.6 Stage 4).

use crate::schema::{AnalysisOutputs, EventType, EvidenceBundle, TimelineEvent};

/// Collects `TimelineEvent`s from every bundle: file-creation timestamps,
/// analysis timestamps, and `EmailAnalysis` timeline items (spec §4.6
/// Stage 4). Date-typed entities with resolvable timestamps are folded in
/// by the caller once entity correlation has run.
pub fn assemble(bundles: &[EvidenceBundle]) -> Vec<TimelineEvent> {
    let mut events = Vec::new();

    for bundle in bundles {
        let sha256 = bundle.evidence.sha256.clone();

        events.push(TimelineEvent {
            timestamp: bundle.evidence.source_modified_at.unwrap_or(bundle.evidence.ingested_at),
            evidence_sha256: sha256.clone(),
            event_type: EventType::DocumentCreated,
            description: format!("{} added to evidence", bundle.evidence.original_filename),
            confidence: 1.0,
            entities_involved: None,
        });

        if let Some(analysis) = bundle.canonical_analysis() {
            events.push(TimelineEvent {
                timestamp: analysis.created_at,
                evidence_sha256: sha256.clone(),
                event_type: EventType::Other,
                description: format!("analysis {} completed", analysis.analysis_id),
                confidence: 1.0,
                entities_involved: None,
            });

            if let AnalysisOutputs::Email(email) = &analysis.outputs {
                for item in &email.timeline {
                    events.push(TimelineEvent {
                        timestamp: item.timestamp,
                        evidence_sha256: sha256.clone(),
                        event_type: EventType::Communication,
                        description: item.description.clone(),
                        confidence: analysis.confidence_overall,
                        entities_involved: None,
                    });
                }
            }
        }
    }

    sort_events(&mut events);
    events
}

/// Strictly by timestamp; ties broken by (evidence_sha256, event_type)
/// lexicographically (spec §4.6 Stage 4).
pub fn sort_events(events: &mut [TimelineEvent]) {
    events.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CustodyAction, EvidenceType, FileMetadata};
    use chrono::{Duration, Utc};

    fn bundle(sha: &str, ts: chrono::DateTime<Utc>) -> EvidenceBundle {
        let mut b = EvidenceBundle::new(
            FileMetadata {
                sha256: sha.to_string(),
                size: 10,
                mime_type: "text/plain".to_string(),
                original_filename: "a.txt".to_string(),
                extension: ".txt".to_string(),
                ingested_at: ts,
                source_modified_at: None,
                evidence_type: EvidenceType::Document,
            },
            None,
        );
        b.chain_of_custody.push(crate::schema::ChainOfCustodyEntry::new("t", CustodyAction::Ingest, None));
        b
    }

    #[test]
    fn assemble_sorts_strictly_by_timestamp() {
        let now = Utc::now();
        let bundles = vec![bundle(&"b".repeat(64), now), bundle(&"a".repeat(64), now - Duration::hours(1))];
        let events = assemble(&bundles);
        assert!(events[0].timestamp <= events[1].timestamp);
    }
}
