//! Cross-evidence correlator (spec §4.6): Stages 1-5 over every evidence
//! bundle in a case, producing one `CorrelationResult`.

mod entities;
mod patterns;
mod resolve;
mod timeline;

use std::sync::Arc;

use chrono::Utc;

use crate::config::RunConfig;
use crate::error::{EtError, EtResult};
use crate::oracle::Oracle;
use crate::schema::{
    CaseSummary, CorrelatedEntity, CorrelationResult, CorroborationStrength, EvidenceCoherence, LegalPatterns, NarrativeTheme, Validate,
};
use crate::store::Store;

pub struct Correlator {
    store: Arc<Store>,
    oracle: Arc<dyn Oracle>,
    config: Arc<RunConfig>,
}

impl Correlator {
    pub fn new(store: Arc<Store>, oracle: Arc<dyn Oracle>, config: Arc<RunConfig>) -> Self {
        Correlator { store, oracle, config }
    }

    /// Runs Stages 1-5 for `case_id` (spec §4.6), optionally extended by the
    /// AI entity-resolution pass (spec §4.6.1) when `config.ai_resolve`.
    pub async fn correlate(&self, case_id: &str) -> EtResult<CorrelationResult> {
        let hashes = self.store.list(Some(case_id))?;
        if hashes.is_empty() {
            return Err(EtError::Input(format!("case {case_id} has no evidence")));
        }

        let mut bundles = Vec::with_capacity(hashes.len());
        for sha256 in &hashes {
            if let Some(bundle) = self.store.read_bundle(sha256)? {
                bundles.push(bundle);
            }
        }

        let candidates = entities::collect_candidates(&bundles);
        let mut entity_correlations = entities::canonicalize_and_filter(candidates);

        if self.config.ai_resolve {
            entity_correlations = resolve::resolve(entity_correlations, Arc::clone(&self.oracle)).await?;
        }

        let timeline = timeline::assemble(&bundles);
        let temporal_sequences = patterns::temporal_sequences(&timeline, self.config.temporal_window_hours);
        let critical = patterns::critical_hashes(&bundles);
        let timeline_gaps = patterns::timeline_gaps(&timeline, self.config.timeline_gap_days, &critical);
        let legal_patterns = patterns::assemble_legal_patterns(&bundles, &entity_correlations, &timeline_gaps, &self.oracle).await?;
        let case_summary = derive_case_summary(&entity_correlations, &legal_patterns);

        let result = CorrelationResult {
            case_id: case_id.to_string(),
            entity_correlations,
            timeline,
            temporal_sequences,
            timeline_gaps,
            legal_patterns,
            case_summary,
            generated_at: Utc::now(),
        };
        result.validate().map_err(EtError::SchemaViolation)?;

        self.store.write_correlation(case_id, &result, "correlator")?;
        Ok(result)
    }
}

/// Builds the additive case-summary envelope (spec §3) from the same
/// entity correlations and legal patterns already assembled above, rather
/// than a further oracle round-trip: coherence and themes are a direct
/// function of Stage 3/5 output, not new analysis.
fn derive_case_summary(entities: &[CorrelatedEntity], legal_patterns: &LegalPatterns) -> CaseSummary {
    let has_severe_contradiction = legal_patterns.contradictions.iter().any(|c| c.severity >= 0.7);
    let has_concerning_gap = legal_patterns
        .evidence_gaps
        .iter()
        .any(|g| matches!(g.significance, crate::schema::LegalSignificance::High | crate::schema::LegalSignificance::Critical));
    let has_strong_corroboration = legal_patterns
        .corroboration
        .iter()
        .any(|g| g.strength == CorroborationStrength::Strong);

    let evidence_coherence = if has_severe_contradiction {
        EvidenceCoherence::SignificantConflicts
    } else if has_concerning_gap {
        EvidenceCoherence::ConcerningGaps
    } else if !legal_patterns.contradictions.is_empty() {
        EvidenceCoherence::Mixed
    } else if has_strong_corroboration {
        EvidenceCoherence::HighlyCoherent
    } else {
        EvidenceCoherence::MostlyCoherent
    };

    let mut ranked: Vec<&CorrelatedEntity> = entities.iter().collect();
    ranked.sort_by(|a, b| b.occurrence_count().cmp(&a.occurrence_count()).then_with(|| a.canonical_name.cmp(&b.canonical_name)));

    let narrative_themes: Vec<NarrativeTheme> = ranked
        .into_iter()
        .take(3)
        .map(|entity| NarrativeTheme {
            theme_name: entity.canonical_name.clone(),
            supporting_evidence: entity.occurrences.iter().map(|o| o.evidence_sha256.clone()).collect(),
            strength: entity.correlation_confidence,
            keywords: None,
        })
        .collect();

    let supporting_groups = legal_patterns
        .corroboration
        .iter()
        .filter(|g| matches!(g.strength, CorroborationStrength::Moderate | CorroborationStrength::Strong))
        .cloned()
        .collect();

    CaseSummary {
        evidence_coherence,
        narrative_themes,
        supporting_groups,
    }
}
