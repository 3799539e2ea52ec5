//! Entity aggregation, canonicalization, and filtering (spec §4.6 Stages
//! 1-3).

use std::collections::HashMap;

use crate::schema::{
    AnalysisOutputs, CorrelatedEntity, EntityOccurrence, EntityType, EvidenceBundle, ExtractionMethod,
};

/// A candidate entity before canonicalization: one raw occurrence plus the
/// surface name it was seen under.
struct Candidate {
    raw_name: String,
    entity_type: EntityType,
    occurrence: EntityOccurrence,
}

/// Stage 1: collect candidate entities from every bundle's canonical
/// analysis (spec §4.6 Stage 1).
pub fn collect_candidates(bundles: &[EvidenceBundle]) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for bundle in bundles {
        let Some(analysis) = bundle.canonical_analysis() else {
            continue;
        };
        let sha256 = &bundle.evidence.sha256;
        match &analysis.outputs {
            AnalysisOutputs::Document(doc) => {
                for entity in &doc.ai.entities {
                    let entity_type = match entity.entity_type {
                        crate::schema::DocumentEntityType::Person => EntityType::Person,
                        crate::schema::DocumentEntityType::Organization => EntityType::Organization,
                        crate::schema::DocumentEntityType::Date => EntityType::Date,
                        crate::schema::DocumentEntityType::LegalTerm => EntityType::Other,
                    };
                    candidates.push(Candidate {
                        raw_name: entity.name.clone(),
                        entity_type,
                        occurrence: EntityOccurrence {
                            evidence_sha256: sha256.clone(),
                            context: entity.context.clone(),
                            confidence: entity.confidence,
                            variant_name: Some(entity.name.clone()),
                            extraction_method: ExtractionMethod::Nlp,
                        },
                    });
                }
            }
            AnalysisOutputs::Email(email) => {
                for participant in &email.participants {
                    candidates.push(Candidate {
                        raw_name: participant.name.clone().unwrap_or_else(|| participant.email.clone()),
                        entity_type: EntityType::Person,
                        occurrence: EntityOccurrence {
                            evidence_sha256: sha256.clone(),
                            context: format!("participant in email thread ({} messages)", participant.message_count),
                            confidence: 0.9,
                            variant_name: Some(participant.email.clone()),
                            extraction_method: ExtractionMethod::Nlp,
                        },
                    });
                }
            }
            AnalysisOutputs::Image(image) => {
                if let Some(text) = &image.ocr_text {
                    for token in capitalized_sequences(text) {
                        candidates.push(Candidate {
                            raw_name: token.clone(),
                            entity_type: EntityType::Other,
                            occurrence: EntityOccurrence {
                                evidence_sha256: sha256.clone(),
                                context: "OCR-extracted token".to_string(),
                                confidence: 0.5,
                                variant_name: Some(token),
                                extraction_method: ExtractionMethod::Ocr,
                            },
                        });
                    }
                }
            }
        }
    }
    candidates
}

/// Capitalized multi-word sequences in OCR text (spec §4.6 Stage 1: "known
/// organization tokens are proposed"). Returns runs of two or more
/// consecutive capitalized words.
fn capitalized_sequences(text: &str) -> Vec<String> {
    let mut sequences = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for word in text.split_whitespace() {
        let is_capitalized = word.chars().next().is_some_and(|c| c.is_uppercase());
        if is_capitalized {
            current.push(word);
        } else if current.len() >= 2 {
            sequences.push(current.join(" "));
            current.clear();
        } else {
            current.clear();
        }
    }
    if current.len() >= 2 {
        sequences.push(current.join(" "));
    }
    sequences
}

/// Case-folded, whitespace-collapsed, titled normalization used to merge
/// byte-identical-after-normalization names (spec §4.6 Stage 2).
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stages 2-3: merge candidates by normalized name, then keep only entities
/// with occurrences in >= 2 distinct evidence items (spec §4.6).
/// `correlation_confidence` is the mean occurrence confidence, capped at
/// 0.99.
pub fn canonicalize_and_filter(candidates: Vec<Candidate>) -> Vec<CorrelatedEntity> {
    let mut groups: HashMap<String, (EntityType, Vec<EntityOccurrence>, HashMap<String, u32>)> = HashMap::new();

    for candidate in candidates {
        let key = normalize_name(&candidate.raw_name);
        if key.is_empty() {
            continue;
        }
        let entry = groups.entry(key).or_insert_with(|| (candidate.entity_type, Vec::new(), HashMap::new()));
        *entry.2.entry(candidate.raw_name.clone()).or_insert(0) += 1;
        entry.1.push(candidate.occurrence);
    }

    let mut entities: Vec<CorrelatedEntity> = groups
        .into_iter()
        .filter_map(|(_, (entity_type, occurrences, variant_counts))| {
            let distinct: std::collections::HashSet<&str> = occurrences.iter().map(|o| o.evidence_sha256.as_str()).collect();
            if distinct.len() < 2 {
                return None;
            }
            let canonical_name = canonical_display_name(&variant_counts);
            let mean_confidence = occurrences.iter().map(|o| o.confidence).sum::<f64>() / occurrences.len() as f64;
            Some(CorrelatedEntity {
                canonical_name,
                entity_type,
                occurrences,
                correlation_confidence: mean_confidence.min(0.99),
            })
        })
        .collect();

    entities.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));
    entities
}

/// Most-frequent normalized surface form; ties broken lexicographically
/// (spec §3 Entity: "Canonical name is chosen by a deterministic rule").
pub fn canonical_display_name(variant_counts: &HashMap<String, u32>) -> String {
    variant_counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(name, _)| name.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_name_collapses_whitespace_and_case() {
        assert_eq!(normalize_name("  JOHN   smith "), "John Smith");
    }

    #[test]
    fn canonical_display_name_picks_most_frequent_then_lexicographic() {
        let mut counts = HashMap::new();
        counts.insert("Acme Corp".to_string(), 3);
        counts.insert("ACME CORP".to_string(), 1);
        assert_eq!(canonical_display_name(&counts), "Acme Corp");
    }

    #[test]
    fn capitalized_sequences_finds_multi_word_runs() {
        let seqs = capitalized_sequences("met with John Smith yesterday near Acme Corp offices");
        assert_eq!(seqs, vec!["John Smith".to_string(), "Acme Corp".to_string()]);
    }
}
