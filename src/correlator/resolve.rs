//! AI-assisted entity resolution (spec §4.6.1): merges `CorrelatedEntity`
//! records that canonicalization (Stage 2) left apart because their surface
//! forms differ too much for a pure string-normalization merge (nicknames,
//! initials, maiden names).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use crate::error::EtResult;
use crate::oracle::Oracle;
use crate::schema::{CorrelatedEntity, EntityType};

const PROMPT: &str = "Given two entity names extracted from legal-investigation evidence, along with \
the contexts they appeared in, decide whether they refer to the same real-world entity.";

fn response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["is_same_entity", "confidence", "reasoning"],
    })
}

/// Union-find over entity indices, keyed by normalized canonical name.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

/// Candidate pairs worth an oracle round-trip: same entity type, and either
/// a shared initial + surname, or one name is a single-token subset of the
/// other's tokens (spec §4.6.1: "indicator-based pair candidate selection").
fn candidate_pairs(entities: &[CorrelatedEntity]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for i in 0..entities.len() {
        for j in (i + 1)..entities.len() {
            if entities[i].entity_type != entities[j].entity_type {
                continue;
            }
            if entities[i].entity_type != EntityType::Person && entities[i].entity_type != EntityType::Organization {
                continue;
            }
            if shares_indicator(&entities[i].canonical_name, &entities[j].canonical_name) {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

fn shares_indicator(a: &str, b: &str) -> bool {
    let a_tokens: Vec<&str> = a.split_whitespace().collect();
    let b_tokens: Vec<&str> = b.split_whitespace().collect();
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return false;
    }

    // One name is a single token that also appears somewhere in the
    // other's tokens, e.g. "Paul" vs "Paul Boucherat" (spec §4.6.1
    // scenario 6). A single-token name has no surname to compare, so this
    // check runs before the surname-plus-initial branch below.
    if a_tokens.len() == 1 || b_tokens.len() == 1 {
        let (single, multi) = if a_tokens.len() == 1 { (a_tokens[0], &b_tokens) } else { (b_tokens[0], &a_tokens) };
        return multi.len() > 1 && multi.iter().any(|t| t.eq_ignore_ascii_case(single));
    }

    let a_last = a_tokens.last().unwrap();
    let b_last = b_tokens.last().unwrap();
    if a_last.eq_ignore_ascii_case(b_last) {
        let a_first = a_tokens.first().copied().unwrap_or_default();
        let b_first = b_tokens.first().copied().unwrap_or_default();
        if a_first.eq_ignore_ascii_case(b_first) {
            return false; // already merged by Stage 2's exact normalization
        }
        let initials_match = a_first.chars().next().map(|c| c.to_ascii_lowercase())
            == b_first.chars().next().map(|c| c.to_ascii_lowercase());
        return initials_match;
    }
    false
}

/// Merge policy (spec §4.6.1): accept if `is_same_entity` and confidence >=
/// 0.85 with no conflicting surname signal; for entities sharing only a
/// common first name (no surname token), require both a unique identifying
/// signal in `supporting_signals` and confidence >= 0.90.
fn accept_merge(entities: &[CorrelatedEntity], i: usize, j: usize, decision: &crate::schema::EntityMatchDecision) -> bool {
    if !decision.is_same_entity {
        return false;
    }
    let has_surname = entities[i].canonical_name.split_whitespace().count() > 1
        && entities[j].canonical_name.split_whitespace().count() > 1;
    if has_surname {
        return decision.confidence >= 0.85 && decision.conflicting_signals.is_empty();
    }
    decision.confidence >= 0.90 && !decision.supporting_signals.is_empty() && decision.conflicting_signals.is_empty()
}

/// Runs the oracle-backed resolution pass, returning the merged entity list.
/// Rejected pairs are memoized for the run so the same pair is never asked
/// twice (spec §4.6.1).
pub async fn resolve(mut entities: Vec<CorrelatedEntity>, oracle: Arc<dyn Oracle>) -> EtResult<Vec<CorrelatedEntity>> {
    if entities.len() < 2 {
        return Ok(entities);
    }

    let pairs = candidate_pairs(&entities);
    let mut uf = UnionFind::new(entities.len());
    let schema = response_schema();

    for (i, j) in pairs {
        let contexts: Vec<String> = entities[i]
            .occurrences
            .iter()
            .chain(entities[j].occurrences.iter())
            .map(|o| o.context.clone())
            .take(6)
            .collect();

        let (decision, _usage) = oracle
            .resolve_entity_pair(&entities[i].canonical_name, &entities[j].canonical_name, &contexts, PROMPT, &schema)
            .await?;

        if accept_merge(&entities, i, j, &decision) {
            uf.union(i, j);
        }
    }

    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for idx in 0..entities.len() {
        let root = uf.find(idx);
        groups.entry(root).or_default().push(idx);
    }

    let mut merged = Vec::with_capacity(groups.len());
    for members in groups.into_values() {
        if members.len() == 1 {
            merged.push(entities[members[0]].clone());
            continue;
        }
        merged.push(merge_entities(&entities, &members));
    }
    merged.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));
    entities = merged;
    Ok(entities)
}

/// Combines occurrences from every member into one entity; canonical name is
/// the variant with the highest aggregate occurrence count, lexicographic
/// ties broken (spec §4.6.1).
fn merge_entities(entities: &[CorrelatedEntity], members: &[usize]) -> CorrelatedEntity {
    let mut variant_counts: HashMap<String, u32> = HashMap::new();
    let mut occurrences = Vec::new();
    for &idx in members {
        *variant_counts.entry(entities[idx].canonical_name.clone()).or_insert(0) += entities[idx].occurrences.len() as u32;
        occurrences.extend(entities[idx].occurrences.iter().cloned());
    }
    let canonical_name = super::entities::canonical_display_name(&variant_counts);
    let mean_confidence = occurrences.iter().map(|o| o.confidence).sum::<f64>() / occurrences.len() as f64;

    CorrelatedEntity {
        canonical_name,
        entity_type: entities[members[0]].entity_type,
        occurrences,
        correlation_confidence: mean_confidence.min(0.99),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_indicator_matches_shared_surname_and_initial() {
        assert!(shares_indicator("J Smith", "John Smith"));
        assert!(!shares_indicator("John Smith", "John Smith"));
        assert!(!shares_indicator("Acme Corp", "John Smith"));
    }

    #[test]
    fn shares_indicator_matches_single_token_name_against_full_name() {
        assert!(shares_indicator("Paul", "Paul Boucherat"));
        assert!(shares_indicator("Boucherat", "Paul Boucherat"));
        assert!(!shares_indicator("Paul", "John Smith"));
    }

    #[test]
    fn union_find_merges_transitively() {
        let mut uf = UnionFind::new(3);
        uf.union(0, 1);
        uf.union(1, 2);
        assert_eq!(uf.find(0), uf.find(2));
    }
}
