//! Document analyzer (spec §4.5 DocumentAnalyzer).

use std::collections::HashMap;

use serde_json::json;

use super::{build_parameters, model_revision, read_raw_bytes, AnalyzerContext, MODEL_NAME};
use crate::error::{EtError, EtResult};
use crate::oracle::prompt_hash;
use crate::schema::{AnalysisOutputs, AnalysisRecord, DocumentAnalysisOutput, ModelInfo, Validate, WordFrequencyStats};

const PROMPT: &str = "Analyze this document for a legal investigation. Identify entities, document \
type, sentiment, legal significance, and any applicable risk flags.";

fn response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["summary", "entities", "document_type", "sentiment", "legal_significance", "risk_flags", "confidence_overall"],
    })
}

pub struct DocumentAnalyzer {
    ctx: AnalyzerContext,
}

impl DocumentAnalyzer {
    pub fn new(ctx: AnalyzerContext) -> Self {
        DocumentAnalyzer { ctx }
    }

    /// Runs the analyzer on one evidence item, idempotently (spec §4.5
    /// "Common behavior"). Returns the canonical `AnalysisRecord`, whether
    /// freshly computed or reused.
    pub async fn analyze(&self, sha256: &str) -> EtResult<AnalysisRecord> {
        let bundle = self.ctx.store.read_bundle(sha256)?.ok_or_else(|| EtError::Storage(format!("unknown evidence {sha256}")))?;
        let text = extract_text(&self.ctx.store, sha256, &bundle.evidence.extension)?;

        let hash = prompt_hash(PROMPT);
        let revision = model_revision();
        let analysis_id = AnalysisRecord::compute_analysis_id(sha256, &hash, &revision);
        if let Some(existing) = bundle.analyses.iter().find(|a| a.analysis_id == analysis_id) {
            return Ok(existing.clone());
        }

        let local_stats = word_frequency_stats(&text);
        let schema = response_schema();
        let (ai, usage) = self.ctx.oracle.analyze_document(&text, PROMPT, &schema).await?;

        let output = DocumentAnalysisOutput { local_stats, ai };
        output.validate().map_err(EtError::SchemaViolation)?;

        let record = AnalysisRecord::new(
            sha256,
            ModelInfo {
                name: MODEL_NAME.to_string(),
                revision,
            },
            build_parameters(hash, usage.input_tokens, usage.output_tokens),
            AnalysisOutputs::Document(output),
        );
        record.validate().map_err(EtError::SchemaViolation)?;

        self.ctx.store.write_analysis(sha256, record.clone(), "document_analyzer", self.ctx.config.max_labels_per_evidence)?;
        Ok(record)
    }
}

/// Verbatim for plain text; page-concatenated for PDFs with extractable
/// text (spec §4.5).
fn extract_text(store: &crate::store::Store, sha256: &str, extension: &str) -> EtResult<String> {
    let bytes = read_raw_bytes(store, sha256, extension)?;
    if extension.eq_ignore_ascii_case(".pdf") {
        let path = store.root().join("raw").join(format!("sha256={sha256}")).join(format!("original{extension}"));
        return pdf_extract::extract_text(&path).map_err(|e| EtError::Input(format!("pdf text extraction failed: {e}")));
    }
    String::from_utf8(bytes).map_err(|e| EtError::Input(format!("document is not valid UTF-8 text: {e}")))
}

fn word_frequency_stats(text: &str) -> WordFrequencyStats {
    let mut counts: HashMap<String, u32> = HashMap::new();
    let mut total = 0u32;
    for raw_word in text.split_whitespace() {
        let word: String = raw_word.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase();
        if word.is_empty() {
            continue;
        }
        total += 1;
        *counts.entry(word).or_insert(0) += 1;
    }
    let mut top_words: Vec<(String, u32)> = counts.iter().map(|(w, c)| (w.clone(), *c)).collect();
    top_words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_words.truncate(20);

    WordFrequencyStats {
        top_words,
        total_words: total,
        unique_words: counts.len() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_frequency_counts_ignore_case_and_punctuation() {
        let stats = word_frequency_stats("Evidence, evidence! The EVIDENCE is clear.");
        assert_eq!(stats.total_words, 5);
        assert_eq!(stats.unique_words, 3);
        assert_eq!(stats.top_words[0], ("evidence".to_string(), 3));
    }
}
