//! Image analyzer (spec §4.5 ImageAnalyzer).

use serde_json::json;

use super::{build_parameters, model_revision, read_raw_bytes, AnalyzerContext, MODEL_NAME};
use crate::error::{EtError, EtResult};
use crate::oracle::prompt_hash;
use crate::schema::{AnalysisOutputs, AnalysisRecord, ImageAnalysis, ModelInfo, Validate};

const PROMPT: &str = "Describe this image for a legal investigation. Identify objects, any visible \
text, and any applicable risk flags (quality, tampering, legibility, sensitive content).";

fn response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "required": ["summary", "objects", "risk_flags", "confidence_overall"],
    })
}

pub struct ImageAnalyzer {
    ctx: AnalyzerContext,
}

impl ImageAnalyzer {
    pub fn new(ctx: AnalyzerContext) -> Self {
        ImageAnalyzer { ctx }
    }

    pub async fn analyze(&self, sha256: &str) -> EtResult<AnalysisRecord> {
        let bundle = self.ctx.store.read_bundle(sha256)?.ok_or_else(|| EtError::Storage(format!("unknown evidence {sha256}")))?;
        let bytes = read_raw_bytes(&self.ctx.store, sha256, &bundle.evidence.extension)?;

        let hash = prompt_hash(PROMPT);
        let revision = model_revision();
        let analysis_id = AnalysisRecord::compute_analysis_id(sha256, &hash, &revision);
        if let Some(existing) = bundle.analyses.iter().find(|a| a.analysis_id == analysis_id) {
            return Ok(existing.clone());
        }

        let schema = response_schema();
        let (ai, usage): (ImageAnalysis, _) =
            self.ctx.oracle.analyze_image(&bytes, &bundle.evidence.mime_type, PROMPT, &schema).await?;
        ai.validate().map_err(EtError::SchemaViolation)?;

        let record = AnalysisRecord::new(
            sha256,
            ModelInfo {
                name: MODEL_NAME.to_string(),
                revision,
            },
            build_parameters(hash, usage.input_tokens, usage.output_tokens),
            AnalysisOutputs::Image(ai),
        );
        record.validate().map_err(EtError::SchemaViolation)?;

        self.ctx.store.write_analysis(sha256, record.clone(), "image_analyzer", self.ctx.config.max_labels_per_evidence)?;
        Ok(record)
    }
}
