//! Per-evidence analyzers (C5, spec §4.5): one analyzer per `EvidenceType`,
//! each producing a typed `AnalysisRecord` for one evidence item.

mod document;
mod email;
mod image;

pub use document::DocumentAnalyzer;
pub use email::EmailAnalyzer;
pub use image::ImageAnalyzer;

use std::sync::Arc;

use crate::config::RunConfig;
use crate::error::{EtError, EtResult};
use crate::oracle::Oracle;
use crate::schema::AnalysisParameters;
use crate::store::Store;

/// Prompt text and response schema are fixed per analyzer; kept together so
/// a single constant defines what's sent to the oracle for that evidence
/// type (spec §4.4 contracts: "the client forbids silent prompt mutation").
pub struct PromptSpec {
    pub prompt: &'static str,
    pub schema: serde_json::Value,
}

pub const MODEL_NAME: &str = "evidence-toolkit-oracle";

/// Resolves the model revision used for `analysis_id` binding (spec §4.4,
/// P4). Overridable via environment for oracle version pinning; defaults to
/// a fixed string so tests and the `NullOracle` path are deterministic.
pub fn model_revision() -> String {
    std::env::var("EVIDENCE_TOOLKIT_MODEL_REVISION").unwrap_or_else(|_| "2024-08-06".to_string())
}

pub(crate) fn build_parameters(prompt_hash: String, input_tokens: Option<u32>, output_tokens: Option<u32>) -> AnalysisParameters {
    AnalysisParameters {
        temperature: Some(0.0),
        prompt_hash,
        token_usage_in: input_tokens,
        token_usage_out: output_tokens,
    }
}

/// Shared dependencies every analyzer needs: the store to read raw bytes
/// from and write results to, the oracle, and run configuration.
#[derive(Clone)]
pub struct AnalyzerContext {
    pub store: Arc<Store>,
    pub oracle: Arc<dyn Oracle>,
    pub config: Arc<RunConfig>,
}

pub(crate) fn read_raw_bytes(store: &Store, sha256: &str, extension: &str) -> EtResult<Vec<u8>> {
    let path = store.root().join("raw").join(format!("sha256={sha256}")).join(format!("original{extension}"));
    std::fs::read(&path).map_err(|_| EtError::Storage(format!("raw bytes missing for {sha256}")))
}
