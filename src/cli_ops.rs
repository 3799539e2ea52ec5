//! Library entry points for the CLI surface (spec §6): `process-case`,
//! `ingest`, `analyze`, `export`, `correlate`. `main.rs` is a thin `clap`
//! wrapper over these; nothing here touches `std::io::stdin`/`stdout`
//! directly so they stay independently testable.

use std::path::Path;

use crate::analyzers::{AnalyzerContext, DocumentAnalyzer, EmailAnalyzer, ImageAnalyzer};
use crate::context::RunContext;
use crate::correlator::Correlator;
use crate::error::{EtError, EtResult};
use crate::hashing;
use crate::pipeline::{Pipeline, RunOutcome};
use crate::schema::{AnalysisRecord, CorrelationResult, EvidenceType};
use crate::store::IngestResult;

pub async fn process_case(ctx: &RunContext, case_dir: &Path, case_id: &str, actor: &str) -> EtResult<RunOutcome> {
    Pipeline::new(ctx.clone()).process_case(case_dir, case_id, actor).await
}

pub fn ingest(ctx: &RunContext, path: &Path, case_id: Option<&str>, actor: &str) -> EtResult<IngestResult> {
    if path.is_dir() {
        let mut last = None;
        for entry in walkdir::WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() {
                last = Some(ctx.store.ingest(entry.path(), case_id, actor)?);
            }
        }
        last.ok_or_else(|| EtError::Input(format!("{} contains no files", path.display())))
    } else {
        ctx.store.ingest(path, case_id, actor)
    }
}

/// Dispatches to the analyzer for `type_override`, or the hash's recorded
/// `EvidenceType` when no override is given (spec §6 `analyze`).
pub async fn analyze(ctx: &RunContext, sha256: &str, type_override: Option<EvidenceType>) -> EtResult<AnalysisRecord> {
    let bundle = ctx.store.read_bundle(sha256)?.ok_or_else(|| EtError::Input(format!("unknown evidence {sha256}")))?;
    let evidence_type = type_override.unwrap_or(bundle.evidence.evidence_type);

    let analyzer_ctx = AnalyzerContext {
        store: ctx.store.clone(),
        oracle: ctx.oracle.clone(),
        config: ctx.config.clone(),
    };

    match evidence_type {
        EvidenceType::Document => DocumentAnalyzer::new(analyzer_ctx).analyze(sha256).await,
        EvidenceType::Email => EmailAnalyzer::new(analyzer_ctx).analyze(sha256).await,
        EvidenceType::Image => ImageAnalyzer::new(analyzer_ctx).analyze(sha256).await,
        EvidenceType::Other => Err(EtError::Input(format!("{sha256} has no analyzer for evidence type 'other'"))),
    }
}

/// Writes a hash's evidence bundle to `output_path` as pretty JSON (spec §6
/// `export`).
pub fn export(ctx: &RunContext, sha256: &str, output_path: &Path) -> EtResult<()> {
    let bundle = ctx.store.read_bundle(sha256)?.ok_or_else(|| EtError::Input(format!("unknown evidence {sha256}")))?;
    let json = serde_json::to_vec_pretty(&bundle)?;
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output_path, json)?;
    Ok(())
}

pub async fn correlate(ctx: &RunContext, case_id: &str) -> EtResult<CorrelationResult> {
    Correlator::new(ctx.store.clone(), ctx.oracle.clone(), ctx.config.clone()).correlate(case_id).await
}

/// Classification helper exposed for the CLI's `--type` override validation.
pub fn classify_path(path: &Path) -> EvidenceType {
    hashing::classify(path)
}
