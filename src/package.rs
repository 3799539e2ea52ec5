//! Package writer: assembles a case's evidence and correlation results into
//! one ZIP archive. "Signed" here means a SHA-256 integrity manifest over
//! the archive's own entries, not encryption; this repo carries no
//! AES/PBKDF2 dependency.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{EtError, EtResult};
use crate::oracle::Oracle;
use crate::schema::{EvidenceBundle, RiskFlag};
use crate::store::Store;

#[derive(Serialize)]
struct PackageMetadata {
    case_id: String,
    created: chrono::DateTime<Utc>,
    evidence_count: usize,
    evidence_types: Vec<String>,
    risk_summary: Vec<String>,
}

#[derive(Serialize)]
struct CatalogEntry {
    sha256: String,
    filename: String,
    evidence_type: String,
    confidence: Option<f64>,
    risk_flags: Vec<String>,
    size: u64,
}

pub struct PackageWriter {
    store: Arc<Store>,
    oracle: Arc<dyn Oracle>,
}

impl PackageWriter {
    pub fn new(store: Arc<Store>, oracle: Arc<dyn Oracle>) -> Self {
        PackageWriter { store, oracle }
    }

    /// Assembles a case's evidence bundles, correlation result, and an
    /// oracle-rendered executive summary into one ZIP archive at
    /// `archive_path` (spec §6). Appends a `<archive>.sha256` manifest file
    /// alongside it (spec §4.3 custody action `package`).
    pub async fn write_package(&self, case_id: &str, archive_path: &Path) -> EtResult<()> {
        let hashes = self.store.list(Some(case_id))?;
        let mut bundles = Vec::with_capacity(hashes.len());
        for sha256 in &hashes {
            if let Some(bundle) = self.store.read_bundle(sha256)? {
                bundles.push(bundle);
            }
        }

        let correlation = self.store.read_correlation(case_id)?;

        if let Some(parent) = archive_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(archive_path)?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let metadata = build_metadata(case_id, &bundles);
        write_json(&mut zip, "package_metadata.json", &metadata, options)?;

        let catalog: Vec<CatalogEntry> = bundles.iter().map(catalog_entry).collect();
        write_json(&mut zip, "evidence_catalog/evidence_catalog.json", &catalog, options)?;

        for bundle in &bundles {
            write_json(&mut zip, &format!("analyses/{}.json", bundle.evidence.sha256), bundle, options)?;
        }

        if let Some(correlation) = &correlation {
            write_json(&mut zip, "correlations/correlation_analysis.json", correlation, options)?;
        }

        let summary_text = self.render_executive_summary(case_id, &correlation).await?;
        zip.start_file("reports/executive_summary.txt", options)?;
        zip.write_all(summary_text.as_bytes())?;

        zip.finish().map_err(|e| EtError::Storage(e.to_string()))?;

        let archive_hash = hash_file(archive_path)?;
        let manifest_path = archive_path.with_extension("zip.sha256");
        std::fs::write(&manifest_path, format!("{archive_hash}  {}\n", archive_path.display().to_string().trim()))?;

        self.store.record_package_custody(case_id, "package_writer")?;
        Ok(())
    }

    /// Calls `summarize_case` (spec §4.4, §4.8) with the correlation result
    /// as structured context; falls back to a deterministic local summary
    /// when there is nothing to correlate over yet.
    async fn render_executive_summary(&self, case_id: &str, correlation: &Option<crate::schema::CorrelationResult>) -> EtResult<String> {
        let Some(correlation) = correlation else {
            return Ok(format!("No correlation analysis available yet for case {case_id}.\n"));
        };

        let correlation_input = json!({
            "case_id": correlation.case_id,
            "entity_count": correlation.entity_correlations.len(),
            "timeline_length": correlation.timeline.len(),
            "contradictions": correlation.legal_patterns.contradictions,
            "corroboration": correlation.legal_patterns.corroboration,
            "evidence_gaps": correlation.legal_patterns.evidence_gaps,
            "case_summary": correlation.case_summary,
        });
        let schema = json!({"type": "object", "required": ["summary", "key_findings"]});
        let prompt = "Summarize this case's evidence for a legal reader: overall narrative, key findings, \
                      and any recommended next actions.";

        let (summary, _usage) = self.oracle.summarize_case(&correlation_input, prompt, &schema).await?;

        let mut text = format!("Evidence coherence: {:?}\n\n{}\n\nKey findings:\n", correlation.case_summary.evidence_coherence, summary.summary);
        for finding in &summary.key_findings {
            text.push_str(&format!("- {finding}\n"));
        }
        if !correlation.case_summary.narrative_themes.is_empty() {
            text.push_str("\nNarrative themes:\n");
            for theme in &correlation.case_summary.narrative_themes {
                text.push_str(&format!("- {} (strength {:.2})\n", theme.theme_name, theme.strength));
            }
        }
        if let Some(actions) = &summary.recommended_actions {
            text.push_str("\nRecommended actions:\n");
            for action in actions {
                text.push_str(&format!("- {action}\n"));
            }
        }
        Ok(text)
    }
}

fn build_metadata(case_id: &str, bundles: &[EvidenceBundle]) -> PackageMetadata {
    let mut types: Vec<String> = bundles.iter().map(|b| format!("{:?}", b.evidence.evidence_type).to_lowercase()).collect();
    types.sort_unstable();
    types.dedup();

    let mut risk_summary: Vec<String> = bundles
        .iter()
        .filter_map(|b| b.canonical_analysis())
        .flat_map(risk_flags_of)
        .filter_map(|f| serde_json::to_string(&f).ok())
        .map(|s| s.trim_matches('"').to_string())
        .collect();
    risk_summary.sort_unstable();
    risk_summary.dedup();

    PackageMetadata {
        case_id: case_id.to_string(),
        created: Utc::now(),
        evidence_count: bundles.len(),
        evidence_types: types,
        risk_summary,
    }
}

fn catalog_entry(bundle: &EvidenceBundle) -> CatalogEntry {
    let analysis = bundle.canonical_analysis();
    CatalogEntry {
        sha256: bundle.evidence.sha256.clone(),
        filename: bundle.evidence.original_filename.clone(),
        evidence_type: format!("{:?}", bundle.evidence.evidence_type).to_lowercase(),
        confidence: analysis.map(|a| a.outputs.confidence_overall()),
        risk_flags: analysis
            .map(|a| risk_flags_of(a).into_iter().filter_map(|f| serde_json::to_string(&f).ok()).map(|s| s.trim_matches('"').to_string()).collect())
            .unwrap_or_default(),
        size: bundle.evidence.size,
    }
}

fn risk_flags_of(record: &crate::schema::AnalysisRecord) -> Vec<RiskFlag> {
    match &record.outputs {
        crate::schema::AnalysisOutputs::Document(d) => d.ai.risk_flags.clone(),
        crate::schema::AnalysisOutputs::Email(e) => e.risk_flags.clone(),
        crate::schema::AnalysisOutputs::Image(i) => i.risk_flags.clone(),
    }
}

fn write_json<W: Write + std::io::Seek, T: Serialize>(zip: &mut ZipWriter<W>, name: &str, value: &T, options: FileOptions) -> EtResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    zip.start_file(name, options).map_err(|e| EtError::Storage(e.to_string()))?;
    zip.write_all(&bytes)?;
    Ok(())
}

fn hash_file(path: &Path) -> EtResult<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
