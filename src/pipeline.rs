//! Pipeline orchestrator (C7, spec §4.7): ingest → analyze → correlate →
//! package, with bounded concurrency, per-item failure isolation, and
//! idempotent re-runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::analyzers::{AnalyzerContext, DocumentAnalyzer, EmailAnalyzer, ImageAnalyzer};
use crate::context::RunContext;
use crate::correlator::Correlator;
use crate::error::EtError;
use crate::package::PackageWriter;
use crate::schema::EvidenceType;

/// One item's outcome in a parallel stage (spec §4.7: "failures on distinct
/// evidence items are isolated").
#[derive(Debug)]
pub struct ItemFailure {
    pub item: String,
    pub error: String,
}

/// Aggregate result of a full `process-case` run (spec §6 CLI surface, §7
/// exit-code policy).
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub ingested: usize,
    pub ingest_failures: Vec<ItemFailure>,
    pub analyzed: usize,
    pub analyze_failures: Vec<ItemFailure>,
    pub correlated: bool,
    pub package_path: Option<PathBuf>,
}

impl RunOutcome {
    /// 0 all ok, 1 partial failure, 2 fatal: no stage made progress (spec
    /// §7).
    pub fn exit_code(&self) -> i32 {
        let any_progress = self.ingested > 0 || self.analyzed > 0 || self.correlated || self.package_path.is_some();
        let any_failure = !self.ingest_failures.is_empty() || !self.analyze_failures.is_empty();
        if !any_progress && any_failure {
            2
        } else if any_failure {
            1
        } else {
            0
        }
    }
}

pub struct Pipeline {
    ctx: RunContext,
}

impl Pipeline {
    pub fn new(ctx: RunContext) -> Self {
        Pipeline { ctx }
    }

    /// Runs all four stages for one case (spec §4.7 `process-case`).
    pub async fn process_case(&self, case_dir: &Path, case_id: &str, actor: &str) -> Result<RunOutcome, EtError> {
        let mut outcome = RunOutcome::default();

        self.ingest_stage(case_dir, case_id, actor, &mut outcome)?;
        if self.ctx.config.fail_fast && !outcome.ingest_failures.is_empty() {
            return Ok(outcome);
        }

        self.analyze_stage(case_id, &mut outcome).await?;
        if self.ctx.config.fail_fast && !outcome.analyze_failures.is_empty() {
            return Ok(outcome);
        }

        self.correlate_stage(case_id, &mut outcome).await?;
        self.package_stage(case_id, &mut outcome).await?;

        Ok(outcome)
    }

    /// Stage 1: walk `case_dir` (excluding hidden files), ingesting each
    /// entry with bounded width `min(8, file_count)` (spec §4.7).
    fn ingest_stage(&self, case_dir: &Path, case_id: &str, actor: &str, outcome: &mut RunOutcome) -> Result<(), EtError> {
        let files: Vec<PathBuf> = walkdir::WalkDir::new(case_dir)
            .into_iter()
            .filter_entry(|e| !is_hidden(e))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .collect();

        let width = self.ctx.config.ingest_width_for(files.len().max(1));
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(width)
            .build()
            .map_err(|e| EtError::Storage(e.to_string()))?;

        let store = Arc::clone(&self.ctx.store);
        let results: Vec<Result<String, ItemFailure>> = pool.install(|| {
            use rayon::prelude::*;
            files
                .par_iter()
                .map(|path| {
                    store
                        .ingest(path, Some(case_id), actor)
                        .map(|r| r.sha256)
                        .map_err(|e| ItemFailure {
                            item: path.display().to_string(),
                            error: e.to_string(),
                        })
                })
                .collect()
        });

        for result in results {
            match result {
                Ok(_) => outcome.ingested += 1,
                Err(failure) => outcome.ingest_failures.push(failure),
            }
        }
        Ok(())
    }

    /// Stage 2: dispatch each case evidence hash to the analyzer matching
    /// its `EvidenceType`, bounded by `max_concurrent` concurrent oracle
    /// calls (spec §4.7, §5).
    async fn analyze_stage(&self, case_id: &str, outcome: &mut RunOutcome) -> Result<(), EtError> {
        let hashes = self.ctx.store.list(Some(case_id))?;
        let semaphore = Arc::new(Semaphore::new(self.ctx.config.max_concurrent.max(1)));
        let analyzer_ctx = AnalyzerContext {
            store: Arc::clone(&self.ctx.store),
            oracle: Arc::clone(&self.ctx.oracle),
            config: Arc::clone(&self.ctx.config),
        };

        let mut tasks = JoinSet::new();
        for sha256 in hashes {
            let Some(bundle) = self.ctx.store.read_bundle(&sha256)? else {
                continue;
            };
            let evidence_type = bundle.evidence.evidence_type;
            let ctx = analyzer_ctx.clone();
            let permit = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore not closed");
                let result = dispatch_analyze(&ctx, &sha256, evidence_type).await;
                (sha256, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (sha256, result) = joined.map_err(|e| EtError::Storage(e.to_string()))?;
            match result {
                Some(Ok(())) => outcome.analyzed += 1,
                Some(Err(e)) => outcome.analyze_failures.push(ItemFailure {
                    item: sha256,
                    error: e.to_string(),
                }),
                None => {}
            }
        }
        Ok(())
    }

    /// Stage 3: run the correlator once per case (spec §4.7).
    async fn correlate_stage(&self, case_id: &str, outcome: &mut RunOutcome) -> Result<(), EtError> {
        let correlator = Correlator::new(Arc::clone(&self.ctx.store), Arc::clone(&self.ctx.oracle), Arc::clone(&self.ctx.config));
        correlator.correlate(case_id).await?;
        outcome.correlated = true;
        Ok(())
    }

    /// Stage 4: package the case into a signed archive (spec §4.7, §4.8).
    async fn package_stage(&self, case_id: &str, outcome: &mut RunOutcome) -> Result<(), EtError> {
        let writer = PackageWriter::new(Arc::clone(&self.ctx.store), Arc::clone(&self.ctx.oracle));
        let archive_path = self.ctx.store.root().join("cases").join(case_id).join("package.zip");
        writer.write_package(case_id, &archive_path).await?;
        outcome.package_path = Some(archive_path);
        Ok(())
    }
}

async fn dispatch_analyze(ctx: &AnalyzerContext, sha256: &str, evidence_type: EvidenceType) -> Option<Result<(), EtError>> {
    match evidence_type {
        EvidenceType::Document => Some(DocumentAnalyzer::new(ctx.clone()).analyze(sha256).await.map(|_| ())),
        EvidenceType::Email => Some(EmailAnalyzer::new(ctx.clone()).analyze(sha256).await.map(|_| ())),
        EvidenceType::Image => Some(ImageAnalyzer::new(ctx.clone()).analyze(sha256).await.map(|_| ())),
        EvidenceType::Other => None,
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.file_name().to_str().is_some_and(|s| s.starts_with('.')) && entry.depth() > 0
}
