//! End-to-end pipeline tests against a `NullOracle` and a `tempfile` store
//! root. Exercises the full ingest -> analyze -> correlate -> package run
//! without any network I/O.

mod common;

use std::fs;
use std::sync::Arc;

use evidence_toolkit::config::RunConfig;
use evidence_toolkit::context::RunContext;
use evidence_toolkit::pipeline::Pipeline;
use evidence_toolkit::store::Store;

use common::{FailingOracle, NullOracle};

fn write_case_files(case_dir: &std::path::Path) {
    fs::create_dir_all(case_dir).unwrap();
    fs::write(case_dir.join("letter.txt"), "Dear John Smith, regarding the incident on May 1st. - Acme Corp").unwrap();
    fs::write(case_dir.join("memo.txt"), "Memo: John Smith raised concerns about Acme Corp policy again.").unwrap();
}

#[tokio::test]
async fn process_case_runs_all_four_stages() {
    let store_root = tempfile::tempdir().unwrap();
    let case_dir = tempfile::tempdir().unwrap();
    write_case_files(case_dir.path());

    let store = Arc::new(Store::open(store_root.path()).unwrap());
    let oracle = Arc::new(NullOracle);
    let config = Arc::new(RunConfig::default());
    let ctx = RunContext::new(store.clone(), oracle, config);

    let outcome = Pipeline::new(ctx).process_case(case_dir.path(), "case-001", "test").await.unwrap();

    assert_eq!(outcome.ingested, 2);
    assert!(outcome.ingest_failures.is_empty());
    assert_eq!(outcome.analyzed, 2);
    assert!(outcome.analyze_failures.is_empty());
    assert!(outcome.correlated);
    assert_eq!(outcome.exit_code(), 0);

    let package_path = outcome.package_path.expect("package stage should have run");
    assert!(package_path.exists());
    assert!(package_path.with_extension("zip.sha256").exists());

    let hashes = store.list(Some("case-001")).unwrap();
    assert_eq!(hashes.len(), 2);

    let correlation = store.read_correlation("case-001").unwrap().expect("correlation result should be stored");
    assert_eq!(correlation.case_id, "case-001");
}

#[tokio::test]
async fn reingesting_identical_case_is_idempotent() {
    let store_root = tempfile::tempdir().unwrap();
    let case_dir = tempfile::tempdir().unwrap();
    write_case_files(case_dir.path());

    let store = Arc::new(Store::open(store_root.path()).unwrap());
    let oracle = Arc::new(NullOracle);
    let config = Arc::new(RunConfig::default());
    let ctx = RunContext::new(store.clone(), oracle, config);
    let pipeline = Pipeline::new(ctx);

    let first = pipeline.process_case(case_dir.path(), "case-002", "test").await.unwrap();
    let second = pipeline.process_case(case_dir.path(), "case-002", "test").await.unwrap();

    assert_eq!(first.ingested, second.ingested);
    assert_eq!(store.list(Some("case-002")).unwrap().len(), 2);
}

#[tokio::test]
async fn analyzer_failures_are_isolated_not_fatal() {
    let store_root = tempfile::tempdir().unwrap();
    let case_dir = tempfile::tempdir().unwrap();
    write_case_files(case_dir.path());

    let store = Arc::new(Store::open(store_root.path()).unwrap());
    let oracle = Arc::new(FailingOracle);
    let mut base_config = RunConfig::default();
    base_config.fail_fast = false;
    let config = Arc::new(base_config);
    let ctx = RunContext::new(store.clone(), oracle, config);

    let outcome = Pipeline::new(ctx).process_case(case_dir.path(), "case-003", "test").await.unwrap();

    assert_eq!(outcome.ingested, 2);
    assert_eq!(outcome.analyzed, 0);
    assert_eq!(outcome.analyze_failures.len(), 2);
    assert_eq!(outcome.exit_code(), 1);
}

#[tokio::test]
async fn fail_fast_stops_after_analyze_failures_without_correlating() {
    let store_root = tempfile::tempdir().unwrap();
    let case_dir = tempfile::tempdir().unwrap();
    write_case_files(case_dir.path());

    let store = Arc::new(Store::open(store_root.path()).unwrap());
    let oracle = Arc::new(FailingOracle);
    let mut base_config = RunConfig::default();
    base_config.fail_fast = true;
    let config = Arc::new(base_config);
    let ctx = RunContext::new(store.clone(), oracle, config);

    let outcome = Pipeline::new(ctx).process_case(case_dir.path(), "case-004", "test").await.unwrap();

    assert!(!outcome.correlated);
    assert!(outcome.package_path.is_none());
    assert_eq!(outcome.exit_code(), 1);
}
