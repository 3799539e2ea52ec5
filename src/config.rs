//! Run configuration, loaded once at run start and held immutably.
//!
//! A single typed struct threaded through `RunContext` for the lifetime of
//! a run, rather than ad hoc `env::var` reads scattered across call sites.

use std::time::Duration;

/// Name of the environment variable carrying the oracle endpoint credential.
pub const ORACLE_API_KEY_ENV_VAR: &str = "EVIDENCE_TOOLKIT_ORACLE_API_KEY";

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Bound on concurrent oracle calls during the analyze stage.
    pub max_concurrent: usize,
    /// Bound on concurrent file ingests (`min(8, file_count)` applied by the caller).
    pub ingest_width: usize,
    /// Per-oracle-call timeout.
    pub oracle_timeout: Duration,
    /// Maximum retry attempts for transient oracle errors.
    pub retry_attempts: usize,
    /// Initial backoff delay.
    pub retry_initial_delay: Duration,
    /// Maximum backoff delay.
    pub retry_max_delay: Duration,
    /// Sliding window for temporal-sequence grouping, in hours.
    pub temporal_window_hours: f64,
    /// Gap threshold for timeline-gap detection, in days.
    pub timeline_gap_days: f64,
    /// Maximum label links created per evidence item.
    pub max_labels_per_evidence: usize,
    /// Whether AI-assisted entity resolution (§4.6.1) is enabled.
    pub ai_resolve: bool,
    /// Stop a stage as soon as any item fails, instead of isolating failures.
    pub fail_fast: bool,
    /// Oracle endpoint base URL.
    pub oracle_base_url: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            max_concurrent: 5,
            ingest_width: 8,
            oracle_timeout: Duration::from_secs(60),
            retry_attempts: 3,
            retry_initial_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            temporal_window_hours: 72.0,
            timeline_gap_days: 14.0,
            max_labels_per_evidence: 3,
            ai_resolve: false,
            fail_fast: false,
            oracle_base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

impl RunConfig {
    /// Load defaults, overriding only what the environment specifies.
    ///
    /// Configuration loading itself stays out of scope here (the CLI
    /// parser and env loader are external collaborators); this is the
    /// minimal seam the orchestrator needs to run without a CLI in tests.
    pub fn from_env_and_defaults() -> Self {
        let mut cfg = RunConfig::default();

        if let Ok(base_url) = std::env::var("EVIDENCE_TOOLKIT_ORACLE_BASE_URL") {
            cfg.oracle_base_url = base_url;
        }
        if let Ok(v) = std::env::var("EVIDENCE_TOOLKIT_MAX_CONCURRENT") {
            if let Ok(n) = v.parse() {
                cfg.max_concurrent = n;
            }
        }
        if std::env::var("EVIDENCE_TOOLKIT_AI_RESOLVE").is_ok() {
            cfg.ai_resolve = true;
        }
        if std::env::var("EVIDENCE_TOOLKIT_FAIL_FAST").is_ok() {
            cfg.fail_fast = true;
        }

        cfg
    }

    pub fn ingest_width_for(&self, file_count: usize) -> usize {
        self.ingest_width.min(file_count).max(1)
    }

    pub fn oracle_api_key(&self) -> Option<String> {
        std::env::var(ORACLE_API_KEY_ENV_VAR).ok()
    }
}
