use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use evidence_toolkit::config::{RunConfig, ORACLE_API_KEY_ENV_VAR};
use evidence_toolkit::context::RunContext;
use evidence_toolkit::oracle::{HttpOracle, RetryConfig, RetryingOracle};
use evidence_toolkit::schema::EvidenceType;
use evidence_toolkit::store::Store;
use evidence_toolkit::{cli_ops, logging};

#[derive(Parser)]
#[command(name = "evidence-toolkit", version, about = "Forensic evidence processing toolkit")]
struct Cli {
    /// Content-addressed store root.
    #[arg(long, global = true, default_value = "./evidence-store")]
    store_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest, analyze, correlate, and package a case in one run.
    ProcessCase {
        case_dir: PathBuf,
        #[arg(long)]
        case_id: String,
        #[arg(long, default_value = "5")]
        max_concurrent: usize,
        #[arg(long)]
        ai_resolve: bool,
    },
    /// Ingest one file or a directory of files.
    Ingest {
        path: PathBuf,
        #[arg(long)]
        case_id: Option<String>,
    },
    /// Run the analyzer for one evidence item.
    Analyze {
        sha256: String,
        #[arg(long, value_enum)]
        r#type: Option<CliEvidenceType>,
    },
    /// Export an evidence bundle to a JSON file.
    Export { sha256: String, output: PathBuf },
    /// Run the correlator for a case.
    Correlate { case_id: String },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliEvidenceType {
    Document,
    Image,
    Email,
    Other,
}

impl From<CliEvidenceType> for EvidenceType {
    fn from(t: CliEvidenceType) -> Self {
        match t {
            CliEvidenceType::Document => EvidenceType::Document,
            CliEvidenceType::Image => EvidenceType::Image,
            CliEvidenceType::Email => EvidenceType::Email,
            CliEvidenceType::Other => EvidenceType::Other,
        }
    }
}

#[tokio::main]
async fn main() {
    logging::init();
    let cli = Cli::parse();

    let mut config = RunConfig::from_env_and_defaults();
    let exit_code = match run(cli, &mut config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "fatal error");
            2
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli, config: &mut RunConfig) -> Result<i32, evidence_toolkit::error::EtError> {
    let store = Arc::new(Store::open(&cli.store_root)?);

    let api_key = std::env::var(ORACLE_API_KEY_ENV_VAR).unwrap_or_default();
    let http_oracle = HttpOracle::new(api_key, "evidence-toolkit-oracle", "2024-08-06", config.oracle_timeout)
        .with_base_url(config.oracle_base_url.clone());
    let retry_config = RetryConfig {
        max_attempts: config.retry_attempts,
        initial_delay: config.retry_initial_delay,
        max_delay: config.retry_max_delay,
        ..RetryConfig::default()
    };
    let oracle = Arc::new(RetryingOracle::with_config(http_oracle, retry_config));

    match cli.command {
        Commands::ProcessCase {
            case_dir,
            case_id,
            max_concurrent,
            ai_resolve,
        } => {
            config.max_concurrent = max_concurrent;
            config.ai_resolve = ai_resolve;
            let ctx = RunContext::new(store, oracle, Arc::new(config.clone()));
            let outcome = cli_ops::process_case(&ctx, &case_dir, &case_id, "cli").await?;
            tracing::info!(
                ingested = outcome.ingested,
                analyzed = outcome.analyzed,
                correlated = outcome.correlated,
                ingest_failures = outcome.ingest_failures.len(),
                analyze_failures = outcome.analyze_failures.len(),
                "process-case finished"
            );
            Ok(outcome.exit_code())
        }
        Commands::Ingest { path, case_id } => {
            let ctx = RunContext::new(store, oracle, Arc::new(config.clone()));
            let result = cli_ops::ingest(&ctx, &path, case_id.as_deref(), "cli")?;
            println!("{}", result.sha256);
            Ok(0)
        }
        Commands::Analyze { sha256, r#type } => {
            let ctx = RunContext::new(store, oracle, Arc::new(config.clone()));
            let record = cli_ops::analyze(&ctx, &sha256, r#type.map(Into::into)).await?;
            println!("{}", record.analysis_id);
            Ok(0)
        }
        Commands::Export { sha256, output } => {
            let ctx = RunContext::new(store, oracle, Arc::new(config.clone()));
            cli_ops::export(&ctx, &sha256, &output)?;
            Ok(0)
        }
        Commands::Correlate { case_id } => {
            let ctx = RunContext::new(store, oracle, Arc::new(config.clone()));
            let result = cli_ops::correlate(&ctx, &case_id).await?;
            println!("{} entities correlated, {} timeline events", result.entity_correlations.len(), result.timeline.len());
            Ok(0)
        }
    }
}
