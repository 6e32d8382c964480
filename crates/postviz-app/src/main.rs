use std::{process, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing_subscriber::{filter::LevelFilter, fmt};

use postviz_app::cli::{Cli, CleanupArgs, Commands, GenerateArgs, ReapArgs, ScanArgs, StatusArgs};
use postviz_app::config;
use postviz_app::error::AppError;
use postviz_app::paths::AppPaths;
use postviz_app::services::{
    FsArtifactStore, GenerationOrchestrator, GenerationProvider, GenerationRecordStore,
    PipelineError, ProviderError, ReaperConfig, RegenerationMode, build_orchestrator,
    cleanup_record, reap_stuck_records,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_level = determine_log_level(&cli);
    init_tracing(log_level);

    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn determine_log_level(cli: &Cli) -> LevelFilter {
    match cli.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn init_tracing(level: LevelFilter) {
    let subscriber = fmt().with_max_level(level).with_target(false).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        None => {
            Cli::print_help();
            Ok(())
        }
        Some(Commands::Serve(_)) => serve().await,
        Some(Commands::Generate(args)) => generate(args).await,
        Some(Commands::Scan(args)) => scan(args).await,
        Some(Commands::Status(args)) => status(args),
        Some(Commands::Cleanup(args)) => cleanup(args).await,
        Some(Commands::Reap(args)) => reap(args),
    }
}

/// Adapter exposing the orchestrator through the server's provider seam.
struct OrchestratorProvider {
    orchestrator: GenerationOrchestrator,
}

fn internal(error: impl std::fmt::Display) -> ProviderError {
    ProviderError::Internal(error.to_string())
}

#[async_trait]
impl GenerationProvider for OrchestratorProvider {
    async fn record_by_slug(&self, slug: &str) -> Result<Option<Value>, ProviderError> {
        let record = self.orchestrator.record_by_slug(slug).map_err(internal)?;
        record
            .map(|record| serde_json::to_value(record).map_err(internal))
            .transpose()
    }

    async fn generate(&self, slug: &str, mode: RegenerationMode) -> Result<Value, ProviderError> {
        match self.orchestrator.run(slug, mode).await {
            Ok(report) => serde_json::to_value(report).map_err(internal),
            Err(error @ PipelineError::NotFound(_)) => {
                Err(ProviderError::NotFound(error.to_string()))
            }
            Err(error) => Err(internal(error)),
        }
    }

    async fn scan(
        &self,
        mode: RegenerationMode,
        limit: Option<usize>,
    ) -> Result<Value, ProviderError> {
        let report = self
            .orchestrator
            .scan(mode, limit)
            .await
            .map_err(internal)?;
        serde_json::to_value(report).map_err(internal)
    }
}

async fn serve() -> Result<(), AppError> {
    let config = config::load()?;
    let orchestrator = build_orchestrator(&config)?;
    let provider = Arc::new(OrchestratorProvider { orchestrator });
    postviz_server::serve(&config.server, provider).await?;
    Ok(())
}

async fn generate(args: GenerateArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let orchestrator = build_orchestrator(&config)?;

    let report = orchestrator.run(&args.slug, args.mode.to_mode()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn scan(args: ScanArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let orchestrator = build_orchestrator(&config)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").expect("static template must parse"),
    );
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_message("scanning content items");

    let report = orchestrator.scan(args.mode.to_mode(), args.limit).await?;
    spinner.finish_and_clear();

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn status(args: StatusArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let paths = AppPaths::new(&config.storage.path)?;
    let store = GenerationRecordStore::open(&paths)?;

    match store.get_by_slug(&args.slug)? {
        None => println!("no record for `{}` (pending)", args.slug),
        Some(record) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                let updated = Utc
                    .timestamp_millis_opt(record.updated_at_ms)
                    .single()
                    .map(|ts| ts.to_rfc3339())
                    .unwrap_or_else(|| record.updated_at_ms.to_string());
                println!("slug:      {}", record.slug);
                println!("status:    {}", record.status);
                println!("updated:   {updated}");
                println!("artifacts: {}", record.artifacts.len());
                for (kind, artifact) in &record.artifacts {
                    println!("  {kind}: {}", artifact.url);
                }
                if let Some(error) = &record.error {
                    println!("error:     {error}");
                }
            }
        }
    }
    Ok(())
}

async fn cleanup(args: CleanupArgs) -> Result<(), AppError> {
    if !args.force {
        eprintln!(
            "cleanup permanently deletes the record and its artifacts; re-run with --force"
        );
        return Ok(());
    }

    let config = config::load()?;
    let paths = AppPaths::new(&config.storage.path)?;
    let store = GenerationRecordStore::open(&paths)?;
    let artifacts = FsArtifactStore::builder()
        .root(paths.artifacts_dir()?)
        .public_base_url(config.artifacts.public_base_url.clone())
        .build();

    match cleanup_record(&store, &artifacts, &args.slug).await? {
        None => println!("no record for `{}`", args.slug),
        Some(report) => println!(
            "removed record `{}` ({} artifacts deleted)",
            report.item_id, report.deleted_artifacts
        ),
    }
    Ok(())
}

fn reap(args: ReapArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let paths = AppPaths::new(&config.storage.path)?;
    let store = GenerationRecordStore::open(&paths)?;

    let reaper_config = ReaperConfig {
        generating_max_age_ms: (args.max_age_mins as i64).saturating_mul(60_000),
    };
    let report = reap_stuck_records(&store, &reaper_config)?;
    if report.is_empty() {
        println!("no stuck records");
    } else {
        println!(
            "failed {} stuck record(s): {}",
            report.failed.len(),
            report.failed.join(", ")
        );
    }
    Ok(())
}
