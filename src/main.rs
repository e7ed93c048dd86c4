use anyhow::Context;
use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use printvault::config::Config;
use printvault::middleware::auth::mint_token;
use printvault::services::enrichment::turbo::{run_turbo, serve_worker, DEFAULT_WORKERS};
use printvault::services::enrichment::EnrichOptions;
use printvault::services::orchestration::Pipeline;
use printvault::services::scanner::{ScanMode, ScanOutcome};
use printvault::services::scheduler::Scheduler;
use printvault::{create_routes, AppState};

#[derive(Parser)]
#[command(name = "printvault", version, about = "Fine-art print catalog pipeline and API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API with the watcher and the scheduled jobs.
    Serve,
    /// Scan the file tree once.
    Scan {
        /// Walk the whole tree instead of reading changes.
        #[arg(long)]
        full: bool,
    },
    /// Classify untagged assets.
    Enrich {
        /// Re-classify assets that already have a style.
        #[arg(long)]
        force: bool,
        #[arg(long)]
        limit: Option<u64>,
        /// Split the work across this many worker processes.
        #[arg(long, num_args = 0..=1, default_missing_value = "10")]
        turbo: Option<usize>,
    },
    /// Child process of `enrich --turbo`; speaks JSON lines on stdin/stdout.
    #[command(hide = true)]
    EnrichWorker,
    /// Embed assets that have no vector yet.
    Embed {
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Push pending assets to the storefront until none are left.
    Drip {
        /// Stop after this many variants.
        #[arg(long)]
        cap: Option<u64>,
    },
    /// Issue an admin bearer token.
    MintToken {
        #[arg(long, default_value = "operator")]
        subject: String,
        #[arg(long, default_value_t = 24)]
        hours: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Serve);

    // Worker stdout carries the protocol, so its logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    if let Command::MintToken { subject, hours } = &command {
        let token = mint_token(&config.admin_jwt_secret, subject, Duration::from_secs(hours * 3600))?;
        println!("{token}");
        return Ok(());
    }

    let db = Arc::new(connect(&config).await?);
    match command {
        Command::Serve => serve(db, config).await,
        Command::Scan { full } => {
            let pipeline = Pipeline::from_config(db, &config);
            let mode = if full { ScanMode::Full } else { ScanMode::Delta };
            match pipeline.scan(mode).await? {
                ScanOutcome::Completed(report) => {
                    tracing::info!("Scan | Done: {}", serde_json::to_string(&report)?)
                }
                ScanOutcome::AlreadyRunning => tracing::info!("Scan | Already running"),
            }
            Ok(())
        }
        Command::Enrich { force, limit, turbo } => {
            let pipeline = Pipeline::from_config(db, &config);
            let options = EnrichOptions { force, limit };
            let report = match turbo {
                Some(workers) => {
                    let worker = pipeline.enrichment().context("LLM_API_KEY is not set")?;
                    let workers = if workers == 0 { DEFAULT_WORKERS } else { workers };
                    run_turbo(worker.store().as_ref(), options, workers).await?
                }
                None => pipeline.enrich(options).await?,
            };
            tracing::info!(
                "Enrichment | Done: {} batches, {} tagged, {} errors",
                report.batches,
                report.tagged,
                report.errors
            );
            Ok(())
        }
        Command::EnrichWorker => {
            let pipeline = Pipeline::from_config(db, &config);
            let worker = pipeline.enrichment().context("LLM_API_KEY is not set")?;
            let input = BufReader::new(tokio::io::stdin());
            serve_worker(worker, input, tokio::io::stdout()).await?;
            Ok(())
        }
        Command::Embed { limit } => {
            let pipeline = Pipeline::from_config(db, &config);
            let report = pipeline.embed(limit).await?;
            tracing::info!("Embeddings | Done: {} embedded, {} errors", report.embedded, report.errors);
            Ok(())
        }
        Command::Drip { cap } => {
            let pipeline = Pipeline::from_config(db, &config);
            let drip = pipeline.drip().context("storefront credentials are not set")?;
            let status = drip.run_once(cap).await?;
            tracing::info!(
                "Drip | Done: {} synced, {} variants, {} errors",
                status.synced,
                status.variants_created,
                status.errors
            );
            Ok(())
        }
        Command::MintToken { .. } => Ok(()),
    }
}

async fn connect(config: &Config) -> anyhow::Result<DatabaseConnection> {
    Database::connect(&config.database_url)
        .await
        .context("failed to connect to the database")
}

async fn serve(db: Arc<DatabaseConnection>, config: Config) -> anyhow::Result<()> {
    Migrator::up(db.as_ref(), None).await.context("migrations failed")?;

    let pipeline = Arc::new(Pipeline::from_config(Arc::clone(&db), &config));
    if pipeline.drive().is_some() {
        pipeline.start_watch()?;
    }
    Scheduler::new(
        Arc::clone(&pipeline),
        config.nightly_ingest_hour,
        config.nightly_sync_hour,
        config.nightly_sync_cap,
    )
    .spawn();

    let addr = config.listen_addr;
    let state = AppState::new(db, config, pipeline);
    let app = create_routes(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server | Listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
