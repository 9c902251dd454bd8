//! Flashcast CLI
//!
//! Serves the trigger surface, runs one-off cycles and inspects the store.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use flashcast_core::{
    create_router, load_seed_file, run_diagnostics, AppState, Config, DeliveryOrchestrator,
    PhaseTwoQueue, SeedOutcome,
};
use flashcast_messaging::{TelegramMessenger, TelegramOptions};
use flashcast_store::{CardStore, SqliteStore};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Flashcast - daily flashcards delivered to a chat
///
/// Draws the next term from a rotating pool, writes its pronunciation,
/// translation and example, illustrates it and posts it to Telegram.
#[derive(Parser, Debug)]
#[command(name = "flashcast")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: flashcast.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP trigger surface until Ctrl+C
    Serve {
        /// Port for the HTTP server (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one full cycle now, both phases inline
    Generate,
    /// Print recent flashcards as JSON
    List {
        /// Maximum number of records
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Populate an empty term pool from the terms file
    Seed,
    /// Exercise each collaborator and print the report
    Diagnose,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    config.apply_process_env();
    // Re-validate after environment overrides
    config.validate()?;

    match args.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Command::Generate => generate(&config).await,
        Command::List { limit } => list(&config, limit),
        Command::Seed => {
            let pipeline = Pipeline::open(&config)?;
            let outcome = bootstrap(&config, &pipeline.orchestrator)?;
            println!("Inserted: {}", outcome.inserted);
            println!("Skipped: {}", outcome.skipped);
            Ok(())
        }
        Command::Diagnose => diagnose(&config).await,
    }
}

/// Loads configuration from the given file or the current directory.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// The store and the orchestrator built on top of it.
struct Pipeline {
    store: Arc<SqliteStore>,
    orchestrator: Arc<DeliveryOrchestrator>,
}

impl Pipeline {
    fn open(config: &Config) -> anyhow::Result<Self> {
        let store = Arc::new(SqliteStore::open(&config.db_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to open database: {e}\n\nPath: {}\n\nSuggestion: Set DB_PATH to a writable location",
                config.db_path
            )
        })?);

        let telegram = &config.telegram;
        let options = TelegramOptions::new(telegram.bot_token.clone(), telegram.chat_id.clone())
            .with_api_base(telegram.api_base.clone())
            .with_timeout(Duration::from_secs(telegram.timeout_secs));
        let messenger = Arc::new(TelegramMessenger::new(options)?);
        if !messenger.is_configured() {
            tracing::warn!("Telegram is not configured; deliveries will fail");
        }

        let orchestrator =
            DeliveryOrchestrator::from_config(config, Arc::clone(&store) as Arc<dyn CardStore>, messenger)?;
        Ok(Self {
            store,
            orchestrator: Arc::new(orchestrator),
        })
    }
}

/// Seeds the pool from the terms file if it is empty.
fn bootstrap(config: &Config, orchestrator: &DeliveryOrchestrator) -> anyhow::Result<SeedOutcome> {
    let seeds = load_seed_file(Path::new(&config.terms_file))?;
    Ok(orchestrator.terms().seed_if_empty(&seeds)?)
}

fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Database: {}", config.db_path);
    println!("  Terms file: {}", config.terms_file);
    println!("  Tier: {}", config.tier);
    println!("  Images directory: {}", config.images_dir);
    println!(
        "  Text model: {} ({})",
        config.text.model,
        if config.text.api_key.is_some() { "configured" } else { "unconfigured" }
    );
    println!(
        "  Image model: {} ({})",
        config.image.model,
        if config.image.api_key.is_some() { "configured" } else { "unconfigured" }
    );
}

async fn serve(config: Config) -> anyhow::Result<()> {
    print_config(&config);

    let pipeline = Pipeline::open(&config)?;
    let seeded = bootstrap(&config, &pipeline.orchestrator)?;
    tracing::info!(inserted = seeded.inserted, "Term pool ready");

    let queue = Arc::new(PhaseTwoQueue::start(Arc::clone(&pipeline.orchestrator)));
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let router = create_router(AppState::new(
        config,
        Arc::clone(&pipeline.orchestrator),
        Arc::clone(&queue),
    ));

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!();
    println!("HTTP server running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down");
            }
        })
        .await?;

    // Let queued phase-two jobs finish before exiting.
    queue.shutdown().await;
    Ok(())
}

async fn generate(config: &Config) -> anyhow::Result<()> {
    let pipeline = Pipeline::open(config)?;
    bootstrap(config, &pipeline.orchestrator)?;

    let report = pipeline.orchestrator.run_cycle_inline().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn list(config: &Config, limit: usize) -> anyhow::Result<()> {
    let store = SqliteStore::open(&config.db_path)?;
    let records = store.list_flashcards(limit)?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

async fn diagnose(config: &Config) -> anyhow::Result<()> {
    let pipeline = Pipeline::open(config)?;
    let orchestrator = &pipeline.orchestrator;
    let report = run_diagnostics(
        config,
        pipeline.store.as_ref(),
        orchestrator.content().generator(),
        orchestrator.messenger(),
    )
    .await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
