// NGSIEM CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: One worker pool per process, built at startup and shut down before exit.
// Design Decision: --simulate swaps the Falcon client for the in-memory service, no credentials needed.

mod commands;
mod output;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ngsiem_core::executor::ClientFactory;
use ngsiem_core::telemetry::{init_telemetry, TelemetryConfig};
use ngsiem_core::{
    FalconClientFactory, NgsiemConfig, RemoteCommand, SearchController, SimulatedClientFactory,
    SimulatedSearchService, ToolDispatcher, WorkerPool, WorkerPoolConfig,
};
use serde_json::json;

#[derive(Parser)]
#[command(name = "ngsiem")]
#[command(about = "NGSIEM CLI - Run and manage log searches")]
#[command(version)]
pub struct Cli {
    /// Repository used when a command does not name one
    #[arg(long, short, global = true, env = "NGSIEM_DEFAULT_REPOSITORY")]
    pub repository: Option<String>,

    /// Output format
    #[arg(
        long,
        short,
        global = true,
        default_value = "text",
        value_parser = ["text", "json", "yaml"]
    )]
    pub output: String,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Worker threads (overrides NGSIEM_THREAD_POOL_SIZE)
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Use an in-memory search service instead of the Falcon API
    #[arg(long, global = true)]
    pub simulate: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a search and wait for its results
    Search {
        /// Query text
        query: String,

        /// Time range start (e.g. 1d, 24h, 2025-01-01T00:00:00Z)
        #[arg(long, default_value = "1d")]
        start: String,

        /// Live search mode
        #[arg(long)]
        live: bool,

        /// Maximum seconds to wait (1-3600)
        #[arg(long, default_value = "300")]
        max_wait: u64,

        /// Seconds between status checks (1-60)
        #[arg(long, default_value = "2")]
        poll_interval: u64,

        /// Maximum events to print in text output
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Skip local query validation
        #[arg(long)]
        no_validate: bool,
    },

    /// Start a search and print its job id
    Start {
        /// Query text
        query: String,

        /// Time range start
        #[arg(long, default_value = "1d")]
        start: String,

        /// Live search mode
        #[arg(long)]
        live: bool,
    },

    /// Check a search job once
    Status {
        /// Search job id
        job_id: String,

        /// Maximum events to print in text output
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Stop a search job
    Stop {
        /// Search job id
        job_id: String,
    },

    /// List field names present in a repository
    Fields {
        /// Seconds to wait for the introspection query (1-120)
        #[arg(long, default_value = "60")]
        timeout: u64,
    },

    /// Validate query syntax without running it
    Validate {
        /// Query text
        query: String,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// List tools, or call one with JSON arguments
    Tools {
        /// Tool name; omit to list tools
        name: Option<String>,

        /// JSON object of tool arguments
        #[arg(long, default_value = "{}")]
        args: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; clap reads the process environment as well
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut telemetry_config = TelemetryConfig::from_env().with_service_name("ngsiem-cli");
    if telemetry_config.log_filter.is_none() {
        let level = if cli.quiet { "error" } else { "warn" };
        telemetry_config = telemetry_config.with_log_filter(level);
    }
    init_telemetry(telemetry_config);

    let output_format = output::OutputFormat::from_str(&cli.output);

    // Validation is local; no pool or credentials needed
    if let Commands::Validate { query, strict } = &cli.command {
        return commands::validate::run(output_format, query, *strict);
    }

    if cli.simulate {
        let service = SimulatedSearchService::new()
            .completing_after(2)
            .with_events(commands::simulated_events())
            .with_call_latency(Duration::from_millis(50));
        let factory = SimulatedClientFactory::new(Arc::new(service));
        let pool_config = pool_config(cli.workers);
        return run(cli, factory, pool_config, output_format).await;
    }

    let config = NgsiemConfig::from_env().context("Failed to load NGSIEM configuration")?;
    tracing::info!(
        base_url = %config.credentials.base_url,
        default_repository = config.default_repository.as_deref().unwrap_or("-"),
        "Loaded configuration"
    );
    let pool_config = pool_config(cli.workers.or(config.thread_pool_size));
    let factory = FalconClientFactory::new(config.credentials.clone(), config.request_timeout);

    let mut cli = cli;
    if cli.repository.is_none() {
        cli.repository = config.default_repository;
    }
    run(cli, factory, pool_config, output_format).await
}

fn pool_config(size: Option<usize>) -> WorkerPoolConfig {
    match size {
        Some(size) => WorkerPoolConfig::new().with_size(size),
        None => WorkerPoolConfig::new(),
    }
}

async fn run<F>(
    cli: Cli,
    factory: F,
    pool_config: WorkerPoolConfig,
    output_format: output::OutputFormat,
) -> Result<()>
where
    F: ClientFactory,
    F::Client: RemoteCommand,
{
    let pool = Arc::new(
        WorkerPool::new(factory, pool_config).context("Failed to start worker pool")?,
    );
    let controller = SearchController::new(Arc::clone(&pool));
    let repository = cli.repository.clone();

    let result = tokio::select! {
        result = dispatch(cli, &controller, repository, output_format) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            eprintln!("Interrupted; any search already started keeps running remotely");
            Ok(())
        }
    };

    pool.shutdown().await;
    result
}

async fn dispatch<F>(
    cli: Cli,
    controller: &SearchController<F>,
    repository: Option<String>,
    output_format: output::OutputFormat,
) -> Result<()>
where
    F: ClientFactory,
    F::Client: RemoteCommand,
{
    let quiet = cli.quiet;
    match cli.command {
        Commands::Search {
            query,
            start,
            live,
            max_wait,
            poll_interval,
            limit,
            no_validate,
        } => {
            let repository = commands::require_repository(repository)?;
            commands::search::search(
                controller,
                output_format,
                quiet,
                commands::search::SearchArgs {
                    repository,
                    query,
                    start,
                    live,
                    max_wait,
                    poll_interval,
                    limit,
                    validate: !no_validate,
                },
            )
            .await
        }
        Commands::Start { query, start, live } => {
            let repository = commands::require_repository(repository)?;
            commands::search::start(controller, output_format, repository, query, start, live).await
        }
        Commands::Status { job_id, limit } => {
            let repository = commands::require_repository(repository)?;
            commands::search::status(controller, output_format, &repository, &job_id, limit).await
        }
        Commands::Stop { job_id } => {
            let repository = commands::require_repository(repository)?;
            commands::search::stop(controller, output_format, &repository, &job_id).await
        }
        Commands::Fields { timeout } => {
            let repository = commands::require_repository(repository)?;
            commands::fields::run(controller, output_format, &repository, timeout).await
        }
        Commands::Tools { name, args } => {
            let dispatcher =
                ToolDispatcher::new(controller.clone()).with_default_repository(repository);
            match name {
                None => commands::tools::list(output_format),
                Some(name) => {
                    let arguments = if args.trim().is_empty() {
                        json!({})
                    } else {
                        serde_json::from_str(&args).context("--args must be a JSON object")?
                    };
                    commands::tools::call(&dispatcher, output_format, &name, arguments).await
                }
            }
        }
        Commands::Validate { query, strict } => {
            commands::validate::run(output_format, &query, strict)
        }
    }
}
