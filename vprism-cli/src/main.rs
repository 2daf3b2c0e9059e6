//! # vprism CLI
//!
//! Thin demo binary over `vprism-core`'s caller-facing surface (§6): `get`,
//! `batch`, and `health`. Not a designed external protocol — a terminal for
//! exercising the core's query routing, resilience, caching and batch
//! fan-out against the bundled `MockProvider` stand-ins.
//!
//! ## Usage
//!
//! ```bash
//! vprism-cli get --asset stock --market cn --symbol 000001 --timeframe 1d
//! vprism-cli batch --asset stock --market us --symbol AAPL --symbol MSFT --timeframe 1d
//! vprism-cli health
//! ```

use clap::{Parser, Subcommand};
use vprism_cli::{build_query, demo_client};
use vprism_core::{CoreConfig, HealthChecker, HealthCheckerConfig};

#[derive(Parser)]
#[command(author, version, about = "Demo CLI over the vprism market-data core", long_about = None)]
struct Cli {
    /// Path to a layered config file (defaults + file + VPRISM_* env).
    #[arg(short, long)]
    config: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch one response for a single query (§6 `get`/`execute`).
    Get {
        #[arg(long, default_value = "stock")]
        asset: String,
        #[arg(long)]
        market: String,
        #[arg(long = "symbol", required = true)]
        symbols: Vec<String>,
        #[arg(long, default_value = "1d")]
        timeframe: String,
        /// ISO-8601 start timestamp.
        #[arg(long)]
        start: Option<String>,
        /// ISO-8601 end timestamp.
        #[arg(long)]
        end: Option<String>,
    },
    /// Fan out one query per symbol through the batch processor (§6 `batch`, §4.8).
    Batch {
        #[arg(long, default_value = "stock")]
        asset: String,
        #[arg(long)]
        market: String,
        #[arg(long = "symbol", required = true)]
        symbols: Vec<String>,
        #[arg(long, default_value = "1d")]
        timeframe: String,
    },
    /// Probe every registered provider once and print resulting health (§4.2).
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_env_filter(&cli.log_level).init();

    let config = CoreConfig::load(cli.config.as_deref())?;
    let health_config = config.health.clone();
    let client = demo_client(config).await?;

    match cli.command {
        Command::Get { asset, market, symbols, timeframe, start, end } => {
            let query = build_query(&asset, &market, &symbols, &timeframe, start.as_deref(), end.as_deref())?;
            let response = client.get(&query).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Batch { asset, market, symbols, timeframe } => {
            let queries: Result<Vec<_>, _> = symbols
                .iter()
                .map(|symbol| build_query(&asset, &market, std::slice::from_ref(symbol), &timeframe, None, None))
                .collect();
            let result = client.batch(queries?).await;

            let serializable: serde_json::Value = serde_json::json!({
                "success_count": result.success_count,
                "failure_count": result.failure_count,
                "total_time_ms": result.total_time.as_millis(),
                "errors": result.errors,
                "results": result.results,
            });
            println!("{}", serde_json::to_string_pretty(&serializable)?);
        }
        Command::Health => {
            let checker = HealthChecker::new(
                client.registry().clone(),
                HealthCheckerConfig {
                    interval: std::time::Duration::from_secs(health_config.interval_seconds),
                    probe_timeout: std::time::Duration::from_secs(health_config.timeout_seconds),
                    failure_threshold: health_config.failure_threshold,
                    success_threshold: health_config.success_threshold,
                },
            );
            checker.probe_all().await;

            for name in client.registry().names().await {
                let health = client.registry().health(&name).await;
                println!("{name}: {health:?}");
            }
        }
    }

    Ok(())
}
