mod config;
mod logging;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use marketd_core::{MarketRecord, MinMax};
use marketd_exchanges::{ExchangeClientFactory, ExchangeClientRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::logging::LogFormat;

const DEFAULT_CONFIG_PATH: &str = "marketd.toml";

#[derive(Parser)]
#[command(name = "marketd")]
#[command(about = "Market metadata service: load exchange markets over gRPC")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "pretty")]
    log_format: LogFormat,

    /// Also append logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Config file (defaults to ./marketd.toml when present)
    #[arg(short, long, global = true, env = "MARKETD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gRPC server
    Serve {
        /// Listen port
        #[arg(short, long, env = "MARKETD_PORT")]
        port: Option<u16>,

        /// Listen host
        #[arg(long)]
        host: Option<String>,

        /// Requests handled concurrently
        #[arg(long)]
        max_workers: Option<usize>,

        /// Bind address for the admin HTTP endpoints (e.g. 127.0.0.1:8080)
        #[arg(long)]
        admin_bind: Option<String>,
    },

    /// Load markets from an exchange directly and print a summary
    Load {
        /// Exchange identifier (e.g. "binance", "bybit")
        exchange: String,

        /// Credentials section from the config file (e.g. "binance_future_testnet")
        #[arg(long)]
        credentials: Option<String>,

        /// Number of sample markets to print
        #[arg(long, default_value = "3")]
        sample: usize,

        /// Write the raw markets as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List supported exchanges
    Exchanges,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level, cli.log_format, cli.log_file.as_deref())?;

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_or_default(Path::new(DEFAULT_CONFIG_PATH))?,
    };

    match cli.command {
        Commands::Serve {
            port,
            host,
            max_workers,
            admin_bind,
        } => {
            let mut server = config.server;
            if let Some(port) = port {
                server.port = port;
            }
            if let Some(host) = host {
                server.host = host;
            }
            if let Some(max_workers) = max_workers {
                server.max_workers = max_workers;
            }
            if admin_bind.is_some() {
                server.admin_bind = admin_bind;
            }

            let registry = Arc::new(ExchangeClientRegistry::new(ExchangeClientFactory::builtin()));
            match marketd_api::start_server(server, registry).await {
                Ok(outcome) => info!(?outcome, "Shutdown complete"),
                Err(err) => {
                    error!("Server error: {err:#}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Load {
            exchange,
            credentials,
            sample,
            output,
        } => {
            load_markets(&config, &exchange, credentials.as_deref(), sample, output).await?;
        }
        Commands::Exchanges => {
            println!("Supported exchanges:");
            for id in ExchangeClientFactory::builtin().exchanges() {
                println!("  {id}");
            }
        }
    }

    Ok(())
}

async fn load_markets(
    config: &AppConfig,
    exchange: &str,
    credentials: Option<&str>,
    sample: usize,
    output: Option<PathBuf>,
) -> Result<()> {
    let registry = ExchangeClientRegistry::new(ExchangeClientFactory::builtin());
    let client = registry.get(exchange)?;

    if let Some(section) = credentials {
        client.apply_overrides(config.overrides(section)?);
        info!(exchange, section, "Applied credentials");
    }
    if !client.supports_market_loading() {
        bail!("Exchange {exchange} does not support market loading");
    }

    info!(exchange, "Loading markets...");
    let markets = client.load_markets().await?;

    let sep = "=".repeat(60);
    println!("\n{sep}");
    println!("  {} MARKETS", exchange.to_uppercase());
    println!("{sep}");
    println!("  Loaded:          {}", markets.len());

    for (symbol, raw) in markets.iter().take(sample) {
        println!("\n  {symbol}");
        match MarketRecord::from_raw(raw) {
            Ok(market) => {
                println!("    ID:            {}", market.id);
                println!("    Base:          {}", market.base);
                println!("    Quote:         {}", market.quote);
                println!("    Active:        {}", market.active);
                println!("    Type:          {}", market.market_type);
                match &market.limits {
                    Some(limits) => {
                        println!("    Amount:        {}", format_range(&limits.amount));
                        println!("    Price:         {}", format_range(&limits.price));
                        println!("    Cost:          {}", format_range(&limits.cost));
                    }
                    None => println!("    Limits:        -"),
                }
            }
            Err(err) => println!("    Unreadable:    {err}"),
        }
    }
    println!("{sep}\n");

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&markets)?;
        std::fs::write(&path, json)?;
        info!(path = %path.display(), "Saved markets");
    }

    Ok(())
}

fn format_range(range: &MinMax) -> String {
    if range.is_empty() {
        return "-".to_string();
    }
    format!("{} .. {}", bound(&range.min), bound(&range.max))
}

fn bound<T: std::fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "*".to_string(),
    }
}
