//! DeFi Intent Gateway CLI
//!
//! Runs the JSON-RPC gateway, or dispatches single requests in-process.

use clap::{Parser, Subcommand};
use defi_intent_gateway::gateway::{self, resolve_tx_reference};
use defi_intent_gateway::wallet::EnvKeyring;
use defi_intent_gateway::{Config, Error, Result, RpcConfig, Services};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "defi-gateway")]
#[command(about = "JSON-RPC gateway for chain-agnostic DeFi intents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP gateway
    Serve {
        /// Override the listen host
        #[arg(long)]
        host: Option<String>,

        /// Override the listen port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Dispatch one JSON-RPC request in-process
    Call {
        /// Method name, e.g. defi.portfolio
        method: String,

        /// Params as a JSON object
        #[arg(short, long)]
        params: Option<String>,
    },

    /// Poll a transaction once
    Status {
        /// Transaction hash (EVM) or signature (Solana)
        tx_hash: String,

        /// Chain (ethereum, polygon, solana); inferred when omitted
        #[arg(long)]
        chain: Option<String>,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let services = build_services(&config)?;
            gateway::serve(Arc::new(services.gateway()), &config.server).await?;
        }
        Commands::Call { method, params } => {
            let params: Value = match params {
                Some(raw) => serde_json::from_str(&raw)
                    .map_err(|e| Error::invalid(format!("--params is not JSON: {}", e)))?,
                None => json!({}),
            };
            let services = build_services(&config)?;
            let request = json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1,
            });
            let response = services.gateway().handle_value(request).await;
            services.dispatcher.flush_results().await;
            print_json(&response)?;
        }
        Commands::Status { tx_hash, chain } => {
            let (chain, reference) = resolve_tx_reference(&tx_hash, chain.as_deref())?;
            let services = build_services(&config)?;
            let status = services
                .dispatcher
                .transaction_status(chain, &reference)
                .await?;
            print_json(&status)?;
        }
        Commands::Config => {
            print_json(&config)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(json_logs.then(|| fmt::layer().json()))
        .with((!json_logs).then(|| fmt::layer()))
        .with(filter)
        .init();
}

fn build_services(config: &Config) -> Result<Services> {
    let keyring = EnvKeyring::from_env();
    if keyring.is_empty() {
        tracing::warn!("No signing keys loaded - intents will fail with SigningUnavailable");
    } else {
        tracing::info!(addresses = ?keyring.addresses(), "Loaded signing keys");
    }
    Services::from_config(config, &RpcConfig::from_env(), Arc::new(keyring))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Config(format!("failed to render output: {}", e)))?;
    println!("{}", text);
    Ok(())
}
