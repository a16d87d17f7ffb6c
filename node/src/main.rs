//! # Shroud Devnet Node
//!
//! Entry point for the `shroud-node` binary. Parses CLI arguments,
//! initializes logging and metrics, boots an in-process devnet and serves
//! the HTTP API.
//!
//! Subcommands:
//!
//! - `run`        start the node with its block loop and HTTP listeners
//! - `accounts`   print the devnet account addresses
//! - `addresses`  print the token and distributor addresses
//! - `distribute` run one batch distribution and print the outcome
//! - `init`       generate a signer key file
//! - `version`    print build version information

mod api;
mod cli;
mod devnet;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use shroud_protocol::auth::Signer;
use shroud_protocol::client::DistributionRow;
use shroud_protocol::crypto::keys::Keypair;
use shroud_protocol::settlement::SettlementClient;
use shroud_protocol::{format_amount, Amount};

use cli::{Commands, ShroudNodeCli};
use devnet::{Devnet, DevnetConfig};
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ShroudNodeCli::parse();
    logging::init_logging(logging::DEFAULT_FILTER, cli.log_format);

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Accounts => {
            print_accounts();
            Ok(())
        }
        Commands::Addresses(args) => print_addresses(&args),
        Commands::Distribute(args) => distribute(args).await,
        Commands::Init(args) => init_key(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the devnet node: API server, metrics endpoint, and block loop.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        block_time_ms = args.block_time_ms,
        network = %args.devnet.network,
        "starting shroud-node"
    );

    let devnet = Arc::new(Devnet::start(DevnetConfig::try_from(&args.devnet)?)?);
    let node_metrics = Arc::new(NodeMetrics::new());
    node_metrics.observe_chain(&devnet.chain.status());

    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        devnet: Arc::clone(&devnet),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.bind, args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("{}:{}", args.bind, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Block loop ---
    // Transactions submitted without waiting for a receipt are mined here.
    let chain = Arc::clone(&devnet.chain);
    let metrics_ref = Arc::clone(&node_metrics);
    let block_time = Duration::from_millis(args.block_time_ms.max(1));
    let block_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(block_time);
        loop {
            interval.tick().await;
            let receipts = chain.mine_pending();
            for receipt in &receipts {
                tracing::debug!(
                    tx = %receipt.tx_hash,
                    block = receipt.block_number,
                    success = receipt.is_success(),
                    "transaction mined"
                );
            }
            metrics_ref.observe_chain(&chain.status());
        }
    });

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    block_loop.abort();
    tracing::info!("shroud-node stopped");
    Ok(())
}

fn print_accounts() {
    for (index, signer) in devnet::devnet_accounts().iter().enumerate() {
        println!("{}  {}", index, signer.address());
    }
}

fn print_addresses(args: &cli::DevnetArgs) -> Result<()> {
    let devnet = Devnet::start(DevnetConfig::try_from(args)?)?;
    println!("Network      : {} ({})", devnet.config.network.name, devnet.config.network.chain_id);
    println!("Deployer     : {}", devnet.deployment.deployer);
    println!("Token        : {}", devnet.deployment.token);
    println!("Distributor  : {}", devnet.deployment.distributor);
    Ok(())
}

/// Pairs comma-separated recipients with comma-separated amounts.
fn parse_rows(recipients: &str, amounts: &str, raw: bool) -> Result<Vec<DistributionRow>> {
    let recipients: Vec<&str> = recipients.split(',').map(str::trim).collect();
    let amounts: Vec<&str> = amounts.split(',').map(str::trim).collect();
    if recipients.len() != amounts.len() {
        bail!(
            "{} recipients but {} amounts",
            recipients.len(),
            amounts.len()
        );
    }

    recipients
        .into_iter()
        .zip(amounts)
        .map(|(address, amount)| {
            let amount = if raw {
                let units: u64 = amount
                    .parse()
                    .with_context(|| format!("invalid raw amount: {}", amount))?;
                format_amount(Amount::from_raw(units))
            } else {
                amount.to_string()
            };
            Ok(DistributionRow::new(address, amount))
        })
        .collect()
}

async fn distribute(args: cli::DistributeArgs) -> Result<()> {
    let rows = parse_rows(&args.recipients, &args.amounts, args.raw)?;
    let devnet = Devnet::start(DevnetConfig::try_from(&args.devnet)?)?;
    let Some(signer) = devnet.account(args.account) else {
        bail!("no devnet account with index {}", args.account);
    };

    let client = devnet.client(signer);
    let action = client.distribute(&rows).await;
    println!("Status       : {}", action.status());
    if !action.is_confirmed() {
        bail!("distribution failed: {}", action.status());
    }

    for row in &rows {
        let address = row.address.parse()?;
        let handle = devnet.chain.confidential_balance_of(address).await?;
        println!("  {}  {}", row.address, handle);
    }
    let remaining = devnet
        .chain
        .confidential_balance_of(devnet.deployment.distributor)
        .await?;
    println!("Distributor  : {}", remaining);
    Ok(())
}

/// Writes a fresh hex-encoded signer key, readable only by its owner.
fn init_key(args: cli::InitArgs) -> Result<()> {
    let path = &args.output;
    if path.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    let keypair = Keypair::generate();
    std::fs::write(path, hex::encode(keypair.secret_key_bytes()))
        .with_context(|| format!("failed to write key to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!(address = %keypair.address(), key_path = %path.display(), "signer key generated");

    println!("Key written  : {}", path.display());
    println!("Address      : {}", keypair.address());
    println!("Public key   : {}", keypair.public_key().to_hex());
    Ok(())
}

fn print_version() {
    println!("shroud-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc       {}", rustc_version());
}

fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
