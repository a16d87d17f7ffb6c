//! # CLI Interface
//!
//! Command-line structure for `shroud-node`, using `clap` derive. Every
//! option has a `SHROUD_*` environment fallback.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use shroud_protocol::config::{DEFAULT_API_PORT, DEFAULT_METRICS_PORT, INITIAL_DISTRIBUTOR_FUNDING};
use shroud_protocol::fhe::OverflowPolicy;

use crate::logging::LogFormat;

/// Shroud devnet node.
///
/// Runs an in-process settlement layer with a confidential token and a
/// batch distributor over a mock coprocessor, and serves faucet,
/// distribution and user-decryption endpoints for the devnet accounts.
#[derive(Parser, Debug)]
#[command(
    name = "shroud-node",
    about = "Shroud confidential distribution devnet node",
    version,
    propagate_version = true
)]
pub struct ShroudNodeCli {
    /// Log output format.
    #[arg(long, global = true, env = "SHROUD_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the devnet node.
    Run(RunArgs),
    /// Print the devnet account addresses.
    Accounts,
    /// Print the token and distributor addresses of a devnet deployment.
    Addresses(DevnetArgs),
    /// Run one batch distribution on a fresh in-process devnet.
    Distribute(DistributeArgs),
    /// Generate a signer key file.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Options shared by every command that boots a devnet.
#[derive(Parser, Debug, Clone)]
pub struct DevnetArgs {
    /// Settlement network preset whose chain id is used for signatures.
    #[arg(long, env = "SHROUD_NETWORK", default_value = "hardhat")]
    pub network: String,

    /// What a mint does past `u64::MAX`: revert, clamp or wrap.
    #[arg(long, env = "SHROUD_OVERFLOW_POLICY", default_value_t = OverflowPolicy::Revert)]
    pub overflow_policy: OverflowPolicy,

    /// Raw units minted to the distributor at deployment.
    #[arg(long, env = "SHROUD_INITIAL_FUNDING", default_value_t = INITIAL_DISTRIBUTOR_FUNDING)]
    pub initial_funding: u64,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub devnet: DevnetArgs,

    /// Interface to bind both listeners to.
    #[arg(long, env = "SHROUD_BIND", default_value = "127.0.0.1")]
    pub bind: String,

    /// Port for the HTTP API.
    #[arg(long, env = "SHROUD_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "SHROUD_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Interval at which queued transactions are mined, in milliseconds.
    #[arg(long, env = "SHROUD_BLOCK_TIME_MS", default_value_t = 1000)]
    pub block_time_ms: u64,
}

#[derive(Parser, Debug)]
pub struct DistributeArgs {
    #[command(flatten)]
    pub devnet: DevnetArgs,

    /// Comma-separated recipient addresses.
    #[arg(long)]
    pub recipients: String,

    /// Comma-separated amounts, one per recipient.
    #[arg(long)]
    pub amounts: String,

    /// Index of the devnet account that sends the transaction.
    #[arg(long, default_value_t = 0)]
    pub account: usize,

    /// Treat amounts as raw `u64` units instead of decimal token amounts.
    #[arg(long)]
    pub raw: bool,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Where to write the hex-encoded secret key.
    #[arg(long, short = 'o', env = "SHROUD_KEY_FILE", default_value = "shroud.key")]
    pub output: PathBuf,

    /// Overwrite an existing key file.
    #[arg(long)]
    pub force: bool,
}
