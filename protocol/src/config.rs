//! # Protocol Configuration & Constants
//!
//! Every magic number in Shroud lives here: token precision, handle layout,
//! decryption window policy, batch limits, and the network presets a client
//! can point at. If you are hardcoding one of these somewhere else, move it
//! here instead.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// Human-readable name of the confidential token.
pub const TOKEN_NAME: &str = "Confidential ETH";

/// Ticker symbol of the confidential token.
pub const TOKEN_SYMBOL: &str = "cETH";

/// Fractional digits used when displaying amounts. The ledger itself only
/// ever sees raw `u64` units; this is presentation.
pub const TOKEN_DECIMALS: u32 = 6;

/// Initial encrypted balance minted to the distributor by the devnet
/// deployment.
pub const INITIAL_DISTRIBUTOR_FUNDING: u64 = 1_000_000;

/// Default faucet request shown to interactive users.
pub const DEFAULT_FAUCET_AMOUNT: &str = "100";

// ---------------------------------------------------------------------------
// Ciphertexts
// ---------------------------------------------------------------------------

/// Length of a ciphertext handle in bytes.
pub const HANDLE_LENGTH: usize = 32;

/// Length of an account or contract address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// Maximum size of an input proof accepted by the settlement layer.
pub const MAX_INPUT_PROOF_LENGTH: usize = 8 * 1024;

/// Maximum number of recipients in a single batch distribution. Keeps the
/// cost of one atomic unit bounded.
pub const MAX_BATCH_SIZE: usize = 256;

// ---------------------------------------------------------------------------
// Decryption grants
// ---------------------------------------------------------------------------

/// Validity window of a user decryption grant in the reference policy.
pub const DEFAULT_GRANT_DURATION_DAYS: u32 = 10;

/// Longest validity window the oracle will honour.
pub const MAX_GRANT_DURATION_DAYS: u32 = 365;

/// Maximum number of contracts a single grant may name.
pub const MAX_GRANT_CONTRACTS: usize = 10;

/// Domain name used in the structured authorization message.
pub const DECRYPTION_DOMAIN_NAME: &str = "Decryption";

/// Domain version used in the structured authorization message.
pub const DECRYPTION_DOMAIN_VERSION: &str = "1";

/// Policy governing the validity window of a decryption grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantPolicy {
    /// Window length requested by clients.
    pub duration_days: u32,
    /// Longest window the oracle accepts.
    pub max_duration_days: u32,
}

impl Default for GrantPolicy {
    fn default() -> Self {
        Self {
            duration_days: DEFAULT_GRANT_DURATION_DAYS,
            max_duration_days: MAX_GRANT_DURATION_DAYS,
        }
    }
}

// ---------------------------------------------------------------------------
// Networks
// ---------------------------------------------------------------------------

/// Chain id of the in-process hardhat network and of a local anvil node.
pub const CHAIN_ID_LOCAL: u64 = 31337;

/// Chain id of the Sepolia test network.
pub const CHAIN_ID_SEPOLIA: u64 = 11155111;

/// Default JSON-RPC endpoint of a local anvil node.
pub const ANVIL_RPC_URL: &str = "http://localhost:8545";

/// Default HTTP API port of the devnet node.
pub const DEFAULT_API_PORT: u16 = 9841;

/// Default Prometheus metrics port of the devnet node.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// Connection parameters for one settlement network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Short name (`hardhat`, `anvil`, `sepolia`).
    pub name: String,
    /// Chain id mixed into every authorization message.
    pub chain_id: u64,
    /// RPC endpoint, if the network is remote.
    pub rpc_url: Option<String>,
}

impl NetworkConfig {
    /// The in-process network used by tests and the devnet node.
    pub fn hardhat() -> Self {
        Self {
            name: "hardhat".to_string(),
            chain_id: CHAIN_ID_LOCAL,
            rpc_url: None,
        }
    }

    /// A local anvil node.
    pub fn anvil() -> Self {
        Self {
            name: "anvil".to_string(),
            chain_id: CHAIN_ID_LOCAL,
            rpc_url: Some(ANVIL_RPC_URL.to_string()),
        }
    }

    /// Sepolia through an Infura project.
    pub fn sepolia(infura_api_key: &str) -> Self {
        Self {
            name: "sepolia".to_string(),
            chain_id: CHAIN_ID_SEPOLIA,
            rpc_url: Some(format!("https://sepolia.infura.io/v3/{}", infura_api_key)),
        }
    }

    /// Looks a preset up by name. Sepolia needs an API key and is therefore
    /// only reachable through [`NetworkConfig::sepolia`].
    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "hardhat" => Some(Self::hardhat()),
            "anvil" => Some(Self::anvil()),
            _ => None,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::hardhat()
    }
}

// ---------------------------------------------------------------------------
// Devnet accounts
// ---------------------------------------------------------------------------

/// Number of pre-funded devnet accounts.
pub const DEVNET_ACCOUNT_COUNT: usize = 9;

/// Deterministic 32-byte seed of devnet account `index` (0-based).
///
/// Seed `i` is `0xN000...000N` with `N = i + 1`, the same shape as the
/// well-known local test keys.
pub fn devnet_seed(index: usize) -> Option<[u8; 32]> {
    if index >= DEVNET_ACCOUNT_COUNT {
        return None;
    }
    let n = (index + 1) as u8;
    let mut seed = [0u8; 32];
    seed[0] = n << 4;
    seed[31] = n;
    Some(seed)
}
