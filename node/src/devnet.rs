//! # Devnet
//!
//! Wires a complete in-process deployment: the mock coprocessor, the local
//! chain, the decryption gateway reading the chain's ACL, and the nine
//! deterministic devnet accounts. Account 0 deploys the contracts and funds
//! the distributor.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use shroud_contracts::{Deployment, LocalChain, MintPolicy};
use shroud_protocol::address::Address;
use shroud_protocol::auth::{DecryptionContext, DecryptionDomain, LocalSigner, Signer};
use shroud_protocol::client::DistributorClient;
use shroud_protocol::clock::{Clock, SystemClock};
use shroud_protocol::config::{devnet_seed, GrantPolicy, NetworkConfig, DEVNET_ACCOUNT_COUNT};
use shroud_protocol::crypto::keys::Keypair;
use shroud_protocol::fhe::mock::{MockCoprocessor, MockGateway};
use shroud_protocol::fhe::OverflowPolicy;
use shroud_protocol::Amount;

use crate::cli::DevnetArgs;

#[derive(Debug, Clone)]
pub struct DevnetConfig {
    pub network: NetworkConfig,
    pub overflow_policy: OverflowPolicy,
    pub mint_policy: MintPolicy,
    /// Raw units minted to the distributor at deployment; 0 skips funding.
    pub initial_funding: u64,
    pub grant_policy: GrantPolicy,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::hardhat(),
            overflow_policy: OverflowPolicy::Revert,
            // Any devnet account may use the faucet.
            mint_policy: MintPolicy::Open,
            initial_funding: shroud_protocol::config::INITIAL_DISTRIBUTOR_FUNDING,
            grant_policy: GrantPolicy::default(),
        }
    }
}

impl TryFrom<&DevnetArgs> for DevnetConfig {
    type Error = anyhow::Error;

    fn try_from(args: &DevnetArgs) -> Result<Self> {
        let network = NetworkConfig::by_name(&args.network)
            .ok_or_else(|| anyhow!("unknown network preset: {}", args.network))?;
        Ok(Self {
            network,
            overflow_policy: args.overflow_policy,
            initial_funding: args.initial_funding,
            ..Self::default()
        })
    }
}

/// The nine devnet signers, in index order.
pub fn devnet_accounts() -> Vec<Arc<LocalSigner>> {
    (0..DEVNET_ACCOUNT_COUNT)
        .filter_map(devnet_seed)
        .map(|seed| Arc::new(LocalSigner::new(Keypair::from_seed(&seed))))
        .collect()
}

/// Address the decryption gateway signs requests against.
pub fn oracle_address() -> Address {
    Address::for_contract(&Address::ZERO, 0)
}

pub struct Devnet {
    pub config: DevnetConfig,
    pub coprocessor: Arc<MockCoprocessor>,
    pub chain: Arc<LocalChain>,
    pub gateway: Arc<MockGateway>,
    pub clock: Arc<dyn Clock>,
    pub context: DecryptionContext,
    pub accounts: Vec<Arc<LocalSigner>>,
    pub deployment: Deployment,
}

impl Devnet {
    pub fn start(config: DevnetConfig) -> Result<Self> {
        let coprocessor = Arc::new(MockCoprocessor::with_policy(config.overflow_policy));
        let chain = Arc::new(LocalChain::new(coprocessor.clone()));
        let accounts = devnet_accounts();
        let deployer = accounts
            .first()
            .ok_or_else(|| anyhow!("no devnet accounts configured"))?
            .address();

        let funding = (config.initial_funding > 0).then(|| Amount::from_raw(config.initial_funding));
        let deployment = chain
            .deploy(deployer, config.mint_policy, funding)
            .context("failed to deploy devnet contracts")?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let domain = DecryptionDomain::new(config.network.chain_id, oracle_address());
        let gateway = Arc::new(MockGateway::new(
            coprocessor.clone(),
            chain.clone(),
            clock.clone(),
            domain.clone(),
            config.grant_policy,
        ));
        let context = DecryptionContext::new(domain, config.grant_policy);

        info!(
            network = %config.network.name,
            chain_id = config.network.chain_id,
            token = %deployment.token,
            distributor = %deployment.distributor,
            overflow_policy = %config.overflow_policy,
            "devnet ready"
        );

        Ok(Self {
            config,
            coprocessor,
            chain,
            gateway,
            clock,
            context,
            accounts,
            deployment,
        })
    }

    pub fn account(&self, index: usize) -> Option<Arc<LocalSigner>> {
        self.accounts.get(index).cloned()
    }

    pub fn account_by_address(&self, address: &Address) -> Option<Arc<LocalSigner>> {
        self.accounts
            .iter()
            .find(|a| a.address() == *address)
            .cloned()
    }

    /// A client acting as `signer`.
    pub fn client(&self, signer: Arc<LocalSigner>) -> DistributorClient {
        DistributorClient::new(
            self.chain.clone(),
            self.gateway.clone(),
            signer,
            self.clock.clone(),
            self.context.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_protocol::settlement::SettlementClient;

    #[test]
    fn accounts_are_deterministic() {
        let a = devnet_accounts();
        let b = devnet_accounts();
        assert_eq!(a.len(), 9);
        assert_eq!(
            a.iter().map(|s| s.address()).collect::<Vec<_>>(),
            b.iter().map(|s| s.address()).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn devnet_funds_the_distributor() {
        let devnet = Devnet::start(DevnetConfig::default()).unwrap();
        let handle = devnet
            .chain
            .confidential_balance_of(devnet.deployment.distributor)
            .await
            .unwrap();
        assert_eq!(devnet.coprocessor.plaintext(&handle), Some(1_000_000));
        assert_eq!(devnet.deployment.deployer, devnet.accounts[0].address());
    }

    #[test]
    fn unknown_network_is_rejected() {
        let args = DevnetArgs {
            network: "mainnet".into(),
            overflow_policy: OverflowPolicy::Revert,
            initial_funding: 0,
        };
        assert!(DevnetConfig::try_from(&args).is_err());
    }
}
