//! Shared wiring for the integration tests: a funded local chain, a mock
//! gateway reading its ACL, and clients for arbitrary signers.

#![allow(dead_code)]

use std::sync::Arc;

use shroud_contracts::{Deployment, LocalChain, MintPolicy};
use shroud_protocol::address::Address;
use shroud_protocol::auth::message::DecryptionDomain;
use shroud_protocol::auth::signer::{LocalSigner, Signer};
use shroud_protocol::auth::DecryptionContext;
use shroud_protocol::client::DistributorClient;
use shroud_protocol::clock::ManualClock;
use shroud_protocol::codec::CiphertextHandle;
use shroud_protocol::config::{GrantPolicy, CHAIN_ID_LOCAL};
use shroud_protocol::crypto::keys::Keypair;
use shroud_protocol::fhe::mock::{MockCoprocessor, MockGateway};
use shroud_protocol::fhe::OverflowPolicy;
use shroud_protocol::Amount;

pub struct Harness {
    pub coprocessor: Arc<MockCoprocessor>,
    pub chain: Arc<LocalChain>,
    pub gateway: Arc<MockGateway>,
    pub clock: ManualClock,
    pub deployer: Arc<LocalSigner>,
    pub deployment: Deployment,
    pub context: DecryptionContext,
}

pub fn harness(funding: u64, mint_policy: MintPolicy) -> Harness {
    harness_with(funding, mint_policy, OverflowPolicy::Revert)
}

pub fn harness_with(funding: u64, mint_policy: MintPolicy, overflow: OverflowPolicy) -> Harness {
    let coprocessor = Arc::new(MockCoprocessor::with_policy(overflow));
    let chain = Arc::new(LocalChain::new(coprocessor.clone()));
    let deployer = Arc::new(LocalSigner::new(Keypair::from_seed(&[0x11; 32])));
    let deployment = chain
        .deploy(
            deployer.address(),
            mint_policy,
            (funding > 0).then(|| Amount::from_raw(funding)),
        )
        .expect("deploy");

    let clock = ManualClock::default();
    let domain = DecryptionDomain::new(CHAIN_ID_LOCAL, Address::from_bytes([0xdc; 20]));
    let gateway = Arc::new(MockGateway::new(
        coprocessor.clone(),
        chain.clone(),
        Arc::new(clock.clone()),
        domain.clone(),
        GrantPolicy::default(),
    ));
    let context = DecryptionContext::new(domain, GrantPolicy::default());

    Harness {
        coprocessor,
        chain,
        gateway,
        clock,
        deployer,
        deployment,
        context,
    }
}

impl Harness {
    pub fn client(&self, signer: Arc<LocalSigner>) -> DistributorClient {
        DistributorClient::new(
            self.chain.clone(),
            self.gateway.clone(),
            signer,
            Arc::new(self.clock.clone()),
            self.context.clone(),
        )
    }

    pub fn deployer_client(&self) -> DistributorClient {
        self.client(self.deployer.clone())
    }

    /// Plaintext behind a balance handle, straight from the coprocessor.
    pub fn plaintext(&self, handle: CiphertextHandle) -> u64 {
        if handle.is_zero() {
            0
        } else {
            self.coprocessor.plaintext(&handle).expect("known handle")
        }
    }

    pub async fn balance(&self, account: Address) -> u64 {
        use shroud_protocol::settlement::SettlementClient;
        let handle = self
            .chain
            .confidential_balance_of(account)
            .await
            .expect("balance handle");
        self.plaintext(handle)
    }
}

pub fn signer() -> Arc<LocalSigner> {
    Arc::new(LocalSigner::random())
}
