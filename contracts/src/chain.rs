//! # Local Settlement Chain
//!
//! An in-process settlement layer hosting one [`ConfidentialToken`] and one
//! [`Distributor`]. It implements [`SettlementClient`] for clients and
//! [`AclView`] for the decryption gateway, so tests and the devnet node run
//! the full submit → confirm → decrypt flow without any external service.
//!
//! ## Execution model
//!
//! `submit` checks the signature and nonce and queues the transaction.
//! Transactions are executed in submission order, one per block, when a
//! receipt is awaited or [`LocalChain::mine_pending`] is called.
//!
//! Each transaction runs against a copy of the current state (balances,
//! supply and ACL). On success the copy replaces the state; on failure it is
//! dropped and only the sender's nonce advances. Ciphertexts created by a
//! reverted call stay in the coprocessor but nothing references them.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use shroud_protocol::address::Address;
use shroud_protocol::codec::CiphertextHandle;
use shroud_protocol::error::{ErrorKind, NetworkPhase};
use shroud_protocol::fhe::{Acl, AclView, HomomorphicBackend};
use shroud_protocol::settlement::{
    ContractCall, SettlementClient, SettlementError, SignedTransaction, TxHash, TxReceipt,
    TxStatus,
};
use shroud_protocol::Amount;

use crate::confidential_token::{ConfidentialToken, LedgerError, MintPolicy};
use crate::context::CallContext;
use crate::distributor::Distributor;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("contracts are already deployed")]
    AlreadyDeployed,

    #[error("initial funding failed: {0}")]
    Funding(#[from] LedgerError),
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Addresses of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub token: Address,
    pub distributor: Address,
    pub deployer: Address,
}

#[derive(Debug, Clone, Default)]
struct ChainState {
    token: Option<ConfidentialToken>,
    distributor: Option<Distributor>,
    acl: Acl,
    nonces: HashMap<Address, u64>,
}

impl ChainState {
    fn nonce(&self, account: &Address) -> u64 {
        self.nonces.get(account).copied().unwrap_or(0)
    }

    fn bump_nonce(&mut self, account: Address) {
        *self.nonces.entry(account).or_insert(0) += 1;
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: ChainState,
    block_number: u64,
    pending: VecDeque<SignedTransaction>,
    receipts: HashMap<TxHash, TxReceipt>,
    reverted: u64,
}

impl Inner {
    fn pending_from(&self, account: &Address) -> u64 {
        self.pending.iter().filter(|tx| tx.tx.from == *account).count() as u64
    }
}

/// Summary of chain state for status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStatus {
    pub block_number: u64,
    pub pending: usize,
    /// Transactions that executed and reverted since genesis.
    pub reverted: u64,
    pub holders: usize,
    pub acl_entries: usize,
    pub deployment: Option<Deployment>,
}

// ---------------------------------------------------------------------------
// LocalChain
// ---------------------------------------------------------------------------

pub struct LocalChain {
    backend: Arc<dyn HomomorphicBackend>,
    inner: RwLock<Inner>,
    deployment: RwLock<Option<Deployment>>,
    offline: AtomicBool,
}

impl LocalChain {
    pub fn new(backend: Arc<dyn HomomorphicBackend>) -> Self {
        Self {
            backend,
            inner: RwLock::new(Inner::default()),
            deployment: RwLock::new(None),
            offline: AtomicBool::new(false),
        }
    }

    /// Deploys the token, then the distributor bound to it, and optionally
    /// mints `funding` to the distributor. Deployer nonces are consumed in
    /// that order, so addresses are deterministic per deployer.
    pub fn deploy(
        &self,
        deployer: Address,
        mint_policy: MintPolicy,
        funding: Option<Amount>,
    ) -> Result<Deployment, ChainError> {
        let mut deployment = self.deployment.write();
        if deployment.is_some() {
            return Err(ChainError::AlreadyDeployed);
        }

        let mut inner = self.inner.write();
        let mut next = inner.state.clone();

        let token_address = Address::for_contract(&deployer, next.nonce(&deployer));
        next.bump_nonce(deployer);
        let distributor_address = Address::for_contract(&deployer, next.nonce(&deployer));
        next.bump_nonce(deployer);

        let mut token = ConfidentialToken::new(token_address, deployer, mint_policy);
        let distributor = Distributor::new(distributor_address, token_address, deployer);

        if let Some(amount) = funding {
            let block = inner.block_number + 1;
            let mut ctx = CallContext::new(deployer, self.backend.as_ref(), &mut next.acl, block);
            token.mint(&mut ctx, distributor_address, amount)?;
            next.bump_nonce(deployer);
        }

        next.token = Some(token);
        next.distributor = Some(distributor);
        inner.state = next;
        inner.block_number += 1;

        let d = Deployment {
            token: token_address,
            distributor: distributor_address,
            deployer,
        };
        *deployment = Some(d);
        info!(
            token = %token_address,
            distributor = %distributor_address,
            deployer = %deployer,
            ?mint_policy,
            "contracts deployed"
        );
        Ok(d)
    }

    pub fn deployment(&self) -> Option<Deployment> {
        *self.deployment.read()
    }

    pub fn block_number(&self) -> u64 {
        self.inner.read().block_number
    }

    pub fn status(&self) -> ChainStatus {
        // `deploy` takes `deployment` before `inner`; never the reverse.
        let deployment = self.deployment();
        let inner = self.inner.read();
        ChainStatus {
            block_number: inner.block_number,
            pending: inner.pending.len(),
            reverted: inner.reverted,
            holders: inner.state.token.as_ref().map_or(0, |t| t.holder_count()),
            acl_entries: inner.state.acl.len(),
            deployment,
        }
    }

    pub fn receipt(&self, hash: &TxHash) -> Option<TxReceipt> {
        self.inner.read().receipts.get(hash).cloned()
    }

    /// Current supply handle; the zero handle before the first mint.
    pub fn total_supply_handle(&self) -> CiphertextHandle {
        self.inner
            .read()
            .state
            .token
            .as_ref()
            .map_or(CiphertextHandle::ZERO, |t| t.confidential_total_supply())
    }

    /// Simulates an unreachable endpoint.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Executes every queued transaction, one block each, and returns their
    /// receipts in order.
    pub fn mine_pending(&self) -> Vec<TxReceipt> {
        let mut inner = self.inner.write();
        let mut receipts = Vec::with_capacity(inner.pending.len());
        while let Some(tx) = inner.pending.pop_front() {
            receipts.push(self.mine_one(&mut inner, tx));
        }
        receipts
    }

    fn mine_one(&self, inner: &mut Inner, signed: SignedTransaction) -> TxReceipt {
        inner.block_number += 1;
        let block = inner.block_number;
        let hash = signed.hash();
        let from = signed.tx.from;

        let mut next = inner.state.clone();
        let outcome = self.execute(&mut next, &signed, block);

        let (status, revert_reason) = match outcome {
            Ok(()) => {
                next.bump_nonce(from);
                inner.state = next;
                (TxStatus::Success, None)
            }
            Err((kind, reason)) => {
                inner.state.bump_nonce(from);
                inner.reverted += 1;
                (TxStatus::Reverted(kind), Some(reason))
            }
        };

        match &status {
            TxStatus::Success => info!(
                tx = %hash,
                block,
                call = signed.tx.call.name(),
                "transaction executed"
            ),
            TxStatus::Reverted(kind) => warn!(
                tx = %hash,
                block,
                call = signed.tx.call.name(),
                %kind,
                "transaction reverted"
            ),
        }

        let receipt = TxReceipt {
            tx_hash: hash,
            block_number: block,
            status,
            revert_reason,
        };
        inner.receipts.insert(hash, receipt.clone());
        receipt
    }

    fn execute(
        &self,
        state: &mut ChainState,
        signed: &SignedTransaction,
        block: u64,
    ) -> Result<(), (ErrorKind, String)> {
        let ChainState {
            token,
            distributor,
            acl,
            ..
        } = state;
        let token = token
            .as_mut()
            .ok_or_else(|| (ErrorKind::Unauthorized, "no contracts deployed".to_string()))?;
        let tx = &signed.tx;
        let mut ctx = CallContext::new(tx.from, self.backend.as_ref(), acl, block);

        let wrong_target = || {
            (
                ErrorKind::Unauthorized,
                format!("{} has no method {}", tx.target, tx.call.name()),
            )
        };

        match &tx.call {
            ContractCall::Mint { to, amount } => {
                if tx.target != token.address() {
                    return Err(wrong_target());
                }
                token
                    .mint(&mut ctx, *to, *amount)
                    .map(|_| ())
                    .map_err(|e| (e.kind(), e.to_string()))
            }
            ContractCall::ConfidentialTransfer { to, bundle } => {
                if tx.target != token.address() {
                    return Err(wrong_target());
                }
                token
                    .transfer_encrypted_input(&mut ctx, *to, bundle)
                    .map_err(|e| (e.kind(), e.to_string()))
            }
            ContractCall::BatchDistributeEncrypted { recipients, bundle } => {
                let distributor = match distributor {
                    Some(d) if d.address() == tx.target => d,
                    _ => return Err(wrong_target()),
                };
                distributor
                    .batch_distribute_encrypted(&mut ctx, token, recipients, bundle)
                    .map_err(|e| (e.kind(), e.to_string()))
            }
        }
    }

    fn check_online(&self, phase: NetworkPhase) -> Result<(), SettlementError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(SettlementError::Unreachable {
                phase,
                reason: "settlement endpoint offline".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn require_deployment(&self) -> Result<Deployment, SettlementError> {
        self.deployment()
            .ok_or_else(|| SettlementError::Unavailable("contracts not deployed".to_string()))
    }
}

impl std::fmt::Debug for LocalChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalChain")
            .field("block_number", &self.block_number())
            .field("deployment", &self.deployment())
            .finish_non_exhaustive()
    }
}

impl AclView for LocalChain {
    fn is_allowed(&self, handle: &CiphertextHandle, account: &Address) -> bool {
        self.inner.read().state.acl.is_allowed(handle, account)
    }
}

#[async_trait]
impl SettlementClient for LocalChain {
    async fn token_address(&self) -> Result<Address, SettlementError> {
        self.check_online(NetworkPhase::Query)?;
        Ok(self.require_deployment()?.token)
    }

    async fn distributor_address(&self) -> Result<Address, SettlementError> {
        self.check_online(NetworkPhase::Query)?;
        Ok(self.require_deployment()?.distributor)
    }

    async fn confidential_balance_of(
        &self,
        account: Address,
    ) -> Result<CiphertextHandle, SettlementError> {
        self.check_online(NetworkPhase::Query)?;
        self.require_deployment()?;
        let inner = self.inner.read();
        Ok(inner
            .state
            .token
            .as_ref()
            .map_or(CiphertextHandle::ZERO, |t| t.confidential_balance_of(&account)))
    }

    async fn nonce_of(&self, account: Address) -> Result<u64, SettlementError> {
        self.check_online(NetworkPhase::Query)?;
        let inner = self.inner.read();
        Ok(inner.state.nonce(&account) + inner.pending_from(&account))
    }

    async fn submit(&self, tx: SignedTransaction) -> Result<TxHash, SettlementError> {
        self.check_online(NetworkPhase::Submission)?;
        if !tx.verify() {
            return Err(SettlementError::Rejected {
                kind: ErrorKind::Unauthorized,
                reason: format!("bad signature for {}", tx.tx.from),
            });
        }

        let mut inner = self.inner.write();
        let expected = inner.state.nonce(&tx.tx.from) + inner.pending_from(&tx.tx.from);
        if tx.tx.nonce != expected {
            return Err(SettlementError::Rejected {
                kind: ErrorKind::Unauthorized,
                reason: format!("nonce {} does not match expected {}", tx.tx.nonce, expected),
            });
        }

        let hash = tx.hash();
        if inner.receipts.contains_key(&hash) {
            return Err(SettlementError::Rejected {
                kind: ErrorKind::Unauthorized,
                reason: format!("transaction {} already included", hash),
            });
        }
        debug!(tx = %hash, from = %tx.tx.from, call = tx.tx.call.name(), "transaction queued");
        inner.pending.push_back(tx);
        Ok(hash)
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TxReceipt, SettlementError> {
        self.check_online(NetworkPhase::Confirmation)?;
        if let Some(receipt) = self.receipt(&hash) {
            return Ok(receipt);
        }

        let mut inner = self.inner.write();
        let Some(position) = inner.pending.iter().position(|tx| tx.hash() == hash) else {
            return Err(SettlementError::UnknownTransaction(hash));
        };
        let mut found = None;
        for _ in 0..=position {
            if let Some(tx) = inner.pending.pop_front() {
                let receipt = self.mine_one(&mut inner, tx);
                if receipt.tx_hash == hash {
                    found = Some(receipt);
                }
            }
        }
        found.ok_or(SettlementError::UnknownTransaction(hash))
    }
}
