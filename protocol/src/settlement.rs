//! # Settlement Layer Interface
//!
//! The contract surface Shroud consumes: reading balance handles and
//! addresses, and submitting signed transactions that mint, transfer or
//! distribute.
//!
//! Every mutation has two phases:
//!
//! 1. **Submitted**: [`SettlementClient::submit`] accepted the signed
//!    transaction and returned its hash. Nothing has executed yet.
//! 2. **Confirmed**: [`SettlementClient::wait_for_receipt`] returned a
//!    receipt. Only now is the outcome, success or revert, durable.
//!
//! A network failure in either phase leaves the outcome unknown; callers
//! must re-query state before retrying.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::address::Address;
use crate::amount::Amount;
use crate::auth::signer::Signer;
use crate::codec::{CiphertextBundle, CiphertextHandle};
use crate::crypto::hash::blake3_hash;
use crate::crypto::keys::{PublicKey, Signature};
use crate::error::{ErrorKind, NetworkPhase, ProtocolError};

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Transaction hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl FromStr for TxHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s.trim().trim_start_matches("0x"), &mut out)?;
        Ok(Self(out))
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Self)
        }
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", &self.to_hex()[..18])
    }
}

/// A call into one of the deployed contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractCall {
    /// `token.mint(to, amount)`.
    Mint { to: Address, amount: Amount },
    /// `token.transferEncrypted(to, amount)` with a one-handle bundle.
    ConfidentialTransfer {
        to: Address,
        bundle: CiphertextBundle,
    },
    /// `distributor.batchDistributeEncrypted(recipients, handles, proof)`.
    BatchDistributeEncrypted {
        recipients: Vec<Address>,
        bundle: CiphertextBundle,
    },
}

impl ContractCall {
    pub fn name(&self) -> &'static str {
        match self {
            ContractCall::Mint { .. } => "mint",
            ContractCall::ConfidentialTransfer { .. } => "transferEncrypted",
            ContractCall::BatchDistributeEncrypted { .. } => "batchDistributeEncrypted",
        }
    }
}

/// Everything the sender signs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: Address,
    pub nonce: u64,
    /// Contract the call is addressed to.
    pub target: Address,
    pub call: ContractCall,
}

impl Transaction {
    /// Canonical bytes: the bincode encoding of the transaction.
    pub fn signable_bytes(&self) -> Vec<u8> {
        // Serializing plain data into a Vec cannot fail.
        bincode::serialize(self).unwrap_or_default()
    }

    pub fn hash(&self) -> TxHash {
        TxHash(blake3_hash(&self.signable_bytes()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: Transaction,
    pub public_key: PublicKey,
    pub signature: Signature,
}

impl SignedTransaction {
    pub fn hash(&self) -> TxHash {
        self.tx.hash()
    }

    /// The key belongs to `from` and signed this exact transaction.
    pub fn verify(&self) -> bool {
        self.public_key.address() == self.tx.from
            && self.public_key.verify(&self.tx.hash().0, &self.signature)
    }
}

/// Signs `tx` with `signer`. The signature covers the transaction hash.
pub async fn sign_transaction(
    tx: Transaction,
    signer: &dyn Signer,
) -> Result<SignedTransaction, ProtocolError> {
    if signer.address() != tx.from {
        return Err(ProtocolError::Unauthorized(format!(
            "signer {} cannot sign for {}",
            signer.address(),
            tx.from
        )));
    }
    let signature = signer.sign_digest(&tx.hash().0).await?;
    Ok(SignedTransaction {
        tx,
        public_key: signer.public_key(),
        signature,
    })
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum TxStatus {
    Success,
    Reverted(ErrorKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub status: TxStatus,
    /// Human-readable revert reason, if any.
    pub revert_reason: Option<String>,
}

impl TxReceipt {
    pub fn is_success(&self) -> bool {
        self.status == TxStatus::Success
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    /// The endpoint refused the transaction outright. Nothing was queued.
    #[error("transaction rejected ({kind}): {reason}")]
    Rejected { kind: ErrorKind, reason: String },

    #[error("unknown transaction {0}")]
    UnknownTransaction(TxHash),

    /// The requested contract or state is not available yet.
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("settlement endpoint unreachable during {phase}: {reason}")]
    Unreachable { phase: NetworkPhase, reason: String },
}

impl From<SettlementError> for ProtocolError {
    fn from(e: SettlementError) -> Self {
        match e {
            SettlementError::Rejected { kind, reason } => match kind {
                ErrorKind::OutOfRange => ProtocolError::OutOfRange(reason),
                ErrorKind::InvalidProof => ProtocolError::InvalidProof(reason),
                _ => ProtocolError::Unauthorized(reason),
            },
            SettlementError::UnknownTransaction(hash) => ProtocolError::network(
                NetworkPhase::Confirmation,
                format!("transaction {} is not known to the endpoint", hash),
            ),
            SettlementError::Unavailable(reason) => {
                ProtocolError::network(NetworkPhase::Query, reason)
            }
            SettlementError::Unreachable { phase, reason } => ProtocolError::network(phase, reason),
        }
    }
}

/// The settlement layer as seen from a client.
#[async_trait]
pub trait SettlementClient: Send + Sync {
    async fn token_address(&self) -> Result<Address, SettlementError>;

    async fn distributor_address(&self) -> Result<Address, SettlementError>;

    /// Current balance handle of `account`; the zero handle if it never held
    /// a balance.
    async fn confidential_balance_of(
        &self,
        account: Address,
    ) -> Result<CiphertextHandle, SettlementError>;

    /// Next nonce `account` must use.
    async fn nonce_of(&self, account: Address) -> Result<u64, SettlementError>;

    /// Phase one: queue a signed transaction.
    async fn submit(&self, tx: SignedTransaction) -> Result<TxHash, SettlementError>;

    /// Phase two: wait until `hash` is included and return its receipt.
    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TxReceipt, SettlementError>;
}
