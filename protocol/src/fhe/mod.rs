//! # Coprocessor Interfaces
//!
//! Shroud never does homomorphic math itself. Everything that touches an
//! encrypted value goes through one of two seams:
//!
//! - [`HomomorphicBackend`]: the symbolic, synchronous operations a
//!   contract performs while a transaction executes (`add`, `sub`, `le`,
//!   `select`, input verification). Contracts hold handles, the backend
//!   holds the ciphertexts.
//! - [`EncryptionService`]: the asynchronous client-facing side:
//!   encrypting a batch of plaintexts for a (contract, submitter) pair, and
//!   decrypting handles for a user who signed a grant.
//!
//! [`mock`] implements both with plain integers for local development and
//! tests. A production deployment plugs a real coprocessor in behind the
//! same traits.
//!
//! ## Overflow semantics
//!
//! Encrypted `add` and `sub` wrap modulo 2^64, like the underlying
//! integer type. Whether a *mint* that would exceed the 64-bit domain is
//! reverted, clamped or allowed to wrap is the backend's
//! [`OverflowPolicy`]; the ledger asks for it and builds the matching
//! encrypted guard. Transfers never need it: a debit is guarded by an
//! encrypted `le` and applied through `select`, so it cannot underflow.

pub mod acl;
pub mod mock;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;
use crate::auth::grant::SignedDecryptionRequest;
use crate::codec::{CiphertextBundle, CiphertextHandle, FheType};
use crate::crypto::sealing::SealedResponse;
use crate::error::{NetworkPhase, ProtocolError};

pub use acl::{Acl, AclView};

// ---------------------------------------------------------------------------
// Typed handles
// ---------------------------------------------------------------------------

/// Handle of an encrypted unsigned 64-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Euint64(CiphertextHandle);

/// Handle of an encrypted boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ebool(CiphertextHandle);

impl Euint64 {
    /// Trusts the caller that `handle` refers to a `u64`. Backends verify.
    pub fn from_handle(handle: CiphertextHandle) -> Self {
        Self(handle)
    }

    pub fn handle(&self) -> CiphertextHandle {
        self.0
    }
}

impl Ebool {
    pub fn from_handle(handle: CiphertextHandle) -> Self {
        Self(handle)
    }

    pub fn handle(&self) -> CiphertextHandle {
        self.0
    }
}

impl From<Euint64> for CiphertextHandle {
    fn from(v: Euint64) -> Self {
        v.0
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// What a mint does when the new balance or supply would exceed `u64::MAX`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Revert the whole mint with `Overflow`.
    #[default]
    Revert,
    /// Mint only the remaining headroom.
    Clamp,
    /// Let the encrypted sum wrap modulo 2^64.
    Wrap,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverflowPolicy::Revert => "revert",
            OverflowPolicy::Clamp => "clamp",
            OverflowPolicy::Wrap => "wrap",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "revert" => Ok(OverflowPolicy::Revert),
            "clamp" => Ok(OverflowPolicy::Clamp),
            "wrap" => Ok(OverflowPolicy::Wrap),
            other => Err(format!("unknown overflow policy: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures of the homomorphic backend and of batch encryption.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoprocessorError {
    #[error("unknown ciphertext handle {0}")]
    UnknownHandle(CiphertextHandle),

    #[error("handle {handle} is not a {expected:?}")]
    TypeMismatch {
        handle: CiphertextHandle,
        expected: FheType,
    },

    #[error("input proof rejected: {0}")]
    InvalidProof(String),

    #[error("coprocessor unreachable: {0}")]
    Unreachable(String),
}

impl From<CoprocessorError> for ProtocolError {
    fn from(e: CoprocessorError) -> Self {
        match e {
            CoprocessorError::Unreachable(reason) => {
                ProtocolError::network(NetworkPhase::Encryption, reason)
            }
            other => ProtocolError::InvalidProof(other.to_string()),
        }
    }
}

/// Failures reported by the decryption side of the coprocessor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// Bad signature, wrong signer, or an ACL that does not cover the
    /// requester. Retrying with the same grant will not help.
    #[error("decryption not authorized: {0}")]
    Unauthorized(String),

    #[error("decryption grant has expired")]
    Expired,

    #[error("malformed decryption request: {0}")]
    InvalidRequest(String),

    #[error("decryption oracle unreachable: {0}")]
    Unreachable(String),
}

impl From<OracleError> for ProtocolError {
    fn from(e: OracleError) -> Self {
        match e {
            OracleError::Unauthorized(reason) | OracleError::InvalidRequest(reason) => {
                ProtocolError::AuthorizationFailed(reason)
            }
            OracleError::Expired => ProtocolError::GrantExpired,
            OracleError::Unreachable(reason) => {
                ProtocolError::network(NetworkPhase::Decryption, reason)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Symbolic encrypted operations available to contracts during execution.
///
/// Every operation returns a fresh handle; inputs are never mutated.
pub trait HomomorphicBackend: Send + Sync {
    /// Encrypts a public constant.
    fn trivial_encrypt(&self, value: u64) -> Result<Euint64, CoprocessorError>;

    /// Encrypts a public boolean.
    fn trivial_bool(&self, value: bool) -> Result<Ebool, CoprocessorError>;

    /// `a + b`, wrapping.
    fn add(&self, a: Euint64, b: Euint64) -> Result<Euint64, CoprocessorError>;

    /// `a - b`, wrapping.
    fn sub(&self, a: Euint64, b: Euint64) -> Result<Euint64, CoprocessorError>;

    /// `a <= b`.
    fn le(&self, a: Euint64, b: Euint64) -> Result<Ebool, CoprocessorError>;

    /// `a && b`.
    fn and(&self, a: Ebool, b: Ebool) -> Result<Ebool, CoprocessorError>;

    /// `cond ? if_true : if_false`, evaluated without revealing `cond`.
    fn select(
        &self,
        cond: Ebool,
        if_true: Euint64,
        if_false: Euint64,
    ) -> Result<Euint64, CoprocessorError>;

    /// Publicly decrypts the aggregate guard of a transaction. This is the
    /// only plaintext a contract ever learns: whether execution may commit.
    fn reveal_guard(&self, guard: Ebool) -> Result<bool, CoprocessorError>;

    /// Checks that `bundle` was produced for exactly this `(contract,
    /// submitter)` pair and returns its handles typed as `u64`.
    fn verify_input(
        &self,
        bundle: &CiphertextBundle,
        contract: &Address,
        submitter: &Address,
    ) -> Result<Vec<Euint64>, CoprocessorError>;

    /// How mints treat values beyond `u64::MAX`.
    fn overflow_policy(&self) -> OverflowPolicy;
}

/// The client-facing coprocessor endpoints. One round trip per call.
#[async_trait]
pub trait EncryptionService: Send + Sync {
    /// Encrypts `values` for use by `contract` in a transaction sent by
    /// `submitter`. The proof is only valid for that pair.
    async fn encrypt_batch(
        &self,
        contract: Address,
        submitter: Address,
        values: &[u64],
    ) -> Result<CiphertextBundle, CoprocessorError>;

    /// Decrypts the requested handles for the user who signed the grant,
    /// sealing every value to the grant's ephemeral public key.
    async fn decrypt_batch(
        &self,
        request: &SignedDecryptionRequest,
    ) -> Result<SealedResponse, OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn oracle_errors_map_to_taxonomy() {
        let e: ProtocolError = OracleError::Unauthorized("bad sig".into()).into();
        assert_eq!(e.kind(), ErrorKind::AuthorizationFailed);
        let e: ProtocolError = OracleError::Expired.into();
        assert_eq!(e.kind(), ErrorKind::GrantExpired);
        let e: ProtocolError = OracleError::Unreachable("down".into()).into();
        assert_eq!(e.kind(), ErrorKind::NetworkFailure);
        assert!(!e.is_ambiguous());
    }

    #[test]
    fn overflow_policy_parses() {
        assert_eq!("Clamp".parse::<OverflowPolicy>(), Ok(OverflowPolicy::Clamp));
        assert_eq!(OverflowPolicy::default(), OverflowPolicy::Revert);
        assert!("saturate".parse::<OverflowPolicy>().is_err());
    }
}
