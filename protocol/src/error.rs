//! Protocol-level error taxonomy.
//!
//! Module errors (`AmountError`, `CodecError`, `OracleError`, ...) stay
//! specific to the module that raises them and convert into
//! [`ProtocolError`] at the boundary. Callers that only need to render a
//! status string use [`ProtocolError::kind`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;
use crate::amount::AmountError;

/// The flat set of failure kinds exposed on the display/CLI surface.
///
/// `Display` yields the status string (`"insufficient-balance"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    LengthMismatch,
    InvalidProof,
    InsufficientBalance,
    Overflow,
    OutOfRange,
    OwnerMismatch,
    AuthorizationFailed,
    GrantExpired,
    Unauthorized,
    NetworkFailure,
}

impl ErrorKind {
    /// Every kind, in taxonomy order.
    pub const ALL: [ErrorKind; 10] = [
        ErrorKind::LengthMismatch,
        ErrorKind::InvalidProof,
        ErrorKind::InsufficientBalance,
        ErrorKind::Overflow,
        ErrorKind::OutOfRange,
        ErrorKind::OwnerMismatch,
        ErrorKind::AuthorizationFailed,
        ErrorKind::GrantExpired,
        ErrorKind::Unauthorized,
        ErrorKind::NetworkFailure,
    ];

    /// The status string for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::LengthMismatch => "length-mismatch",
            ErrorKind::InvalidProof => "invalid-proof",
            ErrorKind::InsufficientBalance => "insufficient-balance",
            ErrorKind::Overflow => "overflow",
            ErrorKind::OutOfRange => "out-of-range",
            ErrorKind::OwnerMismatch => "owner-mismatch",
            ErrorKind::AuthorizationFailed => "authorization-failed",
            ErrorKind::GrantExpired => "grant-expired",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NetworkFailure => "network-failure",
        }
    }

    /// Validation kinds are raised before any state is touched.
    pub fn is_validation(self) -> bool {
        matches!(
            self,
            ErrorKind::LengthMismatch
                | ErrorKind::InvalidProof
                | ErrorKind::OutOfRange
                | ErrorKind::OwnerMismatch
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a network failure happened. Failures while submitting or waiting
/// for confirmation leave the outcome unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkPhase {
    Submission,
    Confirmation,
    Query,
    Encryption,
    Decryption,
}

impl fmt::Display for NetworkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkPhase::Submission => "submission",
            NetworkPhase::Confirmation => "confirmation",
            NetworkPhase::Query => "query",
            NetworkPhase::Encryption => "encryption",
            NetworkPhase::Decryption => "decryption",
        };
        f.write_str(s)
    }
}

/// Every failure a Shroud operation can surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("length mismatch: {recipients} recipients but {handles} ciphertexts")]
    LengthMismatch { recipients: usize, handles: usize },

    #[error("invalid input proof: {0}")]
    InvalidProof(String),

    #[error("insufficient encrypted balance")]
    InsufficientBalance,

    #[error("encrypted arithmetic would overflow the 64-bit domain")]
    Overflow,

    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("signer {actual} does not own the balance of {expected}")]
    OwnerMismatch { expected: Address, actual: Address },

    #[error("decryption authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("decryption grant has expired")]
    GrantExpired,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("network failure during {phase}: {reason}")]
    NetworkFailure { phase: NetworkPhase, reason: String },
}

impl ProtocolError {
    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::LengthMismatch { .. } => ErrorKind::LengthMismatch,
            ProtocolError::InvalidProof(_) => ErrorKind::InvalidProof,
            ProtocolError::InsufficientBalance => ErrorKind::InsufficientBalance,
            ProtocolError::Overflow => ErrorKind::Overflow,
            ProtocolError::OutOfRange(_) => ErrorKind::OutOfRange,
            ProtocolError::OwnerMismatch { .. } => ErrorKind::OwnerMismatch,
            ProtocolError::AuthorizationFailed(_) => ErrorKind::AuthorizationFailed,
            ProtocolError::GrantExpired => ErrorKind::GrantExpired,
            ProtocolError::Unauthorized(_) => ErrorKind::Unauthorized,
            ProtocolError::NetworkFailure { .. } => ErrorKind::NetworkFailure,
        }
    }

    /// `true` when the outcome of a mutation is unknown: the transaction may
    /// or may not have landed, and the caller should re-query state before
    /// retrying.
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            ProtocolError::NetworkFailure {
                phase: NetworkPhase::Submission | NetworkPhase::Confirmation,
                ..
            }
        )
    }

    pub(crate) fn network(phase: NetworkPhase, reason: impl fmt::Display) -> Self {
        ProtocolError::NetworkFailure {
            phase,
            reason: reason.to_string(),
        }
    }
}

impl From<AmountError> for ProtocolError {
    fn from(e: AmountError) -> Self {
        ProtocolError::OutOfRange(e.to_string())
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_kebab_case() {
        assert_eq!(ErrorKind::InsufficientBalance.to_string(), "insufficient-balance");
        assert_eq!(ErrorKind::GrantExpired.to_string(), "grant-expired");
        for kind in ErrorKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn amount_errors_are_out_of_range() {
        let err: ProtocolError = AmountError::Negative.into();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        assert!(err.kind().is_validation());
    }

    #[test]
    fn only_submission_failures_are_ambiguous() {
        assert!(ProtocolError::network(NetworkPhase::Submission, "reset").is_ambiguous());
        assert!(ProtocolError::network(NetworkPhase::Confirmation, "timeout").is_ambiguous());
        assert!(!ProtocolError::network(NetworkPhase::Query, "refused").is_ambiguous());
        assert!(!ProtocolError::network(NetworkPhase::Decryption, "refused").is_ambiguous());
        assert!(!ProtocolError::InsufficientBalance.is_ambiguous());
    }

    #[test]
    fn mutation_failures_are_not_validation() {
        assert!(!ErrorKind::InsufficientBalance.is_validation());
        assert!(!ErrorKind::Overflow.is_validation());
        assert!(ErrorKind::LengthMismatch.is_validation());
    }
}
