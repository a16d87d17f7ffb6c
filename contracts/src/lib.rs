//! # Shroud Contracts
//!
//! Settlement-side logic for confidential balances:
//!
//! - **Confidential Token**: a ledger of encrypted `u64` balances with
//!   role-gated minting and guarded transfers that cannot underflow.
//! - **Distributor**: funds many recipients from its own balance in one
//!   all-or-nothing call.
//! - **Local Chain**: an in-process settlement layer that executes signed
//!   transactions against both contracts and exposes their ACL to the
//!   decryption gateway.
//!
//! ## Design Principles
//!
//! 1. Contracts hold handles, never plaintexts. All arithmetic goes through
//!    the `HomomorphicBackend` the call context carries.
//! 2. A transaction's only revealed bit is its aggregate guard. Failing
//!    transfers inside a batch are not individually observable.
//! 3. Failure is total. The chain executes every call on a copy of its state
//!    and keeps the copy only on success.
//! 4. Every new handle is allowed explicitly. Nothing is readable by default.

pub mod chain;
pub mod confidential_token;
pub mod context;
pub mod distributor;

pub use chain::{ChainError, ChainStatus, Deployment, LocalChain};
pub use confidential_token::{ConfidentialToken, LedgerError, MintPolicy};
pub use context::CallContext;
pub use distributor::{Distributor, DistributorError};
