//! # Shroud Core Library
//!
//! Confidential balances with atomic batch distribution. Balances live on a
//! public ledger as opaque ciphertext handles; a custodian can fund many
//! recipients in one all-or-nothing transaction; and an owner can read their
//! own balance through a signed, time-boxed decryption grant.
//!
//! The encrypted arithmetic itself is delegated to a confidential-computation
//! coprocessor. This crate defines the seams to it and everything around
//! them.
//!
//! ## Modules
//!
//! - **amount**: decimal text ⇄ raw `u64` units (six fractional digits).
//! - **codec**: ciphertext handles, input proofs, bundles.
//! - **address**: 20-byte account and contract addresses.
//! - **crypto**: Ed25519 account keys, sealing of decrypted values, hashing.
//! - **fhe**: coprocessor traits, the ACL, and a plain-integer mock.
//! - **auth**: the decryption authorization protocol.
//! - **settlement**: signed transactions and the settlement client trait.
//! - **client**: the display/CLI surface built on all of the above.
//! - **config**, **clock**, **error**: constants, time, and the error taxonomy.

pub mod address;
pub mod amount;
pub mod auth;
pub mod client;
pub mod clock;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fhe;
pub mod settlement;

pub use address::Address;
pub use amount::{format_amount, parse_amount, sanitize_input, Amount, AmountError};
pub use codec::{CiphertextBundle, CiphertextHandle, InputProof};
pub use error::{ErrorKind, ProtocolError};
