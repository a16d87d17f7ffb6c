//! # Cryptographic Primitives
//!
//! Everything key- or hash-shaped that Shroud does itself. The homomorphic
//! side is not here: encrypted arithmetic, input proofs and threshold
//! decryption belong to the coprocessor behind the [`crate::fhe`] traits.
//!
//! - **Ed25519** account keys sign transactions and decryption requests.
//! - **X25519 + AES-256-GCM** seal decrypted values to a one-shot client key.
//! - **BLAKE3** for internal digests and key derivation, **SHA-256** for the
//!   structured request digest.

pub mod hash;
pub mod keys;
pub mod sealing;

pub use hash::{blake3_hash, derive_key, keyed_mac, sha256, sha256_concat};
pub use keys::{KeyError, Keypair, PublicKey, Signature};
pub use sealing::{seal_values, EphemeralKeypair, SealedResponse, SealedValue, SealingError};
