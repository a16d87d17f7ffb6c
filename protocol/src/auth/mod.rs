//! # Authorization Protocol
//!
//! How a balance owner gets a plaintext out of the coprocessor without
//! anyone else being able to. The owner signs a structured request that
//! names a fresh ephemeral key, the contracts it trusts, and a validity
//! window; the oracle checks signature, window and ACL, then seals the value
//! to the ephemeral key.
//!
//! - [`message`]: the typed request and its digest.
//! - [`signer`]: who signs.
//! - [`grant`]: the single-use grant and its wire form.
//! - [`session`]: the per-attempt state machine.

pub mod grant;
pub mod message;
pub mod session;
pub mod signer;

pub use grant::{DecryptionGrant, HandleContractPair, SignedDecryptionRequest};
pub use message::{DecryptionDomain, UserDecryptRequest};
pub use session::{decrypt_handle, DecryptionContext, DecryptionSession, SessionState};
pub use signer::{LocalSigner, Signer, SignerError};
