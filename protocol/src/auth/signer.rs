//! Signing backends.
//!
//! A [`Signer`] is whatever holds an account key: an in-process keypair
//! for the devnet and tests, or a remote wallet. Signing is async because
//! the latter involves a round trip and possibly a human.

use async_trait::async_trait;
use thiserror::Error;

use crate::address::Address;
use crate::crypto::keys::{Keypair, PublicKey, Signature};
use crate::error::ProtocolError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("signature request rejected: {0}")]
    Rejected(String),

    #[error("signer unavailable: {0}")]
    Unavailable(String),
}

impl From<SignerError> for ProtocolError {
    fn from(e: SignerError) -> Self {
        ProtocolError::AuthorizationFailed(e.to_string())
    }
}

#[async_trait]
pub trait Signer: Send + Sync {
    /// The account this signer controls.
    fn address(&self) -> Address;

    fn public_key(&self) -> PublicKey;

    /// Signs a 32-byte digest (a typed-message digest or a transaction hash).
    async fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, SignerError>;
}

/// An in-process Ed25519 signer.
#[derive(Debug, Clone)]
pub struct LocalSigner {
    keypair: Keypair,
}

impl LocalSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn random() -> Self {
        Self::new(Keypair::generate())
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

#[async_trait]
impl Signer for LocalSigner {
    fn address(&self) -> Address {
        self.keypair.address()
    }

    fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    async fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, SignerError> {
        Ok(self.keypair.sign(digest))
    }
}
