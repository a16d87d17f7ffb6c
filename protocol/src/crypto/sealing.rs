//! # Re-encryption Sealing
//!
//! How plaintexts travel from the decryption oracle back to the one client
//! that asked for them.
//!
//! The client generates a fresh X25519 keypair per decryption attempt and
//! puts the public half into its signed request. The oracle answers with
//! its own one-shot X25519 key and every requested value sealed under
//! AES-256-GCM. The symmetric key is BLAKE3's `derive_key` over the DH
//! output and both public keys; each value's handle is bound in as
//! associated data so sealed values cannot be swapped between handles.
//!
//! The client's secret is an `EphemeralSecret`: `open` consumes the
//! keypair, so a keypair can serve exactly one response.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};

use crate::codec::CiphertextHandle;
use crate::crypto::hash::derive_key;

const SEALING_CONTEXT: &str = "shroud 2026-01 user decryption sealing key";
const NONCE_LENGTH: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SealingError {
    #[error("sealing failed")]
    SealFailed,

    #[error("opening failed -- wrong key or tampered response")]
    OpenFailed,

    #[error("sealed plaintext has unexpected length {0}")]
    InvalidPlaintextLength(usize),
}

/// One value sealed to a client key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedValue {
    pub handle: CiphertextHandle,
    pub nonce: [u8; NONCE_LENGTH],
    pub ciphertext: Vec<u8>,
}

/// Everything the oracle sends back for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedResponse {
    /// The oracle's one-shot X25519 public key.
    pub sender_public_key: [u8; 32],
    pub values: Vec<SealedValue>,
}

/// Client-side X25519 keypair for a single decryption attempt.
pub struct EphemeralKeypair {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl EphemeralKeypair {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Opens every value of `response`, consuming the keypair.
    pub fn open(self, response: &SealedResponse) -> Result<Vec<(CiphertextHandle, u64)>, SealingError> {
        let recipient_public = self.public.to_bytes();
        let shared = self
            .secret
            .diffie_hellman(&X25519PublicKey::from(response.sender_public_key));
        let key = session_key(shared.as_bytes(), &response.sender_public_key, &recipient_public);
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| SealingError::OpenFailed)?;

        response
            .values
            .iter()
            .map(|sealed| {
                let plaintext = cipher
                    .decrypt(
                        Nonce::from_slice(&sealed.nonce),
                        Payload {
                            msg: &sealed.ciphertext,
                            aad: sealed.handle.as_bytes(),
                        },
                    )
                    .map_err(|_| SealingError::OpenFailed)?;
                let bytes: [u8; 8] = plaintext
                    .as_slice()
                    .try_into()
                    .map_err(|_| SealingError::InvalidPlaintextLength(plaintext.len()))?;
                Ok((sealed.handle, u64::from_be_bytes(bytes)))
            })
            .collect()
    }
}

impl std::fmt::Debug for EphemeralKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EphemeralKeypair(pub={})", hex::encode(self.public.to_bytes()))
    }
}

/// Oracle side: seals `values` to `recipient_public`.
pub fn seal_values(
    recipient_public: &[u8; 32],
    values: &[(CiphertextHandle, u64)],
) -> Result<SealedResponse, SealingError> {
    let secret = EphemeralSecret::random_from_rng(OsRng);
    let sender_public = X25519PublicKey::from(&secret).to_bytes();
    let shared = secret.diffie_hellman(&X25519PublicKey::from(*recipient_public));
    let key = session_key(shared.as_bytes(), &sender_public, recipient_public);
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| SealingError::SealFailed)?;

    let sealed = values
        .iter()
        .map(|(handle, value)| {
            let mut nonce = [0u8; NONCE_LENGTH];
            OsRng.fill_bytes(&mut nonce);
            let ciphertext = cipher
                .encrypt(
                    Nonce::from_slice(&nonce),
                    Payload {
                        msg: &value.to_be_bytes(),
                        aad: handle.as_bytes(),
                    },
                )
                .map_err(|_| SealingError::SealFailed)?;
            Ok(SealedValue {
                handle: *handle,
                nonce,
                ciphertext,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SealedResponse {
        sender_public_key: sender_public,
        values: sealed,
    })
}

fn session_key(shared: &[u8; 32], sender_public: &[u8; 32], recipient_public: &[u8; 32]) -> [u8; 32] {
    derive_key(SEALING_CONTEXT, &[shared, sender_public, recipient_public])
}
