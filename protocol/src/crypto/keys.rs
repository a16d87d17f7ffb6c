//! # Account Keys
//!
//! Ed25519 keypairs for Shroud accounts.
//!
//! An account's address is derived from its verifying key (see
//! [`Address::from_public_key`]), so anything holding a keypair can both
//! sign transactions and prove it owns a balance when requesting a
//! decryption.
//!
//! Secret key bytes are never logged and never serialized implicitly. Use
//! [`Keypair::secret_key_bytes`] when writing a key file.

use std::fmt;

use ed25519_dalek::{
    Signature as DalekSignature, Signer as _, SigningKey, Verifier, VerifyingKey,
    SECRET_KEY_LENGTH,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,
}

/// An Ed25519 account keypair.
///
/// Deliberately not `Serialize`: persisting secret material should be an
/// explicit call to [`Keypair::secret_key_bytes`].
pub struct Keypair {
    signing_key: SigningKey,
}

/// The public half of an account key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    bytes: [u8; 32],
}

/// A 64-byte Ed25519 signature.
///
/// Stored as `Vec<u8>` so it serializes with serde out of the box. A value
/// of the wrong length simply fails verification.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    bytes: Vec<u8>,
}

impl Keypair {
    /// Fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed. Devnet accounts use this.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Loads a keypair from a hex-encoded secret key, with or without `0x`.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim().trim_start_matches("0x"))
            .map_err(|_| KeyError::InvalidSecretKey)?;
        let arr: [u8; SECRET_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&arr))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// The account address controlled by this key.
    pub fn address(&self) -> Address {
        self.public_key().address()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.public_key().verify(message, signature)
    }

    /// Raw secret key. Handle with care.
    pub fn secret_key_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.signing_key.to_bytes()
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Public half only.
        write!(f, "Keypair(address={})", self.address())
    }
}

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

impl PublicKey {
    /// Validates that `bytes` is a usable Ed25519 point.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, KeyError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.bytes)
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Some(sig) = signature.to_dalek() else {
            return false;
        };
        verifying_key.verify(message, &sig).is_ok()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

impl Signature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn to_dalek(&self) -> Option<DalekSignature> {
        let arr: [u8; 64] = self.bytes.as_slice().try_into().ok()?;
        Some(DalekSignature::from_bytes(&arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "Signature({}…)", &hex[..hex.len().min(16)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let kp = Keypair::generate();
        let sig = kp.sign(b"batch 7");
        assert!(kp.verify(b"batch 7", &sig));
        assert!(!kp.verify(b"batch 8", &sig));
    }

    #[test]
    fn other_key_does_not_verify() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        let sig = a.sign(b"hello");
        assert!(!b.public_key().verify(b"hello", &sig));
    }

    #[test]
    fn seeded_keys_are_deterministic() {
        let seed = [0x42u8; 32];
        assert_eq!(
            Keypair::from_seed(&seed).address(),
            Keypair::from_seed(&seed).address()
        );
    }

    #[test]
    fn hex_secret_round_trip() {
        let kp = Keypair::generate();
        let hex_key = format!("0x{}", hex::encode(kp.secret_key_bytes()));
        let loaded = Keypair::from_hex(&hex_key).unwrap();
        assert_eq!(loaded.public_key(), kp.public_key());
        assert!(Keypair::from_hex("0x1234").is_err());
    }

    #[test]
    fn truncated_signature_fails_cleanly() {
        let kp = Keypair::generate();
        let sig = Signature {
            bytes: vec![0u8; 10],
        };
        assert!(!kp.verify(b"x", &sig));
    }

    #[test]
    fn debug_never_prints_secret() {
        let kp = Keypair::from_seed(&[0x11; 32]);
        let dbg = format!("{:?}", kp);
        assert!(!dbg.contains(&hex::encode(kp.secret_key_bytes())));
        assert!(dbg.contains(&kp.address().to_hex()));
    }
}
