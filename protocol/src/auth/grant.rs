//! Decryption grants.
//!
//! A [`DecryptionGrant`] is the client-side bundle of one attempt: the
//! ephemeral keypair and the owner's signature over the request that names
//! its public half. It is neither `Clone` nor serializable, and opening a
//! response consumes it, so a grant serves exactly one decryption.
//!
//! [`SignedDecryptionRequest`] is what actually goes over the wire.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::auth::message::{DecryptionDomain, UserDecryptRequest};
use crate::codec::CiphertextHandle;
use crate::crypto::keys::{PublicKey, Signature};
use crate::crypto::sealing::{EphemeralKeypair, SealedResponse, SealingError};

/// A handle and the contract whose ACL entry authorizes reading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleContractPair {
    pub handle: CiphertextHandle,
    pub contract: Address,
}

/// The request submitted to the decryption oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedDecryptionRequest {
    pub pairs: Vec<HandleContractPair>,
    pub request: UserDecryptRequest,
    pub signature: Signature,
    pub signer_public_key: PublicKey,
    /// The account claiming the signature.
    pub user: Address,
}

impl SignedDecryptionRequest {
    /// `true` if `signer_public_key` belongs to `user` and signed this
    /// exact request under `domain`.
    pub fn verify_signature(&self, domain: &DecryptionDomain) -> bool {
        self.signer_public_key.address() == self.user
            && self
                .signer_public_key
                .verify(&self.request.digest(domain), &self.signature)
    }
}

/// One signed, single-use decryption grant.
pub struct DecryptionGrant {
    keypair: EphemeralKeypair,
    request: UserDecryptRequest,
    signature: Signature,
    signer_public_key: PublicKey,
}

impl DecryptionGrant {
    pub(crate) fn new(
        keypair: EphemeralKeypair,
        request: UserDecryptRequest,
        signature: Signature,
        signer_public_key: PublicKey,
    ) -> Self {
        Self {
            keypair,
            request,
            signature,
            signer_public_key,
        }
    }

    pub fn request(&self) -> &UserDecryptRequest {
        &self.request
    }

    /// The account that signed the grant.
    pub fn signer(&self) -> Address {
        self.signer_public_key.address()
    }

    /// Builds the wire request for `pairs`.
    pub fn to_request(&self, pairs: Vec<HandleContractPair>) -> SignedDecryptionRequest {
        SignedDecryptionRequest {
            pairs,
            request: self.request.clone(),
            signature: self.signature.clone(),
            signer_public_key: self.signer_public_key,
            user: self.signer(),
        }
    }

    /// Opens the oracle's response. The grant is gone afterwards.
    pub fn open(self, response: &SealedResponse) -> Result<Vec<(CiphertextHandle, u64)>, SealingError> {
        self.keypair.open(response)
    }
}

impl std::fmt::Debug for DecryptionGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionGrant")
            .field("signer", &self.signer())
            .field("window_start", &self.request.start_timestamp)
            .field("duration_days", &self.request.duration_days)
            .finish_non_exhaustive()
    }
}
