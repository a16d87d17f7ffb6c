//! # Mock Coprocessor
//!
//! Plain-integer stand-ins for the confidential-computation service, for
//! local development and tests.
//!
//! [`MockCoprocessor`] keeps a table of handle → plaintext and implements
//! [`HomomorphicBackend`] with ordinary wrapping `u64` arithmetic. Handles
//! are still opaque 32-byte digests and input proofs are still bound to a
//! (contract, submitter) pair, so everything above this layer behaves as it
//! would against a real coprocessor. Nothing here is confidential.
//!
//! [`MockGateway`] is the client-facing side: batch encryption and user
//! decryption. Decryption enforces the same rules a production oracle does
//! (window, signature, contract allow-list, ACL) and seals its answers to
//! the requester's ephemeral key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::{rngs::OsRng, RngCore};
use tracing::{debug, warn};

use super::{
    AclView, CoprocessorError, Ebool, EncryptionService, Euint64, HomomorphicBackend,
    OracleError, OverflowPolicy,
};
use crate::address::Address;
use crate::auth::grant::SignedDecryptionRequest;
use crate::auth::message::DecryptionDomain;
use crate::clock::Clock;
use crate::codec::{CiphertextBundle, CiphertextHandle, FheType, InputProof};
use crate::config::{GrantPolicy, MAX_BATCH_SIZE};
use crate::crypto::hash::{derive_key, keyed_mac};
use crate::crypto::sealing::{seal_values, SealedResponse};

const HANDLE_CONTEXT: &str = "shroud 2026-01 mock coprocessor handle";
const PROOF_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy)]
struct Stored {
    fhe_type: FheType,
    value: u64,
}

// ---------------------------------------------------------------------------
// MockCoprocessor
// ---------------------------------------------------------------------------

/// In-memory coprocessor.
///
/// Handles are never removed. Every operation, including intermediate
/// comparisons and reverted transactions, adds an entry that lives as long
/// as the coprocessor, so memory grows with the number of operations run.
/// Superseded balance handles must stay decryptable, and the mock cannot
/// tell which other handles a pending client input still needs. Restart a
/// long-running devnet to reclaim the table; [`len`](Self::len) reports its
/// size.
pub struct MockCoprocessor {
    values: RwLock<HashMap<CiphertextHandle, Stored>>,
    counter: AtomicU64,
    instance_salt: [u8; 32],
    proof_key: [u8; 32],
    policy: OverflowPolicy,
}

impl MockCoprocessor {
    pub fn new() -> Self {
        Self::with_policy(OverflowPolicy::default())
    }

    pub fn with_policy(policy: OverflowPolicy) -> Self {
        let mut instance_salt = [0u8; 32];
        let mut proof_key = [0u8; 32];
        OsRng.fill_bytes(&mut instance_salt);
        OsRng.fill_bytes(&mut proof_key);
        Self {
            values: RwLock::new(HashMap::new()),
            counter: AtomicU64::new(0),
            instance_salt,
            proof_key,
            policy,
        }
    }

    /// Encrypts client inputs and produces the proof binding them to
    /// `(contract, submitter)`.
    pub fn encrypt_inputs(
        &self,
        contract: &Address,
        submitter: &Address,
        values: &[u64],
    ) -> Result<CiphertextBundle, CoprocessorError> {
        if values.len() > MAX_BATCH_SIZE {
            return Err(CoprocessorError::InvalidProof(format!(
                "{} inputs exceed the batch limit of {}",
                values.len(),
                MAX_BATCH_SIZE
            )));
        }
        let handles: Vec<CiphertextHandle> = values
            .iter()
            .map(|v| self.store(FheType::Uint64, *v))
            .collect();

        let mut proof = Vec::with_capacity(33);
        proof.push(PROOF_VERSION);
        proof.extend_from_slice(&self.proof_mac(contract, submitter, &handles));
        let proof = InputProof::new(proof).map_err(|e| CoprocessorError::InvalidProof(e.to_string()))?;

        debug!(count = handles.len(), contract = %contract, submitter = %submitter, "inputs encrypted");
        Ok(CiphertextBundle::new(handles, proof))
    }

    /// Plaintext behind a `u64` handle. Only the gateway and tests use this.
    pub fn plaintext(&self, handle: &CiphertextHandle) -> Option<u64> {
        self.values
            .read()
            .get(handle)
            .filter(|s| s.fhe_type == FheType::Uint64)
            .map(|s| s.value)
    }

    /// Number of ciphertexts held. Only ever grows.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    fn store(&self, fhe_type: FheType, value: u64) -> CiphertextHandle {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let digest = derive_key(HANDLE_CONTEXT, &[&self.instance_salt, &n.to_le_bytes()]);
        let handle = CiphertextHandle::from_digest(&digest, fhe_type);
        self.values.write().insert(handle, Stored { fhe_type, value });
        handle
    }

    fn load(&self, handle: &CiphertextHandle, expected: FheType) -> Result<u64, CoprocessorError> {
        let stored = self
            .values
            .read()
            .get(handle)
            .copied()
            .ok_or(CoprocessorError::UnknownHandle(*handle))?;
        if stored.fhe_type != expected {
            return Err(CoprocessorError::TypeMismatch {
                handle: *handle,
                expected,
            });
        }
        Ok(stored.value)
    }

    fn load_u64(&self, v: Euint64) -> Result<u64, CoprocessorError> {
        self.load(&v.handle(), FheType::Uint64)
    }

    fn load_bool(&self, b: Ebool) -> Result<bool, CoprocessorError> {
        self.load(&b.handle(), FheType::Bool).map(|v| v != 0)
    }

    fn new_u64(&self, value: u64) -> Euint64 {
        Euint64::from_handle(self.store(FheType::Uint64, value))
    }

    fn new_bool(&self, value: bool) -> Ebool {
        Ebool::from_handle(self.store(FheType::Bool, u64::from(value)))
    }

    fn proof_mac(&self, contract: &Address, submitter: &Address, handles: &[CiphertextHandle]) -> [u8; 32] {
        let mut parts: Vec<&[u8]> = Vec::with_capacity(handles.len() + 2);
        parts.push(contract.as_bytes());
        parts.push(submitter.as_bytes());
        parts.extend(handles.iter().map(|h| h.as_bytes().as_slice()));
        keyed_mac(&self.proof_key, &parts)
    }
}

impl Default for MockCoprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockCoprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCoprocessor")
            .field("ciphertexts", &self.len())
            .field("policy", &self.policy)
            .finish()
    }
}

impl HomomorphicBackend for MockCoprocessor {
    fn trivial_encrypt(&self, value: u64) -> Result<Euint64, CoprocessorError> {
        Ok(self.new_u64(value))
    }

    fn trivial_bool(&self, value: bool) -> Result<Ebool, CoprocessorError> {
        Ok(self.new_bool(value))
    }

    fn add(&self, a: Euint64, b: Euint64) -> Result<Euint64, CoprocessorError> {
        Ok(self.new_u64(self.load_u64(a)?.wrapping_add(self.load_u64(b)?)))
    }

    fn sub(&self, a: Euint64, b: Euint64) -> Result<Euint64, CoprocessorError> {
        Ok(self.new_u64(self.load_u64(a)?.wrapping_sub(self.load_u64(b)?)))
    }

    fn le(&self, a: Euint64, b: Euint64) -> Result<Ebool, CoprocessorError> {
        Ok(self.new_bool(self.load_u64(a)? <= self.load_u64(b)?))
    }

    fn and(&self, a: Ebool, b: Ebool) -> Result<Ebool, CoprocessorError> {
        Ok(self.new_bool(self.load_bool(a)? && self.load_bool(b)?))
    }

    fn select(
        &self,
        cond: Ebool,
        if_true: Euint64,
        if_false: Euint64,
    ) -> Result<Euint64, CoprocessorError> {
        // Both branches are loaded so a bad handle fails either way.
        let t = self.load_u64(if_true)?;
        let f = self.load_u64(if_false)?;
        Ok(self.new_u64(if self.load_bool(cond)? { t } else { f }))
    }

    fn reveal_guard(&self, guard: Ebool) -> Result<bool, CoprocessorError> {
        self.load_bool(guard)
    }

    fn verify_input(
        &self,
        bundle: &CiphertextBundle,
        contract: &Address,
        submitter: &Address,
    ) -> Result<Vec<Euint64>, CoprocessorError> {
        let proof = bundle.proof.as_bytes();
        if proof.len() != 33 || proof[0] != PROOF_VERSION {
            return Err(CoprocessorError::InvalidProof("malformed proof".into()));
        }
        let expected = blake3::Hash::from(self.proof_mac(contract, submitter, &bundle.handles));
        let mut given = [0u8; 32];
        given.copy_from_slice(&proof[1..]);
        // blake3::Hash equality is constant-time.
        if blake3::Hash::from(given) != expected {
            return Err(CoprocessorError::InvalidProof(
                "proof is not bound to this contract and submitter".into(),
            ));
        }

        bundle
            .handles
            .iter()
            .map(|h| {
                self.load(h, FheType::Uint64)?;
                Ok(Euint64::from_handle(*h))
            })
            .collect()
    }

    fn overflow_policy(&self) -> OverflowPolicy {
        self.policy
    }
}

// ---------------------------------------------------------------------------
// MockGateway
// ---------------------------------------------------------------------------

/// Client-facing encryption and decryption over a [`MockCoprocessor`].
pub struct MockGateway {
    coprocessor: Arc<MockCoprocessor>,
    acl: Arc<dyn AclView>,
    clock: Arc<dyn Clock>,
    domain: DecryptionDomain,
    policy: GrantPolicy,
    offline: AtomicBool,
}

impl MockGateway {
    pub fn new(
        coprocessor: Arc<MockCoprocessor>,
        acl: Arc<dyn AclView>,
        clock: Arc<dyn Clock>,
        domain: DecryptionDomain,
        policy: GrantPolicy,
    ) -> Self {
        Self {
            coprocessor,
            acl,
            clock,
            domain,
            policy,
            offline: AtomicBool::new(false),
        }
    }

    pub fn domain(&self) -> &DecryptionDomain {
        &self.domain
    }

    /// Simulates an unreachable endpoint.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), String> {
        if self.offline.load(Ordering::SeqCst) {
            Err("gateway offline".to_string())
        } else {
            Ok(())
        }
    }

    fn authorize(&self, request: &SignedDecryptionRequest) -> Result<(), OracleError> {
        let message = &request.request;
        let now = self.clock.now();

        // The window is authoritative here, whatever the signature says.
        if message.is_expired_at(now) {
            return Err(OracleError::Expired);
        }
        if now < message.window_start() {
            return Err(OracleError::InvalidRequest("window has not started".into()));
        }
        if message.duration_days == 0 || message.duration_days > self.policy.max_duration_days {
            return Err(OracleError::InvalidRequest(format!(
                "duration of {} days is not accepted",
                message.duration_days
            )));
        }
        if request.pairs.is_empty() || request.pairs.len() > MAX_BATCH_SIZE {
            return Err(OracleError::InvalidRequest(format!(
                "{} handles requested",
                request.pairs.len()
            )));
        }
        if !request.verify_signature(&self.domain) {
            return Err(OracleError::Unauthorized(
                "signature does not match the requesting user".into(),
            ));
        }

        for pair in &request.pairs {
            if !message.contract_addresses.contains(&pair.contract) {
                return Err(OracleError::Unauthorized(format!(
                    "contract {} is not covered by the grant",
                    pair.contract
                )));
            }
            if !self.acl.is_allowed(&pair.handle, &request.user) {
                return Err(OracleError::Unauthorized(format!(
                    "{} may not decrypt {}",
                    request.user, pair.handle
                )));
            }
            if !self.acl.is_allowed(&pair.handle, &pair.contract) {
                return Err(OracleError::Unauthorized(format!(
                    "contract {} holds no rights on {}",
                    pair.contract, pair.handle
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EncryptionService for MockGateway {
    async fn encrypt_batch(
        &self,
        contract: Address,
        submitter: Address,
        values: &[u64],
    ) -> Result<CiphertextBundle, CoprocessorError> {
        self.check_online().map_err(CoprocessorError::Unreachable)?;
        self.coprocessor.encrypt_inputs(&contract, &submitter, values)
    }

    async fn decrypt_batch(
        &self,
        request: &SignedDecryptionRequest,
    ) -> Result<SealedResponse, OracleError> {
        self.check_online().map_err(OracleError::Unreachable)?;

        if let Err(e) = self.authorize(request) {
            warn!(user = %request.user, error = %e, "user decryption refused");
            return Err(e);
        }

        let values = request
            .pairs
            .iter()
            .map(|pair| {
                self.coprocessor
                    .plaintext(&pair.handle)
                    .map(|v| (pair.handle, v))
                    .ok_or_else(|| OracleError::InvalidRequest(format!("unknown handle {}", pair.handle)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(user = %request.user, count = values.len(), "user decryption served");
        seal_values(&request.request.public_key, &values)
            .map_err(|e| OracleError::InvalidRequest(e.to_string()))
    }
}
