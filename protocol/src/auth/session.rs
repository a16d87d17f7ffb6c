//! # Decryption Sessions
//!
//! One [`DecryptionSession`] drives one attempt to read a balance:
//!
//! ```text
//! Idle ──► KeypairGenerated ──► RequestSigned ──► GrantSubmitted ──► PlaintextReceived
//!                                     │                 │
//!                                     │                 ├──► Rejected
//!                                     └─────────────────┴──► Expired
//! ```
//!
//! - Owner mismatches are caught locally, before the oracle is contacted.
//! - The grant window is checked before submission and again when the
//!   response arrives; a response that lands after the window is dropped
//!   unopened.
//! - Terminal states are final. A new attempt needs a new session, and
//!   therefore a new ephemeral keypair.
//! - A network failure while the grant is in flight puts the session back
//!   to `RequestSigned` so the same grant can be resubmitted.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::address::Address;
use crate::amount::Amount;
use crate::auth::grant::{DecryptionGrant, HandleContractPair};
use crate::auth::message::{DecryptionDomain, UserDecryptRequest};
use crate::auth::signer::Signer;
use crate::clock::Clock;
use crate::codec::CiphertextHandle;
use crate::config::{GrantPolicy, MAX_GRANT_CONTRACTS};
use crate::crypto::sealing::EphemeralKeypair;
use crate::error::ProtocolError;
use crate::fhe::{EncryptionService, OracleError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    KeypairGenerated,
    RequestSigned,
    GrantSubmitted,
    PlaintextReceived,
    Rejected,
    Expired,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::PlaintextReceived | SessionState::Rejected | SessionState::Expired
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::KeypairGenerated => "keypair_generated",
            SessionState::RequestSigned => "request_signed",
            SessionState::GrantSubmitted => "grant_submitted",
            SessionState::PlaintextReceived => "plaintext_received",
            SessionState::Rejected => "rejected",
            SessionState::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Chain-level parameters every request is built against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionContext {
    pub domain: DecryptionDomain,
    pub policy: GrantPolicy,
}

impl DecryptionContext {
    pub fn new(domain: DecryptionDomain, policy: GrantPolicy) -> Self {
        Self { domain, policy }
    }
}

pub struct DecryptionSession {
    id: Uuid,
    state: SessionState,
    context: DecryptionContext,
    clock: Arc<dyn Clock>,
    keypair: Option<EphemeralKeypair>,
    grant: Option<DecryptionGrant>,
    window_end: Option<DateTime<Utc>>,
}

impl DecryptionSession {
    pub fn new(context: DecryptionContext, clock: Arc<dyn Clock>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            context,
            clock,
            keypair: None,
            grant: None,
            window_end: None,
        }
    }

    /// Correlation id for logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The signed request, once there is one.
    pub fn request(&self) -> Option<&UserDecryptRequest> {
        self.grant.as_ref().map(|g| g.request())
    }

    /// `Idle → KeypairGenerated`. Purely local.
    pub fn generate_keypair(&mut self) -> Result<(), ProtocolError> {
        self.expect_state(SessionState::Idle, "generate a keypair")?;
        self.keypair = Some(EphemeralKeypair::generate());
        self.transition(SessionState::KeypairGenerated);
        Ok(())
    }

    /// `KeypairGenerated → RequestSigned`.
    ///
    /// Builds the request for `contracts` with the window starting now, has
    /// `signer` sign it, and checks that the signature really comes from
    /// `expected_owner`. Nothing leaves the process.
    pub async fn sign_request(
        &mut self,
        signer: &dyn Signer,
        contracts: Vec<Address>,
        expected_owner: &Address,
    ) -> Result<(), ProtocolError> {
        self.expect_state(SessionState::KeypairGenerated, "sign a request")?;

        let policy = self.context.policy;
        if policy.duration_days == 0 || policy.duration_days > policy.max_duration_days {
            return Err(ProtocolError::OutOfRange(format!(
                "grant duration {} days outside 1..={}",
                policy.duration_days, policy.max_duration_days
            )));
        }
        if contracts.is_empty() || contracts.len() > MAX_GRANT_CONTRACTS {
            return Err(ProtocolError::OutOfRange(format!(
                "grant must name 1..={} contracts, got {}",
                MAX_GRANT_CONTRACTS,
                contracts.len()
            )));
        }

        let claimed = signer.address();
        if claimed != *expected_owner {
            return Err(self.reject(ProtocolError::OwnerMismatch {
                expected: *expected_owner,
                actual: claimed,
            }));
        }

        let Some(keypair) = self.keypair.take() else {
            return Err(self.reject(ProtocolError::AuthorizationFailed(
                "ephemeral keypair missing".into(),
            )));
        };

        let request = UserDecryptRequest {
            public_key: keypair.public_key_bytes(),
            contract_addresses: contracts,
            start_timestamp: self.clock.now().timestamp(),
            duration_days: policy.duration_days,
        };
        let digest = request.digest(&self.context.domain);

        let signature = match signer.sign_digest(&digest).await {
            Ok(sig) => sig,
            Err(e) => return Err(self.reject(e.into())),
        };
        let public_key = signer.public_key();

        // The wallet may have switched accounts between the address query
        // and the signature.
        if public_key.address() != *expected_owner {
            return Err(self.reject(ProtocolError::OwnerMismatch {
                expected: *expected_owner,
                actual: public_key.address(),
            }));
        }
        if !public_key.verify(&digest, &signature) {
            return Err(self.reject(ProtocolError::AuthorizationFailed(
                "signer returned an invalid signature".into(),
            )));
        }

        self.window_end = Some(request.window_end());
        self.grant = Some(DecryptionGrant::new(keypair, request, signature, public_key));
        self.transition(SessionState::RequestSigned);
        Ok(())
    }

    /// `RequestSigned → GrantSubmitted → PlaintextReceived | Rejected | Expired`.
    pub async fn submit(
        &mut self,
        service: &dyn EncryptionService,
        pair: HandleContractPair,
    ) -> Result<u64, ProtocolError> {
        self.expect_state(SessionState::RequestSigned, "submit a grant")?;
        self.expire_if_due()?;

        let wire = match &self.grant {
            Some(grant) => grant.to_request(vec![pair]),
            None => {
                return Err(self.reject(ProtocolError::AuthorizationFailed(
                    "grant missing".into(),
                )))
            }
        };
        self.transition(SessionState::GrantSubmitted);

        let response = match service.decrypt_batch(&wire).await {
            Ok(response) => response,
            Err(OracleError::Unreachable(reason)) => {
                warn!(attempt = %self.id, %reason, "decryption oracle unreachable; grant kept");
                self.transition(SessionState::RequestSigned);
                return Err(OracleError::Unreachable(reason).into());
            }
            Err(OracleError::Expired) => return Err(self.expire()),
            Err(e) => return Err(self.reject(e.into())),
        };

        self.expire_if_due()?;

        let Some(grant) = self.grant.take() else {
            return Err(self.reject(ProtocolError::AuthorizationFailed("grant missing".into())));
        };
        let values = match grant.open(&response) {
            Ok(values) => values,
            Err(e) => return Err(self.reject(ProtocolError::AuthorizationFailed(e.to_string()))),
        };
        let Some(value) = values
            .iter()
            .find(|(handle, _)| *handle == pair.handle)
            .map(|(_, value)| *value)
        else {
            return Err(self.reject(ProtocolError::AuthorizationFailed(format!(
                "response does not cover handle {}",
                pair.handle
            ))));
        };

        self.transition(SessionState::PlaintextReceived);
        info!(attempt = %self.id, handle = %pair.handle, "balance decrypted");
        Ok(value)
    }

    /// Moves to `Expired` if the window has elapsed. Terminal sessions are
    /// left alone.
    pub fn expire_if_due(&mut self) -> Result<(), ProtocolError> {
        if self.state.is_terminal() {
            return Ok(());
        }
        match self.window_end {
            Some(end) if self.clock.now() >= end => Err(self.expire()),
            _ => Ok(()),
        }
    }

    fn expire(&mut self) -> ProtocolError {
        warn!(attempt = %self.id, from = %self.state, "decryption grant expired");
        self.discard();
        self.transition(SessionState::Expired);
        ProtocolError::GrantExpired
    }

    fn reject(&mut self, error: ProtocolError) -> ProtocolError {
        warn!(attempt = %self.id, from = %self.state, error = %error, "decryption attempt rejected");
        self.discard();
        self.transition(SessionState::Rejected);
        error
    }

    fn discard(&mut self) {
        self.keypair = None;
        self.grant = None;
    }

    fn transition(&mut self, to: SessionState) {
        debug!(attempt = %self.id, from = %self.state, to = %to, "decryption session transition");
        self.state = to;
    }

    fn expect_state(&self, expected: SessionState, operation: &str) -> Result<(), ProtocolError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ProtocolError::AuthorizationFailed(format!(
                "cannot {} in state {}",
                operation, self.state
            )))
        }
    }
}

impl fmt::Debug for DecryptionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionSession")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("window_end", &self.window_end)
            .finish_non_exhaustive()
    }
}

/// Runs one complete attempt for `handle` and returns the plaintext amount.
///
/// The zero handle is a balance that was never written; it is `0` and
/// needs no grant, but the owner check still applies.
pub async fn decrypt_handle(
    handle: CiphertextHandle,
    contract: Address,
    expected_owner: Address,
    signer: &dyn Signer,
    service: &dyn EncryptionService,
    context: DecryptionContext,
    clock: Arc<dyn Clock>,
) -> Result<Amount, ProtocolError> {
    if signer.address() != expected_owner {
        return Err(ProtocolError::OwnerMismatch {
            expected: expected_owner,
            actual: signer.address(),
        });
    }
    if handle.is_zero() {
        return Ok(Amount::ZERO);
    }

    let mut session = DecryptionSession::new(context, clock);
    session.generate_keypair()?;
    session
        .sign_request(signer, vec![contract], &expected_owner)
        .await?;
    let raw = session
        .submit(service, HandleContractPair { handle, contract })
        .await?;
    Ok(Amount::from_raw(raw))
}
