//! Integration tests for the user decryption protocol against the mock
//! gateway: what the oracle accepts, what it refuses, and in which order it
//! checks.

use std::sync::Arc;

use chrono::Duration;
use shroud_protocol::address::Address;
use shroud_protocol::auth::{
    decrypt_handle, DecryptionContext, DecryptionDomain, HandleContractPair, LocalSigner,
    SignedDecryptionRequest, Signer, UserDecryptRequest,
};
use shroud_protocol::clock::{Clock, ManualClock};
use shroud_protocol::codec::CiphertextHandle;
use shroud_protocol::config::{GrantPolicy, CHAIN_ID_LOCAL};
use shroud_protocol::crypto::keys::Keypair;
use shroud_protocol::crypto::sealing::EphemeralKeypair;
use shroud_protocol::error::ErrorKind;
use shroud_protocol::fhe::mock::{MockCoprocessor, MockGateway};
use shroud_protocol::fhe::{Acl, EncryptionService, HomomorphicBackend, OracleError};
use shroud_protocol::Amount;

const TOKEN: Address = Address::from_bytes([0x70; 20]);

struct Setup {
    gateway: MockGateway,
    clock: ManualClock,
    domain: DecryptionDomain,
    owner: Keypair,
    handle: CiphertextHandle,
}

/// A gateway serving one handle worth 42, readable by `owner` via the token.
fn setup() -> Setup {
    let cop = Arc::new(MockCoprocessor::new());
    let owner = Keypair::generate();
    let handle = cop.trivial_encrypt(42).unwrap().handle();

    let mut acl = Acl::new();
    acl.allow(handle, owner.address());
    acl.allow(handle, TOKEN);

    let clock = ManualClock::default();
    let domain = DecryptionDomain::new(CHAIN_ID_LOCAL, Address::from_bytes([0xdc; 20]));
    let gateway = MockGateway::new(
        cop,
        Arc::new(acl),
        Arc::new(clock.clone()),
        domain.clone(),
        GrantPolicy::default(),
    );
    Setup {
        gateway,
        clock,
        domain,
        owner,
        handle,
    }
}

/// Signs a request by hand so each field can be bent.
fn signed(
    s: &Setup,
    ephemeral: &EphemeralKeypair,
    signer: &Keypair,
    contracts: Vec<Address>,
    start: i64,
    days: u32,
) -> SignedDecryptionRequest {
    let request = UserDecryptRequest {
        public_key: ephemeral.public_key_bytes(),
        contract_addresses: contracts,
        start_timestamp: start,
        duration_days: days,
    };
    let signature = signer.sign(&request.digest(&s.domain));
    SignedDecryptionRequest {
        pairs: vec![HandleContractPair {
            handle: s.handle,
            contract: TOKEN,
        }],
        request,
        signature,
        signer_public_key: signer.public_key(),
        user: signer.address(),
    }
}

fn now(s: &Setup) -> i64 {
    s.clock.now().timestamp()
}

// ---------------------------------------------------------------------------
// Accepted
// ---------------------------------------------------------------------------

#[tokio::test]
async fn valid_grant_is_served_sealed() {
    let s = setup();
    let ephemeral = EphemeralKeypair::generate();
    let req = signed(&s, &ephemeral, &s.owner, vec![TOKEN], now(&s), 10);

    let response = s.gateway.decrypt_batch(&req).await.unwrap();
    assert_eq!(response.values.len(), 1);
    let opened = ephemeral.open(&response).unwrap();
    assert_eq!(opened, vec![(s.handle, 42)]);
}

#[tokio::test]
async fn a_different_ephemeral_key_cannot_open_the_response() {
    let s = setup();
    let ephemeral = EphemeralKeypair::generate();
    let req = signed(&s, &ephemeral, &s.owner, vec![TOKEN], now(&s), 10);
    let response = s.gateway.decrypt_batch(&req).await.unwrap();

    assert!(EphemeralKeypair::generate().open(&response).is_err());
}

#[tokio::test]
async fn last_second_of_the_window_is_still_valid() {
    let s = setup();
    let ephemeral = EphemeralKeypair::generate();
    let req = signed(&s, &ephemeral, &s.owner, vec![TOKEN], now(&s), 10);
    s.clock.advance(Duration::days(10) - Duration::seconds(1));
    assert!(s.gateway.decrypt_batch(&req).await.is_ok());
}

// ---------------------------------------------------------------------------
// Refused
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expiry_is_checked_before_the_signature() {
    let s = setup();
    let ephemeral = EphemeralKeypair::generate();
    let mut req = signed(&s, &ephemeral, &s.owner, vec![TOKEN], now(&s), 10);
    req.signature = Keypair::generate().sign(b"garbage");
    s.clock.advance(Duration::days(10));

    assert_eq!(s.gateway.decrypt_batch(&req).await.unwrap_err(), OracleError::Expired);
}

#[tokio::test]
async fn window_in_the_future_is_invalid() {
    let s = setup();
    let ephemeral = EphemeralKeypair::generate();
    let req = signed(&s, &ephemeral, &s.owner, vec![TOKEN], now(&s) + 3600, 10);
    assert!(matches!(
        s.gateway.decrypt_batch(&req).await,
        Err(OracleError::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn zero_and_oversized_durations_are_invalid() {
    let s = setup();
    let ephemeral = EphemeralKeypair::generate();
    for days in [0, GrantPolicy::default().max_duration_days + 1] {
        let req = signed(&s, &ephemeral, &s.owner, vec![TOKEN], now(&s), days);
        assert!(
            matches!(
                s.gateway.decrypt_batch(&req).await,
                Err(OracleError::InvalidRequest(_)) | Err(OracleError::Expired)
            ),
            "duration {} accepted",
            days
        );
    }
}

#[tokio::test]
async fn signature_from_another_key_is_refused() {
    let s = setup();
    let ephemeral = EphemeralKeypair::generate();
    let intruder = Keypair::generate();
    let mut req = signed(&s, &ephemeral, &intruder, vec![TOKEN], now(&s), 10);
    // Claims to be the owner while presenting its own key.
    req.user = s.owner.address();

    let err = s.gateway.decrypt_batch(&req).await.unwrap_err();
    assert!(matches!(err, OracleError::Unauthorized(_)));
}

#[tokio::test]
async fn tampered_request_fails_signature_check() {
    let s = setup();
    let ephemeral = EphemeralKeypair::generate();
    let mut req = signed(&s, &ephemeral, &s.owner, vec![TOKEN], now(&s), 10);
    req.request.duration_days = 11;
    assert!(matches!(
        s.gateway.decrypt_batch(&req).await,
        Err(OracleError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn contract_outside_the_grant_is_refused() {
    let s = setup();
    let ephemeral = EphemeralKeypair::generate();
    let other = Address::from_bytes([0x99; 20]);
    let req = signed(&s, &ephemeral, &s.owner, vec![other], now(&s), 10);
    assert!(matches!(
        s.gateway.decrypt_batch(&req).await,
        Err(OracleError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn user_without_acl_rights_is_refused() {
    let s = setup();
    let ephemeral = EphemeralKeypair::generate();
    let stranger = Keypair::generate();
    let req = signed(&s, &ephemeral, &stranger, vec![TOKEN], now(&s), 10);
    assert!(matches!(
        s.gateway.decrypt_batch(&req).await,
        Err(OracleError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn offline_gateway_is_a_network_failure() {
    let s = setup();
    s.gateway.set_offline(true);
    let ephemeral = EphemeralKeypair::generate();
    let req = signed(&s, &ephemeral, &s.owner, vec![TOKEN], now(&s), 10);
    assert!(matches!(
        s.gateway.decrypt_batch(&req).await,
        Err(OracleError::Unreachable(_))
    ));
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn decrypt_handle_round_trip() {
    let s = setup();
    let signer = LocalSigner::new(s.owner.clone());
    let context = DecryptionContext::new(s.domain.clone(), GrantPolicy::default());
    let clock: Arc<dyn Clock> = Arc::new(s.clock.clone());

    let amount = decrypt_handle(
        s.handle,
        TOKEN,
        signer.address(),
        &signer,
        &s.gateway,
        context.clone(),
        clock.clone(),
    )
    .await
    .unwrap();
    assert_eq!(amount, Amount::from_raw(42));

    let stranger = LocalSigner::random();
    let err = decrypt_handle(
        s.handle,
        TOKEN,
        stranger.address(),
        &stranger,
        &s.gateway,
        context,
        clock,
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthorizationFailed);
}
