//! Integration tests for batch distribution.
//!
//! Every test drives the real flow: rows are validated and encrypted by the
//! client, signed, submitted to the local chain, executed against the token
//! and the distributor, and checked through the coprocessor's plaintexts.

mod common;

use common::{harness, signer};
use shroud_contracts::MintPolicy;
use shroud_protocol::address::Address;
use shroud_protocol::auth::signer::Signer;
use shroud_protocol::client::{ActionStatus, DistributionRow};
use shroud_protocol::error::ErrorKind;
use shroud_protocol::fhe::EncryptionService;
use shroud_protocol::settlement::{
    sign_transaction, ContractCall, SettlementClient, Transaction, TxStatus,
};

fn row(address: Address, amount: &str) -> DistributionRow {
    DistributionRow::new(address.to_hex(), amount)
}

fn failed_kind(status: &ActionStatus) -> ErrorKind {
    match status {
        ActionStatus::Failed { kind, .. } => *kind,
        other => panic!("expected failure, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Happy Path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn funded_distributor_pays_two_recipients() {
    let h = harness(1_000_000, MintPolicy::Restricted);
    let client = h.deployer_client();
    let alice = signer();
    let bob = signer();

    // 100 and 200 raw units.
    let status = client
        .distribute(&[
            row(alice.address(), "0.0001"),
            row(bob.address(), "0.0002"),
        ])
        .await;
    assert!(status.is_confirmed(), "{:?}", status);
    assert_eq!(status.status(), "confirmed");

    assert_eq!(h.balance(alice.address()).await, 100);
    assert_eq!(h.balance(bob.address()).await, 200);
    assert_eq!(h.balance(h.deployment.distributor).await, 999_700);

    // Recipients can read their own balances.
    assert_eq!(
        h.client(alice.clone()).decrypt_own_balance().await.to_string(),
        "0.0001"
    );
    assert_eq!(
        h.client(bob.clone()).decrypt_own_balance().await.to_string(),
        "0.0002"
    );
}

#[tokio::test]
async fn anyone_may_trigger_a_distribution() {
    let h = harness(1_000, MintPolicy::Restricted);
    let outsider = signer();
    let recipient = signer();

    let status = h
        .client(outsider)
        .distribute(&[row(recipient.address(), "0.00005")])
        .await;
    assert!(status.is_confirmed(), "{:?}", status);
    assert_eq!(h.balance(recipient.address()).await, 50);
    assert_eq!(h.balance(h.deployment.distributor).await, 950);
}

#[tokio::test]
async fn repeated_recipient_receives_every_leg() {
    let h = harness(1_000, MintPolicy::Restricted);
    let alice = signer();
    let status = h
        .deployer_client()
        .distribute(&[
            row(alice.address(), "0.0001"),
            row(alice.address(), "0.0001"),
        ])
        .await;
    assert!(status.is_confirmed());
    assert_eq!(h.balance(alice.address()).await, 200);
}

// ---------------------------------------------------------------------------
// Atomicity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn uncovered_batch_changes_nothing() {
    let h = harness(250, MintPolicy::Restricted);
    let alice = signer();
    let bob = signer();
    let before = h.chain.confidential_balance_of(h.deployment.distributor).await.unwrap();

    // The first leg fits on its own, the second does not.
    let status = h
        .deployer_client()
        .distribute(&[
            row(alice.address(), "0.0001"),
            row(bob.address(), "0.0002"),
        ])
        .await;
    assert_eq!(failed_kind(&status), ErrorKind::InsufficientBalance);

    let after = h.chain.confidential_balance_of(h.deployment.distributor).await.unwrap();
    assert_eq!(before, after, "distributor handle must not change");
    assert!(h.chain.confidential_balance_of(alice.address()).await.unwrap().is_zero());
    assert!(h.chain.confidential_balance_of(bob.address()).await.unwrap().is_zero());
    assert_eq!(h.balance(h.deployment.distributor).await, 250);
}

#[tokio::test]
async fn supply_is_conserved_across_distributions() {
    let h = harness(10_000, MintPolicy::Restricted);
    let client = h.deployer_client();
    let recipients: Vec<_> = (0..5).map(|_| signer()).collect();

    for (i, r) in recipients.iter().enumerate() {
        let amount = format!("0.00{}", i + 1); // 1_000 .. 5_000 raw
        let _ = client.distribute(&[row(r.address(), &amount)]).await;
    }

    // 1k + 2k + 3k + 4k fit; the 5k leg exceeds what is left.
    let mut total = h.balance(h.deployment.distributor).await;
    for r in &recipients {
        total += h.balance(r.address()).await;
    }
    assert_eq!(total, h.plaintext(h.chain.total_supply_handle()));
    assert_eq!(total, 10_000);
    assert_eq!(h.balance(recipients[4].address()).await, 0);
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn length_mismatch_reverts_before_any_transfer() {
    let h = harness(1_000, MintPolicy::Restricted);
    let me = h.deployer.clone();
    let bundle = h
        .gateway
        .encrypt_batch(h.deployment.distributor, me.address(), &[10])
        .await
        .unwrap();

    let tx = Transaction {
        from: me.address(),
        nonce: h.chain.nonce_of(me.address()).await.unwrap(),
        target: h.deployment.distributor,
        call: ContractCall::BatchDistributeEncrypted {
            recipients: vec![signer().address(), signer().address()],
            bundle,
        },
    };
    let signed = sign_transaction(tx, me.as_ref()).await.unwrap();
    let hash = h.chain.submit(signed).await.unwrap();
    let receipt = h.chain.wait_for_receipt(hash).await.unwrap();

    assert_eq!(receipt.status, TxStatus::Reverted(ErrorKind::LengthMismatch));
    assert_eq!(h.balance(h.deployment.distributor).await, 1_000);
}

#[tokio::test]
async fn proof_for_another_contract_is_rejected() {
    let h = harness(1_000, MintPolicy::Restricted);
    let me = h.deployer.clone();
    // Produced for the token, replayed against the distributor.
    let bundle = h
        .gateway
        .encrypt_batch(h.deployment.token, me.address(), &[10])
        .await
        .unwrap();

    let tx = Transaction {
        from: me.address(),
        nonce: h.chain.nonce_of(me.address()).await.unwrap(),
        target: h.deployment.distributor,
        call: ContractCall::BatchDistributeEncrypted {
            recipients: vec![signer().address()],
            bundle,
        },
    };
    let hash = h
        .chain
        .submit(sign_transaction(tx, me.as_ref()).await.unwrap())
        .await
        .unwrap();
    let receipt = h.chain.wait_for_receipt(hash).await.unwrap();
    assert_eq!(receipt.status, TxStatus::Reverted(ErrorKind::InvalidProof));
}

#[tokio::test]
async fn proof_for_another_submitter_is_rejected() {
    let h = harness(1_000, MintPolicy::Restricted);
    let thief = signer();
    let bundle = h
        .gateway
        .encrypt_batch(h.deployment.distributor, h.deployer.address(), &[10])
        .await
        .unwrap();

    let tx = Transaction {
        from: thief.address(),
        nonce: 0,
        target: h.deployment.distributor,
        call: ContractCall::BatchDistributeEncrypted {
            recipients: vec![thief.address()],
            bundle,
        },
    };
    let hash = h
        .chain
        .submit(sign_transaction(tx, thief.as_ref()).await.unwrap())
        .await
        .unwrap();
    let receipt = h.chain.wait_for_receipt(hash).await.unwrap();
    assert_eq!(receipt.status, TxStatus::Reverted(ErrorKind::InvalidProof));
    assert_eq!(h.balance(thief.address()).await, 0);
}

#[tokio::test]
async fn invalid_rows_never_reach_the_chain() {
    let h = harness(1_000, MintPolicy::Restricted);
    let client = h.deployer_client();
    let block = h.chain.block_number();

    let status = client
        .distribute(&[DistributionRow::new("0x1234", "1")])
        .await;
    assert_eq!(failed_kind(&status), ErrorKind::OutOfRange);

    let status = client
        .distribute(&[row(signer().address(), "0")])
        .await;
    assert_eq!(failed_kind(&status), ErrorKind::OutOfRange);

    let status = client.distribute(&[]).await;
    assert_eq!(failed_kind(&status), ErrorKind::LengthMismatch);

    assert_eq!(h.chain.block_number(), block);
}

#[tokio::test]
async fn offline_settlement_is_ambiguous_on_submit() {
    let h = harness(1_000, MintPolicy::Restricted);
    let client = h.deployer_client();
    let recipient = signer();

    // Offline before anything is sent: the address lookup fails first.
    h.chain.set_offline(true);
    let status = client.distribute(&[row(recipient.address(), "0.0001")]).await;
    match status {
        ActionStatus::Failed { kind, ambiguous, .. } => {
            assert_eq!(kind, ErrorKind::NetworkFailure);
            assert!(!ambiguous, "a failed query is not ambiguous");
        }
        other => panic!("unexpected {:?}", other),
    }

    h.chain.set_offline(false);
    let hash = client
        .submit_distribution(&[row(recipient.address(), "0.0001")])
        .await
        .unwrap();
    h.chain.set_offline(true);
    match client.confirm(hash).await {
        ActionStatus::Failed { ambiguous, .. } => assert!(ambiguous),
        other => panic!("unexpected {:?}", other),
    }

    // Once reachable again the transaction turns out to have landed.
    h.chain.set_offline(false);
    assert!(client.confirm(hash).await.is_confirmed());
    assert_eq!(h.balance(recipient.address()).await, 100);
}

#[tokio::test]
async fn foreign_balance_is_refused_before_any_network_call() {
    let h = harness(1_000, MintPolicy::Restricted);
    let x = signer();
    let y = signer();

    h.chain.set_offline(true);
    let err = h
        .client(x.clone())
        .try_decrypt_balance_of(y.address())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OwnerMismatch);
    assert!(!err.is_ambiguous());

    // Asking for one's own balance does reach the unreachable chain.
    let err = h
        .client(x.clone())
        .try_decrypt_balance_of(x.address())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NetworkFailure);
}
