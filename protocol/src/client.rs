//! # Distributor Client
//!
//! The surface a UI or CLI drives: two read-only queries (own balance,
//! anyone's balance handle) and two actions (faucet mint, batch
//! distribution), plus decryption of balances the signer owns.
//!
//! Actions report an [`ActionStatus`] whose [`status`](ActionStatus::status)
//! string is `pending`, `confirmed`, or an error kind. Decryption reports a
//! [`BalanceDisplay`]; any failure shows as the `Error` marker, never as a
//! stale or zero amount.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::address::Address;
use crate::amount::{format_amount, parse_positive_amount, Amount};
use crate::auth::session::{decrypt_handle, DecryptionContext};
use crate::auth::signer::Signer;
use crate::clock::Clock;
use crate::codec::CiphertextHandle;
use crate::config::MAX_BATCH_SIZE;
use crate::error::{ErrorKind, NetworkPhase, ProtocolError};
use crate::fhe::EncryptionService;
use crate::settlement::{
    sign_transaction, ContractCall, SettlementClient, Transaction, TxHash, TxStatus,
};

/// A decrypted balance as shown to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "amount")]
pub enum BalanceDisplay {
    Revealed(String),
    Error,
}

impl BalanceDisplay {
    pub fn is_error(&self) -> bool {
        matches!(self, BalanceDisplay::Error)
    }
}

impl fmt::Display for BalanceDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceDisplay::Revealed(text) => f.write_str(text),
            BalanceDisplay::Error => f.write_str("Error"),
        }
    }
}

/// Outcome of a mutating action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ActionStatus {
    /// Submitted, not yet confirmed.
    Pending { tx: TxHash },
    /// Included and executed successfully.
    Confirmed { tx: TxHash, block: u64 },
    Failed {
        kind: ErrorKind,
        reason: String,
        /// The transaction may still land; re-query before retrying.
        ambiguous: bool,
    },
}

impl ActionStatus {
    /// `pending`, `confirmed`, or the error kind.
    pub fn status(&self) -> String {
        match self {
            ActionStatus::Pending { .. } => "pending".to_string(),
            ActionStatus::Confirmed { .. } => "confirmed".to_string(),
            ActionStatus::Failed { kind, .. } => kind.to_string(),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, ActionStatus::Confirmed { .. })
    }

    fn failed(error: &ProtocolError) -> Self {
        ActionStatus::Failed {
            kind: error.kind(),
            reason: error.to_string(),
            ambiguous: error.is_ambiguous(),
        }
    }
}

/// One row of a distribution form, as typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRow {
    pub address: String,
    pub amount: String,
}

impl DistributionRow {
    pub fn new(address: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            amount: amount.into(),
        }
    }
}

/// Checks every row before anything is encrypted. Returns recipients and
/// raw amounts in row order.
pub fn validate_rows(rows: &[DistributionRow]) -> Result<(Vec<Address>, Vec<u64>), ProtocolError> {
    if rows.is_empty() {
        return Err(ProtocolError::LengthMismatch {
            recipients: 0,
            handles: 0,
        });
    }
    if rows.len() > MAX_BATCH_SIZE {
        return Err(ProtocolError::OutOfRange(format!(
            "{} rows exceed the batch limit of {}",
            rows.len(),
            MAX_BATCH_SIZE
        )));
    }

    let mut recipients = Vec::with_capacity(rows.len());
    let mut amounts = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let address: Address = row.address.parse().map_err(|e| {
            ProtocolError::OutOfRange(format!("invalid address in row {}: {}", i + 1, e))
        })?;
        let amount = parse_positive_amount(&row.amount).map_err(|e| {
            ProtocolError::OutOfRange(format!("invalid amount in row {}: {}", i + 1, e))
        })?;
        recipients.push(address);
        amounts.push(amount.raw());
    }
    Ok((recipients, amounts))
}

pub struct DistributorClient {
    settlement: Arc<dyn SettlementClient>,
    encryption: Arc<dyn EncryptionService>,
    signer: Arc<dyn Signer>,
    clock: Arc<dyn Clock>,
    context: DecryptionContext,
}

impl DistributorClient {
    pub fn new(
        settlement: Arc<dyn SettlementClient>,
        encryption: Arc<dyn EncryptionService>,
        signer: Arc<dyn Signer>,
        clock: Arc<dyn Clock>,
        context: DecryptionContext,
    ) -> Self {
        Self {
            settlement,
            encryption,
            signer,
            clock,
            context,
        }
    }

    /// The connected account.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    // -- queries -------------------------------------------------------------

    pub async fn own_balance_handle(&self) -> Result<CiphertextHandle, ProtocolError> {
        self.balance_handle_of(self.address()).await
    }

    pub async fn balance_handle_of(&self, account: Address) -> Result<CiphertextHandle, ProtocolError> {
        Ok(self.settlement.confidential_balance_of(account).await?)
    }

    /// Decrypts the connected account's balance.
    pub async fn decrypt_own_balance(&self) -> BalanceDisplay {
        self.decrypt_balance_of(self.address()).await
    }

    /// Decrypts `owner`'s balance. Only works when the connected account is
    /// `owner`; anything else shows `Error`.
    pub async fn decrypt_balance_of(&self, owner: Address) -> BalanceDisplay {
        match self.try_decrypt_balance_of(owner).await {
            Ok(amount) => BalanceDisplay::Revealed(format_amount(amount)),
            Err(e) => {
                warn!(owner = %owner, kind = %e.kind(), error = %e, "balance decryption failed");
                BalanceDisplay::Error
            }
        }
    }

    /// Like [`decrypt_balance_of`](Self::decrypt_balance_of) but keeps the error.
    pub async fn try_decrypt_balance_of(&self, owner: Address) -> Result<Amount, ProtocolError> {
        // Refuse someone else's balance before touching the network.
        let me = self.address();
        if me != owner {
            return Err(ProtocolError::OwnerMismatch {
                expected: owner,
                actual: me,
            });
        }
        let token = self.settlement.token_address().await?;
        let handle = self.settlement.confidential_balance_of(owner).await?;
        decrypt_handle(
            handle,
            token,
            owner,
            self.signer.as_ref(),
            self.encryption.as_ref(),
            self.context.clone(),
            Arc::clone(&self.clock),
        )
        .await
    }

    // -- actions -------------------------------------------------------------

    /// Mints `amount_text` to the connected account and waits for it.
    pub async fn request_faucet(&self, amount_text: &str) -> ActionStatus {
        match self.submit_faucet(amount_text).await {
            Ok(hash) => self.confirm(hash).await,
            Err(e) => ActionStatus::failed(&e),
        }
    }

    /// Phase one of a faucet mint.
    pub async fn submit_faucet(&self, amount_text: &str) -> Result<TxHash, ProtocolError> {
        let amount = parse_positive_amount(amount_text)?;
        let token = self.settlement.token_address().await?;
        let me = self.address();
        let hash = self
            .submit_call(token, ContractCall::Mint { to: me, amount })
            .await?;
        info!(to = %me, amount = %amount, tx = %hash, "faucet mint submitted");
        Ok(hash)
    }

    /// Encrypts and distributes `rows` from the distributor, waiting for
    /// confirmation.
    pub async fn distribute(&self, rows: &[DistributionRow]) -> ActionStatus {
        match self.submit_distribution(rows).await {
            Ok(hash) => self.confirm(hash).await,
            Err(e) => ActionStatus::failed(&e),
        }
    }

    /// Phase one of a distribution: validate, encrypt, sign, submit.
    pub async fn submit_distribution(&self, rows: &[DistributionRow]) -> Result<TxHash, ProtocolError> {
        let (recipients, amounts) = validate_rows(rows)?;
        let distributor = self.settlement.distributor_address().await?;
        let me = self.address();

        let bundle = self
            .encryption
            .encrypt_batch(distributor, me, &amounts)
            .await?;
        if bundle.len() != recipients.len() {
            return Err(ProtocolError::LengthMismatch {
                recipients: recipients.len(),
                handles: bundle.len(),
            });
        }

        let count = recipients.len();
        let hash = self
            .submit_call(
                distributor,
                ContractCall::BatchDistributeEncrypted { recipients, bundle },
            )
            .await?;
        info!(recipients = count, tx = %hash, "distribution submitted");
        Ok(hash)
    }

    /// Confidentially transfers `amount_text` of the connected account's
    /// balance to `to`.
    pub async fn transfer(&self, to: Address, amount_text: &str) -> ActionStatus {
        let submitted = async {
            let amount = parse_positive_amount(amount_text)?;
            let token = self.settlement.token_address().await?;
            let bundle = self
                .encryption
                .encrypt_batch(token, self.address(), &[amount.raw()])
                .await?;
            let hash = self
                .submit_call(token, ContractCall::ConfidentialTransfer { to, bundle })
                .await?;
            Ok::<_, ProtocolError>(hash)
        };
        match submitted.await {
            Ok(hash) => self.confirm(hash).await,
            Err(e) => ActionStatus::failed(&e),
        }
    }

    /// Phase two: waits for `hash` and reports its outcome.
    pub async fn confirm(&self, hash: TxHash) -> ActionStatus {
        match self.settlement.wait_for_receipt(hash).await {
            Ok(receipt) => match receipt.status {
                TxStatus::Success => {
                    info!(tx = %hash, block = receipt.block_number, "transaction confirmed");
                    ActionStatus::Confirmed {
                        tx: hash,
                        block: receipt.block_number,
                    }
                }
                TxStatus::Reverted(kind) => {
                    warn!(tx = %hash, %kind, "transaction reverted");
                    ActionStatus::Failed {
                        kind,
                        reason: receipt
                            .revert_reason
                            .unwrap_or_else(|| kind.to_string()),
                        ambiguous: false,
                    }
                }
            },
            Err(e) => {
                let e: ProtocolError = e.into();
                warn!(tx = %hash, error = %e, "confirmation failed");
                ActionStatus::failed(&e)
            }
        }
    }

    async fn submit_call(&self, target: Address, call: ContractCall) -> Result<TxHash, ProtocolError> {
        let from = self.address();
        let nonce = self
            .settlement
            .nonce_of(from)
            .await
            .map_err(|e| match e {
                crate::settlement::SettlementError::Unreachable { reason, .. } => {
                    ProtocolError::network(NetworkPhase::Query, reason)
                }
                other => other.into(),
            })?;
        let tx = Transaction {
            from,
            nonce,
            target,
            call,
        };
        let signed = sign_transaction(tx, self.signer.as_ref()).await?;
        Ok(self.settlement.submit(signed).await?)
    }
}

impl fmt::Debug for DistributorClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributorClient")
            .field("address", &self.address())
            .field("domain", &self.context.domain)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> String {
        Address::from_bytes([n; 20]).to_hex()
    }

    #[test]
    fn rows_are_validated_in_order() {
        let rows = vec![
            DistributionRow::new(addr(1), "0.0001"),
            DistributionRow::new(addr(2), "0.0002"),
        ];
        let (recipients, amounts) = validate_rows(&rows).unwrap();
        assert_eq!(recipients, vec![Address::from_bytes([1; 20]), Address::from_bytes([2; 20])]);
        assert_eq!(amounts, vec![100, 200]);
    }

    #[test]
    fn empty_batch_is_a_length_mismatch() {
        let err = validate_rows(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LengthMismatch);
    }

    #[test]
    fn zero_and_bad_amounts_are_out_of_range() {
        for bad in ["0", "", "-1", "abc", "18446744073709551616"] {
            let err = validate_rows(&[DistributionRow::new(addr(1), bad)]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::OutOfRange, "amount {:?}", bad);
        }
    }

    #[test]
    fn bad_address_names_the_row() {
        let rows = vec![
            DistributionRow::new(addr(1), "1"),
            DistributionRow::new("0x1234", "1"),
        ];
        let err = validate_rows(&rows).unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn status_strings() {
        let tx = TxHash([0; 32]);
        assert_eq!(ActionStatus::Pending { tx }.status(), "pending");
        assert_eq!(ActionStatus::Confirmed { tx, block: 1 }.status(), "confirmed");
        let failed = ActionStatus::failed(&ProtocolError::InsufficientBalance);
        assert_eq!(failed.status(), "insufficient-balance");
    }

    #[test]
    fn error_marker_displays_as_error() {
        assert_eq!(BalanceDisplay::Error.to_string(), "Error");
        assert_eq!(BalanceDisplay::Revealed("0.0001".into()).to_string(), "0.0001");
    }
}
