//! # Batch Distributor
//!
//! Sends encrypted amounts from the distributor's own token balance to many
//! recipients in one transaction, all or nothing.
//!
//! Each leg is a guarded transfer on the token. The per-leg success flags
//! are AND-ed under encryption and revealed once at the end; if any leg
//! could not be covered, the call fails with `InsufficientBalance` and the
//! executing chain discards every leg. Callers learn only that the batch as
//! a whole did or did not fit, never which leg failed.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use shroud_protocol::address::Address;
use shroud_protocol::codec::CiphertextBundle;
use shroud_protocol::config::MAX_BATCH_SIZE;
use shroud_protocol::error::{ErrorKind, ProtocolError};
use shroud_protocol::fhe::CoprocessorError;

use crate::confidential_token::{ConfidentialToken, LedgerError};
use crate::context::CallContext;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistributorError {
    /// Recipient and handle lists differ in length.
    #[error("{recipients} recipients but {handles} encrypted amounts")]
    LengthMismatch { recipients: usize, handles: usize },

    #[error("batch of {0} recipients exceeds the limit of {limit}", limit = MAX_BATCH_SIZE)]
    BatchTooLarge(usize),

    /// The call was routed to a token other than the one bound at deploy.
    #[error("distributor is bound to token {expected}, not {actual}")]
    WrongToken { expected: Address, actual: Address },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl DistributorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DistributorError::LengthMismatch { .. } => ErrorKind::LengthMismatch,
            DistributorError::BatchTooLarge(_) => ErrorKind::OutOfRange,
            DistributorError::WrongToken { .. } => ErrorKind::Unauthorized,
            DistributorError::Ledger(e) => e.kind(),
        }
    }
}

impl From<CoprocessorError> for DistributorError {
    fn from(e: CoprocessorError) -> Self {
        DistributorError::Ledger(LedgerError::Coprocessor(e))
    }
}

impl From<DistributorError> for ProtocolError {
    fn from(e: DistributorError) -> Self {
        match e {
            DistributorError::LengthMismatch {
                recipients,
                handles,
            } => ProtocolError::LengthMismatch {
                recipients,
                handles,
            },
            DistributorError::BatchTooLarge(_) => ProtocolError::OutOfRange(e.to_string()),
            DistributorError::WrongToken { .. } => ProtocolError::Unauthorized(e.to_string()),
            DistributorError::Ledger(inner) => inner.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distributor {
    address: Address,
    token: Address,
    deployer: Address,
}

impl Distributor {
    /// Binds a new distributor at `address` to `token` for good.
    pub fn new(address: Address, token: Address, deployer: Address) -> Self {
        Self {
            address,
            token,
            deployer,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn token_address(&self) -> Address {
        self.token
    }

    pub fn deployer(&self) -> Address {
        self.deployer
    }

    /// Transfers `bundle.handles[i]` to `recipients[i]` for every `i`, from
    /// the distributor's balance, atomically.
    ///
    /// Anyone may call this. The bundle's proof must have been produced for
    /// this distributor and for the caller.
    ///
    /// # Errors
    ///
    /// - [`DistributorError::LengthMismatch`] before anything else is looked at.
    /// - `InvalidProof` (via [`LedgerError::Coprocessor`]) if the proof does
    ///   not verify for `(self, caller)`.
    /// - `InsufficientBalance` if the balance cannot cover every leg. The
    ///   caller must discard the state this call touched.
    pub fn batch_distribute_encrypted(
        &self,
        ctx: &mut CallContext<'_>,
        token: &mut ConfidentialToken,
        recipients: &[Address],
        bundle: &CiphertextBundle,
    ) -> Result<(), DistributorError> {
        if recipients.len() != bundle.len() {
            return Err(DistributorError::LengthMismatch {
                recipients: recipients.len(),
                handles: bundle.len(),
            });
        }
        if recipients.len() > MAX_BATCH_SIZE {
            return Err(DistributorError::BatchTooLarge(recipients.len()));
        }
        if token.address() != self.token {
            return Err(DistributorError::WrongToken {
                expected: self.token,
                actual: token.address(),
            });
        }

        let caller = ctx.sender;
        let amounts = ctx.backend.verify_input(bundle, &self.address, &caller)?;
        for amount in &amounts {
            ctx.allow(*amount, self.address);
        }

        let backend = ctx.backend;
        let mut all_ok = backend.trivial_bool(true)?;
        {
            let mut inner = ctx.nested(self.address);
            for (to, amount) in recipients.iter().zip(amounts) {
                let ok = token.transfer_guarded(&mut inner, self.address, *to, amount)?;
                all_ok = backend.and(all_ok, ok)?;
            }
        }

        if !backend.reveal_guard(all_ok)? {
            return Err(LedgerError::InsufficientBalance.into());
        }

        info!(
            distributor = %self.address,
            caller = %caller,
            recipients = recipients.len(),
            "batch distributed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidential_token::MintPolicy;
    use shroud_protocol::fhe::mock::MockCoprocessor;
    use shroud_protocol::fhe::Acl;
    use shroud_protocol::Amount;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    struct Fixture {
        cop: MockCoprocessor,
        acl: Acl,
        token: ConfidentialToken,
        distributor: Distributor,
    }

    fn fixture(funding: u64) -> Fixture {
        let cop = MockCoprocessor::new();
        let mut acl = Acl::new();
        let mut token = ConfidentialToken::new(addr(0x70), addr(1), MintPolicy::Restricted);
        let distributor = Distributor::new(addr(0xd1), addr(0x70), addr(1));
        let mut ctx = CallContext::new(addr(1), &cop, &mut acl, 1);
        token
            .mint(&mut ctx, distributor.address(), Amount::from_raw(funding))
            .unwrap();
        Fixture {
            cop,
            acl,
            token,
            distributor,
        }
    }

    fn balance(f: &Fixture, who: Address) -> u64 {
        let h = f.token.confidential_balance_of(&who);
        if h.is_zero() {
            0
        } else {
            f.cop.plaintext(&h).unwrap()
        }
    }

    #[test]
    fn distributes_every_leg() {
        let mut f = fixture(1_000);
        let caller = addr(2);
        let bundle = f
            .cop
            .encrypt_inputs(&f.distributor.address(), &caller, &[100, 200])
            .unwrap();
        let mut ctx = CallContext::new(caller, &f.cop, &mut f.acl, 2);
        f.distributor
            .batch_distribute_encrypted(&mut ctx, &mut f.token, &[addr(3), addr(4)], &bundle)
            .unwrap();

        assert_eq!(balance(&f, addr(3)), 100);
        assert_eq!(balance(&f, addr(4)), 200);
        assert_eq!(balance(&f, f.distributor.address()), 700);
    }

    #[test]
    fn length_mismatch_is_checked_first() {
        let mut f = fixture(1_000);
        let caller = addr(2);
        // Proof for the wrong contract: the length error must still win.
        let bundle = f.cop.encrypt_inputs(&addr(0x99), &caller, &[1]).unwrap();
        let mut ctx = CallContext::new(caller, &f.cop, &mut f.acl, 2);
        let err = f
            .distributor
            .batch_distribute_encrypted(&mut ctx, &mut f.token, &[addr(3), addr(4)], &bundle)
            .unwrap_err();
        assert_eq!(
            err,
            DistributorError::LengthMismatch {
                recipients: 2,
                handles: 1
            }
        );
    }

    #[test]
    fn proof_must_match_caller() {
        let mut f = fixture(1_000);
        let bundle = f
            .cop
            .encrypt_inputs(&f.distributor.address(), &addr(2), &[1])
            .unwrap();
        let mut ctx = CallContext::new(addr(5), &f.cop, &mut f.acl, 2);
        let err = f
            .distributor
            .batch_distribute_encrypted(&mut ctx, &mut f.token, &[addr(3)], &bundle)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidProof);
    }

    #[test]
    fn uncovered_batch_reports_insufficient_balance() {
        let mut f = fixture(250);
        let caller = addr(2);
        let bundle = f
            .cop
            .encrypt_inputs(&f.distributor.address(), &caller, &[100, 200])
            .unwrap();
        let mut ctx = CallContext::new(caller, &f.cop, &mut f.acl, 2);
        let err = f
            .distributor
            .batch_distribute_encrypted(&mut ctx, &mut f.token, &[addr(3), addr(4)], &bundle)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut f = fixture(10);
        let caller = addr(2);
        let bundle = f
            .cop
            .encrypt_inputs(&f.distributor.address(), &caller, &[])
            .unwrap();
        let mut ctx = CallContext::new(caller, &f.cop, &mut f.acl, 2);
        f.distributor
            .batch_distribute_encrypted(&mut ctx, &mut f.token, &[], &bundle)
            .unwrap();
        assert_eq!(balance(&f, f.distributor.address()), 10);
    }
}
