//! # Confidential Token
//!
//! A fungible token whose balances are ciphertext handles. The contract
//! never sees an amount in the clear except the public parameter of a mint.
//!
//! ## Transfer semantics
//!
//! A transfer computes `ok = amount <= balance(from)` under encryption and
//! applies
//!
//! ```text
//! balance(from) = select(ok, balance(from) - amount, balance(from))
//! balance(to)   = select(ok, balance(to)   + amount, balance(to))
//! ```
//!
//! so an insufficient balance silently moves nothing. [`ConfidentialToken::transfer_guarded`]
//! hands `ok` back to the caller instead of revealing it, which is how the
//! distributor makes a whole batch succeed or fail together.
//!
//! Every new balance handle is allowed to its owner and to the token.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use shroud_protocol::address::Address;
use shroud_protocol::codec::{CiphertextBundle, CiphertextHandle};
use shroud_protocol::config::{TOKEN_DECIMALS, TOKEN_NAME, TOKEN_SYMBOL};
use shroud_protocol::error::{ErrorKind, ProtocolError};
use shroud_protocol::fhe::{CoprocessorError, Ebool, Euint64, OverflowPolicy};
use shroud_protocol::Amount;

use crate::context::CallContext;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the confidential ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The caller holds no minting role.
    #[error("{caller} is not allowed to mint")]
    NotMinter { caller: Address },

    /// Only the owner may manage roles.
    #[error("{caller} is not the token owner")]
    NotOwner { caller: Address },

    /// The caller tried to move funds it does not own.
    #[error("{caller} cannot move funds of {from}")]
    NotHolder { caller: Address, from: Address },

    /// The caller has no ACL rights on the amount it tried to spend.
    #[error("{caller} holds no rights on ciphertext {handle}")]
    HandleNotAllowed {
        caller: Address,
        handle: CiphertextHandle,
    },

    /// A guarded transfer could not be applied.
    #[error("insufficient encrypted balance")]
    InsufficientBalance,

    /// A mint would push a balance or the supply past `u64::MAX`.
    #[error("mint would exceed the 64-bit amount domain")]
    Overflow,

    #[error(transparent)]
    Coprocessor(#[from] CoprocessorError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotMinter { .. }
            | LedgerError::NotOwner { .. }
            | LedgerError::NotHolder { .. }
            | LedgerError::HandleNotAllowed { .. } => ErrorKind::Unauthorized,
            LedgerError::InsufficientBalance => ErrorKind::InsufficientBalance,
            LedgerError::Overflow => ErrorKind::Overflow,
            LedgerError::Coprocessor(CoprocessorError::Unreachable(_)) => ErrorKind::NetworkFailure,
            LedgerError::Coprocessor(_) => ErrorKind::InvalidProof,
        }
    }
}

impl From<LedgerError> for ProtocolError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientBalance => ProtocolError::InsufficientBalance,
            LedgerError::Overflow => ProtocolError::Overflow,
            LedgerError::Coprocessor(inner) => inner.into(),
            other => ProtocolError::Unauthorized(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Who may call `mint`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MintPolicy {
    /// The owner and explicitly added minters.
    #[default]
    Restricted,
    /// Anyone. Used by faucets on development networks.
    Open,
}

/// Public metadata of the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    /// Display precision. The ledger only deals in raw units.
    pub decimals: u32,
}

impl Default for TokenMetadata {
    fn default() -> Self {
        Self {
            name: TOKEN_NAME.to_string(),
            symbol: TOKEN_SYMBOL.to_string(),
            decimals: TOKEN_DECIMALS,
        }
    }
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConfidentialToken {
    address: Address,
    owner: Address,
    metadata: TokenMetadata,
    mint_policy: MintPolicy,
    minters: HashSet<Address>,
    balances: HashMap<Address, Euint64>,
    total_supply: Option<Euint64>,
}

impl ConfidentialToken {
    pub fn new(address: Address, owner: Address, mint_policy: MintPolicy) -> Self {
        Self {
            address,
            owner,
            metadata: TokenMetadata::default(),
            mint_policy,
            minters: HashSet::new(),
            balances: HashMap::new(),
            total_supply: None,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    pub fn mint_policy(&self) -> MintPolicy {
        self.mint_policy
    }

    pub fn is_minter(&self, account: &Address) -> bool {
        self.mint_policy == MintPolicy::Open
            || *account == self.owner
            || self.minters.contains(account)
    }

    /// Grants the minting role. Owner only.
    pub fn add_minter(&mut self, ctx: &CallContext<'_>, account: Address) -> Result<(), LedgerError> {
        if ctx.sender != self.owner {
            return Err(LedgerError::NotOwner { caller: ctx.sender });
        }
        self.minters.insert(account);
        info!(minter = %account, "minter added");
        Ok(())
    }

    /// Current balance handle of `account`, or the zero handle if it never
    /// held a balance.
    pub fn confidential_balance_of(&self, account: &Address) -> CiphertextHandle {
        self.balances
            .get(account)
            .map(|b| b.handle())
            .unwrap_or(CiphertextHandle::ZERO)
    }

    pub fn confidential_total_supply(&self) -> CiphertextHandle {
        self.total_supply
            .map(|s| s.handle())
            .unwrap_or(CiphertextHandle::ZERO)
    }

    /// Number of accounts that have ever held a balance.
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// Creates `amount` new units for `to` and returns `to`'s new balance
    /// handle.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotMinter`] if the caller holds no minting
    /// role, and [`LedgerError::Overflow`] if the backend's overflow policy
    /// is `Revert` and the balance or supply would leave the `u64` domain.
    pub fn mint(
        &mut self,
        ctx: &mut CallContext<'_>,
        to: Address,
        amount: Amount,
    ) -> Result<CiphertextHandle, LedgerError> {
        if !self.is_minter(&ctx.sender) {
            return Err(LedgerError::NotMinter { caller: ctx.sender });
        }

        let backend = ctx.backend;
        let balance = self.balance_or_zero(ctx, &to)?;
        let supply = match self.total_supply {
            Some(s) => s,
            None => backend.trivial_encrypt(0)?,
        };
        let requested = backend.trivial_encrypt(amount.raw())?;

        let minted = match backend.overflow_policy() {
            OverflowPolicy::Clamp => {
                // Balances never exceed the supply, so supply headroom
                // bounds both.
                let max = backend.trivial_encrypt(u64::MAX)?;
                let headroom = backend.sub(max, supply)?;
                let fits = backend.le(requested, headroom)?;
                backend.select(fits, requested, headroom)?
            }
            OverflowPolicy::Revert | OverflowPolicy::Wrap => requested,
        };

        let new_balance = backend.add(balance, minted)?;
        let new_supply = backend.add(supply, minted)?;

        if backend.overflow_policy() == OverflowPolicy::Revert {
            let balance_ok = backend.le(balance, new_balance)?;
            let supply_ok = backend.le(supply, new_supply)?;
            let ok = backend.and(balance_ok, supply_ok)?;
            if !backend.reveal_guard(ok)? {
                return Err(LedgerError::Overflow);
            }
        }

        self.set_balance(ctx, to, new_balance);
        self.total_supply = Some(new_supply);
        ctx.allow(new_supply, self.address);
        ctx.allow(new_supply, self.owner);

        info!(to = %to, minter = %ctx.sender, balance = %new_balance.handle(), "minted");
        Ok(new_balance.handle())
    }

    /// Moves an encrypted amount from the caller to `to`, reverting with
    /// `InsufficientBalance` if the caller cannot cover it.
    pub fn transfer_encrypted(
        &mut self,
        ctx: &mut CallContext<'_>,
        to: Address,
        amount: Euint64,
    ) -> Result<(), LedgerError> {
        let from = ctx.sender;
        let ok = self.transfer_guarded(ctx, from, to, amount)?;
        if !ctx.backend.reveal_guard(ok)? {
            return Err(LedgerError::InsufficientBalance);
        }
        Ok(())
    }

    /// [`transfer_encrypted`](Self::transfer_encrypted) with a fresh client
    /// input. The bundle must hold exactly one handle, proven for this token
    /// and the caller.
    pub fn transfer_encrypted_input(
        &mut self,
        ctx: &mut CallContext<'_>,
        to: Address,
        bundle: &CiphertextBundle,
    ) -> Result<(), LedgerError> {
        let verified = ctx.backend.verify_input(bundle, &self.address, &ctx.sender)?;
        let amount = match verified.as_slice() {
            [single] => *single,
            other => {
                return Err(CoprocessorError::InvalidProof(format!(
                    "expected one amount, got {}",
                    other.len()
                ))
                .into())
            }
        };
        let sender = ctx.sender;
        ctx.allow(amount, sender);
        self.transfer_encrypted(ctx, to, amount)
    }

    /// Applies a guarded transfer from `from` to `to` and returns the
    /// encrypted success flag without revealing it.
    ///
    /// The caller must be `from` and must be allowed on `amount`.
    pub fn transfer_guarded(
        &mut self,
        ctx: &mut CallContext<'_>,
        from: Address,
        to: Address,
        amount: Euint64,
    ) -> Result<Ebool, LedgerError> {
        if ctx.sender != from {
            return Err(LedgerError::NotHolder {
                caller: ctx.sender,
                from,
            });
        }
        if !ctx.is_allowed(amount, &ctx.sender) {
            return Err(LedgerError::HandleNotAllowed {
                caller: ctx.sender,
                handle: amount.handle(),
            });
        }

        let backend = ctx.backend;
        let from_balance = self.balance_or_zero(ctx, &from)?;
        let ok = backend.le(amount, from_balance)?;
        let debited = backend.sub(from_balance, amount)?;
        let new_from = backend.select(ok, debited, from_balance)?;
        self.set_balance(ctx, from, new_from);

        // Read after the debit so a self-transfer nets to zero.
        let to_balance = self.balance_or_zero(ctx, &to)?;
        let credited = backend.add(to_balance, amount)?;
        let new_to = backend.select(ok, credited, to_balance)?;
        self.set_balance(ctx, to, new_to);

        debug!(from = %from, to = %to, "guarded transfer applied");
        Ok(ok)
    }

    fn balance_or_zero(
        &self,
        ctx: &CallContext<'_>,
        account: &Address,
    ) -> Result<Euint64, LedgerError> {
        match self.balances.get(account) {
            Some(b) => Ok(*b),
            None => Ok(ctx.backend.trivial_encrypt(0)?),
        }
    }

    fn set_balance(&mut self, ctx: &mut CallContext<'_>, account: Address, value: Euint64) {
        ctx.allow(value, account);
        ctx.allow(value, self.address);
        self.balances.insert(account, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_protocol::fhe::mock::MockCoprocessor;
    use shroud_protocol::fhe::{Acl, HomomorphicBackend};

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    const TOKEN: u8 = 0x70;
    const OWNER: u8 = 0x01;

    fn plain(cop: &MockCoprocessor, h: CiphertextHandle) -> u64 {
        if h.is_zero() {
            0
        } else {
            cop.plaintext(&h).unwrap()
        }
    }

    #[test]
    fn unknown_accounts_read_as_zero_handle() {
        let token = ConfidentialToken::new(addr(TOKEN), addr(OWNER), MintPolicy::Restricted);
        assert!(token.confidential_balance_of(&addr(9)).is_zero());
        assert!(token.confidential_total_supply().is_zero());
    }

    #[test]
    fn mint_requires_role() {
        let cop = MockCoprocessor::new();
        let mut acl = Acl::new();
        let mut token = ConfidentialToken::new(addr(TOKEN), addr(OWNER), MintPolicy::Restricted);

        let mut ctx = CallContext::new(addr(2), &cop, &mut acl, 1);
        let err = token.mint(&mut ctx, addr(2), Amount::from_raw(5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(token.holder_count(), 0);

        let mut ctx = CallContext::new(addr(OWNER), &cop, &mut acl, 1);
        token.add_minter(&ctx, addr(2)).unwrap();
        token.mint(&mut ctx, addr(3), Amount::from_raw(5)).unwrap();
        let mut ctx = CallContext::new(addr(2), &cop, &mut acl, 2);
        token.mint(&mut ctx, addr(2), Amount::from_raw(7)).unwrap();

        assert_eq!(plain(&cop, token.confidential_balance_of(&addr(3))), 5);
        assert_eq!(plain(&cop, token.confidential_total_supply()), 12);
    }

    #[test]
    fn open_policy_lets_anyone_mint() {
        let cop = MockCoprocessor::new();
        let mut acl = Acl::new();
        let mut token = ConfidentialToken::new(addr(TOKEN), addr(OWNER), MintPolicy::Open);
        let mut ctx = CallContext::new(addr(4), &cop, &mut acl, 1);
        token.mint(&mut ctx, addr(4), Amount::from_raw(100)).unwrap();

        let handle = token.confidential_balance_of(&addr(4));
        assert!(acl.is_allowed(&handle, &addr(4)));
        assert!(acl.is_allowed(&handle, &addr(TOKEN)));
        assert!(!acl.is_allowed(&handle, &addr(OWNER)));
    }

    #[test]
    fn transfer_moves_funds_and_issues_new_handles() {
        let cop = MockCoprocessor::new();
        let mut acl = Acl::new();
        let mut token = ConfidentialToken::new(addr(TOKEN), addr(OWNER), MintPolicy::Restricted);
        let mut ctx = CallContext::new(addr(OWNER), &cop, &mut acl, 1);
        token.mint(&mut ctx, addr(OWNER), Amount::from_raw(50)).unwrap();
        let before = token.confidential_balance_of(&addr(OWNER));

        let amount = cop.trivial_encrypt(20).unwrap();
        ctx.allow(amount, addr(OWNER));
        token.transfer_encrypted(&mut ctx, addr(5), amount).unwrap();

        let after = token.confidential_balance_of(&addr(OWNER));
        assert_ne!(before, after);
        assert_eq!(plain(&cop, after), 30);
        assert_eq!(plain(&cop, token.confidential_balance_of(&addr(5))), 20);
        // Old handles stay readable.
        assert_eq!(plain(&cop, before), 50);
    }

    #[test]
    fn insufficient_transfer_reverts() {
        let cop = MockCoprocessor::new();
        let mut acl = Acl::new();
        let mut token = ConfidentialToken::new(addr(TOKEN), addr(OWNER), MintPolicy::Restricted);
        let mut ctx = CallContext::new(addr(OWNER), &cop, &mut acl, 1);
        token.mint(&mut ctx, addr(OWNER), Amount::from_raw(10)).unwrap();

        let amount = cop.trivial_encrypt(11).unwrap();
        ctx.allow(amount, addr(OWNER));
        let err = token.transfer_encrypted(&mut ctx, addr(5), amount).unwrap_err();
        assert_eq!(err, LedgerError::InsufficientBalance);
    }

    #[test]
    fn spending_requires_acl_rights_on_amount() {
        let cop = MockCoprocessor::new();
        let mut acl = Acl::new();
        let mut token = ConfidentialToken::new(addr(TOKEN), addr(OWNER), MintPolicy::Restricted);
        let mut ctx = CallContext::new(addr(OWNER), &cop, &mut acl, 1);
        token.mint(&mut ctx, addr(OWNER), Amount::from_raw(10)).unwrap();

        let amount = cop.trivial_encrypt(1).unwrap();
        let err = token.transfer_encrypted(&mut ctx, addr(5), amount).unwrap_err();
        assert!(matches!(err, LedgerError::HandleNotAllowed { .. }));
    }

    #[test]
    fn cannot_debit_someone_else() {
        let cop = MockCoprocessor::new();
        let mut acl = Acl::new();
        let mut token = ConfidentialToken::new(addr(TOKEN), addr(OWNER), MintPolicy::Restricted);
        let mut ctx = CallContext::new(addr(6), &cop, &mut acl, 1);
        let amount = cop.trivial_encrypt(1).unwrap();
        ctx.allow(amount, addr(6));
        let err = token
            .transfer_guarded(&mut ctx, addr(OWNER), addr(6), amount)
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotHolder { .. }));
    }

    #[test]
    fn self_transfer_preserves_balance() {
        let cop = MockCoprocessor::new();
        let mut acl = Acl::new();
        let mut token = ConfidentialToken::new(addr(TOKEN), addr(OWNER), MintPolicy::Restricted);
        let mut ctx = CallContext::new(addr(OWNER), &cop, &mut acl, 1);
        token.mint(&mut ctx, addr(OWNER), Amount::from_raw(10)).unwrap();
        let amount = cop.trivial_encrypt(4).unwrap();
        ctx.allow(amount, addr(OWNER));
        token.transfer_encrypted(&mut ctx, addr(OWNER), amount).unwrap();
        assert_eq!(plain(&cop, token.confidential_balance_of(&addr(OWNER))), 10);
    }

    #[test]
    fn mint_returns_the_new_balance_handle() {
        let cop = MockCoprocessor::new();
        let mut acl = Acl::new();
        let mut token = ConfidentialToken::new(addr(TOKEN), addr(OWNER), MintPolicy::Restricted);
        let mut ctx = CallContext::new(addr(OWNER), &cop, &mut acl, 1);

        let first = token.mint(&mut ctx, addr(2), Amount::from_raw(30)).unwrap();
        assert_eq!(first, token.confidential_balance_of(&addr(2)));
        assert_eq!(plain(&cop, first), 30);

        let second = token.mint(&mut ctx, addr(2), Amount::from_raw(12)).unwrap();
        assert_ne!(second, first);
        assert_eq!(second, token.confidential_balance_of(&addr(2)));
        assert_eq!(plain(&cop, second), 42);
        assert!(ctx.is_allowed(second, &addr(2)));
    }

    #[test]
    fn overflow_policies() {
        let near_max = Amount::from_raw(u64::MAX - 5);

        let cop = MockCoprocessor::with_policy(OverflowPolicy::Revert);
        let mut acl = Acl::new();
        let mut token = ConfidentialToken::new(addr(TOKEN), addr(OWNER), MintPolicy::Restricted);
        let mut ctx = CallContext::new(addr(OWNER), &cop, &mut acl, 1);
        token.mint(&mut ctx, addr(2), near_max).unwrap();
        let err = token.mint(&mut ctx, addr(3), Amount::from_raw(10)).unwrap_err();
        assert_eq!(err, LedgerError::Overflow);
        assert_eq!(plain(&cop, token.confidential_total_supply()), u64::MAX - 5);

        let cop = MockCoprocessor::with_policy(OverflowPolicy::Clamp);
        let mut acl = Acl::new();
        let mut token = ConfidentialToken::new(addr(TOKEN), addr(OWNER), MintPolicy::Restricted);
        let mut ctx = CallContext::new(addr(OWNER), &cop, &mut acl, 1);
        token.mint(&mut ctx, addr(2), near_max).unwrap();
        token.mint(&mut ctx, addr(3), Amount::from_raw(10)).unwrap();
        assert_eq!(plain(&cop, token.confidential_balance_of(&addr(3))), 5);
        assert_eq!(plain(&cop, token.confidential_total_supply()), u64::MAX);

        let cop = MockCoprocessor::with_policy(OverflowPolicy::Wrap);
        let mut acl = Acl::new();
        let mut token = ConfidentialToken::new(addr(TOKEN), addr(OWNER), MintPolicy::Restricted);
        let mut ctx = CallContext::new(addr(OWNER), &cop, &mut acl, 1);
        token.mint(&mut ctx, addr(2), near_max).unwrap();
        token.mint(&mut ctx, addr(2), Amount::from_raw(10)).unwrap();
        assert_eq!(plain(&cop, token.confidential_balance_of(&addr(2))), 4);
    }
}
