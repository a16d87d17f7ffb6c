//! Access control over ciphertext handles.
//!
//! A handle can be used in a computation, or decrypted for a user, only by
//! the addresses allowed on it. The ledger allows every fresh balance handle
//! to its owner and to the token contract; the distributor allows verified
//! input handles to itself before spending them.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::codec::CiphertextHandle;

/// Read access to an ACL. The decryption side only ever reads it.
pub trait AclView: Send + Sync {
    fn is_allowed(&self, handle: &CiphertextHandle, account: &Address) -> bool;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Acl {
    entries: HashMap<CiphertextHandle, HashSet<Address>>,
}

impl Acl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows `account` on `handle`. Idempotent.
    pub fn allow(&mut self, handle: CiphertextHandle, account: Address) {
        self.entries.entry(handle).or_default().insert(account);
    }

    pub fn is_allowed(&self, handle: &CiphertextHandle, account: &Address) -> bool {
        self.entries
            .get(handle)
            .map_or(false, |allowed| allowed.contains(account))
    }

    /// Number of handles with at least one allowed address.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AclView for Acl {
    fn is_allowed(&self, handle: &CiphertextHandle, account: &Address) -> bool {
        Acl::is_allowed(self, handle, account)
    }
}
