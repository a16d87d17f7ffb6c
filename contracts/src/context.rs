//! Execution context handed to every contract call.

use shroud_protocol::address::Address;
use shroud_protocol::codec::CiphertextHandle;
use shroud_protocol::fhe::{Acl, HomomorphicBackend};

/// Who is calling, with which coprocessor, against which ACL.
///
/// The ACL is borrowed from the state being executed against, so a call
/// that fails leaves no permissions behind once that state is discarded.
pub struct CallContext<'a> {
    /// Immediate caller: an account, or a contract in a nested call.
    pub sender: Address,
    /// Account that signed the transaction.
    pub origin: Address,
    pub backend: &'a dyn HomomorphicBackend,
    pub acl: &'a mut Acl,
    pub block_number: u64,
}

impl<'a> CallContext<'a> {
    pub fn new(
        origin: Address,
        backend: &'a dyn HomomorphicBackend,
        acl: &'a mut Acl,
        block_number: u64,
    ) -> Self {
        Self {
            sender: origin,
            origin,
            backend,
            acl,
            block_number,
        }
    }

    /// Context for a call made by contract `caller` on behalf of this one.
    pub fn nested(&mut self, caller: Address) -> CallContext<'_> {
        CallContext {
            sender: caller,
            origin: self.origin,
            backend: self.backend,
            acl: &mut *self.acl,
            block_number: self.block_number,
        }
    }

    pub fn allow(&mut self, handle: impl Into<CiphertextHandle>, account: Address) {
        self.acl.allow(handle.into(), account);
    }

    pub fn is_allowed(&self, handle: impl Into<CiphertextHandle>, account: &Address) -> bool {
        self.acl.is_allowed(&handle.into(), account)
    }
}
