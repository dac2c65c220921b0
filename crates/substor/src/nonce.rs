//! Account nonce lookup.

use tracing::{debug, trace};

use substor_core::{AccountId, AccountNonce, StorageKeyCodec};
use substor_node::LedgerNode;

use crate::error::{Error, Result};
use crate::session::ChainSession;

/// Reads the next nonce of a signing account from chain state.
///
/// Nothing is cached: every call reads `System.Account` at the best block,
/// so transactions still in the pool are not accounted for. Two writers
/// that fetch concurrently get the same nonce and only one submission wins.
pub struct NonceSequencer<'a> {
    node: &'a dyn LedgerNode,
    session: &'a ChainSession,
}

impl<'a> NonceSequencer<'a> {
    pub fn new(node: &'a dyn LedgerNode, session: &'a ChainSession) -> Self {
        Self { node, session }
    }

    /// The nonce the next transaction of `account` must carry.
    ///
    /// Returns `NotFound` if the ledger holds no state for the account.
    pub async fn next_nonce(&self, account: &AccountId) -> Result<AccountNonce> {
        let address = self.session.codec().account_address(account);
        let raw = self
            .node
            .storage(&address, None)
            .await
            .map_err(Error::ChainQuery)?;

        match raw {
            Some(bytes) => {
                let nonce = StorageKeyCodec::decode_account_nonce(&bytes).map_err(Error::Encoding)?;
                trace!(%account, %nonce, "Fetched account nonce");
                Ok(nonce)
            }
            None => {
                debug!(%account, "Signing account has no state on the ledger");
                Err(Error::NotFound)
            }
        }
    }
}
