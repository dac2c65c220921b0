//! Building, signing and submitting metadata transactions.

use tracing::{debug, trace};

use substor_core::{
    AccountNonce, MetaCall, PendingExtrinsic, SignedExtrinsic, TransactionSigner, TxHash,
};
use substor_node::{InclusionReceipt, LedgerNode};

use crate::error::{Error, Result};
use crate::session::ChainSession;

/// Turns metadata calls into signed transactions and hands them to the node.
///
/// Every transaction is immortal and carries a zero tip. Submission is never
/// retried: a rejection is returned as-is so the caller can decide whether
/// to refetch the nonce and try again.
pub struct ExtrinsicBuilder<'a> {
    node: &'a dyn LedgerNode,
    session: &'a ChainSession,
    signer: &'a dyn TransactionSigner,
}

impl<'a> ExtrinsicBuilder<'a> {
    pub fn new(
        node: &'a dyn LedgerNode,
        session: &'a ChainSession,
        signer: &'a dyn TransactionSigner,
    ) -> Self {
        Self {
            node,
            session,
            signer,
        }
    }

    /// Resolve the call against the session's runtime schema.
    pub fn build(&self, call: MetaCall) -> PendingExtrinsic {
        let index = self.session.call_index(call.kind());
        PendingExtrinsic::new(call, index)
    }

    /// Sign for this chain at `nonce`.
    pub fn sign(&self, pending: PendingExtrinsic, nonce: AccountNonce) -> Result<SignedExtrinsic> {
        pending
            .sign(self.signer, &self.session.signing_context(), nonce)
            .map_err(Error::Signing)
    }

    /// Submit to the pool.
    pub async fn submit(&self, extrinsic: &SignedExtrinsic) -> Result<TxHash> {
        let hash = self
            .node
            .submit(extrinsic)
            .await
            .map_err(Error::Submission)?;
        trace!(tx = %hash, nonce = extrinsic.extra.nonce, "Transaction accepted by pool");
        Ok(hash)
    }

    /// Submit and wait for inclusion. The receipt carries the dispatch outcome.
    pub async fn submit_and_watch(&self, extrinsic: &SignedExtrinsic) -> Result<InclusionReceipt> {
        let receipt = self
            .node
            .submit_and_watch(extrinsic)
            .await
            .map_err(Error::Submission)?;
        debug!(
            tx = %receipt.tx_hash,
            block = receipt.block_number,
            success = receipt.outcome.is_success(),
            "Transaction included"
        );
        Ok(receipt)
    }
}
