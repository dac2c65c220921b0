//! Adapter configuration.

use serde::{Deserialize, Serialize};

use substor_core::ModuleLayout;

use crate::error::{Error, Result};

/// What "success" means for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMode {
    /// Success once the transaction pool accepts the transaction.
    /// The write may still fail at dispatch; callers needing durability poll.
    #[default]
    Pool,
    /// Success once the transaction is included and its call succeeded.
    InBlock,
}

/// How to treat a signing account that has no state on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsentAccountPolicy {
    /// An account the ledger has never seen has nonce 0.
    #[default]
    AssumeZero,
    /// Fail the write with `NotFound`.
    Reject,
}

/// Configuration for [`LedgerStore`](crate::LedgerStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Names of the metadata module and system pallet.
    pub layout: ModuleLayout,
    /// When writes report success.
    pub submission: SubmissionMode,
    /// Nonce policy for accounts without state.
    pub absent_account: AbsentAccountPolicy,
    /// Keys requested per page when enumerating a namespace.
    pub key_page_size: u32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            layout: ModuleLayout::default(),
            submission: SubmissionMode::Pool,
            absent_account: AbsentAccountPolicy::AssumeZero,
            key_page_size: 256,
        }
    }
}

impl AdapterConfig {
    /// Check values that have no sensible interpretation.
    pub fn validate(&self) -> Result<()> {
        if self.key_page_size == 0 {
            return Err(Error::Config("key_page_size must be at least 1".into()));
        }
        let layout = &self.layout;
        for (field, value) in [
            ("pallet", &layout.pallet),
            ("storage_item", &layout.storage_item),
            ("system_pallet", &layout.system_pallet),
            ("account_item", &layout.account_item),
        ] {
            if value.is_empty() {
                return Err(Error::Config(format!("layout.{} must not be empty", field)));
            }
        }
        Ok(())
    }
}
