//! Names of the on-chain module the metadata lives in.

use serde::{Deserialize, Serialize};

/// Where the metadata module lives in the runtime, by name.
///
/// Names are resolved to indices through the runtime schema at session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleLayout {
    /// Pallet name as declared in the runtime (storage prefix and call pallet).
    pub pallet: String,
    /// Storage item holding the metadata double map.
    pub storage_item: String,
    /// Call inserting a new key.
    pub set_call: String,
    /// Call removing a key.
    pub delete_call: String,
    /// Call replacing the value of an existing key.
    pub update_call: String,
    /// Pallet holding account nonces.
    pub system_pallet: String,
    /// Storage item holding account info.
    pub account_item: String,
}

impl Default for ModuleLayout {
    fn default() -> Self {
        Self {
            pallet: "TemplateModule".to_string(),
            storage_item: "MetaStor".to_string(),
            set_call: "set_metadata".to_string(),
            delete_call: "delete_metadata".to_string(),
            update_call: "update_metadata".to_string(),
            system_pallet: "System".to_string(),
            account_item: "Account".to_string(),
        }
    }
}
