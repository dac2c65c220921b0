//! The slice of runtime metadata the adapter resolves names against.
//!
//! The full metadata format is owned by the runtime; nodes hand over this
//! reduced view (pallet indices, call indices, storage item names) plus the
//! raw metadata bytes they fetched.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::extrinsic::CallIndex;

/// A dispatchable call of a pallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSchema {
    pub name: String,
    pub index: u8,
}

/// A pallet: its index in the runtime, its calls and its storage items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PalletSchema {
    pub name: String,
    pub index: u8,
    pub calls: Vec<CallSchema>,
    pub storage: Vec<String>,
}

impl PalletSchema {
    /// Create a pallet with no calls and no storage.
    pub fn new(name: impl Into<String>, index: u8) -> Self {
        Self {
            name: name.into(),
            index,
            calls: Vec::new(),
            storage: Vec::new(),
        }
    }

    /// Declare a call.
    pub fn call(mut self, name: impl Into<String>, index: u8) -> Self {
        self.calls.push(CallSchema {
            name: name.into(),
            index,
        });
        self
    }

    /// Declare a storage item.
    pub fn storage_item(mut self, name: impl Into<String>) -> Self {
        self.storage.push(name.into());
        self
    }
}

/// The runtime type schema of a chain, as seen by the adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSchema {
    /// Raw metadata bytes as returned by the node. Opaque here.
    pub metadata: Vec<u8>,
    /// Pallets known to the runtime.
    pub pallets: Vec<PalletSchema>,
}

impl RuntimeSchema {
    /// Create a schema from pallets.
    pub fn new(metadata: Vec<u8>, pallets: Vec<PalletSchema>) -> Self {
        Self { metadata, pallets }
    }

    /// Look up a pallet by name.
    pub fn pallet(&self, name: &str) -> Option<&PalletSchema> {
        self.pallets.iter().find(|p| p.name == name)
    }

    /// Resolve `pallet.call` to its two-byte call index.
    pub fn call_index(&self, pallet: &str, call: &str) -> Result<CallIndex> {
        let p = self
            .pallet(pallet)
            .ok_or_else(|| CoreError::UnknownPallet(pallet.to_string()))?;
        let c = p
            .calls
            .iter()
            .find(|c| c.name == call)
            .ok_or_else(|| CoreError::UnknownCall {
                pallet: pallet.to_string(),
                call: call.to_string(),
            })?;
        Ok(CallIndex {
            pallet: p.index,
            call: c.index,
        })
    }

    /// Ensure `pallet.item` is a declared storage item.
    pub fn ensure_storage(&self, pallet: &str, item: &str) -> Result<()> {
        let p = self
            .pallet(pallet)
            .ok_or_else(|| CoreError::UnknownPallet(pallet.to_string()))?;
        if p.storage.iter().any(|s| s == item) {
            Ok(())
        } else {
            Err(CoreError::UnknownStorage {
                pallet: pallet.to_string(),
                item: item.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> RuntimeSchema {
        RuntimeSchema::new(
            Vec::new(),
            vec![
                PalletSchema::new("System", 0).storage_item("Account"),
                PalletSchema::new("TemplateModule", 8)
                    .call("set_metadata", 0)
                    .call("delete_metadata", 1)
                    .storage_item("MetaStor"),
            ],
        )
    }

    #[test]
    fn test_call_index_resolution() {
        let idx = schema().call_index("TemplateModule", "delete_metadata").unwrap();
        assert_eq!(idx, CallIndex { pallet: 8, call: 1 });
    }

    #[test]
    fn test_unknown_pallet_and_call() {
        let s = schema();
        assert!(matches!(
            s.call_index("Balances", "transfer"),
            Err(CoreError::UnknownPallet(_))
        ));
        assert!(matches!(
            s.call_index("TemplateModule", "update_metadata"),
            Err(CoreError::UnknownCall { .. })
        ));
    }

    #[test]
    fn test_ensure_storage() {
        let s = schema();
        assert!(s.ensure_storage("System", "Account").is_ok());
        assert!(matches!(
            s.ensure_storage("TemplateModule", "Other"),
            Err(CoreError::UnknownStorage { .. })
        ));
    }
}
