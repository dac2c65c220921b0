//! Runtime metadata decoding.
//!
//! Nodes serve the runtime's metadata as a SCALE blob: the `meta` magic, a
//! format version, then the pallet list with a portable type registry. Only
//! what the adapter resolves names against is kept: pallet indices, call
//! variant indices and storage item names. Formats 14 and 15 are understood.

use frame_metadata::{RuntimeMetadata, RuntimeMetadataPrefixed, META_RESERVED};
use parity_scale_codec::Decode;
use scale_info::{PortableRegistry, TypeDef};

use substor_core::{PalletSchema, RuntimeSchema};

use crate::error::{NodeError, Result};

/// Decode `metadata` into the schema the adapter resolves names against.
///
/// The raw bytes are kept on the returned schema.
pub fn decode_runtime_schema(metadata: Vec<u8>) -> Result<RuntimeSchema> {
    let prefixed = RuntimeMetadataPrefixed::decode(&mut metadata.as_slice())
        .map_err(|e| NodeError::Decode(format!("runtime metadata: {}", e)))?;
    if prefixed.0 != META_RESERVED {
        return Err(NodeError::Decode(format!(
            "runtime metadata: bad magic {:#010x}",
            prefixed.0
        )));
    }

    let pallets = match &prefixed.1 {
        RuntimeMetadata::V14(m) => m
            .pallets
            .iter()
            .map(|p| {
                let storage = p.storage.iter().flat_map(|s| s.entries.iter());
                pallet_schema(
                    &p.name,
                    p.index,
                    p.calls.as_ref().map(|c| c.ty.id),
                    storage.map(|e| e.name.as_str()),
                    &m.types,
                )
            })
            .collect::<Result<Vec<_>>>()?,
        RuntimeMetadata::V15(m) => m
            .pallets
            .iter()
            .map(|p| {
                let storage = p.storage.iter().flat_map(|s| s.entries.iter());
                pallet_schema(
                    &p.name,
                    p.index,
                    p.calls.as_ref().map(|c| c.ty.id),
                    storage.map(|e| e.name.as_str()),
                    &m.types,
                )
            })
            .collect::<Result<Vec<_>>>()?,
        _ => {
            return Err(NodeError::Unsupported(
                "runtime metadata older than format 14".into(),
            ))
        }
    };

    Ok(RuntimeSchema::new(metadata, pallets))
}

fn pallet_schema<'a>(
    name: &str,
    index: u8,
    calls: Option<u32>,
    storage: impl Iterator<Item = &'a str>,
    types: &PortableRegistry,
) -> Result<PalletSchema> {
    let mut pallet = PalletSchema::new(name, index);

    if let Some(id) = calls {
        let ty = types
            .resolve(id)
            .ok_or_else(|| NodeError::Decode(format!("{}: call type {} not in registry", name, id)))?;
        let TypeDef::Variant(variants) = &ty.type_def else {
            return Err(NodeError::Decode(format!("{}: call type is not an enum", name)));
        };
        for variant in &variants.variants {
            pallet = pallet.call(variant.name.as_str(), variant.index);
        }
    }

    for item in storage {
        pallet = pallet.storage_item(item);
    }
    Ok(pallet)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use frame_metadata::v14::{
        ExtrinsicMetadata, PalletCallMetadata, PalletMetadata, PalletStorageMetadata,
        RuntimeMetadataV14, StorageEntryMetadata, StorageEntryModifier, StorageEntryType,
        StorageHasher,
    };
    use parity_scale_codec::Encode;
    use scale_info::{meta_type, TypeInfo};
    use substor_core::{CallIndex, CoreError};

    #[allow(non_camel_case_types, dead_code)]
    #[derive(TypeInfo)]
    enum TemplateCall {
        #[codec(index = 3)]
        set_metadata {
            namespace: Vec<u8>,
            key: Vec<u8>,
            metadata: Vec<u8>,
        },
        #[codec(index = 4)]
        delete_metadata { namespace: Vec<u8>, key: Vec<u8> },
        #[codec(index = 7)]
        update_metadata {
            namespace: Vec<u8>,
            key: Vec<u8>,
            metadata: Vec<u8>,
        },
    }

    #[allow(non_camel_case_types, dead_code)]
    #[derive(TypeInfo)]
    enum LegacyTemplateCall {
        #[codec(index = 0)]
        set_metadata {
            namespace: Vec<u8>,
            key: Vec<u8>,
            metadata: Vec<u8>,
        },
        #[codec(index = 1)]
        delete_metadata { namespace: Vec<u8>, key: Vec<u8> },
    }

    #[allow(dead_code)]
    #[derive(TypeInfo)]
    struct UncheckedExtrinsic(Vec<u8>);

    #[allow(dead_code)]
    #[derive(TypeInfo)]
    struct Runtime;

    fn map_entry(name: &'static str, hashers: Vec<StorageHasher>) -> StorageEntryMetadata {
        StorageEntryMetadata {
            name,
            modifier: StorageEntryModifier::Optional,
            ty: StorageEntryType::Map {
                hashers,
                key: meta_type::<Vec<u8>>(),
                value: meta_type::<(Vec<u8>, AccountIdBytes)>(),
            },
            default: Vec::new(),
            docs: Vec::new(),
        }
    }

    #[allow(dead_code)]
    #[derive(TypeInfo)]
    struct AccountIdBytes([u8; 32]);

    fn encode_metadata(template_index: u8, calls: PalletCallMetadata) -> Vec<u8> {
        let system = PalletMetadata {
            name: "System",
            storage: Some(PalletStorageMetadata {
                prefix: "System",
                entries: vec![map_entry("Account", vec![StorageHasher::Blake2_128Concat])],
            }),
            calls: None,
            event: None,
            constants: Vec::new(),
            error: None,
            index: 0,
        };
        let template = PalletMetadata {
            name: "TemplateModule",
            storage: Some(PalletStorageMetadata {
                prefix: "TemplateModule",
                entries: vec![map_entry(
                    "MetaStor",
                    vec![StorageHasher::Blake2_128Concat, StorageHasher::Identity],
                )],
            }),
            calls: Some(calls),
            event: None,
            constants: Vec::new(),
            error: None,
            index: template_index,
        };
        let extrinsic = ExtrinsicMetadata {
            ty: meta_type::<UncheckedExtrinsic>(),
            version: 4,
            signed_extensions: Vec::new(),
        };

        let metadata = RuntimeMetadataV14::new(vec![system, template], extrinsic, meta_type::<Runtime>());
        RuntimeMetadataPrefixed::from(metadata).encode()
    }

    /// Metadata declaring the template module at index 11 with calls 3, 4 and 7.
    pub(crate) fn template_metadata() -> Vec<u8> {
        encode_metadata(
            11,
            PalletCallMetadata {
                ty: meta_type::<TemplateCall>(),
            },
        )
    }

    /// Metadata whose template module has no `update_metadata` call.
    pub(crate) fn legacy_metadata() -> Vec<u8> {
        encode_metadata(
            8,
            PalletCallMetadata {
                ty: meta_type::<LegacyTemplateCall>(),
            },
        )
    }

    #[test]
    fn test_indices_come_from_metadata() {
        let bytes = template_metadata();
        let schema = decode_runtime_schema(bytes.clone()).unwrap();

        assert_eq!(schema.metadata, bytes);
        assert_eq!(
            schema.call_index("TemplateModule", "set_metadata").unwrap(),
            CallIndex { pallet: 11, call: 3 }
        );
        assert_eq!(
            schema.call_index("TemplateModule", "update_metadata").unwrap(),
            CallIndex { pallet: 11, call: 7 }
        );
        assert!(schema.ensure_storage("TemplateModule", "MetaStor").is_ok());
        assert!(schema.ensure_storage("System", "Account").is_ok());
        assert!(schema.pallet("System").unwrap().calls.is_empty());
    }

    #[test]
    fn test_undeclared_call_does_not_resolve() {
        let schema = decode_runtime_schema(legacy_metadata()).unwrap();
        assert!(schema.call_index("TemplateModule", "delete_metadata").is_ok());
        assert!(matches!(
            schema.call_index("TemplateModule", "update_metadata"),
            Err(CoreError::UnknownCall { .. })
        ));
    }

    #[test]
    fn test_truncated_metadata_is_rejected() {
        assert!(matches!(
            decode_runtime_schema(vec![0x00]),
            Err(NodeError::Decode(_))
        ));
        assert!(matches!(
            decode_runtime_schema(Vec::new()),
            Err(NodeError::Decode(_))
        ));
    }

    #[test]
    fn test_wrong_magic_is_rejected() {
        let mut bytes = template_metadata();
        bytes[0] ^= 0xff;
        assert!(matches!(
            decode_runtime_schema(bytes),
            Err(NodeError::Decode(_))
        ));
    }
}
