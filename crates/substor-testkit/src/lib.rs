//! # Substor Testkit
//!
//! Testing utilities for Substor.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Storage addresses with known bytes, so any implementation
//!   of the key scheme can be checked against a running chain's layout
//! - **Generators**: Proptest strategies for namespaces, keys and metadata
//! - **Fixtures**: An in-memory ledger wired to a connected store
//!
//! ## Golden Vectors
//!
//! ```rust
//! use substor_testkit::vectors::verify_all_vectors;
//!
//! for (name, ok, address) in verify_all_vectors() {
//!     assert!(ok, "{}: {}", name, address);
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use substor::MetadataStore;
//! use substor_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new().await;
//! fixture.store.set(b"bucket", b"object", b"meta").await?;
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{init_tracing, TestFixture};
pub use generators::{MetadataParams, StoreOp};
pub use vectors::{all_vectors, verify_all_vectors, AddressVector};
