//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types and traits for
//! quick setup. Import everything with:
//!
//! ```rust
//! use keychain_lib::prelude::*;
//! ```
//!
//! ## What's Included
//!
//! - Facade: `Keychain`, `KeychainConfig`
//! - Queries: `Query`, `MatchLimit`, the `attr` markers and item classes
//! - Access control: `AccessPolicy`, `Accessibility`, `AuthenticationOptions`,
//!   `AuthenticationContext`
//! - Payloads: the convertible traits and built-in payload types
//! - Results: `Projection`, `Projected`, `AttributeInfo`
//! - Error types: `KeychainError`, `KeychainErrorCode`, `Result`

// Facade
pub use crate::config::KeychainConfig;
pub use crate::keychain::Keychain;

// Queries
pub use crate::attributes::{
    attr, AuthenticationType, InternetProtocol, KeyClass, KeyType,
};
pub use crate::class::{
    Certificate, CryptoKey, GenericCredential, Identity, InternetCredential, ItemClass,
};
pub use crate::query::{MatchLimit, Query};

// Access control
pub use crate::access::{
    AccessPolicy, Accessibility, AuthenticationContext, AuthenticationOptions,
};

// Payloads
pub use crate::codec::{
    CertificateConvertible, CertificateDer, DataConvertible, IdentityBundle, Json,
    KeyConvertible, SymmetricKey,
};

// Results
pub use crate::native::PersistentReference;
pub use crate::projection::{AttributeInfo, Projected, ProjectedValue, Projection};

// Error handling
pub use crate::errors::{KeychainError, KeychainErrorCode};
pub use crate::Result;

// Store services
pub use crate::secure_storage::{InMemoryItemService, SecureItemService};
