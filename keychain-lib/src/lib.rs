//! Keychain library.
//!
//! A typed facade over a platform secure-item store. Queries are
//! parameterized by item class, so attributes that do not belong to a class
//! are rejected by the compiler instead of by the store at runtime.
//!
//! # Features
//!
//! - **Typed queries**: `Query<C>` only accepts attributes legal for `C`
//! - **Payload codecs**: bytes, text, JSON, symmetric and asymmetric keys,
//!   certificates and identities round-trip through the store
//! - **Access policies**: accessibility tiers plus authentication
//!   requirements, validated before anything is written
//! - **Pluggable store**: the facade talks to a [`SecureItemService`]; an
//!   in-memory implementation ships for tests and development
//!
//! # Example
//!
//! ```
//! use keychain_lib::prelude::*;
//!
//! let keychain = Keychain::new(InMemoryItemService::new(), &KeychainConfig::default());
//! let query = Query::<GenericCredential>::new().with(attr::Service, "OpenAI");
//!
//! keychain.store(&"8e9c0a7f".to_string(), &query, None)?;
//! let token: Option<String> = keychain.retrieve(&query, None)?;
//! assert_eq!(token.as_deref(), Some("8e9c0a7f"));
//!
//! keychain.remove(&query)?;
//! assert_eq!(keychain.retrieve::<_, String>(&query, None)?, None);
//! # Ok::<(), keychain_lib::KeychainError>(())
//! ```

pub mod access;
pub mod attributes;
pub mod class;
pub mod codec;
pub mod config;
pub mod errors;
pub mod keychain;
pub mod native;
pub mod prelude;
pub mod projection;
pub mod query;
pub mod secure_storage;
pub mod shared_web;

/// Test utilities for keychain code.
///
/// This module is only available with the `test-utils` feature or in test builds.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use access::{AccessPolicy, Accessibility, AuthenticationContext, AuthenticationOptions};
pub use config::KeychainConfig;
pub use errors::{KeychainError, KeychainErrorCode};
pub use keychain::{IdentityImport, Keychain};
pub use query::{MatchLimit, Query};
pub use secure_storage::{InMemoryItemService, SecureItemService};

/// Common result alias for keychain operations.
pub type Result<T> = std::result::Result<T, KeychainError>;
