//! Test utilities for keychain code.
//!
//! This module provides testing infrastructure including:
//! - Fixtures: sample certificates, keys and ready-made keychains
//! - Scripted collaborators standing in for the authentication UI and the
//!   PKCS#12 importer
//! - Assertion helpers for classified errors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use keychain_lib::secure_storage::AuthenticationOutcome;
//! use keychain_lib::test_utils::{keychain_with_authenticator, ScriptedAuthenticator};
//!
//! let authenticator = Arc::new(ScriptedAuthenticator::new([AuthenticationOutcome::Cancelled]));
//! let keychain = keychain_with_authenticator(authenticator.clone());
//! assert_eq!(authenticator.prompts(), 0);
//! # let _ = keychain;
//! ```

mod assertions;
mod fixtures;
mod mocks;

pub use fixtures::{
    certificate_der, in_memory_keychain, keychain_with_authenticator, name_der,
    sample_certificate_der, sample_signing_key, TestFixtures, FIXTURE_ISSUER,
};

pub use mocks::{ScriptedAuthenticator, StaticPkcs12Parser};

pub use assertions::{assert_error_code, assert_not_found};
