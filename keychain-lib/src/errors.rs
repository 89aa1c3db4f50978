//! Error types for keychain operations.
//!
//! Every failure coming back from the secure item service is a native status
//! code. [`KeychainError::from_status`] classifies that status space into the
//! kinds callers actually branch on: duplicates, absence, authentication
//! outcomes and opaque store failures.

use crate::attributes::AttributeKey;
use crate::class::ItemClassKind;
use crate::secure_storage::status;

/// Error codes for FFI and mobile integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum KeychainErrorCode {
    /// Attribute not legal for the item class
    InvalidAttributeForClass = 1000,
    /// Query unusable for the requested operation
    InvalidQuery = 1001,
    /// Access policy not representable on this platform
    InvalidPolicy = 2000,
    /// Matching item already exists
    DuplicateItem = 3000,
    /// No matching item
    ItemNotFound = 3001,
    /// Authentication did not succeed
    AuthenticationFailed = 4000,
    /// User cancelled the authentication prompt
    AuthenticationCancelled = 4001,
    /// Payload could not be converted
    ConversionFailed = 5000,
    /// Capability missing on this platform
    Unimplemented = 6000,
    /// Opaque failure from the underlying store
    UnderlyingStoreFailure = 9999,
}

/// Error type for keychain operations.
#[derive(Debug, thiserror::Error)]
pub enum KeychainError {
    /// An attribute was applied to a query whose item class does not allow it.
    #[error("attribute {attribute} is not applicable to {class} items")]
    InvalidAttributeForClass {
        /// Offending attribute
        attribute: AttributeKey,
        /// Item class of the query
        class: ItemClassKind,
    },

    /// The query cannot be used for the requested operation.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The accessibility tier and authentication options cannot be combined.
    #[error("invalid access policy: {0}")]
    InvalidPolicy(String),

    /// The store rejected an add because a matching item exists.
    #[error("a matching item already exists")]
    DuplicateItem,

    /// No item matched the query.
    #[error("no matching item was found")]
    ItemNotFound,

    /// Interactive or contextual authentication did not succeed.
    #[error("authentication failed (status {status})")]
    AuthenticationFailed {
        /// Native status reported by the store
        status: i32,
    },

    /// The user dismissed the authentication prompt.
    #[error("authentication was cancelled by the user")]
    AuthenticationCancelled,

    /// A payload could not round-trip through its converter.
    #[error("conversion failed: {0}")]
    ConversionFailed(String),

    /// The platform lacks the requested capability.
    #[error("{0} is not implemented on this platform")]
    Unimplemented(&'static str),

    /// Any other failure reported by the store.
    #[error("secure store failure (status {status}): {message}")]
    UnderlyingStoreFailure {
        /// Native status reported by the store
        status: i32,
        /// Diagnostic message
        message: String,
    },
}

impl KeychainError {
    /// Classify a native status code.
    pub fn from_status(code: i32) -> Self {
        match code {
            status::DUPLICATE_ITEM => Self::DuplicateItem,
            status::ITEM_NOT_FOUND => Self::ItemNotFound,
            status::USER_CANCELED => Self::AuthenticationCancelled,
            status::AUTH_FAILED
            | status::INTERACTION_NOT_ALLOWED
            | status::PKCS12_BAD_PASSPHRASE => Self::AuthenticationFailed { status: code },
            status::DECODE => Self::ConversionFailed(status::describe(code).to_string()),
            status::UNIMPLEMENTED => Self::Unimplemented("requested store operation"),
            other => Self::UnderlyingStoreFailure {
                status: other,
                message: status::describe(other).to_string(),
            },
        }
    }

    /// Wrap an internal store failure that has no native status of its own.
    pub fn store_failure(message: impl Into<String>) -> Self {
        Self::UnderlyingStoreFailure {
            status: status::INTERNAL,
            message: message.into(),
        }
    }

    /// Create a conversion error.
    pub fn conversion(reason: impl Into<String>) -> Self {
        Self::ConversionFailed(reason.into())
    }

    /// Get the error code for FFI/mobile integration.
    pub fn code(&self) -> KeychainErrorCode {
        match self {
            Self::InvalidAttributeForClass { .. } => KeychainErrorCode::InvalidAttributeForClass,
            Self::InvalidQuery(_) => KeychainErrorCode::InvalidQuery,
            Self::InvalidPolicy(_) => KeychainErrorCode::InvalidPolicy,
            Self::DuplicateItem => KeychainErrorCode::DuplicateItem,
            Self::ItemNotFound => KeychainErrorCode::ItemNotFound,
            Self::AuthenticationFailed { .. } => KeychainErrorCode::AuthenticationFailed,
            Self::AuthenticationCancelled => KeychainErrorCode::AuthenticationCancelled,
            Self::ConversionFailed(_) => KeychainErrorCode::ConversionFailed,
            Self::Unimplemented(_) => KeychainErrorCode::Unimplemented,
            Self::UnderlyingStoreFailure { .. } => KeychainErrorCode::UnderlyingStoreFailure,
        }
    }

    /// Native status associated with this error, when one exists.
    pub fn status(&self) -> Option<i32> {
        match self {
            Self::DuplicateItem => Some(status::DUPLICATE_ITEM),
            Self::ItemNotFound => Some(status::ITEM_NOT_FOUND),
            Self::AuthenticationCancelled => Some(status::USER_CANCELED),
            Self::AuthenticationFailed { status } | Self::UnderlyingStoreFailure { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Check if this error indicates no item matched.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ItemNotFound)
    }

    /// Check if the user declined the authentication prompt.
    pub fn is_user_cancelled(&self) -> bool {
        matches!(self, Self::AuthenticationCancelled)
    }

    /// Check if this error stems from the authentication step.
    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed { .. } | Self::AuthenticationCancelled
        )
    }
}

impl From<serde_json::Error> for KeychainError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConversionFailed(err.to_string())
    }
}
