//! External collaborator interfaces.
//!
//! [`SecureItemService`] is the platform secure-item service: it persists,
//! encrypts and enforces access control. [`Authenticator`] stands in for the
//! platform's authentication UI and [`Pkcs12Parser`] for its PKCS#12
//! importer. The facade in [`crate::keychain`] only ever talks to these
//! traits.

use zeroize::Zeroizing;

use crate::access::{AccessControlHandle, AuthenticationContext};
use crate::codec::KeyDescriptor;
use crate::native::NativeDictionary;

/// Native status codes.
pub mod status {
    /// Success.
    pub const SUCCESS: i32 = 0;
    /// Function or operation not implemented.
    pub const UNIMPLEMENTED: i32 = -4;
    /// One or more parameters were not valid.
    pub const PARAM: i32 = -50;
    /// The user cancelled the operation.
    pub const USER_CANCELED: i32 = -128;
    /// Authorization or authentication failed.
    pub const AUTH_FAILED: i32 = -25293;
    /// The item already exists.
    pub const DUPLICATE_ITEM: i32 = -25299;
    /// The item cannot be found.
    pub const ITEM_NOT_FOUND: i32 = -25300;
    /// User interaction is required but not allowed.
    pub const INTERACTION_NOT_ALLOWED: i32 = -25308;
    /// Unable to decode the provided data.
    pub const DECODE: i32 = -26275;
    /// The PKCS#12 passphrase is wrong.
    pub const PKCS12_BAD_PASSPHRASE: i32 = -25264;
    /// The process lacks the entitlement for the access group.
    pub const MISSING_ENTITLEMENT: i32 = -34018;
    /// Internal failure with no native status.
    pub const INTERNAL: i32 = -26276;

    /// Short description of a status.
    pub fn describe(status: i32) -> &'static str {
        match status {
            SUCCESS => "success",
            UNIMPLEMENTED => "not implemented",
            PARAM => "invalid parameter",
            USER_CANCELED => "user cancelled",
            AUTH_FAILED => "authentication failed",
            DUPLICATE_ITEM => "duplicate item",
            ITEM_NOT_FOUND => "item not found",
            INTERACTION_NOT_ALLOWED => "interaction not allowed",
            DECODE => "unable to decode data",
            PKCS12_BAD_PASSPHRASE => "incorrect PKCS#12 passphrase",
            MISSING_ENTITLEMENT => "missing access group entitlement",
            INTERNAL => "internal store failure",
            _ => "unknown status",
        }
    }
}

/// Result of a call into an external collaborator: a value or a native status.
pub type ServiceResult<T> = std::result::Result<T, i32>;

/// Platform secure-item service.
///
/// Every call blocks for the full store round-trip, including any
/// authentication prompt the store decides to show. Implementations must be
/// safe to share across threads; the store serializes concurrent access to
/// the same item.
pub trait SecureItemService: Send + Sync {
    /// Add one item. `attributes` carries the class, the attributes, the
    /// payload under `v_Data` and optionally an access control under `accc`.
    fn add(&self, attributes: NativeDictionary) -> ServiceResult<()>;

    /// Return one dictionary per matching item, holding the requested
    /// `r_*` projections. No match is `ITEM_NOT_FOUND`.
    fn copy_matching(
        &self,
        query: &NativeDictionary,
        context: Option<&AuthenticationContext>,
    ) -> ServiceResult<Vec<NativeDictionary>>;

    /// Merge `changes` into every matching item. No match is `ITEM_NOT_FOUND`.
    fn update(&self, query: &NativeDictionary, changes: &NativeDictionary) -> ServiceResult<()>;

    /// Delete every matching item. No match is `ITEM_NOT_FOUND`.
    fn delete(&self, query: &NativeDictionary) -> ServiceResult<()>;
}

impl<T: SecureItemService + ?Sized> SecureItemService for std::sync::Arc<T> {
    fn add(&self, attributes: NativeDictionary) -> ServiceResult<()> {
        (**self).add(attributes)
    }

    fn copy_matching(
        &self,
        query: &NativeDictionary,
        context: Option<&AuthenticationContext>,
    ) -> ServiceResult<Vec<NativeDictionary>> {
        (**self).copy_matching(query, context)
    }

    fn update(&self, query: &NativeDictionary, changes: &NativeDictionary) -> ServiceResult<()> {
        (**self).update(query, changes)
    }

    fn delete(&self, query: &NativeDictionary) -> ServiceResult<()> {
        (**self).delete(query)
    }
}

/// Outcome of an authentication prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationOutcome {
    /// The user authenticated.
    Success,
    /// The user failed to authenticate.
    Failed,
    /// The user dismissed the prompt.
    Cancelled,
}

/// Platform authentication UI.
pub trait Authenticator: Send + Sync {
    /// Ask the user to satisfy `control`. May block indefinitely.
    fn authenticate(
        &self,
        control: &AccessControlHandle,
        context: Option<&AuthenticationContext>,
    ) -> AuthenticationOutcome;
}

/// Authenticator that approves every prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproveAll;

impl Authenticator for ApproveAll {
    fn authenticate(
        &self,
        _control: &AccessControlHandle,
        _context: Option<&AuthenticationContext>,
    ) -> AuthenticationOutcome {
        AuthenticationOutcome::Success
    }
}

/// One private key and certificate extracted from a PKCS#12 bundle.
pub struct ParsedIdentity {
    /// Descriptor of the private key
    pub descriptor: KeyDescriptor,
    /// Raw private key bytes
    pub material: Zeroizing<Vec<u8>>,
    /// DER-encoded certificate
    pub certificate: Vec<u8>,
}

/// Platform PKCS#12 importer.
pub trait Pkcs12Parser: Send + Sync {
    /// Parse a bundle. A wrong passphrase is `PKCS12_BAD_PASSPHRASE`,
    /// malformed input is `DECODE`.
    fn parse(&self, bundle: &[u8], passphrase: &str) -> ServiceResult<Vec<ParsedIdentity>>;
}
