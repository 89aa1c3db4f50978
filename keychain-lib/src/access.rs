//! Access policies.
//!
//! An [`AccessPolicy`] states when an item may be read (its
//! [`Accessibility`] tier) and what the user must do to read it
//! ([`AuthenticationOptions`]). The policy is translated once into an
//! [`AccessControlHandle`] and the handle is reused for every later
//! operation against the same policy instance.
//!
//! [`AuthenticationContext`] is separate: the policy protects an item at
//! storage time, the context is lent to a single read.
//!
//! Build policies that carry authentication with [`AccessPolicy::try_new`],
//! which rejects impossible combinations on the spot:
//!
//! ```
//! use keychain_lib::access::{AccessPolicy, Accessibility, AuthenticationOptions};
//!
//! let policy = AccessPolicy::try_new(
//!     Accessibility::WhenUnlockedThisDeviceOnly,
//!     AuthenticationOptions::BIOMETRY_CURRENT_SET,
//! )?;
//! assert!(policy.requires_access_control());
//!
//! let legacy = AccessPolicy::try_new(Accessibility::Always, AuthenticationOptions::BIOMETRY_ANY);
//! assert!(legacy.is_err());
//! # Ok::<(), keychain_lib::KeychainError>(())
//! ```

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::attributes::AttributeValue;
use crate::errors::KeychainError;
use crate::native::NativeValue;
use crate::Result;

/// When an item's payload may be read.
///
/// Variants are ordered from the most permissive to the most restrictive of
/// the non-legacy tiers; the legacy `Always` tiers sort first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Accessibility {
    /// Always readable. Deprecated by the platform, still accepted.
    Always,
    /// Always readable, never migrated to another device. Deprecated.
    AlwaysThisDeviceOnly,
    /// Readable after the first unlock since boot, this device only.
    AfterFirstUnlockThisDeviceOnly,
    /// Readable after the first unlock since boot.
    AfterFirstUnlock,
    /// Readable while unlocked, this device only.
    WhenUnlockedThisDeviceOnly,
    /// Readable while unlocked.
    #[default]
    WhenUnlocked,
    /// Readable while unlocked and only while a passcode is set.
    WhenPasscodeSetThisDeviceOnly,
}

impl Accessibility {
    /// Every tier.
    pub const ALL: [Accessibility; 7] = [
        Self::Always,
        Self::AlwaysThisDeviceOnly,
        Self::AfterFirstUnlockThisDeviceOnly,
        Self::AfterFirstUnlock,
        Self::WhenUnlockedThisDeviceOnly,
        Self::WhenUnlocked,
        Self::WhenPasscodeSetThisDeviceOnly,
    ];

    /// Native protection constant.
    pub const fn native(self) -> &'static str {
        match self {
            Self::Always => "dk",
            Self::AlwaysThisDeviceOnly => "dku",
            Self::AfterFirstUnlockThisDeviceOnly => "cku",
            Self::AfterFirstUnlock => "ck",
            Self::WhenUnlockedThisDeviceOnly => "aku",
            Self::WhenUnlocked => "ak",
            Self::WhenPasscodeSetThisDeviceOnly => "akpu",
        }
    }

    /// Parse a native protection constant.
    pub fn from_constant(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tier| tier.native() == value)
    }

    /// Deprecated "always" tiers.
    pub fn is_legacy(self) -> bool {
        matches!(self, Self::Always | Self::AlwaysThisDeviceOnly)
    }

    /// Tiers that never leave the device.
    pub fn is_this_device_only(self) -> bool {
        matches!(
            self,
            Self::AlwaysThisDeviceOnly
                | Self::AfterFirstUnlockThisDeviceOnly
                | Self::WhenUnlockedThisDeviceOnly
                | Self::WhenPasscodeSetThisDeviceOnly
        )
    }
}

impl AttributeValue for Accessibility {
    fn to_native(&self) -> NativeValue {
        NativeValue::Constant(self.native())
    }

    fn from_native(value: &NativeValue) -> Option<Self> {
        value.as_str().and_then(Self::from_constant)
    }
}

/// Authentication the user must complete before an item can be used.
///
/// Multiple options combine with OR semantics.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AuthenticationOptions(u32);

impl AuthenticationOptions {
    /// No authentication beyond the accessibility tier.
    pub const NONE: Self = Self(0);
    /// Any enrolled biometry or the device passcode.
    pub const USER_PRESENCE: Self = Self(1 << 0);
    /// Any enrolled biometry, surviving enrollment changes.
    pub const BIOMETRY_ANY: Self = Self(1 << 1);
    /// Biometry as enrolled when the item was stored.
    pub const BIOMETRY_CURRENT_SET: Self = Self(1 << 3);
    /// The device passcode.
    pub const DEVICE_PASSCODE: Self = Self(1 << 4);
    /// A paired watch.
    pub const WATCH: Self = Self(1 << 5);

    /// Native flag joining several constraints with OR.
    pub const OR: u32 = 1 << 14;

    const NAMES: [(Self, &'static str); 5] = [
        (Self::USER_PRESENCE, "userPresence"),
        (Self::BIOMETRY_ANY, "biometryAny"),
        (Self::BIOMETRY_CURRENT_SET, "biometryCurrentSet"),
        (Self::DEVICE_PASSCODE, "devicePasscode"),
        (Self::WATCH, "watch"),
    ];

    /// Raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Rebuild from native flags, ignoring conjunction bits.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & 0b11_1011)
    }

    /// Whether no option is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every option in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// Number of distinct options set.
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Reject combinations the platform cannot express.
    pub fn validate(self) -> Result<()> {
        if self.contains(Self::USER_PRESENCE) && self.len() > 1 {
            return Err(KeychainError::InvalidPolicy(format!(
                "userPresence cannot be combined with other options ({self:?})"
            )));
        }
        if self.contains(Self::BIOMETRY_ANY) && self.contains(Self::BIOMETRY_CURRENT_SET) {
            return Err(KeychainError::InvalidPolicy(
                "biometryAny and biometryCurrentSet are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }

    /// Native access-control flags, including the OR conjunction when needed.
    pub const fn native_flags(self) -> u32 {
        if self.len() > 1 {
            self.0 | Self::OR
        } else {
            self.0
        }
    }
}

impl BitOr for AuthenticationOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AuthenticationOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for AuthenticationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join(" | "))
        }
    }
}

#[derive(PartialEq, Eq)]
struct AccessControl {
    accessibility: Accessibility,
    flags: u32,
}

/// Native access-control object built from an [`AccessPolicy`].
///
/// Cheap to clone; clones share the same underlying object.
#[derive(Clone)]
pub struct AccessControlHandle(Arc<AccessControl>);

impl AccessControlHandle {
    /// Accessibility tier enforced by this control.
    pub fn accessibility(&self) -> Accessibility {
        self.0.accessibility
    }

    /// Native access-control flags.
    pub fn flags(&self) -> u32 {
        self.0.flags
    }

    /// Authentication options encoded in the flags.
    pub fn options(&self) -> AuthenticationOptions {
        AuthenticationOptions::from_bits_truncate(self.0.flags)
    }

    /// Whether reading the item triggers authentication.
    pub fn requires_authentication(&self) -> bool {
        !self.options().is_empty()
    }

    /// Control with the same flags enforced at a different tier.
    pub(crate) fn with_accessibility(&self, accessibility: Accessibility) -> Self {
        Self(Arc::new(AccessControl {
            accessibility,
            flags: self.0.flags,
        }))
    }

    /// Whether both handles refer to the same native object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for AccessControlHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl fmt::Debug for AccessControlHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AccessControl({}, {:?})",
            self.0.accessibility.native(),
            self.options()
        )
    }
}

/// Declarative protection for a stored item.
pub struct AccessPolicy {
    accessibility: Accessibility,
    authentication: AuthenticationOptions,
    control: OnceLock<AccessControlHandle>,
}

impl AccessPolicy {
    /// Policy with the given tier and no authentication requirement.
    ///
    /// Every tier is valid on its own, so this cannot fail.
    pub fn new(accessibility: Accessibility) -> Self {
        Self {
            accessibility,
            authentication: AuthenticationOptions::NONE,
            control: OnceLock::new(),
        }
    }

    /// Build a policy and validate the combination of tier and options.
    ///
    /// This is the constructor to use when authentication is required.
    /// Fails with `InvalidPolicy` when the options conflict with each other
    /// or with a legacy tier.
    pub fn try_new(
        accessibility: Accessibility,
        authentication: AuthenticationOptions,
    ) -> Result<Self> {
        let policy = Self::new(accessibility).with_authentication(authentication);
        policy.validate()?;
        Ok(policy)
    }

    /// Require authentication before the item can be read.
    ///
    /// Validation is deferred: the combination is checked by
    /// [`validate`](Self::validate), by
    /// [`to_native_access_control`](Self::to_native_access_control) and by
    /// every keychain write, all before anything is stored. Use
    /// [`try_new`](Self::try_new) to fail at construction instead.
    pub fn with_authentication(mut self, options: AuthenticationOptions) -> Self {
        self.authentication = options;
        self.control = OnceLock::new();
        self
    }

    /// Accessibility tier.
    pub fn accessibility(&self) -> Accessibility {
        self.accessibility
    }

    /// Authentication options.
    pub fn authentication(&self) -> AuthenticationOptions {
        self.authentication
    }

    /// Whether the policy needs an access-control object rather than a bare
    /// protection constant.
    pub fn requires_access_control(&self) -> bool {
        !self.authentication.is_empty()
    }

    /// Check the tier and options can be represented together.
    pub fn validate(&self) -> Result<()> {
        self.authentication.validate()?;
        if self.requires_access_control() && self.accessibility.is_legacy() {
            return Err(KeychainError::InvalidPolicy(format!(
                "{:?} cannot carry authentication options ({:?})",
                self.accessibility, self.authentication
            )));
        }
        Ok(())
    }

    /// Native access-control object for this policy.
    ///
    /// Built on first use and cached; later calls return the same handle.
    pub fn to_native_access_control(&self) -> Result<AccessControlHandle> {
        if let Some(handle) = self.control.get() {
            return Ok(handle.clone());
        }
        self.validate()?;
        let built = AccessControlHandle(Arc::new(AccessControl {
            accessibility: self.accessibility,
            flags: self.authentication.native_flags(),
        }));
        Ok(self.control.get_or_init(|| built).clone())
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new(Accessibility::default())
    }
}

impl Clone for AccessPolicy {
    fn clone(&self) -> Self {
        Self {
            accessibility: self.accessibility,
            authentication: self.authentication,
            control: self.control.clone(),
        }
    }
}

impl fmt::Debug for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPolicy")
            .field("accessibility", &self.accessibility)
            .field("authentication", &self.authentication)
            .field("materialized", &self.control.get().is_some())
            .finish()
    }
}

/// Caller-owned authentication session lent to a single read.
#[derive(Debug, Clone)]
pub struct AuthenticationContext {
    id: u64,
    interaction_allowed: bool,
    pre_authenticated: bool,
    reason: Option<String>,
}

impl AuthenticationContext {
    /// Interactive context: the store may prompt the user.
    pub fn new() -> Self {
        Self {
            id: rand::random(),
            interaction_allowed: true,
            pre_authenticated: false,
            reason: None,
        }
    }

    /// Context whose owner already authenticated the user.
    pub fn pre_authenticated() -> Self {
        Self {
            pre_authenticated: true,
            ..Self::new()
        }
    }

    /// Forbid prompting; reads that need authentication fail instead.
    pub fn without_interaction(mut self) -> Self {
        self.interaction_allowed = false;
        self
    }

    /// Message shown in the authentication prompt.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Opaque session identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the store may prompt.
    pub fn interaction_allowed(&self) -> bool {
        self.interaction_allowed
    }

    /// Whether the owner already authenticated the user.
    pub fn is_pre_authenticated(&self) -> bool {
        self.pre_authenticated
    }

    /// Prompt message, if any.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl Default for AuthenticationContext {
    fn default() -> Self {
        Self::new()
    }
}
