//! Configuration for a keychain instance.

use serde::{Deserialize, Serialize};

/// Environment variable naming an explicit access group.
pub const ENV_ACCESS_GROUP: &str = "KEYCHAIN_ACCESS_GROUP";
/// Environment variable naming the keychain-sharing entitlement group.
pub const ENV_SHARING_GROUP: &str = "KEYCHAIN_SHARING_GROUP";
/// Environment variable naming the application identifier.
pub const ENV_APPLICATION_IDENTIFIER: &str = "KEYCHAIN_APPLICATION_IDENTIFIER";

/// Access scope of a [`Keychain`](crate::Keychain).
///
/// The scope is resolved once, when the keychain is constructed:
/// an explicit access group wins over the keychain-sharing entitlement
/// group, which wins over the application identifier. With none of them
/// set, items land in the store's default group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeychainConfig {
    /// Explicit access group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_group: Option<String>,

    /// First keychain-sharing entitlement group (e.g., "TEAMID.shared").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharing_group: Option<String>,

    /// Application identifier (e.g., "TEAMID.com.example.app").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_identifier: Option<String>,
}

impl KeychainConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the explicit access group.
    pub fn with_access_group(mut self, group: impl Into<String>) -> Self {
        self.access_group = Some(group.into());
        self
    }

    /// Set the keychain-sharing entitlement group.
    pub fn with_sharing_group(mut self, group: impl Into<String>) -> Self {
        self.sharing_group = Some(group.into());
        self
    }

    /// Set the application identifier.
    pub fn with_application_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.application_identifier = Some(identifier.into());
        self
    }

    /// Read the configuration from `KEYCHAIN_*` environment variables.
    ///
    /// Unset or empty variables are treated as absent.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        Self {
            access_group: read(ENV_ACCESS_GROUP),
            sharing_group: read(ENV_SHARING_GROUP),
            application_identifier: read(ENV_APPLICATION_IDENTIFIER),
        }
    }

    /// Access group every operation is scoped to.
    pub fn resolved_access_group(&self) -> Option<&str> {
        self.access_group
            .as_deref()
            .or(self.sharing_group.as_deref())
            .or(self.application_identifier.as_deref())
    }
}
