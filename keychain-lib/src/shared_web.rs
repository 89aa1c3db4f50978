//! Shared web credentials.
//!
//! The platform mediates a credential store shared with the browser,
//! addressed by (domain, account). Calls complete asynchronously, so the
//! boundary is an async trait rather than part of the blocking
//! [`Keychain`](crate::Keychain) facade.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::errors::KeychainError;
use crate::Result;

/// Platform-mediated store of credentials shared with the browser.
#[async_trait]
pub trait SharedWebCredentials: Send + Sync {
    /// Save or replace the password for `account` on the site at `url`.
    async fn store(&self, url: &str, account: &str, password: &str) -> Result<()>;

    /// Forget the password for `account` on the site at `url`. Forgetting a
    /// credential that does not exist is not an error.
    async fn remove(&self, url: &str, account: &str) -> Result<()>;
}

/// Extract the domain of an `https` URL.
pub fn domain_of(url: &str) -> Result<&str> {
    let invalid = || KeychainError::InvalidQuery(format!("not an https URL: {url:?}"));
    let rest = url.strip_prefix("https://").ok_or_else(invalid)?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or_default();
    let domain = host.split(':').next().unwrap_or_default();
    if domain.is_empty() {
        return Err(invalid());
    }
    Ok(domain)
}

/// In-memory shared web credential store.
///
/// **Warning**: This is for testing only.
#[derive(Default)]
pub struct InMemorySharedWebCredentials {
    credentials: RwLock<HashMap<(String, String), Zeroizing<String>>>,
}

fn lock_error(context: &str) -> KeychainError {
    KeychainError::store_failure(format!(
        "InMemorySharedWebCredentials: lock poisoned during {}",
        context
    ))
}

impl InMemorySharedWebCredentials {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored password for `account` at the domain of `url`.
    pub fn password(&self, url: &str, account: &str) -> Result<Option<String>> {
        let key = (domain_of(url)?.to_ascii_lowercase(), account.to_string());
        let credentials = self.credentials.read().map_err(|_| lock_error("password"))?;
        Ok(credentials.get(&key).map(|password| password.to_string()))
    }

    /// Number of stored credentials.
    ///
    /// Returns 0 if the lock is poisoned.
    pub fn len(&self) -> usize {
        self.credentials.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Check if the store is empty.
    ///
    /// Returns true if the lock is poisoned.
    pub fn is_empty(&self) -> bool {
        self.credentials.read().map(|c| c.is_empty()).unwrap_or(true)
    }
}

#[async_trait]
impl SharedWebCredentials for InMemorySharedWebCredentials {
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, password)))]
    async fn store(&self, url: &str, account: &str, password: &str) -> Result<()> {
        let key = (domain_of(url)?.to_ascii_lowercase(), account.to_string());
        let mut credentials = self.credentials.write().map_err(|_| lock_error("store"))?;
        credentials.insert(key, Zeroizing::new(password.to_string()));
        Ok(())
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    async fn remove(&self, url: &str, account: &str) -> Result<()> {
        let key = (domain_of(url)?.to_ascii_lowercase(), account.to_string());
        let mut credentials = self.credentials.write().map_err(|_| lock_error("remove"))?;
        if credentials.remove(&key).is_none() {
            #[cfg(feature = "tracing")]
            tracing::debug!("no shared credential to remove");
        }
        Ok(())
    }
}
