//! Scripted stand-ins for the platform collaborators.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use zeroize::Zeroizing;

use crate::access::{AccessControlHandle, AuthenticationContext};
use crate::codec::{KeyConvertible, KeyDescriptor};
use crate::secure_storage::{
    status, AuthenticationOutcome, Authenticator, ParsedIdentity, Pkcs12Parser, ServiceResult,
};

/// Authenticator that replays a fixed list of outcomes.
///
/// Once the script runs out every prompt fails.
pub struct ScriptedAuthenticator {
    outcomes: Mutex<VecDeque<AuthenticationOutcome>>,
    prompts: AtomicUsize,
}

impl ScriptedAuthenticator {
    /// Create an authenticator replaying `outcomes` in order.
    pub fn new(outcomes: impl IntoIterator<Item = AuthenticationOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            prompts: AtomicUsize::new(0),
        }
    }

    /// Number of prompts shown so far.
    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

impl Authenticator for ScriptedAuthenticator {
    fn authenticate(
        &self,
        _control: &AccessControlHandle,
        _context: Option<&AuthenticationContext>,
    ) -> AuthenticationOutcome {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .ok()
            .and_then(|mut outcomes| outcomes.pop_front())
            .unwrap_or(AuthenticationOutcome::Failed)
    }
}

/// PKCS#12 parser that returns a fixed set of identities for one
/// passphrase.
pub struct StaticPkcs12Parser {
    passphrase: String,
    identities: Vec<(KeyDescriptor, Zeroizing<Vec<u8>>, Vec<u8>)>,
}

impl StaticPkcs12Parser {
    /// Create a parser accepting `passphrase` and yielding no identities.
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
            identities: Vec::new(),
        }
    }

    /// Add an identity built from a private key and a DER certificate.
    pub fn with_identity<K: KeyConvertible>(mut self, key: &K, certificate: Vec<u8>) -> Self {
        self.identities
            .push((key.descriptor(), key.to_key_material(), certificate));
        self
    }
}

impl Pkcs12Parser for StaticPkcs12Parser {
    fn parse(&self, bundle: &[u8], passphrase: &str) -> ServiceResult<Vec<ParsedIdentity>> {
        if bundle.is_empty() {
            return Err(status::DECODE);
        }
        if passphrase != self.passphrase {
            return Err(status::PKCS12_BAD_PASSPHRASE);
        }
        Ok(self
            .identities
            .iter()
            .map(|(descriptor, material, certificate)| ParsedIdentity {
                descriptor: *descriptor,
                material: material.clone(),
                certificate: certificate.clone(),
            })
            .collect())
    }
}
