//! Test fixtures and data generators.

use std::sync::Arc;

use crate::config::KeychainConfig;
use crate::secure_storage::{Authenticator, InMemoryItemService};
use crate::Keychain;

/// Collection of commonly used test fixtures.
pub struct TestFixtures;

impl TestFixtures {
    /// Access group used by fixture keychains.
    pub const ACCESS_GROUP: &'static str = "TEAMID.com.example.keychain";

    /// A second access group, for isolation tests.
    pub const OTHER_ACCESS_GROUP: &'static str = "TEAMID.com.example.other";

    /// Sample API token.
    pub const API_TOKEN: &'static str = "8e9c0a7f";

    /// Sample internet credentials: (server, port, password).
    pub const INTERNET_CREDENTIALS: &'static [(&'static str, u16, &'static str)] = &[
        ("example.com", 443, "tls-password"),
        ("example.com", 8443, "admin-password"),
    ];

    /// Configuration scoped to [`ACCESS_GROUP`](Self::ACCESS_GROUP).
    pub fn config() -> KeychainConfig {
        KeychainConfig::new().with_access_group(Self::ACCESS_GROUP)
    }
}

/// Common name of the issuer on every fixture certificate.
pub const FIXTURE_ISSUER: &str = "Keychain Test CA";

/// Minimal X.509-shaped certificate for `common_name`.
///
/// The `TBSCertificate` carries a version, a serial number derived from the
/// name, an Ed25519 algorithm identifier, [`FIXTURE_ISSUER`] as issuer, an
/// empty validity and `common_name` as subject. There is no signature.
///
/// # Panics
/// Panics if `common_name` is longer than 48 bytes.
pub fn certificate_der(common_name: &str) -> Vec<u8> {
    use sha2::{Digest, Sha256};

    assert!(common_name.len() <= 48, "common name too long for fixture");

    let mut serial = Sha256::digest(common_name.as_bytes())[..8].to_vec();
    serial[0] &= 0x7f;

    let mut tbs = der(0xa0, &der(0x02, &[0x02]));
    tbs.extend(der(0x02, &serial));
    tbs.extend(der(0x30, &der(0x06, &[0x2b, 0x65, 0x70])));
    tbs.extend(name_der(FIXTURE_ISSUER));
    tbs.extend(der(0x30, &[]));
    tbs.extend(name_der(common_name));

    der(0x30, &der(0x30, &tbs))
}

/// DER name with a single common-name attribute.
pub fn name_der(common_name: &str) -> Vec<u8> {
    let mut attribute = der(0x06, &[0x55, 0x04, 0x03]);
    attribute.extend(der(0x13, common_name.as_bytes()));
    der(0x30, &der(0x31, &der(0x30, &attribute)))
}

fn der(tag: u8, contents: &[u8]) -> Vec<u8> {
    assert!(contents.len() < 0x80, "fixture element too long");
    let mut element = vec![tag, contents.len() as u8];
    element.extend_from_slice(contents);
    element
}

/// The default fixture certificate.
pub fn sample_certificate_der() -> Vec<u8> {
    certificate_der("keychain-dev")
}

/// Deterministic Ed25519 signing key derived from a one-byte seed.
pub fn sample_signing_key(seed: u8) -> ed25519_dalek::SigningKey {
    ed25519_dalek::SigningKey::from_bytes(&[seed; 32])
}

/// Keychain over a fresh in-memory service that approves every prompt.
pub fn in_memory_keychain() -> Keychain<InMemoryItemService> {
    Keychain::new(InMemoryItemService::new(), &TestFixtures::config())
}

/// Keychain over a fresh in-memory service that routes prompts to
/// `authenticator`.
pub fn keychain_with_authenticator(
    authenticator: Arc<dyn Authenticator>,
) -> Keychain<InMemoryItemService> {
    Keychain::new(
        InMemoryItemService::with_authenticator(authenticator),
        &TestFixtures::config(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CertificateDer;

    #[test]
    fn test_certificates_are_well_formed() {
        let der = sample_certificate_der();
        let certificate = CertificateDer::from_bytes(&der).unwrap();
        let fields = certificate.fields().unwrap();
        assert_eq!(fields.issuer, name_der(FIXTURE_ISSUER));
        assert_eq!(fields.subject, Some(name_der("keychain-dev")));
        assert_eq!(fields.serial_number.len(), 8);
        assert_ne!(certificate_der("a"), certificate_der("b"));
    }

    #[test]
    fn test_signing_key_is_deterministic() {
        assert_eq!(
            sample_signing_key(1).to_bytes(),
            sample_signing_key(1).to_bytes()
        );
        assert_ne!(
            sample_signing_key(1).verifying_key(),
            sample_signing_key(2).verifying_key()
        );
    }
}
