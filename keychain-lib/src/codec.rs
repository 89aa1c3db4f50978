//! Value codec.
//!
//! Payload types reach the store through exactly one of three capability
//! traits: [`DataConvertible`] for opaque bytes, [`KeyConvertible`] for key
//! material, and [`CertificateConvertible`] for DER certificates. The item
//! class of a query decides which capability is accepted, via the blanket
//! [`Payload`] impls at the bottom of this module.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::attributes::{KeyClass, KeyType};
use crate::class::{Certificate, CryptoKey, GenericCredential, Identity, InternetCredential};
use crate::errors::KeychainError;
use crate::native::NativePayload;
use crate::Result;

/// Type, role and size of a piece of key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyDescriptor {
    /// Algorithm
    pub key_type: KeyType,
    /// Public, private or symmetric
    pub key_class: KeyClass,
    /// Key size in bits
    pub size_in_bits: u32,
}

impl KeyDescriptor {
    /// Create a descriptor.
    pub const fn new(key_type: KeyType, key_class: KeyClass, size_in_bits: u32) -> Self {
        Self {
            key_type,
            key_class,
            size_in_bits,
        }
    }

    fn require(&self, key_type: KeyType, key_class: KeyClass) -> Result<()> {
        if self.key_type != key_type || self.key_class != key_class {
            return Err(KeychainError::conversion(format!(
                "expected {key_type:?}/{key_class:?} key, found {:?}/{:?}",
                self.key_type, self.key_class
            )));
        }
        Ok(())
    }
}

/// Values stored as opaque bytes (generic and internet credentials).
pub trait DataConvertible: Sized {
    /// Serialize to bytes.
    fn to_data(&self) -> Result<Zeroizing<Vec<u8>>>;

    /// Rebuild from bytes.
    fn from_data(data: &[u8]) -> Result<Self>;
}

/// Values stored as key material.
pub trait KeyConvertible: Sized {
    /// Descriptor written alongside the material.
    fn descriptor(&self) -> KeyDescriptor;

    /// Raw key bytes.
    fn to_key_material(&self) -> Zeroizing<Vec<u8>>;

    /// Rebuild from raw key bytes. Fails on a descriptor of the wrong kind.
    fn from_key_material(descriptor: &KeyDescriptor, material: &[u8]) -> Result<Self>;
}

/// Values stored as DER certificates.
pub trait CertificateConvertible: Sized {
    /// DER encoding.
    fn to_der(&self) -> Vec<u8>;

    /// Rebuild from DER.
    fn from_der(der: &[u8]) -> Result<Self>;
}

impl DataConvertible for Vec<u8> {
    fn to_data(&self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(self.clone()))
    }

    fn from_data(data: &[u8]) -> Result<Self> {
        Ok(data.to_vec())
    }
}

impl DataConvertible for String {
    fn to_data(&self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(self.as_bytes().to_vec()))
    }

    fn from_data(data: &[u8]) -> Result<Self> {
        String::from_utf8(data.to_vec())
            .map_err(|_| KeychainError::conversion("stored data is not valid UTF-8"))
    }
}

/// Stores any serde type as JSON bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: Serialize + DeserializeOwned> DataConvertible for Json<T> {
    fn to_data(&self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(serde_json::to_vec(&self.0)?))
    }

    fn from_data(data: &[u8]) -> Result<Self> {
        Ok(Json(serde_json::from_slice(data)?))
    }
}

/// AES key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey(Vec<u8>);

impl SymmetricKey {
    const VALID_SIZES: [usize; 3] = [16, 24, 32];

    /// Generate a random key of `size_in_bits` (128, 192 or 256). Any other
    /// size fails with `ConversionFailed`.
    pub fn generate(size_in_bits: u32) -> Result<Self> {
        use rand::RngCore;

        if size_in_bits % 8 != 0 {
            return Err(KeychainError::conversion(format!(
                "invalid AES key size: {size_in_bits} bits"
            )));
        }
        let len = Self::checked_len(size_in_bits as usize / 8)?;
        let mut bytes = vec![0u8; len];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Ok(Self(bytes))
    }

    /// Wrap existing key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::checked_len(bytes.len())?;
        Ok(Self(bytes.to_vec()))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn checked_len(len: usize) -> Result<usize> {
        if Self::VALID_SIZES.contains(&len) {
            Ok(len)
        } else {
            Err(KeychainError::conversion(format!(
                "invalid AES key length: {len} bytes"
            )))
        }
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey(<{} bits>)", self.0.len() * 8)
    }
}

impl KeyConvertible for SymmetricKey {
    fn descriptor(&self) -> KeyDescriptor {
        KeyDescriptor::new(KeyType::Aes, KeyClass::Symmetric, self.0.len() as u32 * 8)
    }

    fn to_key_material(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.0.clone())
    }

    fn from_key_material(descriptor: &KeyDescriptor, material: &[u8]) -> Result<Self> {
        descriptor.require(KeyType::Aes, KeyClass::Symmetric)?;
        Self::from_bytes(material)
    }
}

fn key_bytes_32(material: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    if material.len() != 32 {
        return Err(KeychainError::conversion(format!(
            "expected 32 bytes of key material, found {}",
            material.len()
        )));
    }
    let mut bytes = Zeroizing::new([0u8; 32]);
    bytes.copy_from_slice(material);
    Ok(bytes)
}

impl KeyConvertible for ed25519_dalek::SigningKey {
    fn descriptor(&self) -> KeyDescriptor {
        KeyDescriptor::new(KeyType::Ed25519, KeyClass::Private, 256)
    }

    fn to_key_material(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.to_bytes().to_vec())
    }

    fn from_key_material(descriptor: &KeyDescriptor, material: &[u8]) -> Result<Self> {
        descriptor.require(KeyType::Ed25519, KeyClass::Private)?;
        let bytes = key_bytes_32(material)?;
        Ok(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }
}

impl KeyConvertible for ed25519_dalek::VerifyingKey {
    fn descriptor(&self) -> KeyDescriptor {
        KeyDescriptor::new(KeyType::Ed25519, KeyClass::Public, 256)
    }

    fn to_key_material(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.to_bytes().to_vec())
    }

    fn from_key_material(descriptor: &KeyDescriptor, material: &[u8]) -> Result<Self> {
        descriptor.require(KeyType::Ed25519, KeyClass::Public)?;
        let bytes = key_bytes_32(material)?;
        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|e| KeychainError::conversion(format!("invalid Ed25519 public key: {e}")))
    }
}

impl KeyConvertible for x25519_dalek::StaticSecret {
    fn descriptor(&self) -> KeyDescriptor {
        KeyDescriptor::new(KeyType::X25519, KeyClass::Private, 256)
    }

    fn to_key_material(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.to_bytes().to_vec())
    }

    fn from_key_material(descriptor: &KeyDescriptor, material: &[u8]) -> Result<Self> {
        descriptor.require(KeyType::X25519, KeyClass::Private)?;
        let bytes = key_bytes_32(material)?;
        Ok(x25519_dalek::StaticSecret::from(*bytes))
    }
}

impl KeyConvertible for x25519_dalek::PublicKey {
    fn descriptor(&self) -> KeyDescriptor {
        KeyDescriptor::new(KeyType::X25519, KeyClass::Public, 256)
    }

    fn to_key_material(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.as_bytes().to_vec())
    }

    fn from_key_material(descriptor: &KeyDescriptor, material: &[u8]) -> Result<Self> {
        descriptor.require(KeyType::X25519, KeyClass::Public)?;
        let bytes = key_bytes_32(material)?;
        Ok(x25519_dalek::PublicKey::from(*bytes))
    }
}

/// DER-encoded X.509 certificate.
///
/// Only the outer SEQUENCE framing is checked; the contents are opaque.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CertificateDer(Vec<u8>);

impl CertificateDer {
    /// Validate the outer DER framing and wrap the bytes.
    pub fn from_bytes(der: &[u8]) -> Result<Self> {
        let (header, body) = der_sequence_length(der)?;
        if header + body != der.len() {
            return Err(KeychainError::conversion(format!(
                "DER length mismatch: header declares {} bytes, found {}",
                header + body,
                der.len()
            )));
        }
        Ok(Self(der.to_vec()))
    }

    /// DER bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// SHA-256 fingerprint of the DER encoding.
    pub fn fingerprint(&self) -> [u8; 32] {
        Sha256::digest(&self.0).into()
    }

    /// Serial number, issuer and subject of an X.509 certificate.
    ///
    /// Returns `None` when the contents are not shaped like a
    /// `TBSCertificate`.
    pub fn fields(&self) -> Option<CertificateFields> {
        const SEQUENCE: u8 = 0x30;
        const INTEGER: u8 = 0x02;
        const VERSION: u8 = 0xa0;

        let certificate = DerElement::parse(&self.0)?.0;
        let (tbs, _) = DerElement::parse(certificate.contents)?;
        if certificate.tag != SEQUENCE || tbs.tag != SEQUENCE {
            return None;
        }

        let (mut element, mut rest) = DerElement::parse(tbs.contents)?;
        if element.tag == VERSION {
            (element, rest) = DerElement::parse(rest)?;
        }
        if element.tag != INTEGER {
            return None;
        }
        let serial_number = element.contents.to_vec();

        let (algorithm, rest) = DerElement::parse(rest)?;
        let (issuer, rest) = DerElement::parse(rest)?;
        if algorithm.tag != SEQUENCE || issuer.tag != SEQUENCE {
            return None;
        }
        let subject = DerElement::parse(rest)
            .and_then(|(_validity, rest)| DerElement::parse(rest))
            .filter(|(subject, _)| subject.tag == SEQUENCE)
            .map(|(subject, _)| subject.raw.to_vec());

        Some(CertificateFields {
            serial_number,
            issuer: issuer.raw.to_vec(),
            subject,
        })
    }
}

/// Identity fields read from a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFields {
    /// Contents of the serial number INTEGER.
    pub serial_number: Vec<u8>,
    /// DER-encoded issuer name.
    pub issuer: Vec<u8>,
    /// DER-encoded subject name, when present.
    pub subject: Option<Vec<u8>>,
}

/// One DER element borrowed from a larger encoding.
struct DerElement<'a> {
    tag: u8,
    contents: &'a [u8],
    raw: &'a [u8],
}

impl<'a> DerElement<'a> {
    /// Split the first element off `input`, returning it and the remainder.
    fn parse(input: &'a [u8]) -> Option<(Self, &'a [u8])> {
        let (&tag, after_tag) = input.split_first()?;
        let (&first, after_length) = after_tag.split_first()?;
        let (len, body) = if first < 0x80 {
            (usize::from(first), after_length)
        } else {
            let count = usize::from(first & 0x7f);
            if count == 0 || count > 4 || after_length.len() < count {
                return None;
            }
            let len = after_length[..count]
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
            (len, &after_length[count..])
        };
        if body.len() < len {
            return None;
        }
        let header = input.len() - body.len();
        let (contents, rest) = body.split_at(len);
        Some((
            Self {
                tag,
                contents,
                raw: &input[..header + len],
            },
            rest,
        ))
    }
}

impl fmt::Debug for CertificateDer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CertificateDer({} bytes, sha256:{})",
            self.0.len(),
            hex::encode(&self.fingerprint()[..8])
        )
    }
}

/// Returns (header length, body length) of a DER SEQUENCE.
fn der_sequence_length(der: &[u8]) -> Result<(usize, usize)> {
    const SEQUENCE: u8 = 0x30;

    match der {
        [SEQUENCE, len, ..] if *len < 0x80 => Ok((2, usize::from(*len))),
        [SEQUENCE, len, rest @ ..] => {
            let count = usize::from(*len & 0x7f);
            if count == 0 || count > 4 || rest.len() < count {
                return Err(KeychainError::conversion("malformed DER length"));
            }
            let body = rest[..count]
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
            Ok((2 + count, body))
        }
        _ => Err(KeychainError::conversion(
            "certificate is not a DER SEQUENCE",
        )),
    }
}

impl CertificateConvertible for CertificateDer {
    fn to_der(&self) -> Vec<u8> {
        self.0.clone()
    }

    fn from_der(der: &[u8]) -> Result<Self> {
        Self::from_bytes(der)
    }
}

/// Private key paired with its certificate.
///
/// Produced by importing a PKCS#12 bundle or by retrieving an identity item;
/// there is no public constructor.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityBundle {
    descriptor: KeyDescriptor,
    material: Zeroizing<Vec<u8>>,
    certificate: CertificateDer,
}

impl IdentityBundle {
    pub(crate) fn from_parts(
        descriptor: KeyDescriptor,
        material: Zeroizing<Vec<u8>>,
        certificate: CertificateDer,
    ) -> Result<Self> {
        if descriptor.key_class != KeyClass::Private {
            return Err(KeychainError::conversion(
                "identity key must be a private key",
            ));
        }
        Ok(Self {
            descriptor,
            material,
            certificate,
        })
    }

    /// The identity's certificate.
    pub fn certificate(&self) -> &CertificateDer {
        &self.certificate
    }

    /// Descriptor of the private key.
    pub fn private_key_descriptor(&self) -> KeyDescriptor {
        self.descriptor
    }

    /// Decode the private key into a concrete key type.
    pub fn private_key<K: KeyConvertible>(&self) -> Result<K> {
        K::from_key_material(&self.descriptor, &self.material)
    }
}

impl fmt::Debug for IdentityBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityBundle")
            .field("private_key", &self.descriptor)
            .field("certificate", &self.certificate)
            .finish()
    }
}

/// Payload accepted by queries of item class `C`.
///
/// Implemented by blanket impls only: data types for credentials, key types
/// for keys, certificate types for certificates, [`IdentityBundle`] for
/// identities.
pub trait Payload<C>: Sized {
    /// Encode for the store.
    fn encode(&self) -> Result<NativePayload>;

    /// Decode a payload returned by the store.
    fn decode(payload: NativePayload) -> Result<Self>;
}

fn unexpected(expected: &str, found: &NativePayload) -> KeychainError {
    KeychainError::conversion(format!(
        "expected {expected} payload, found {}",
        found.kind()
    ))
}

fn encode_data<T: DataConvertible>(value: &T) -> Result<NativePayload> {
    Ok(NativePayload::Data(value.to_data()?))
}

fn decode_data<T: DataConvertible>(payload: NativePayload) -> Result<T> {
    match payload {
        NativePayload::Data(bytes) => T::from_data(&bytes),
        other => Err(unexpected("data", &other)),
    }
}

impl<T: DataConvertible> Payload<GenericCredential> for T {
    fn encode(&self) -> Result<NativePayload> {
        encode_data(self)
    }

    fn decode(payload: NativePayload) -> Result<Self> {
        decode_data(payload)
    }
}

impl<T: DataConvertible> Payload<InternetCredential> for T {
    fn encode(&self) -> Result<NativePayload> {
        encode_data(self)
    }

    fn decode(payload: NativePayload) -> Result<Self> {
        decode_data(payload)
    }
}

impl<T: KeyConvertible> Payload<CryptoKey> for T {
    fn encode(&self) -> Result<NativePayload> {
        Ok(NativePayload::Key {
            descriptor: self.descriptor(),
            material: self.to_key_material(),
        })
    }

    fn decode(payload: NativePayload) -> Result<Self> {
        match payload {
            NativePayload::Key {
                descriptor,
                material,
            } => T::from_key_material(&descriptor, &material),
            other => Err(unexpected("key", &other)),
        }
    }
}

impl<T: CertificateConvertible> Payload<Certificate> for T {
    fn encode(&self) -> Result<NativePayload> {
        Ok(NativePayload::Certificate(self.to_der()))
    }

    fn decode(payload: NativePayload) -> Result<Self> {
        match payload {
            NativePayload::Certificate(der) => T::from_der(&der),
            other => Err(unexpected("certificate", &other)),
        }
    }
}

impl Payload<Identity> for IdentityBundle {
    fn encode(&self) -> Result<NativePayload> {
        Ok(NativePayload::Identity {
            descriptor: self.descriptor,
            material: self.material.clone(),
            certificate: self.certificate.to_der(),
        })
    }

    fn decode(payload: NativePayload) -> Result<Self> {
        match payload {
            NativePayload::Identity {
                descriptor,
                material,
                certificate,
            } => IdentityBundle::from_parts(
                descriptor,
                material,
                CertificateDer::from_bytes(&certificate)?,
            ),
            other => Err(unexpected("identity", &other)),
        }
    }
}
