//! Attribute schema.
//!
//! Every attribute is a zero-sized marker in [`attr`] carrying its value type
//! and native key. Legality is expressed twice from a single table: as
//! [`LegalFor`] trait impls, so that `Query<C>::set` refuses illegal
//! attributes at compile time, and as [`AttributeKey::is_legal_for`], which
//! guards the runtime path used for dynamically built queries.
//!
//! ```compile_fail
//! use keychain_lib::attributes::attr;
//! use keychain_lib::class::GenericCredential;
//! use keychain_lib::query::Query;
//!
//! // `Server` is an internet-credential attribute.
//! let query = Query::<GenericCredential>::new().with(attr::Server, "example.com".to_string());
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::Accessibility;
use crate::class::{
    Certificate, CryptoKey, GenericCredential, Identity, InternetCredential, ItemClass,
    ItemClassKind,
};
use crate::native::NativeValue;

/// A Rust type that can be carried by an attribute.
pub trait AttributeValue: Clone + fmt::Debug + PartialEq + Sized {
    /// Encode into the native representation.
    fn to_native(&self) -> NativeValue;

    /// Decode from the native representation.
    fn from_native(value: &NativeValue) -> Option<Self>;
}

impl AttributeValue for String {
    fn to_native(&self) -> NativeValue {
        NativeValue::String(self.clone())
    }

    fn from_native(value: &NativeValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl AttributeValue for bool {
    fn to_native(&self) -> NativeValue {
        NativeValue::Bool(*self)
    }

    fn from_native(value: &NativeValue) -> Option<Self> {
        match value {
            NativeValue::Bool(b) => Some(*b),
            NativeValue::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }
}

impl AttributeValue for u16 {
    fn to_native(&self) -> NativeValue {
        NativeValue::Integer(i64::from(*self))
    }

    fn from_native(value: &NativeValue) -> Option<Self> {
        match value {
            NativeValue::Integer(i) => u16::try_from(*i).ok(),
            _ => None,
        }
    }
}

impl AttributeValue for u32 {
    fn to_native(&self) -> NativeValue {
        NativeValue::Integer(i64::from(*self))
    }

    fn from_native(value: &NativeValue) -> Option<Self> {
        match value {
            NativeValue::Integer(i) => u32::try_from(*i).ok(),
            _ => None,
        }
    }
}

impl AttributeValue for Vec<u8> {
    fn to_native(&self) -> NativeValue {
        NativeValue::Data(self.clone())
    }

    fn from_native(value: &NativeValue) -> Option<Self> {
        match value {
            NativeValue::Data(d) => Some(d.clone()),
            _ => None,
        }
    }
}

impl AttributeValue for DateTime<Utc> {
    fn to_native(&self) -> NativeValue {
        NativeValue::Date(*self)
    }

    fn from_native(value: &NativeValue) -> Option<Self> {
        match value {
            NativeValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

/// Declares an enumeration backed by the store's native constants.
macro_rules! native_constants {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $native:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every variant.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Native constant.
            pub const fn native(self) -> &'static str {
                match self {
                    $(Self::$variant => $native),+
                }
            }

            /// Parse a native constant.
            pub fn from_constant(value: &str) -> Option<Self> {
                match value {
                    $($native => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl AttributeValue for $name {
            fn to_native(&self) -> NativeValue {
                NativeValue::Constant(self.native())
            }

            fn from_native(value: &NativeValue) -> Option<Self> {
                value.as_str().and_then(Self::from_constant)
            }
        }
    };
}

native_constants! {
    /// Protocol of an internet credential.
    InternetProtocol {
        /// FTP
        Ftp => "ftp ",
        /// HTTP
        Http => "http",
        /// HTTPS
        Https => "htps",
        /// SSH
        Ssh => "ssh ",
        /// Telnet
        Telnet => "teln",
        /// SMTP
        Smtp => "smtp",
        /// IMAP
        Imap => "imap",
        /// IMAP over TLS
        Imaps => "imps",
        /// POP3
        Pop3 => "pop3",
        /// LDAP
        Ldap => "ldap",
        /// LDAP over TLS
        Ldaps => "ldps",
        /// SMB
        Smb => "smb ",
        /// SOCKS
        Socks => "sox ",
        /// IRC
        Irc => "irc ",
    }
}

native_constants! {
    /// Authentication scheme of an internet credential.
    AuthenticationType {
        /// NTLM
        Ntlm => "ntlm",
        /// MSN
        Msn => "msna",
        /// DPA
        Dpa => "dpaa",
        /// RPA
        Rpa => "rpaa",
        /// HTTP basic
        HttpBasic => "http",
        /// HTTP digest
        HttpDigest => "httd",
        /// HTML form
        HtmlForm => "form",
        /// Store default
        Default => "dflt",
    }
}

native_constants! {
    /// Role of a key within its algorithm.
    KeyClass {
        /// Public half of a key pair
        Public => "0",
        /// Private half of a key pair
        Private => "1",
        /// Symmetric key
        Symmetric => "2",
    }
}

native_constants! {
    /// Key algorithm.
    KeyType {
        /// RSA
        Rsa => "42",
        /// Elliptic curve over a NIST prime field
        EcSecPrimeRandom => "73",
        /// AES
        Aes => "2147483649",
        /// Ed25519 signing key
        Ed25519 => "ed25519",
        /// X25519 agreement key
        X25519 => "x25519",
    }
}

/// Compile-time description of an attribute.
pub trait Attribute: Copy + fmt::Debug {
    /// Type of value the attribute carries.
    type Value: AttributeValue;

    /// Runtime identifier.
    const KEY: AttributeKey;
}

/// Marks an attribute as legal on queries of item class `C`.
pub trait LegalFor<C: ItemClass>: Attribute {}

macro_rules! legal_for {
    ($class:ident; common) => {
        true
    };
    ($class:ident; $($marker:ident),+) => {
        false $(|| $class == <$marker as ItemClass>::KIND)+
    };
}

macro_rules! legal_impls {
    ($name:ident; common) => {
        legal_impls!($name; GenericCredential, InternetCredential, CryptoKey, Certificate, Identity);
    };
    ($name:ident; $($marker:ident),+) => {
        $(impl LegalFor<$marker> for $name {})+
    };
}

macro_rules! define_attributes {
    ($(
        $(#[$meta:meta])*
        $name:ident: $value:ty => $native:literal [$($classes:tt)+];
    )+) => {
        /// Runtime identifier of an attribute.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum AttributeKey {
            $($(#[$meta])* $name,)+
        }

        impl AttributeKey {
            /// Every attribute key.
            pub const ALL: &'static [AttributeKey] = &[$(AttributeKey::$name),+];

            /// Native dictionary key.
            pub const fn native(self) -> &'static str {
                match self {
                    $(Self::$name => $native),+
                }
            }

            /// Parse a native dictionary key.
            pub fn from_native(key: &str) -> Option<Self> {
                match key {
                    $($native => Some(Self::$name),)+
                    _ => None,
                }
            }

            /// Human-readable attribute name.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name)),+
                }
            }

            /// Whether the attribute may appear on items of `class`.
            pub fn is_legal_for(self, class: ItemClassKind) -> bool {
                match self {
                    $(Self::$name => legal_for!(class; $($classes)+),)+
                }
            }

            /// Canonical form of `value` for this attribute, or `None` when
            /// the value does not decode as the attribute's declared type.
            pub fn canonicalize(self, value: &NativeValue) -> Option<NativeValue> {
                match self {
                    $(Self::$name => {
                        <<attr::$name as Attribute>::Value as AttributeValue>::from_native(value)
                            .map(|decoded| decoded.to_native())
                    })+
                }
            }

            /// Whether `value` decodes as the attribute's declared type.
            pub fn accepts(self, value: &NativeValue) -> bool {
                self.canonicalize(value).is_some()
            }
        }

        /// Attribute markers for use with [`Query::set`](crate::query::Query::set).
        pub mod attr {
            use super::*;

            $(
                $(#[$meta])*
                #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
                pub struct $name;

                impl Attribute for $name {
                    type Value = $value;
                    const KEY: AttributeKey = AttributeKey::$name;
                }

                legal_impls!($name; $($classes)+);
            )+
        }
    };
}

define_attributes! {
    /// Access group the item belongs to.
    AccessGroup: String => "agrp" [common];
    /// Accessibility tier.
    Accessible: Accessibility => "pdmn" [common];
    /// Whether the item syncs across the user's devices.
    Synchronizable: bool => "sync" [common];
    /// User-visible label.
    Label: String => "labl" [common];
    /// User-editable comment.
    Comment: String => "icmt" [common];
    /// Kind description, e.g. "Application password".
    Description: String => "desc" [common];
    /// Creation timestamp, set by the store.
    CreationDate: DateTime<Utc> => "cdat" [common];
    /// Last modification timestamp, set by the store.
    ModificationDate: DateTime<Utc> => "mdat" [common];

    /// Account name.
    Account: String => "acct" [GenericCredential, InternetCredential];
    /// Hidden from user-facing keychain browsers.
    IsInvisible: bool => "invi" [GenericCredential, InternetCredential];
    /// Placeholder recording that no password should be stored.
    IsNegative: bool => "nega" [GenericCredential, InternetCredential];

    /// Service name.
    Service: String => "svce" [GenericCredential];
    /// Application-defined attribute data.
    GenericData: Vec<u8> => "gena" [GenericCredential];

    /// Server domain or address.
    Server: String => "srvr" [InternetCredential];
    /// Server port.
    Port: u16 => "port" [InternetCredential];
    /// Network protocol.
    Protocol: InternetProtocol => "ptcl" [InternetCredential];
    /// Authentication scheme.
    AuthenticationType: super::AuthenticationType => "atyp" [InternetCredential];
    /// Security domain or realm.
    SecurityDomain: String => "sdmn" [InternetCredential];
    /// Path component of the URL.
    Path: String => "path" [InternetCredential];

    /// Public, private or symmetric.
    KeyClass: super::KeyClass => "kcls" [CryptoKey, Identity];
    /// Key algorithm.
    KeyType: super::KeyType => "type" [CryptoKey, Identity];
    /// Total key size in bits.
    KeySizeInBits: u32 => "bsiz" [CryptoKey, Identity];
    /// Effective key size in bits.
    EffectiveKeySize: u32 => "esiz" [CryptoKey, Identity];
    /// Application label, usually a public key hash.
    ApplicationLabel: Vec<u8> => "klbl" [CryptoKey, Identity];
    /// Application-private tag.
    ApplicationTag: Vec<u8> => "atag" [CryptoKey, Identity];
    /// Whether the key persists in the store.
    IsPermanent: bool => "perm" [CryptoKey, Identity];
    /// Key may encrypt.
    CanEncrypt: bool => "encr" [CryptoKey, Identity];
    /// Key may decrypt.
    CanDecrypt: bool => "decr" [CryptoKey, Identity];
    /// Key may derive other keys.
    CanDerive: bool => "drve" [CryptoKey, Identity];
    /// Key may sign.
    CanSign: bool => "sign" [CryptoKey, Identity];
    /// Key may verify signatures.
    CanVerify: bool => "vrfy" [CryptoKey, Identity];
    /// Key may wrap other keys.
    CanWrap: bool => "wrap" [CryptoKey, Identity];
    /// Key may unwrap other keys.
    CanUnwrap: bool => "unwp" [CryptoKey, Identity];

    /// Certificate type.
    CertificateType: u32 => "ctyp" [Certificate, Identity];
    /// Certificate encoding.
    CertificateEncoding: u32 => "cenc" [Certificate, Identity];
    /// DER-encoded subject name.
    Subject: Vec<u8> => "subj" [Certificate, Identity];
    /// DER-encoded issuer name.
    Issuer: Vec<u8> => "issr" [Certificate, Identity];
    /// DER-encoded serial number.
    SerialNumber: Vec<u8> => "slnr" [Certificate, Identity];
    /// Subject key identifier.
    SubjectKeyId: Vec<u8> => "skid" [Certificate, Identity];
    /// Hash of the certificate's public key.
    PublicKeyHash: Vec<u8> => "pkhh" [Certificate, Identity];
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legal_classes(key: AttributeKey) -> Vec<ItemClassKind> {
        ItemClassKind::ALL
            .into_iter()
            .filter(|class| key.is_legal_for(*class))
            .collect()
    }

    #[test]
    fn test_common_attributes_are_legal_everywhere() {
        for key in [
            AttributeKey::AccessGroup,
            AttributeKey::Accessible,
            AttributeKey::Synchronizable,
            AttributeKey::Label,
            AttributeKey::Comment,
            AttributeKey::Description,
            AttributeKey::CreationDate,
            AttributeKey::ModificationDate,
        ] {
            assert_eq!(legal_classes(key), ItemClassKind::ALL.to_vec(), "{key}");
        }
    }

    #[test]
    fn test_class_specific_legality_table() {
        use ItemClassKind::*;

        assert_eq!(legal_classes(AttributeKey::Service), vec![GenericPassword]);
        assert_eq!(
            legal_classes(AttributeKey::Account),
            vec![GenericPassword, InternetPassword]
        );
        for key in [
            AttributeKey::Server,
            AttributeKey::Port,
            AttributeKey::Protocol,
            AttributeKey::AuthenticationType,
            AttributeKey::SecurityDomain,
            AttributeKey::Path,
        ] {
            assert_eq!(legal_classes(key), vec![InternetPassword], "{key}");
        }
        for key in [
            AttributeKey::KeyClass,
            AttributeKey::KeySizeInBits,
            AttributeKey::KeyType,
            AttributeKey::IsPermanent,
            AttributeKey::CanEncrypt,
        ] {
            assert_eq!(legal_classes(key), vec![Key, Identity], "{key}");
        }
        for key in [
            AttributeKey::Subject,
            AttributeKey::Issuer,
            AttributeKey::SerialNumber,
        ] {
            assert_eq!(legal_classes(key), vec![Certificate, Identity], "{key}");
        }
    }

    #[test]
    fn test_every_key_is_legal_somewhere() {
        for key in AttributeKey::ALL {
            assert!(!legal_classes(*key).is_empty(), "{key}");
        }
    }

    #[test]
    fn test_native_keys_are_unique() {
        for key in AttributeKey::ALL {
            assert_eq!(AttributeKey::from_native(key.native()), Some(*key));
        }
    }

    #[test]
    fn test_marker_keys() {
        assert_eq!(<attr::Service as Attribute>::KEY, AttributeKey::Service);
        assert_eq!(<attr::Port as Attribute>::KEY.native(), "port");
    }

    #[test]
    fn test_constant_round_trip() {
        for protocol in InternetProtocol::ALL {
            let native = protocol.to_native();
            assert_eq!(InternetProtocol::from_native(&native), Some(*protocol));
        }
        assert_eq!(KeyType::from_constant("73"), Some(KeyType::EcSecPrimeRandom));
        assert_eq!(KeyClass::from_constant("9"), None);
    }

    #[test]
    fn test_values_are_checked_against_declared_type() {
        assert!(AttributeKey::Port.accepts(&NativeValue::Integer(443)));
        assert!(!AttributeKey::Port.accepts(&NativeValue::String("443".into())));
        assert!(!AttributeKey::Service.accepts(&NativeValue::Integer(1)));
        assert!(!AttributeKey::Protocol.accepts(&NativeValue::Constant("gopher")));
        assert_eq!(
            AttributeKey::Synchronizable.canonicalize(&NativeValue::Integer(1)),
            Some(NativeValue::Bool(true))
        );
        assert_eq!(
            AttributeKey::Protocol.canonicalize(&NativeValue::String("htps".into())),
            Some(NativeValue::Constant("htps"))
        );
    }

    #[test]
    fn test_integer_attribute_range() {
        assert_eq!(u16::from_native(&NativeValue::Integer(443)), Some(443));
        assert_eq!(u16::from_native(&NativeValue::Integer(70_000)), None);
    }
}
