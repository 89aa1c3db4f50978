//! Item classes.
//!
//! A query is parameterized by one of the zero-sized markers below. The
//! marker fixes the native class constant and, through
//! [`LegalFor`](crate::attributes::LegalFor), the set of attributes the query
//! may carry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attributes::AttributeKey;

mod sealed {
    pub trait Sealed {}
}

/// Runtime discriminator for the closed set of item classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ItemClassKind {
    /// Application password addressed by service and account.
    GenericPassword,
    /// Web or network password addressed by server, port and protocol.
    InternetPassword,
    /// Cryptographic key.
    Key,
    /// X.509 certificate.
    Certificate,
    /// Private key paired with its certificate.
    Identity,
}

impl ItemClassKind {
    /// Every item class, in native enumeration order.
    pub const ALL: [ItemClassKind; 5] = [
        Self::GenericPassword,
        Self::InternetPassword,
        Self::Key,
        Self::Certificate,
        Self::Identity,
    ];

    /// Native class constant.
    pub const fn native(self) -> &'static str {
        match self {
            Self::GenericPassword => "genp",
            Self::InternetPassword => "inet",
            Self::Key => "keys",
            Self::Certificate => "cert",
            Self::Identity => "idnt",
        }
    }

    /// Parse a native class constant.
    pub fn from_native(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.native() == value)
    }

    /// Attributes that together identify an item of this class.
    ///
    /// Adding a second item that agrees on all of these (plus access group
    /// and synchronizable) is rejected as a duplicate.
    pub const fn primary_keys(self) -> &'static [AttributeKey] {
        match self {
            Self::GenericPassword => &[AttributeKey::Account, AttributeKey::Service],
            Self::InternetPassword => &[
                AttributeKey::Account,
                AttributeKey::SecurityDomain,
                AttributeKey::Server,
                AttributeKey::Protocol,
                AttributeKey::AuthenticationType,
                AttributeKey::Port,
                AttributeKey::Path,
            ],
            Self::Key => &[
                AttributeKey::KeyClass,
                AttributeKey::ApplicationLabel,
                AttributeKey::ApplicationTag,
                AttributeKey::KeyType,
                AttributeKey::KeySizeInBits,
                AttributeKey::EffectiveKeySize,
            ],
            Self::Certificate | Self::Identity => &[
                AttributeKey::CertificateType,
                AttributeKey::Issuer,
                AttributeKey::SerialNumber,
            ],
        }
    }
}

impl fmt::Display for ItemClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GenericPassword => "GenericPassword",
            Self::InternetPassword => "InternetPassword",
            Self::Key => "Key",
            Self::Certificate => "Certificate",
            Self::Identity => "Identity",
        };
        f.write_str(name)
    }
}

/// Compile-time item class marker.
///
/// Sealed: the set of classes is fixed by the underlying store.
pub trait ItemClass: sealed::Sealed + fmt::Debug + Copy + Default + Send + Sync + 'static {
    /// Runtime discriminator for this class.
    const KIND: ItemClassKind;
}

macro_rules! item_classes {
    ($($(#[$meta:meta])* $name:ident => $kind:ident;)+) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
            pub struct $name;

            impl sealed::Sealed for $name {}

            impl ItemClass for $name {
                const KIND: ItemClassKind = ItemClassKind::$kind;
            }
        )+
    };
}

item_classes! {
    /// Generic password items (`genp`).
    GenericCredential => GenericPassword;
    /// Internet password items (`inet`).
    InternetCredential => InternetPassword;
    /// Cryptographic key items (`keys`).
    CryptoKey => Key;
    /// Certificate items (`cert`).
    Certificate => Certificate;
    /// Identity items (`idnt`).
    Identity => Identity;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_round_trip() {
        for class in ItemClassKind::ALL {
            assert_eq!(ItemClassKind::from_native(class.native()), Some(class));
        }
        assert_eq!(ItemClassKind::from_native("nope"), None);
    }

    #[test]
    fn test_marker_kinds() {
        assert_eq!(GenericCredential::KIND, ItemClassKind::GenericPassword);
        assert_eq!(InternetCredential::KIND, ItemClassKind::InternetPassword);
        assert_eq!(CryptoKey::KIND, ItemClassKind::Key);
        assert_eq!(Certificate::KIND, ItemClassKind::Certificate);
        assert_eq!(Identity::KIND, ItemClassKind::Identity);
    }

    #[test]
    fn test_primary_keys_are_legal_for_their_class() {
        for class in ItemClassKind::ALL {
            for key in class.primary_keys() {
                assert!(key.is_legal_for(class), "{key} on {class}");
            }
        }
    }
}
