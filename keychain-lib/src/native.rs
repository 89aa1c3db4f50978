//! Native representation exchanged with the secure item service.
//!
//! Queries, attribute sets and results all travel as [`NativeDictionary`]
//! values keyed by the store's four-character constants. Secret material
//! only ever appears inside [`NativeValue::Payload`], whose `Debug` output
//! is redacted.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

use crate::access::AccessControlHandle;
use crate::codec::KeyDescriptor;

/// Native dictionary keys that are not item attributes.
pub mod keys {
    /// Item class discriminator.
    pub const CLASS: &str = "class";
    /// Match limit.
    pub const MATCH_LIMIT: &str = "m_Limit";
    /// Match limit value: first match only.
    pub const MATCH_LIMIT_ONE: &str = "m_LimitOne";
    /// Match limit value: every match.
    pub const MATCH_LIMIT_ALL: &str = "m_LimitAll";
    /// Case-insensitive string matching.
    pub const MATCH_CASE_INSENSITIVE: &str = "m_CaseInsensitive";
    /// Request the payload.
    pub const RETURN_DATA: &str = "r_Data";
    /// Request the attribute dictionary.
    pub const RETURN_ATTRIBUTES: &str = "r_Attributes";
    /// Request the persistent reference.
    pub const RETURN_PERSISTENT_REF: &str = "r_PersistentRef";
    /// Payload value.
    pub const VALUE_DATA: &str = "v_Data";
    /// Persistent reference value.
    pub const VALUE_PERSISTENT_REF: &str = "v_PersistentRef";
    /// Access control object.
    pub const ACCESS_CONTROL: &str = "accc";
}

/// Opaque, store-issued handle that identifies an item across process runs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PersistentReference(Vec<u8>);

impl PersistentReference {
    /// Wrap bytes issued by the store.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw handle bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PersistentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PersistentReference({})", hex::encode(&self.0))
    }
}

/// Encoded payload of an item.
#[derive(Clone, PartialEq, Eq)]
pub enum NativePayload {
    /// Opaque password or data bytes.
    Data(Zeroizing<Vec<u8>>),
    /// Raw key material tagged with its descriptor.
    Key {
        /// Type, class and size of the key
        descriptor: KeyDescriptor,
        /// Raw key bytes
        material: Zeroizing<Vec<u8>>,
    },
    /// DER-encoded certificate.
    Certificate(Vec<u8>),
    /// Private key plus certificate.
    Identity {
        /// Descriptor of the private key
        descriptor: KeyDescriptor,
        /// Raw private key bytes
        material: Zeroizing<Vec<u8>>,
        /// DER-encoded certificate
        certificate: Vec<u8>,
    },
}

impl NativePayload {
    /// Short name of the payload kind, safe to log.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Data(_) => "data",
            Self::Key { .. } => "key",
            Self::Certificate(_) => "certificate",
            Self::Identity { .. } => "identity",
        }
    }
}

impl fmt::Debug for NativePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key { descriptor, .. } | Self::Identity { descriptor, .. } => {
                write!(f, "{}(<redacted>, {:?})", self.kind(), descriptor)
            }
            _ => write!(f, "{}(<redacted>)", self.kind()),
        }
    }
}

/// Value stored under a native dictionary key.
#[derive(Clone, PartialEq)]
pub enum NativeValue {
    /// Free-form string.
    String(String),
    /// Integer.
    Integer(i64),
    /// Boolean flag.
    Bool(bool),
    /// Non-secret binary attribute.
    Data(Vec<u8>),
    /// Timestamp.
    Date(DateTime<Utc>),
    /// One of the store's enumerated constants.
    Constant(&'static str),
    /// Item payload.
    Payload(NativePayload),
    /// Access control object.
    AccessControl(AccessControlHandle),
}

impl NativeValue {
    /// String view of string-like values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Constant(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two values the way the store matches query attributes.
    pub fn matches(&self, other: &NativeValue, case_insensitive: bool) -> bool {
        match (self.as_str(), other.as_str()) {
            (Some(a), Some(b)) if case_insensitive => a.eq_ignore_ascii_case(b),
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

impl fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Data(d) => write!(f, "<{} bytes>", d.len()),
            Self::Date(d) => write!(f, "{}", d.to_rfc3339()),
            Self::Constant(c) => write!(f, "{c}"),
            Self::Payload(p) => write!(f, "{p:?}"),
            Self::AccessControl(a) => write!(f, "{a:?}"),
        }
    }
}

/// Ordered native dictionary.
#[derive(Clone, Default, PartialEq)]
pub struct NativeDictionary(BTreeMap<&'static str, NativeValue>);

impl NativeDictionary {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous one.
    pub fn insert(&mut self, key: &'static str, value: NativeValue) -> Option<NativeValue> {
        self.0.insert(key, value)
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&NativeValue> {
        self.0.get(key)
    }

    /// Remove a value.
    pub fn remove(&mut self, key: &str) -> Option<NativeValue> {
        self.0.remove(key)
    }

    /// Check whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Check whether a boolean flag is present and set.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(NativeValue::Bool(true)))
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &NativeValue)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the dictionary is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy every entry of `other` into `self`, overwriting on conflict.
    pub fn merge(&mut self, other: &NativeDictionary) {
        for (key, value) in other.iter() {
            self.0.insert(key, value.clone());
        }
    }
}

impl fmt::Debug for NativeDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

impl FromIterator<(&'static str, NativeValue)> for NativeDictionary {
    fn from_iter<I: IntoIterator<Item = (&'static str, NativeValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
