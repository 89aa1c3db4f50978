//! Typed queries.
//!
//! `Query<C>` only accepts attributes that implement `LegalFor<C>`, so a
//! query for one item class can never carry another class's attributes.
//!
//! ```
//! use keychain_lib::attributes::attr;
//! use keychain_lib::class::GenericCredential;
//! use keychain_lib::query::Query;
//!
//! let query = Query::<GenericCredential>::new()
//!     .with(attr::Service, "OpenAI")
//!     .with(attr::Account, "api");
//!
//! assert_eq!(query.get(attr::Service).as_deref(), Some("OpenAI"));
//! assert_eq!(
//!     query.debug_description(),
//!     "Class: GenericPassword, Account: api, Service: OpenAI"
//! );
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use crate::attributes::{AttributeKey, AttributeValue, LegalFor};
use crate::class::ItemClass;
use crate::errors::KeychainError;
use crate::native::{keys, NativeDictionary, NativeValue, PersistentReference};
use crate::projection::Projection;
use crate::Result;

/// How many matches a read may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchLimit {
    /// First match only.
    #[default]
    One,
    /// Every match.
    All,
}

/// Attribute query for items of class `C`.
pub struct Query<C: ItemClass> {
    attributes: BTreeMap<AttributeKey, NativeValue>,
    limit: MatchLimit,
    case_insensitive: bool,
    persistent_reference: Option<PersistentReference>,
    _class: PhantomData<C>,
}

impl<C: ItemClass> Query<C> {
    /// Empty query matching every item of class `C`.
    pub fn new() -> Self {
        Self {
            attributes: BTreeMap::new(),
            limit: MatchLimit::default(),
            case_insensitive: false,
            persistent_reference: None,
            _class: PhantomData,
        }
    }

    /// Set an attribute.
    pub fn set<A: LegalFor<C>>(&mut self, _attribute: A, value: impl Into<A::Value>) -> &mut Self {
        self.attributes.insert(A::KEY, value.into().to_native());
        self
    }

    /// Builder form of [`set`](Self::set).
    pub fn with<A: LegalFor<C>>(mut self, attribute: A, value: impl Into<A::Value>) -> Self {
        self.set(attribute, value);
        self
    }

    /// Read back an attribute.
    pub fn get<A: LegalFor<C>>(&self, _attribute: A) -> Option<A::Value> {
        self.attributes
            .get(&A::KEY)
            .and_then(<A::Value as AttributeValue>::from_native)
    }

    /// Remove an attribute.
    pub fn unset<A: LegalFor<C>>(&mut self, _attribute: A) -> &mut Self {
        self.attributes.remove(&A::KEY);
        self
    }

    /// Set an attribute chosen at runtime.
    ///
    /// Fails with `InvalidAttributeForClass` when `key` is not legal for `C`,
    /// and with `InvalidQuery` when `value` does not decode as the
    /// attribute's type. The query is left unchanged on failure. Accepted
    /// values are stored in the same form [`set`](Self::set) would use.
    pub fn set_native(&mut self, key: AttributeKey, value: NativeValue) -> Result<&mut Self> {
        if !key.is_legal_for(C::KIND) {
            return Err(KeychainError::InvalidAttributeForClass {
                attribute: key,
                class: C::KIND,
            });
        }
        let value = key.canonicalize(&value).ok_or_else(|| {
            KeychainError::InvalidQuery(format!("{value:?} is not a valid {key} value"))
        })?;
        self.attributes.insert(key, value);
        Ok(self)
    }

    /// Look up an attribute chosen at runtime.
    pub fn get_native(&self, key: AttributeKey) -> Option<&NativeValue> {
        self.attributes.get(&key)
    }

    /// Attributes in key order.
    pub fn attributes(&self) -> impl Iterator<Item = (AttributeKey, &NativeValue)> {
        self.attributes.iter().map(|(k, v)| (*k, v))
    }

    /// Set the match limit.
    pub fn with_limit(mut self, limit: MatchLimit) -> Self {
        self.limit = limit;
        self
    }

    /// Match string attributes case-insensitively.
    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    /// Restrict the query to the item behind a persistent reference.
    pub fn with_persistent_reference(mut self, reference: PersistentReference) -> Self {
        self.persistent_reference = Some(reference);
        self
    }

    /// Match limit.
    pub fn limit(&self) -> MatchLimit {
        self.limit
    }

    /// Native query dictionary requesting `returns`.
    pub fn to_native(&self, returns: &[Projection]) -> NativeDictionary {
        let mut native = self.to_native_attributes();
        native.insert(keys::CLASS, NativeValue::Constant(C::KIND.native()));
        native.insert(
            keys::MATCH_LIMIT,
            NativeValue::Constant(match self.limit {
                MatchLimit::One => keys::MATCH_LIMIT_ONE,
                MatchLimit::All => keys::MATCH_LIMIT_ALL,
            }),
        );
        if self.case_insensitive {
            native.insert(keys::MATCH_CASE_INSENSITIVE, NativeValue::Bool(true));
        }
        if let Some(reference) = &self.persistent_reference {
            native.insert(
                keys::VALUE_PERSISTENT_REF,
                NativeValue::Data(reference.as_bytes().to_vec()),
            );
        }
        for projection in returns {
            native.insert(projection.native_key(), NativeValue::Bool(true));
        }
        native
    }

    /// Only the item attributes, keyed natively.
    pub fn to_native_attributes(&self) -> NativeDictionary {
        self.attributes
            .iter()
            .map(|(key, value)| (key.native(), value.clone()))
            .collect()
    }

    /// Human-readable summary: class plus non-secret attributes.
    pub fn debug_description(&self) -> String {
        let mut parts = vec![format!("Class: {}", C::KIND)];
        for (key, value) in &self.attributes {
            let rendered = match value {
                NativeValue::String(s) => s.clone(),
                other => format!("{other:?}"),
            };
            parts.push(format!("{key}: {rendered}"));
        }
        parts.join(", ")
    }
}

impl<C: ItemClass> Default for Query<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ItemClass> Clone for Query<C> {
    fn clone(&self) -> Self {
        Self {
            attributes: self.attributes.clone(),
            limit: self.limit,
            case_insensitive: self.case_insensitive,
            persistent_reference: self.persistent_reference.clone(),
            _class: PhantomData,
        }
    }
}

impl<C: ItemClass> fmt::Debug for Query<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.debug_description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Accessibility;
    use crate::attributes::{attr, InternetProtocol};
    use crate::class::{Certificate, CryptoKey, GenericCredential, Identity, InternetCredential};
    use crate::class::ItemClassKind;

    #[test]
    fn test_typed_set_and_get() {
        let mut query = Query::<InternetCredential>::new();
        query
            .set(attr::Server, "example.com")
            .set(attr::Port, 443u16)
            .set(attr::Protocol, InternetProtocol::Https);

        assert_eq!(query.get(attr::Server).as_deref(), Some("example.com"));
        assert_eq!(query.get(attr::Port), Some(443));
        assert_eq!(query.get(attr::Protocol), Some(InternetProtocol::Https));

        query.unset(attr::Port);
        assert_eq!(query.get(attr::Port), None);
    }

    fn sample_value(key: AttributeKey) -> NativeValue {
        [
            NativeValue::Bool(true),
            NativeValue::Integer(1),
            NativeValue::String("x".into()),
            NativeValue::Data(vec![1]),
            NativeValue::Date(chrono::Utc::now()),
            NativeValue::Constant("ak"),
            NativeValue::Constant("htps"),
            NativeValue::Constant("form"),
            NativeValue::Constant("1"),
            NativeValue::Constant("73"),
        ]
        .into_iter()
        .find(|value| key.accepts(value))
        .unwrap_or(NativeValue::Bool(true))
    }

    fn rejects_everywhere_but<C: ItemClass>(key: AttributeKey) -> bool {
        let mut query = Query::<C>::new();
        let result = query.set_native(key, sample_value(key)).map(|_| ());
        match result {
            Ok(_) => key.is_legal_for(C::KIND),
            Err(KeychainError::InvalidAttributeForClass { attribute, class }) => {
                attribute == key && class == C::KIND && query.get_native(key).is_none()
            }
            Err(_) => false,
        }
    }

    #[test]
    fn test_runtime_gating_covers_whole_table() {
        for key in AttributeKey::ALL {
            assert!(rejects_everywhere_but::<GenericCredential>(*key), "{key}");
            assert!(rejects_everywhere_but::<InternetCredential>(*key), "{key}");
            assert!(rejects_everywhere_but::<CryptoKey>(*key), "{key}");
            assert!(rejects_everywhere_but::<Certificate>(*key), "{key}");
            assert!(rejects_everywhere_but::<Identity>(*key), "{key}");
        }
    }

    #[test]
    fn test_runtime_gating_error() {
        let mut query = Query::<GenericCredential>::new();
        let err = query
            .set_native(AttributeKey::Server, NativeValue::String("x".into()))
            .unwrap_err();
        assert!(matches!(
            err,
            KeychainError::InvalidAttributeForClass {
                attribute: AttributeKey::Server,
                class: ItemClassKind::GenericPassword,
            }
        ));
    }

    #[test]
    fn test_runtime_set_checks_value_type() {
        let mut query = Query::<InternetCredential>::new();
        let err = query
            .set_native(AttributeKey::Port, NativeValue::String("443".into()))
            .unwrap_err();
        assert!(matches!(err, KeychainError::InvalidQuery(_)));
        assert!(query.get_native(AttributeKey::Port).is_none());

        query
            .set_native(AttributeKey::Port, NativeValue::Integer(443))
            .unwrap();
        assert_eq!(query.get(attr::Port), Some(443));

        query
            .set_native(AttributeKey::Synchronizable, NativeValue::Integer(1))
            .unwrap();
        assert_eq!(
            query.get_native(AttributeKey::Synchronizable),
            Some(&NativeValue::Bool(true))
        );
    }

    #[test]
    fn test_native_representation() {
        let query = Query::<GenericCredential>::new()
            .with(attr::Service, "OpenAI")
            .with(attr::Accessible, Accessibility::AfterFirstUnlock)
            .with_limit(MatchLimit::All)
            .case_insensitive();

        let native = query.to_native(&[Projection::Data, Projection::Attributes]);
        assert_eq!(native.get(keys::CLASS), Some(&NativeValue::Constant("genp")));
        assert_eq!(native.get("svce"), Some(&NativeValue::String("OpenAI".into())));
        assert_eq!(native.get("pdmn"), Some(&NativeValue::Constant("ck")));
        assert_eq!(
            native.get(keys::MATCH_LIMIT),
            Some(&NativeValue::Constant(keys::MATCH_LIMIT_ALL))
        );
        assert!(native.flag(keys::MATCH_CASE_INSENSITIVE));
        assert!(native.flag(keys::RETURN_DATA));
        assert!(native.flag(keys::RETURN_ATTRIBUTES));
        assert!(!native.contains_key(keys::RETURN_PERSISTENT_REF));
    }

    #[test]
    fn test_debug_description() {
        let query = Query::<GenericCredential>::new().with(attr::Service, "OpenAI");
        assert_eq!(query.debug_description(), "Class: GenericPassword, Service: OpenAI");

        let query = Query::<GenericCredential>::new().with(attr::GenericData, vec![1u8, 2, 3]);
        assert_eq!(format!("{query:?}"), "Class: GenericPassword, GenericData: <3 bytes>");
    }

    #[test]
    fn test_debug_order_is_deterministic() {
        let a = Query::<InternetCredential>::new()
            .with(attr::Server, "example.com")
            .with(attr::Account, "me");
        let b = Query::<InternetCredential>::new()
            .with(attr::Account, "me")
            .with(attr::Server, "example.com");
        assert_eq!(a.debug_description(), b.debug_description());
    }
}
