//! Result projection.
//!
//! The store answers reads with one native dictionary per match. This
//! module shapes such a dictionary into what the caller asked for: a decoded
//! value, an [`AttributeInfo`] record, or a [`ProjectionBag`] when several
//! projections were requested at once.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::access::Accessibility;
use crate::attributes::{Attribute, AttributeKey, AttributeValue};
use crate::class::ItemClassKind;
use crate::codec::Payload;
use crate::errors::KeychainError;
use crate::native::{keys, NativeDictionary, NativeValue, PersistentReference};
use crate::Result;

/// Part of an item a read may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Projection {
    /// The decoded payload.
    Data,
    /// The attribute record, without payload.
    Attributes,
    /// The persistent reference.
    PersistentReference,
}

impl Projection {
    /// Native return key requesting this projection.
    pub const fn native_key(self) -> &'static str {
        match self {
            Self::Data => keys::RETURN_DATA,
            Self::Attributes => keys::RETURN_ATTRIBUTES,
            Self::PersistentReference => keys::RETURN_PERSISTENT_REF,
        }
    }
}

/// Attribute metadata of a stored item. Never carries the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInfo {
    class: ItemClassKind,
    attributes: BTreeMap<AttributeKey, NativeValue>,
}

impl AttributeInfo {
    /// Build from a native item dictionary, dropping everything that is not
    /// a known attribute.
    pub fn from_native(item: &NativeDictionary) -> Result<Self> {
        let class = item
            .get(keys::CLASS)
            .and_then(NativeValue::as_str)
            .and_then(ItemClassKind::from_native)
            .ok_or_else(|| KeychainError::store_failure("item dictionary without class"))?;
        let attributes = item
            .iter()
            .filter(|(_, value)| !matches!(value, NativeValue::Payload(_)))
            .filter_map(|(key, value)| AttributeKey::from_native(key).map(|k| (k, value.clone())))
            .collect();
        Ok(Self { class, attributes })
    }

    /// Item class.
    pub fn class(&self) -> ItemClassKind {
        self.class
    }

    /// Typed attribute lookup.
    pub fn get<A: Attribute>(&self, _attribute: A) -> Option<A::Value> {
        self.attributes
            .get(&A::KEY)
            .and_then(<A::Value as AttributeValue>::from_native)
    }

    /// Runtime attribute lookup.
    pub fn get_native(&self, key: AttributeKey) -> Option<&NativeValue> {
        self.attributes.get(&key)
    }

    /// Attribute keys present on the item.
    pub fn keys(&self) -> impl Iterator<Item = AttributeKey> + '_ {
        self.attributes.keys().copied()
    }

    /// User-visible label.
    pub fn label(&self) -> Option<String> {
        self.string(AttributeKey::Label)
    }

    /// Comment.
    pub fn comment(&self) -> Option<String> {
        self.string(AttributeKey::Comment)
    }

    /// Access group.
    pub fn access_group(&self) -> Option<String> {
        self.string(AttributeKey::AccessGroup)
    }

    /// Accessibility tier.
    pub fn accessibility(&self) -> Option<Accessibility> {
        self.attributes
            .get(&AttributeKey::Accessible)
            .and_then(Accessibility::from_native)
    }

    /// Whether the item syncs.
    pub fn synchronizable(&self) -> bool {
        self.attributes
            .get(&AttributeKey::Synchronizable)
            .and_then(bool::from_native)
            .unwrap_or(false)
    }

    /// Creation timestamp.
    pub fn creation_date(&self) -> Option<DateTime<Utc>> {
        self.date(AttributeKey::CreationDate)
    }

    /// Last modification timestamp.
    pub fn modification_date(&self) -> Option<DateTime<Utc>> {
        self.date(AttributeKey::ModificationDate)
    }

    fn string(&self, key: AttributeKey) -> Option<String> {
        self.attributes.get(&key).and_then(String::from_native)
    }

    fn date(&self, key: AttributeKey) -> Option<DateTime<Utc>> {
        self.attributes
            .get(&key)
            .and_then(<DateTime<Utc> as AttributeValue>::from_native)
    }
}

/// One requested projection.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectedValue<V> {
    /// Decoded payload
    Data(V),
    /// Attribute record
    Attributes(AttributeInfo),
    /// Persistent reference
    PersistentReference(PersistentReference),
}

/// Several requested projections of the same item.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionBag<V> {
    /// Decoded payload, when requested
    pub data: Option<V>,
    /// Attribute record, when requested
    pub attributes: Option<AttributeInfo>,
    /// Persistent reference, when requested
    pub persistent_reference: Option<PersistentReference>,
}

/// Result shape mirroring the request: one projection yields a bare value,
/// several yield a bag.
#[derive(Debug, Clone, PartialEq)]
pub enum Projected<V> {
    /// Exactly one projection was requested.
    Single(ProjectedValue<V>),
    /// Two or more projections were requested.
    Bag(ProjectionBag<V>),
}

/// Remove duplicates, keeping first occurrences; reject an empty request.
pub(crate) fn normalize(projections: &[Projection]) -> Result<Vec<Projection>> {
    let mut unique = Vec::with_capacity(projections.len());
    for projection in projections {
        if !unique.contains(projection) {
            unique.push(*projection);
        }
    }
    if unique.is_empty() {
        return Err(KeychainError::InvalidQuery(
            "at least one projection is required".to_string(),
        ));
    }
    Ok(unique)
}

/// Decode the payload out of an item dictionary.
pub(crate) fn decode_value<C, V: Payload<C>>(item: &mut NativeDictionary) -> Result<V> {
    match item.remove(keys::VALUE_DATA) {
        Some(NativeValue::Payload(payload)) => V::decode(payload),
        Some(_) => Err(KeychainError::conversion("store returned a non-payload value")),
        None => Err(KeychainError::store_failure(
            "store omitted the requested payload",
        )),
    }
}

fn persistent_reference(item: &NativeDictionary) -> Result<PersistentReference> {
    match item.get(keys::VALUE_PERSISTENT_REF) {
        Some(NativeValue::Data(bytes)) => Ok(PersistentReference::from_bytes(bytes.clone())),
        _ => Err(KeychainError::store_failure(
            "store omitted the requested persistent reference",
        )),
    }
}

/// Shape one item dictionary according to `projections` (already normalized).
pub(crate) fn project<C, V: Payload<C>>(
    projections: &[Projection],
    mut item: NativeDictionary,
) -> Result<Projected<V>> {
    if let [single] = projections {
        let value = match single {
            Projection::Data => ProjectedValue::Data(decode_value::<C, V>(&mut item)?),
            Projection::Attributes => ProjectedValue::Attributes(AttributeInfo::from_native(&item)?),
            Projection::PersistentReference => {
                ProjectedValue::PersistentReference(persistent_reference(&item)?)
            }
        };
        return Ok(Projected::Single(value));
    }

    let mut bag = ProjectionBag {
        data: None,
        attributes: None,
        persistent_reference: None,
    };
    for projection in projections {
        match projection {
            Projection::Data => bag.data = Some(decode_value::<C, V>(&mut item)?),
            Projection::Attributes => bag.attributes = Some(AttributeInfo::from_native(&item)?),
            Projection::PersistentReference => {
                bag.persistent_reference = Some(persistent_reference(&item)?)
            }
        }
    }
    Ok(Projected::Bag(bag))
}
