//! In-memory secure item service.
//!
//! This implementation is for testing and development only. Items are not
//! encrypted and are lost when the process exits.
//!
//! It follows the store's observable contract closely enough for the facade
//! to be exercised end to end: class-scoped matching, duplicate detection on
//! the class primary key, creation and modification dates, persistent
//! references, and authentication prompts for items guarded by an access
//! control.
//!
//! # Thread Safety
//!
//! This service uses `RwLock` for thread-safe access. Lock poisoning is
//! reported as an `INTERNAL` status rather than a panic. Authentication
//! prompts run after the lock has been released.

use std::sync::{Arc, RwLock};

use chrono::Utc;

use super::traits::{
    status, ApproveAll, AuthenticationOutcome, Authenticator, SecureItemService, ServiceResult,
};
use crate::access::{AccessControlHandle, Accessibility, AuthenticationContext};
use crate::attributes::{AttributeKey, AttributeValue};
use crate::class::ItemClassKind;
use crate::native::{keys, NativeDictionary, NativePayload, NativeValue};

/// One stored item.
#[derive(Clone)]
struct StoredItem {
    class: ItemClassKind,
    attributes: NativeDictionary,
    payload: NativePayload,
    access_control: Option<AccessControlHandle>,
    persistent_ref: Vec<u8>,
}

impl StoredItem {
    /// Values that decide whether two items of the same class collide.
    fn identity(&self) -> Vec<NativeValue> {
        identity_of(self.class, &self.attributes)
    }

    fn to_result(&self, query: &NativeDictionary) -> NativeDictionary {
        let mut result = NativeDictionary::new();
        result.insert(keys::CLASS, NativeValue::Constant(self.class.native()));
        if query.flag(keys::RETURN_ATTRIBUTES) {
            result.merge(&self.attributes);
            if let Some(control) = &self.access_control {
                result.insert(keys::ACCESS_CONTROL, NativeValue::AccessControl(control.clone()));
            }
        }
        if query.flag(keys::RETURN_DATA) {
            result.insert(keys::VALUE_DATA, NativeValue::Payload(self.payload.clone()));
        }
        if query.flag(keys::RETURN_PERSISTENT_REF) {
            result.insert(
                keys::VALUE_PERSISTENT_REF,
                NativeValue::Data(self.persistent_ref.clone()),
            );
        }
        result
    }
}

fn identity_of(class: ItemClassKind, attributes: &NativeDictionary) -> Vec<NativeValue> {
    let mut identity: Vec<NativeValue> = class
        .primary_keys()
        .iter()
        .map(|key| {
            attributes
                .get(key.native())
                .cloned()
                .unwrap_or(NativeValue::Bool(false))
        })
        .collect();
    identity.push(
        attributes
            .get(AttributeKey::AccessGroup.native())
            .cloned()
            .unwrap_or(NativeValue::Bool(false)),
    );
    identity.push(
        attributes
            .get(AttributeKey::Synchronizable.native())
            .cloned()
            .unwrap_or(NativeValue::Bool(false)),
    );
    identity
}

fn query_class(query: &NativeDictionary) -> ServiceResult<ItemClassKind> {
    query
        .get(keys::CLASS)
        .and_then(NativeValue::as_str)
        .and_then(ItemClassKind::from_native)
        .ok_or(status::PARAM)
}

fn matches(item: &StoredItem, class: ItemClassKind, query: &NativeDictionary) -> bool {
    if item.class != class {
        return false;
    }
    // Absence of an access group selects the default group, not every group.
    let group = AttributeKey::AccessGroup.native();
    if item.attributes.get(group) != query.get(group) {
        return false;
    }
    let case_insensitive = query.flag(keys::MATCH_CASE_INSENSITIVE);
    query.iter().all(|(key, wanted)| {
        if key == keys::VALUE_PERSISTENT_REF {
            return matches!(wanted, NativeValue::Data(r) if *r == item.persistent_ref);
        }
        if AttributeKey::from_native(key).is_none() {
            return true;
        }
        item.attributes
            .get(key)
            .is_some_and(|have| have.matches(wanted, case_insensitive))
    })
}

/// In-memory implementation of the secure item service.
///
/// **Warning**: This is for testing only.
pub struct InMemoryItemService {
    items: RwLock<Vec<StoredItem>>,
    authenticator: Arc<dyn Authenticator>,
}

/// Helper function to handle lock poisoning gracefully.
fn lock_error(_context: &str) -> i32 {
    #[cfg(feature = "tracing")]
    tracing::error!(context = _context, "InMemoryItemService: lock poisoned");
    status::INTERNAL
}

impl InMemoryItemService {
    /// Create an empty service whose prompts always succeed.
    pub fn new() -> Self {
        Self::with_authenticator(Arc::new(ApproveAll))
    }

    /// Create an empty service that routes prompts to `authenticator`.
    pub fn with_authenticator(authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            authenticator,
        }
    }

    /// Get the number of stored items.
    ///
    /// Returns 0 if the lock is poisoned.
    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    /// Check if the service holds no items.
    ///
    /// Returns true if the lock is poisoned.
    pub fn is_empty(&self) -> bool {
        self.items.read().map(|items| items.is_empty()).unwrap_or(true)
    }

    /// Run the authentication step for an item guarded by `control`.
    fn authorize(
        &self,
        control: &AccessControlHandle,
        context: Option<&AuthenticationContext>,
    ) -> ServiceResult<()> {
        if !control.requires_authentication() {
            return Ok(());
        }
        if let Some(context) = context {
            if context.is_pre_authenticated() {
                return Ok(());
            }
            if !context.interaction_allowed() {
                return Err(status::INTERACTION_NOT_ALLOWED);
            }
        }
        match self.authenticator.authenticate(control, context) {
            AuthenticationOutcome::Success => Ok(()),
            AuthenticationOutcome::Failed => Err(status::AUTH_FAILED),
            AuthenticationOutcome::Cancelled => Err(status::USER_CANCELED),
        }
    }
}

impl Default for InMemoryItemService {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureItemService for InMemoryItemService {
    fn add(&self, mut attributes: NativeDictionary) -> ServiceResult<()> {
        let class = query_class(&attributes)?;
        let payload = match attributes.remove(keys::VALUE_DATA) {
            Some(NativeValue::Payload(payload)) => payload,
            _ => return Err(status::PARAM),
        };
        let access_control = match attributes.remove(keys::ACCESS_CONTROL) {
            Some(NativeValue::AccessControl(handle)) => Some(handle),
            Some(_) => return Err(status::PARAM),
            None => None,
        };

        let mut stored = NativeDictionary::new();
        for (key, value) in attributes.iter() {
            if AttributeKey::from_native(key).is_some() {
                stored.insert(key, value.clone());
            }
        }
        if let Some(handle) = &access_control {
            stored.insert(
                AttributeKey::Accessible.native(),
                NativeValue::Constant(handle.accessibility().native()),
            );
        }
        let now = NativeValue::Date(Utc::now());
        stored.insert(AttributeKey::CreationDate.native(), now.clone());
        stored.insert(AttributeKey::ModificationDate.native(), now);

        let item = StoredItem {
            class,
            attributes: stored,
            payload,
            access_control,
            persistent_ref: rand::random::<[u8; 20]>().to_vec(),
        };

        let mut items = self.items.write().map_err(|_| lock_error("add"))?;
        let identity = item.identity();
        if items
            .iter()
            .any(|existing| existing.class == class && existing.identity() == identity)
        {
            return Err(status::DUPLICATE_ITEM);
        }
        items.push(item);
        Ok(())
    }

    fn copy_matching(
        &self,
        query: &NativeDictionary,
        context: Option<&AuthenticationContext>,
    ) -> ServiceResult<Vec<NativeDictionary>> {
        let class = query_class(query)?;
        let limit_one = !matches!(
            query.get(keys::MATCH_LIMIT),
            Some(NativeValue::Constant(keys::MATCH_LIMIT_ALL))
        );

        let matched: Vec<StoredItem> = {
            let items = self.items.read().map_err(|_| lock_error("copy_matching"))?;
            let found = items.iter().filter(|item| matches(item, class, query)).cloned();
            if limit_one {
                found.take(1).collect()
            } else {
                found.collect()
            }
        };
        if matched.is_empty() {
            return Err(status::ITEM_NOT_FOUND);
        }

        let wants_data = query.flag(keys::RETURN_DATA);
        let mut results = Vec::with_capacity(matched.len());
        for item in &matched {
            if wants_data {
                if let Some(control) = &item.access_control {
                    self.authorize(control, context)?;
                }
            }
            results.push(item.to_result(query));
        }
        Ok(results)
    }

    fn update(&self, query: &NativeDictionary, changes: &NativeDictionary) -> ServiceResult<()> {
        let class = query_class(query)?;
        let mut items = self.items.write().map_err(|_| lock_error("update"))?;

        let targets: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| matches(item, class, query))
            .map(|(index, _)| index)
            .collect();
        if targets.is_empty() {
            return Err(status::ITEM_NOT_FOUND);
        }

        let now = NativeValue::Date(Utc::now());
        let mut updated = Vec::with_capacity(targets.len());
        for &index in &targets {
            let mut item = items[index].clone();
            for (key, value) in changes.iter() {
                match (key, value) {
                    (keys::VALUE_DATA, NativeValue::Payload(payload)) => {
                        item.payload = payload.clone();
                    }
                    (keys::ACCESS_CONTROL, NativeValue::AccessControl(handle)) => {
                        item.attributes.insert(
                            AttributeKey::Accessible.native(),
                            NativeValue::Constant(handle.accessibility().native()),
                        );
                        item.access_control = Some(handle.clone());
                    }
                    (keys::VALUE_DATA | keys::ACCESS_CONTROL, _) => return Err(status::PARAM),
                    _ if key == AttributeKey::Accessible.native() => {
                        let tier = Accessibility::from_native(value).ok_or(status::PARAM)?;
                        // Tier and access control stay in step.
                        if let Some(control) = &item.access_control {
                            item.access_control = Some(control.with_accessibility(tier));
                        }
                        item.attributes.insert(key, value.clone());
                    }
                    _ if AttributeKey::from_native(key).is_some() => {
                        item.attributes.insert(key, value.clone());
                    }
                    _ => {}
                }
            }
            item.attributes
                .insert(AttributeKey::ModificationDate.native(), now.clone());
            updated.push((index, item));
        }

        // Nothing is written when any updated item would collide with another.
        for (index, item) in &updated {
            let identity = item.identity();
            let collides_with_untouched = items.iter().enumerate().any(|(other, existing)| {
                other != *index
                    && !targets.contains(&other)
                    && existing.class == class
                    && existing.identity() == identity
            });
            let collides_with_updated = updated
                .iter()
                .any(|(other, sibling)| other != index && sibling.identity() == identity);
            if collides_with_untouched || collides_with_updated {
                return Err(status::DUPLICATE_ITEM);
            }
        }

        for (index, item) in updated {
            items[index] = item;
        }
        Ok(())
    }

    fn delete(&self, query: &NativeDictionary) -> ServiceResult<()> {
        let class = query_class(query)?;
        let mut items = self.items.write().map_err(|_| lock_error("delete"))?;
        let before = items.len();
        items.retain(|item| !matches(item, class, query));
        if items.len() == before {
            return Err(status::ITEM_NOT_FOUND);
        }
        Ok(())
    }
}
