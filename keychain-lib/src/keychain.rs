//! The keychain facade.
//!
//! [`Keychain`] combines typed queries, access policies and payload codecs
//! into store operations against a [`SecureItemService`]. It holds no
//! mutable state: its only fields are the service, the access group it is
//! scoped to, and optional collaborators.
//!
//! Every call blocks for the full store round-trip. When an item is guarded
//! by authentication that includes the time the user spends in the prompt.
//! Nothing is retried.

use std::fmt;
use std::sync::Arc;

use crate::access::{AccessPolicy, Accessibility, AuthenticationContext, AuthenticationOptions};
use crate::attributes::{AttributeKey, AttributeValue};
use crate::class::{ItemClass, ItemClassKind};
use crate::codec::{CertificateDer, IdentityBundle, Payload};
use crate::config::KeychainConfig;
use crate::errors::KeychainError;
use crate::native::{keys, NativeDictionary, NativePayload, NativeValue};
use crate::projection::{self, AttributeInfo, Projected, Projection};
use crate::query::{MatchLimit, Query};
use crate::secure_storage::{status, ParsedIdentity, Pkcs12Parser, SecureItemService};
use crate::Result;

/// Typed facade over a secure item service, scoped to one access group.
pub struct Keychain<S> {
    service: S,
    access_group: Option<String>,
    pkcs12: Option<Arc<dyn Pkcs12Parser>>,
}

impl<S: SecureItemService> Keychain<S> {
    /// Create a keychain over `service`, scoped to the access group that
    /// `config` resolves to.
    pub fn new(service: S, config: &KeychainConfig) -> Self {
        Self {
            service,
            access_group: config.resolved_access_group().map(str::to_owned),
            pkcs12: None,
        }
    }

    /// Attach a PKCS#12 parser, enabling [`import`](Self::import).
    pub fn with_pkcs12_parser(mut self, parser: Arc<dyn Pkcs12Parser>) -> Self {
        self.pkcs12 = Some(parser);
        self
    }

    /// Access group every operation is scoped to. `None` is the store's
    /// default group.
    pub fn access_group(&self) -> Option<&str> {
        self.access_group.as_deref()
    }

    /// Underlying service.
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Store a new item.
    ///
    /// Without a policy the item is protected as
    /// [`Accessibility::WhenUnlocked`] with no authentication requirement.
    /// Fails with `DuplicateItem` when an item with the same identity
    /// attributes exists; use [`update`](Self::update) to overwrite.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip(self, value, query, policy), fields(class = C::KIND.native()))
    )]
    pub fn store<C, V>(&self, value: &V, query: &Query<C>, policy: Option<&AccessPolicy>) -> Result<()>
    where
        C: ItemClass,
        V: Payload<C>,
    {
        let policy = self.effective_policy(query, policy)?;

        let mut attributes = query.to_native_attributes();
        attributes.insert(keys::CLASS, NativeValue::Constant(C::KIND.native()));
        self.scope(&mut attributes)?;

        let payload = value.encode()?;
        fill_derived_attributes(&payload, &mut attributes, true)?;
        attributes.insert(keys::VALUE_DATA, NativeValue::Payload(payload));

        if policy.requires_access_control() {
            attributes.insert(
                keys::ACCESS_CONTROL,
                NativeValue::AccessControl(policy.to_native_access_control()?),
            );
            attributes.remove(AttributeKey::Accessible.native());
        } else {
            attributes.insert(
                AttributeKey::Accessible.native(),
                policy.accessibility().to_native(),
            );
        }

        self.service.add(attributes).map_err(|code| {
            let err = KeychainError::from_status(code);
            #[cfg(feature = "tracing")]
            tracing::debug!(status = code, "store rejected: {err}");
            err
        })
    }

    /// Retrieve the payload of the first matching item.
    ///
    /// Returns `Ok(None)` when nothing matches. A cancelled or failed
    /// authentication prompt is an error, never `None`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip(self, query, context), fields(class = C::KIND.native()))
    )]
    pub fn retrieve<C, V>(
        &self,
        query: &Query<C>,
        context: Option<&AuthenticationContext>,
    ) -> Result<Option<V>>
    where
        C: ItemClass,
        V: Payload<C>,
    {
        let native = self.read_query(query, MatchLimit::One, &[Projection::Data])?;
        let Some(mut item) = self.fetch(&native, context)?.into_iter().next() else {
            return Ok(None);
        };
        projection::decode_value::<C, V>(&mut item).map(Some)
    }

    /// Retrieve selected projections of the first matching item.
    ///
    /// One projection yields [`Projected::Single`], several yield
    /// [`Projected::Bag`]. Duplicate projections are ignored.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip(self, query, context), fields(class = C::KIND.native()))
    )]
    pub fn retrieve_projected<C, V>(
        &self,
        projections: &[Projection],
        query: &Query<C>,
        context: Option<&AuthenticationContext>,
    ) -> Result<Option<Projected<V>>>
    where
        C: ItemClass,
        V: Payload<C>,
    {
        let projections = projection::normalize(projections)?;
        let native = self.read_query(query, MatchLimit::One, &projections)?;
        match self.fetch(&native, context)?.into_iter().next() {
            Some(item) => projection::project::<C, V>(&projections, item).map(Some),
            None => Ok(None),
        }
    }

    /// Retrieve the payloads of every matching item.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip(self, query, context), fields(class = C::KIND.native()))
    )]
    pub fn retrieve_all<C, V>(
        &self,
        query: &Query<C>,
        context: Option<&AuthenticationContext>,
    ) -> Result<Vec<V>>
    where
        C: ItemClass,
        V: Payload<C>,
    {
        let native = self.read_query(query, MatchLimit::All, &[Projection::Data])?;
        self.fetch(&native, context)?
            .into_iter()
            .map(|mut item| projection::decode_value::<C, V>(&mut item))
            .collect()
    }

    /// Replace the payload of every matching item.
    ///
    /// Fails with `ItemNotFound` when nothing matches; it never creates an
    /// item. Attributes not derived from the payload are preserved.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip(self, value, query), fields(class = C::KIND.native()))
    )]
    pub fn update<C, V>(&self, value: &V, query: &Query<C>) -> Result<()>
    where
        C: ItemClass,
        V: Payload<C>,
    {
        let native = self.match_query(query)?;

        let payload = value.encode()?;
        let mut changes = NativeDictionary::new();
        fill_derived_attributes(&payload, &mut changes, false)?;
        changes.insert(keys::VALUE_DATA, NativeValue::Payload(payload));

        self.service
            .update(&native, &changes)
            .map_err(KeychainError::from_status)
    }

    /// Change attributes of every matching item, keeping its payload.
    ///
    /// `changes` carries the new values; attributes it does not name stay
    /// as they are. Changing `Accessible` or `Synchronizable` re-validates
    /// the protection of every matching item first, and fails with
    /// `InvalidPolicy` without touching any item when one of them would
    /// end up with a combination `store` rejects.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip(self, query, changes), fields(class = C::KIND.native()))
    )]
    pub fn update_attributes<C: ItemClass>(&self, query: &Query<C>, changes: &Query<C>) -> Result<()> {
        let native = self.match_query(query)?;
        let mut changes = changes.to_native_attributes();
        if changes.is_empty() {
            return Err(KeychainError::InvalidQuery(
                "no attribute changes were given".to_string(),
            ));
        }
        self.check_group(&changes)?;
        changes.remove(AttributeKey::AccessGroup.native());
        if changes.is_empty() {
            return Ok(());
        }
        if changes.contains_key(AttributeKey::Accessible.native())
            || changes.contains_key(AttributeKey::Synchronizable.native())
        {
            self.check_protection_change(query, &changes)?;
        }
        self.service
            .update(&native, &changes)
            .map_err(KeychainError::from_status)
    }

    /// Delete every matching item. Deleting nothing is not an error.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip(self, query), fields(class = C::KIND.native()))
    )]
    pub fn remove<C: ItemClass>(&self, query: &Query<C>) -> Result<()> {
        let native = self.match_query(query)?;
        match self.service.delete(&native) {
            Ok(()) => Ok(()),
            Err(status::ITEM_NOT_FOUND) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("nothing to remove");
                Ok(())
            }
            Err(code) => Err(KeychainError::from_status(code)),
        }
    }

    /// Delete every item of every class in this keychain's access group.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self), fields(access_group = ?self.access_group)))]
    pub fn remove_all(&self) -> Result<()> {
        for class in ItemClassKind::ALL {
            let mut native = NativeDictionary::new();
            native.insert(keys::CLASS, NativeValue::Constant(class.native()));
            self.scope(&mut native)?;
            match self.service.delete(&native) {
                Ok(()) | Err(status::ITEM_NOT_FOUND) => {}
                Err(code) => return Err(KeychainError::from_status(code)),
            }
        }
        Ok(())
    }

    /// Attribute metadata of the first matching item, without its payload.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip(self, query), fields(class = C::KIND.native()))
    )]
    pub fn info<C: ItemClass>(&self, query: &Query<C>) -> Result<Option<AttributeInfo>> {
        let native = self.read_query(query, MatchLimit::One, &[Projection::Attributes])?;
        match self.fetch(&native, None)?.first() {
            Some(item) => AttributeInfo::from_native(item).map(Some),
            None => Ok(None),
        }
    }

    /// Attribute metadata of every matching item.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip(self, query), fields(class = C::KIND.native()))
    )]
    pub fn items<C: ItemClass>(&self, query: &Query<C>) -> Result<Vec<AttributeInfo>> {
        let native = self.read_query(query, MatchLimit::All, &[Projection::Attributes])?;
        self.fetch(&native, None)?
            .iter()
            .map(AttributeInfo::from_native)
            .collect()
    }

    /// Whether any item matches. Never prompts for authentication.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip(self, query), fields(class = C::KIND.native()))
    )]
    pub fn contains<C: ItemClass>(&self, query: &Query<C>) -> Result<bool> {
        let native = self.read_query(query, MatchLimit::One, &[])?;
        Ok(!self.fetch(&native, None)?.is_empty())
    }

    /// Parse a PKCS#12 bundle into identities.
    ///
    /// Nothing is stored; pass each bundle to [`store`](Self::store) with a
    /// `Query<Identity>`. The returned iterator converts lazily and is
    /// consumed once; call `import` again to re-parse.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip(self, bundle, passphrase), fields(bundle_len = bundle.len()))
    )]
    pub fn import(&self, bundle: &[u8], passphrase: &str) -> Result<IdentityImport> {
        let parser = self
            .pkcs12
            .as_ref()
            .ok_or(KeychainError::Unimplemented("PKCS#12 import"))?;
        let parsed = parser
            .parse(bundle, passphrase)
            .map_err(KeychainError::from_status)?;
        Ok(IdentityImport {
            remaining: parsed.into_iter(),
        })
    }

    /// Native read query with the access group applied.
    fn read_query<C: ItemClass>(
        &self,
        query: &Query<C>,
        limit: MatchLimit,
        returns: &[Projection],
    ) -> Result<NativeDictionary> {
        let mut native = query.clone().with_limit(limit).to_native(returns);
        self.scope(&mut native)?;
        Ok(native)
    }

    /// Native match query for update and delete: no limit, no returns.
    fn match_query<C: ItemClass>(&self, query: &Query<C>) -> Result<NativeDictionary> {
        let mut native = query.to_native(&[]);
        native.remove(keys::MATCH_LIMIT);
        self.scope(&mut native)?;
        Ok(native)
    }

    /// Run a read, mapping "nothing matched" to an empty result.
    fn fetch(
        &self,
        native: &NativeDictionary,
        context: Option<&AuthenticationContext>,
    ) -> Result<Vec<NativeDictionary>> {
        match self.service.copy_matching(native, context) {
            Ok(items) => Ok(items),
            Err(status::ITEM_NOT_FOUND) => Ok(Vec::new()),
            Err(code) => {
                let err = KeychainError::from_status(code);
                #[cfg(feature = "tracing")]
                tracing::debug!(status = code, "read failed: {err}");
                Err(err)
            }
        }
    }

    /// Reject a query naming another access group.
    fn check_group(&self, native: &NativeDictionary) -> Result<()> {
        let requested = native
            .get(AttributeKey::AccessGroup.native())
            .map(|value| value.as_str().unwrap_or_default());
        match requested {
            Some(group) if Some(group) != self.access_group.as_deref() => {
                Err(KeychainError::InvalidQuery(format!(
                    "access group {group:?} is outside this keychain's scope"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Pin `native` to this keychain's access group.
    fn scope(&self, native: &mut NativeDictionary) -> Result<()> {
        self.check_group(native)?;
        if let Some(group) = &self.access_group {
            native.insert(
                AttributeKey::AccessGroup.native(),
                NativeValue::String(group.clone()),
            );
        }
        Ok(())
    }

    /// Resolve the policy for a store, checking it against the query.
    fn effective_policy<C: ItemClass>(
        &self,
        query: &Query<C>,
        policy: Option<&AccessPolicy>,
    ) -> Result<AccessPolicy> {
        let requested_tier = query
            .get_native(AttributeKey::Accessible)
            .and_then(Accessibility::from_native);
        let policy = match (policy, requested_tier) {
            (Some(policy), Some(tier)) if policy.accessibility() != tier => {
                return Err(KeychainError::InvalidQuery(format!(
                    "query accessibility {tier:?} conflicts with policy {:?}",
                    policy.accessibility()
                )));
            }
            (Some(policy), _) => policy.clone(),
            (None, Some(tier)) => AccessPolicy::new(tier),
            (None, None) => AccessPolicy::default(),
        };
        policy.validate()?;

        let synchronizable = query
            .get_native(AttributeKey::Synchronizable)
            .and_then(bool::from_native)
            .unwrap_or(false);
        check_synchronizable(&policy, synchronizable)?;
        Ok(policy)
    }

    /// Check the protection each item matching `query` would have after
    /// `changes` is applied.
    fn check_protection_change<C: ItemClass>(
        &self,
        query: &Query<C>,
        changes: &NativeDictionary,
    ) -> Result<()> {
        let requested_tier = match changes.get(AttributeKey::Accessible.native()) {
            Some(value) => Some(Accessibility::from_native(value).ok_or_else(|| {
                KeychainError::InvalidQuery(format!("{value:?} is not an accessibility tier"))
            })?),
            None => None,
        };
        let requested_sync = changes
            .get(AttributeKey::Synchronizable.native())
            .and_then(bool::from_native);

        let native = self.read_query(query, MatchLimit::All, &[Projection::Attributes])?;
        for item in self.fetch(&native, None)? {
            let info = AttributeInfo::from_native(&item)?;
            let authentication = match item.get(keys::ACCESS_CONTROL) {
                Some(NativeValue::AccessControl(control)) => control.options(),
                _ => AuthenticationOptions::NONE,
            };
            let tier = requested_tier.or(info.accessibility()).unwrap_or_default();
            let policy = AccessPolicy::try_new(tier, authentication)?;
            check_synchronizable(&policy, requested_sync.unwrap_or(info.synchronizable()))?;
        }
        Ok(())
    }
}

/// Synchronizable items can carry neither an authentication requirement nor
/// a this-device-only tier.
fn check_synchronizable(policy: &AccessPolicy, synchronizable: bool) -> Result<()> {
    if synchronizable
        && (policy.requires_access_control() || policy.accessibility().is_this_device_only())
    {
        return Err(KeychainError::InvalidPolicy(format!(
            "synchronizable items cannot use {:?} with {:?}",
            policy.accessibility(),
            policy.authentication()
        )));
    }
    Ok(())
}

/// Certificate type recorded for X.509 v3 certificates.
const CERTIFICATE_TYPE_X509_V3: u32 = 3;
/// Certificate encoding recorded for DER.
const CERTIFICATE_ENCODING_DER: u32 = 3;

/// Attributes the store derives from a payload rather than from the query:
/// the key descriptor of keys and identities, and the identity attributes
/// of certificates.
fn derived_attributes(payload: &NativePayload) -> Result<Vec<(AttributeKey, NativeValue)>> {
    let mut derived = Vec::new();
    let (descriptor, certificate) = match payload {
        NativePayload::Key { descriptor, .. } => (Some(descriptor), None),
        NativePayload::Certificate(der) => (None, Some(der)),
        NativePayload::Identity {
            descriptor,
            certificate,
            ..
        } => (Some(descriptor), Some(certificate)),
        NativePayload::Data(_) => (None, None),
    };
    if let Some(descriptor) = descriptor {
        derived.push((AttributeKey::KeyClass, descriptor.key_class.to_native()));
        derived.push((AttributeKey::KeyType, descriptor.key_type.to_native()));
        derived.push((AttributeKey::KeySizeInBits, descriptor.size_in_bits.to_native()));
    }
    if let Some(der) = certificate {
        let certificate = CertificateDer::from_bytes(der)?;
        derived.push((
            AttributeKey::CertificateType,
            CERTIFICATE_TYPE_X509_V3.to_native(),
        ));
        derived.push((
            AttributeKey::CertificateEncoding,
            CERTIFICATE_ENCODING_DER.to_native(),
        ));
        match certificate.fields() {
            Some(fields) => {
                derived.push((AttributeKey::Issuer, fields.issuer.to_native()));
                derived.push((AttributeKey::SerialNumber, fields.serial_number.to_native()));
                if let Some(subject) = fields.subject {
                    derived.push((AttributeKey::Subject, subject.to_native()));
                }
            }
            // Opaque certificates are told apart by their fingerprint.
            None => derived.push((
                AttributeKey::SerialNumber,
                certificate.fingerprint().to_vec().to_native(),
            )),
        }
    }
    Ok(derived)
}

/// Write the attributes derived from `payload` into `native`.
///
/// With `check`, a derived attribute the caller already set must agree
/// with the payload.
fn fill_derived_attributes(
    payload: &NativePayload,
    native: &mut NativeDictionary,
    check: bool,
) -> Result<()> {
    for (key, value) in derived_attributes(payload)? {
        if check {
            if let Some(existing) = native.get(key.native()) {
                if *existing != value {
                    return Err(KeychainError::InvalidQuery(format!(
                        "{key} {existing:?} does not match the payload ({value:?})"
                    )));
                }
            }
        }
        native.insert(key.native(), value);
    }
    Ok(())
}

impl<S> fmt::Debug for Keychain<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keychain")
            .field("access_group", &self.access_group)
            .field("pkcs12", &self.pkcs12.is_some())
            .finish()
    }
}

/// Identities parsed from one PKCS#12 bundle.
///
/// Each bundle is converted when it is reached, so a malformed entry fails
/// only its own item.
pub struct IdentityImport {
    remaining: std::vec::IntoIter<ParsedIdentity>,
}

impl Iterator for IdentityImport {
    type Item = Result<IdentityBundle>;

    fn next(&mut self) -> Option<Self::Item> {
        let parsed = self.remaining.next()?;
        Some(
            CertificateDer::from_bytes(&parsed.certificate).and_then(|certificate| {
                IdentityBundle::from_parts(parsed.descriptor, parsed.material, certificate)
            }),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.remaining.size_hint()
    }
}

impl ExactSizeIterator for IdentityImport {}

impl fmt::Debug for IdentityImport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityImport")
            .field("remaining", &self.remaining.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::attr;
    use crate::class::{Certificate, CryptoKey, GenericCredential};
    use crate::codec::SymmetricKey;
    use crate::secure_storage::InMemoryItemService;
    use crate::test_utils::{certificate_der, name_der, FIXTURE_ISSUER};

    fn keychain() -> Keychain<InMemoryItemService> {
        Keychain::new(
            InMemoryItemService::new(),
            &KeychainConfig::new().with_access_group("TEAM.app"),
        )
    }

    fn openai() -> Query<GenericCredential> {
        Query::new()
            .with(attr::Service, "OpenAI")
            .with(attr::Account, "api")
    }

    #[test]
    fn test_store_defaults_to_when_unlocked() {
        let keychain = keychain();
        keychain
            .store(&"8e9c0a7f".to_string(), &openai(), None)
            .unwrap();

        let info = keychain.info(&openai()).unwrap().unwrap();
        assert_eq!(info.accessibility(), Some(Accessibility::WhenUnlocked));
        assert_eq!(info.access_group().as_deref(), Some("TEAM.app"));
    }

    #[test]
    fn test_foreign_access_group_is_rejected() {
        let keychain = keychain();
        let query = openai().with(attr::AccessGroup, "TEAM.other");
        let err = keychain
            .store(&"secret".to_string(), &query, None)
            .unwrap_err();
        assert!(matches!(err, KeychainError::InvalidQuery(_)));
        assert!(keychain.service().is_empty());

        let same = openai().with(attr::AccessGroup, "TEAM.app");
        keychain.store(&"secret".to_string(), &same, None).unwrap();
    }

    #[test]
    fn test_conflicting_accessibility_is_rejected() {
        let keychain = keychain();
        let query = openai().with(attr::Accessible, Accessibility::AfterFirstUnlock);
        let policy = AccessPolicy::new(Accessibility::WhenUnlocked);
        let err = keychain
            .store(&"secret".to_string(), &query, Some(&policy))
            .unwrap_err();
        assert!(matches!(err, KeychainError::InvalidQuery(_)));

        keychain.store(&"secret".to_string(), &query, None).unwrap();
        let info = keychain.info(&openai()).unwrap().unwrap();
        assert_eq!(info.accessibility(), Some(Accessibility::AfterFirstUnlock));
    }

    #[test]
    fn test_synchronizable_device_bound_is_invalid_policy() {
        let keychain = keychain();
        let query = openai().with(attr::Synchronizable, true);
        let policy = AccessPolicy::new(Accessibility::WhenUnlocked)
            .with_authentication(AuthenticationOptions::BIOMETRY_ANY);
        let err = keychain
            .store(&"secret".to_string(), &query, Some(&policy))
            .unwrap_err();
        assert!(matches!(err, KeychainError::InvalidPolicy(_)));

        let policy = AccessPolicy::new(Accessibility::AfterFirstUnlockThisDeviceOnly);
        let err = keychain
            .store(&"secret".to_string(), &query, Some(&policy))
            .unwrap_err();
        assert!(matches!(err, KeychainError::InvalidPolicy(_)));
        assert!(keychain.service().is_empty());
    }

    #[test]
    fn test_key_descriptor_is_filled_and_checked() {
        let keychain = keychain();
        let key = SymmetricKey::generate(256).unwrap();
        let query = Query::<CryptoKey>::new().with(attr::ApplicationTag, b"com.example.aes".to_vec());
        keychain.store(&key, &query, None).unwrap();

        let info = keychain.info(&query).unwrap().unwrap();
        assert_eq!(info.get(attr::KeySizeInBits), Some(256));

        let mismatched = Query::<CryptoKey>::new()
            .with(attr::ApplicationTag, b"com.example.other".to_vec())
            .with(attr::KeySizeInBits, 128u32);
        let err = keychain.store(&key, &mismatched, None).unwrap_err();
        assert!(matches!(err, KeychainError::InvalidQuery(_)));
    }

    #[test]
    fn test_import_without_parser_is_unimplemented() {
        let err = keychain().import(b"bundle", "pass").unwrap_err();
        assert!(matches!(err, KeychainError::Unimplemented(_)));
    }

    #[test]
    fn test_update_attributes_requires_changes() {
        let keychain = keychain();
        keychain.store(&"secret".to_string(), &openai(), None).unwrap();
        let err = keychain
            .update_attributes(&openai(), &Query::new())
            .unwrap_err();
        assert!(matches!(err, KeychainError::InvalidQuery(_)));
    }

    fn biometric_vault(keychain: &Keychain<InMemoryItemService>) {
        let policy = AccessPolicy::try_new(
            Accessibility::WhenUnlockedThisDeviceOnly,
            AuthenticationOptions::BIOMETRY_ANY,
        )
        .unwrap();
        keychain
            .store(&"vault".to_string(), &openai(), Some(&policy))
            .unwrap();
    }

    #[test]
    fn test_update_attributes_cannot_weaken_protection() {
        let keychain = keychain();
        biometric_vault(&keychain);

        let sync = Query::<GenericCredential>::new().with(attr::Synchronizable, true);
        let err = keychain.update_attributes(&openai(), &sync).unwrap_err();
        assert!(matches!(err, KeychainError::InvalidPolicy(_)));

        let legacy = Query::<GenericCredential>::new().with(attr::Accessible, Accessibility::Always);
        let err = keychain.update_attributes(&openai(), &legacy).unwrap_err();
        assert!(matches!(err, KeychainError::InvalidPolicy(_)));

        let info = keychain.info(&openai()).unwrap().unwrap();
        assert!(!info.synchronizable());
        assert_eq!(
            info.accessibility(),
            Some(Accessibility::WhenUnlockedThisDeviceOnly)
        );
    }

    #[test]
    fn test_update_attributes_moves_guarded_tier() {
        let keychain = keychain();
        biometric_vault(&keychain);

        let relaxed =
            Query::<GenericCredential>::new().with(attr::Accessible, Accessibility::AfterFirstUnlock);
        keychain.update_attributes(&openai(), &relaxed).unwrap();

        let native = keychain
            .read_query(&openai(), MatchLimit::One, &[Projection::Attributes])
            .unwrap();
        let item = keychain.fetch(&native, None).unwrap().remove(0);
        let Some(NativeValue::AccessControl(control)) = item.get(keys::ACCESS_CONTROL) else {
            panic!("access control missing");
        };
        assert_eq!(control.accessibility(), Accessibility::AfterFirstUnlock);
        assert!(control.requires_authentication());
    }

    #[test]
    fn test_update_attributes_allows_sync_on_unguarded_item() {
        let keychain = keychain();
        keychain
            .store(&"secret".to_string(), &openai(), None)
            .unwrap();

        let sync = Query::<GenericCredential>::new().with(attr::Synchronizable, true);
        keychain.update_attributes(&openai(), &sync).unwrap();
        let synced = openai().with(attr::Synchronizable, true);
        assert!(keychain.info(&synced).unwrap().unwrap().synchronizable());

        let device_only = Query::<GenericCredential>::new()
            .with(attr::Accessible, Accessibility::AfterFirstUnlockThisDeviceOnly);
        let err = keychain.update_attributes(&synced, &device_only).unwrap_err();
        assert!(matches!(err, KeychainError::InvalidPolicy(_)));
    }

    #[test]
    fn test_runtime_synchronizable_is_checked() {
        let keychain = keychain();
        let mut query = openai();
        query
            .set_native(AttributeKey::Synchronizable, NativeValue::Integer(1))
            .unwrap();
        let policy = AccessPolicy::new(Accessibility::WhenUnlocked)
            .with_authentication(AuthenticationOptions::BIOMETRY_ANY);
        let err = keychain
            .store(&"secret".to_string(), &query, Some(&policy))
            .unwrap_err();
        assert!(matches!(err, KeychainError::InvalidPolicy(_)));
        assert!(keychain.service().is_empty());
    }

    #[test]
    fn test_certificate_identity_comes_from_payload() {
        let keychain = keychain();
        let alice = CertificateDer::from_bytes(&certificate_der("alice")).unwrap();
        let bob = CertificateDer::from_bytes(&certificate_der("bob")).unwrap();

        keychain.store(&alice, &Query::<Certificate>::new(), None).unwrap();
        keychain.store(&bob, &Query::<Certificate>::new(), None).unwrap();
        let err = keychain
            .store(&alice, &Query::<Certificate>::new(), None)
            .unwrap_err();
        assert!(matches!(err, KeychainError::DuplicateItem));

        let by_subject = Query::<Certificate>::new().with(attr::Subject, name_der("bob"));
        let info = keychain.info(&by_subject).unwrap().unwrap();
        assert_eq!(info.get(attr::Issuer), Some(name_der(FIXTURE_ISSUER)));
        assert_eq!(info.get(attr::CertificateType), Some(CERTIFICATE_TYPE_X509_V3));
        let restored: CertificateDer = keychain.retrieve(&by_subject, None).unwrap().unwrap();
        assert_eq!(restored, bob);

        let wrong_serial = Query::<Certificate>::new().with(attr::SerialNumber, vec![1u8]);
        let carol = CertificateDer::from_bytes(&certificate_der("carol")).unwrap();
        let err = keychain.store(&carol, &wrong_serial, None).unwrap_err();
        assert!(matches!(err, KeychainError::InvalidQuery(_)));
    }

    #[test]
    fn test_opaque_certificates_use_fingerprint() {
        let keychain = keychain();
        for body in [[0x02, 0x01, 0x01], [0x02, 0x01, 0x02]] {
            let mut der = vec![0x30, 0x03];
            der.extend(body);
            let certificate = CertificateDer::from_bytes(&der).unwrap();
            keychain
                .store(&certificate, &Query::<Certificate>::new(), None)
                .unwrap();

            let by_serial = Query::<Certificate>::new()
                .with(attr::SerialNumber, certificate.fingerprint().to_vec());
            assert!(keychain.contains(&by_serial).unwrap());
        }
    }
}
