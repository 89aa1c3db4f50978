//! macOS login keychain service.
//!
//! Backed by the `security-framework` password API, which only covers
//! generic credentials addressed by service and account, stored in the
//! default access group at the default tier. Anything the API cannot carry
//! (other classes, wildcard lookups, access groups, further attributes,
//! access-control objects) reports `UNIMPLEMENTED` instead of being dropped.

use security_framework::passwords::{
    delete_generic_password, get_generic_password, set_generic_password,
};
use zeroize::Zeroizing;

use super::traits::{status, SecureItemService, ServiceResult};
use crate::access::{Accessibility, AuthenticationContext};
use crate::attributes::{AttributeKey, AttributeValue};
use crate::class::ItemClassKind;
use crate::native::{keys, NativeDictionary, NativePayload, NativeValue};

/// Secure item service over the macOS login keychain.
#[derive(Debug, Clone, Copy, Default)]
pub struct MacosItemService;

impl MacosItemService {
    /// Create a service handle.
    pub fn new() -> Self {
        Self
    }
}

/// Service and account of a generic credential query.
fn address(query: &NativeDictionary) -> ServiceResult<(String, String)> {
    let class = query
        .get(keys::CLASS)
        .and_then(NativeValue::as_str)
        .and_then(ItemClassKind::from_native)
        .ok_or(status::PARAM)?;
    if class != ItemClassKind::GenericPassword || query.flag(keys::MATCH_CASE_INSENSITIVE) {
        return Err(status::UNIMPLEMENTED);
    }
    for (key, value) in query.iter() {
        match AttributeKey::from_native(key) {
            Some(AttributeKey::Service | AttributeKey::Account) | None => {}
            Some(AttributeKey::Accessible)
                if Accessibility::from_native(value) == Some(Accessibility::default()) => {}
            Some(_) => return Err(status::UNIMPLEMENTED),
        }
    }
    let field = |key: AttributeKey| {
        query
            .get(key.native())
            .and_then(NativeValue::as_str)
            .map(str::to_owned)
            .ok_or(status::UNIMPLEMENTED)
    };
    Ok((field(AttributeKey::Service)?, field(AttributeKey::Account)?))
}

fn payload_bytes(value: Option<&NativeValue>) -> ServiceResult<&[u8]> {
    match value {
        Some(NativeValue::Payload(NativePayload::Data(bytes))) => Ok(bytes.as_slice()),
        Some(NativeValue::Payload(_)) => Err(status::UNIMPLEMENTED),
        _ => Err(status::PARAM),
    }
}

impl SecureItemService for MacosItemService {
    fn add(&self, attributes: NativeDictionary) -> ServiceResult<()> {
        if attributes.contains_key(keys::ACCESS_CONTROL) {
            return Err(status::UNIMPLEMENTED);
        }
        let (service, account) = address(&attributes)?;
        let data = payload_bytes(attributes.get(keys::VALUE_DATA))?;
        match get_generic_password(&service, &account) {
            Ok(_) => return Err(status::DUPLICATE_ITEM),
            Err(e) if e.code() == status::ITEM_NOT_FOUND => {}
            Err(e) => return Err(e.code()),
        }
        set_generic_password(&service, &account, data).map_err(|e| e.code())
    }

    fn copy_matching(
        &self,
        query: &NativeDictionary,
        _context: Option<&AuthenticationContext>,
    ) -> ServiceResult<Vec<NativeDictionary>> {
        if query.contains_key(keys::VALUE_PERSISTENT_REF) || query.flag(keys::RETURN_PERSISTENT_REF)
        {
            return Err(status::UNIMPLEMENTED);
        }
        let (service, account) = address(query)?;
        let data = get_generic_password(&service, &account).map_err(|e| e.code())?;

        let mut item = NativeDictionary::new();
        item.insert(keys::CLASS, NativeValue::Constant(ItemClassKind::GenericPassword.native()));
        if query.flag(keys::RETURN_ATTRIBUTES) {
            item.insert(AttributeKey::Service.native(), NativeValue::String(service));
            item.insert(AttributeKey::Account.native(), NativeValue::String(account));
        }
        if query.flag(keys::RETURN_DATA) {
            item.insert(
                keys::VALUE_DATA,
                NativeValue::Payload(NativePayload::Data(Zeroizing::new(data))),
            );
        }
        Ok(vec![item])
    }

    fn update(&self, query: &NativeDictionary, changes: &NativeDictionary) -> ServiceResult<()> {
        let (service, account) = address(query)?;
        if changes.iter().any(|(key, _)| key != keys::VALUE_DATA) {
            return Err(status::UNIMPLEMENTED);
        }
        get_generic_password(&service, &account).map_err(|e| e.code())?;
        let data = payload_bytes(changes.get(keys::VALUE_DATA))?;
        set_generic_password(&service, &account, data).map_err(|e| e.code())
    }

    fn delete(&self, query: &NativeDictionary) -> ServiceResult<()> {
        let (service, account) = address(query)?;
        delete_generic_password(&service, &account).map_err(|e| e.code())
    }
}
