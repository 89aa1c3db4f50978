//! End-to-end tests of the keychain facade against the in-memory store.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p keychain-lib --test keychain_integration
//! ```

use std::sync::Arc;

use keychain_lib::attributes::AttributeKey;
use keychain_lib::native::NativeValue;
use keychain_lib::prelude::*;
use keychain_lib::secure_storage::AuthenticationOutcome;
use keychain_lib::test_utils::{
    assert_error_code, assert_not_found, certificate_der, in_memory_keychain,
    keychain_with_authenticator, name_der, sample_signing_key, ScriptedAuthenticator,
    StaticPkcs12Parser, TestFixtures,
};

fn openai() -> Query<GenericCredential> {
    Query::new().with(attr::Service, "OpenAI")
}

#[test]
fn test_generic_credential_lifecycle() {
    let keychain = in_memory_keychain();
    let query = openai();

    keychain
        .store(&TestFixtures::API_TOKEN.to_string(), &query, None)
        .unwrap();
    let token: Option<String> = keychain.retrieve(&query, None).unwrap();
    assert_eq!(token.as_deref(), Some(TestFixtures::API_TOKEN));

    keychain.remove(&query).unwrap();
    assert_not_found(keychain.retrieve::<_, String>(&query, None));
}

#[test]
fn test_port_participates_in_identity() {
    let keychain = in_memory_keychain();
    let query = |server: &str, port: u16| {
        Query::<InternetCredential>::new()
            .with(attr::Server, server)
            .with(attr::Port, port)
            .with(attr::Protocol, InternetProtocol::Https)
            .with(attr::Account, "admin")
    };

    for (server, port, password) in TestFixtures::INTERNET_CREDENTIALS {
        keychain
            .store(&password.to_string(), &query(server, *port), None)
            .unwrap();
    }
    for (server, port, password) in TestFixtures::INTERNET_CREDENTIALS {
        let stored: Option<String> = keychain.retrieve(&query(server, *port), None).unwrap();
        assert_eq!(stored.as_deref(), Some(*password));
    }
}

#[test]
fn test_duplicate_store_keeps_first_value() {
    let keychain = in_memory_keychain();
    let query = openai().with(attr::Account, "api");

    keychain.store(&"first".to_string(), &query, None).unwrap();
    assert_error_code(
        keychain.store(&"second".to_string(), &query, None),
        KeychainErrorCode::DuplicateItem,
    );

    let value: Option<String> = keychain.retrieve(&query, None).unwrap();
    assert_eq!(value.as_deref(), Some("first"));
}

#[test]
fn test_remove_is_idempotent() {
    let keychain = in_memory_keychain();
    for _ in 0..3 {
        keychain.remove(&openai()).unwrap();
    }
    assert!(keychain.service().is_empty());
}

#[test]
fn test_update_requires_existing_item() {
    let keychain = in_memory_keychain();
    let err = keychain.update(&"value".to_string(), &openai()).unwrap_err();
    assert!(err.is_not_found());
    assert!(keychain.service().is_empty());
}

#[test]
fn test_update_preserves_other_attributes() {
    let keychain = in_memory_keychain();
    let query = openai()
        .with(attr::Account, "api")
        .with(attr::Label, "OpenAI key")
        .with(attr::Comment, "rotated monthly");
    keychain.store(&"old".to_string(), &query, None).unwrap();

    keychain.update(&"new".to_string(), &openai()).unwrap();
    let value: Option<String> = keychain.retrieve(&openai(), None).unwrap();
    assert_eq!(value.as_deref(), Some("new"));

    let changes = Query::<GenericCredential>::new().with(attr::Comment, "rotated weekly");
    keychain.update_attributes(&openai(), &changes).unwrap();

    let info = keychain.info(&openai()).unwrap().unwrap();
    assert_eq!(info.label().as_deref(), Some("OpenAI key"));
    assert_eq!(info.comment().as_deref(), Some("rotated weekly"));
    assert_eq!(info.get(attr::Account).as_deref(), Some("api"));
    assert!(info.modification_date() >= info.creation_date());

    let value: Option<String> = keychain.retrieve(&openai(), None).unwrap();
    assert_eq!(value.as_deref(), Some("new"));
}

#[test]
fn test_info_has_no_secret() {
    let keychain = in_memory_keychain();
    keychain
        .store(&"8e9c0a7f".to_string(), &openai().with(attr::Label, "token"), None)
        .unwrap();

    let info = keychain.info(&openai()).unwrap().unwrap();
    assert_eq!(info.class(), keychain_lib::class::ItemClassKind::GenericPassword);
    assert!(!format!("{info:?}").contains("8e9c0a7f"));
    assert!(info.creation_date().is_some());

    let items = keychain.items(&Query::<GenericCredential>::new()).unwrap();
    assert_eq!(items.len(), 1);
    assert!(keychain.contains(&openai()).unwrap());
    assert!(!keychain
        .contains(&Query::<GenericCredential>::new().with(attr::Service, "Other"))
        .unwrap());
    assert!(keychain
        .info(&Query::<GenericCredential>::new().with(attr::Service, "Other"))
        .unwrap()
        .is_none());
}

#[test]
fn test_payload_round_trips() {
    let keychain = in_memory_keychain();

    let bytes = vec![0u8, 1, 2, 254, 255];
    let query = openai().with(attr::Account, "bytes");
    keychain.store(&bytes, &query, None).unwrap();
    assert_eq!(keychain.retrieve::<_, Vec<u8>>(&query, None).unwrap(), Some(bytes));

    let aes = SymmetricKey::generate(256).unwrap();
    let query = Query::<CryptoKey>::new().with(attr::ApplicationTag, b"aes".to_vec());
    keychain.store(&aes, &query, None).unwrap();
    assert_eq!(keychain.retrieve::<_, SymmetricKey>(&query, None).unwrap(), Some(aes));

    let signing = sample_signing_key(9);
    let verifying = signing.verifying_key();
    let query = Query::<CryptoKey>::new().with(attr::ApplicationTag, b"ed25519".to_vec());
    keychain.store(&signing, &query, None).unwrap();
    keychain.store(&verifying, &query, None).unwrap();

    let private = query.clone().with(attr::KeyClass, KeyClass::Private);
    let restored: ed25519_dalek::SigningKey = keychain.retrieve(&private, None).unwrap().unwrap();
    assert_eq!(restored.to_bytes(), signing.to_bytes());

    let public = query.with(attr::KeyClass, KeyClass::Public);
    let restored: ed25519_dalek::VerifyingKey = keychain.retrieve(&public, None).unwrap().unwrap();
    assert_eq!(restored, verifying);

    let certificate = CertificateDer::from_bytes(&certificate_der("example.com")).unwrap();
    let query = Query::<Certificate>::new().with(attr::Subject, name_der("example.com"));
    keychain.store(&certificate, &query, None).unwrap();
    let restored: CertificateDer = keychain.retrieve(&query, None).unwrap().unwrap();
    assert_eq!(restored.fingerprint(), certificate.fingerprint());
}

#[test]
fn test_json_payload() {
    let keychain = in_memory_keychain();
    let query = openai().with(attr::Account, "oauth");
    let token = Json(serde_json::json!({ "access": "abc", "expires_in": 3600 }));

    keychain.store(&token, &query, None).unwrap();
    let restored: Json<serde_json::Value> = keychain.retrieve(&query, None).unwrap().unwrap();
    assert_eq!(restored.0["expires_in"], 3600);
}

#[test]
fn test_wrong_payload_type_is_conversion_failure() {
    let keychain = in_memory_keychain();
    keychain.store(&vec![0xffu8, 0xfe], &openai(), None).unwrap();
    assert_error_code(
        keychain.retrieve::<_, String>(&openai(), None),
        KeychainErrorCode::ConversionFailed,
    );
}

#[test]
fn test_invalid_policy_writes_nothing() {
    let keychain = in_memory_keychain();

    let legacy = AccessPolicy::new(Accessibility::Always)
        .with_authentication(AuthenticationOptions::BIOMETRY_ANY);
    let err = keychain
        .store(&"secret".to_string(), &openai(), Some(&legacy))
        .unwrap_err();
    assert!(matches!(err, KeychainError::InvalidPolicy(_)));

    let exclusive = AccessPolicy::new(Accessibility::WhenUnlocked).with_authentication(
        AuthenticationOptions::BIOMETRY_ANY | AuthenticationOptions::BIOMETRY_CURRENT_SET,
    );
    let err = keychain
        .store(&"secret".to_string(), &openai(), Some(&exclusive))
        .unwrap_err();
    assert_eq!(err.code(), KeychainErrorCode::InvalidPolicy);

    assert!(keychain.service().is_empty());
}

#[test]
fn test_cancelled_prompt_is_not_absence() {
    let authenticator = Arc::new(ScriptedAuthenticator::new([
        AuthenticationOutcome::Cancelled,
        AuthenticationOutcome::Failed,
        AuthenticationOutcome::Success,
    ]));
    let keychain = keychain_with_authenticator(authenticator.clone());
    let policy = AccessPolicy::try_new(
        Accessibility::WhenUnlockedThisDeviceOnly,
        AuthenticationOptions::BIOMETRY_CURRENT_SET,
    )
    .unwrap();
    keychain
        .store(&"vault".to_string(), &openai(), Some(&policy))
        .unwrap();

    let err = keychain.retrieve::<_, String>(&openai(), None).unwrap_err();
    assert!(err.is_user_cancelled());
    assert!(!err.is_not_found());

    assert_error_code(
        keychain.retrieve::<_, String>(&openai(), None),
        KeychainErrorCode::AuthenticationFailed,
    );

    let value: Option<String> = keychain.retrieve(&openai(), None).unwrap();
    assert_eq!(value.as_deref(), Some("vault"));
    assert_eq!(authenticator.prompts(), 3);

    // Metadata reads never prompt.
    assert!(keychain.info(&openai()).unwrap().is_some());
    assert_eq!(authenticator.prompts(), 3);

    let quiet = AuthenticationContext::new().without_interaction();
    let err = keychain
        .retrieve::<_, String>(&openai(), Some(&quiet))
        .unwrap_err();
    assert!(err.requires_auth());

    let unlocked = AuthenticationContext::pre_authenticated();
    let value: Option<String> = keychain.retrieve(&openai(), Some(&unlocked)).unwrap();
    assert_eq!(value.as_deref(), Some("vault"));
    assert_eq!(authenticator.prompts(), 3);
}

#[test]
fn test_remove_all_stays_in_access_group() {
    let service = Arc::new(InMemoryItemService::new());
    let ours = Keychain::new(service.clone(), &TestFixtures::config());
    let theirs = Keychain::new(
        service.clone(),
        &KeychainConfig::new().with_sharing_group(TestFixtures::OTHER_ACCESS_GROUP),
    );

    ours.store(&"a".to_string(), &openai(), None).unwrap();
    ours.store(&SymmetricKey::generate(128).unwrap(), &Query::<CryptoKey>::new(), None)
        .unwrap();
    theirs.store(&"b".to_string(), &openai(), None).unwrap();
    assert_eq!(service.len(), 3);

    ours.remove_all().unwrap();
    assert_eq!(service.len(), 1);
    let survivor: Option<String> = theirs.retrieve(&openai(), None).unwrap();
    assert_eq!(survivor.as_deref(), Some("b"));

    ours.remove_all().unwrap();
    assert_eq!(service.len(), 1);
}

#[test]
fn test_projection_shapes() {
    let keychain = in_memory_keychain();
    keychain
        .store(&"8e9c0a7f".to_string(), &openai().with(attr::Label, "token"), None)
        .unwrap();

    let single = keychain
        .retrieve_projected::<_, String>(&[Projection::Data], &openai(), None)
        .unwrap()
        .unwrap();
    assert_eq!(single, Projected::Single(ProjectedValue::Data("8e9c0a7f".to_string())));

    let bag = keychain
        .retrieve_projected::<_, String>(
            &[Projection::Data, Projection::Attributes, Projection::PersistentReference],
            &openai(),
            None,
        )
        .unwrap()
        .unwrap();
    let Projected::Bag(bag) = bag else {
        panic!("expected a bag");
    };
    assert_eq!(bag.data.as_deref(), Some("8e9c0a7f"));
    assert_eq!(bag.attributes.unwrap().label().as_deref(), Some("token"));
    let reference = bag.persistent_reference.unwrap();

    let by_reference = Query::<GenericCredential>::new().with_persistent_reference(reference);
    let value: Option<String> = keychain.retrieve(&by_reference, None).unwrap();
    assert_eq!(value.as_deref(), Some("8e9c0a7f"));

    assert_error_code(
        keychain.retrieve_projected::<_, String>(&[], &openai(), None),
        KeychainErrorCode::InvalidQuery,
    );
}

#[test]
fn test_retrieve_all_and_case_insensitive() {
    let keychain = in_memory_keychain();
    for account in ["alice", "bob"] {
        keychain
            .store(&account.to_uppercase(), &openai().with(attr::Account, account), None)
            .unwrap();
    }

    let mut all: Vec<String> = keychain.retrieve_all(&openai(), None).unwrap();
    all.sort();
    assert_eq!(all, vec!["ALICE".to_string(), "BOB".to_string()]);

    let shouting = Query::<GenericCredential>::new().with(attr::Service, "OPENAI");
    assert!(keychain.retrieve_all::<_, String>(&shouting, None).unwrap().is_empty());
    let relaxed = shouting.case_insensitive().with_limit(MatchLimit::All);
    assert_eq!(keychain.items(&relaxed).unwrap().len(), 2);
}

#[test]
fn test_import_identities() {
    let parser = StaticPkcs12Parser::new("hunter2")
        .with_identity(&sample_signing_key(1), certificate_der("device-1"))
        .with_identity(&sample_signing_key(2), certificate_der("device-2"));
    let keychain = in_memory_keychain().with_pkcs12_parser(Arc::new(parser));

    assert_error_code(
        keychain.import(b"p12", "wrong"),
        KeychainErrorCode::AuthenticationFailed,
    );
    assert_error_code(keychain.import(b"", "hunter2"), KeychainErrorCode::ConversionFailed);

    let identities = keychain.import(b"p12", "hunter2").unwrap();
    assert_eq!(identities.len(), 2);
    assert!(keychain.service().is_empty());

    for (index, identity) in identities.enumerate() {
        let identity = identity.unwrap();
        let device = format!("device-{}", index + 1);
        keychain.store(&identity, &Query::<Identity>::new(), None).unwrap();

        let query = Query::<Identity>::new().with(attr::Subject, name_der(&device));
        let restored: IdentityBundle = keychain.retrieve(&query, None).unwrap().unwrap();
        assert_eq!(
            restored.certificate().fingerprint(),
            identity.certificate().fingerprint()
        );
        let key: ed25519_dalek::SigningKey = restored.private_key().unwrap();
        assert_eq!(key.to_bytes(), sample_signing_key(index as u8 + 1).to_bytes());
    }
    assert_eq!(keychain.items(&Query::<Identity>::new()).unwrap().len(), 2);
}

#[test]
fn test_certificates_without_query_attributes_do_not_collide() {
    let keychain = in_memory_keychain();
    for name in ["alice", "bob"] {
        let certificate = CertificateDer::from_bytes(&certificate_der(name)).unwrap();
        keychain
            .store(&certificate, &Query::<Certificate>::new(), None)
            .unwrap();
    }
    assert_eq!(keychain.items(&Query::<Certificate>::new()).unwrap().len(), 2);

    let again = CertificateDer::from_bytes(&certificate_der("alice")).unwrap();
    assert_error_code(
        keychain.store(&again, &Query::<Certificate>::new(), None),
        KeychainErrorCode::DuplicateItem,
    );
}

#[test]
fn test_attribute_update_keeps_protection_consistent() {
    let keychain = in_memory_keychain();
    let policy = AccessPolicy::try_new(
        Accessibility::WhenUnlockedThisDeviceOnly,
        AuthenticationOptions::BIOMETRY_ANY,
    )
    .unwrap();
    keychain
        .store(&"vault".to_string(), &openai(), Some(&policy))
        .unwrap();

    let sync = Query::<GenericCredential>::new().with(attr::Synchronizable, true);
    assert_error_code(
        keychain.update_attributes(&openai(), &sync),
        KeychainErrorCode::InvalidPolicy,
    );
    let always = Query::<GenericCredential>::new().with(attr::Accessible, Accessibility::Always);
    assert_error_code(
        keychain.update_attributes(&openai(), &always),
        KeychainErrorCode::InvalidPolicy,
    );

    let info = keychain.info(&openai()).unwrap().unwrap();
    assert!(!info.synchronizable());
    assert_eq!(
        info.accessibility(),
        Some(Accessibility::WhenUnlockedThisDeviceOnly)
    );
}

#[test]
fn test_runtime_attributes_are_type_checked() {
    let keychain = in_memory_keychain();
    let mut query = Query::<InternetCredential>::new().with(attr::Server, "example.com");
    assert_error_code(
        query
            .set_native(AttributeKey::Port, NativeValue::String("443".into()))
            .map(|_| ()),
        KeychainErrorCode::InvalidQuery,
    );
    query
        .set_native(AttributeKey::Port, NativeValue::Integer(443))
        .unwrap();
    keychain.store(&"tls".to_string(), &query, None).unwrap();

    let typed = Query::<InternetCredential>::new()
        .with(attr::Server, "example.com")
        .with(attr::Port, 443u16);
    let stored: Option<String> = keychain.retrieve(&typed, None).unwrap();
    assert_eq!(stored.as_deref(), Some("tls"));
}

#[test]
fn test_shared_across_threads() {
    let keychain = in_memory_keychain();
    let policy = AccessPolicy::new(Accessibility::AfterFirstUnlock);

    std::thread::scope(|scope| {
        for account in 0..8 {
            let keychain = &keychain;
            let policy = &policy;
            scope.spawn(move || {
                let query = openai().with(attr::Account, format!("worker-{account}"));
                keychain
                    .store(&format!("secret-{account}"), &query, Some(policy))
                    .unwrap();
            });
        }
    });

    assert_eq!(keychain.items(&openai()).unwrap().len(), 8);
}
