use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode_header, Algorithm};

use crate::issuer::keys::{KeyError, RsaKeyPair};
use crate::issuer::signer::{RsaTokenSigner, SignError, TokenSigner};
use crate::tests::common::test_keys;

fn signer() -> RsaTokenSigner {
    RsaTokenSigner::new(test_keys(), "https://auth.internal", "internal-services", Duration::from_secs(900))
}

fn scopes(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn issued_token_carries_expected_claims() {
    let signer = signer();
    let before = Utc::now().timestamp();

    let issued = signer.issue("c1", &scopes(&["write", "read"])).unwrap();
    let claims = signer.verify(&issued.token).unwrap();

    assert_eq!(claims.iss, "https://auth.internal");
    assert_eq!(claims.sub, "c1");
    assert_eq!(claims.aud, "internal-services");
    assert_eq!(claims.scp, vec!["read".to_owned(), "write".to_owned()]);
    assert!(claims.iat >= before);
    assert_eq!(claims.exp - claims.iat, 900);
    assert_eq!(issued.expires_in_seconds, 900);
    assert_eq!(issued.expires_at.timestamp(), claims.exp);
}

#[test]
fn each_token_gets_a_unique_id() {
    let signer = signer();
    let first = signer.verify(&signer.issue("c1", &scopes(&[])).unwrap().token).unwrap();
    let second = signer.verify(&signer.issue("c1", &scopes(&[])).unwrap().token).unwrap();

    assert_ne!(first.jti, second.jti);
    assert!(first.scp.is_empty());
}

#[test]
fn header_is_rs256_with_optional_key_id() {
    let plain = signer().issue("c1", &scopes(&["read"])).unwrap();
    let header = decode_header(&plain.token).unwrap();
    assert_eq!(header.alg, Algorithm::RS256);
    assert_eq!(header.kid, None);

    let keyed = signer().with_key_id("key-2024").issue("c1", &scopes(&["read"])).unwrap();
    assert_eq!(decode_header(&keyed.token).unwrap().kid.as_deref(), Some("key-2024"));
}

#[test]
fn verification_rejects_other_audience_and_tampering() {
    let issued = signer().issue("c1", &scopes(&["read"])).unwrap();

    let other_audience =
        RsaTokenSigner::new(test_keys(), "https://auth.internal", "billing", Duration::from_secs(900));
    assert!(other_audience.verify(&issued.token).is_err());

    let mut tampered = issued.token.clone();
    tampered.push('x');
    assert!(signer().verify(&tampered).is_err());
}

#[test]
fn key_pair_round_trips_through_pem() {
    let keys = test_keys();
    assert!(keys.public_pem().starts_with("-----BEGIN PUBLIC KEY-----"));
    assert!(!format!("{:?}", keys).contains("PRIVATE"));
}

#[test]
fn invalid_pem_is_reported() {
    let keys = test_keys();
    let err = RsaKeyPair::from_pem(keys.public_pem(), "not a key").unwrap_err();
    assert!(matches!(err, KeyError::InvalidPrivateKey(_)));
}

#[test]
fn unrepresentable_ttl_fails_to_sign_instead_of_panicking() {
    let signer = RsaTokenSigner::new(test_keys(), "https://auth.internal", "internal-services", Duration::MAX);

    let err = signer.issue("c1", &scopes(&["read"])).unwrap_err();
    assert!(matches!(err, SignError::Signing(_)), "got {:?}", err);
}
