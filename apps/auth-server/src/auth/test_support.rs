// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared helpers for tests: RS256 signing keys matching `testdata/jwks.json`,
//! identity-provider token builders and a ready-made verifier.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

use super::cache::ValidationCache;
use super::token::TokenIssuer;
use super::verifier::{IdentityProviderConfig, TokenVerifier};
use super::JwksManager;

pub const TEST_KID: &str = "test-key-1";
pub const TEST_EC_KID: &str = "test-ec-key-1";
pub const TEST_SUBJECT: &str = "auth0|123456789";
pub const TEST_ISSUER: &str = "https://test.auth0.com/";
pub const TEST_AUDIENCE: &str = "https://test-api.example.com";
pub const TEST_ROLES_CLAIM: &str = "https://test.auth0.com/roles";
pub const TEST_SECRET: &[u8] = b"test-secret-key-for-testing-only";

const PRIVATE_KEY_PEM: &[u8] = include_bytes!("testdata/rsa_private.pem");
const UNTRUSTED_KEY_PEM: &[u8] = include_bytes!("testdata/rsa_untrusted.pem");
const EC_PRIVATE_KEY_PEM: &[u8] = include_bytes!("testdata/ec_private.pem");
const JWKS: &str = include_str!("testdata/jwks.json");

pub fn jwks_json() -> Value {
    serde_json::from_str(JWKS).expect("testdata/jwks.json is valid JSON")
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn base_claims(roles: &[&str], permissions: &[&str], expires_in: i64) -> Value {
    let iat = now();
    json!({
        "sub": TEST_SUBJECT,
        "iat": iat,
        "exp": iat + expires_in,
        "iss": TEST_ISSUER,
        "aud": [TEST_AUDIENCE, "https://test.auth0.com/userinfo"],
        "email": "test@example.com",
        "permissions": permissions,
        TEST_ROLES_CLAIM: roles,
    })
}

fn sign(claims: &Value, pem: &[u8]) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TEST_KID.to_string());
    let key = EncodingKey::from_rsa_pem(pem).expect("test RSA key parses");
    encode(&header, claims, &key).expect("test token signs")
}

/// RS256 token signed by the key published in `testdata/jwks.json`.
pub fn idp_token(roles: &[&str], permissions: &[&str], expires_in: i64) -> String {
    sign(&base_claims(roles, permissions, expires_in), PRIVATE_KEY_PEM)
}

/// Customer token with selected claims overridden (or removed with `null`).
pub fn idp_token_with(overrides: Value) -> String {
    let mut claims = base_claims(&["customer"], &[], 3600);
    if let (Some(target), Some(patch)) = (claims.as_object_mut(), overrides.as_object()) {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                target.insert(key.clone(), value.clone());
            }
        }
    }
    sign(&claims, PRIVATE_KEY_PEM)
}

/// Customer token signed with the published ES256 key.
pub fn ec_idp_token(expires_in: i64) -> String {
    let mut header = Header::new(Algorithm::ES256);
    header.kid = Some(TEST_EC_KID.to_string());
    let key = EncodingKey::from_ec_pem(EC_PRIVATE_KEY_PEM).expect("test EC key parses");
    encode(&header, &base_claims(&["customer"], &[], expires_in), &key).expect("test token signs")
}

/// RS256 customer token whose header carries no `kid`.
pub fn idp_token_without_kid(expires_in: i64) -> String {
    let key = EncodingKey::from_rsa_pem(PRIVATE_KEY_PEM).expect("test RSA key parses");
    encode(
        &Header::new(Algorithm::RS256),
        &base_claims(&["customer"], &[], expires_in),
        &key,
    )
    .expect("test token signs")
}

/// Token carrying the trusted `kid` but signed with a different key.
pub fn untrusted_idp_token(roles: &[&str], expires_in: i64) -> String {
    sign(&base_claims(roles, &[], expires_in), UNTRUSTED_KEY_PEM)
}

pub fn test_token_issuer() -> TokenIssuer {
    TokenIssuer::new(
        TEST_SECRET,
        Algorithm::HS256,
        TEST_ISSUER,
        TEST_AUDIENCE,
        chrono::Duration::minutes(30),
    )
}

pub fn test_idp_config() -> IdentityProviderConfig {
    IdentityProviderConfig {
        issuer: Some(TEST_ISSUER.to_string()),
        audience: Some(TEST_AUDIENCE.to_string()),
        roles_claim: TEST_ROLES_CLAIM.to_string(),
    }
}

/// Verifier against `jwks_url` (identity-provider tokens disabled when `None`).
pub fn test_verifier(jwks_url: Option<String>, cache: ValidationCache) -> TokenVerifier {
    let jwks = jwks_url.map(|url| Arc::new(JwksManager::new(url, reqwest::Client::new())));
    TokenVerifier::new(jwks, test_idp_config(), test_token_issuer(), cache)
}

pub fn test_verifier_with_jwks_ttl(
    jwks_url: String,
    cache: ValidationCache,
    jwks_ttl: Duration,
) -> TokenVerifier {
    let jwks = JwksManager::new(jwks_url, reqwest::Client::new()).with_cache_ttl(jwks_ttl);
    TokenVerifier::new(
        Some(Arc::new(jwks)),
        test_idp_config(),
        test_token_issuer(),
        cache,
    )
}
