// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bearer token verification pipeline.
//!
//! 1. Structural check (three segments, decodable header)
//! 2. Validation cache lookup
//! 3. HS-family tokens → internal issuer; everything else → JWKS
//! 4. Signature / `exp` / `nbf` / `iss` / `aud` validation
//! 5. Claim mapping and cache store

use std::sync::Arc;

use jsonwebtoken::{decode, decode_header, Algorithm, Header, Validation};

use super::{
    cache::ValidationCache, claims::IdentityClaims, token::TokenIssuer, AuthError,
    AuthenticatedUser, JwksManager,
};
use crate::config::Settings;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Expectations for identity-provider tokens.
#[derive(Debug, Clone)]
pub struct IdentityProviderConfig {
    /// Expected issuer (tenant URL with trailing slash)
    pub issuer: Option<String>,
    /// Expected audience (optional)
    pub audience: Option<String>,
    /// Claim holding role names
    pub roles_claim: String,
}

impl IdentityProviderConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            issuer: settings.issuer(),
            audience: settings.auth0_audience.clone(),
            roles_claim: settings.roles_claim.clone(),
        }
    }
}

/// Verifies bearer tokens and memoizes the outcome.
#[derive(Clone)]
pub struct TokenVerifier {
    jwks: Option<Arc<JwksManager>>,
    idp: IdentityProviderConfig,
    internal: TokenIssuer,
    cache: ValidationCache,
}

impl TokenVerifier {
    pub fn new(
        jwks: Option<Arc<JwksManager>>,
        idp: IdentityProviderConfig,
        internal: TokenIssuer,
        cache: ValidationCache,
    ) -> Self {
        Self {
            jwks,
            idp,
            internal,
            cache,
        }
    }

    pub fn jwks(&self) -> Option<&Arc<JwksManager>> {
        self.jwks.as_ref()
    }

    pub fn cache(&self) -> &ValidationCache {
        &self.cache
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.internal
    }

    /// Verify a bearer token and return the caller.
    pub async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let header = parse_header(token)?;

        if let Some(user) = self.cache.get_user(token).await {
            if !user.is_expired_at(chrono::Utc::now().timestamp()) {
                tracing::debug!(user_id = %user.user_id, "Token validation cache hit");
                return Ok(user);
            }
            self.cache.invalidate_token(token).await;
        }

        let user = if is_hmac(header.alg) {
            self.verify_internal(token)?
        } else {
            self.verify_identity_provider(token, &header).await?
        };

        self.cache.put_user(token, &user).await;
        tracing::debug!(
            user_id = %user.user_id,
            token_kind = ?user.token_kind,
            "Token verified"
        );
        Ok(user)
    }

    /// Verify an identity-provider token only (no internal tokens, no cache).
    pub async fn verify_identity_token(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let header = parse_header(token)?;
        if is_hmac(header.alg) {
            return Err(AuthError::InvalidToken(
                "expected an identity-provider token".to_string(),
            ));
        }
        self.verify_identity_provider(token, &header).await
    }

    fn verify_internal(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        Ok(self.internal.decode(token)?.into_user())
    }

    async fn verify_identity_provider(
        &self,
        token: &str,
        header: &Header,
    ) -> Result<AuthenticatedUser, AuthError> {
        let jwks = self
            .jwks
            .as_ref()
            .ok_or(AuthError::IdentityProviderNotConfigured)?;

        // Get decoding key from JWKS
        let (decoding_key, algorithm) = if let Some(kid) = &header.kid {
            jwks.get_decoding_key(kid).await?
        } else {
            jwks.get_any_decoding_key().await?
        };

        if header.alg != algorithm {
            return Err(AuthError::InvalidToken(format!(
                "token algorithm {:?} does not match key algorithm {:?}",
                header.alg, algorithm
            )));
        }

        let mut validation = Validation::new(algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.validate_nbf = true;

        if let Some(ref issuer) = self.idp.issuer {
            validation.set_issuer(&[issuer]);
        }

        if let Some(ref audience) = self.idp.audience {
            validation.set_audience(&[audience]);
        } else {
            validation.validate_aud = false;
        }

        let token_data = decode::<IdentityClaims>(token, &decoding_key, &validation)
            .map_err(|e| AuthError::from_jwt_error(&e))?;

        AuthenticatedUser::from_identity_claims(token_data.claims, &self.idp.roles_claim)
    }
}

fn is_hmac(alg: Algorithm) -> bool {
    matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// Reject anything that is not shaped like a JWS compact token.
fn parse_header(token: &str) -> Result<Header, AuthError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(AuthError::MalformedToken);
    }
    decode_header(token).map_err(|_| AuthError::MalformedToken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::TokenKind;
    use crate::auth::test_support::*;
    use crate::auth::Role;
    use httpmock::prelude::*;
    use std::time::Duration;

    async fn verifier_with_mock(server: &MockServer, cache_ttl: Duration) -> TokenVerifier {
        test_verifier(
            Some(server.url("/.well-known/jwks.json")),
            ValidationCache::in_memory(100, cache_ttl),
        )
    }

    async fn mock_jwks(server: &MockServer) -> httpmock::Mock<'_> {
        server
            .mock_async(|when, then| {
                when.method(GET).path("/.well-known/jwks.json");
                then.status(200).json_body(jwks_json());
            })
            .await
    }

    #[tokio::test]
    async fn verifies_identity_provider_token() {
        let server = MockServer::start_async().await;
        mock_jwks(&server).await;
        let verifier = verifier_with_mock(&server, Duration::from_secs(300)).await;

        let token = idp_token(&["service_provider"], &["read:services"], 3600);
        let user = verifier.verify(&token).await.unwrap();

        assert_eq!(user.user_id, TEST_SUBJECT);
        assert_eq!(user.roles, vec![Role::ServiceProvider]);
        assert_eq!(user.permissions, vec!["read:services"]);
        assert_eq!(user.token_kind, TokenKind::IdentityProvider);
    }

    #[tokio::test]
    async fn cached_token_skips_identity_provider() {
        let server = MockServer::start_async().await;
        let jwks_mock = mock_jwks(&server).await;
        // JWKS TTL zero forces a fetch on every uncached verification
        let verifier = test_verifier_with_jwks_ttl(
            server.url("/.well-known/jwks.json"),
            ValidationCache::in_memory(100, Duration::from_secs(300)),
            Duration::ZERO,
        );

        let token = idp_token(&["customer"], &[], 3600);
        verifier.verify(&token).await.unwrap();
        verifier.verify(&token).await.unwrap();

        jwks_mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn revalidates_after_cache_ttl() {
        let server = MockServer::start_async().await;
        let jwks_mock = mock_jwks(&server).await;
        let verifier = test_verifier_with_jwks_ttl(
            server.url("/.well-known/jwks.json"),
            ValidationCache::in_memory(100, Duration::from_millis(1)),
            Duration::ZERO,
        );

        let token = idp_token(&["customer"], &[], 3600);
        verifier.verify(&token).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        verifier.verify(&token).await.unwrap();

        jwks_mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let server = MockServer::start_async().await;
        mock_jwks(&server).await;
        let verifier = verifier_with_mock(&server, Duration::from_secs(300)).await;

        let token = idp_token(&["admin"], &[], -3600);
        assert_eq!(verifier.verify(&token).await, Err(AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn untrusted_signature_is_rejected() {
        let server = MockServer::start_async().await;
        mock_jwks(&server).await;
        let verifier = verifier_with_mock(&server, Duration::from_secs(300)).await;

        let token = untrusted_idp_token(&["admin"], 3600);
        assert_eq!(
            verifier.verify(&token).await,
            Err(AuthError::InvalidSignature)
        );
    }

    #[tokio::test]
    async fn wrong_issuer_and_audience_are_rejected() {
        let server = MockServer::start_async().await;
        mock_jwks(&server).await;
        let verifier = verifier_with_mock(&server, Duration::from_secs(300)).await;

        let token = idp_token_with(serde_json::json!({ "iss": "https://evil.example.com/" }));
        assert_eq!(verifier.verify(&token).await, Err(AuthError::InvalidIssuer));

        let token = idp_token_with(serde_json::json!({ "aud": "https://other-api.example.com" }));
        assert_eq!(
            verifier.verify(&token).await,
            Err(AuthError::InvalidAudience)
        );
    }

    #[tokio::test]
    async fn not_yet_valid_token_is_rejected() {
        let server = MockServer::start_async().await;
        mock_jwks(&server).await;
        let verifier = verifier_with_mock(&server, Duration::from_secs(300)).await;

        let nbf = chrono::Utc::now().timestamp() + 600;
        let token = idp_token_with(serde_json::json!({ "nbf": nbf }));
        assert_eq!(
            verifier.verify(&token).await,
            Err(AuthError::TokenNotYetValid)
        );

        // Within the 60s skew allowance
        let nbf = chrono::Utc::now().timestamp() + 30;
        let token = idp_token_with(serde_json::json!({ "nbf": nbf }));
        assert!(verifier.verify(&token).await.is_ok());
    }

    #[tokio::test]
    async fn verifies_ec_signed_token() {
        let server = MockServer::start_async().await;
        mock_jwks(&server).await;
        let verifier = verifier_with_mock(&server, Duration::from_secs(300)).await;

        let user = verifier.verify(&ec_idp_token(3600)).await.unwrap();
        assert_eq!(user.user_id, TEST_SUBJECT);
        assert_eq!(user.roles, vec![Role::Customer]);
    }

    #[tokio::test]
    async fn token_without_kid_uses_first_usable_key() {
        let server = MockServer::start_async().await;
        mock_jwks(&server).await;
        let verifier = verifier_with_mock(&server, Duration::from_secs(300)).await;

        let user = verifier.verify(&idp_token_without_kid(3600)).await.unwrap();
        assert_eq!(user.user_id, TEST_SUBJECT);
        assert_eq!(user.token_kind, TokenKind::IdentityProvider);
    }

    #[tokio::test]
    async fn malformed_tokens_are_bad_requests() {
        let verifier = test_verifier(None, ValidationCache::in_memory(10, Duration::from_secs(1)));
        for token in ["", "abc", "a.b", "a..c", "!!!.###.$$$"] {
            assert_eq!(
                verifier.verify(token).await,
                Err(AuthError::MalformedToken),
                "token {token:?}"
            );
        }
    }

    #[tokio::test]
    async fn identity_token_without_provider_is_unauthorized() {
        let verifier = test_verifier(None, ValidationCache::in_memory(10, Duration::from_secs(1)));
        let token = idp_token(&["customer"], &[], 3600);
        assert_eq!(
            verifier.verify(&token).await,
            Err(AuthError::IdentityProviderNotConfigured)
        );
    }

    #[tokio::test]
    async fn internal_tokens_verify_without_jwks() {
        let verifier = test_verifier(None, ValidationCache::in_memory(10, Duration::from_secs(60)));
        let token = verifier
            .issuer()
            .issue("17", &[Role::Admin], &["read:users".to_string()], None)
            .unwrap();

        let user = verifier.verify(&token).await.unwrap();
        assert_eq!(user.user_id, "17");
        assert!(user.is_admin());
        assert_eq!(user.token_kind, TokenKind::Internal);

        let err = verifier.verify_identity_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }
}
