// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Internal access tokens.
//!
//! After a successful login the service issues its own HMAC-signed JWT
//! (`SECRET_KEY`, `ALGORITHM`). The subject is the local user id; roles and
//! permissions are copied in, and the subject is checked against the user
//! store on every request.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::claims::{resolve_roles, TokenKind};
use super::{AuthError, AuthenticatedUser, Role};
use crate::config::Settings;

const DEFAULT_TTL_MINUTES: i64 = 30;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Claims carried by internal tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InternalClaims {
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

impl InternalClaims {
    pub fn into_user(self) -> AuthenticatedUser {
        AuthenticatedUser {
            roles: resolve_roles(&self.roles),
            user_id: self.sub,
            permissions: self.permissions,
            email: None,
            session_id: None,
            issuer: self.iss,
            expires_at: self.exp,
            token_kind: TokenKind::Internal,
        }
    }
}

/// Issues and verifies internal tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    default_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(
        secret: &[u8],
        algorithm: Algorithm,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            audience: audience.into(),
            default_ttl,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.secret_key.as_bytes(),
            settings.algorithm,
            settings.internal_issuer(),
            settings.internal_audience(),
            Duration::try_minutes(settings.access_token_expire_minutes)
                .unwrap_or_else(|| Duration::minutes(DEFAULT_TTL_MINUTES)),
        )
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Default lifetime in seconds, reported as `expires_in` on login.
    pub fn default_ttl_secs(&self) -> i64 {
        self.default_ttl.num_seconds()
    }

    /// Sign a new token. `expires_in` overrides the configured lifetime and
    /// may be negative (useful for producing already-expired tokens).
    pub fn issue(
        &self,
        sub: &str,
        roles: &[Role],
        permissions: &[String],
        expires_in: Option<Duration>,
    ) -> Result<String, AuthError> {
        if sub.trim().is_empty() {
            return Err(AuthError::InternalError(
                "internal token requires a non-empty subject".to_string(),
            ));
        }

        let now = Utc::now();
        let exp = now
            .checked_add_signed(expires_in.unwrap_or(self.default_ttl))
            .ok_or_else(|| AuthError::InternalError("token expiry out of range".to_string()))?;
        let claims = InternalClaims {
            sub: sub.to_string(),
            roles: roles.iter().map(|r| r.as_str().to_string()).collect(),
            permissions: permissions.to_vec(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InternalError(format!("failed to sign token: {e}")))
    }

    /// Verify signature, expiry, issuer and audience.
    pub fn decode(&self, token: &str) -> Result<InternalClaims, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        decode::<InternalClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::from_jwt_error(&e))
    }
}
