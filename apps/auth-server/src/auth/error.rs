// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::Role;

/// Authentication error type.
///
/// Each variant maps to a stable `error_code` and an HTTP status:
/// 401 for missing or unverifiable credentials, 400 for tokens that are
/// not JWTs at all, 403 for authenticated callers lacking a role or
/// permission, 503 when the identity provider cannot be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Invalid authorization header format
    InvalidAuthHeader,
    /// Token is not a structurally valid JWT
    MalformedToken,
    /// Token signature is invalid
    InvalidSignature,
    /// Token has expired
    TokenExpired,
    /// Token issuer is invalid
    InvalidIssuer,
    /// Token audience is invalid
    InvalidAudience,
    /// Token is not yet valid
    TokenNotYetValid,
    /// Token rejected for another reason (upstream rejection, bad subject)
    InvalidToken(String),
    /// No matching key in JWKS
    NoMatchingKey,
    /// Identity-provider token presented but no provider is configured
    IdentityProviderNotConfigured,
    /// JWKS or userinfo endpoint unreachable
    IdentityProviderUnavailable(String),
    /// Caller lacks the required role
    InsufficientRole(Role),
    /// Caller lacks one or more permissions
    MissingPermissions(Vec<String>),
    /// Role or permission claim present but not a list of strings
    InvalidClaimFormat(&'static str),
    /// Local account is deactivated
    InactiveUser,
    /// Internal error
    InternalError(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::InvalidAudience => "invalid_audience",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::NoMatchingKey => "no_matching_key",
            AuthError::IdentityProviderNotConfigured => "identity_provider_not_configured",
            AuthError::IdentityProviderUnavailable(_) => "identity_provider_unavailable",
            AuthError::InsufficientRole(_) => "insufficient_role",
            AuthError::MissingPermissions(_) => "insufficient_permissions",
            AuthError::InvalidClaimFormat(_) => "invalid_claim_format",
            AuthError::InactiveUser => "inactive_user",
            AuthError::InternalError(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::InvalidIssuer
            | AuthError::InvalidAudience
            | AuthError::TokenNotYetValid
            | AuthError::InvalidToken(_)
            | AuthError::NoMatchingKey
            | AuthError::IdentityProviderNotConfigured => StatusCode::UNAUTHORIZED,
            AuthError::MalformedToken => StatusCode::BAD_REQUEST,
            AuthError::InsufficientRole(_)
            | AuthError::MissingPermissions(_)
            | AuthError::InvalidClaimFormat(_)
            | AuthError::InactiveUser => StatusCode::FORBIDDEN,
            AuthError::IdentityProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map a `jsonwebtoken` validation failure.
    pub fn from_jwt_error(err: &jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            ErrorKind::InvalidAudience => AuthError::InvalidAudience,
            ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            ErrorKind::InvalidAlgorithm => {
                AuthError::InvalidToken("algorithm not allowed for this key".to_string())
            }
            ErrorKind::MissingRequiredClaim(claim) => {
                AuthError::InvalidToken(format!("missing required claim '{claim}'"))
            }
            ErrorKind::InvalidSubject => AuthError::InvalidToken("invalid subject".to_string()),
            _ => AuthError::MalformedToken,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuthHeader => write!(f, "Authorization header is required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::MalformedToken => write!(f, "Token is malformed"),
            AuthError::InvalidSignature => write!(f, "Token signature is invalid"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::InvalidIssuer => write!(f, "Token issuer is invalid"),
            AuthError::InvalidAudience => write!(f, "Token audience is invalid"),
            AuthError::TokenNotYetValid => write!(f, "Token is not yet valid"),
            AuthError::InvalidToken(msg) => write!(f, "Invalid token: {msg}"),
            AuthError::NoMatchingKey => write!(f, "No matching key found in JWKS"),
            AuthError::IdentityProviderNotConfigured => {
                write!(f, "Identity provider tokens are not accepted by this deployment")
            }
            AuthError::IdentityProviderUnavailable(msg) => {
                write!(f, "Identity provider unavailable: {msg}")
            }
            AuthError::InsufficientRole(role) => {
                write!(f, "User does not have the required role: {role}")
            }
            AuthError::MissingPermissions(missing) => {
                write!(f, "User lacks required permissions: {}", missing.join(", "))
            }
            AuthError::InvalidClaimFormat(claim) => {
                write!(f, "Invalid '{claim}' format in token")
            }
            AuthError::InactiveUser => write!(f, "User account is inactive"),
            AuthError::InternalError(msg) => write!(f, "Internal authentication error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn missing_auth_returns_401_with_challenge() {
        let response = AuthError::MissingAuthHeader.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "missing_auth_header");
    }

    #[tokio::test]
    async fn missing_permissions_lists_them() {
        let err = AuthError::MissingPermissions(vec!["read:users".into(), "write:users".into()]);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(
            body["error"],
            "User lacks required permissions: read:users, write:users"
        );
    }

    #[test]
    fn status_mapping_covers_taxonomy() {
        assert_eq!(AuthError::MalformedToken.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AuthError::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::InsufficientRole(Role::Admin).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::IdentityProviderUnavailable("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
