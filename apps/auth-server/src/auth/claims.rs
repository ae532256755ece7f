// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWT claims and authenticated user representation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use super::{AuthError, Role};

/// Claims extracted from an identity-provider (Auth0) access token.
///
/// Standard OIDC claims are typed; everything else (namespaced role claims,
/// `permissions`, `roles`) lands in `extra` so that its shape can be
/// validated during mapping instead of failing deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityClaims {
    /// Subject (user ID) - the canonical identity-provider user identifier
    pub sub: String,

    /// Issued at timestamp
    #[serde(default)]
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,

    /// Not before timestamp (optional)
    #[serde(default)]
    pub nbf: Option<i64>,

    /// Issuer (tenant URL with trailing slash)
    #[serde(default)]
    pub iss: String,

    /// Audience, a single string or a list
    #[serde(default)]
    pub aud: Option<Audience>,

    /// Authorized party (client id)
    #[serde(default)]
    pub azp: Option<String>,

    /// Session ID
    #[serde(default)]
    pub sid: Option<String>,

    /// Space-separated OAuth scopes
    #[serde(default)]
    pub scope: Option<String>,

    /// Email (present when the email scope was granted)
    #[serde(default)]
    pub email: Option<String>,

    /// Remaining claims, including custom role claims
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `aud` may be a string or an array of strings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::One(aud) => aud == audience,
            Audience::Many(auds) => auds.iter().any(|a| a == audience),
        }
    }
}

/// Where a verified token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Signed by the identity provider, verified against JWKS
    IdentityProvider,
    /// Issued by this service after login
    Internal,
}

/// Authenticated user information extracted from a verified JWT.
///
/// This is the primary type used throughout the application to represent
/// the caller. It is also the value stored in the validation cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Canonical user ID (`sub` claim)
    pub user_id: String,

    /// Granted roles, never empty
    pub roles: Vec<Role>,

    /// Granted permissions
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Email, when the token carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Session ID (if available)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Token issuer
    pub issuer: String,

    /// Token expiration (Unix timestamp)
    pub expires_at: i64,

    pub token_kind: TokenKind,
}

impl AuthenticatedUser {
    /// Map identity-provider claims using the configured roles claim.
    ///
    /// Roles are read from `roles_claim`, falling back to a plain `roles`
    /// claim. Unknown role names are dropped; a user left without any
    /// recognised role is a customer.
    pub fn from_identity_claims(
        claims: IdentityClaims,
        roles_claim: &str,
    ) -> Result<Self, AuthError> {
        let raw_roles = [roles_claim, "roles"]
            .iter()
            .find_map(|key| claims.extra.get(*key).filter(|v| !v.is_null()));
        let roles = resolve_roles(&string_list(raw_roles, "roles")?);

        let mut permissions = string_list(claims.extra.get("permissions"), "permissions")?;
        if let Some(scope) = &claims.scope {
            for entry in scope.split_whitespace().filter(|s| s.contains(':')) {
                if !permissions.iter().any(|p| p == entry) {
                    permissions.push(entry.to_string());
                }
            }
        }

        Ok(Self {
            user_id: claims.sub,
            roles,
            permissions,
            email: claims.email,
            session_id: claims.sid,
            issuer: claims.iss,
            expires_at: claims.exp,
            token_kind: TokenKind::IdentityProvider,
        })
    }

    /// Check if the user has the required role.
    pub fn has_role(&self, required: Role) -> bool {
        super::permissions::check_role(required, &self.roles)
    }

    /// Check if the user holds all of the given permissions.
    pub fn has_permissions(&self, required: &[&str]) -> bool {
        super::permissions::check_permissions(required, &self.permissions)
    }

    /// Check if this user is an admin.
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

    /// First granted role; used as the stored role on registration.
    pub fn primary_role(&self) -> Role {
        self.roles.first().copied().unwrap_or_default()
    }

    /// Whether `expires_at` lies in the past (no leeway).
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Resolve role names to roles, in order, without duplicates.
///
/// Falls back to `[Role::Customer]` when nothing is recognised.
pub fn resolve_roles<S: AsRef<str>>(names: &[S]) -> Vec<Role> {
    let mut roles = Vec::new();
    for role in names.iter().filter_map(|name| Role::parse(name.as_ref())) {
        if !roles.contains(&role) {
            roles.push(role);
        }
    }
    if roles.is_empty() {
        roles.push(Role::default());
    }
    roles
}

/// Interpret an optional claim as a list of strings.
///
/// Missing or `null` is an empty list; any other non-array value, or an
/// array with non-string members, is rejected.
pub fn string_list(value: Option<&Value>, claim: &'static str) -> Result<Vec<String>, AuthError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or(AuthError::InvalidClaimFormat(claim))
            })
            .collect(),
        Some(_) => Err(AuthError::InvalidClaimFormat(claim)),
    }
}
