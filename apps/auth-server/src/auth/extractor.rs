// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated users.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use std::marker::PhantomData;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};

use super::{AuthError, AuthenticatedUser, Role};
use crate::services;
use crate::state::AppState;

/// Extract the bearer token from an `Authorization` header.
///
/// The scheme is matched case-insensitively; surrounding whitespace is
/// ignored. An empty token is an invalid header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?
        .trim();

    let (scheme, token) = value.split_once(' ').ok_or(AuthError::InvalidAuthHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidAuthHeader);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }
    Ok(token)
}

/// Extractor for authenticated users.
///
/// Uses the user inserted by the `authenticate` middleware when present,
/// otherwise verifies the bearer token itself.
///
/// # Example
///
/// ```rust,ignore
/// async fn me(Auth(user): Auth) -> Json<UserMeResponse> {
///     Json(user.into())
/// }
/// ```
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // First check if middleware already set the user
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let token = bearer_token(&parts.headers)?;
        let user = services::auth::authenticate(state, token).await?;

        parts.extensions.insert(user.clone());
        Ok(Auth(user))
    }
}

/// Compile-time role requirement for [`RequireRole`].
pub trait RoleRequirement {
    const ROLE: Role;
}

/// Marker: admin role.
pub struct AdminRole;

/// Marker: customer role.
pub struct CustomerRole;

/// Marker: service-provider role.
pub struct ServiceProviderRole;

impl RoleRequirement for AdminRole {
    const ROLE: Role = Role::Admin;
}

impl RoleRequirement for CustomerRole {
    const ROLE: Role = Role::Customer;
}

impl RoleRequirement for ServiceProviderRole {
    const ROLE: Role = Role::ServiceProvider;
}

/// Extractor that requires a specific role.
///
/// Authentication failures reject with 401 before the role is considered.
///
/// ```rust,ignore
/// async fn provider_only(RequireRole(user, _): RequireRole<ServiceProviderRole>) {
///     // Only service providers (and admins) reach here
/// }
/// ```
pub struct RequireRole<R: RoleRequirement>(pub AuthenticatedUser, pub PhantomData<R>);

impl<R> FromRequestParts<AppState> for RequireRole<R>
where
    R: RoleRequirement + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(user) = Auth::from_request_parts(parts, state).await?;

        if !user.has_role(R::ROLE) {
            tracing::info!(
                user_id = %user.user_id,
                required = %R::ROLE,
                "Role check failed"
            );
            return Err(AuthError::InsufficientRole(R::ROLE));
        }

        Ok(RequireRole(user, PhantomData))
    }
}

/// Extractor that requires admin role.
pub struct AdminOnly(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AdminOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let RequireRole(user, _) =
            RequireRole::<AdminRole>::from_request_parts(parts, state).await?;
        Ok(AdminOnly(user))
    }
}

/// Optional authentication extractor.
///
/// Returns `None` if no valid authentication is present, instead of rejecting.
pub struct OptionalAuth(pub Option<AuthenticatedUser>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match Auth::from_request_parts(parts, state).await {
            Ok(Auth(user)) => Ok(OptionalAuth(Some(user))),
            Err(_) => Ok(OptionalAuth(None)),
        }
    }
}
