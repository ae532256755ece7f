// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Login and internal-token resolution.
//!
//! `login_or_register` exchanges an identity-provider access token for an
//! internal token, creating the local user on first login.

use crate::auth::{AuthError, AuthenticatedUser, Role, TokenKind};
use crate::error::ApiError;
use crate::providers::{IdentityError, UserProfile};
use crate::state::AppState;
use crate::users::{NewUser, User, UserRepository};

const DEFAULT_USER_NAME: &str = "Unnamed User";

/// Verify `idp_token`, load (or register) the user and issue an internal token.
pub async fn login_or_register(state: &AppState, idp_token: &str) -> Result<(String, User), ApiError> {
    let verified = state.verifier.verify_identity_token(idp_token).await?;
    let profile = user_profile(state, idp_token, verified.expires_at).await?;

    let auth0_id = profile
        .sub
        .clone()
        .filter(|sub| !sub.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Identity provider user id (sub) missing"))?;

    let user = match state.users.get_by_auth0_id(&auth0_id).await? {
        Some(user) => user,
        None => {
            let email = profile
                .email
                .clone()
                .or_else(|| verified.email.clone())
                .ok_or_else(|| ApiError::bad_request("Email missing in identity provider profile"))?;

            let role = profile
                .role_names(&state.settings.roles_claim)?
                .iter()
                .find_map(|name| Role::parse(name))
                .unwrap_or_else(|| verified.primary_role());

            let user = state
                .users
                .create(NewUser {
                    auth0_id,
                    email,
                    name: profile
                        .name
                        .clone()
                        .unwrap_or_else(|| DEFAULT_USER_NAME.to_string()),
                    role,
                })
                .await?;
            tracing::info!(user_id = user.id, role = %user.role, "Registered new user");
            user
        }
    };

    if !user.is_active {
        tracing::info!(user_id = user.id, "Login refused for inactive user");
        return Err(AuthError::InactiveUser.into());
    }

    let user = state.users.touch_last_login(user.id).await?;

    let mut permissions = profile.permissions()?;
    if permissions.is_empty() {
        permissions = verified.permissions;
    }

    let token = state
        .verifier
        .issuer()
        .issue(&user.id.to_string(), &[user.role], &permissions, None)?;

    tracing::info!(user_id = user.id, "Issued internal access token");
    Ok((token, user))
}

/// Verify a bearer token of either kind.
///
/// Internal tokens must still name an existing, active user, so deleting or
/// deactivating an account revokes its internal tokens immediately.
pub async fn authenticate(state: &AppState, token: &str) -> Result<AuthenticatedUser, AuthError> {
    let user = state.verifier.verify(token).await?;
    if user.token_kind == TokenKind::Internal {
        active_user(state, &user.user_id).await?;
    }
    Ok(user)
}

/// Resolve the stored user behind an internal token.
pub async fn user_from_internal_token(state: &AppState, token: &str) -> Result<User, ApiError> {
    let claims = state.verifier.issuer().decode(token)?;
    Ok(active_user(state, &claims.sub).await?)
}

/// Stored user for an internal token subject.
pub async fn active_user(state: &AppState, subject: &str) -> Result<User, AuthError> {
    let user_id: i64 = subject
        .parse()
        .map_err(|_| AuthError::InvalidToken("invalid user id in token subject".to_string()))?;

    let user = state
        .users
        .get_by_id(user_id)
        .await
        .map_err(|e| AuthError::InternalError(format!("user lookup failed: {e}")))?
        .ok_or_else(|| AuthError::InvalidToken("user not found for token".to_string()))?;

    if !user.is_active {
        return Err(AuthError::InactiveUser);
    }
    Ok(user)
}

/// Profile for `token`, from cache or `/userinfo`.
async fn user_profile(state: &AppState, token: &str, expires_at: i64) -> Result<UserProfile, ApiError> {
    let cache = state.verifier.cache();
    if let Some(profile) = cache.get_profile::<UserProfile>(token).await {
        tracing::debug!("Profile cache hit");
        return Ok(profile);
    }

    let identity = state
        .identity
        .as_ref()
        .ok_or(AuthError::IdentityProviderNotConfigured)?;
    let profile = match identity.get_user_info(token).await {
        Ok(profile) => profile,
        Err(e @ IdentityError::Rejected(_)) => {
            // Revoked upstream; drop the cached verification too
            cache.invalidate_token(token).await;
            return Err(AuthError::from(e).into());
        }
        Err(e) => return Err(AuthError::from(e).into()),
    };

    cache.put_profile(token, &profile, expires_at).await;
    Ok(profile)
}
