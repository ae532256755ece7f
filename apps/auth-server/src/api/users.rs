// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints.
//!
//! - `GET /v1/users/me` for any authenticated caller
//! - user administration for admins

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{AdminOnly, Auth, AuthenticatedUser, Role, TokenKind};
use crate::error::ApiError;
use crate::services;
use crate::state::AppState;
use crate::users::{User, UserRepository, UserUpdate};

/// Permission required to list users.
pub const READ_USERS: &[&str] = &["read:users"];

const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_PAGE_SIZE: i64 = 1000;

/// Response for GET /v1/users/me
#[derive(Debug, Serialize, ToSchema)]
pub struct UserMeResponse {
    /// Token subject (identity-provider id or local user id)
    pub user_id: String,
    pub roles: Vec<Role>,
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Session ID (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub token_kind: TokenKind,
    pub expires_at: i64,
    /// Stored user, when the subject maps to one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

impl From<AuthenticatedUser> for UserMeResponse {
    fn from(user: AuthenticatedUser) -> Self {
        Self {
            user_id: user.user_id,
            roles: user.roles,
            permissions: user.permissions,
            email: user.email,
            session_id: user.session_id,
            token_kind: user.token_kind,
            expires_at: user.expires_at,
            user: None,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListUsersParams {
    /// Number of users to skip (default 0)
    pub offset: Option<i64>,
    /// Maximum number of users (default 100, max 1000)
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<User>,
    pub offset: i64,
    pub limit: i64,
}

/// Get the current authenticated user's information.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "User information", body = UserMeResponse),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    Auth(user): Auth,
) -> Result<Json<UserMeResponse>, ApiError> {
    let stored = match user.token_kind {
        TokenKind::Internal => Some(services::auth::active_user(&state, &user.user_id).await?),
        TokenKind::IdentityProvider => state.users.get_by_auth0_id(&user.user_id).await?,
    };

    let mut response = UserMeResponse::from(user);
    response.user = stored;
    Ok(Json(response))
}

/// List users (admin, `read:users`).
#[utoipa::path(
    get,
    path = "/v1/users",
    tag = "Users",
    security(("bearer" = [])),
    params(ListUsersParams),
    responses(
        (status = 200, description = "Users ordered by id", body = UserListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role and read:users required"),
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    AdminOnly(_admin): AdminOnly,
    Query(params): Query<ListUsersParams>,
) -> Result<Json<UserListResponse>, ApiError> {
    let offset = params.offset.unwrap_or(0).max(0);
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let users = state.users.list(offset, limit).await?;
    Ok(Json(UserListResponse {
        users,
        offset,
        limit,
    }))
}

/// Get a user by id (admin).
#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    tag = "Users",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = User),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "User not found"),
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    AdminOnly(_admin): AdminOnly,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    state
        .users
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("User {id} not found")))
}

/// Update a user's name, role or active flag (admin).
#[utoipa::path(
    patch,
    path = "/v1/users/{id}",
    tag = "Users",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "User id")),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated user", body = User),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "User not found"),
        (status = 422, description = "Invalid update"),
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    AdminOnly(admin): AdminOnly,
    Path(id): Path<i64>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<User>, ApiError> {
    let user = state.users.update(id, update).await?;
    tracing::info!(admin = %admin.user_id, user_id = id, "User updated");
    Ok(Json(user))
}

/// Delete a user (admin).
#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    tag = "Users",
    security(("bearer" = [])),
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "User not found"),
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminOnly(admin): AdminOnly,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.users.delete(id).await?;
    tracing::info!(admin = %admin.user_id, user_id = id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_me_response_from_authenticated_user() {
        let user = AuthenticatedUser {
            user_id: "user_123".to_string(),
            roles: vec![Role::Customer],
            permissions: vec!["read:profile".to_string()],
            email: None,
            session_id: Some("sess_abc".to_string()),
            issuer: "test".to_string(),
            expires_at: 0,
            token_kind: TokenKind::IdentityProvider,
        };

        let response: UserMeResponse = user.into();
        assert_eq!(response.user_id, "user_123");
        assert_eq!(response.roles, vec![Role::Customer]);
        assert_eq!(response.session_id, Some("sess_abc".to_string()));
        assert!(response.user.is_none());
    }
}
