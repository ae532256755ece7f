// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token exchange endpoint.

use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::extractor::bearer_token;
use crate::error::ApiError;
use crate::services;
use crate::state::AppState;
use crate::users::User;

/// Response for POST /v1/auth/login
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    /// Internal access token
    pub access_token: String,
    /// Always "bearer"
    pub token_type: String,
    /// Lifetime of `access_token` in seconds
    pub expires_in: i64,
    pub user: User,
}

/// Exchange an identity-provider access token for an internal token.
///
/// Registers the user on first login.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Internal token issued", body = LoginResponse),
        (status = 400, description = "Malformed token or incomplete profile"),
        (status = 401, description = "Invalid or expired identity-provider token"),
        (status = 403, description = "User is inactive"),
        (status = 503, description = "Identity provider unavailable"),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<LoginResponse>, ApiError> {
    let idp_token = bearer_token(&headers)?;
    let (access_token, user) = services::auth::login_or_register(&state, idp_token).await?;

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer".to_string(),
        expires_in: state.verifier.issuer().default_ttl_secs(),
        user,
    }))
}
