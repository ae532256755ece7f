// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! Complements the extractors in `extractor.rs` when a whole router
//! subtree needs authentication or a permission gate:
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/users", get(list_users))
//!     .route_layer(middleware::from_fn(|request: Request, next: Next| {
//!         enforce_permissions(&["read:users"], request, next)
//!     }))
//!     .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));
//! ```
//!
//! Layers run outermost-last, so `authenticate` must be added after the
//! permission gate.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{extractor::bearer_token, permissions::missing_permissions, AuthError, AuthenticatedUser};
use crate::services;
use crate::state::AppState;

/// Verify the bearer token and attach the caller to request extensions.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match bearer_token(request.headers()) {
        Ok(token) => token.to_string(),
        Err(e) => return e.into_response(),
    };

    match services::auth::authenticate(&state, &token).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error_code = e.error_code(), "Authentication rejected");
            e.into_response()
        }
    }
}

/// Reject callers lacking any of `required` with 403.
///
/// Expects `authenticate` to have run; a request without a caller is 401.
pub async fn enforce_permissions(
    required: &'static [&'static str],
    request: Request,
    next: Next,
) -> Response {
    let Some(user) = request.extensions().get::<AuthenticatedUser>() else {
        return AuthError::MissingAuthHeader.into_response();
    };

    let missing = missing_permissions(required, &user.permissions);
    if !missing.is_empty() {
        tracing::info!(
            user_id = %user.user_id,
            missing = ?missing,
            "Permission check failed"
        );
        return AuthError::MissingPermissions(missing).into_response();
    }

    next.run(request).await
}
