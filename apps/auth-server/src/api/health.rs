// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Service information and health endpoints.

use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::OptionalAuth;
use crate::config::DEVELOPMENT_SECRET_KEY;
use crate::state::AppState;
use crate::users::UserRepository;

const SERVICE_NAME: &str = "Auth Gateway";
const VERSION: &str = env!("CARGO_PKG_VERSION");

const OK: &str = "ok";

/// Response for GET /
#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub status: String,
    pub environment: String,
    pub auth_provider: String,
    /// Well-known endpoint paths
    pub endpoints: BTreeMap<String, String>,
    /// Subject of a valid bearer token sent with the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticated_as: Option<String>,
}

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    pub timestamp: String,
    pub environment: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Component name to "ok" or a short problem description
    pub checks: BTreeMap<String, String>,
    /// Names of failing checks
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    pub ready: bool,
    pub timestamp: String,
    pub checks: BTreeMap<String, bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LiveResponse {
    pub alive: bool,
    pub timestamp: String,
}

/// Service information.
#[utoipa::path(
    get,
    path = "/",
    tag = "Root",
    responses((status = 200, description = "Service information", body = ServiceInfo))
)]
pub async fn root(
    State(state): State<AppState>,
    OptionalAuth(caller): OptionalAuth,
) -> Json<ServiceInfo> {
    let endpoints = [
        ("health", "/health"),
        ("docs", "/docs"),
        ("openapi", "/api-doc/openapi.json"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    Json(ServiceInfo {
        service: SERVICE_NAME.to_string(),
        version: VERSION.to_string(),
        status: "running".to_string(),
        environment: state.settings.environment.clone(),
        auth_provider: "Auth0".to_string(),
        endpoints,
        authenticated_as: caller.map(|user| user.user_id),
    })
}

fn configuration_check(state: &AppState) -> String {
    if state.settings.secret_key.is_empty() {
        "missing SECRET_KEY".to_string()
    } else if state.settings.is_production() && state.settings.secret_key == DEVELOPMENT_SECRET_KEY {
        "development SECRET_KEY in production".to_string()
    } else {
        OK.to_string()
    }
}

fn auth0_check(state: &AppState) -> String {
    if state.settings.auth0_domain.is_some() {
        OK.to_string()
    } else {
        "warning - not configured".to_string()
    }
}

async fn database_check(state: &AppState) -> String {
    match state.users.ping().await {
        Ok(()) => OK.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            "unavailable".to_string()
        }
    }
}

async fn cache_check(state: &AppState) -> String {
    match state.verifier.cache().ping().await {
        Ok(()) => OK.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Cache health check failed");
            "unavailable".to_string()
        }
    }
}

/// JWKS key availability; absent when no identity provider is configured.
///
/// Reads the cached state only. Stale keys still verify tokens, so they
/// count as ok.
async fn jwks_check(state: &AppState) -> Option<String> {
    let jwks = state.verifier.jwks()?;
    Some(if jwks.has_keys().await {
        OK.to_string()
    } else {
        "not loaded".to_string()
    })
}

/// Health check endpoint handler.
///
/// Always 200 so load balancers can read the body; `status` reports
/// "degraded" when any check fails.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Health report", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut checks = BTreeMap::new();
    checks.insert("application".to_string(), OK.to_string());
    checks.insert("configuration".to_string(), configuration_check(&state));
    checks.insert("auth0_config".to_string(), auth0_check(&state));
    checks.insert("database".to_string(), database_check(&state).await);
    checks.insert("cache".to_string(), cache_check(&state).await);
    if let Some(jwks) = jwks_check(&state).await {
        checks.insert("jwks".to_string(), jwks);
    }

    let issues: Vec<String> = checks
        .iter()
        .filter(|(_, v)| v.as_str() != OK)
        .map(|(k, _)| k.clone())
        .collect();

    tracing::debug!(issues = ?issues, "Health check completed");

    Json(HealthResponse {
        status: if issues.is_empty() { "healthy" } else { "degraded" }.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        environment: state.settings.environment.clone(),
        version: VERSION.to_string(),
        uptime_seconds: state.uptime().as_secs(),
        checks,
        issues,
    })
}

/// Readiness handler.
///
/// 503 until configuration and the user store are usable.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let mut checks = BTreeMap::new();
    checks.insert("application".to_string(), true);
    checks.insert("configuration".to_string(), configuration_check(&state) == OK);
    checks.insert("database".to_string(), state.users.ping().await.is_ok());

    let ready = checks.values().all(|ok| *ok);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            ready,
            timestamp: Utc::now().to_rfc3339(),
            checks,
        }),
    )
}

/// Liveness handler.
///
/// Always returns 200 if the process is running.
#[utoipa::path(
    get,
    path = "/live",
    tag = "Health",
    responses((status = 200, description = "Service is alive", body = LiveResponse))
)]
pub async fn liveness() -> Json<LiveResponse> {
    Json(LiveResponse {
        alive: true,
        timestamp: Utc::now().to_rfc3339(),
    })
}
