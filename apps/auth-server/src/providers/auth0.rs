// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Auth0 identity-provider integration.
//!
//! - `/userinfo` profile lookup with the caller's access token
//! - Management API user lookup with a client-credentials token, cached
//!   until shortly before it expires

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use url::Url;

use crate::auth::{claims::string_list, AuthError};
use crate::config::Settings;

/// Management tokens are renewed this long before their expiry.
const TOKEN_RENEWAL_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity provider rejected the token ({0})")]
    Rejected(u16),

    #[error("identity provider resource not found: {0}")]
    NotFound(String),

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("identity provider response was invalid: {0}")]
    InvalidResponse(String),

    #[error("management API credentials are not configured")]
    NotConfigured,
}

impl From<IdentityError> for AuthError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Rejected(_) => AuthError::InvalidToken(err.to_string()),
            IdentityError::NotFound(_) => AuthError::InvalidToken(err.to_string()),
            IdentityError::Unavailable(msg) | IdentityError::InvalidResponse(msg) => {
                AuthError::IdentityProviderUnavailable(msg)
            }
            IdentityError::NotConfigured => AuthError::IdentityProviderNotConfigured,
        }
    }
}

/// Profile returned by `/userinfo` or the Management API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Custom (namespaced) claims, `roles`, `permissions`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    /// Role names from `roles_claim`, falling back to `roles`.
    pub fn role_names(&self, roles_claim: &str) -> Result<Vec<String>, AuthError> {
        let raw = [roles_claim, "roles"]
            .iter()
            .find_map(|key| self.extra.get(*key).filter(|v| !v.is_null()));
        string_list(raw, "roles")
    }

    pub fn permissions(&self) -> Result<Vec<String>, AuthError> {
        string_list(self.extra.get("permissions"), "permissions")
    }
}

#[derive(Debug, Deserialize)]
struct ManagementTokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// HTTP client for the identity provider tenant.
#[derive(Clone)]
pub struct Auth0Client {
    base_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    http: Client,
    management_token: Arc<Mutex<Option<CachedToken>>>,
}

impl Auth0Client {
    pub fn new(base_url: impl Into<String>, http: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: None,
            client_secret: None,
            http,
            management_token: Arc::new(Mutex::new(None)),
        }
    }

    /// Client for the tenant in `AUTH0_DOMAIN`, if configured.
    pub fn from_settings(settings: &Settings, http: Client) -> Option<Self> {
        let base_url = settings.auth0_base_url()?;
        let mut client = Self::new(base_url, http);
        if let (Some(id), Some(secret)) = (&settings.auth0_client_id, &settings.auth0_client_secret)
        {
            client = client.with_management_credentials(id.clone(), secret.clone());
        }
        Some(client)
    }

    pub fn with_management_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn jwks_url(&self) -> String {
        format!("{}/.well-known/jwks.json", self.base_url)
    }

    pub fn userinfo_url(&self) -> String {
        format!("{}/userinfo", self.base_url)
    }

    /// Fetch the profile of the token's subject.
    pub async fn get_user_info(&self, access_token: &str) -> Result<UserProfile, IdentityError> {
        let response = self
            .http
            .get(self.userinfo_url())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("GET /userinfo failed: {e}")))?;

        parse_json(response, "/userinfo").await
    }

    /// Fetch a user through the Management API.
    pub async fn get_user_by_id(&self, user_id: &str) -> Result<UserProfile, IdentityError> {
        let token = self.management_token().await?;

        let mut url = Url::parse(&self.base_url)
            .map_err(|e| IdentityError::InvalidResponse(format!("invalid base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| IdentityError::InvalidResponse("base URL cannot be a base".to_string()))?
            .extend(["api", "v2", "users", user_id]);

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("GET /api/v2/users failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(IdentityError::NotFound(format!("user {user_id}")));
        }
        parse_json(response, "/api/v2/users").await
    }

    async fn management_token(&self) -> Result<String, IdentityError> {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            return Err(IdentityError::NotConfigured);
        };

        let mut cached = self.management_token.lock().await;
        if let Some(entry) = &*cached {
            if Instant::now() + TOKEN_RENEWAL_MARGIN < entry.expires_at {
                return Ok(entry.token.clone());
            }
        }

        let response = self
            .http
            .post(format!("{}/oauth/token", self.base_url))
            .json(&json!({
                "grant_type": "client_credentials",
                "client_id": client_id,
                "client_secret": client_secret,
                "audience": format!("{}/api/v2/", self.base_url),
            }))
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("token request failed: {e}")))?;

        let token: ManagementTokenResponse = parse_json(response, "/oauth/token").await?;
        if token.access_token.trim().is_empty() {
            return Err(IdentityError::InvalidResponse(
                "token response did not include access_token".to_string(),
            ));
        }

        tracing::info!(expires_in = token.expires_in, "Management API token acquired");
        *cached = Instant::now()
            .checked_add(Duration::from_secs(token.expires_in))
            .map(|expires_at| CachedToken {
                token: token.access_token.clone(),
                expires_at,
            });
        Ok(token.access_token)
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    path: &str,
) -> Result<T, IdentityError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(IdentityError::Rejected(status.as_u16()));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(IdentityError::Unavailable(format!(
            "{path} returned {status}: {body}"
        )));
    }

    response
        .json()
        .await
        .map_err(|e| IdentityError::InvalidResponse(format!("{path} invalid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> Auth0Client {
        Auth0Client::new(server.base_url(), Client::new())
    }

    #[test]
    fn urls_derive_from_base() {
        let client = Auth0Client::new("https://tenant.auth0.com/", Client::new());
        assert_eq!(client.base_url(), "https://tenant.auth0.com");
        assert_eq!(
            client.jwks_url(),
            "https://tenant.auth0.com/.well-known/jwks.json"
        );
        assert_eq!(client.userinfo_url(), "https://tenant.auth0.com/userinfo");
    }

    #[tokio::test]
    async fn user_info_sends_bearer_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/userinfo")
                    .header("authorization", "Bearer idp-token");
                then.status(200).json_body(serde_json::json!({
                    "sub": "auth0|123456789",
                    "email": "test@example.com",
                    "name": "Test User",
                    "https://test.auth0.com/roles": ["service_provider"],
                    "permissions": ["read:services"]
                }));
            })
            .await;

        let profile = client(&server).get_user_info("idp-token").await.unwrap();
        mock.assert_async().await;
        assert_eq!(profile.sub.as_deref(), Some("auth0|123456789"));
        assert_eq!(
            profile.role_names("https://test.auth0.com/roles").unwrap(),
            vec!["service_provider"]
        );
        assert_eq!(profile.permissions().unwrap(), vec!["read:services"]);
    }

    #[tokio::test]
    async fn rejected_token_maps_to_unauthorized() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/userinfo");
                then.status(401);
            })
            .await;

        let err = client(&server).get_user_info("bad").await.unwrap_err();
        assert_eq!(err, IdentityError::Rejected(401));
        let auth: AuthError = err.into();
        assert_eq!(auth.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn upstream_outage_maps_to_service_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/userinfo");
                then.status(502);
            })
            .await;

        let err = client(&server).get_user_info("token").await.unwrap_err();
        let auth: AuthError = err.into();
        assert_eq!(
            auth.status_code(),
            axum::http::StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn management_lookup_reuses_token() {
        let server = MockServer::start_async().await;
        let token_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(200).json_body(serde_json::json!({
                    "access_token": "mgmt-token",
                    "expires_in": 86400,
                    "token_type": "Bearer"
                }));
            })
            .await;
        let user_mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v2/users/auth0%7C123456789")
                    .header("authorization", "Bearer mgmt-token");
                then.status(200).json_body(serde_json::json!({
                    "user_id": "auth0|123456789",
                    "email": "test@example.com",
                    "name": "Test User From API"
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v2/users/auth0%7Cmissing");
                then.status(404);
            })
            .await;

        let client = client(&server).with_management_credentials("id", "secret");
        let profile = client.get_user_by_id("auth0|123456789").await.unwrap();
        assert_eq!(profile.name.as_deref(), Some("Test User From API"));

        let err = client.get_user_by_id("auth0|missing").await.unwrap_err();
        assert!(matches!(err, IdentityError::NotFound(_)));

        token_mock.assert_hits_async(1).await;
        user_mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn unrepresentable_token_lifetime_is_not_cached() {
        let server = MockServer::start_async().await;
        let token_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(200).json_body(serde_json::json!({
                    "access_token": "mgmt-token",
                    "expires_in": u64::MAX
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v2/users/auth0%7C1");
                then.status(200).json_body(serde_json::json!({ "user_id": "auth0|1" }));
            })
            .await;

        let client = client(&server).with_management_credentials("id", "secret");
        client.get_user_by_id("auth0|1").await.unwrap();
        client.get_user_by_id("auth0|1").await.unwrap();

        token_mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn management_lookup_requires_credentials() {
        let server = MockServer::start_async().await;
        let err = client(&server).get_user_by_id("auth0|1").await.unwrap_err();
        assert_eq!(err, IdentityError::NotConfigured);
    }
}
