// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::cache::{RedisCache, DEFAULT_CAPACITY};
use crate::auth::{IdentityProviderConfig, JwksManager, TokenIssuer, TokenVerifier, ValidationCache};
use crate::config::Settings;
use crate::providers::Auth0Client;
use crate::users::{PgUserRepository, RepositoryError, UserStore};

/// Outbound HTTP timeout (JWKS, userinfo, Management API).
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to open user database: {0}")]
    Database(#[from] RepositoryError),
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub verifier: TokenVerifier,
    /// Identity-provider client; `None` when `AUTH0_DOMAIN` is unset
    pub identity: Option<Auth0Client>,
    pub users: UserStore,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        verifier: TokenVerifier,
        identity: Option<Auth0Client>,
        users: UserStore,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            verifier,
            identity,
            users,
            started_at: Instant::now(),
        }
    }

    /// Wire up clients and stores from configuration.
    ///
    /// Redis falls back to the in-process cache when unreachable; an
    /// unreachable database is fatal.
    pub async fn from_settings(settings: Settings) -> Result<Self, StartupError> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        let jwks = settings.jwks_url().map(|url| {
            Arc::new(JwksManager::new(url, http.clone()).with_cache_ttl(settings.jwks_cache_ttl))
        });
        match &jwks {
            Some(jwks) => {
                if let Err(e) = jwks.refresh().await {
                    tracing::warn!(error = %e, "Initial JWKS fetch failed; retrying on first use");
                }
            }
            None => {
                tracing::warn!("AUTH0_DOMAIN not set; identity-provider tokens will be rejected")
            }
        }

        let cache = match &settings.redis_url {
            Some(url) => match RedisCache::connect(url).await {
                Ok(redis) => {
                    tracing::info!("Using Redis validation cache");
                    ValidationCache::redis(redis, settings.token_cache_ttl)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Redis unavailable, using in-process cache");
                    ValidationCache::in_memory(DEFAULT_CAPACITY, settings.token_cache_ttl)
                }
            },
            None => ValidationCache::in_memory(DEFAULT_CAPACITY, settings.token_cache_ttl),
        };

        let users = match &settings.database_url {
            Some(url) => UserStore::Postgres(PgUserRepository::connect(url).await?),
            None => {
                tracing::warn!("DATABASE_URL not set; users are kept in memory");
                UserStore::in_memory()
            }
        };

        let verifier = TokenVerifier::new(
            jwks,
            IdentityProviderConfig::from_settings(&settings),
            TokenIssuer::from_settings(&settings),
            cache,
        );
        let identity = Auth0Client::from_settings(&settings, http);

        Ok(Self::new(settings, verifier, identity, users))
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// In-memory state without an identity provider; internal tokens are
    /// signed with the shared test secret.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        use crate::auth::test_support::{test_verifier, TEST_ROLES_CLAIM};

        let settings = Settings {
            roles_claim: TEST_ROLES_CLAIM.to_string(),
            ..Settings::default()
        };
        let verifier = test_verifier(
            None,
            ValidationCache::in_memory(100, Duration::from_secs(300)),
        );
        Self::new(settings, verifier, None, UserStore::in_memory())
    }

    /// Store a user numbered `n` (unique `auth0|n` id and email).
    #[cfg(test)]
    pub async fn seed_user(&self, n: u32, role: crate::auth::Role) -> crate::users::User {
        use crate::users::{NewUser, UserRepository};

        self.users
            .create(NewUser {
                auth0_id: format!("auth0|{n}"),
                email: format!("user{n}@example.com"),
                name: format!("User {n}"),
                role,
            })
            .await
            .expect("seed user")
    }
}
