// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Validation and profile cache.
//!
//! Memoizes verified tokens (and identity-provider profiles fetched with
//! them) so repeated requests skip JWKS verification and upstream calls.
//!
//! Two backends:
//! - in-process LRU (default, single replica)
//! - Redis (`REDIS_URL`, shared across replicas)
//!
//! Keys are derived from a SHA-256 of the token; raw tokens are never
//! stored. Entry lifetime is the configured TTL capped at the token's own
//! expiry. Backend failures are logged and treated as misses.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use lru::LruCache;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};

use super::AuthenticatedUser;

/// Capacity of the in-process backend.
pub const DEFAULT_CAPACITY: usize = 10_000;

const TOKEN_PREFIX: &str = "auth:token:";
const PROFILE_PREFIX: &str = "auth:profile:";

/// Upper bound for establishing the Redis connection.
pub const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Upper bound for a single Redis command, reconnects included.
pub const REDIS_RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("redis did not answer within {0:?}")]
    Timeout(Duration),

    #[error("cache entry could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Cached value + expiry instant.
struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// In-process LRU backend.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().ok()?;
        if let Some(entry) = entries.get(key) {
            if Instant::now() < entry.expires_at {
                return Some(entry.value.clone());
            }
            // Expired, evict
            entries.pop(key);
        }
        None
    }

    fn put(&self, key: String, value: String, ttl: Duration) {
        let Some(expires_at) = Instant::now().checked_add(ttl) else {
            return;
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key, MemoryEntry { value, expires_at });
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.pop(key);
        }
    }

    fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

/// Redis backend.
///
/// The connection manager reconnects after the socket drops; every command
/// is bounded by `response_timeout`.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
    response_timeout: Duration,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        Self::connect_with_timeouts(url, REDIS_CONNECT_TIMEOUT, REDIS_RESPONSE_TIMEOUT).await
    }

    pub async fn connect_with_timeouts(
        url: &str,
        connect_timeout: Duration,
        response_timeout: Duration,
    ) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(connect_timeout)
            .set_response_timeout(response_timeout)
            .set_number_of_retries(1);

        let connection = tokio::time::timeout(
            connect_timeout,
            ConnectionManager::new_with_config(client, config),
        )
        .await
        .map_err(|_| CacheError::Timeout(connect_timeout))??;

        Ok(Self {
            connection,
            response_timeout,
        })
    }

    async fn bounded<T>(
        &self,
        command: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, CacheError> {
        tokio::time::timeout(self.response_timeout, command)
            .await
            .map_err(|_| CacheError::Timeout(self.response_timeout))?
            .map_err(CacheError::from)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection.clone();
        self.bounded(conn.get::<_, Option<String>>(key)).await
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let seconds: u64 = ttl.as_secs().max(1);
        self.bounded(conn.set_ex::<_, _, ()>(key, value, seconds)).await
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        self.bounded(conn.del::<_, ()>(key)).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let command = async move { redis::cmd("PING").query_async(&mut conn).await };
        let _: String = self.bounded(command).await?;
        Ok(())
    }
}

pub enum CacheBackend {
    Memory(MemoryCache),
    Redis(RedisCache),
}

/// Token validation / profile cache shared by all requests.
#[derive(Clone)]
pub struct ValidationCache {
    backend: Arc<CacheBackend>,
    ttl: Duration,
}

impl ValidationCache {
    pub fn in_memory(capacity: usize, ttl: Duration) -> Self {
        Self {
            backend: Arc::new(CacheBackend::Memory(MemoryCache::new(capacity))),
            ttl,
        }
    }

    pub fn redis(cache: RedisCache, ttl: Duration) -> Self {
        Self {
            backend: Arc::new(CacheBackend::Redis(cache)),
            ttl,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match &*self.backend {
            CacheBackend::Memory(_) => "memory",
            CacheBackend::Redis(_) => "redis",
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of live entries (in-process backend only).
    pub fn local_len(&self) -> Option<usize> {
        match &*self.backend {
            CacheBackend::Memory(cache) => Some(cache.len()),
            CacheBackend::Redis(_) => None,
        }
    }

    /// Backend reachability, for health checks.
    pub async fn ping(&self) -> Result<(), CacheError> {
        match &*self.backend {
            CacheBackend::Memory(_) => Ok(()),
            CacheBackend::Redis(cache) => cache.ping().await,
        }
    }

    /// Cached verification result for `token`.
    pub async fn get_user(&self, token: &str) -> Option<AuthenticatedUser> {
        self.get_json(&token_key(token)).await
    }

    /// Cache a verification result until `min(ttl, user.expires_at)`.
    pub async fn put_user(&self, token: &str, user: &AuthenticatedUser) {
        if let Some(ttl) = self.entry_ttl(user.expires_at) {
            self.put_json(token_key(token), user, ttl).await;
        }
    }

    /// Cached identity-provider profile fetched with `token`.
    pub async fn get_profile<T: DeserializeOwned>(&self, token: &str) -> Option<T> {
        self.get_json(&profile_key(token)).await
    }

    pub async fn put_profile<T: Serialize>(&self, token: &str, profile: &T, expires_at: i64) {
        if let Some(ttl) = self.entry_ttl(expires_at) {
            self.put_json(profile_key(token), profile, ttl).await;
        }
    }

    /// Drop every entry derived from `token`.
    pub async fn invalidate_token(&self, token: &str) {
        for key in [token_key(token), profile_key(token)] {
            match &*self.backend {
                CacheBackend::Memory(cache) => cache.remove(&key),
                CacheBackend::Redis(cache) => {
                    if let Err(e) = cache.remove(&key).await {
                        tracing::warn!(error = %e, "Cache invalidation failed");
                    }
                }
            }
        }
    }

    fn entry_ttl(&self, expires_at: i64) -> Option<Duration> {
        let remaining = expires_at - chrono::Utc::now().timestamp();
        if remaining <= 0 {
            return None;
        }
        Some(self.ttl.min(Duration::from_secs(remaining as u64)))
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match &*self.backend {
            CacheBackend::Memory(cache) => cache.get(key),
            CacheBackend::Redis(cache) => match cache.get(key).await {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(error = %e, "Cache read failed, treating as miss");
                    None
                }
            },
        }?;

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    async fn put_json<T: Serialize>(&self, key: String, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Cache entry serialization failed");
                return;
            }
        };

        match &*self.backend {
            CacheBackend::Memory(cache) => cache.put(key, raw, ttl),
            CacheBackend::Redis(cache) => {
                if let Err(e) = cache.put(&key, raw, ttl).await {
                    tracing::warn!(error = %e, "Cache write failed");
                }
            }
        }
    }
}

fn digest(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

pub fn token_key(token: &str) -> String {
    format!("{TOKEN_PREFIX}{}", digest(token))
}

pub fn profile_key(token: &str) -> String {
    format!("{PROFILE_PREFIX}{}", digest(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::TokenKind;
    use crate::auth::Role;

    fn sample_user(expires_in: i64) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: "auth0|123".to_string(),
            roles: vec![Role::Customer],
            permissions: vec!["read:profile".to_string()],
            email: Some("test@example.com".to_string()),
            session_id: None,
            issuer: "https://test.auth0.com/".to_string(),
            expires_at: chrono::Utc::now().timestamp() + expires_in,
            token_kind: TokenKind::IdentityProvider,
        }
    }

    #[tokio::test]
    async fn put_and_get_user() {
        let cache = ValidationCache::in_memory(10, Duration::from_secs(300));
        let user = sample_user(3600);

        assert!(cache.get_user("token-a").await.is_none());
        cache.put_user("token-a", &user).await;

        assert_eq!(cache.get_user("token-a").await, Some(user));
        assert!(cache.get_user("token-b").await.is_none());
    }

    #[tokio::test]
    async fn expired_tokens_are_not_cached() {
        let cache = ValidationCache::in_memory(10, Duration::from_secs(300));
        cache.put_user("token-a", &sample_user(-5)).await;
        assert!(cache.get_user("token-a").await.is_none());
        assert_eq!(cache.local_len(), Some(0));
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = ValidationCache::in_memory(10, Duration::from_millis(1));
        cache.put_user("token-a", &sample_user(3600)).await;

        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(cache.get_user("token-a").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_removes_user_and_profile() {
        let cache = ValidationCache::in_memory(10, Duration::from_secs(300));
        let user = sample_user(3600);
        cache.put_user("token-a", &user).await;
        cache
            .put_profile("token-a", &serde_json::json!({"sub": "auth0|123"}), user.expires_at)
            .await;

        cache.invalidate_token("token-a").await;

        assert!(cache.get_user("token-a").await.is_none());
        assert!(cache
            .get_profile::<serde_json::Value>("token-a")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn lru_evicts_oldest() {
        let cache = ValidationCache::in_memory(2, Duration::from_secs(300));
        let user = sample_user(3600);
        cache.put_user("a", &user).await;
        cache.put_user("b", &user).await;
        cache.put_user("c", &user).await;

        assert!(cache.get_user("a").await.is_none());
        assert!(cache.get_user("c").await.is_some());
    }

    /// How the fake Redis server treats `GET`.
    #[derive(Clone, Copy)]
    enum OnGet {
        Stall,
        Hangup,
    }

    /// Minimal RESP server: `+OK` for every command except `GET`.
    async fn fake_redis(on_get: OnGet) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    loop {
                        let n = match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => n,
                        };
                        let chunk = String::from_utf8_lossy(&buf[..n]).to_string();
                        let lines: Vec<&str> = chunk.split("\r\n").collect();
                        if lines.iter().any(|l| l.eq_ignore_ascii_case("GET")) {
                            match on_get {
                                OnGet::Stall => std::future::pending::<()>().await,
                                OnGet::Hangup => return,
                            }
                        }
                        let commands = lines.iter().filter(|l| l.starts_with('*')).count();
                        let reply = "+OK\r\n".repeat(commands.max(1));
                        if socket.write_all(reply.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });
        format!("redis://{addr}")
    }

    async fn redis_cache(url: &str) -> ValidationCache {
        let redis = RedisCache::connect_with_timeouts(
            url,
            Duration::from_secs(2),
            Duration::from_millis(200),
        )
        .await
        .unwrap();
        ValidationCache::redis(redis, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn stalled_redis_is_a_bounded_miss() {
        let url = fake_redis(OnGet::Stall).await;
        let cache = redis_cache(&url).await;
        assert_eq!(cache.backend_name(), "redis");

        cache.put_user("token-a", &sample_user(3600)).await;
        let lookup = tokio::time::timeout(Duration::from_secs(5), cache.get_user("token-a"))
            .await
            .expect("lookup must not hang");
        assert!(lookup.is_none());
    }

    #[tokio::test]
    async fn dropped_redis_connection_is_a_miss() {
        let url = fake_redis(OnGet::Hangup).await;
        let cache = redis_cache(&url).await;

        for _ in 0..2 {
            let lookup = tokio::time::timeout(Duration::from_secs(5), cache.get_user("token-a"))
                .await
                .expect("lookup must not hang");
            assert!(lookup.is_none());
        }

        // Reconnects in the background after the hangup
        let mut recovered = false;
        for _ in 0..20 {
            if cache.ping().await.is_ok() {
                recovered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(recovered);
    }

    #[tokio::test]
    async fn unreachable_redis_fails_to_connect() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = RedisCache::connect_with_timeouts(
            &format!("redis://{addr}"),
            Duration::from_millis(500),
            Duration::from_millis(200),
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn keys_hide_raw_token() {
        let key = token_key("secret.jwt.value");
        assert!(key.starts_with("auth:token:"));
        assert!(!key.contains("secret"));
        assert_ne!(token_key("x"), profile_key("x"));
    }
}
