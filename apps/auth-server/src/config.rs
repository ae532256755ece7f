// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values and the
//! typed [`Settings`] loaded from the environment (and an optional `.env`
//! file) at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `ENVIRONMENT` | Deployment environment name | `development` |
//! | `DEBUG` | Verbose diagnostics | `false` |
//! | `SECRET_KEY` | HMAC key for internal access tokens | Required for production |
//! | `AUTH0_DOMAIN` | Identity provider tenant domain | Optional |
//! | `AUTH0_CLIENT_ID` | Management API client id | Optional |
//! | `AUTH0_CLIENT_SECRET` | Management API client secret | Optional |
//! | `AUTH0_AUDIENCE` | Expected `aud` claim | Optional |
//! | `ALGORITHM` | Internal token algorithm (`HS256`/`HS384`/`HS512`) | `HS256` |
//! | `ACCESS_TOKEN_EXPIRE_MINUTES` | Internal token lifetime | `30` |
//! | `REDIS_URL` | Shared validation cache | In-process LRU |
//! | `DATABASE_URL` | PostgreSQL user store | In-memory store |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8000` |
//! | `ROLES_CLAIM` | Custom claim holding roles | `https://{AUTH0_DOMAIN}/roles` |
//! | `TOKEN_CACHE_TTL_SECS` | Validation/profile cache TTL | `300` |
//! | `JWKS_CACHE_TTL_SECS` | JWKS cache TTL | `300` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::time::Duration;

use jsonwebtoken::Algorithm;

pub const ENVIRONMENT_ENV: &str = "ENVIRONMENT";
pub const DEBUG_ENV: &str = "DEBUG";
pub const SECRET_KEY_ENV: &str = "SECRET_KEY";
pub const AUTH0_DOMAIN_ENV: &str = "AUTH0_DOMAIN";
pub const AUTH0_CLIENT_ID_ENV: &str = "AUTH0_CLIENT_ID";
pub const AUTH0_CLIENT_SECRET_ENV: &str = "AUTH0_CLIENT_SECRET";
pub const AUTH0_AUDIENCE_ENV: &str = "AUTH0_AUDIENCE";
pub const ALGORITHM_ENV: &str = "ALGORITHM";
pub const ACCESS_TOKEN_EXPIRE_MINUTES_ENV: &str = "ACCESS_TOKEN_EXPIRE_MINUTES";
pub const REDIS_URL_ENV: &str = "REDIS_URL";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const ROLES_CLAIM_ENV: &str = "ROLES_CLAIM";
pub const TOKEN_CACHE_TTL_ENV: &str = "TOKEN_CACHE_TTL_SECS";
pub const JWKS_CACHE_TTL_ENV: &str = "JWKS_CACHE_TTL_SECS";

/// Logging format selector, read directly by `main` before settings load.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Placeholder secret used outside production.
pub const DEVELOPMENT_SECRET_KEY: &str = "development-secret-key-change-in-production";

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_EXPIRE_MINUTES: i64 = 30;
/// One year.
pub const MAX_EXPIRE_MINUTES: i64 = 525_600;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Configuration error naming the offending variable.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("{0} must be set when ENVIRONMENT=production")]
    RequiredInProduction(&'static str),
}

/// Typed service settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: String,
    pub debug: bool,
    pub secret_key: String,
    pub auth0_domain: Option<String>,
    pub auth0_client_id: Option<String>,
    pub auth0_client_secret: Option<String>,
    pub auth0_audience: Option<String>,
    pub algorithm: Algorithm,
    pub access_token_expire_minutes: i64,
    pub redis_url: Option<String>,
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub roles_claim: String,
    pub token_cache_ttl: Duration,
    pub jwks_cache_ttl: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            debug: false,
            secret_key: DEVELOPMENT_SECRET_KEY.to_string(),
            auth0_domain: None,
            auth0_client_id: None,
            auth0_client_secret: None,
            auth0_audience: None,
            algorithm: Algorithm::HS256,
            access_token_expire_minutes: DEFAULT_EXPIRE_MINUTES,
            redis_url: None,
            database_url: None,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            roles_claim: "roles".to_string(),
            token_cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            jwks_cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// `main` loads `.env` before logging starts, so values from the file
    /// are already visible here.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Settings::default();

        let environment = get(ENVIRONMENT_ENV).unwrap_or(defaults.environment);
        let debug = match get(DEBUG_ENV) {
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
                name: DEBUG_ENV,
                reason: format!("expected a boolean, got '{raw}'"),
            })?,
            None => defaults.debug,
        };

        let is_production = environment.eq_ignore_ascii_case("production");
        let secret_key = match get(SECRET_KEY_ENV) {
            Some(key) => key,
            None if is_production => return Err(ConfigError::RequiredInProduction(SECRET_KEY_ENV)),
            None => defaults.secret_key,
        };
        if is_production && secret_key == DEVELOPMENT_SECRET_KEY {
            return Err(ConfigError::RequiredInProduction(SECRET_KEY_ENV));
        }

        let algorithm = match get(ALGORITHM_ENV) {
            Some(raw) => parse_internal_algorithm(&raw)?,
            None => defaults.algorithm,
        };

        let access_token_expire_minutes = match get(ACCESS_TOKEN_EXPIRE_MINUTES_ENV) {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|m| (1..=MAX_EXPIRE_MINUTES).contains(m))
                .ok_or_else(|| ConfigError::Invalid {
                    name: ACCESS_TOKEN_EXPIRE_MINUTES_ENV,
                    reason: format!("expected 1..={MAX_EXPIRE_MINUTES} minutes, got '{raw}'"),
                })?,
            None => defaults.access_token_expire_minutes,
        };

        let port = match get(PORT_ENV) {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: PORT_ENV,
                reason: format!("expected a port number, got '{raw}'"),
            })?,
            None => defaults.port,
        };

        let auth0_domain = get(AUTH0_DOMAIN_ENV).map(|d| normalize_domain(&d));
        let roles_claim = get(ROLES_CLAIM_ENV).unwrap_or_else(|| match &auth0_domain {
            Some(domain) => format!("https://{domain}/roles"),
            None => defaults.roles_claim.clone(),
        });

        Ok(Self {
            environment,
            debug,
            secret_key,
            auth0_domain,
            auth0_client_id: get(AUTH0_CLIENT_ID_ENV),
            auth0_client_secret: get(AUTH0_CLIENT_SECRET_ENV),
            auth0_audience: get(AUTH0_AUDIENCE_ENV),
            algorithm,
            access_token_expire_minutes,
            redis_url: get(REDIS_URL_ENV),
            database_url: get(DATABASE_URL_ENV),
            host: get(HOST_ENV).unwrap_or(defaults.host),
            port,
            roles_claim,
            token_cache_ttl: parse_secs(get(TOKEN_CACHE_TTL_ENV), TOKEN_CACHE_TTL_ENV)?
                .unwrap_or(defaults.token_cache_ttl),
            jwks_cache_ttl: parse_secs(get(JWKS_CACHE_TTL_ENV), JWKS_CACHE_TTL_ENV)?
                .unwrap_or(defaults.jwks_cache_ttl),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Base URL of the identity provider tenant, if configured.
    pub fn auth0_base_url(&self) -> Option<String> {
        self.auth0_domain
            .as_ref()
            .map(|domain| format!("https://{domain}"))
    }

    /// Expected `iss` claim for identity-provider tokens (trailing slash included).
    pub fn issuer(&self) -> Option<String> {
        self.auth0_base_url().map(|base| format!("{base}/"))
    }

    pub fn jwks_url(&self) -> Option<String> {
        self.auth0_base_url()
            .map(|base| format!("{base}/.well-known/jwks.json"))
    }

    /// Issuer stamped on internal tokens.
    pub fn internal_issuer(&self) -> String {
        self.issuer()
            .unwrap_or_else(|| "urn:auth-server:internal".to_string())
    }

    /// Audience stamped on internal tokens.
    pub fn internal_audience(&self) -> String {
        self.auth0_audience
            .clone()
            .unwrap_or_else(|| "urn:auth-server:api".to_string())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the Management API can be used.
    pub fn has_management_credentials(&self) -> bool {
        self.auth0_domain.is_some()
            && self.auth0_client_id.is_some()
            && self.auth0_client_secret.is_some()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_internal_algorithm(raw: &str) -> Result<Algorithm, ConfigError> {
    match raw.to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        _ => Err(ConfigError::Invalid {
            name: ALGORITHM_ENV,
            reason: format!("unsupported internal token algorithm '{raw}'"),
        }),
    }
}

fn parse_secs(raw: Option<String>, name: &'static str) -> Result<Option<Duration>, ConfigError> {
    raw.map(|value| {
        value
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::Invalid {
                name,
                reason: format!("expected seconds, got '{value}'"),
            })
    })
    .transpose()
}

/// Accept `tenant.auth0.com`, `https://tenant.auth0.com/` and similar.
fn normalize_domain(raw: &str) -> String {
    let without_scheme = raw
        .strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"))
        .unwrap_or(raw);
    without_scheme.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let settings = settings_from(&[]).unwrap();
        assert_eq!(settings.environment, "development");
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.algorithm, Algorithm::HS256);
        assert_eq!(settings.access_token_expire_minutes, 30);
        assert_eq!(settings.roles_claim, "roles");
        assert!(settings.jwks_url().is_none());
    }

    #[test]
    fn auth0_domain_derives_urls() {
        let settings = settings_from(&[("AUTH0_DOMAIN", "https://tenant.auth0.com/")]).unwrap();
        assert_eq!(settings.auth0_domain.as_deref(), Some("tenant.auth0.com"));
        assert_eq!(settings.issuer().as_deref(), Some("https://tenant.auth0.com/"));
        assert_eq!(
            settings.jwks_url().as_deref(),
            Some("https://tenant.auth0.com/.well-known/jwks.json")
        );
        assert_eq!(settings.roles_claim, "https://tenant.auth0.com/roles");
    }

    #[test]
    fn invalid_port_names_variable() {
        let err = settings_from(&[("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }

    #[test]
    fn token_lifetime_is_bounded() {
        for raw in ["0", "-5", "525601", "1000000000000", "9223372036854775807"] {
            let err = settings_from(&[("ACCESS_TOKEN_EXPIRE_MINUTES", raw)]).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::Invalid { name: "ACCESS_TOKEN_EXPIRE_MINUTES", .. }
            ));
        }
        let settings = settings_from(&[("ACCESS_TOKEN_EXPIRE_MINUTES", "525600")]).unwrap();
        assert_eq!(settings.access_token_expire_minutes, MAX_EXPIRE_MINUTES);
        let issuer = crate::auth::TokenIssuer::from_settings(&settings);
        assert_eq!(issuer.default_ttl_secs(), MAX_EXPIRE_MINUTES * 60);
    }

    #[test]
    fn asymmetric_internal_algorithm_is_rejected() {
        let err = settings_from(&[("ALGORITHM", "RS256")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "ALGORITHM", .. }));
    }

    #[test]
    fn production_requires_real_secret() {
        let err = settings_from(&[("ENVIRONMENT", "production")]).unwrap_err();
        assert_eq!(err, ConfigError::RequiredInProduction("SECRET_KEY"));

        let ok = settings_from(&[("ENVIRONMENT", "production"), ("SECRET_KEY", "s3cr3t")]);
        assert!(ok.unwrap().is_production());
    }

    #[test]
    fn debug_accepts_common_booleans() {
        assert!(settings_from(&[("DEBUG", "True")]).unwrap().debug);
        assert!(!settings_from(&[("DEBUG", "0")]).unwrap().debug);
        assert!(settings_from(&[("DEBUG", "maybe")]).is_err());
    }
}
