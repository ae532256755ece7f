// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User persistence.
//!
//! Users are keyed by a numeric id and linked to the identity provider by
//! `auth0_id`. Both `auth0_id` and `email` are unique.
//!
//! Backends:
//! - [`InMemoryUserRepository`] for development and tests
//! - [`PgUserRepository`] for PostgreSQL (`migrations/`)

pub mod memory;
pub mod postgres;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Role;

pub use memory::InMemoryUserRepository;
pub use postgres::PgUserRepository;

const MAX_FIELD_LEN: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Persisted user.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    /// Identity-provider subject (`sub`)
    pub auth0_id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

/// Input for [`UserRepository::create`].
#[derive(Debug, Clone, Deserialize, ToSchema, PartialEq, Eq)]
pub struct NewUser {
    pub auth0_id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub role: Role,
}

impl NewUser {
    pub fn validate(&self) -> RepositoryResult<()> {
        validate_length("auth0_id", &self.auth0_id)?;
        validate_length("name", &self.name)?;
        validate_email(&self.email)
    }
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, ToSchema, PartialEq, Eq)]
pub struct UserUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl UserUpdate {
    pub fn validate(&self) -> RepositoryResult<()> {
        if let Some(name) = &self.name {
            validate_length("name", name)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.role.is_none() && self.is_active.is_none()
    }

    fn apply(&self, user: &mut User, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            user.name = name.clone();
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(is_active) = self.is_active {
            user.is_active = is_active;
        }
        user.updated_at = now;
    }
}

fn validate_length(field: &str, value: &str) -> RepositoryResult<()> {
    let len = value.trim().chars().count();
    if len == 0 || value.chars().count() > MAX_FIELD_LEN {
        return Err(RepositoryError::Validation(format!(
            "{field} must be 1 to {MAX_FIELD_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> RepositoryResult<()> {
    let valid = email.chars().count() <= MAX_FIELD_LEN
        && matches!(
            email.split_once('@'),
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@')
        );
    if !valid {
        return Err(RepositoryError::Validation(format!(
            "invalid email address: {email}"
        )));
    }
    Ok(())
}

/// User storage operations.
#[trait_variant::make(UserRepository: Send)]
pub trait LocalUserRepository {
    async fn get_by_id(&self, id: i64) -> RepositoryResult<Option<User>>;

    async fn get_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;

    async fn get_by_auth0_id(&self, auth0_id: &str) -> RepositoryResult<Option<User>>;

    /// Insert a user; duplicate `auth0_id` or `email` is a `Conflict`.
    async fn create(&self, user: NewUser) -> RepositoryResult<User>;

    async fn update(&self, id: i64, update: UserUpdate) -> RepositoryResult<User>;

    async fn delete(&self, id: i64) -> RepositoryResult<()>;

    async fn touch_last_login(&self, id: i64) -> RepositoryResult<User>;

    /// Users ordered by id.
    async fn list(&self, offset: i64, limit: i64) -> RepositoryResult<Vec<User>>;

    /// Connectivity check used by health endpoints.
    async fn ping(&self) -> RepositoryResult<()>;
}

/// Repository selected at startup.
#[derive(Clone)]
pub enum UserStore {
    Memory(InMemoryUserRepository),
    Postgres(PgUserRepository),
}

impl UserStore {
    pub fn in_memory() -> Self {
        UserStore::Memory(InMemoryUserRepository::new())
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            UserStore::Memory(_) => "memory",
            UserStore::Postgres(_) => "postgres",
        }
    }
}

// Both repository traits are in scope here, so calls are fully qualified.
macro_rules! dispatch {
    ($self:ident.$method:ident($($arg:expr),*)) => {
        match $self {
            UserStore::Memory(repo) => UserRepository::$method(repo, $($arg),*).await,
            UserStore::Postgres(repo) => UserRepository::$method(repo, $($arg),*).await,
        }
    };
}

impl UserRepository for UserStore {
    async fn get_by_id(&self, id: i64) -> RepositoryResult<Option<User>> {
        dispatch!(self.get_by_id(id))
    }

    async fn get_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        dispatch!(self.get_by_email(email))
    }

    async fn get_by_auth0_id(&self, auth0_id: &str) -> RepositoryResult<Option<User>> {
        dispatch!(self.get_by_auth0_id(auth0_id))
    }

    async fn create(&self, user: NewUser) -> RepositoryResult<User> {
        dispatch!(self.create(user))
    }

    async fn update(&self, id: i64, update: UserUpdate) -> RepositoryResult<User> {
        dispatch!(self.update(id, update))
    }

    async fn delete(&self, id: i64) -> RepositoryResult<()> {
        dispatch!(self.delete(id))
    }

    async fn touch_last_login(&self, id: i64) -> RepositoryResult<User> {
        dispatch!(self.touch_last_login(id))
    }

    async fn list(&self, offset: i64, limit: i64) -> RepositoryResult<Vec<User>> {
        dispatch!(self.list(offset, limit))
    }

    async fn ping(&self) -> RepositoryResult<()> {
        dispatch!(self.ping())
    }
}
