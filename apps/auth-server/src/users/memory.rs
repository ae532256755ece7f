// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory user repository.
//!
//! Used when `DATABASE_URL` is not set and throughout the tests. Data is
//! lost on restart.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use super::{NewUser, RepositoryError, RepositoryResult, User, UserRepository, UserUpdate};

#[derive(Default)]
struct Inner {
    users: BTreeMap<i64, User>,
    next_id: i64,
}

#[derive(Clone, Default)]
pub struct InMemoryUserRepository {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserRepository for InMemoryUserRepository {
    async fn get_by_id(&self, id: i64) -> RepositoryResult<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn get_by_auth0_id(&self, auth0_id: &str) -> RepositoryResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.auth0_id == auth0_id).cloned())
    }

    async fn create(&self, user: NewUser) -> RepositoryResult<User> {
        user.validate()?;

        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.auth0_id == user.auth0_id) {
            return Err(RepositoryError::Conflict(format!(
                "User with auth0_id {}",
                user.auth0_id
            )));
        }
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(RepositoryError::Conflict(format!(
                "User with email {}",
                user.email
            )));
        }

        inner.next_id += 1;
        let now = Utc::now();
        let created = User {
            id: inner.next_id,
            auth0_id: user.auth0_id,
            email: user.email,
            name: user.name,
            role: user.role,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_login: None,
        };
        inner.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i64, update: UserUpdate) -> RepositoryResult<User> {
        update.validate()?;

        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("User {id}")))?;
        update.apply(user, Utc::now());
        Ok(user.clone())
    }

    async fn delete(&self, id: i64) -> RepositoryResult<()> {
        self.inner
            .write()
            .await
            .users
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("User {id}")))
    }

    async fn touch_last_login(&self, id: i64) -> RepositoryResult<User> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("User {id}")))?;
        let now = Utc::now();
        user.last_login = Some(now);
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn list(&self, offset: i64, limit: i64) -> RepositoryResult<Vec<User>> {
        let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        let inner = self.inner.read().await;
        Ok(inner.users.values().skip(offset).take(limit).cloned().collect())
    }

    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}
