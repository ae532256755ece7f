// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! PostgreSQL user repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{NewUser, RepositoryError, RepositoryResult, User, UserRepository, UserUpdate};
use crate::auth::Role;

const USER_COLUMNS: &str =
    "id, auth0_id, email, name, role, is_active, created_at, updated_at, last_login";

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and apply pending migrations.
    pub async fn connect(database_url: &str) -> RepositoryResult<Self> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| RepositoryError::Database(e.into()))?;
        tracing::info!("Database migrations applied");
        Ok(Self::new(pool))
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> RepositoryResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {column} = $1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_user).transpose()
    }
}

impl UserRepository for PgUserRepository {
    async fn get_by_id(&self, id: i64) -> RepositoryResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_user).transpose()
    }

    async fn get_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        self.fetch_one_by("email", email).await
    }

    async fn get_by_auth0_id(&self, auth0_id: &str) -> RepositoryResult<Option<User>> {
        self.fetch_one_by("auth0_id", auth0_id).await
    }

    async fn create(&self, user: NewUser) -> RepositoryResult<User> {
        user.validate()?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (auth0_id, email, name, role, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, TRUE, NOW(), NOW())
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.auth0_id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict(
                format!("User with auth0_id {} or email {}", user.auth0_id, user.email),
            ),
            other => RepositoryError::Database(other),
        })?;

        row.into_user()
    }

    async fn update(&self, id: i64, update: UserUpdate) -> RepositoryResult<User> {
        update.validate()?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                role = COALESCE($3, role),
                is_active = COALESCE($4, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.name.as_deref())
        .bind(update.role.map(|r| r.as_str()))
        .bind(update.is_active)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| RepositoryError::NotFound(format!("User {id}")))?
            .into_user()
    }

    async fn delete(&self, id: i64) -> RepositoryResult<()> {
        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(RepositoryError::NotFound(format!("User {id}")));
        }
        Ok(())
    }

    async fn touch_last_login(&self, id: i64) -> RepositoryResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users SET last_login = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| RepositoryError::NotFound(format!("User {id}")))?
            .into_user()
    }

    async fn list(&self, offset: i64, limit: i64) -> RepositoryResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id OFFSET $1 LIMIT $2"
        ))
        .bind(offset.max(0))
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserRow::into_user).collect()
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    auth0_id: String,
    email: String,
    name: String,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
}

impl UserRow {
    fn into_user(self) -> RepositoryResult<User> {
        let role = Role::parse(&self.role).ok_or_else(|| {
            RepositoryError::Validation(format!("Invalid role in database: {}", self.role))
        })?;

        Ok(User {
            id: self.id,
            auth0_id: self.auth0_id,
            email: self.email,
            name: self.name,
            role,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_login: self.last_login,
        })
    }
}
