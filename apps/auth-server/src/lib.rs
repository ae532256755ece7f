// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Auth Gateway - token verification and authorization service
//!
//! Verifies identity-provider (Auth0) access tokens against the tenant's
//! JWKS, maps role and permission claims, and protects API routes by role
//! and permission. Logged-in users are stored locally and receive internal
//! HMAC-signed tokens.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Token verification, caching, extractors and middleware
//! - `config` - Environment configuration
//! - `providers` - Identity provider (Auth0) client
//! - `services` - Login and token exchange
//! - `users` - User persistence (PostgreSQL or in-memory)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod providers;
pub mod services;
pub mod state;
pub mod users;
