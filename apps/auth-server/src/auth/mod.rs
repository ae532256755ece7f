// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer-token authentication and role/permission authorization.
//!
//! ## Auth Flow
//!
//! 1. Client authenticates with the identity provider (Auth0)
//! 2. Client sends `Authorization: Bearer <access token>`
//! 3. Server:
//!    - Returns a cached result when the same token was verified recently
//!    - Otherwise fetches JWKS, verifies signature, expiry, issuer, audience
//!    - Maps `sub`, the custom roles claim and `permissions`
//! 4. Optionally the client exchanges the provider token for an internal
//!    token at `/v1/auth/login`; internal tokens verify with `SECRET_KEY`
//!
//! ## Security
//!
//! - Expired tokens are rejected before any role or permission check
//! - JWKS and validation results are cached with TTLs
//! - Clock skew tolerance is 60 seconds

pub mod cache;
pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod middleware;
pub mod permissions;
pub mod roles;
pub mod token;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::ValidationCache;
pub use claims::{AuthenticatedUser, TokenKind};
pub use error::AuthError;
pub use extractor::{
    AdminOnly, AdminRole, Auth, CustomerRole, OptionalAuth, RequireRole, ServiceProviderRole,
};
pub use jwks::JwksManager;
pub use roles::Role;
pub use token::TokenIssuer;
pub use verifier::{IdentityProviderConfig, TokenVerifier};
