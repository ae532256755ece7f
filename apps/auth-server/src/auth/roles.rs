// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles for authorization.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// User roles for authorization.
///
/// ## Role Hierarchy
///
/// - `Admin` - Full access to all endpoints and user management
/// - `Customer` - Consumer of services, customer-only routes
/// - `ServiceProvider` - Offers services, provider-only routes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full administrative access
    Admin,
    /// Customer (default for new users)
    Customer,
    /// Service provider
    ServiceProvider,
}

impl Role {
    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(&self, required: Role) -> bool {
        match (self, required) {
            // Admin can do anything
            (Role::Admin, _) => true,
            (Role::Customer, Role::Customer) => true,
            (Role::ServiceProvider, Role::ServiceProvider) => true,
            // Customers and providers never stand in for each other
            _ => false,
        }
    }

    /// Parse role from string (case-insensitive).
    /// Used when mapping identity-provider role claims.
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "customer" => Some(Role::Customer),
            "service_provider" | "service-provider" | "provider" => Some(Role::ServiceProvider),
            _ => None,
        }
    }

    /// Wire/database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Customer => "customer",
            Role::ServiceProvider => "service_provider",
        }
    }
}

impl Default for Role {
    /// Default role is Customer (least privilege for authenticated users).
    fn default() -> Self {
        Role::Customer
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
