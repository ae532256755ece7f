// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role-scoped profile endpoints.

use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{AuthenticatedUser, CustomerRole, RequireRole, Role, ServiceProviderRole};

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleProfileResponse {
    pub user_id: String,
    /// Role that granted access to this endpoint
    pub area: Role,
    pub roles: Vec<Role>,
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

fn profile(user: AuthenticatedUser, area: Role) -> RoleProfileResponse {
    RoleProfileResponse {
        user_id: user.user_id,
        area,
        roles: user.roles,
        permissions: user.permissions,
        email: user.email,
    }
}

/// Customer area (customers and admins).
#[utoipa::path(
    get,
    path = "/v1/customer/profile",
    tag = "Profiles",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Customer profile", body = RoleProfileResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Customer role required"),
    )
)]
pub async fn customer_profile(
    RequireRole(user, _): RequireRole<CustomerRole>,
) -> Json<RoleProfileResponse> {
    Json(profile(user, Role::Customer))
}

/// Service-provider area (providers and admins).
#[utoipa::path(
    get,
    path = "/v1/provider/profile",
    tag = "Profiles",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Service provider profile", body = RoleProfileResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Service provider role required"),
    )
)]
pub async fn provider_profile(
    RequireRole(user, _): RequireRole<ServiceProviderRole>,
) -> Json<RoleProfileResponse> {
    Json(profile(user, Role::ServiceProvider))
}
