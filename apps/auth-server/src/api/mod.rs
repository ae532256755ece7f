// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::Request,
    http::{header, Method},
    middleware::{from_fn, from_fn_with_state, Next},
    routing::{get, post},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{
        middleware::{authenticate, enforce_permissions},
        Role, TokenKind,
    },
    state::AppState,
    users::{User, UserUpdate},
};

pub mod auth;
pub mod health;
pub mod middleware;
pub mod profiles;
pub mod users;

pub fn router(state: AppState) -> Router {
    let list_users = Router::new()
        .route("/users", get(users::list_users))
        .route_layer(from_fn(|request: Request, next: Next| {
            enforce_permissions(users::READ_USERS, request, next)
        }))
        .route_layer(from_fn_with_state(state.clone(), authenticate));

    let v1_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/users/me", get(users::get_current_user))
        .route(
            "/users/{id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route("/customer/profile", get(profiles::customer_profile))
        .route("/provider/profile", get(profiles::provider_profile))
        .merge(list_users);

    let app = Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/ready", get(health::readiness))
        .route("/live", get(health::liveness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()));

    with_common_layers(app)
}

/// Cross-cutting layers, innermost first: panic capture, timing, request
/// ids, tracing and CORS.
fn with_common_layers(app: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]);

    app.layer(CatchPanicLayer::custom(middleware::panic_response))
        .layer(from_fn(middleware::request_timing))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
}

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::root,
        health::health,
        health::readiness,
        health::liveness,
        auth::login,
        users::get_current_user,
        users::list_users,
        users::get_user,
        users::update_user,
        users::delete_user,
        profiles::customer_profile,
        profiles::provider_profile
    ),
    components(
        schemas(
            User,
            UserUpdate,
            Role,
            TokenKind,
            auth::LoginResponse,
            users::UserMeResponse,
            users::UserListResponse,
            profiles::RoleProfileResponse,
            health::ServiceInfo,
            health::HealthResponse,
            health::ReadyResponse,
            health::LiveResponse
        )
    ),
    modifiers(&BearerSecurity),
    tags(
        (name = "Root", description = "Service information"),
        (name = "Health", description = "Health, readiness and liveness checks"),
        (name = "Auth", description = "Token exchange"),
        (name = "Users", description = "Current user and user administration"),
        (name = "Profiles", description = "Role-scoped areas")
    )
)]
pub struct ApiDoc;
