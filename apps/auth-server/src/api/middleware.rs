// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Router-wide HTTP middleware.

use std::any::Any;
use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub const PROCESS_TIME_HEADER: HeaderName = HeaderName::from_static("x-process-time");

/// Log every request and report its duration in `x-process-time` (seconds).
pub async fn request_timing(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let mut response = next.run(request).await;

    let elapsed = started.elapsed().as_secs_f64();
    let status = response.status();
    if status.is_server_error() {
        tracing::warn!(%method, %path, status = status.as_u16(), elapsed_secs = elapsed, "Request failed");
    } else {
        tracing::info!(%method, %path, status = status.as_u16(), elapsed_secs = elapsed, "Request completed");
    }

    if let Ok(value) = HeaderValue::from_str(&format!("{elapsed:.3}")) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }
    response
}

/// Turn a handler panic into a 500 JSON response.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "Unhandled error while serving request");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "Internal server error",
            "message": "An unexpected error occurred",
        })),
    )
        .into_response()
}
