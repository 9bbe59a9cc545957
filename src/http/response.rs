//! Default error responses.
//!
//! # Responsibilities
//! - Answer unknown routes with `404 Not Found`
//! - Answer known routes hit with the wrong method with `405 Method Not Allowed`
//! - Log both at warn with method, URI and request id
//!
//! # Design Decisions
//! - Handlers are stored as `MethodRouter` so callers can swap in any axum handler
//! - Bodies are short plain text; callers wanting JSON install their own handler

use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{any, MethodRouter},
};
use tower::ServiceExt;

use crate::http::request::RequestIdExt;

pub const NOT_FOUND_BODY: &str = "404 Not Found";
pub const METHOD_NOT_ALLOWED_BODY: &str = "405 Method Not Allowed";

pub fn default_not_found() -> MethodRouter {
    any(not_found)
}

pub fn default_method_not_allowed() -> MethodRouter {
    any(method_not_allowed)
}

async fn not_found(request: Request) -> impl IntoResponse {
    tracing::warn!(
        method = %request.method(),
        uri = %request.uri(),
        request_id = request.request_id().unwrap_or("-"),
        "Route not found"
    );
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY)
}

async fn method_not_allowed(request: Request) -> impl IntoResponse {
    tracing::warn!(
        method = %request.method(),
        uri = %request.uri(),
        request_id = request.request_id().unwrap_or("-"),
        "Method not allowed"
    );
    (StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED_BODY)
}

/// Run `request` through an error handler.
pub async fn dispatch(handler: MethodRouter, request: Request) -> Response {
    handler.oneshot(request).await.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};

    async fn body_of(handler: MethodRouter) -> (StatusCode, String) {
        let request = axum::http::Request::builder()
            .uri("/x")
            .body(Body::empty())
            .unwrap();
        let response = dispatch(handler, request).await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn default_bodies() {
        assert_eq!(
            body_of(default_not_found()).await,
            (StatusCode::NOT_FOUND, "404 Not Found".to_string())
        );
        assert_eq!(
            body_of(default_method_not_allowed()).await,
            (StatusCode::METHOD_NOT_ALLOWED, "405 Method Not Allowed".to_string())
        );
    }
}
