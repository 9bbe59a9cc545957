//! CORS wiring.
//!
//! Translates [`CorsConfig`] into a tower-http `CorsLayer`. When preflight
//! passthrough or a custom preflight status is configured, a small
//! middleware drives the layer against an empty service to compute the
//! headers and applies them itself.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{self, header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    Router,
};
use tower::{Layer, ServiceExt};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer, ExposeHeaders};

use crate::config::CorsConfig;

const DEFAULT_METHODS: [Method; 3] = [Method::GET, Method::POST, Method::HEAD];
const X_REQUESTED_WITH: HeaderName = HeaderName::from_static("x-requested-with");

/// CORS behavior for the application listener.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    layer: CorsLayer,
    passthrough: bool,
    success_status: Option<StatusCode>,
}

impl CorsPolicy {
    /// Build a policy, or `None` when CORS is not enabled.
    pub fn from_config(config: &CorsConfig) -> Option<Self> {
        if !config.is_enabled() {
            return None;
        }
        tracing::info!("CORS is enabled on the application listener");

        let credentials = config.allow_credentials;
        let mut layer = CorsLayer::new()
            .allow_origin(origins(&config.allowed_origins, credentials))
            .allow_methods(methods(&config.allowed_methods, credentials))
            .allow_headers(allowed_headers(&config.allowed_headers, credentials))
            .allow_credentials(credentials)
            .allow_private_network(config.allow_private_network);

        if let Some(exposed) = exposed_headers(&config.exposed_headers, credentials) {
            layer = layer.expose_headers(exposed);
        }
        if config.max_age_secs > 0 {
            tracing::debug!(max_age_secs = config.max_age_secs, "CORS max age");
            layer = layer.max_age(Duration::from_secs(config.max_age_secs));
        }

        let success_status = config
            .options_success_status
            .and_then(|code| StatusCode::from_u16(code).ok());

        tracing::debug!(
            allow_credentials = credentials,
            allow_private_network = config.allow_private_network,
            options_passthrough = config.options_passthrough,
            options_success_status = ?success_status,
            "CORS options"
        );

        Some(Self {
            layer,
            passthrough: config.options_passthrough,
            success_status,
        })
    }

    pub fn layer(&self) -> &CorsLayer {
        &self.layer
    }

    /// Wrap `router` with this policy as its outermost layer.
    pub fn apply(self, router: Router) -> Router {
        if !self.passthrough && self.success_status.is_none() {
            return router.layer(self.layer);
        }
        router.layer(middleware::from_fn_with_state(Arc::new(self), cors_middleware))
    }
}

fn is_wildcard(values: &[String]) -> bool {
    values.iter().any(|value| value.trim() == "*")
}

fn origins(values: &[String], credentials: bool) -> AllowOrigin {
    if values.is_empty() || is_wildcard(values) {
        tracing::debug!(credentials, "CORS: any origin allowed");
        // A literal `*` cannot be combined with credentials.
        return if credentials {
            AllowOrigin::mirror_request()
        } else {
            AllowOrigin::any()
        };
    }
    tracing::debug!(origins = %values.join(", "), "CORS: allowed origins");
    AllowOrigin::list(values.iter().filter_map(|v| HeaderValue::from_str(v.trim()).ok()))
}

fn methods(values: &[String], credentials: bool) -> AllowMethods {
    if is_wildcard(values) {
        return if credentials {
            AllowMethods::mirror_request()
        } else {
            AllowMethods::any()
        };
    }
    if values.is_empty() {
        return AllowMethods::list(DEFAULT_METHODS);
    }
    tracing::debug!(methods = %values.join(", "), "CORS: allowed methods");
    AllowMethods::list(
        values
            .iter()
            .filter_map(|v| Method::from_bytes(v.trim().to_ascii_uppercase().as_bytes()).ok()),
    )
}

fn allowed_headers(values: &[String], credentials: bool) -> AllowHeaders {
    if is_wildcard(values) {
        return if credentials {
            AllowHeaders::mirror_request()
        } else {
            AllowHeaders::any()
        };
    }
    if values.is_empty() {
        return AllowHeaders::list([
            header::ORIGIN,
            header::ACCEPT,
            header::CONTENT_TYPE,
            X_REQUESTED_WITH,
        ]);
    }
    tracing::debug!(headers = %values.join(", "), "CORS: allowed headers");
    AllowHeaders::list(header_names(values))
}

fn exposed_headers(values: &[String], credentials: bool) -> Option<ExposeHeaders> {
    if values.is_empty() {
        return None;
    }
    if is_wildcard(values) {
        if credentials {
            tracing::warn!("CORS: wildcard exposed headers cannot be used with credentials, ignoring");
            return None;
        }
        return Some(ExposeHeaders::any());
    }
    tracing::debug!(headers = %values.join(", "), "CORS: exposed headers");
    Some(ExposeHeaders::list(header_names(values)))
}

fn header_names(values: &[String]) -> Vec<HeaderName> {
    values
        .iter()
        .filter_map(|v| HeaderName::from_bytes(v.trim().as_bytes()).ok())
        .collect()
}

async fn cors_middleware(State(policy): State<Arc<CorsPolicy>>, request: Request, next: Next) -> Response {
    let is_preflight = request.method() == Method::OPTIONS;
    let head = request_head(&request);
    let cors_headers = cors_response(policy.layer.clone(), head).await;

    if is_preflight && !policy.passthrough {
        let mut response = cors_headers;
        if let Some(status) = policy.success_status {
            tracing::debug!(status = %status, "CORS: preflight answered");
            *response.status_mut() = status;
        }
        return response;
    }

    if is_preflight {
        tracing::debug!(uri = %request.uri(), "CORS: preflight passed through to the application");
    }
    let mut response = next.run(request).await;
    merge_headers(response.headers_mut(), cors_headers.headers());
    response
}

/// Owned copy of the request head; the body stays with the request.
fn request_head(request: &Request) -> Request {
    let mut head = http::Request::builder()
        .method(request.method().clone())
        .uri(request.uri().clone())
        .version(request.version())
        .body(Body::empty())
        .unwrap_or_default();
    *head.headers_mut() = request.headers().clone();
    head
}

/// Run a request head through the CORS layer around an empty service.
async fn cors_response(layer: CorsLayer, head: Request) -> Response {
    let empty = tower::service_fn(|_request: Request| async {
        Ok::<_, Infallible>(Response::new(Body::empty()))
    });
    match layer.layer(empty).oneshot(head).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

fn merge_headers(target: &mut HeaderMap, cors: &HeaderMap) {
    for name in cors.keys() {
        if name != header::VARY {
            target.remove(name);
        }
    }
    for (name, value) in cors {
        target.append(name.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, options};

    fn app(config: &CorsConfig) -> Router {
        let router = Router::new()
            .route("/api", get(|| async { "data" }))
            .route("/passthrough", options(|| async { (StatusCode::ACCEPTED, "app") }));
        CorsPolicy::from_config(config).unwrap().apply(router)
    }

    fn preflight(uri: &str, origin: &str) -> Request {
        http::Request::builder()
            .method(Method::OPTIONS)
            .uri(uri)
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap()
    }

    fn config() -> CorsConfig {
        CorsConfig {
            allowed_origins: vec!["http://good.example".into()],
            ..CorsConfig::default()
        }
    }

    #[test]
    fn disabled_without_lists() {
        assert!(CorsPolicy::from_config(&CorsConfig::default()).is_none());
    }

    #[tokio::test]
    async fn preflight_lists_allowed_origin() {
        let response = app(&config())
            .oneshot(preflight("/api", "http://good.example"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://good.example"
        );
        let methods = response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS]
            .to_str()
            .unwrap()
            .to_string();
        assert!(methods.contains("GET") && methods.contains("HEAD"), "{methods}");
    }

    #[tokio::test]
    async fn unknown_origin_gets_no_allow_header() {
        let response = app(&config())
            .oneshot(preflight("/api", "http://evil.example"))
            .await
            .unwrap();
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn credentials_mirror_wildcard_origin() {
        let config = CorsConfig {
            allowed_origins: vec!["*".into()],
            allowed_headers: vec!["*".into()],
            exposed_headers: vec!["*".into()],
            allow_credentials: true,
            ..CorsConfig::default()
        };
        let request = http::Request::builder()
            .uri("/api")
            .header(header::ORIGIN, "http://any.example")
            .body(Body::empty())
            .unwrap();
        let response = app(&config).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://any.example");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn success_status_overrides_preflight() {
        let config = CorsConfig {
            options_success_status: Some(204),
            ..config()
        };
        let response = app(&config)
            .oneshot(preflight("/api", "http://good.example"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://good.example"
        );
    }

    #[tokio::test]
    async fn passthrough_reaches_application() {
        let config = CorsConfig {
            options_passthrough: true,
            ..config()
        };
        let response = app(&config)
            .oneshot(preflight("/passthrough", "http://good.example"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://good.example"
        );
        let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], b"app");
    }

    #[tokio::test]
    async fn simple_request_through_middleware_keeps_headers() {
        let config = CorsConfig {
            options_passthrough: true,
            exposed_headers: vec!["X-Total".into()],
            ..config()
        };
        let request = http::Request::builder()
            .uri("/api")
            .header(header::ORIGIN, "http://good.example")
            .body(Body::empty())
            .unwrap();
        let response = app(&config).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_EXPOSE_HEADERS],
            "x-total"
        );
    }

    #[tokio::test]
    async fn status_override_keeps_simple_requests_intact() {
        let config = CorsConfig {
            options_success_status: Some(204),
            ..config()
        };
        let request = http::Request::builder()
            .method(Method::GET)
            .uri("/api")
            .header(header::ORIGIN, "http://good.example")
            .body(Body::empty())
            .unwrap();
        let response = app(&config).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://good.example"
        );
        let body = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
        assert_eq!(&body[..], b"data");
    }

    #[test]
    fn middleware_router_is_a_send_service() {
        fn assert_service<S>(_: &S)
        where
            S: tower::Service<Request> + Clone + Send + Sync + 'static,
            S::Future: Send,
        {
        }
        let config = CorsConfig {
            options_passthrough: true,
            options_success_status: Some(204),
            ..config()
        };
        // Router::layer only accepts the middleware when its future is Send.
        assert_service(&app(&config));
    }
}
