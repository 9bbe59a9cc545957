//! WebSocket upgrade handling.
//!
//! # Responsibilities
//! - Check the `Origin` header before any upgrade work
//! - Complete the upgrade handshake through axum's `WebSocketUpgrade`
//! - Hand the socket and the request context to the application handler
//!
//! # Origin Rules
//! ```text
//! no Origin header                         → allow
//! Origin not a URL                         → reject
//! empty allow-list, host differs           → reject (cross origin)
//! allow-list contains "*" or the origin    → allow
//! otherwise                                → reject (not allowed)
//! ```
//!
//! # Design Decisions
//! - Rejections answer 403 with a small JSON body
//! - Framing, ping/pong and close handling stay with the upgrade library

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocket, ConnectInfo, FromRequestParts, Request, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, MethodRouter},
    Json,
};
use url::Url;

use crate::config::WebSocketConfig;

/// Why an upgrade request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OriginRejection {
    #[error("origin {0:?} is not a valid URL")]
    Unparsable(String),

    #[error("origin {origin} differs from host {host}")]
    CrossOrigin { origin: String, host: String },

    #[error("origin {0} is not allowed")]
    NotAllowed(String),
}

impl IntoResponse for OriginRejection {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (StatusCode::FORBIDDEN, body).into_response()
    }
}

/// Allow-list of origins permitted to open WebSockets.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = allowed
            .into_iter()
            .map(|origin| origin.as_ref().trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        Self { allowed }
    }

    pub fn from_config(config: &WebSocketConfig) -> Self {
        Self::new(&config.allowed_origins)
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    /// Decide whether a request may upgrade.
    pub fn check(&self, headers: &HeaderMap, uri: &Uri) -> Result<(), OriginRejection> {
        let Some(origin) = headers.get(header::ORIGIN) else {
            tracing::debug!("No Origin header, accepting");
            return Ok(());
        };
        let origin = origin
            .to_str()
            .map_err(|_| OriginRejection::Unparsable(String::from_utf8_lossy(origin.as_bytes()).into_owned()))?;
        let origin_url = Url::parse(origin).map_err(|_| OriginRejection::Unparsable(origin.to_string()))?;

        if self.allowed.is_empty() {
            let host = request_host(headers, uri).unwrap_or_default();
            if !authority(&origin_url).eq_ignore_ascii_case(&host) {
                return Err(OriginRejection::CrossOrigin {
                    origin: origin.to_string(),
                    host,
                });
            }
        }

        if self.allowed.iter().any(|allowed| allowed == "*" || allowed == origin) {
            tracing::debug!(origin, "Origin allowed");
            Ok(())
        } else {
            Err(OriginRejection::NotAllowed(origin.to_string()))
        }
    }
}

/// `host[:port]` of an origin, with the port omitted when it is the scheme default.
fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn request_host(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    headers
        .get(header::HOST)
        .and_then(|host| host.to_str().ok())
        .map(str::to_string)
        .or_else(|| uri.authority().map(|authority| authority.to_string()))
}

/// Request details handed to a WebSocket handler alongside the socket.
#[derive(Debug, Clone)]
pub struct WebSocketContext {
    pub uri: Uri,
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
}

/// Build a `GET` route that checks the origin, upgrades and runs `handler`.
pub fn websocket_route<F, Fut>(policy: Arc<OriginPolicy>, handler: F) -> MethodRouter
where
    F: Fn(WebSocket, WebSocketContext) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    get(move |request: Request| {
        let policy = policy.clone();
        let handler = handler.clone();
        async move { upgrade(&policy, handler, request).await }
    })
}

async fn upgrade<F, Fut>(policy: &OriginPolicy, handler: F, request: Request) -> Response
where
    F: Fn(WebSocket, WebSocketContext) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (mut parts, _body) = request.into_parts();

    if let Err(rejection) = policy.check(&parts.headers, &parts.uri) {
        tracing::warn!(uri = %parts.uri, reason = %rejection, "WebSocket upgrade rejected");
        return rejection.into_response();
    }

    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            tracing::debug!(uri = %parts.uri, reason = %rejection, "Not a WebSocket upgrade");
            return rejection.into_response();
        }
    };

    let context = WebSocketContext {
        remote_addr: parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr),
        uri: parts.uri,
        headers: parts.headers,
    };
    tracing::debug!(uri = %context.uri, remote_addr = ?context.remote_addr, "WebSocket upgraded");

    upgrade
        .on_upgrade(move |socket| handler(socket, context))
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(origin: Option<&str>, host: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_str(host).unwrap());
        if let Some(origin) = origin {
            headers.insert(header::ORIGIN, HeaderValue::from_str(origin).unwrap());
        }
        headers
    }

    fn uri() -> Uri {
        Uri::from_static("/ws")
    }

    #[test]
    fn missing_origin_is_allowed() {
        let policy = OriginPolicy::new(["http://good.example"]);
        assert_eq!(policy.check(&headers(None, "server:80"), &uri()), Ok(()));
    }

    #[test]
    fn allow_list_is_exact() {
        let policy = OriginPolicy::new(["http://good.example"]);
        assert_eq!(
            policy.check(&headers(Some("http://good.example"), "server"), &uri()),
            Ok(())
        );
        assert_eq!(
            policy.check(&headers(Some("http://evil.example"), "server"), &uri()),
            Err(OriginRejection::NotAllowed("http://evil.example".into()))
        );
    }

    #[test]
    fn wildcard_allows_any_valid_origin() {
        let policy = OriginPolicy::new([" * ", ""]);
        assert_eq!(policy.allowed(), &["*".to_string()]);
        assert!(policy
            .check(&headers(Some("https://anything.example"), "server"), &uri())
            .is_ok());
        assert!(matches!(
            policy.check(&headers(Some("not a url"), "server"), &uri()),
            Err(OriginRejection::Unparsable(_))
        ));
    }

    #[test]
    fn empty_list_rejects_every_origin() {
        let policy = OriginPolicy::default();
        assert_eq!(
            policy.check(&headers(Some("http://localhost:8080"), "localhost:8080"), &uri()),
            Err(OriginRejection::NotAllowed("http://localhost:8080".into()))
        );
        assert!(matches!(
            policy.check(&headers(Some("https://Example.com"), "example.com"), &uri()),
            Err(OriginRejection::NotAllowed(_))
        ));
        assert!(matches!(
            policy.check(&headers(Some("http://evil.example"), "localhost:8080"), &uri()),
            Err(OriginRejection::CrossOrigin { .. })
        ));
        assert_eq!(policy.check(&headers(None, "localhost:8080"), &uri()), Ok(()));
    }

    #[tokio::test]
    async fn rejection_is_forbidden_json() {
        let response = OriginRejection::NotAllowed("http://evil.example".into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "origin http://evil.example is not allowed");
    }
}
