//! Static frontend serving.
//!
//! # Responsibilities
//! - Validate frontend mounts before anything is registered
//! - Serve files from `root/sub_path` under a mount path
//! - Never list directories: a directory is served only through its `index.html`
//! - Answer missing files through the server's not-found handler
//!
//! # Design Decisions
//! - `ServeDir` does the file work; this module only guards and re-routes
//! - Directory redirects are rewritten against the original URI so they
//!   stay correct under nested mounts

use std::path::{Component, Path, PathBuf};

use axum::{
    body::Body,
    extract::{OriginalUri, Request},
    http::{self, header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, MethodRouter},
};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::error::ServerError;
use crate::http::response::dispatch;

/// A validated frontend mount.
#[derive(Debug, Clone)]
pub struct Frontend {
    mount: String,
    dir: PathBuf,
}

impl Frontend {
    /// Validate a frontend serving `root/sub_path` under `mount`.
    ///
    /// `sub_path` must name a proper subdirectory of `root`: empty, `.`,
    /// `/`, absolute paths and `..` segments are rejected, as is a
    /// directory that does not exist.
    pub fn new(mount: &str, root: &Path, sub_path: &str) -> Result<Self, ServerError> {
        if !mount.starts_with('/') {
            return Err(ServerError::Config(format!(
                "frontend mount path {:?} must start with '/'",
                mount
            )));
        }

        let sub = Path::new(sub_path);
        if matches!(sub_path.trim(), "" | "." | "/") {
            return Err(ServerError::Config(format!(
                "frontend sub path {:?} would serve {} at its own root",
                sub_path,
                root.display()
            )));
        }
        if sub.is_absolute() || sub_path.starts_with('/') {
            return Err(ServerError::Config(format!(
                "frontend sub path {:?} must be relative",
                sub_path
            )));
        }
        if sub.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(ServerError::Config(format!(
                "frontend sub path {:?} must not contain '..'",
                sub_path
            )));
        }

        let dir = root.join(sub);
        if !dir.is_dir() {
            return Err(ServerError::Config(format!(
                "frontend directory {} does not exist",
                dir.display()
            )));
        }

        let mount = match mount.trim_end_matches('/') {
            "" => "/".to_string(),
            trimmed => trimmed.to_string(),
        };

        Ok(Self { mount, dir })
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// True when mounted at `/`, where it acts as the application fallback.
    pub fn is_root(&self) -> bool {
        self.mount == "/"
    }

    /// Build the guarded file service.
    pub fn into_service(self, not_found: MethodRouter) -> MethodRouter {
        let serve_dir = ServeDir::new(&self.dir).append_index_html_on_directories(true);
        let mount = self.mount;

        any(move |request: Request| {
            let serve_dir = serve_dir.clone();
            let not_found = not_found.clone();
            let mount = mount.clone();
            async move { serve(serve_dir, not_found, &mount, request).await }
        })
    }
}

async fn serve(serve_dir: ServeDir, not_found: MethodRouter, mount: &str, request: Request) -> Response {
    let original = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.clone())
        .unwrap_or_else(|| request.uri().clone());
    let local_path = request.uri().path().to_string();

    // Keep enough of the request to replay it into the not-found handler.
    let mut replay = http::Request::builder()
        .method(request.method().clone())
        .uri(original.clone())
        .version(request.version())
        .body(Body::empty())
        .unwrap_or_default();
    *replay.headers_mut() = request.headers().clone();

    let response = match serve_dir.clone().oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    let status = response.status();
    if status.is_redirection() {
        // A directory requested without its trailing slash.
        if has_index(&serve_dir, &local_path).await {
            let mut response = response.into_response();
            if let Ok(value) = HeaderValue::from_str(&format!("{}/", original.path())) {
                response.headers_mut().insert(header::LOCATION, value);
            }
            return response;
        }
    } else if status != StatusCode::NOT_FOUND {
        return response.into_response();
    }

    tracing::debug!(mount, uri = %original, "Frontend file or directory index missing");
    dispatch(not_found, replay).await
}

async fn has_index(serve_dir: &ServeDir, path: &str) -> bool {
    let probe = http::Request::builder()
        .method(Method::HEAD)
        .uri(format!("{}/", path.trim_end_matches('/')))
        .body(Body::empty());
    let Ok(probe) = probe else {
        return false;
    };
    matches!(
        serve_dir.clone().oneshot(probe).await,
        Ok(response) if response.status().is_success()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::default_not_found;
    use axum::body::to_bytes;
    use axum::Router;
    use std::fs;

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("site/empty")).unwrap();
        fs::create_dir_all(dir.path().join("site/docs")).unwrap();
        fs::write(dir.path().join("site/index.html"), "<h1>home</h1>").unwrap();
        fs::write(dir.path().join("site/app.js"), "console.log(1)").unwrap();
        fs::write(dir.path().join("site/docs/index.html"), "<h1>docs</h1>").unwrap();
        dir
    }

    async fn get(router: &Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = router
            .clone()
            .oneshot(http::Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        (status, location, String::from_utf8_lossy(&body).into_owned())
    }

    #[test]
    fn rejects_bad_mounts() {
        let dir = site();
        let root = dir.path();
        for sub in ["", ".", "/", "/etc", "../site", "site/../site"] {
            let err = Frontend::new("/", root, sub).unwrap_err();
            assert!(matches!(err, ServerError::Config(_)), "{sub:?}");
        }
        assert!(Frontend::new("static", root, "site").is_err());
        assert!(Frontend::new("/", root, "missing").is_err());
        assert!(Frontend::new("/", root, "site").is_ok());
    }

    #[test]
    fn normalizes_mount() {
        let dir = site();
        let frontend = Frontend::new("/static/", dir.path(), "site").unwrap();
        assert_eq!(frontend.mount(), "/static");
        assert!(!frontend.is_root());
        assert!(Frontend::new("/", dir.path(), "site").unwrap().is_root());
    }

    #[tokio::test]
    async fn root_mount_serves_index_and_guards_directories() {
        let dir = site();
        let frontend = Frontend::new("/", dir.path(), "site").unwrap();
        let router = Router::new().fallback_service(frontend.into_service(default_not_found()));

        let (status, _, body) = get(&router, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<h1>home</h1>");

        let (status, _, body) = get(&router, "/app.js").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "console.log(1)");

        let (status, _, body) = get(&router, "/empty/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "404 Not Found");

        let (status, _, body) = get(&router, "/empty").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "404 Not Found");

        let (status, _, body) = get(&router, "/nope.txt").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "404 Not Found");
    }

    #[tokio::test]
    async fn nested_mount_redirects_against_original_path() {
        let dir = site();
        let frontend = Frontend::new("/static", dir.path(), "site").unwrap();
        let router = Router::new().nest_service("/static", frontend.into_service(default_not_found()));

        let (status, _, body) = get(&router, "/static/docs/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<h1>docs</h1>");

        let (status, location, _) = get(&router, "/static/docs").await;
        assert!(status.is_redirection());
        assert_eq!(location.as_deref(), Some("/static/docs/"));

        let (status, _, _) = get(&router, "/static/empty").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
