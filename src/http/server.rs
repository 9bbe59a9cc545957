//! Server construction, route registration and startup.
//!
//! # Responsibilities
//! - Resolve the probe mode once, at construction
//! - Collect routes, sub-routers, frontends and WebSocket routes
//! - Assemble the application and probe routers at start
//! - Wire up middleware (tracing, timeout, request ID, CORS)
//! - Sequence listener startup and hand off to the shutdown coordinator
//!
//! # Router Assembly
//! ```text
//! application routes + websocket routes + nested frontends
//!     → method-not-allowed handler → fallback (root frontend or not-found)
//!     → TraceLayer
//!     → health routes (co-located only, traced only with trace_probe)
//!     → TimeoutLayer (write timeout) → request id → CORS (outermost)
//! ```

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocket, Request},
    handler::Handler,
    http::Method,
    response::IntoResponse,
    routing::{any, on, on_service, MethodFilter, MethodRouter},
    Router,
};
use tower::Service;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::{health_router, LifecycleState, Phase, Readiness};
use crate::http::frontend::Frontend;
use crate::http::middleware::CorsPolicy;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::response::{default_method_not_allowed, default_not_found, dispatch};
use crate::http::websocket::{websocket_route, OriginPolicy, WebSocketContext};
use crate::lifecycle::shutdown::Coordinator;
use crate::lifecycle::startup::start_listeners;
use crate::lifecycle::{ShutdownHandle, StopHandle};
use crate::net::ListenerKind;

/// Where the health probe routes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    /// No probe routes at all.
    Disabled,
    /// Probe routes nested into the application router.
    CoLocated,
    /// Probe routes on their own listener.
    Separate { port: u16 },
}

impl ProbeMode {
    fn resolve(config: &ServerConfig) -> Self {
        match config.probe_port {
            0 => ProbeMode::Disabled,
            port if port == config.port => ProbeMode::CoLocated,
            port => ProbeMode::Separate { port },
        }
    }
}

/// What a registered route is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Handler,
    Service,
    SubRouter,
    Frontend,
    WebSocket,
    Health,
}

/// One entry of the route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// `None` matches every method.
    pub method: Option<Method>,
    pub path: String,
    pub kind: RouteKind,
    pub listener: ListenerKind,
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method {
            Some(method) => write!(f, "{} {}", method, self.path),
            None => write!(f, "* {}", self.path),
        }
    }
}

/// An HTTP server with an optional dedicated health probe listener.
///
/// Routes are registered on the instance, then [`Server::start`] binds the
/// listeners and returns the shutdown completion and stop handles. An
/// instance starts at most once.
pub struct Server {
    config: ServerConfig,
    lifecycle: Arc<LifecycleState>,
    probe_mode: ProbeMode,
    router: Router,
    routes: Vec<RouteEntry>,
    frontends: Vec<Frontend>,
    not_found: MethodRouter,
    method_not_allowed: MethodRouter,
    origin_policy: Arc<OriginPolicy>,
    probe_routes_mounted: bool,
    started: bool,
    app_addr: Option<SocketAddr>,
    probe_addr: Option<SocketAddr>,
}

impl Server {
    /// Create a server. Never binds and never fails; missing values take defaults.
    pub fn new(config: ServerConfig) -> Self {
        let config = config.with_defaults();
        let probe_mode = ProbeMode::resolve(&config);
        let origin_policy = Arc::new(OriginPolicy::from_config(&config.websocket));

        tracing::debug!(
            address = %config.address,
            port = config.port,
            probe_mode = ?probe_mode,
            health_root_path = %config.health_root_path,
            shutdown_timeout = ?config.shutdown_timeout(),
            "Server created"
        );

        Self {
            config,
            lifecycle: Arc::new(LifecycleState::new()),
            probe_mode,
            router: Router::new(),
            routes: Vec::new(),
            frontends: Vec::new(),
            not_found: default_not_found(),
            method_not_allowed: default_method_not_allowed(),
            origin_policy,
            probe_routes_mounted: false,
            started: false,
            app_addr: None,
            probe_addr: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Lock-free readiness check, safe from any task.
    pub fn is_ready(&self) -> bool {
        self.lifecycle.is_ready()
    }

    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    pub fn probe_mode(&self) -> ProbeMode {
        self.probe_mode
    }

    /// True once the health routes have been attached to a router.
    pub fn probe_routes_mounted(&self) -> bool {
        self.probe_routes_mounted
    }

    /// Bound application address, once started.
    pub fn app_addr(&self) -> Option<SocketAddr> {
        self.app_addr
    }

    /// Bound probe address, once started with a separate probe listener.
    pub fn probe_addr(&self) -> Option<SocketAddr> {
        self.probe_addr
    }

    /// Walk the route table.
    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    /// Register `handler` for `method` on `path`.
    pub fn add_route<H, T>(&mut self, method: Method, path: &str, handler: H) -> Result<(), ServerError>
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        if self.ignore_after_start(path) {
            return Ok(());
        }
        let filter = method_filter(&method)?;
        self.check_route(Some(&method), path)?;

        self.router = std::mem::take(&mut self.router).route(path, on(filter, handler));
        self.push_route(Some(method), path, RouteKind::Handler);
        Ok(())
    }

    /// Register a tower service for `method` on `path`.
    pub fn add_route_service<S>(&mut self, method: Method, path: &str, service: S) -> Result<(), ServerError>
    where
        S: Service<Request, Error = std::convert::Infallible> + Clone + Send + Sync + 'static,
        S::Response: IntoResponse + 'static,
        S::Future: Send + 'static,
    {
        if self.ignore_after_start(path) {
            return Ok(());
        }
        let filter = method_filter(&method)?;
        self.check_route(Some(&method), path)?;

        self.router = std::mem::take(&mut self.router).route(path, on_service(filter, service));
        self.push_route(Some(method), path, RouteKind::Service);
        Ok(())
    }

    /// Mount `router` under `prefix`. A prefix of `/` merges it into the root.
    ///
    /// A merged router must stay clear of a co-located health root; its
    /// routes are not visible until the router is assembled.
    pub fn add_sub_router(&mut self, prefix: &str, router: Router) -> Result<(), ServerError> {
        if self.ignore_after_start(prefix) {
            return Ok(());
        }
        if !prefix.starts_with('/') {
            return Err(ServerError::Config(format!(
                "sub-router prefix {:?} must start with '/'",
                prefix
            )));
        }

        let prefix = match prefix.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        self.check_health_root(prefix)?;
        if prefix != "/" && self.routes.iter().any(|route| route.path == prefix) {
            return Err(ServerError::Config(format!("prefix {} is already in use", prefix)));
        }

        let current = std::mem::take(&mut self.router);
        self.router = if prefix == "/" {
            current.merge(router)
        } else {
            current.nest(prefix, router)
        };
        self.push_route(None, prefix, RouteKind::SubRouter);
        Ok(())
    }

    /// Serve the directory `root/sub_path` under `mount`.
    ///
    /// Directories answer only through their `index.html`. Mounting at `/`
    /// makes the frontend the application fallback.
    pub fn add_frontend(
        &mut self,
        mount: &str,
        root: impl AsRef<Path>,
        sub_path: &str,
    ) -> Result<(), ServerError> {
        if self.ignore_after_start(mount) {
            return Ok(());
        }
        let frontend = Frontend::new(mount, root.as_ref(), sub_path)?;
        if !frontend.is_root() {
            self.check_health_root(frontend.mount())?;
        }
        if self
            .frontends
            .iter()
            .any(|existing| existing.mount() == frontend.mount())
            || (!frontend.is_root() && self.routes.iter().any(|r| r.path == frontend.mount()))
        {
            return Err(ServerError::Config(format!(
                "frontend mount {} is already in use",
                frontend.mount()
            )));
        }

        tracing::debug!(mount = %frontend.mount(), dir = %frontend.dir().display(), "Frontend added");
        // A nested frontend answers every method; the root one is only the fallback.
        let method = frontend.is_root().then_some(Method::GET);
        self.push_route(method, frontend.mount(), RouteKind::Frontend);
        self.frontends.push(frontend);
        Ok(())
    }

    /// Register a WebSocket endpoint on `GET path`.
    ///
    /// The `Origin` header is checked against the configured allow-list
    /// before the upgrade.
    pub fn add_websocket_route<F, Fut>(&mut self, path: &str, handler: F) -> Result<(), ServerError>
    where
        F: Fn(WebSocket, WebSocketContext) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.ignore_after_start(path) {
            return Ok(());
        }
        self.check_route(Some(&Method::GET), path)?;

        let route = websocket_route(self.origin_policy.clone(), handler);
        self.router = std::mem::take(&mut self.router).route(path, route);
        self.push_route(Some(Method::GET), path, RouteKind::WebSocket);
        Ok(())
    }

    /// Replace the handler answering unmatched routes on the application listener.
    pub fn set_not_found_handler<H, T>(&mut self, handler: H)
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        if !self.ignore_after_start("not-found handler") {
            self.not_found = any(handler);
        }
    }

    /// Replace the handler answering known routes hit with an unregistered method.
    pub fn set_method_not_allowed_handler<H, T>(&mut self, handler: H)
    where
        H: Handler<T, ()>,
        T: 'static,
    {
        if !self.ignore_after_start("method-not-allowed handler") {
            self.method_not_allowed = any(handler);
        }
    }

    /// Bind the listeners and start serving.
    ///
    /// The probe listener (if separate) is bound before the application
    /// listener; each bind must complete within the startup grace window.
    /// On success the server is ready and the returned handles control and
    /// observe its shutdown. On failure the server stays not ready and
    /// nothing is left listening.
    pub async fn start(&mut self) -> Result<(ShutdownHandle, StopHandle), ServerError> {
        if self.started {
            return Err(ServerError::AlreadyStarted);
        }
        self.started = true;

        let (app, probe) = self.assemble();
        self.log_routes();

        let listeners = start_listeners(&self.config, probe, app).await?;
        self.app_addr = Some(listeners.app.local_addr());
        self.probe_addr = listeners.probe.as_ref().map(|probe| probe.local_addr());

        self.lifecycle.set_readiness(Readiness::Ready);
        self.lifecycle.set_phase(Phase::Serving);
        tracing::info!(
            address = ?self.app_addr,
            probe_address = ?self.probe_addr,
            "Server ready"
        );

        let coordinator = Coordinator {
            lifecycle: self.lifecycle.clone(),
            listeners,
            timeout: self.config.shutdown_timeout(),
            handle_signals: self.config.handle_signals,
        };
        Ok(coordinator.spawn())
    }

    /// Build the application router and, for a separate probe listener, the probe router.
    fn assemble(&mut self) -> (Router, Option<Router>) {
        let mut app = std::mem::take(&mut self.router);
        let mut root_frontend = None;

        for frontend in std::mem::take(&mut self.frontends) {
            if frontend.is_root() {
                root_frontend = Some(frontend);
            } else {
                let mount = frontend.mount().to_string();
                app = app.nest_service(&mount, frontend.into_service(self.not_found.clone()));
            }
        }

        let method_not_allowed = self.method_not_allowed.clone();
        app = app.method_not_allowed_fallback(move |request: Request| {
            dispatch(method_not_allowed.clone(), request)
        });
        app = match root_frontend {
            Some(frontend) => app.fallback_service(frontend.into_service(self.not_found.clone())),
            None => app.fallback_service(self.not_found.clone()),
        };
        app = app.layer(TraceLayer::new_for_http());

        let root = self.config.health_root_path.clone();
        let trace_probe = self.config.trace_probe;
        let probe = match self.probe_mode {
            ProbeMode::Disabled => None,
            ProbeMode::CoLocated => {
                app = app.nest(&root, health_router(self.lifecycle.clone(), trace_probe));
                self.mount_health(&root, ListenerKind::Application);
                None
            }
            ProbeMode::Separate { .. } => {
                let probe = Router::new()
                    .nest(&root, health_router(self.lifecycle.clone(), trace_probe))
                    .method_not_allowed_fallback(|request: Request| {
                        dispatch(default_method_not_allowed(), request)
                    })
                    .fallback_service(default_not_found());
                self.mount_health(&root, ListenerKind::Probe);
                Some(probe)
            }
        };

        if let Some(timeout) = self.config.listener.write_timeout() {
            #[allow(deprecated)]
            let timeout_layer = TimeoutLayer::new(timeout);
            app = app.layer(timeout_layer);
        }
        app = app
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer());
        if let Some(cors) = CorsPolicy::from_config(&self.config.cors) {
            app = cors.apply(app);
        }

        (app, probe)
    }

    fn mount_health(&mut self, root: &str, listener: ListenerKind) {
        for probe in ["liveness", "readiness"] {
            self.routes.push(RouteEntry {
                method: Some(Method::GET),
                path: format!("{}/{}", root, probe),
                kind: RouteKind::Health,
                listener,
            });
        }
        self.probe_routes_mounted = true;
    }

    fn log_routes(&self) {
        tracing::info!(count = self.routes.len(), "Serving routes");
        for route in &self.routes {
            tracing::info!(
                listener = %route.listener,
                route = %route,
                kind = ?route.kind,
                "Route"
            );
        }
    }

    fn ignore_after_start(&self, what: &str) -> bool {
        if self.started {
            tracing::warn!(registration = what, "Server already started, registration ignored");
        }
        self.started
    }

    fn push_route(&mut self, method: Option<Method>, path: &str, kind: RouteKind) {
        self.routes.push(RouteEntry {
            method,
            path: path.to_string(),
            kind,
            listener: ListenerKind::Application,
        });
    }

    /// Reject paths the router would refuse, and method/path pairs already taken.
    ///
    /// Paths are compared by shape, so `/users/{id}` and `/users/{name}`
    /// collide whatever their methods.
    fn check_route(&self, method: Option<&Method>, path: &str) -> Result<(), ServerError> {
        if !path.starts_with('/') {
            return Err(ServerError::Config(format!("route path {:?} must start with '/'", path)));
        }
        if let Some(segment) = path
            .split('/')
            .find(|segment| segment.starts_with(':') || segment.starts_with('*'))
        {
            return Err(ServerError::Config(format!(
                "route path {:?}: segment {:?} must use {{name}} or {{*name}} captures",
                path, segment
            )));
        }
        self.check_health_root(path)?;

        let shape = route_shape(path);
        for route in &self.routes {
            if (route.kind == RouteKind::Frontend && route.path == "/") || route_shape(&route.path) != shape {
                continue;
            }
            if route.path != path {
                return Err(ServerError::Config(format!(
                    "route {} conflicts with {}: captures at the same position must share a name",
                    path, route.path
                )));
            }
            let same_method = match (&route.method, method) {
                (Some(existing), Some(requested)) => existing == requested,
                _ => true,
            };
            if same_method {
                let method = method.map(ToString::to_string).unwrap_or_else(|| "*".into());
                return Err(ServerError::Config(format!("route {} {} is already registered", method, path)));
            }
        }
        Ok(())
    }

    /// Co-located probes own every path at or under the health root.
    fn check_health_root(&self, path: &str) -> Result<(), ServerError> {
        if self.probe_mode != ProbeMode::CoLocated {
            return Ok(());
        }
        let root = self.config.health_root_path.as_str();
        let reserved = path
            .strip_prefix(root)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
        if reserved {
            return Err(ServerError::Config(format!(
                "path {} is reserved for the health probes under {}",
                path, root
            )));
        }
        Ok(())
    }
}

/// Path with capture names erased: `/users/{id}` becomes `/users/{}`.
fn route_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) if name.starts_with('*') => "{*}",
            Some(_) => "{}",
            None => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn method_filter(method: &Method) -> Result<MethodFilter, ServerError> {
    MethodFilter::try_from(method.clone())
        .map_err(|_| ServerError::Config(format!("unsupported route method {}", method)))
}
