//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a server.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default application port.
pub const DEFAULT_PORT: u16 = 80;
/// Default bind address (all interfaces).
pub const DEFAULT_ADDRESS: &str = "0.0.0.0";
/// Default root path for the health probe routes.
pub const DEFAULT_HEALTH_ROOT_PATH: &str = "/healthz";
/// Default graceful shutdown deadline.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 15;
/// Default bind grace window per listener.
pub const DEFAULT_STARTUP_GRACE_MS: u64 = 1_000;

/// Root configuration for a server instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address both listeners bind to.
    pub address: String,

    /// Application port. Zero selects the default (80).
    pub port: u16,

    /// Health probe port. Zero disables the probe routes, the application
    /// port co-locates them, any other port gets a dedicated listener.
    pub probe_port: u16,

    /// Root path of the liveness and readiness routes.
    pub health_root_path: String,

    /// Graceful shutdown deadline in seconds.
    pub shutdown_timeout_secs: u64,

    /// Time allowed for each listener to bind during startup, in milliseconds.
    pub startup_grace_ms: u64,

    /// Install SIGINT/SIGTERM handlers as shutdown triggers.
    pub handle_signals: bool,

    /// Log successful probe hits and probe HTTP traffic.
    pub trace_probe: bool,

    /// CORS policy for the application listener.
    pub cors: CorsConfig,

    /// Per-listener HTTP tuning.
    pub listener: ListenerTuning,

    /// WebSocket upgrade policy.
    pub websocket: WebSocketConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            probe_port: 0,
            health_root_path: DEFAULT_HEALTH_ROOT_PATH.to_string(),
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            startup_grace_ms: DEFAULT_STARTUP_GRACE_MS,
            handle_signals: true,
            trace_probe: false,
            cors: CorsConfig::default(),
            listener: ListenerTuning::default(),
            websocket: WebSocketConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Replace zero or empty values with their defaults.
    ///
    /// Construction never fails, so every missing value is absorbed here.
    pub fn with_defaults(mut self) -> Self {
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        if self.address.trim().is_empty() {
            self.address = DEFAULT_ADDRESS.to_string();
        }
        if self.shutdown_timeout_secs == 0 {
            self.shutdown_timeout_secs = DEFAULT_SHUTDOWN_TIMEOUT_SECS;
        }
        if self.startup_grace_ms == 0 {
            self.startup_grace_ms = DEFAULT_STARTUP_GRACE_MS;
        }
        let root = self.health_root_path.trim().trim_end_matches('/');
        self.health_root_path = if root.is_empty() {
            DEFAULT_HEALTH_ROOT_PATH.to_string()
        } else if root.starts_with('/') {
            root.to_string()
        } else {
            format!("/{}", root)
        };
        self
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }
}

/// CORS options. CORS is enabled when any of the method, header or
/// origin lists is non-empty.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allowed_origins: Vec<String>,
    pub exposed_headers: Vec<String>,

    /// How long (in seconds) preflight results may be cached. Zero omits the header.
    pub max_age_secs: u64,

    pub allow_credentials: bool,
    pub allow_private_network: bool,

    /// Let preflight requests reach the application handler too.
    pub options_passthrough: bool,

    /// Status code for successful preflight answers instead of 200.
    pub options_success_status: Option<u16>,
}

impl CorsConfig {
    pub fn is_enabled(&self) -> bool {
        !self.allowed_methods.is_empty()
            || !self.allowed_headers.is_empty()
            || !self.allowed_origins.is_empty()
    }
}

/// HTTP tuning applied to every listener. Zero durations mean "no timeout".
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerTuning {
    pub read_timeout_secs: u64,
    pub read_header_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub idle_timeout_secs: u64,

    /// Upper bound of the HTTP/1 read buffer holding the request head. Zero keeps the default.
    pub max_header_bytes: usize,

    /// Keep connections open between requests.
    pub keep_alive: bool,

    /// Maximum concurrent connections per listener. Zero means unbounded.
    pub max_connections: usize,
}

impl Default for ListenerTuning {
    fn default() -> Self {
        Self {
            read_timeout_secs: 0,
            read_header_timeout_secs: 0,
            write_timeout_secs: 0,
            idle_timeout_secs: 0,
            max_header_bytes: 0,
            keep_alive: true,
            max_connections: 0,
        }
    }
}

impl ListenerTuning {
    /// Timer applied by the HTTP/1 connection while waiting for a request head.
    ///
    /// Falls back from the header timeout to the idle timeout and then to the
    /// read timeout.
    pub fn header_read_timeout(&self) -> Option<Duration> {
        [
            self.read_header_timeout_secs,
            self.idle_timeout_secs,
            self.read_timeout_secs,
        ]
        .into_iter()
        .find(|secs| *secs > 0)
        .map(Duration::from_secs)
    }

    /// Deadline for producing a response once the request head is read.
    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_secs > 0).then(|| Duration::from_secs(self.write_timeout_secs))
    }

    pub fn max_connections(&self) -> Option<usize> {
        (self.max_connections > 0).then_some(self.max_connections)
    }
}

/// WebSocket upgrade policy.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Origins allowed to upgrade. `*` allows any origin.
    pub allowed_origins: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_zero_values() {
        let config = ServerConfig {
            address: String::new(),
            port: 0,
            shutdown_timeout_secs: 0,
            health_root_path: "health/".into(),
            ..ServerConfig::default()
        }
        .with_defaults();

        assert_eq!(config.address, "0.0.0.0");
        assert_eq!(config.port, 80);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(15));
        assert_eq!(config.health_root_path, "/health");
    }

    #[test]
    fn header_timeout_falls_back() {
        let mut tuning = ListenerTuning::default();
        assert_eq!(tuning.header_read_timeout(), None);

        tuning.read_timeout_secs = 30;
        assert_eq!(tuning.header_read_timeout(), Some(Duration::from_secs(30)));

        tuning.idle_timeout_secs = 60;
        assert_eq!(tuning.header_read_timeout(), Some(Duration::from_secs(60)));

        tuning.read_header_timeout_secs = 5;
        assert_eq!(tuning.header_read_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn cors_enabled_by_any_list() {
        assert!(!CorsConfig::default().is_enabled());

        let cors = CorsConfig {
            allowed_methods: vec!["GET".into()],
            ..CorsConfig::default()
        };
        assert!(cors.is_enabled());

        let exposed_only = CorsConfig {
            exposed_headers: vec!["X-Test".into()],
            ..CorsConfig::default()
        };
        assert!(!exposed_only.is_enabled());
    }
}
