//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use wess::ServerConfig;

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Loopback config without signal handlers, with a short drain deadline.
pub fn config(port: u16, probe_port: u16) -> ServerConfig {
    ServerConfig {
        address: "127.0.0.1".into(),
        port,
        probe_port,
        handle_signals: false,
        shutdown_timeout_secs: 2,
        ..ServerConfig::default()
    }
}

/// HTTP client that never goes through a proxy and never reuses connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

pub fn url(port: u16, path: &str) -> String {
    format!("http://127.0.0.1:{}{}", port, path)
}

/// Wait for `shutdown` with a ceiling so a hung drain fails the test.
pub async fn finish(shutdown: wess::ShutdownHandle) -> Result<(), wess::ServerError> {
    tokio::time::timeout(Duration::from_secs(10), shutdown)
        .await
        .expect("shutdown did not complete")
}
