//! TCP listener with bounded binding, connection limits and graceful drain.
//!
//! # Responsibilities
//! - Bind to the configured address within the startup grace window
//! - Accept incoming TCP connections, optionally capped by a semaphore
//! - Serve each connection with hyper's HTTP/1 + HTTP/2 auto builder
//! - On stop: close the socket, drain gracefully, force-close at the deadline

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ConnectInfo;
use axum::Router;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tower::Service;

use crate::config::ListenerTuning;
use crate::error::ServerError;
use crate::net::connection::ConnectionTracker;
use crate::net::ListenerKind;

/// Pause after a failed accept (e.g. file descriptor exhaustion).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Smallest read buffer hyper accepts for HTTP/1.
const MIN_HTTP1_BUF_SIZE: usize = 8192;

/// A bound, not yet serving, TCP listener.
#[derive(Debug)]
pub struct Listener {
    kind: ListenerKind,
    inner: TcpListener,
    local_addr: SocketAddr,
    /// Limits concurrent connections when configured.
    connection_limit: Option<Arc<Semaphore>>,
}

impl Listener {
    /// Bind `address:port`, giving up after `grace`.
    ///
    /// Address resolution and the bind itself both count against the window.
    pub async fn bind(
        kind: ListenerKind,
        address: &str,
        port: u16,
        grace: Duration,
        max_connections: Option<usize>,
    ) -> Result<Self, ServerError> {
        let display = format!("{}:{}", address, port);
        let startup_error = |source: io::Error| ServerError::Startup {
            listener: kind,
            address: display.clone(),
            source,
        };

        let inner = match tokio::time::timeout(grace, TcpListener::bind((address, port))).await {
            Ok(Ok(listener)) => listener,
            Ok(Err(err)) => return Err(startup_error(err)),
            Err(_) => {
                return Err(startup_error(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("bind did not complete within {:?}", grace),
                )))
            }
        };
        let local_addr = inner.local_addr().map_err(startup_error)?;

        tracing::info!(
            listener = %kind,
            address = %local_addr,
            max_connections = ?max_connections,
            "Listener bound"
        );

        Ok(Self {
            kind,
            inner,
            local_addr,
            connection_limit: max_connections.map(|n| Arc::new(Semaphore::new(n))),
        })
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// Waits while the limit is reached. The returned permit must be held
    /// for the connection's lifetime.
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr, Option<OwnedSemaphorePermit>)> {
        let permit = match &self.connection_limit {
            Some(limit) => Some(
                limit
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| io::Error::other("connection limit closed"))?,
            ),
            None => None,
        };

        let (stream, peer) = self.inner.accept().await?;

        tracing::debug!(
            listener = %self.kind,
            peer_addr = %peer,
            available_permits = ?self.connection_limit.as_ref().map(|l| l.available_permits()),
            "Connection accepted"
        );

        Ok((stream, peer, permit))
    }

    /// Start the accept loop on a background task.
    pub fn serve(self, router: Router, tuning: &ListenerTuning) -> ServingListener {
        let builder = connection_builder(tuning);
        let (stop_tx, stop_rx) = oneshot::channel();
        let kind = self.kind;
        let local_addr = self.local_addr;

        tracing::info!(listener = %kind, address = %local_addr, "Listener serving");

        let task = tokio::spawn(accept_loop(self, router, builder, stop_rx));
        ServingListener {
            kind,
            local_addr,
            stop_tx,
            task,
        }
    }
}

/// Stop request handed to an accept loop.
#[derive(Debug, Clone, Copy)]
struct Drain {
    deadline: Instant,
    timeout: Duration,
}

/// Handle to a listener whose accept loop is running.
#[derive(Debug)]
pub struct ServingListener {
    kind: ListenerKind,
    local_addr: SocketAddr,
    stop_tx: oneshot::Sender<Drain>,
    task: JoinHandle<Result<(), ServerError>>,
}

impl ServingListener {
    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and drain open connections until `deadline`.
    ///
    /// Connections still open at the deadline are aborted and
    /// `ShutdownTimeout` is returned with `timeout` as the reported budget.
    pub async fn shutdown(self, deadline: Instant, timeout: Duration) -> Result<(), ServerError> {
        let kind = self.kind;
        // A finished accept loop has dropped its receiver; the join below reports its result.
        let _ = self.stop_tx.send(Drain { deadline, timeout });

        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(ServerError::Shutdown {
                listener: kind,
                source: io::Error::other(err),
            }),
        }
    }
}

fn connection_builder(tuning: &ListenerTuning) -> Builder<TokioExecutor> {
    let mut builder = Builder::new(TokioExecutor::new());
    {
        let mut http1 = builder.http1();
        http1.timer(TokioTimer::new()).keep_alive(tuning.keep_alive);
        if let Some(timeout) = tuning.header_read_timeout() {
            http1.header_read_timeout(timeout);
        }
        if tuning.max_header_bytes > 0 {
            http1.max_buf_size(tuning.max_header_bytes.max(MIN_HTTP1_BUF_SIZE));
        }
    }
    builder
}

async fn accept_loop(
    listener: Listener,
    router: Router,
    builder: Builder<TokioExecutor>,
    mut stop_rx: oneshot::Receiver<Drain>,
) -> Result<(), ServerError> {
    let kind = listener.kind;
    let tracker = ConnectionTracker::new(kind);
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();

    let drain = loop {
        tokio::select! {
            biased;

            drain = &mut stop_rx => {
                // Sender dropped without a request: drain with no grace.
                break drain.unwrap_or(Drain {
                    deadline: Instant::now(),
                    timeout: Duration::ZERO,
                });
            }

            Some(_) = connections.join_next(), if !connections.is_empty() => {}

            accepted = listener.accept() => match accepted {
                Ok((stream, peer, permit)) => {
                    let guard = tracker.track(peer);
                    let router = router.clone();
                    let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
                        request.extensions_mut().insert(ConnectInfo(peer));
                        router.clone().call(request)
                    });
                    let conn = builder
                        .serve_connection_with_upgrades(TokioIo::new(stream), service)
                        .into_owned();
                    let conn = graceful.watch(conn);

                    connections.spawn(async move {
                        if let Err(err) = conn.await {
                            tracing::debug!(connection_id = %guard.id(), error = %err, "Connection ended with error");
                        }
                        drop(permit);
                        drop(guard);
                    });
                }
                Err(err) => {
                    tracing::warn!(listener = %kind, error = %err, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
        }
    };

    // Closing the socket refuses new connections while existing ones drain.
    drop(listener);
    tracing::info!(
        listener = %kind,
        open_connections = tracker.active_count(),
        "Stopped accepting, draining connections"
    );

    match tokio::time::timeout_at(drain.deadline, graceful.shutdown()).await {
        Ok(()) => {
            while connections.join_next().await.is_some() {}
            tracing::info!(listener = %kind, "Listener drained");
            Ok(())
        }
        Err(_) => {
            let remaining = tracker.active_count();
            connections.shutdown().await;
            tracing::warn!(
                listener = %kind,
                remaining_connections = remaining,
                timeout = ?drain.timeout,
                "Drain deadline passed, connections force-closed"
            );
            Err(ServerError::ShutdownTimeout {
                listener: kind,
                timeout: drain.timeout,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const GRACE: Duration = Duration::from_secs(1);

    async fn raw_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            path, addr
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn bind_reports_occupied_port() {
        let first = Listener::bind(ListenerKind::Application, "127.0.0.1", 0, GRACE, None)
            .await
            .unwrap();
        let port = first.local_addr().port();

        let err = Listener::bind(ListenerKind::Probe, "127.0.0.1", port, GRACE, None)
            .await
            .unwrap_err();
        match err {
            ServerError::Startup { listener, address, source } => {
                assert_eq!(listener, ListenerKind::Probe);
                assert_eq!(address, format!("127.0.0.1:{}", port));
                assert_eq!(source.kind(), io::ErrorKind::AddrInUse);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn bind_reports_unresolvable_address() {
        let err = Listener::bind(ListenerKind::Application, "no such host!", 0, GRACE, None)
            .await
            .unwrap_err();
        assert!(err.is_startup());
    }

    #[tokio::test]
    async fn serves_router_with_peer_address() {
        let router = Router::new().route(
            "/peer",
            get(|ConnectInfo(peer): ConnectInfo<SocketAddr>| async move { peer.ip().to_string() }),
        );
        let listener = Listener::bind(ListenerKind::Application, "127.0.0.1", 0, GRACE, Some(4))
            .await
            .unwrap();
        let serving = listener.serve(router, &ListenerTuning::default());
        let addr = serving.local_addr();

        let response = raw_get(addr, "/peer").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.ends_with("127.0.0.1"), "{response}");

        let deadline = Instant::now() + Duration::from_secs(2);
        serving.shutdown(deadline, Duration::from_secs(2)).await.unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn slow_request_past_deadline_times_out() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let listener = Listener::bind(ListenerKind::Application, "127.0.0.1", 0, GRACE, None)
            .await
            .unwrap();
        let serving = listener.serve(router, &ListenerTuning::default());
        let addr = serving.local_addr();

        let client = tokio::spawn(async move { raw_get(addr, "/slow").await });
        tokio::time::sleep(Duration::from_millis(200)).await;

        let timeout = Duration::from_millis(300);
        let err = serving
            .shutdown(Instant::now() + timeout, timeout)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::ShutdownTimeout { listener: ListenerKind::Application, .. }
        ));

        // The aborted connection is closed (or reset) without a response.
        let response = client.await;
        assert!(response.map(|r| r.is_empty()).unwrap_or(true));
    }
}
