//! Server instances.
//!
//! # Responsibilities
//! - Build the Axum router for one immutable [`ServerConfig`]
//! - Run the accept loop on a reusable listener (HTTP/1.1 and HTTP/2)
//! - Stop accepting on request, drain in-flight connections, force-close on demand
//!
//! # Lifecycle
//! ```text
//! start() → Serving ──drain()──▶ Draining ──(drained | deadline + force)──▶ Stopped
//! ```
//! The listener stops taking new work when draining starts and closes once
//! its accept queue has stayed empty for a short quiet period. Dropping an instance
//! that was never drained stops it abruptly: the accept loop ends and open
//! connections are aborted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{routing::any, Router};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::{conn::auto, graceful::GracefulShutdown},
    service::TowerToHyperService,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::response::{hello, not_found, HELLO_ROUTE};
use crate::lifecycle::shutdown::{DrainError, DrainReport};
use crate::net::{ConnectionTracker, ListenerError};

/// Pause after a failed accept (e.g. out of file descriptors) before retrying.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// A retiring listener closes once no connection arrived for this long.
const ACCEPT_QUIET_PERIOD: Duration = Duration::from_millis(25);

/// Upper bound on how long a retiring listener keeps accepting.
const ACCEPT_LINGER_MAX: Duration = Duration::from_millis(250);

/// Extra time granted to the accept loop to unwind after a forced close.
const FORCE_CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Build the router serving one configuration snapshot.
#[allow(deprecated)]
pub fn build_router(config: Arc<ServerConfig>, request_timeout: Duration) -> Router {
    Router::new()
        .route(HELLO_ROUTE, any(hello))
        .fallback(not_found)
        .with_state(config)
        .layer(
            ServiceBuilder::new()
                .layer(set_request_id_layer())
                .layer(TraceLayer::new_for_http())
                .layer(propagate_request_id_layer())
                .layer(TimeoutLayer::new(request_timeout)),
        )
}

/// Where an instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Accepting connections.
    Serving,
    /// Listener closed, waiting for in-flight connections.
    Draining,
    /// Accept loop finished, every connection closed.
    Stopped,
}

/// A running listener plus the router bound to it.
pub struct ServerInstance {
    generation: u64,
    config: Arc<ServerConfig>,
    local_addr: SocketAddr,
    connections: ConnectionTracker,
    state: watch::Sender<InstanceState>,
    stop: watch::Sender<bool>,
    force: watch::Sender<bool>,
    /// Accept loop task; taken by the first drain.
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ServerInstance {
    /// Start serving `app` on `listener` in a background task.
    ///
    /// The instance is accepting connections when this returns.
    pub fn start(
        generation: u64,
        config: Arc<ServerConfig>,
        listener: TcpListener,
        app: Router,
    ) -> Result<Self, ListenerError> {
        let local_addr = listener.local_addr().map_err(ListenerError::Socket)?;
        let connections = ConnectionTracker::new();
        let (stop, stop_rx) = watch::channel(false);
        let (force, force_rx) = watch::channel(false);
        let (state, _) = watch::channel(InstanceState::Serving);

        let task = tokio::spawn(accept_loop(
            generation,
            listener,
            app,
            connections.clone(),
            stop_rx,
            force_rx,
        ));

        Ok(Self {
            generation,
            config,
            local_addr,
            connections,
            state,
            stop,
            force,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> InstanceState {
        *self.state.borrow()
    }

    pub fn active_connections(&self) -> u64 {
        self.connections.active_count()
    }

    /// Stop accepting, wait up to `deadline` for open connections, then
    /// force-close whatever remains.
    ///
    /// Concurrent callers wait for the first one; later calls return
    /// [`DrainReport::AlreadyStopped`].
    pub async fn drain(&self, deadline: Duration) -> Result<DrainReport, DrainError> {
        let mut slot = self.task.lock().await;
        let Some(task) = slot.as_mut() else {
            return Ok(DrainReport::AlreadyStopped {
                generation: self.generation,
            });
        };

        let started = Instant::now();
        self.state.send_replace(InstanceState::Draining);
        self.stop.send_replace(true);

        let outcome = match tokio::time::timeout(deadline, &mut *task).await {
            Ok(Ok(())) => Ok(DrainReport::Drained {
                generation: self.generation,
                elapsed: started.elapsed(),
            }),
            Ok(Err(_)) => Err(DrainError::Panicked {
                generation: self.generation,
            }),
            Err(_) => {
                let remaining = self.connections.active_count();
                self.force.send_replace(true);
                if tokio::time::timeout(FORCE_CLOSE_GRACE, &mut *task).await.is_err() {
                    task.abort();
                }
                Err(DrainError::DeadlineExceeded {
                    generation: self.generation,
                    remaining,
                    deadline,
                })
            }
        };

        slot.take();
        self.state.send_replace(InstanceState::Stopped);
        outcome
    }
}

impl std::fmt::Debug for ServerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerInstance")
            .field("generation", &self.generation)
            .field("local_addr", &self.local_addr)
            .field("state", &self.state())
            .field("active_connections", &self.active_connections())
            .finish()
    }
}

/// Resolves once the flag is raised or its sender is gone.
async fn raised(flag: &mut watch::Receiver<bool>) {
    let _ = flag.wait_for(|raised| *raised).await;
}

async fn accept_loop(
    generation: u64,
    listener: TcpListener,
    app: Router,
    connections: ConnectionTracker,
    mut stop: watch::Receiver<bool>,
    mut force: watch::Receiver<bool>,
) {
    let builder = auto::Builder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();
    let mut tasks = JoinSet::new();
    let address = listener.local_addr().ok();

    tracing::info!(generation, address = ?address, "Accept loop started");

    let serve = |stream: TcpStream, peer: SocketAddr, tasks: &mut JoinSet<()>| {
        let guard = connections.track();
        let service = TowerToHyperService::new(app.clone());
        let conn = builder
            .serve_connection_with_upgrades(TokioIo::new(stream), service)
            .into_owned();
        let conn = graceful.watch(conn);
        tasks.spawn(async move {
            tracing::trace!(generation, connection_id = %guard.id(), peer = %peer, "Connection accepted");
            if let Err(e) = conn.await {
                tracing::debug!(generation, connection_id = %guard.id(), error = %e, "Connection ended with error");
            }
        });
    };

    loop {
        tokio::select! {
            biased;
            _ = raised(&mut stop) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => serve(stream, peer, &mut tasks),
                Err(e) => {
                    tracing::warn!(generation, error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    // Connections still queued on this socket would be reset by close(), and
    // a connection accepted a moment ago may not have sent its request yet.
    // Keep accepting until the queue has been quiet for a while.
    let lingering = Instant::now();
    while lingering.elapsed() < ACCEPT_LINGER_MAX {
        match tokio::time::timeout(ACCEPT_QUIET_PERIOD, listener.accept()).await {
            Ok(Ok((stream, peer))) => serve(stream, peer, &mut tasks),
            Ok(Err(e)) => {
                tracing::debug!(generation, error = %e, "Accept failed while closing");
                break;
            }
            Err(_) => break,
        }
    }
    drop(listener);

    tracing::info!(
        generation,
        address = ?address,
        open_connections = connections.active_count(),
        "Listener closed, draining"
    );

    tokio::select! {
        _ = graceful.shutdown() => {}
        _ = raised(&mut force) => {
            tracing::warn!(
                generation,
                open_connections = connections.active_count(),
                "Force-closing connections"
            );
            tasks.abort_all();
        }
    }
    while tasks.join_next().await.is_some() {}

    tracing::info!(generation, address = ?address, "Server stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::bind_reusable;
    use crate::test_support::{get, slow_router};

    fn config(payload: &str) -> Arc<ServerConfig> {
        Arc::new(ServerConfig {
            bind_address: "127.0.0.1:0".into(),
            payload: bytes::Bytes::copy_from_slice(payload.as_bytes()),
        })
    }

    fn start(payload: &str) -> ServerInstance {
        let config = config(payload);
        let listener = bind_reusable(&config.bind_address, 128).unwrap();
        let app = build_router(Arc::clone(&config), Duration::from_secs(5));
        ServerInstance::start(1, config, listener, app).unwrap()
    }

    #[tokio::test]
    async fn serves_payload_and_not_found() {
        let instance = start("v1");
        assert_eq!(instance.state(), InstanceState::Serving);

        let (status, body) = get(instance.local_addr(), "/hello").await.unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, "v1\n");

        let (status, body) = get(instance.local_addr(), "/other").await.unwrap();
        assert_eq!(status, 404);
        assert_eq!(body, "404 page not found\n");
    }

    #[tokio::test]
    async fn drain_closes_listener() {
        let instance = start("v1");
        let addr = instance.local_addr();

        let report = instance.drain(Duration::from_secs(2)).await.unwrap();
        assert!(matches!(report, DrainReport::Drained { generation: 1, .. }));
        assert_eq!(instance.state(), InstanceState::Stopped);

        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn second_drain_is_noop() {
        let instance = start("v1");
        instance.drain(Duration::from_secs(2)).await.unwrap();

        let report = instance.drain(Duration::from_secs(2)).await.unwrap();
        assert_eq!(report, DrainReport::AlreadyStopped { generation: 1 });
    }

    #[tokio::test]
    async fn in_flight_request_completes_during_drain() {
        let config = config("slow");
        let listener = bind_reusable(&config.bind_address, 128).unwrap();
        let app = slow_router(Duration::from_millis(300));
        let instance = Arc::new(ServerInstance::start(7, config, listener, app).unwrap());
        let addr = instance.local_addr();

        let request = tokio::spawn(async move { get(addr, "/slow").await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(instance.active_connections(), 1);

        let report = instance.drain(Duration::from_secs(2)).await.unwrap();
        assert!(matches!(report, DrainReport::Drained { generation: 7, .. }));

        let (status, body) = request.await.unwrap().unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, "done");
    }

    #[tokio::test]
    async fn deadline_force_closes_connections() {
        let config = config("slow");
        let listener = bind_reusable(&config.bind_address, 128).unwrap();
        let app = slow_router(Duration::from_secs(30));
        let instance = ServerInstance::start(3, config, listener, app).unwrap();
        let addr = instance.local_addr();

        let request = tokio::spawn(async move { get(addr, "/slow").await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        let err = instance
            .drain(Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(
            err,
            DrainError::DeadlineExceeded {
                generation: 3,
                remaining: 1,
                ..
            }
        ));
        assert_eq!(instance.active_connections(), 0);
        assert!(request.await.unwrap().is_err());
    }
}
