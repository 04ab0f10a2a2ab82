//! Shutdown coordination.
//!
//! Two pieces live here:
//! - [`Shutdown`]: the process-wide lifecycle trigger that long-running tasks
//!   (the reload loop) subscribe to.
//! - [`ShutdownCoordinator`]: bounded-time graceful drain of a server instance,
//!   used both when a reload retires the previous instance and on process exit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::watch;

use crate::http::ServerInstance;
use crate::observability::metrics;

/// Process-wide shutdown trigger.
///
/// Backed by a watch channel, so subscribers created after the trigger still
/// observe it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Number of live subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber side of [`Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Wait until shutdown is triggered. Also returns if every [`Shutdown`]
    /// handle was dropped.
    pub async fn recv(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Successful end of a drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainReport {
    /// Every in-flight connection finished before the deadline.
    Drained { generation: u64, elapsed: Duration },
    /// The instance had already been drained.
    AlreadyStopped { generation: u64 },
}

/// Drain that did not finish cleanly. Never fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrainError {
    #[error("instance {generation}: drain deadline of {deadline:?} exceeded, force-closed {remaining} connection(s)")]
    DeadlineExceeded {
        generation: u64,
        remaining: u64,
        deadline: Duration,
    },

    #[error("instance {generation}: accept loop panicked")]
    Panicked { generation: u64 },
}

/// Bounded-time graceful drain of server instances.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownCoordinator {
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(drain_timeout: Duration) -> Self {
        Self { drain_timeout }
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Retire one instance: stop accepting now, let in-flight requests finish,
    /// force-close after the drain timeout.
    ///
    /// Returns within the drain timeout plus a bounded cleanup delay.
    pub async fn retire(&self, instance: &ServerInstance) -> Result<DrainReport, DrainError> {
        let generation = instance.generation();
        let started = Instant::now();

        tracing::info!(
            generation,
            address = %instance.local_addr(),
            open_connections = instance.active_connections(),
            timeout_ms = self.drain_timeout.as_millis() as u64,
            "Retiring server"
        );

        let result = instance.drain(self.drain_timeout).await;

        match &result {
            Ok(DrainReport::Drained { elapsed, .. }) => {
                tracing::info!(generation, elapsed_ms = elapsed.as_millis() as u64, "Server drained");
                metrics::record_drain("drained", started.elapsed());
            }
            Ok(DrainReport::AlreadyStopped { .. }) => {
                tracing::debug!(generation, "Server already stopped");
            }
            Err(e @ DrainError::DeadlineExceeded { .. }) => {
                tracing::warn!(generation, error = %e, "Server shutdown error");
                metrics::record_drain("deadline_exceeded", started.elapsed());
            }
            Err(e @ DrainError::Panicked { .. }) => {
                tracing::error!(generation, error = %e, "Server shutdown error");
                metrics::record_drain("panicked", started.elapsed());
            }
        }

        result
    }

    /// Retire several instances concurrently. Results follow input order.
    pub async fn retire_all(
        &self,
        instances: &[Arc<ServerInstance>],
    ) -> Vec<Result<DrainReport, DrainError>> {
        join_all(instances.iter().map(|instance| self.retire(instance))).await
    }
}
