//! Startup orchestration.
//!
//! Wires the pieces together: the application handle, the drain coordinator,
//! the reload loop (spawned) and the optional payload watcher. Startup fails
//! only if the watcher cannot be installed; everything after that is
//! recoverable per reload cycle.

use std::sync::Arc;
use std::time::Duration;

use notify::RecommendedWatcher;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{HotswapConfig, PayloadSource};
use crate::config::watcher::ConfigWatcher;
use crate::lifecycle::handle::ApplicationHandle;
use crate::lifecycle::reload::ReloadLoop;
use crate::lifecycle::shutdown::{DrainError, Shutdown, ShutdownCoordinator};

/// Slack on top of the drain timeout for an in-flight reload to finish.
const RELOAD_STOP_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to watch payload file: {0}")]
    Watcher(#[from] notify::Error),
}

/// What a shutdown retired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Instances retired, cleanly or not.
    pub retired: usize,
    /// Instances whose drain hit the deadline.
    pub forced: usize,
}

/// A running service: reload loop plus whatever instance it published.
pub struct Application {
    handle: Arc<ApplicationHandle>,
    coordinator: ShutdownCoordinator,
    shutdown: Shutdown,
    reload_task: JoinHandle<()>,
    _watcher: Option<RecommendedWatcher>,
}

impl Application {
    /// Spawn the reload loop. The first reload runs immediately.
    pub fn start(config: &HotswapConfig) -> Result<Self, StartupError> {
        let handle = Arc::new(ApplicationHandle::new());
        let coordinator = ShutdownCoordinator::new(config.shutdown.drain_timeout());
        let source = PayloadSource::new(
            &config.reload.payload_path,
            &config.listener.bind_address,
        );

        let mut reload = ReloadLoop::new(source.clone(), Arc::clone(&handle), coordinator)
            .with_interval(config.reload.interval())
            .with_backlog(config.listener.backlog)
            .with_request_timeout(config.listener.request_timeout());

        let watcher = if config.reload.watch {
            let (watcher, nudges) = ConfigWatcher::new(source.path());
            reload = reload.with_nudges(nudges);
            Some(watcher.run()?)
        } else {
            None
        };

        let shutdown = Shutdown::new();
        let reload_task = tokio::spawn(reload.run(shutdown.subscribe()));

        Ok(Self {
            handle,
            coordinator,
            shutdown,
            reload_task,
            _watcher: watcher,
        })
    }

    pub fn handle(&self) -> &Arc<ApplicationHandle> {
        &self.handle
    }

    /// Stop reloading, then drain every instance still alive.
    ///
    /// The reload loop is stopped first so no instance can be started after
    /// the registry is read.
    pub async fn shutdown(self) -> ShutdownSummary {
        let Self {
            handle,
            coordinator,
            shutdown,
            mut reload_task,
            _watcher: watcher,
        } = self;
        drop(watcher);

        shutdown.trigger();
        let bound = coordinator.drain_timeout() + RELOAD_STOP_GRACE;
        if tokio::time::timeout(bound, &mut reload_task).await.is_err() {
            tracing::warn!(timeout_ms = bound.as_millis() as u64, "Reload loop did not stop in time, aborting it");
            reload_task.abort();
            let _ = reload_task.await;
        }

        let instances = handle.take_all();
        let results = coordinator.retire_all(&instances).await;

        ShutdownSummary {
            retired: results.len(),
            forced: results
                .iter()
                .filter(|r| matches!(r, Err(DrainError::DeadlineExceeded { .. })))
                .count(),
        }
    }
}
