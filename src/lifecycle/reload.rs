//! Periodic reload with overlapping-listener handover.
//!
//! One iteration, in strict order:
//! 1. load the payload into a fresh [`ServerConfig`]
//! 2. build a router closed over that config
//! 3. bind a reusable listener on the configured address
//! 4. start serving on it in the background
//! 5. retire the previously published instance (bounded drain)
//! 6. publish the new instance
//!
//! Step 4 completes before step 5 begins, so the address always has a
//! listener. A failure in steps 1 or 3 skips the iteration and leaves the
//! published instance untouched.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::{ConfigError, PayloadSource};
use crate::http::{build_router, ServerInstance};
use crate::lifecycle::handle::ApplicationHandle;
use crate::lifecycle::shutdown::{ShutdownCoordinator, ShutdownListener};
use crate::net::{bind_reusable, ListenerError};
use crate::observability::metrics;

/// What one reload iteration did.
#[derive(Debug)]
pub enum ReloadOutcome {
    /// A new instance is serving and published.
    Swapped {
        generation: u64,
        local_addr: SocketAddr,
    },
    /// The payload could not be loaded; nothing changed.
    ConfigError(ConfigError),
    /// No listener could be created; nothing changed.
    BindError(ListenerError),
}

impl ReloadOutcome {
    pub fn is_swapped(&self) -> bool {
        matches!(self, ReloadOutcome::Swapped { .. })
    }
}

enum Wake {
    Tick,
    Nudge,
    NudgesClosed,
    Shutdown,
}

/// The perpetual reload task.
pub struct ReloadLoop {
    source: PayloadSource,
    handle: Arc<ApplicationHandle>,
    coordinator: ShutdownCoordinator,
    interval: Duration,
    backlog: u32,
    request_timeout: Duration,
    nudges: Option<mpsc::Receiver<()>>,
    next_generation: u64,
}

impl ReloadLoop {
    pub fn new(
        source: PayloadSource,
        handle: Arc<ApplicationHandle>,
        coordinator: ShutdownCoordinator,
    ) -> Self {
        Self {
            source,
            handle,
            coordinator,
            interval: Duration::from_secs(3),
            backlog: 1024,
            request_timeout: Duration::from_secs(30),
            nudges: None,
            next_generation: 1,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Wake early whenever the receiver yields.
    pub fn with_nudges(mut self, nudges: mpsc::Receiver<()>) -> Self {
        self.nudges = Some(nudges);
        self
    }

    /// Reload immediately, then once per interval until shutdown.
    pub async fn run(mut self, mut shutdown: ShutdownListener) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            path = ?self.source.path(),
            "Reload loop started"
        );

        while !shutdown.is_triggered() {
            let generation = self.next_generation;
            self.next_generation += 1;

            tracing::info!(generation, "Reloading");
            self.reload_once(generation).await;

            match self.sleep(&mut shutdown).await {
                Wake::Tick => {}
                Wake::Nudge => tracing::debug!("Reloading early after payload change"),
                Wake::NudgesClosed => self.nudges = None,
                Wake::Shutdown => break,
            }
        }

        tracing::info!("Reload loop stopped");
    }

    async fn sleep(&mut self, shutdown: &mut ShutdownListener) -> Wake {
        let interval = self.interval;
        let nudges = self.nudges.as_mut();
        let nudge = async move {
            match nudges {
                Some(nudges) => nudges.recv().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = shutdown.recv() => Wake::Shutdown,
            _ = tokio::time::sleep(interval) => Wake::Tick,
            nudged = nudge => match nudged {
                Some(()) => Wake::Nudge,
                None => Wake::NudgesClosed,
            },
        }
    }

    /// Run a single iteration under the given generation number.
    pub async fn reload_once(&self, generation: u64) -> ReloadOutcome {
        let config = match self.source.load() {
            Ok(config) => Arc::new(config),
            Err(e) => {
                tracing::warn!(generation, error = %e, "Load config failed, keeping current server");
                metrics::record_reload("config_error");
                return ReloadOutcome::ConfigError(e);
            }
        };

        let app = build_router(Arc::clone(&config), self.request_timeout);

        let instance = match bind_reusable(&config.bind_address, self.backlog)
            .and_then(|listener| ServerInstance::start(generation, Arc::clone(&config), listener, app))
        {
            Ok(instance) => Arc::new(instance),
            Err(e) => {
                tracing::warn!(
                    generation,
                    address = %config.bind_address,
                    error = %e,
                    "Listen failed, keeping current server"
                );
                metrics::record_reload("bind_error");
                return ReloadOutcome::BindError(e);
            }
        };

        let local_addr = instance.local_addr();
        self.handle.register(Arc::clone(&instance));
        tracing::info!(generation, address = %local_addr, "Listening");

        if let Some(previous) = self.handle.current() {
            // Failures are logged by the coordinator; the old instance is
            // stopped either way.
            let _ = self.coordinator.retire(&previous).await;
            self.handle.forget(previous.generation());
        }

        self.handle.publish(instance);
        metrics::record_reload("swapped");

        ReloadOutcome::Swapped {
            generation,
            local_addr,
        }
    }
}
