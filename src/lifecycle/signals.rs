//! OS signal handling.
//!
//! SIGINT and SIGTERM both mean "drain and exit". The handler is single-shot:
//! a second signal during the drain gets the default disposition once the
//! process is gone, and nothing special before that.

use std::fmt;
use std::future::Future;
use std::io;

use tokio::signal::unix::{signal, SignalKind};

use crate::lifecycle::startup::{Application, ShutdownSummary};

/// Termination signals the process reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationSignal::Interrupt => f.write_str("SIGINT"),
            TerminationSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Block until SIGINT or SIGTERM arrives.
pub async fn wait_for_signal() -> io::Result<TerminationSignal> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = interrupt.recv() => Ok(TerminationSignal::Interrupt),
        _ = terminate.recv() => Ok(TerminationSignal::Terminate),
    }
}

/// Run `app` until a termination signal, then drain it.
pub async fn run_until_signal(app: Application) -> io::Result<TerminationSignal> {
    let signal = wait_for_signal().await?;
    shutdown_on(app, async { signal }).await;
    Ok(signal)
}

/// Wait for `trigger`, then shut `app` down. Returns once every instance
/// has been retired.
pub async fn shutdown_on<S, F>(app: Application, trigger: F) -> ShutdownSummary
where
    S: fmt::Display,
    F: Future<Output = S>,
{
    let received = trigger.await;
    tracing::info!(signal = %received, "Received signal, initiating shutdown");

    let summary = app.shutdown().await;

    tracing::info!(
        retired = summary.retired,
        forced = summary.forced,
        "Exiting"
    );
    summary
}
