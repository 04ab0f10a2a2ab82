//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Application::start → spawn reload loop (+ optional watcher)
//!
//! Reload (reload.rs), every interval:
//!     load payload → bind reusable listener → start new instance
//!     → retire previous (shutdown.rs) → publish (handle.rs)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → stop reload loop → retire every live instance → exit
//! ```
//!
//! # Design Decisions
//! - New instance listens before the old one stops: no gap on the address
//! - Every drain has a deadline; forced closes are logged, never fatal
//! - Shutdown drains the whole live registry, not only the published slot

pub mod handle;
pub mod reload;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use handle::ApplicationHandle;
pub use reload::{ReloadLoop, ReloadOutcome};
pub use shutdown::{DrainError, DrainReport, Shutdown, ShutdownCoordinator, ShutdownListener};
pub use signals::{run_until_signal, shutdown_on, wait_for_signal, TerminationSignal};
pub use startup::{Application, ShutdownSummary, StartupError};
