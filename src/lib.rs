//! Zero-downtime listener restarts.
//!
//! A reload loop periodically re-reads a payload file, binds a fresh listener
//! on the same address (SO_REUSEADDR + SO_REUSEPORT), starts serving on it and
//! only then drains the previous listener. SIGINT/SIGTERM drain whatever is
//! still serving and let the process exit.
//!
//! ```text
//!  payload file ──▶ reload loop ──▶ bind reusable ──▶ new instance (serving)
//!                        │                                  │
//!                        ▼                                  ▼
//!              retire previous (drain ≤ deadline) ──▶ publish to handle
//!
//!  SIGINT/SIGTERM ──▶ stop reload loop ──▶ retire every live instance ──▶ exit
//! ```

#[cfg(not(unix))]
compile_error!("hotswap-listener requires a Unix platform (SO_REUSEPORT)");

// Core subsystems
pub mod config;
pub mod http;
pub mod net;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

#[cfg(test)]
mod test_support;

pub use config::{HotswapConfig, ServerConfig};
pub use http::ServerInstance;
pub use lifecycle::{Application, ApplicationHandle, ShutdownCoordinator};
