//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! bind address
//!     → listener.rs (SO_REUSEADDR + SO_REUSEPORT, bind, listen)
//!     → http server accept loop
//!     → connection.rs (per-instance open connection count)
//! ```
//!
//! # Design Decisions
//! - Every listener is bound with port reuse so a replacement can bind while
//!   the current one is still serving
//! - Connections are counted per instance so a drain can report what it cut off

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{bind_reusable, parse_bind_address, ListenerError};
