//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! reusable TCP listener
//!     → server.rs (accept loop, hyper auto HTTP/1.1 + HTTP/2, graceful drain)
//!     → request.rs (x-request-id assigned and propagated)
//!     → response.rs (/hello → payload, everything else → 404)
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use response::HELLO_ROUTE;
pub use server::{build_router, InstanceState, ServerInstance};
