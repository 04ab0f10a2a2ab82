//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! settings file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → HotswapConfig (validated, read once at startup)
//!
//! payload file (read every reload cycle)
//!     → loader.rs PayloadSource
//!     → ServerConfig (immutable, owned by one server instance)
//!
//! watcher.rs (optional) nudges the reload loop when the payload file changes
//! ```

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError, PayloadSource};
pub use schema::{
    HotswapConfig, ListenerConfig, LogFormat, ObservabilityConfig, ReloadConfig, ServerConfig,
    ShutdownConfig,
};
pub use validation::{validate_config, ValidationError};
