//! hotswap-listener
//!
//! Serves the contents of a payload file on `/hello` and swaps in a freshly
//! bound listener every reload interval without refusing a single connection.

use std::path::PathBuf;

use clap::Parser;

use hotswap_listener::config::{load_config, validate_config, ConfigError, HotswapConfig, LogFormat};
use hotswap_listener::lifecycle::{run_until_signal, Application};
use hotswap_listener::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "hotswap-listener")]
#[command(about = "Zero-downtime listener restarts driven by a payload file", long_about = None)]
struct Cli {
    /// TOML settings file; built-in defaults apply when omitted.
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// File whose contents are served on /hello.
    #[arg(short, long)]
    payload: Option<String>,

    /// Address to bind (e.g. 0.0.0.0:8080 or :8080).
    #[arg(short, long)]
    bind: Option<String>,

    /// Milliseconds between reloads.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Milliseconds a retiring server may spend draining.
    #[arg(long)]
    drain_timeout_ms: Option<u64>,

    /// Also reload when the payload file changes.
    #[arg(long)]
    watch: bool,

    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn apply(&self, config: &mut HotswapConfig) {
        if let Some(payload) = &self.payload {
            config.reload.payload_path = payload.clone();
        }
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(interval_ms) = self.interval_ms {
            config.reload.interval_ms = interval_ms;
        }
        if let Some(drain_timeout_ms) = self.drain_timeout_ms {
            config.shutdown.drain_timeout_ms = drain_timeout_ms;
        }
        if self.watch {
            config.reload.watch = true;
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.settings {
        Some(path) => load_config(path)?,
        None => HotswapConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability)?;

    tracing::info!("hotswap-listener v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        payload_path = %config.reload.payload_path,
        interval_ms = config.reload.interval_ms,
        drain_timeout_ms = config.shutdown.drain_timeout_ms,
        watch = config.reload.watch,
        "Configuration loaded"
    );
    match toml::to_string(&config) {
        Ok(effective) => tracing::debug!(settings = %effective, "Effective settings"),
        Err(e) => tracing::warn!(error = %e, "Failed to render effective settings"),
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let app = Application::start(&config)?;
    let signal = run_until_signal(app).await?;

    tracing::info!(%signal, "Shutdown complete");
    Ok(())
}
