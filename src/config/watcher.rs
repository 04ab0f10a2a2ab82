//! Payload file watcher for early reloads.
//!
//! The reload loop runs on a fixed interval regardless; the watcher only wakes
//! it sooner. Nudges coalesce: at most one is pending at a time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// A watcher that monitors the payload file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    nudge_tx: mpsc::Sender<()>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver that yields once per batch of changes.
    pub fn new(path: &Path) -> (Self, mpsc::Receiver<()>) {
        let (nudge_tx, nudge_rx) = mpsc::channel(1);

        (
            Self {
                path: path.to_path_buf(),
                nudge_tx,
            },
            nudge_rx,
        )
    }

    /// Start watching in a background thread. The watch ends when the returned
    /// watcher is dropped.
    ///
    /// The parent directory is watched so that editors replacing the file
    /// (write to temp, rename over) are still noticed.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.nudge_tx.clone();
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let directory = watch_directory(&self.path);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if ours && tx.try_send(()).is_ok() {
                        tracing::debug!("Payload file change detected");
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Payload watcher started");
        Ok(watcher)
    }
}

fn watch_directory(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
