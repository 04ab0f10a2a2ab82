//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use hotswap_listener::config::HotswapConfig;
use hotswap_listener::ApplicationHandle;

/// A payload file in its own temp directory.
pub struct PayloadFile {
    _dir: tempfile::TempDir,
    path: PathBuf,
}

impl PayloadFile {
    pub fn new(contents: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.txt");
        std::fs::write(&path, contents).unwrap();
        Self { _dir: dir, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, contents: &str) {
        std::fs::write(&self.path, contents).unwrap();
    }

    pub fn remove(&self) {
        std::fs::remove_file(&self.path).unwrap();
    }
}

/// An unused loopback address. The socket is closed before returning.
pub fn free_address() -> String {
    let socket = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().to_string()
}

/// Fast timings suitable for tests.
pub fn test_config(payload: &PayloadFile, bind_address: &str) -> HotswapConfig {
    let mut config = HotswapConfig::default();
    config.listener.bind_address = bind_address.to_string();
    config.listener.backlog = 128;
    config.reload.payload_path = payload.path().to_string_lossy().into_owned();
    config.reload.interval_ms = 200;
    config.shutdown.drain_timeout_ms = 500;
    config
}

/// Wait until the published instance has at least the given generation.
pub async fn wait_for_generation(handle: &ApplicationHandle, generation: u64) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if handle
                .current()
                .is_some_and(|instance| instance.generation() >= generation)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("generation was never published");
}

/// HTTP client that opens a new connection per request.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

pub async fn fetch_hello(client: &reqwest::Client, address: &str) -> reqwest::Result<String> {
    client
        .get(format!("http://{address}/hello"))
        .send()
        .await?
        .text()
        .await
}
