//! Helpers shared by unit tests.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{routing::get as get_route, Router};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Issue `GET path` over a fresh connection and return status and body.
pub async fn get(addr: SocketAddr, path: &str) -> io::Result<(u16, String)> {
    let mut stream = TcpStream::connect(addr).await?;
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    let raw = String::from_utf8_lossy(&raw);

    let (head, body) = raw
        .split_once("\r\n\r\n")
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "incomplete response"))?;
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no status line"))?;

    Ok((status, body.to_string()))
}

/// Router whose `/slow` handler sleeps before answering "done".
pub fn slow_router(delay: Duration) -> Router {
    Router::new().route(
        "/slow",
        get_route(move || async move {
            tokio::time::sleep(delay).await;
            "done"
        }),
    )
}
