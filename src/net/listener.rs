//! Reusable TCP listener construction.
//!
//! # Responsibilities
//! - Resolve the configured bind address
//! - Create a socket with SO_REUSEADDR and SO_REUSEPORT set before bind
//! - Bind and listen with the configured backlog
//!
//! Both options are mandatory. With them a new listener can bind an address
//! still held by the previous instance. On Linux a reuseport program then
//! sends every new connection to the newest listener, so the old one only
//! has to finish what it already accepted.

use std::io;
use std::net::{AddrParseError, SocketAddr};

use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The configured address is not a socket address.
    #[error("invalid bind address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: AddrParseError,
    },

    /// Failed to create the socket.
    #[error("failed to create socket: {0}")]
    Socket(#[source] io::Error),

    /// A required socket option could not be set.
    #[error("failed to set {option}: {source}")]
    SocketOption {
        option: &'static str,
        #[source]
        source: io::Error,
    },

    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Failed to start listening.
    #[error("failed to listen on {address}: {source}")]
    Listen {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Parse a bind address. A bare `:port` means every IPv4 interface.
pub fn parse_bind_address(address: &str) -> Result<SocketAddr, ListenerError> {
    let normalized = match address.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => address.to_string(),
    };

    normalized
        .parse()
        .map_err(|source| ListenerError::InvalidAddress {
            address: address.to_string(),
            source,
        })
}

/// Bind a listening socket that may share its address with another listener.
///
/// Must be called from within a Tokio runtime.
pub fn bind_reusable(address: &str, backlog: u32) -> Result<TcpListener, ListenerError> {
    let addr = parse_bind_address(address)?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(ListenerError::Socket)?;

    socket
        .set_reuseaddr(true)
        .map_err(|source| ListenerError::SocketOption {
            option: "SO_REUSEADDR",
            source,
        })?;
    socket
        .set_reuseport(true)
        .map_err(|source| ListenerError::SocketOption {
            option: "SO_REUSEPORT",
            source,
        })?;

    socket
        .bind(addr)
        .map_err(|source| ListenerError::Bind {
            address: addr,
            source,
        })?;

    let listener = socket
        .listen(backlog)
        .map_err(|source| ListenerError::Listen {
            address: addr,
            source,
        })?;

    #[cfg(target_os = "linux")]
    if let Err(e) = steer_to_newest(&listener) {
        tracing::warn!(
            address = %addr,
            error = %e,
            "Could not steer new connections to the newest listener"
        );
    }

    tracing::debug!(address = %addr, backlog, "Reusable listener bound");

    Ok(listener)
}

/// `BPF_RET | BPF_K`: return the constant operand.
#[cfg(target_os = "linux")]
const BPF_RET_K: u16 = 0x06;

/// Route every new connection in the address's reuseport group to the socket
/// that joined it last.
///
/// At most two listeners share the address (the serving one and its
/// replacement), so the newest sits at index 1. With a single socket the
/// index is out of range and the kernel falls back to its hash, which can
/// only pick that socket. The retiring listener therefore stops receiving
/// connections as soon as its replacement is listening, and closing it
/// cannot reset anything that arrives later.
///
/// Must run after `listen`: only then has the socket joined the group.
#[cfg(target_os = "linux")]
fn steer_to_newest(listener: &TcpListener) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    let mut filter = [libc::sock_filter {
        code: BPF_RET_K,
        jt: 0,
        jf: 0,
        k: 1,
    }];
    let program = libc::sock_fprog {
        len: filter.len() as libc::c_ushort,
        filter: filter.as_mut_ptr(),
    };

    // SAFETY: `program` points at `filter`, both outlive the call, and the
    // kernel copies the program before returning.
    let result = unsafe {
        libc::setsockopt(
            listener.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_ATTACH_REUSEPORT_CBPF,
            &program as *const libc::sock_fprog as *const libc::c_void,
            std::mem::size_of::<libc::sock_fprog>() as libc::socklen_t,
        )
    };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
