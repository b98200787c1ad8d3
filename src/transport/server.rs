//! TCP listener for incoming WebSocket clients.
//!
//! # Connection Flow
//!
//! 1. [`Listener::bind`] binds the configured address (port 0 for random)
//! 2. [`Listener::accept`] yields raw TCP streams
//! 3. The caller runs the opening handshake on each stream
//! 4. Upgraded streams are handed to a [`super::Connection`]

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, trace};

use crate::error::Result;

// ============================================================================
// Listener
// ============================================================================

/// A bound TCP listener.
///
/// # Example
///
/// ```ignore
/// use std::net::{IpAddr, Ipv4Addr};
/// use raw_websocket::transport::Listener;
///
/// let listener = Listener::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await?;
/// println!("listening on {}", listener.ws_url());
///
/// let (stream, peer) = listener.accept().await?;
/// ```
#[derive(Debug)]
pub struct Listener {
    /// Bound socket.
    listener: TcpListener,
    /// Address actually bound, with the OS-assigned port resolved.
    local_addr: SocketAddr,
}

impl Listener {
    /// Binds to `ip:port`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, "Listener bound");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Bound port.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Bound socket address.
    #[inline]
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// URL a local client can connect to.
    ///
    /// A wildcard bind address is reported as `127.0.0.1`.
    #[must_use]
    pub fn ws_url(&self) -> String {
        let ip = match self.local_addr.ip() {
            ip if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            ip => ip,
        };
        format!("ws://{}", SocketAddr::new(ip, self.port()))
    }

    /// Waits for the next TCP client.
    ///
    /// Nagle is disabled on the returned stream so small control frames go
    /// out immediately.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if accepting fails.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        if let Err(e) = stream.set_nodelay(true) {
            trace!(error = %e, "Failed to set TCP_NODELAY");
        }
        debug!(%peer, "TCP connection accepted");
        Ok((stream, peer))
    }
}

// ============================================================================
// Tests
// ============================================================================
