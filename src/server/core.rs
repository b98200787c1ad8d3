//! WebSocket server coordinator.
//!
//! The [`Server`] owns the listener, the shared message sink and a registry
//! of live connection tasks. Each accepted socket gets its own task that
//! performs the opening handshake and then runs a
//! [`Connection`](crate::transport::Connection) to completion.
//!
//! # Example
//!
//! ```no_run
//! use raw_websocket::Server;
//!
//! # async fn example() -> raw_websocket::Result<()> {
//! let server = Server::builder().port(1337).build().await?;
//!
//! tokio::select! {
//!     result = server.run() => result?,
//!     _ = tokio::signal::ctrl_c() => server.shutdown().await,
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::net::TcpStream;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error::Result;
use crate::identifiers::{ConnectionId, ConnectionIdGenerator};
use crate::protocol::handshake;
use crate::sink::MessageSink;
use crate::transport::{Connection, Listener};

use super::builder::ServerBuilder;
use super::options::ServerOptions;

// ============================================================================
// Constants
// ============================================================================

/// How long shutdown waits for connections to close before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the server.
struct ServerInner {
    /// Options shared with every connection.
    options: Arc<ServerOptions>,

    /// Destination for reassembled messages.
    sink: Arc<dyn MessageSink>,

    /// Bound listener.
    listener: Listener,

    /// Live connection tasks.
    connections: Mutex<FxHashMap<ConnectionId, JoinHandle<()>>>,

    /// Connection id source.
    ids: ConnectionIdGenerator,

    /// Shutdown flag.
    shutdown: AtomicBool,

    /// Wakes the accept loop on shutdown.
    shutdown_signal: Notify,

    /// Tells live connections to close.
    closing: watch::Sender<bool>,
}

// ============================================================================
// Server
// ============================================================================

/// A bound WebSocket server.
///
/// Cheap to clone; clones share the same listener and registry.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

// ============================================================================
// Server - Display
// ============================================================================

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr())
            .field("connection_count", &self.connection_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Server - Public API
// ============================================================================

impl Server {
    /// Creates a configuration builder for the server.
    #[inline]
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Bound port.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.listener.port()
    }

    /// Bound socket address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.listener.local_addr()
    }

    /// URL a local client can connect to.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        self.inner.listener.ws_url()
    }

    /// Options in effect.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ServerOptions {
        &self.inner.options
    }

    /// Number of connection tasks still running.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().len()
    }

    /// Accepts clients until [`Server::shutdown`] is called.
    ///
    /// Accept failures are logged and the loop keeps going.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok(())`.
    pub async fn run(&self) -> Result<()> {
        info!(url = %self.ws_url(), "WebSocket server is running");

        loop {
            if self.inner.shutdown.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                () = self.inner.shutdown_signal.notified() => break,

                accepted = self.inner.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) => error!(error = %e, "Accept failed"),
                },
            }
        }

        debug!("Accept loop terminated");
        Ok(())
    }

    /// Stops the accept loop and closes every live connection.
    ///
    /// Each connection sends Close and delivers any unfinished message as
    /// partial. Connections still running after a short grace period, such
    /// as those stuck in the handshake, are aborted.
    pub async fn shutdown(&self) {
        info!("Server shutting down");

        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.shutdown_signal.notify_one();
        self.inner.closing.send_replace(true);

        let connections: Vec<_> = {
            let mut map = self.inner.connections.lock();
            map.drain().collect()
        };

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        for (id, mut handle) in connections {
            if timeout_at(deadline, &mut handle).await.is_err() {
                handle.abort();
                warn!(conn = %id, "Connection did not close in time, aborted");
            }
        }

        info!("Server shutdown complete");
    }
}

// ============================================================================
// Server - Internal API
// ============================================================================

impl Server {
    /// Binds the listener.
    pub(crate) async fn bind(options: ServerOptions, sink: Arc<dyn MessageSink>) -> Result<Self> {
        let listener = Listener::bind(options.bind, options.port).await?;

        let inner = Arc::new(ServerInner {
            options: Arc::new(options),
            sink,
            listener,
            connections: Mutex::new(FxHashMap::default()),
            ids: ConnectionIdGenerator::new(),
            shutdown: AtomicBool::new(false),
            shutdown_signal: Notify::new(),
            closing: watch::Sender::new(false),
        });

        debug!(addr = %inner.listener.local_addr(), "Server bound");

        Ok(Self { inner })
    }

    /// Spawns the task serving one accepted socket.
    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let id = self.inner.ids.next_id();
        let span = info_span!("connection", conn = %id, %peer);
        let inner = Arc::clone(&self.inner);

        // Registered under the lock so the task's own removal always follows.
        let mut connections = self.inner.connections.lock();
        let task = tokio::spawn(
            async move {
                serve(&inner, id, stream).await;
                inner.connections.lock().remove(&id);
            }
            .instrument(span),
        );
        connections.insert(id, task);
    }
}

/// Runs the handshake and then the frame loop for one socket.
async fn serve(inner: &ServerInner, id: ConnectionId, mut stream: TcpStream) {
    let buffered = match handshake::accept(&mut stream, inner.options.handshake_timeout()).await {
        Ok(buffered) => buffered,
        Err(e) if e.is_handshake_error() => {
            warn!(error = %e, "Upgrade rejected, dropping socket");
            return;
        }
        Err(e) => {
            debug!(error = %e, "Handshake did not complete, dropping socket");
            return;
        }
    };

    info!("WebSocket connection established");

    let connection = Connection::new(
        id,
        stream,
        buffered,
        Arc::clone(&inner.options),
        Arc::clone(&inner.sink),
    )
    .with_shutdown(inner.closing.subscribe());

    if let Ok(reason) = connection.run().await {
        info!(?reason, "Connection closed");
    }
}

// ============================================================================
// Tests
// ============================================================================
