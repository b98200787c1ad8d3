//! Server configuration.
//!
//! Provides a type-safe interface for the listener address, protocol
//! timeouts and the optional behaviors of the connection driver.
//!
//! # Example
//!
//! ```ignore
//! use raw_websocket::ServerOptions;
//!
//! let options = ServerOptions::new()
//!     .with_port(8080)
//!     .with_ping_timeout(Duration::from_secs(10))
//!     .without_visualization();
//!
//! options.validate()?;
//! ```
//!
//! Options also load from JSON; missing fields keep their defaults:
//!
//! ```json
//! { "port": 8080, "ping_timeout_ms": 10000, "visualize_frames": false }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;
use crate::sink::file::DEFAULT_UPLOADS_DIR;

// ============================================================================
// Constants
// ============================================================================

/// Default listening port.
pub const DEFAULT_PORT: u16 = 1337;

/// Default bind address (all interfaces).
pub const DEFAULT_BIND: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

// ============================================================================
// ServerOptions
// ============================================================================

/// Server configuration options.
///
/// Durations are stored in milliseconds so the struct maps one-to-one onto
/// its JSON form; accessor methods return [`Duration`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Address to bind.
    pub bind: IpAddr,

    /// Port to bind (0 for random).
    pub port: u16,

    /// Deadline for each exact-length read inside a frame.
    pub read_timeout_ms: u64,

    /// Deadline for receiving the upgrade request head.
    pub handshake_timeout_ms: u64,

    /// Completion window between fragments of one message.
    pub fragment_timeout_ms: u64,

    /// Period of the liveness check.
    pub liveness_interval_ms: u64,

    /// Idle time before a Ping is sent.
    pub ping_timeout_ms: u64,

    /// Idle time before the connection is closed.
    pub connection_timeout_ms: u64,

    /// Delay between sending Close and shutting the socket down.
    pub close_grace_ms: u64,

    /// Largest accepted frame payload in bytes.
    pub max_payload_size: u64,

    /// Answer client pings with a pong.
    pub reply_to_ping: bool,

    /// Send a diagram of every decoded frame back to the client.
    pub visualize_frames: bool,

    /// Echo single complete data frames back as text.
    pub echo_messages: bool,

    /// Directory for the default file sink.
    pub uploads_dir: PathBuf,
}

// ============================================================================
// Constructors
// ============================================================================

impl ServerOptions {
    /// Creates options with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bind: DEFAULT_BIND,
            port: DEFAULT_PORT,
            read_timeout_ms: 5_000,
            handshake_timeout_ms: 5_000,
            fragment_timeout_ms: 3_000,
            liveness_interval_ms: 5_000,
            ping_timeout_ms: 30_000,
            connection_timeout_ms: 60_000,
            close_grace_ms: 100,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            reply_to_ping: true,
            visualize_frames: true,
            echo_messages: true,
            uploads_dir: PathBuf::from(DEFAULT_UPLOADS_DIR),
        }
    }

    /// Loads options from a JSON file.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::Json`] if it is not valid JSON for these options
    /// - [`Error::Config`] if the loaded values fail validation
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let options: Self = serde_json::from_str(&text)?;
        options.validate()?;
        Ok(options)
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ServerOptions {
    /// Sets the bind address.
    #[inline]
    #[must_use]
    pub fn with_bind(mut self, bind: IpAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Sets the port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the per-read deadline.
    #[inline]
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = millis(timeout);
        self
    }

    /// Sets the upgrade request deadline.
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = millis(timeout);
        self
    }

    /// Sets the delay between sending Close and shutting down.
    #[inline]
    #[must_use]
    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace_ms = millis(grace);
        self
    }

    /// Sets the fragment completion window.
    #[inline]
    #[must_use]
    pub fn with_fragment_timeout(mut self, timeout: Duration) -> Self {
        self.fragment_timeout_ms = millis(timeout);
        self
    }

    /// Sets the idle time before a Ping.
    #[inline]
    #[must_use]
    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout_ms = millis(timeout);
        self
    }

    /// Sets the idle time before closing.
    #[inline]
    #[must_use]
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = millis(timeout);
        self
    }

    /// Sets the liveness check period.
    #[inline]
    #[must_use]
    pub fn with_liveness_interval(mut self, interval: Duration) -> Self {
        self.liveness_interval_ms = millis(interval);
        self
    }

    /// Sets the largest accepted payload.
    #[inline]
    #[must_use]
    pub fn with_max_payload_size(mut self, bytes: u64) -> Self {
        self.max_payload_size = bytes;
        self
    }

    /// Sets the uploads directory.
    #[inline]
    #[must_use]
    pub fn with_uploads_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.uploads_dir = dir.into();
        self
    }

    /// Disables frame diagrams.
    #[inline]
    #[must_use]
    pub fn without_visualization(mut self) -> Self {
        self.visualize_frames = false;
        self
    }

    /// Disables echo replies.
    #[inline]
    #[must_use]
    pub fn without_echo(mut self) -> Self {
        self.echo_messages = false;
        self
    }

    /// Disables automatic pong replies.
    #[inline]
    #[must_use]
    pub fn without_ping_reply(mut self) -> Self {
        self.reply_to_ping = false;
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ServerOptions {
    /// Socket address to bind.
    #[inline]
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Per-read deadline.
    #[inline]
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Handshake deadline.
    #[inline]
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Fragment completion window.
    #[inline]
    #[must_use]
    pub const fn fragment_timeout(&self) -> Duration {
        Duration::from_millis(self.fragment_timeout_ms)
    }

    /// Liveness check period.
    #[inline]
    #[must_use]
    pub const fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }

    /// Idle time before a Ping.
    #[inline]
    #[must_use]
    pub const fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    /// Idle time before closing.
    #[inline]
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Grace delay after sending Close.
    #[inline]
    #[must_use]
    pub const fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a timeout is zero or the ping timeout is
    /// not shorter than the connection timeout.
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("read_timeout_ms", self.read_timeout_ms),
            ("handshake_timeout_ms", self.handshake_timeout_ms),
            ("fragment_timeout_ms", self.fragment_timeout_ms),
            ("liveness_interval_ms", self.liveness_interval_ms),
            ("ping_timeout_ms", self.ping_timeout_ms),
            ("connection_timeout_ms", self.connection_timeout_ms),
            ("close_grace_ms", self.close_grace_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
            return Err(Error::config(format!("{name} must be greater than zero")));
        }

        if self.ping_timeout_ms >= self.connection_timeout_ms {
            return Err(Error::config(
                "ping_timeout_ms must be shorter than connection_timeout_ms",
            ));
        }

        if self.max_payload_size == 0 {
            return Err(Error::config("max_payload_size must be greater than zero"));
        }

        Ok(())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================
