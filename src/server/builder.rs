//! Builder pattern for server configuration.
//!
//! # Example
//!
//! ```no_run
//! use raw_websocket::Server;
//!
//! # async fn example() -> raw_websocket::Result<()> {
//! let server = Server::builder()
//!     .port(8080)
//!     .uploads_dir("/tmp/uploads")
//!     .visualize(false)
//!     .build()
//!     .await?;
//!
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::sink::{FileSink, MessageSink};

use super::core::Server;
use super::options::ServerOptions;

// ============================================================================
// ServerBuilder
// ============================================================================

/// Builder for configuring a [`Server`] instance.
///
/// Use [`Server::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct ServerBuilder {
    /// Options applied to every connection.
    options: ServerOptions,
    /// Message destination; a [`FileSink`] on the uploads directory if unset.
    sink: Option<Arc<dyn MessageSink>>,
}

impl fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("options", &self.options)
            .field("custom_sink", &self.sink.is_some())
            .finish()
    }
}

// ============================================================================
// ServerBuilder Implementation
// ============================================================================

impl ServerBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the bind address.
    #[inline]
    #[must_use]
    pub fn bind(mut self, ip: IpAddr) -> Self {
        self.options.bind = ip;
        self
    }

    /// Sets the port (0 for random).
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.options.port = port;
        self
    }

    /// Sets the directory used by the default file sink.
    #[inline]
    #[must_use]
    pub fn uploads_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.uploads_dir = dir.into();
        self
    }

    /// Enables or disables frame diagrams.
    #[inline]
    #[must_use]
    pub fn visualize(mut self, enabled: bool) -> Self {
        self.options.visualize_frames = enabled;
        self
    }

    /// Enables or disables echo replies.
    #[inline]
    #[must_use]
    pub fn echo(mut self, enabled: bool) -> Self {
        self.options.echo_messages = enabled;
        self
    }

    /// Enables or disables pong replies to client pings.
    #[inline]
    #[must_use]
    pub fn reply_to_ping(mut self, enabled: bool) -> Self {
        self.options.reply_to_ping = enabled;
        self
    }

    /// Sets a custom message sink.
    #[inline]
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validates the options and binds the listener.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Config`] if the options are invalid
    /// - [`crate::Error::Io`] if binding fails
    pub async fn build(self) -> Result<Server> {
        self.options.validate()?;

        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(FileSink::new(self.options.uploads_dir.clone())));

        Server::bind(self.options, sink).await
    }
}

// ============================================================================
// Tests
// ============================================================================
