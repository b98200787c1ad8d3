//! raw-websocket - RFC 6455 WebSocket server over raw TCP.
//!
//! Implements the opening handshake, frame codec, fragmentation
//! reassembly, control frames and an idle-connection monitor directly on
//! top of `tokio` sockets, without a WebSocket library.
//!
//! # Architecture
//!
//! The server follows a task-per-connection model:
//!
//! - **Listener**: accepts TCP clients and spawns one task each
//! - **Connection**: performs the handshake, then decodes frames in order
//!
//! Key design principles:
//!
//! - Each connection owns its read buffer, reassembly state and timers
//! - Reads inside a frame are bounded by a deadline; idle waits are not
//! - Completed messages go to a pluggable [`MessageSink`]
//!
//! # Quick Start
//!
//! ```no_run
//! use raw_websocket::{Result, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let server = Server::builder()
//!         .port(1337)
//!         .build()
//!         .await?;
//!
//!     println!("Listening on {}", server.ws_url());
//!     server.run().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Connection ids |
//! | [`protocol`] | Handshake and frame codec |
//! | [`server`] | Server, builder and options |
//! | [`session`] | Per-connection protocol state |
//! | [`sink`] | Message destinations |
//! | [`transport`] | Listener and connection loop |
//! | [`visualize`] | ASCII frame diagrams |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// RFC 6455 wire protocol: opening handshake and frame codec.
pub mod protocol;

/// Server entry point and configuration.
///
/// Use [`Server::builder()`] to create a configured server.
pub mod server;

/// Per-connection protocol state: reassembly, control frames, liveness.
pub mod session;

/// Destinations for reassembled messages.
pub mod sink;

/// TCP listener and per-connection frame loop.
pub mod transport;

/// ASCII frame diagrams.
pub mod visualize;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::ConnectionId;

// Protocol types
pub use protocol::{Frame, Opcode};

// Server types
pub use server::{Server, ServerBuilder, ServerOptions};

// Session types
pub use session::{Message, MessageKind};

// Sink types
pub use sink::{FileSink, MemorySink, MessageSink};

// Transport types
pub use transport::{Connection, Disconnect};
