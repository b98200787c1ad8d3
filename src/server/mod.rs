//! Server entry point.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Server`] | Accept loop and connection registry |
//! | [`ServerBuilder`] | Fluent configuration builder |
//! | [`ServerOptions`] | Listener address, timeouts and behavior toggles |
//!
//! # Example
//!
//! ```no_run
//! use raw_websocket::{Result, Server};
//!
//! # async fn example() -> Result<()> {
//! let server = Server::builder()
//!     .port(1337)
//!     .uploads_dir("./uploads")
//!     .build()
//!     .await?;
//!
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for server configuration.
pub mod builder;

/// Core server implementation.
pub mod core;

/// Server options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ServerBuilder;
pub use core::Server;
pub use options::ServerOptions;
