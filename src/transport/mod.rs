//! Network side of the server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Client         │          TCP :1337           │  Listener       │
//! │                 │─────────────────────────────►│   accept        │
//! │                 │   HTTP Upgrade / 101         │   handshake     │
//! │                 │◄────────────────────────────►│  Connection     │
//! │                 │      WebSocket frames        │   frame loop    │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Per-connection frame loop |
//! | `server` | TCP binding and acceptance |

// ============================================================================
// Submodules
// ============================================================================

/// Per-connection frame loop.
pub mod connection;

/// TCP listener.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, Disconnect, ECHO_PREFIX};
pub use server::Listener;
