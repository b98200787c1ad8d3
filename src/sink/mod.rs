//! Destinations for reassembled messages.
//!
//! The connection driver hands every completed (or force-flushed) message
//! to a [`MessageSink`]. Sink failures are logged by the driver and never
//! affect protocol state.
//!
//! # Implementations
//!
//! | Type | Description |
//! |------|-------------|
//! | [`FileSink`] | Writes each message to a timestamped file |
//! | [`MemorySink`] | Collects messages in memory |

// ============================================================================
// Submodules
// ============================================================================

/// File-backed sink.
pub mod file;

/// Magic-number file type detection.
pub mod sniff;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::session::Message;

// ============================================================================
// Re-exports
// ============================================================================

pub use file::FileSink;
pub use sniff::detect_extension;

// ============================================================================
// MessageSink
// ============================================================================

/// Receives reassembled messages.
///
/// Shared by all connections of a server, so implementations must be
/// `Send + Sync` and must not keep per-connection state.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Stores one message.
    ///
    /// # Errors
    ///
    /// Implementation-defined; the caller logs and continues.
    async fn persist(&self, message: &Message) -> Result<()>;
}

#[async_trait]
impl<T: MessageSink + ?Sized> MessageSink for Arc<T> {
    async fn persist(&self, message: &Message) -> Result<()> {
        (**self).persist(message).await
    }
}

// ============================================================================
// MemorySink
// ============================================================================

/// Sink that keeps every message in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<Message>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the stored messages.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Removes and returns the stored messages.
    pub fn take(&self) -> Vec<Message> {
        std::mem::take(&mut *self.messages.lock())
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Returns `true` if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn persist(&self, message: &Message) -> Result<()> {
        self.messages.lock().push(message.clone());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
