//! Error types for the WebSocket server.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use raw_websocket::{Result, Error};
//!
//! async fn example(reader: &mut FrameReader<TcpStream>) -> Result<()> {
//!     let frame = decode_frame(reader, MAX_PAYLOAD_SIZE).await?;
//!     println!("{:?}", frame.opcode);
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Effect on the connection |
//! |----------|----------|--------------------------|
//! | Configuration | [`Error::Config`] | Server refuses to start |
//! | Handshake | [`Error::MissingKey`], [`Error::Handshake`] | Upgrade rejected, socket destroyed |
//! | Protocol violation | [`Error::UnmaskedFrame`], [`Error::InvalidLengthMarker`], [`Error::UnexpectedContinuation`] | Frame discarded, connection stays open |
//! | Transport | [`Error::ReadTimeout`], [`Error::StreamEnded`], [`Error::PayloadTooLarge`], [`Error::ConnectionClosed`] | Connection torn down |
//! | External | [`Error::Io`], [`Error::Json`] | Depends on caller |
//!
//! An unmasked frame only becomes [`Error::UnmaskedFrame`] after its payload
//! has been drained. One whose declared length exceeds the payload cap fails
//! with [`Error::PayloadTooLarge`] instead, and one whose payload stalls fails
//! with [`Error::ReadTimeout`]. Both of those are fatal.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when server options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// Upgrade request carried no `Sec-WebSocket-Key` header.
    #[error("Handshake failed: missing Sec-WebSocket-Key header")]
    MissingKey,

    /// Upgrade request could not be read or was not a WebSocket upgrade.
    #[error("Handshake failed: {message}")]
    Handshake {
        /// Description of the handshake failure.
        message: String,
    },

    // ========================================================================
    // Protocol Violations
    // ========================================================================
    /// Client sent a frame without the mask bit set.
    ///
    /// The frame is discarded; the connection stays open.
    #[error("Protocol violation: unmasked client frame")]
    UnmaskedFrame,

    /// The 7-bit length field held a value outside `0..=127`.
    #[error("Protocol violation: invalid payload length marker {indicator}")]
    InvalidLengthMarker {
        /// The offending length indicator.
        indicator: u8,
    },

    /// A continuation frame arrived with no fragmented message open.
    #[error("Protocol violation: continuation frame without an open message")]
    UnexpectedContinuation,

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// A read did not complete before its deadline.
    #[error("Read timeout after {timeout_ms}ms")]
    ReadTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The transport reached end-of-stream before enough bytes arrived.
    #[error("Stream ended before enough bytes could be read")]
    StreamEnded,

    /// Declared payload length exceeds the configured maximum.
    #[error("Payload length {length} exceeds maximum {max}")]
    PayloadTooLarge {
        /// Declared payload length.
        length: u64,
        /// Configured maximum.
        max: u64,
    },

    /// Peer went away while a frame was being written.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates a read timeout error.
    #[inline]
    pub fn read_timeout(timeout_ms: u64) -> Self {
        Self::ReadTimeout { timeout_ms }
    }

    /// Creates an invalid length marker error.
    #[inline]
    pub fn invalid_length_marker(indicator: u8) -> Self {
        Self::InvalidLengthMarker { indicator }
    }

    /// Creates a payload too large error.
    #[inline]
    pub fn payload_too_large(length: u64, max: u64) -> Self {
        Self::PayloadTooLarge { length, max }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ReadTimeout { .. })
    }

    /// Returns `true` if this is a handshake error.
    #[inline]
    #[must_use]
    pub fn is_handshake_error(&self) -> bool {
        matches!(self, Self::MissingKey | Self::Handshake { .. })
    }

    /// Returns `true` if the error is a protocol violation.
    ///
    /// Protocol violations discard the offending frame but leave the
    /// connection open.
    #[inline]
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::UnmaskedFrame | Self::InvalidLengthMarker { .. } | Self::UnexpectedContinuation
        )
    }

    /// Returns `true` if the connection must be torn down.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.is_protocol_violation()
    }
}

// ============================================================================
// Tests
// ============================================================================
