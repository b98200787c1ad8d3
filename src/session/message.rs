//! Reassembled application messages.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::protocol::Opcode;

// ============================================================================
// MessageKind
// ============================================================================

/// Kind of a data message, taken from its first frame's opcode.
///
/// Serializes as `"text"` / `"binary"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Opcode 0x1.
    Text,
    /// Opcode 0x2.
    Binary,
}

impl MessageKind {
    /// Maps a data opcode to a kind. Continuation and control opcodes have none.
    #[must_use]
    pub const fn from_opcode(opcode: Opcode) -> Option<Self> {
        match opcode {
            Opcode::Text => Some(Self::Text),
            Opcode::Binary => Some(Self::Binary),
            _ => None,
        }
    }

    /// Returns `"text"` or `"binary"`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Binary => "binary",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Message
// ============================================================================

/// One logical message handed to the persistence sink.
///
/// Keeps the fragment payloads in arrival order; [`Message::bytes`]
/// concatenates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Text or binary.
    pub kind: MessageKind,
    /// Fragment payloads in arrival order.
    pub payloads: Vec<Vec<u8>>,
    /// `true` if flushed before the final fragment arrived.
    pub partial: bool,
}

impl Message {
    /// Creates a complete message from fragment payloads.
    #[must_use]
    pub fn new(kind: MessageKind, payloads: Vec<Vec<u8>>) -> Self {
        Self {
            kind,
            payloads,
            partial: false,
        }
    }

    /// Creates a complete message from a single unfragmented frame.
    #[must_use]
    pub fn single(kind: MessageKind, payload: Vec<u8>) -> Self {
        Self::new(kind, vec![payload])
    }

    /// Creates a best-effort message from an unfinished fragment sequence.
    #[must_use]
    pub fn partial(kind: MessageKind, payloads: Vec<Vec<u8>>) -> Self {
        Self {
            kind,
            payloads,
            partial: true,
        }
    }

    /// Concatenated payload bytes.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.payloads.concat()
    }

    /// Total payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payloads.iter().map(Vec::len).sum()
    }

    /// Returns `true` if the message carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of frames the message was assembled from.
    #[inline]
    #[must_use]
    pub fn fragments(&self) -> usize {
        self.payloads.len()
    }

    /// Payload decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }
}

// ============================================================================
// Tests
// ============================================================================
