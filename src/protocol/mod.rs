//! RFC 6455 wire protocol.
//!
//! Everything that touches bytes on the wire lives here: the upgrade
//! handshake, the frame decoder and encoder, and the buffered reader they
//! share.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Frame type, decoder and encoder |
//! | `handshake` | HTTP upgrade and `Sec-WebSocket-Accept` |
//! | `opcode` | Opcode enum |
//! | `reader` | Buffered reads with per-read deadlines |

// ============================================================================
// Submodules
// ============================================================================

/// Frame type, decoder and encoder.
pub mod frame;

/// HTTP upgrade handshake.
pub mod handshake;

/// Frame opcodes.
pub mod opcode;

/// Buffered exact-length reads.
pub mod reader;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{
    DEFAULT_MAX_PAYLOAD_SIZE, Frame, apply_mask, decode_frame, encode_close, encode_frame,
    encode_masked_frame, encode_ping, encode_pong, encode_text, header_len,
};
pub use handshake::{UpgradeRequest, accept_key};
pub use opcode::Opcode;
pub use reader::FrameReader;
