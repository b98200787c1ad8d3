//! WebSocket frame codec (RFC 6455 Section 5.2-5.3).
//!
//! - [`decode_frame`]: Parse one client frame from a [`FrameReader`]
//! - [`encode_frame`]: Build an unmasked server frame
//! - [`encode_masked_frame`]: Build a masked client frame
//! - [`apply_mask`]: Symmetric XOR masking
//!
//! # Wire Layout
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! ```

// ============================================================================
// Imports
// ============================================================================

use tokio::io::AsyncRead;
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::opcode::Opcode;
use super::reader::FrameReader;

// ============================================================================
// Constants
// ============================================================================

/// Largest payload that fits in the 7-bit length field.
pub const MAX_SHORT_PAYLOAD: usize = 125;

/// Largest payload that fits in the 16-bit extended length.
pub const MAX_MEDIUM_PAYLOAD: usize = 65535;

/// Length indicator announcing a 16-bit extended length.
const LEN_16: u8 = 126;

/// Length indicator announcing a 64-bit extended length.
const LEN_64: u8 = 127;

/// Default cap on a single frame's payload (64 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u64 = 64 * 1024 * 1024;

const FIN_BIT: u8 = 0b1000_0000;
const RSV1_BIT: u8 = 0b0100_0000;
const RSV2_BIT: u8 = 0b0010_0000;
const RSV3_BIT: u8 = 0b0001_0000;
const MASK_BIT: u8 = 0b1000_0000;
const LEN_MASK: u8 = 0b0111_1111;

// ============================================================================
// Frame
// ============================================================================

/// One decoded wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment of a message.
    pub fin: bool,
    /// Reserved bit 1.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: Opcode,
    /// Mask bit as received.
    pub masked: bool,
    /// Raw 7-bit length field (0-127).
    pub length_indicator: u8,
    /// Resolved payload length.
    pub payload_length: u64,
    /// Masking key, present only on masked frames.
    pub masking_key: Option<[u8; 4]>,
    /// Unmasked payload.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Returns `true` for close, ping and pong frames.
    #[inline]
    #[must_use]
    pub fn is_control(&self) -> bool {
        self.opcode.is_control()
    }

    /// Returns `true` if the length indicator announced an extended length.
    #[inline]
    #[must_use]
    pub fn has_extended_length(&self) -> bool {
        self.length_indicator >= LEN_16
    }
}

// ============================================================================
// Masking
// ============================================================================

/// Applies or removes the 4-byte XOR mask in place.
///
/// Applying the same key twice restores the input.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Decodes one client frame.
///
/// Consumes exactly the bytes of one frame from `reader`. Each read is
/// bounded by the reader's per-read deadline.
///
/// Unmasked frames are drained from the stream (so the next frame starts at
/// a frame boundary) and reported as [`Error::UnmaskedFrame`]; their payload
/// is never returned.
///
/// # Errors
///
/// - [`Error::UnmaskedFrame`] if the mask bit is clear
/// - [`Error::InvalidLengthMarker`] if the length field is out of range
/// - [`Error::PayloadTooLarge`] if the length exceeds `max_payload`
/// - [`Error::ReadTimeout`] / [`Error::StreamEnded`] from the reader
pub async fn decode_frame<R>(reader: &mut FrameReader<R>, max_payload: u64) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let [first, second] = reader.read_array::<2>().await?;

    let fin = first & FIN_BIT != 0;
    let rsv1 = first & RSV1_BIT != 0;
    let rsv2 = first & RSV2_BIT != 0;
    let rsv3 = first & RSV3_BIT != 0;
    let opcode = Opcode::from_u8(first);

    let masked = second & MASK_BIT != 0;
    let length_indicator = second & LEN_MASK;

    let payload_length = match length_indicator {
        0..=125 => u64::from(length_indicator),
        LEN_16 => u64::from(u16::from_be_bytes(reader.read_array::<2>().await?)),
        LEN_64 => u64::from_be_bytes(reader.read_array::<8>().await?),
        other => return Err(Error::invalid_length_marker(other)),
    };

    if payload_length > max_payload {
        return Err(Error::payload_too_large(payload_length, max_payload));
    }

    if !masked {
        reader.read_exact(payload_length as usize).await?;
        debug!(%opcode, len = payload_length, "Discarded unmasked frame");
        return Err(Error::UnmaskedFrame);
    }

    let masking_key = reader.read_array::<4>().await?;
    let mut payload = reader.read_exact(payload_length as usize).await?;
    apply_mask(&mut payload, masking_key);

    trace!(%opcode, fin, len = payload_length, "Decoded frame");

    Ok(Frame {
        fin,
        rsv1,
        rsv2,
        rsv3,
        opcode,
        masked,
        length_indicator,
        payload_length,
        masking_key: Some(masking_key),
        payload,
    })
}

// ============================================================================
// Encoder
// ============================================================================

/// Returns the header size for a server frame carrying `payload_len` bytes.
///
/// 2 bytes up to 125, 4 bytes up to 65535, 10 bytes beyond.
#[inline]
#[must_use]
pub const fn header_len(payload_len: usize) -> usize {
    if payload_len <= MAX_SHORT_PAYLOAD {
        2
    } else if payload_len <= MAX_MEDIUM_PAYLOAD {
        4
    } else {
        10
    }
}

/// Writes byte 0, byte 1 and the extended length.
fn write_header(out: &mut Vec<u8>, opcode: Opcode, fin: bool, masked: bool, len: usize) {
    let first = if fin { FIN_BIT } else { 0 } | opcode.as_u8();
    let mask = if masked { MASK_BIT } else { 0 };

    out.push(first);
    if len <= MAX_SHORT_PAYLOAD {
        out.push(mask | len as u8);
    } else if len <= MAX_MEDIUM_PAYLOAD {
        out.push(mask | LEN_16);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(mask | LEN_64);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }
}

/// Builds an unmasked server-to-client frame.
#[must_use]
pub fn encode_frame(opcode: Opcode, fin: bool, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(header_len(payload.len()) + payload.len());
    write_header(&mut out, opcode, fin, false, payload.len());
    out.extend_from_slice(payload);
    out
}

/// Builds a masked client-to-server frame.
#[must_use]
pub fn encode_masked_frame(opcode: Opcode, fin: bool, payload: &[u8], key: [u8; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity(header_len(payload.len()) + 4 + payload.len());
    write_header(&mut out, opcode, fin, true, payload.len());
    out.extend_from_slice(&key);
    let start = out.len();
    out.extend_from_slice(payload);
    apply_mask(&mut out[start..], key);
    out
}

/// Final text frame.
#[inline]
#[must_use]
pub fn encode_text(text: &str) -> Vec<u8> {
    encode_frame(Opcode::Text, true, text.as_bytes())
}

/// Empty ping frame.
#[inline]
#[must_use]
pub fn encode_ping() -> Vec<u8> {
    encode_frame(Opcode::Ping, true, &[])
}

/// Pong frame echoing `payload`.
#[inline]
#[must_use]
pub fn encode_pong(payload: &[u8]) -> Vec<u8> {
    encode_frame(Opcode::Pong, true, payload)
}

/// Empty close frame.
#[inline]
#[must_use]
pub fn encode_close() -> Vec<u8> {
    encode_frame(Opcode::Close, true, &[])
}

// ============================================================================
// Tests
// ============================================================================
