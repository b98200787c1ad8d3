//! Control-frame handling (RFC 6455 Section 5.5).
//!
//! [`handle_control`] decides what a control frame requires;
//! [`close_connection`] runs the server side of the close sequence.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::error::Result;
use crate::protocol::{Frame, Opcode, encode_close};

// ============================================================================
// Constants
// ============================================================================

/// Delay between sending Close and shutting the socket down (100ms).
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_millis(100);

/// Status reported when a close frame carries no code (RFC 6455 Section 7.1.5).
pub const NO_STATUS_RECEIVED: u16 = 1005;

// ============================================================================
// ControlAction
// ============================================================================

/// What the connection must do in response to a control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    /// Nothing beyond recording activity.
    None,
    /// Reply with a pong carrying this payload.
    Pong(Vec<u8>),
    /// Run the close sequence and stop processing frames.
    Close,
}

/// Decides the response to a control frame.
///
/// Non-control frames yield [`ControlAction::None`]. Pings are answered only
/// when `reply_to_ping` is set.
#[must_use]
pub fn handle_control(frame: &Frame, reply_to_ping: bool) -> ControlAction {
    match frame.opcode {
        Opcode::Close => {
            let (code, reason) = parse_close_payload(&frame.payload);
            info!(code, reason = %reason, "Close frame received");
            ControlAction::Close
        }
        Opcode::Ping if reply_to_ping => {
            debug!(len = frame.payload.len(), "Ping received, replying");
            ControlAction::Pong(frame.payload.clone())
        }
        Opcode::Ping => {
            debug!(len = frame.payload.len(), "Ping received, reply disabled");
            ControlAction::None
        }
        Opcode::Pong => {
            debug!("Pong received");
            ControlAction::None
        }
        _ => ControlAction::None,
    }
}

/// Splits a close payload into status code and reason.
///
/// Payloads shorter than two bytes report [`NO_STATUS_RECEIVED`].
#[must_use]
pub fn parse_close_payload(payload: &[u8]) -> (u16, String) {
    match payload {
        [high, low, reason @ ..] => (
            u16::from_be_bytes([*high, *low]),
            String::from_utf8_lossy(reason).into_owned(),
        ),
        _ => (NO_STATUS_RECEIVED, String::new()),
    }
}

// ============================================================================
// Close Sequence
// ============================================================================

/// Sends an empty Close frame, waits `grace`, then shuts the writer down.
///
/// The grace delay lets the frame reach the peer before the FIN.
///
/// # Errors
///
/// Returns [`crate::Error::Io`] if the close frame cannot be written.
pub async fn close_connection<W>(writer: &mut W, grace: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_close()).await?;
    writer.flush().await?;
    debug!("Close frame sent");

    tokio::time::sleep(grace).await;

    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "Shutdown after close failed");
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
