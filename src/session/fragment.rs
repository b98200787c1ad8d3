//! Fragmentation reassembly (RFC 6455 Section 5.4).
//!
//! # State Machine
//!
//! ```text
//!            FIN=0 Text|Binary
//!   Idle ───────────────────────► Accumulating ──┐ FIN=0 Continuation
//!    ▲                              │    ▲       │ (append, re-arm)
//!    │  FIN=1 Continuation (emit)   │    └───────┘
//!    ├──────────────────────────────┤
//!    │  deadline passed (emit partial)
//!    └──────────────────────────────┘
//! ```
//!
//! A complete single frame (FIN=1 Text|Binary) is emitted directly and never
//! touches the state.
//!
//! # Completion Deadline
//!
//! RFC 6455 requires a fragment sequence to complete and defines no timeout.
//! This reassembler adds one: if no fragment arrives within the window, the
//! bytes received so far are emitted as a partial [`Message`]. The trade is
//! bounded memory and liveness against strict reassembly.

// ============================================================================
// Imports
// ============================================================================

use std::mem;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{Frame, Opcode};

use super::message::{Message, MessageKind};

// ============================================================================
// Constants
// ============================================================================

/// Default completion window between fragments (3s).
pub const DEFAULT_FRAGMENT_TIMEOUT: Duration = Duration::from_millis(3000);

// ============================================================================
// FragmentationState
// ============================================================================

/// Per-connection fragmentation state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FragmentationState {
    /// No fragmented message open.
    #[default]
    Idle,
    /// A fragmented message is being collected.
    Accumulating {
        /// Kind from the first fragment's opcode.
        kind: MessageKind,
        /// Payloads received so far, in order.
        payloads: Vec<Vec<u8>>,
        /// When the open message is force-flushed.
        deadline: Instant,
    },
}

// ============================================================================
// Reassembler
// ============================================================================

/// Turns a sequence of data frames into [`Message`]s.
#[derive(Debug)]
pub struct Reassembler {
    state: FragmentationState,
    timeout: Duration,
}

impl Reassembler {
    /// Creates an idle reassembler with the given completion window.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: FragmentationState::Idle,
            timeout,
        }
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> &FragmentationState {
        &self.state
    }

    /// Returns `true` if no message is open.
    #[inline]
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self.state, FragmentationState::Idle)
    }

    /// Deadline of the open message, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            FragmentationState::Idle => None,
            FragmentationState::Accumulating { deadline, .. } => Some(*deadline),
        }
    }

    /// Feeds one data frame received at `now`.
    ///
    /// Returns a message when one completes. Control and reserved opcodes
    /// are ignored and return `Ok(None)`.
    ///
    /// A new fragmented message starting while another is open flushes the
    /// open one as a partial message.
    ///
    /// # Errors
    ///
    /// - [`Error::UnmaskedFrame`] if the frame was not masked
    /// - [`Error::UnexpectedContinuation`] if a continuation arrives while idle
    pub fn push(&mut self, frame: Frame, now: Instant) -> Result<Option<Message>> {
        if !frame.masked {
            return Err(Error::UnmaskedFrame);
        }

        match (frame.opcode, frame.fin) {
            (Opcode::Text | Opcode::Binary, true) => {
                let Some(kind) = MessageKind::from_opcode(frame.opcode) else {
                    return Ok(None);
                };
                Ok(Some(Message::single(kind, frame.payload)))
            }

            (Opcode::Text | Opcode::Binary, false) => {
                let Some(kind) = MessageKind::from_opcode(frame.opcode) else {
                    return Ok(None);
                };
                let stale = self.take_partial();
                if stale.is_some() {
                    warn!("New fragmented message started before the previous one finished");
                }

                debug!(%kind, "Fragmented message started");
                self.state = FragmentationState::Accumulating {
                    kind,
                    payloads: vec![frame.payload],
                    deadline: now + self.timeout,
                };
                Ok(stale)
            }

            (Opcode::Continuation, fin) => {
                let timeout = self.timeout;
                let FragmentationState::Accumulating {
                    payloads, deadline, ..
                } = &mut self.state
                else {
                    return Err(Error::UnexpectedContinuation);
                };

                payloads.push(frame.payload);
                if !fin {
                    *deadline = now + timeout;
                    return Ok(None);
                }

                match mem::take(&mut self.state) {
                    FragmentationState::Accumulating { kind, payloads, .. } => {
                        debug!(%kind, fragments = payloads.len(), "Fragmented message complete");
                        Ok(Some(Message::new(kind, payloads)))
                    }
                    FragmentationState::Idle => Ok(None),
                }
            }

            _ => Ok(None),
        }
    }

    /// Flushes the open message if its deadline has passed at `now`.
    pub fn expire(&mut self, now: Instant) -> Option<Message> {
        match self.deadline() {
            Some(deadline) if now >= deadline => self.take_partial(),
            _ => None,
        }
    }

    /// Flushes any open message regardless of deadline.
    ///
    /// Used on connection teardown.
    pub fn flush(&mut self) -> Option<Message> {
        self.take_partial()
    }

    fn take_partial(&mut self) -> Option<Message> {
        match mem::take(&mut self.state) {
            FragmentationState::Idle => None,
            FragmentationState::Accumulating { kind, payloads, .. } => {
                Some(Message::partial(kind, payloads))
            }
        }
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_FRAGMENT_TIMEOUT)
    }
}

// ============================================================================
// Tests
// ============================================================================
