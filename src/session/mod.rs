//! Per-connection protocol state.
//!
//! Everything in this module is owned by exactly one connection task and
//! never shared: the reassembler, the liveness monitor, and the control
//! frame decisions that feed the connection driver.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `control` | Close/ping/pong decisions and the close sequence |
//! | `fragment` | Fragmentation reassembly state machine |
//! | `liveness` | Idle ping and idle timeout policy |
//! | `message` | Reassembled messages |

// ============================================================================
// Submodules
// ============================================================================

/// Control-frame handling.
pub mod control;

/// Fragmentation reassembly.
pub mod fragment;

/// Idle detection.
pub mod liveness;

/// Reassembled messages.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use control::{ControlAction, close_connection, handle_control};
pub use fragment::{FragmentationState, Reassembler};
pub use liveness::{LivenessAction, LivenessMonitor};
pub use message::{Message, MessageKind};
