//! ASCII frame diagrams.
//!
//! Renders a decoded [`Frame`] in the layout of the RFC 6455 base framing
//! diagram. The connection driver sends the result back to the client as a
//! text frame prefixed with [`VISUALIZATION_PREFIX`], purely for display.

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Write as _;

use crate::protocol::Frame;

// ============================================================================
// Constants
// ============================================================================

/// Prefix marking a visualization text frame.
pub const VISUALIZATION_PREFIX: &str = "FRAME_VISUALIZATION:";

/// Payload bytes shown in the preview row.
const PAYLOAD_PREVIEW: usize = 16;

/// Width between the outer `|` borders.
const INNER_WIDTH: usize = 63;

const RULER_TENS: &str = " 0                   1                   2                   3";
const RULER_UNITS: &str = " 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1";
const HEADER_TOP: &str = "+-+-+-+-+-------+-+-------------+-------------------------------+";
const HEADER_BOTTOM: &str = "+-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +";
const LABELS: [&str; 4] = [
    "|F|R|R|R| opcode|M| Payload len |                               |",
    "|I|S|S|S|       |A|             |                               |",
    "|N|V|V|V|       |S|             |                               |",
    "| |1|2|3|       |K|             |                               |",
];

// ============================================================================
// Rendering
// ============================================================================

/// Renders `frame` as a multi-line diagram.
#[must_use]
pub fn render_frame(frame: &Frame) -> String {
    let mut lines = vec![
        RULER_TENS.to_string(),
        RULER_UNITS.to_string(),
        HEADER_TOP.to_string(),
        format!(
            "|{}|{}|{}|{}|  {:04b} |{}|   {:07b}   |{:31}|",
            bit(frame.fin),
            bit(frame.rsv1),
            bit(frame.rsv2),
            bit(frame.rsv3),
            frame.opcode.as_u8(),
            bit(frame.masked),
            frame.length_indicator,
            ""
        ),
    ];
    lines.extend(LABELS.iter().map(|line| (*line).to_string()));
    lines.push(HEADER_BOTTOM.to_string());

    if frame.has_extended_length() {
        lines.push(row(&format!("Extended payload length: {}", frame.payload_length)));
        lines.push(rule());
    }

    if let Some(key) = frame.masking_key {
        lines.push(row(&format!("Masking key: {}", hex(&key))));
        lines.push(rule());
    }

    if frame.payload.is_empty() {
        lines.push(row("No payload"));
    } else {
        let shown = frame.payload.len().min(PAYLOAD_PREVIEW);
        let more = if frame.payload.len() > shown { " ..." } else { "" };
        lines.push(row(&format!(
            "Payload data: {}{more}",
            hex(&frame.payload[..shown])
        )));
    }
    lines.push(rule());
    lines.push(format!(" Opcode: {}  Payload length: {}", frame.opcode, frame.payload_length));

    lines.join("\n")
}

/// Renders `frame` with [`VISUALIZATION_PREFIX`] prepended.
#[must_use]
pub fn visualization_message(frame: &Frame) -> String {
    format!("{VISUALIZATION_PREFIX}{}", render_frame(frame))
}

fn bit(set: bool) -> char {
    if set { '1' } else { '0' }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn row(content: &str) -> String {
    let clipped: String = content.chars().take(INNER_WIDTH - 2).collect();
    format!("| {clipped:<width$} |", width = INNER_WIDTH - 2)
}

fn rule() -> String {
    format!("+{}+", "-".repeat(INNER_WIDTH))
}

// ============================================================================
// Tests
// ============================================================================
