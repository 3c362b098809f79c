//! Core constants for the Aquatron instrument protocol.
//!
//! This module defines the protocol-level constants shared by the codec,
//! the transport adapters and the device link. Keeping them in one place
//! ensures every layer agrees on framing and timing.
//!
//! # Frame Structure
//!
//! Every message on every transport uses the same binary frame:
//!
//! ```text
//! AA  <cmd>  <len>  <payload: len bytes>  <checksum>  55
//! ^^                                                  ^^
//! header                                              end byte
//! ```
//!
//! The checksum is the XOR of the header, command, length and payload bytes.
//!
//! # Usage
//!
//! ```
//! use aquatron_core::constants::*;
//!
//! assert_eq!(FRAME_OVERHEAD + MAX_PAYLOAD_LEN, MAX_FRAME_LEN);
//!
//! let checksum = PACKET_HEADER ^ 0x02 ^ 0x00;
//! assert_eq!(checksum, 0xA8);
//! ```

// ============================================================================
// Frame Layout
// ============================================================================

/// First byte of every frame.
pub const PACKET_HEADER: u8 = 0xAA;

/// Last byte of every frame.
pub const PACKET_END: u8 = 0x55;

/// Maximum payload carried by a single frame.
pub const MAX_PAYLOAD_LEN: usize = 64;

/// Bytes surrounding the payload: header, cmd, len, checksum, end.
pub const FRAME_OVERHEAD: usize = 5;

/// Bytes before the payload: header, cmd, len.
pub const FRAME_PREFIX_LEN: usize = 3;

/// Largest possible frame on the wire.
pub const MAX_FRAME_LEN: usize = FRAME_OVERHEAD + MAX_PAYLOAD_LEN;

// ============================================================================
// Payload Constraints
// ============================================================================

/// Minimum number of elements in a SW-parameters command.
pub const MIN_ELEMENTS: usize = 1;

/// Maximum number of elements in a SW-parameters command.
pub const MAX_ELEMENTS: usize = 30;

/// Bytes per element entry in a SW-parameters payload.
pub const SW_ELEMENT_LEN: usize = 4;

/// Bytes per vout-table entry in a settings payload.
pub const VOUT_ENTRY_LEN: usize = 11;

/// Header bytes of an outbound (set) settings payload.
pub const SETTINGS_HEADER_LEN: usize = 8;

/// Header bytes of an inbound (report) settings payload.
///
/// Two bytes longer than the outbound header: the device inserts the
/// feedback enable flag and tolerance between `hptf` and `harmonic`.
pub const SETTINGS_REPORT_HEADER_LEN: usize = 10;

/// Exact size of a feedback-info payload.
pub const FEEDBACK_INFO_LEN: usize = 47;

// ============================================================================
// Timing Defaults (milliseconds)
// ============================================================================

/// Timeout for a bare status probe.
pub const DEFAULT_STATUS_PROBE_TIMEOUT_MS: u64 = 2000;

/// Timeout for an explicit device-ready request.
pub const DEFAULT_READY_REQUEST_TIMEOUT_MS: u64 = 3000;

/// Timeout for the ready signal following a delivery command.
pub const DEFAULT_COMMAND_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for a settings request.
pub const DEFAULT_SETTINGS_TIMEOUT_MS: u64 = 3000;

/// Timeout for a feedback-info request.
pub const DEFAULT_FEEDBACK_TIMEOUT_MS: u64 = 3000;

/// Pause between the ready probe and the delivery command.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

/// Backoff before a network transport reconnects.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2000;

/// Connect timeout for the TCP transport.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;

/// WebSocket keepalive ping interval.
pub const DEFAULT_WS_PING_INTERVAL_MS: u64 = 15_000;

/// WebSocket pong deadline before the connection is force-closed.
pub const DEFAULT_WS_PONG_TIMEOUT_MS: u64 = 30_000;

// ============================================================================
// Transport Defaults
// ============================================================================

/// Default serial baud rate.
pub const DEFAULT_SERIAL_BAUD: u32 = 115_200;

/// Capacity of the device event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Capacity of the adapter-to-dispatcher channel.
pub const TRANSPORT_EVENT_CAPACITY: usize = 100;
