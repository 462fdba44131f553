//! Wire payload helpers.
//!
//! There is no message format beyond raw UTF-8 text: no length prefix, no
//! delimiter, no handshake.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `chunk` | UTF-8 decoding of received chunks |
//! | `timestamp` | Date-stamped payloads sent by the "send data" action |

// ============================================================================
// Submodules
// ============================================================================

/// Chunk decoding.
pub mod chunk;

/// Timestamp payloads.
pub mod timestamp;

// ============================================================================
// Re-exports
// ============================================================================

pub use chunk::decode_chunk;
pub use timestamp::{format_timestamp, parse_timestamp, timestamp_payload};
