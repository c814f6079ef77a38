//! Error types for MK312 frame building and parsing

use thiserror::Error;

/// Errors that can occur while building or validating protocol frames
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Trailing checksum byte does not match the sum of the preceding bytes
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// Reply opcode differs from the one the request calls for
    #[error("unexpected reply: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedReply { expected: u8, actual: u8 },

    /// Single-byte acknowledgement was not OK
    #[error("invalid reply byte: 0x{0:02X}")]
    InvalidReply(u8),

    /// Write payload exceeds what a single poke frame may carry
    #[error("too many bytes for one write: {len} (max {max})")]
    TooManyBytes { len: usize, max: usize },

    /// Byte does not start any known request
    #[error("unknown request opcode: 0x{0:02X}")]
    UnknownRequest(u8),

    /// Buffer is not the length the frame type requires
    #[error("frame length: expected {expected} bytes, got {actual}")]
    FrameLength { expected: usize, actual: usize },
}
