//! Request opcodes and reply bytes understood by the box firmware
//!
//! These values are fixed by the firmware and must match exactly for the
//! host to interoperate with a physical unit.

use crate::error::FrameError;

/// Salt mixed into the session key during key exchange
pub const KEY_SALT: u8 = 0x55;

/// Key the host offers during key exchange
pub const DEFAULT_HOST_KEY: u8 = 0x00;

/// Largest payload a single write frame may carry
pub const MAX_POKE_LEN: usize = 16;

/// Opcode of the no-encryption compatibility request
pub const NO_ENCRYPTION_REQUEST: u8 = 0x4E;

/// Acknowledgement byte for the no-encryption compatibility request
pub const NO_ENCRYPTION_ACK: u8 = 0x69;

/// Host to box request opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Handshake byte, answered with [`Reply::Error`]
    Sync = 0x00,
    /// Reset the box
    Reset = 0x08,
    /// Read one byte (peek)
    Read = 0x3C,
    /// Write bytes (poke); the high nibble carries the frame length
    Write = 0x0D,
    /// Link-cable master announcement
    Master = 0x0E,
    /// Start key exchange
    KeyExchange = 0x2F,
}

impl TryFrom<u8> for Request {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        match value {
            0x00 => Ok(Self::Sync),
            0x08 => Ok(Self::Reset),
            0x3C => Ok(Self::Read),
            0x0E => Ok(Self::Master),
            0x2F => Ok(Self::KeyExchange),
            v if v & 0x0F == 0x0D => Ok(Self::Write),
            v => Err(FrameError::UnknownRequest(v)),
        }
    }
}

/// Box to host reply bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Key exchange answer; second byte carries the box key
    KeyExchangeAck = 0x01,
    /// Link-cable slave announcement
    Slave = 0x05,
    /// Write accepted
    Ok = 0x06,
    /// Request rejected; also the answer to a handshake
    Error = 0x07,
    /// Read answer; second byte carries the value
    Read = 0x22,
}

impl TryFrom<u8> for Reply {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        match value {
            0x01 => Ok(Reply::KeyExchangeAck),
            0x05 => Ok(Reply::Slave),
            0x06 => Ok(Reply::Ok),
            0x07 => Ok(Reply::Error),
            0x22 => Ok(Reply::Read),
            v => Err(FrameError::InvalidReply(v)),
        }
    }
}

/// Session key for a given box key and host key
pub fn derive_session_key(box_key: u8, host_key: u8) -> u8 {
    box_key ^ host_key ^ KEY_SALT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_session_key() {
        assert_eq!(derive_session_key(0x00, DEFAULT_HOST_KEY), 0x55);
        assert_eq!(derive_session_key(0x55, DEFAULT_HOST_KEY), 0x00);
        assert_eq!(derive_session_key(0x12, 0x34), 0x12 ^ 0x34 ^ 0x55);
    }

    #[test]
    fn test_write_request_ignores_length_nibble() {
        assert_eq!(Request::try_from(0x4D), Ok(Request::Write));
        assert_eq!(Request::try_from(0xBD), Ok(Request::Write));
        assert_eq!(Request::try_from(0x3C), Ok(Request::Read));
    }

    #[test]
    fn test_reply_roundtrip() {
        for reply in [
            Reply::KeyExchangeAck,
            Reply::Slave,
            Reply::Ok,
            Reply::Error,
            Reply::Read,
        ] {
            assert_eq!(Reply::try_from(reply as u8), Ok(reply));
        }
        assert!(Reply::try_from(0x42).is_err());
    }

    #[test]
    fn test_error_reply_is_handshake_answer() {
        assert_eq!(Reply::try_from(0x07), Ok(Reply::Error));
        assert_eq!(Reply::try_from(0x42), Err(FrameError::InvalidReply(0x42)));
    }
}
