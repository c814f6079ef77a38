//! MK312 Protocol Library
//!
//! This crate provides the I/O-free half of the serial protocol spoken by
//! MK312-family electro-stimulation boxes:
//!
//! - **Opcodes**: request and reply bytes fixed by the firmware
//! - **Framing**: checksums, the single-byte XOR cipher, and frame builders
//!   and parsers for peek, poke, and key exchange
//! - **Registers**: the ROM/RAM/EEPROM address map and per-channel blocks
//! - **Modes**: program modes, box commands, and register value tables
//!
//! # Example
//!
//! ```rust
//! use mk312_protocol::frame::{check_checksum, poke_request};
//! use mk312_protocol::registers::Channel;
//!
//! let frame = poke_request(Channel::A.intensity(), &[0x80]).unwrap();
//! assert_eq!(frame[0], 0x4D);
//! assert!(check_checksum(&frame).is_ok());
//! ```

pub mod error;
pub mod frame;
pub mod mode;
pub mod opcodes;
pub mod registers;

pub use error::FrameError;
pub use mode::{BoxCommand, Gate, Mode, Ramp, ValueSelect};
pub use opcodes::{derive_session_key, Reply, Request, KEY_SALT, MAX_POKE_LEN};
pub use registers::{Channel, Region};

/// Firmware identification read from ROM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FirmwareInfo {
    /// Box model byte
    pub box_model: u8,
    /// Major, minor, and internal revision
    pub version: [u8; 3],
}

impl std::fmt::Display for FirmwareInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Box:{:02X} Version:{:02X}{:02X}{:02X}",
            self.box_model, self.version[0], self.version[1], self.version[2]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firmware_info_display() {
        let info = FirmwareInfo {
            box_model: 0x0C,
            version: [0x01, 0x06, 0x0A],
        };
        assert_eq!(info.to_string(), "Box:0C Version:01060A");
    }
}
