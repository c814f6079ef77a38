//! Error types for the device layer

use mk312_link::LinkError;
use thiserror::Error;

/// Errors that can occur driving a box
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Register access failed
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    /// Display holds at most eight characters
    #[error("display text too long: {len} characters (max 8)")]
    DisplayTextTooLong { len: usize },

    /// Display only renders printable ASCII
    #[error("display text must be printable ASCII")]
    InvalidDisplayText,

    /// Box command register never returned to idle
    #[error("box command 0x{command:02X} did not complete after {attempts} polls")]
    CommandTimeout {
        /// Command that was issued
        command: u8,
        /// Polls made before giving up
        attempts: u32,
    },

    /// Worker thread could not be started
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Scheduler no longer accepts commands
    #[error("command scheduler closed")]
    SchedulerClosed,
}
