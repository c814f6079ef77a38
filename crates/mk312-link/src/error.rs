//! Error types for transports, sessions, and register access

use mk312_protocol::FrameError;
use thiserror::Error;

/// Errors that can occur talking to a box
#[derive(Debug, Error)]
pub enum LinkError {
    /// Transport could not be opened
    #[error("failed to connect to {connector}: {reason}")]
    ConnectFailed { connector: String, reason: String },

    /// Operation needs an open session
    #[error("not connected")]
    NotConnected,

    /// Read did not complete in time
    #[error("read timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Fewer bytes arrived than were requested
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// I/O error on the underlying connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port error
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Box never answered the handshake
    #[error("handshake failed after {attempts} attempts")]
    HandshakeFailed { attempts: u32 },

    /// Box did not acknowledge the no-encryption request
    #[error("no-encryption request rejected (reply {0:02X?})")]
    NoEncryptionRejected(Option<u8>),

    /// Malformed or unexpected frame
    #[error("protocol error: {0}")]
    Frame(#[from] FrameError),

    /// Command queue did not service a request in time
    #[error("command queue timed out after {timeout_ms}ms")]
    QueueTimeout { timeout_ms: u64 },

    /// Command queue has shut down
    #[error("command queue closed")]
    QueueClosed,

    /// Network discovery failed
    #[error("discovery failed: {0}")]
    Discovery(String),
}

impl LinkError {
    /// Returns true for read timeouts
    pub fn is_timeout(&self) -> bool {
        matches!(self, LinkError::Timeout { .. })
    }
}
