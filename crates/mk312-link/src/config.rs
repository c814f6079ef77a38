//! Link configuration

use std::time::Duration;

use mk312_protocol::opcodes::DEFAULT_HOST_KEY;
use serde::{Deserialize, Serialize};

/// Whether outgoing frames are encrypted with the session key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Encryption {
    /// Normal operation
    #[default]
    Enabled,
    /// Compatibility mode for bridges that speak plaintext; performs the
    /// no-encryption request during connect
    Disabled,
}

/// Timing and keying parameters for a session and its command queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Timeout for each checksummed reply
    pub reply_timeout: Duration,
    /// Per-byte timeout while discarding stale input at connect
    pub flush_timeout: Duration,
    /// Handshake round-trips before giving up
    pub handshake_attempts: u32,
    /// Timeout for each handshake reply
    pub handshake_timeout: Duration,
    /// Key the host offers during key exchange
    pub host_key: u8,
    /// Encryption mode
    pub encryption: Encryption,
    /// How long a queued peek/poke waits for the consumer thread
    pub queue_timeout: Duration,
    /// How often the idle consumer thread checks for shutdown
    pub queue_poll_interval: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_millis(1000),
            flush_timeout: Duration::from_millis(50),
            handshake_attempts: 12,
            handshake_timeout: Duration::from_millis(200),
            host_key: DEFAULT_HOST_KEY,
            encryption: Encryption::Enabled,
            queue_timeout: Duration::from_secs(5),
            queue_poll_interval: Duration::from_millis(10),
        }
    }
}
