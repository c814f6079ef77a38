//! Session establishment and checksummed request/reply exchange
//!
//! # Connect Sequence
//!
//! 1. Open the transport
//! 2. Discard stale input until a read times out
//! 3. Handshake: send `0x00`, expect `0x07`, one outstanding attempt at a time
//! 4. (no-encryption mode only) request plaintext operation, expect `0x69`
//! 5. Key exchange: send `2F 00 cs`, receive `01 key cs`, derive the session key
//!
//! Any failure aborts the whole connect and closes the transport.

use mk312_protocol::frame::{
    add_checksum, check_checksum, hex, key_exchange_request, no_encryption_request,
    parse_key_exchange_reply, xor_in_place, KEY_EXCHANGE_LEN,
};
use mk312_protocol::opcodes::{derive_session_key, Reply, Request, NO_ENCRYPTION_ACK};
use tracing::{debug, info, trace, warn};

use crate::config::{Encryption, LinkConfig};
use crate::error::LinkError;
use crate::transport::Transport;

/// Give up flushing a transport that never goes quiet
const MAX_FLUSH_BYTES: usize = 4096;

/// Protocol session over one transport
pub struct Session<T> {
    transport: T,
    config: LinkConfig,
    /// Key the box announced during key exchange
    box_key: Option<u8>,
    /// Key outgoing frames are XORed with
    session_key: Option<u8>,
    connected: bool,
}

impl<T: Transport> Session<T> {
    /// Create a session with default configuration
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, LinkConfig::default())
    }

    /// Create a session with custom configuration
    pub fn with_config(transport: T, config: LinkConfig) -> Self {
        Self {
            transport,
            config,
            box_key: None,
            session_key: None,
            connected: false,
        }
    }

    /// Session configuration
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Whether the connect sequence completed
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Key the box announced during key exchange
    pub fn box_key(&self) -> Option<u8> {
        self.box_key
    }

    /// Key outgoing frames are currently XORed with
    pub fn session_key(&self) -> Option<u8> {
        self.session_key
    }

    /// Replace the session key, after the box key register has been rewritten
    pub fn set_session_key(&mut self, key: u8) {
        debug!("Session key set to 0x{:02X}", key);
        self.session_key = Some(key);
    }

    /// Transport name for logging
    pub fn connector_name(&self) -> String {
        self.transport.connector_name()
    }

    /// Access the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Open the transport and run the connect sequence
    pub fn connect(&mut self) -> Result<(), LinkError> {
        if self.connected {
            return Ok(());
        }

        let name = self.transport.connector_name();
        info!("Connecting to box on {}", name);
        self.transport.connect()?;

        if let Err(e) = self.establish() {
            warn!("Connect to {} failed: {}", name, e);
            let _ = self.transport.close();
            self.clear_keys();
            return Err(e);
        }

        self.connected = true;
        info!("Connected to box on {}", name);
        Ok(())
    }

    /// Close the transport and forget all keys
    ///
    /// Calling this on a closed session is a no-op.
    pub fn disconnect(&mut self) -> Result<(), LinkError> {
        if !self.connected && !self.transport.is_connected() {
            return Ok(());
        }
        self.connected = false;
        self.clear_keys();
        let result = self.transport.close();
        info!("Disconnected from {}", self.transport.connector_name());
        result
    }

    fn clear_keys(&mut self) {
        self.box_key = None;
        self.session_key = None;
    }

    fn establish(&mut self) -> Result<(), LinkError> {
        self.flush_input()?;
        self.handshake()?;
        if self.config.encryption == Encryption::Disabled {
            self.request_no_encryption()?;
        }
        self.key_exchange()
    }

    /// Discard bytes left over from a previous session
    fn flush_input(&mut self) -> Result<(), LinkError> {
        let mut byte = [0u8; 1];
        let mut discarded = 0;
        while discarded < MAX_FLUSH_BYTES {
            match self
                .transport
                .read_bytes(&mut byte, self.config.flush_timeout)
            {
                Ok(()) => discarded += 1,
                Err(e) if e.is_timeout() => break,
                Err(e) => return Err(e),
            }
        }
        if discarded > 0 {
            debug!("Discarded {} stale byte(s)", discarded);
        }
        Ok(())
    }

    fn handshake(&mut self) -> Result<(), LinkError> {
        let attempts = self.config.handshake_attempts;
        for attempt in 1..=attempts {
            self.transport.write_bytes(&[Request::Sync as u8])?;

            let mut reply = [0u8; 1];
            match self
                .transport
                .read_bytes(&mut reply, self.config.handshake_timeout)
            {
                Ok(()) if reply[0] == Reply::Error as u8 => {
                    debug!("Handshake succeeded on attempt {}", attempt);
                    return Ok(());
                }
                Ok(()) => trace!("Handshake attempt {}: got 0x{:02X}", attempt, reply[0]),
                Err(e) if e.is_timeout() => trace!("Handshake attempt {} timed out", attempt),
                Err(e) => return Err(e),
            }
        }
        Err(LinkError::HandshakeFailed { attempts })
    }

    fn request_no_encryption(&mut self) -> Result<(), LinkError> {
        let mut frame = no_encryption_request();
        self.send_command(&mut frame)?;
        match self.receive_single_byte_reply() {
            Ok(NO_ENCRYPTION_ACK) => {
                debug!("Box acknowledged no-encryption mode");
                Ok(())
            }
            Ok(other) => Err(LinkError::NoEncryptionRejected(Some(other))),
            Err(e) if e.is_timeout() => Err(LinkError::NoEncryptionRejected(None)),
            Err(e) => Err(e),
        }
    }

    fn key_exchange(&mut self) -> Result<(), LinkError> {
        let host_key = self.config.host_key;
        let mut request = key_exchange_request(host_key);
        self.send_command(&mut request)?;

        let mut reply = [0u8; KEY_EXCHANGE_LEN];
        self.receive_reply(&mut reply)?;
        let box_key = parse_key_exchange_reply(&reply)?;

        let key = derive_session_key(box_key, host_key);
        debug!("Key exchange: box key 0x{:02X}, session key 0x{:02X}", box_key, key);
        self.box_key = Some(box_key);
        self.session_key = Some(key);
        Ok(())
    }

    /// XOR `buffer` with the session key when encryption is active
    pub fn encrypt(&self, buffer: &mut [u8]) {
        if self.config.encryption == Encryption::Disabled {
            return;
        }
        if let Some(key) = self.session_key {
            xor_in_place(buffer, key);
        }
    }

    /// Checksum, encrypt, and write a request frame
    ///
    /// `buffer` is modified in place; its last byte is the checksum slot.
    pub fn send_command(&mut self, buffer: &mut [u8]) -> Result<(), LinkError> {
        add_checksum(buffer);
        trace!("-> {}", hex(buffer));
        self.encrypt(buffer);
        self.transport.write_bytes(buffer)
    }

    /// Read exactly `buffer.len()` bytes and verify their checksum
    pub fn receive_reply(&mut self, buffer: &mut [u8]) -> Result<(), LinkError> {
        self.transport.read_bytes(buffer, self.config.reply_timeout)?;
        trace!("<- {}", hex(buffer));
        check_checksum(buffer)?;
        Ok(())
    }

    /// Read one unchecksummed acknowledgement byte
    pub fn receive_single_byte_reply(&mut self) -> Result<u8, LinkError> {
        let mut reply = [0u8; 1];
        self.transport.read_bytes(&mut reply, self.config.reply_timeout)?;
        trace!("<- {:02X}", reply[0]);
        Ok(reply[0])
    }
}
