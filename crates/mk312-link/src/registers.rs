//! Peek/poke register access
//!
//! [`RegisterAccess`] is the seam between the device facade and the wire.
//! Two implementations exist:
//!
//! - [`DirectRegisters`]: the calling thread drives the transport itself,
//!   serialized by a mutex
//! - [`QueuedRegisters`](crate::QueuedRegisters): a single consumer thread
//!   owns the transport and services callers in FIFO order

use std::sync::{Arc, Mutex, PoisonError};

use mk312_protocol::frame::{
    parse_peek_reply, parse_poke_ack, peek_request, poke_request, PEEK_REPLY_LEN,
};
use tracing::trace;

use crate::error::LinkError;
use crate::session::Session;
use crate::transport::Transport;

impl<T: Transport> Session<T> {
    /// Read one register
    pub fn peek(&mut self, address: u16) -> Result<u8, LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }

        let mut request = peek_request(address);
        self.send_command(&mut request)?;

        let mut reply = [0u8; PEEK_REPLY_LEN];
        self.receive_reply(&mut reply)?;
        let value = parse_peek_reply(&reply)?;
        trace!("peek 0x{:04X} = 0x{:02X}", address, value);
        Ok(value)
    }

    /// Write up to 16 consecutive registers starting at `address`
    ///
    /// Oversized payloads are rejected before anything reaches the transport.
    pub fn poke(&mut self, address: u16, payload: &[u8]) -> Result<(), LinkError> {
        let mut request = poke_request(address, payload)?;
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }

        self.send_command(&mut request)?;
        let ack = self.receive_single_byte_reply()?;
        parse_poke_ack(ack)?;
        trace!("poke 0x{:04X} <- {:02X?}", address, payload);
        Ok(())
    }

    /// Write a single register
    pub fn poke_byte(&mut self, address: u16, value: u8) -> Result<(), LinkError> {
        self.poke(address, &[value])
    }
}

/// Thread-safe register access to one connected box
pub trait RegisterAccess: Send + Sync {
    /// Read one register
    fn peek(&self, address: u16) -> Result<u8, LinkError>;

    /// Write consecutive registers starting at `address`
    fn poke(&self, address: u16, payload: &[u8]) -> Result<(), LinkError>;

    /// Write a single register
    fn poke_byte(&self, address: u16, value: u8) -> Result<(), LinkError> {
        self.poke(address, &[value])
    }

    /// Replace the local session key, ordered after any earlier pokes
    fn set_session_key(&self, key: u8) -> Result<(), LinkError>;

    /// Whether the underlying session is usable
    fn is_connected(&self) -> bool;

    /// Stop using the box and close the connection
    fn disconnect(&self) -> Result<(), LinkError>;
}

impl<R: RegisterAccess + ?Sized> RegisterAccess for Arc<R> {
    fn peek(&self, address: u16) -> Result<u8, LinkError> {
        (**self).peek(address)
    }

    fn poke(&self, address: u16, payload: &[u8]) -> Result<(), LinkError> {
        (**self).poke(address, payload)
    }

    fn set_session_key(&self, key: u8) -> Result<(), LinkError> {
        (**self).set_session_key(key)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn disconnect(&self) -> Result<(), LinkError> {
        (**self).disconnect()
    }
}

/// Register access on the calling thread
pub struct DirectRegisters<T> {
    session: Mutex<Session<T>>,
}

impl<T: Transport> DirectRegisters<T> {
    /// Wrap a connected session
    pub fn new(session: Session<T>) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }

    fn with_session<F, V>(&self, f: F) -> V
    where
        F: FnOnce(&mut Session<T>) -> V,
    {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut session)
    }
}

impl<T: Transport> RegisterAccess for DirectRegisters<T> {
    fn peek(&self, address: u16) -> Result<u8, LinkError> {
        self.with_session(|s| s.peek(address))
    }

    fn poke(&self, address: u16, payload: &[u8]) -> Result<(), LinkError> {
        self.with_session(|s| s.poke(address, payload))
    }

    fn set_session_key(&self, key: u8) -> Result<(), LinkError> {
        self.with_session(|s| s.set_session_key(key));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.with_session(|s| s.is_connected())
    }

    fn disconnect(&self) -> Result<(), LinkError> {
        self.with_session(|s| s.disconnect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockTransport;
    use mk312_protocol::FrameError;

    fn connected() -> (Session<MockTransport>, crate::test_support::MockLog) {
        let transport = MockTransport::connectable(0x00);
        let log = transport.log();
        let mut session = Session::new(transport);
        session.connect().unwrap();
        (session, log)
    }

    #[test]
    fn test_peek() {
        let (mut session, log) = connected();
        log.reply_on_write(3, &[0x22, 0xAB, 0xCD]);

        assert_eq!(session.peek(0x4000).unwrap(), 0xAB);

        let expected: Vec<u8> = [0x3C, 0x40, 0x00, 0x7C].iter().map(|b| b ^ 0x55).collect();
        assert_eq!(log.writes()[2], expected);
    }

    #[test]
    fn test_peek_unexpected_opcode() {
        let (mut session, log) = connected();
        log.reply_on_write(3, &[0x06, 0xAB, 0xB1]);

        let err = session.peek(0x4000).unwrap_err();
        assert!(matches!(
            err,
            LinkError::Frame(FrameError::UnexpectedReply {
                expected: 0x22,
                actual: 0x06
            })
        ));
    }

    #[test]
    fn test_poke() {
        let (mut session, log) = connected();
        log.reply_on_write(3, &[0x06]);

        session.poke_byte(0x4000, 0xAB).unwrap();

        let expected: Vec<u8> = [0x4D, 0x40, 0x00, 0xAB, 0x38]
            .iter()
            .map(|b| b ^ 0x55)
            .collect();
        assert_eq!(log.writes()[2], expected);
    }

    #[test]
    fn test_poke_error_reply() {
        let (mut session, log) = connected();
        log.reply_on_write(3, &[0x07]);

        let err = session.poke_byte(0x4000, 0xAB).unwrap_err();
        assert!(matches!(err, LinkError::Frame(FrameError::InvalidReply(0x07))));
    }

    #[test]
    fn test_poke_too_many_bytes_writes_nothing() {
        let (mut session, log) = connected();

        let err = session.poke(0x4000, &[0u8; 17]).unwrap_err();

        assert!(matches!(
            err,
            LinkError::Frame(FrameError::TooManyBytes { len: 17, max: 16 })
        ));
        assert_eq!(log.writes().len(), 2);
    }

    #[test]
    fn test_poke_sixteen_bytes_is_sent() {
        let (mut session, log) = connected();
        log.reply_on_write(3, &[0x06]);

        session.poke(0x4000, &[0u8; 16]).unwrap();
        assert_eq!(log.writes()[2].len(), 20);
    }

    #[test]
    fn test_peek_requires_connection() {
        let mut session = Session::new(MockTransport::new());
        assert!(matches!(session.peek(0x4000), Err(LinkError::NotConnected)));
    }

    #[test]
    fn test_direct_registers() {
        let (session, log) = connected();
        log.reply_on_write(3, &[0x06]);
        log.reply_on_write(4, &[0x22, 0x11, 0x33]);
        let registers = DirectRegisters::new(session);

        registers.poke_byte(0x4213, 0x11).unwrap();
        registers.set_session_key(0x11).unwrap();
        assert_eq!(registers.peek(0x4213).unwrap(), 0x11);

        // Peek after the key change is encrypted with the new key
        let expected: Vec<u8> = [0x3C, 0x42, 0x13, 0x91].iter().map(|b| b ^ 0x11).collect();
        assert_eq!(log.writes()[3], expected);

        registers.disconnect().unwrap();
        assert!(!registers.is_connected());
    }
}
