//! MK312 Link Library
//!
//! This crate carries bytes between the host and a box and layers the
//! session protocol on top:
//!
//! - [`Transport`]: blocking byte connection, with serial and TCP adapters
//! - [`Session`]: stale-input flush, handshake, key exchange, and
//!   checksummed, encrypted request/reply exchange
//! - [`RegisterAccess`]: peek/poke, either on the calling thread
//!   ([`DirectRegisters`]) or through a FIFO consumer thread
//!   ([`QueuedRegisters`])
//!
//! # Example
//!
//! ```rust,no_run
//! use mk312_link::{QueuedRegisters, RegisterAccess, SerialConfig, SerialTransport, Session};
//!
//! let transport = SerialTransport::new(SerialConfig::new("/dev/ttyUSB0"));
//! let mut session = Session::new(transport);
//! session.connect().unwrap();
//!
//! let registers = QueuedRegisters::new(session).unwrap();
//! let mode = registers.peek(0x407B).unwrap();
//! println!("Current mode: 0x{:02X}", mode);
//! registers.disconnect().unwrap();
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod queue;
pub mod registers;
pub mod serial;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::{Encryption, LinkConfig};
pub use error::LinkError;
pub use network::{discover, DiscoveryConfig, TcpTransport};
pub use queue::QueuedRegisters;
pub use registers::{DirectRegisters, RegisterAccess};
pub use serial::{list_ports, SerialConfig, SerialPortInfo, SerialTransport, DEFAULT_BAUD_RATE};
pub use session::Session;
pub use transport::Transport;
