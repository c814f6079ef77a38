//! MK312 Simulation Library
//!
//! This crate provides a simulation layer for exercising the MK312 protocol
//! stack without a physical box. It includes:
//!
//! - **VirtualBox**: Simulates the box firmware, including handshake, key
//!   exchange, encryption, register memory, and display commands
//! - **SimTransport**: Connects a session to a shared virtual box and records
//!   the traffic
//! - **ScriptedTransport**: Answers each write with a canned reply
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use mk312_link::{DirectRegisters, RegisterAccess, Session};
//! use mk312_sim::{lock, shared, SimTransport, VirtualBox};
//!
//! let vbox = shared(VirtualBox::new());
//! let mut session = Session::new(SimTransport::new(Arc::clone(&vbox)));
//! session.connect().unwrap();
//!
//! let registers = DirectRegisters::new(session);
//! registers.poke_byte(0x40A5, 0x80).unwrap();
//! assert_eq!(lock(&vbox).register(0x40A5), 0x80);
//! ```

pub mod firmware;
pub mod scripted;
pub mod transport;

pub use firmware::{FirmwareEvent, VirtualBox, VirtualBoxConfig, DISPLAY_LEN};
pub use scripted::{ScriptHandle, ScriptedTransport};
pub use transport::{lock, shared, SharedBox, SimTransport, WireEvent, WireLog};
