//! Virtual box firmware
//!
//! Runs the box side of the serial protocol against an in-memory register
//! image: answers handshakes, performs key exchange, decrypts requests,
//! services peeks and pokes, and executes the box commands the device facade
//! relies on.

use std::collections::VecDeque;

use mk312_protocol::frame::{add_checksum, check_checksum, hex};
use mk312_protocol::opcodes::{derive_session_key, Reply, NO_ENCRYPTION_ACK, NO_ENCRYPTION_REQUEST};
use mk312_protocol::registers::{ram, rom};
use mk312_protocol::{BoxCommand, Mode, Request};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Characters on the box display (two lines of eight)
pub const DISPLAY_LEN: usize = 16;

/// Configuration for creating a virtual box
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualBoxConfig {
    /// Key announced during key exchange
    pub box_key: u8,
    /// Box model byte in ROM
    pub box_model: u8,
    /// Firmware version bytes in ROM
    pub version: [u8; 3],
    /// Never answer the handshake
    pub silent: bool,
    /// Acknowledge the no-encryption request
    pub accept_no_encryption: bool,
    /// Peeks of the command register that still see a command before it
    /// returns to idle
    pub command_polls: u32,
}

impl Default for VirtualBoxConfig {
    fn default() -> Self {
        Self {
            box_key: 0x00,
            box_model: 0x0C,
            version: [0x01, 0x06, 0x00],
            silent: false,
            accept_no_encryption: true,
            command_polls: 1,
        }
    }
}

/// A decoded request as the firmware saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareEvent {
    /// Handshake byte
    Sync,
    /// Key exchange with the host key offered
    KeyExchange { host_key: u8 },
    /// No-encryption request
    NoEncryption,
    /// Register read
    Peek { address: u16 },
    /// Register write
    Poke { address: u16, payload: Vec<u8> },
    /// Box command executed from the command register
    Command(u8),
    /// Frame the firmware rejected
    Rejected(Vec<u8>),
}

/// Simulated box firmware
#[derive(Debug)]
pub struct VirtualBox {
    config: VirtualBoxConfig,
    memory: Vec<u8>,
    /// Raw, still encrypted, bytes from the host
    input: Vec<u8>,
    /// Reply bytes for the host
    output: VecDeque<u8>,
    key: Option<u8>,
    encryption: bool,
    display: [u8; DISPLAY_LEN],
    command_polls_remaining: u32,
    corrupt_replies: usize,
    events: Vec<FirmwareEvent>,
}

impl VirtualBox {
    /// Create a box with default settings
    pub fn new() -> Self {
        Self::from_config(VirtualBoxConfig::default())
    }

    /// Create a box from configuration
    pub fn from_config(config: VirtualBoxConfig) -> Self {
        let mut memory = vec![0u8; 0x1_0000];
        memory[rom::BOX_MODEL as usize] = config.box_model;
        memory[rom::VERSION_MAJOR as usize] = config.version[0];
        memory[rom::VERSION_MINOR as usize] = config.version[1];
        memory[rom::VERSION_INTERNAL as usize] = config.version[2];
        memory[ram::BOX_COMMAND_1 as usize] = BoxCommand::None as u8;
        memory[ram::BOX_COMMAND_2 as usize] = BoxCommand::None as u8;
        memory[ram::CURRENT_MODE as usize] = Mode::Waves as u8;

        Self {
            config,
            memory,
            input: Vec::new(),
            output: VecDeque::new(),
            key: None,
            encryption: true,
            display: [b' '; DISPLAY_LEN],
            command_polls_remaining: 0,
            corrupt_replies: 0,
            events: Vec::new(),
        }
    }

    /// Forget the session key and any partial request
    ///
    /// Reply bytes already queued stay put, like unread bytes in a UART.
    pub fn reset_link(&mut self) {
        self.input.clear();
        self.key = None;
        self.encryption = true;
    }

    /// Read a register directly
    pub fn register(&self, address: u16) -> u8 {
        self.memory[address as usize]
    }

    /// Write a register directly, bypassing the protocol
    pub fn set_register(&mut self, address: u16, value: u8) {
        self.memory[address as usize] = value;
    }

    /// Current session key, once negotiated
    pub fn key(&self) -> Option<u8> {
        self.key
    }

    /// Display contents
    pub fn display(&self) -> String {
        String::from_utf8_lossy(&self.display).into_owned()
    }

    /// Everything the firmware decoded so far
    pub fn events(&self) -> &[FirmwareEvent] {
        &self.events
    }

    /// Number of handshake bytes received
    pub fn sync_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, FirmwareEvent::Sync))
            .count()
    }

    /// Corrupt the checksum of the next `count` checksummed replies
    pub fn corrupt_next_replies(&mut self, count: usize) {
        self.corrupt_replies = count;
    }

    /// Queue stale bytes as if left over from an earlier session
    pub fn push_stale_output(&mut self, bytes: &[u8]) {
        self.output.extend(bytes);
    }

    /// Number of reply bytes waiting for the host
    pub fn pending_output(&self) -> usize {
        self.output.len()
    }

    /// Take up to `n` reply bytes
    pub fn take_output(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.output.len());
        self.output.drain(..n).collect()
    }

    /// Feed bytes written by the host
    pub fn receive(&mut self, bytes: &[u8]) {
        self.input.extend_from_slice(bytes);
        while self.process_frame() {}
    }

    /// Key applied to incoming bytes, zero while unencrypted
    fn input_key(&self) -> u8 {
        match (self.encryption, self.key) {
            (true, Some(key)) => key,
            _ => 0,
        }
    }

    /// Handle one complete frame from the input buffer
    fn process_frame(&mut self) -> bool {
        let Some(&first) = self.input.first() else {
            return false;
        };
        let key = self.input_key();
        let opcode = first ^ key;

        let len = match opcode {
            op if op == Request::Sync as u8 => 1,
            op if op == Request::KeyExchange as u8 => 3,
            NO_ENCRYPTION_REQUEST => 3,
            op if op == Request::Read as u8 => 4,
            op if op & 0x0F == Request::Write as u8 => ((op >> 4) as usize) + 1,
            _ => {
                warn!("Virtual box: unknown opcode 0x{:02X}", opcode);
                self.input.remove(0);
                self.events.push(FirmwareEvent::Rejected(vec![opcode]));
                self.output.push_back(Reply::Error as u8);
                return true;
            }
        };

        // A wrapped length nibble leaves no room for address and payload
        if len < 5 && opcode & 0x0F == Request::Write as u8 {
            let garbage: Vec<u8> = self.input.drain(..).map(|b| b ^ key).collect();
            debug!("Virtual box: short write frame {}", hex(&garbage));
            self.events.push(FirmwareEvent::Rejected(garbage));
            self.output.push_back(Reply::Error as u8);
            return true;
        }

        if self.input.len() < len {
            return false;
        }

        let frame: Vec<u8> = self.input.drain(..len).map(|b| b ^ key).collect();
        trace!("Virtual box <- {}", hex(&frame));

        if len > 1 && check_checksum(&frame).is_err() {
            debug!("Virtual box: bad checksum on {}", hex(&frame));
            self.events.push(FirmwareEvent::Rejected(frame));
            self.output.push_back(Reply::Error as u8);
            return true;
        }

        match frame[0] {
            op if op == Request::Sync as u8 => self.handle_sync(),
            op if op == Request::KeyExchange as u8 => self.handle_key_exchange(frame[1]),
            NO_ENCRYPTION_REQUEST => self.handle_no_encryption(),
            op if op == Request::Read as u8 => {
                self.handle_peek(u16::from_be_bytes([frame[1], frame[2]]))
            }
            _ => self.handle_poke(
                u16::from_be_bytes([frame[1], frame[2]]),
                frame[3..frame.len() - 1].to_vec(),
            ),
        }
        true
    }

    fn handle_sync(&mut self) {
        self.events.push(FirmwareEvent::Sync);
        if !self.config.silent {
            self.output.push_back(Reply::Error as u8);
        }
    }

    fn handle_key_exchange(&mut self, host_key: u8) {
        self.events.push(FirmwareEvent::KeyExchange { host_key });
        let box_key = self.config.box_key;
        self.push_checksummed(vec![Reply::KeyExchangeAck as u8, box_key, 0]);

        let key = derive_session_key(box_key, host_key);
        self.memory[ram::BOX_KEY as usize] = key;
        self.key = Some(key);
        debug!("Virtual box: session key 0x{:02X}", key);
    }

    fn handle_no_encryption(&mut self) {
        self.events.push(FirmwareEvent::NoEncryption);
        if self.config.accept_no_encryption {
            self.encryption = false;
            self.output.push_back(NO_ENCRYPTION_ACK);
        } else {
            self.output.push_back(Reply::Error as u8);
        }
    }

    fn handle_peek(&mut self, address: u16) {
        self.events.push(FirmwareEvent::Peek { address });
        let value = self.memory[address as usize];

        if address == ram::BOX_COMMAND_1 && self.command_polls_remaining > 0 {
            self.command_polls_remaining -= 1;
            if self.command_polls_remaining == 0 {
                self.memory[address as usize] = BoxCommand::None as u8;
            }
        }

        self.push_checksummed(vec![Reply::Read as u8, value, 0]);
    }

    fn handle_poke(&mut self, address: u16, payload: Vec<u8>) {
        self.events.push(FirmwareEvent::Poke {
            address,
            payload: payload.clone(),
        });

        for (i, value) in payload.iter().enumerate() {
            let target = address.wrapping_add(i as u16);
            if target > rom::END {
                self.memory[target as usize] = *value;
            }
        }
        self.output.push_back(Reply::Ok as u8);

        let end = address.wrapping_add(payload.len() as u16);
        let touches = |register: u16| register >= address && register < end;

        if touches(ram::BOX_KEY) {
            self.key = Some(self.memory[ram::BOX_KEY as usize]);
        }
        if touches(ram::BOX_COMMAND_1) {
            let command = self.memory[ram::BOX_COMMAND_1 as usize];
            if command != BoxCommand::None as u8 {
                self.execute_command(command);
            }
        }
    }

    fn execute_command(&mut self, command: u8) {
        self.events.push(FirmwareEvent::Command(command));

        if command == BoxCommand::WriteLcdCharacter as u8 {
            let position = self.memory[ram::LCD_POSITION as usize] as usize;
            if position < DISPLAY_LEN {
                self.display[position] = self.memory[ram::LCD_PARAMETER as usize];
            }
        }

        self.command_polls_remaining = self.config.command_polls;
        if self.command_polls_remaining == 0 {
            self.memory[ram::BOX_COMMAND_1 as usize] = BoxCommand::None as u8;
        }
    }

    fn push_checksummed(&mut self, mut reply: Vec<u8>) {
        add_checksum(&mut reply);
        if self.corrupt_replies > 0 {
            self.corrupt_replies -= 1;
            if let Some(last) = reply.last_mut() {
                *last = last.wrapping_add(1);
            }
        }
        trace!("Virtual box -> {}", hex(&reply));
        self.output.extend(reply);
    }
}

impl Default for VirtualBox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mk312_protocol::frame::{key_exchange_request, peek_request, poke_request, xor_in_place};

    fn keyed_box() -> VirtualBox {
        let mut vbox = VirtualBox::new();
        vbox.receive(&[0x00]);
        vbox.receive(&key_exchange_request(0x00));
        vbox.take_output(16);
        vbox
    }

    fn encrypted(mut frame: Vec<u8>, key: u8) -> Vec<u8> {
        xor_in_place(&mut frame, key);
        frame
    }

    #[test]
    fn test_handshake_and_key_exchange() {
        let mut vbox = VirtualBox::from_config(VirtualBoxConfig {
            box_key: 0x21,
            ..Default::default()
        });
        vbox.receive(&[0x00]);
        assert_eq!(vbox.take_output(1), vec![0x07]);

        vbox.receive(&key_exchange_request(0x00));
        assert_eq!(vbox.take_output(3), vec![0x01, 0x21, 0x22]);
        assert_eq!(vbox.key(), Some(0x21 ^ 0x55));
    }

    #[test]
    fn test_silent_box_never_answers() {
        let mut vbox = VirtualBox::from_config(VirtualBoxConfig {
            silent: true,
            ..Default::default()
        });
        vbox.receive(&[0x00]);
        vbox.receive(&[0x00]);
        assert_eq!(vbox.pending_output(), 0);
        assert_eq!(vbox.sync_count(), 2);
    }

    #[test]
    fn test_encrypted_poke_then_peek() {
        let mut vbox = keyed_box();

        vbox.receive(&encrypted(poke_request(0x4000, &[0xAB]).unwrap(), 0x55));
        assert_eq!(vbox.take_output(1), vec![0x06]);
        assert_eq!(vbox.register(0x4000), 0xAB);

        vbox.receive(&encrypted(peek_request(0x4000).to_vec(), 0x55));
        assert_eq!(vbox.take_output(3), vec![0x22, 0xAB, 0xCD]);
    }

    #[test]
    fn test_bad_checksum_is_rejected() {
        let mut vbox = keyed_box();
        let mut frame = poke_request(0x4000, &[0xAB]).unwrap();
        frame[4] ^= 0xFF;
        vbox.receive(&encrypted(frame, 0x55));

        assert_eq!(vbox.take_output(1), vec![0x07]);
        assert_eq!(vbox.register(0x4000), 0x00);
    }

    #[test]
    fn test_wrapped_write_length_is_rejected() {
        let mut vbox = keyed_box();
        for len in 13..=16 {
            let frame = poke_request(0x4000, &vec![0x11; len]).unwrap();
            vbox.receive(&encrypted(frame, 0x55));

            assert_eq!(vbox.take_output(4), vec![0x07]);
            assert_eq!(vbox.register(0x4000), 0x00);
            assert!(matches!(
                vbox.events().last(),
                Some(FirmwareEvent::Rejected(bytes)) if bytes.len() == len + 4
            ));
        }

        vbox.receive(&encrypted(poke_request(0x4000, &[0xAB]).unwrap(), 0x55));
        assert_eq!(vbox.take_output(1), vec![0x06]);
        assert_eq!(vbox.register(0x4000), 0xAB);
    }

    #[test]
    fn test_rom_is_read_only() {
        let mut vbox = keyed_box();
        vbox.receive(&encrypted(poke_request(rom::BOX_MODEL, &[0x99]).unwrap(), 0x55));
        assert_eq!(vbox.take_output(1), vec![0x06]);
        assert_eq!(vbox.register(rom::BOX_MODEL), 0x0C);
    }

    #[test]
    fn test_write_lcd_character_command() {
        let mut vbox = keyed_box();
        let poke = |vbox: &mut VirtualBox, address: u16, value: u8| {
            vbox.receive(&encrypted(poke_request(address, &[value]).unwrap(), 0x55));
            vbox.take_output(1);
        };
        poke(&mut vbox, ram::LCD_PARAMETER, b'H');
        poke(&mut vbox, ram::LCD_POSITION, 3);
        poke(&mut vbox, ram::BOX_COMMAND_1, BoxCommand::WriteLcdCharacter as u8);

        assert_eq!(&vbox.display()[3..4], "H");
        // One poll still sees the command, the next sees idle
        assert_eq!(vbox.register(ram::BOX_COMMAND_1), 0x13);
        vbox.receive(&encrypted(peek_request(ram::BOX_COMMAND_1).to_vec(), 0x55));
        assert_eq!(vbox.take_output(3)[1], 0x13);
        assert_eq!(vbox.register(ram::BOX_COMMAND_1), 0xFF);
    }

    #[test]
    fn test_box_key_poke_rekeys() {
        let mut vbox = keyed_box();
        vbox.receive(&encrypted(poke_request(ram::BOX_KEY, &[0x3A]).unwrap(), 0x55));
        assert_eq!(vbox.take_output(1), vec![0x06]);
        assert_eq!(vbox.key(), Some(0x3A));

        vbox.receive(&encrypted(peek_request(ram::BOX_KEY).to_vec(), 0x3A));
        assert_eq!(vbox.take_output(3)[1], 0x3A);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn poke_then_peek_any_key(
                box_key in any::<u8>(),
                address in 0x4000u16..0x4238,
                value in any::<u8>(),
            ) {
                prop_assume!(address != ram::BOX_KEY && address != ram::BOX_COMMAND_1);
                let mut vbox = VirtualBox::from_config(VirtualBoxConfig {
                    box_key,
                    ..Default::default()
                });
                vbox.receive(&[0x00]);
                vbox.receive(&key_exchange_request(0x00));
                vbox.take_output(16);
                let key = box_key ^ 0x55;

                vbox.receive(&encrypted(poke_request(address, &[value]).unwrap(), key));
                prop_assert_eq!(vbox.take_output(1), vec![0x06]);
                vbox.receive(&encrypted(peek_request(address).to_vec(), key));
                prop_assert_eq!(vbox.take_output(3)[1], value);
            }
        }
    }
}
