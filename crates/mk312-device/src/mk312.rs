//! Named box operations over register access
//!
//! [`Mk312`] turns firmware features into peeks and pokes: mode selection,
//! display text, ADC control, rekeying, box commands, and channel output.
//! It is generic over [`RegisterAccess`], so it runs the same way on the
//! calling thread or through a command queue.

use std::thread;

use mk312_link::{LinkConfig, QueuedRegisters, RegisterAccess, Session, Transport};
use mk312_protocol::registers::{ram, rom};
use mk312_protocol::{BoxCommand, Channel, FirmwareInfo, Gate, Mode, ValueSelect};
use tracing::{debug, info};

use crate::channel::{intensity_value, ChannelLevels};
use crate::config::DeviceConfig;
use crate::error::DeviceError;

/// Characters that fit on one display line
pub const DISPLAY_WIDTH: usize = 8;

/// Device facade over one connected box
pub struct Mk312<R> {
    registers: R,
    config: DeviceConfig,
}

impl<T: Transport + 'static> Mk312<QueuedRegisters<T>> {
    /// Connect over `transport` and serve register access from a command queue
    pub fn connect(
        transport: T,
        link_config: LinkConfig,
        config: DeviceConfig,
    ) -> Result<Self, DeviceError> {
        let mut session = Session::with_config(transport, link_config);
        session.connect()?;
        let registers = QueuedRegisters::new(session)?;
        Ok(Self::new(registers, config))
    }
}

impl<R: RegisterAccess> Mk312<R> {
    /// Wrap connected register access
    pub fn new(registers: R, config: DeviceConfig) -> Self {
        Self { registers, config }
    }

    /// Underlying register access
    pub fn registers(&self) -> &R {
        &self.registers
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.registers.is_connected()
    }

    /// Close the connection
    pub fn disconnect(&self) -> Result<(), DeviceError> {
        self.registers.disconnect()?;
        Ok(())
    }

    /// Read the model and firmware version from ROM
    pub fn firmware_info(&self) -> Result<FirmwareInfo, DeviceError> {
        let box_model = self.registers.peek(rom::BOX_MODEL)?;
        let version = [
            self.registers.peek(rom::VERSION_MAJOR)?,
            self.registers.peek(rom::VERSION_MINOR)?,
            self.registers.peek(rom::VERSION_INTERNAL)?,
        ];
        Ok(FirmwareInfo { box_model, version })
    }

    /// Firmware identification formatted as `Box:XX Version:XXXXXX`
    pub fn version_string(&self) -> Result<String, DeviceError> {
        Ok(self.firmware_info()?.to_string())
    }

    /// Raw current mode byte
    pub fn current_mode(&self) -> Result<u8, DeviceError> {
        Ok(self.registers.peek(ram::CURRENT_MODE)?)
    }

    /// Current mode, if it is one of the known program modes
    pub fn mode(&self) -> Result<Option<Mode>, DeviceError> {
        Ok(Mode::try_from(self.current_mode()?).ok())
    }

    /// Switch to `mode` and start it
    pub fn set_mode(&self, mode: impl Into<u8>) -> Result<(), DeviceError> {
        let mode = mode.into();
        self.registers.poke_byte(ram::CURRENT_MODE, mode)?;
        self.execute_command(BoxCommand::NewMode)?;
        info!("Mode set to 0x{:02X}", mode);
        Ok(())
    }

    /// Write up to eight printable ASCII characters to the display
    ///
    /// Shorter text is padded with spaces so nothing from a previous message
    /// remains.
    pub fn write_display_text(&self, text: &str) -> Result<(), DeviceError> {
        let len = text.chars().count();
        if len > DISPLAY_WIDTH {
            return Err(DeviceError::DisplayTextTooLong { len });
        }
        if !text.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
            return Err(DeviceError::InvalidDisplayText);
        }

        let padded = format!("{:<width$}", text, width = DISPLAY_WIDTH);
        for (position, character) in padded.bytes().enumerate() {
            // Parameter and position are adjacent registers
            self.registers
                .poke(ram::LCD_PARAMETER, &[character, position as u8])?;
            self.execute_command(BoxCommand::WriteLcdCharacter)?;
        }
        debug!("Display text set to {:?}", text);
        Ok(())
    }

    /// Turn the front panel ADC inputs on or off
    pub fn set_adc_enabled(&self, enabled: bool) -> Result<(), DeviceError> {
        let flags = self.registers.peek(ram::CPU_FLAGS)?;
        let updated = if enabled {
            flags & !ram::ADC_DISABLE_BIT
        } else {
            flags | ram::ADC_DISABLE_BIT
        };
        if updated != flags {
            self.registers.poke_byte(ram::CPU_FLAGS, updated)?;
        }
        debug!("ADC {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Store a new session key on the box and use it for subsequent frames
    pub fn set_encryption_key(&self, key: u8) -> Result<(), DeviceError> {
        self.registers.poke_byte(ram::BOX_KEY, key)?;
        self.registers.set_session_key(key)?;
        info!("Encryption key changed");
        Ok(())
    }

    /// Issue a box command and wait for the firmware to finish it
    pub fn execute_command(&self, command: impl Into<u8>) -> Result<(), DeviceError> {
        let command = command.into();
        self.registers.poke_byte(ram::BOX_COMMAND_1, command)?;
        self.wait_for_command(command)
    }

    /// Poll the command register until it reads idle
    fn wait_for_command(&self, command: u8) -> Result<(), DeviceError> {
        let attempts = self.config.command_poll_attempts;
        for attempt in 1..=attempts {
            if self.registers.peek(ram::BOX_COMMAND_1)? == BoxCommand::None as u8 {
                return Ok(());
            }
            if attempt < attempts {
                thread::sleep(self.config.command_poll_interval);
            }
        }
        Err(DeviceError::CommandTimeout { command, attempts })
    }

    /// Put both channels into a silent, statically controlled state
    pub fn initialize_channels(&self) -> Result<(), DeviceError> {
        for channel in Channel::ALL {
            self.registers.poke_byte(channel.gate_select(), Gate::OFF)?;
            self.registers
                .poke_byte(channel.intensity_select(), ValueSelect::STATIC)?;
            self.registers.poke_byte(channel.intensity(), 0)?;
            self.registers
                .poke_byte(channel.frequency_select(), ValueSelect::STATIC)?;
            self.registers
                .poke_byte(channel.frequency(), self.config.frequency(channel))?;
            self.registers
                .poke_byte(channel.width_select(), ValueSelect::ADVANCED_DEFAULT)?;
        }
        info!("Channels initialized");
        Ok(())
    }

    /// Intensity register value `level` maps to on `channel`
    pub fn channel_value(&self, channel: Channel, level: f64) -> u8 {
        intensity_value(level, self.config.range(channel), self.config.gamma)
    }

    /// Write a raw intensity register value
    pub fn set_channel_value(&self, channel: Channel, value: u8) -> Result<(), DeviceError> {
        self.registers.poke_byte(channel.intensity(), value)?;
        Ok(())
    }

    /// Drive `channel` at a normalized level
    pub fn set_channel_level(&self, channel: Channel, level: f64) -> Result<(), DeviceError> {
        self.set_channel_value(channel, self.channel_value(channel, level))
    }

    /// Drive both channels
    pub fn set_levels(&self, levels: ChannelLevels) -> Result<(), DeviceError> {
        for channel in Channel::ALL {
            self.set_channel_level(channel, levels.get(channel))?;
        }
        Ok(())
    }

    /// Zero both channel intensities
    pub fn reset_channels(&self) -> Result<(), DeviceError> {
        for channel in Channel::ALL {
            self.set_channel_value(channel, 0)?;
        }
        debug!("Channels reset");
        Ok(())
    }
}
