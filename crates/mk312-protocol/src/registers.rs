//! Register address map
//!
//! The box exposes a flat 16-bit address space split into three disjoint
//! regions:
//!
//! - **ROM** (`0x0000..=0x00FF`): firmware identification, read-only
//! - **RAM** (`0x4000..=0x4238`): live control registers and mirrored CPU state
//! - **EEPROM** (`0x8000..=0x81FF`): persisted factory and user defaults
//!
//! Each output channel owns a block of RAM laid out identically; channel B
//! sits 0x100 above channel A.

/// Address region an address falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// Firmware ROM
    Rom,
    /// Live RAM
    Ram,
    /// Persistent EEPROM
    Eeprom,
    /// Outside every mapped region
    Unmapped,
}

/// Classify an address into its region
pub fn region(address: u16) -> Region {
    match address {
        rom::START..=rom::END => Region::Rom,
        ram::START..=ram::END => Region::Ram,
        eeprom::START..=eeprom::END => Region::Eeprom,
        _ => Region::Unmapped,
    }
}

/// Firmware ROM
pub mod rom {
    /// First ROM address
    pub const START: u16 = 0x0000;
    /// Last ROM address
    pub const END: u16 = 0x00FF;

    /// Box model byte
    pub const BOX_MODEL: u16 = 0x00FC;
    /// Firmware version, major
    pub const VERSION_MAJOR: u16 = 0x00FD;
    /// Firmware version, minor
    pub const VERSION_MINOR: u16 = 0x00FE;
    /// Firmware version, internal revision
    pub const VERSION_INTERNAL: u16 = 0x00FF;
}

/// Live RAM
pub mod ram {
    /// First RAM address
    pub const START: u16 = 0x4000;
    /// Last RAM address
    pub const END: u16 = 0x4238;

    /// CPU register r15, holds the ADC control flags
    pub const CPU_FLAGS: u16 = 0x400F;
    /// Bit in [`CPU_FLAGS`] that disables the front-panel ADC inputs
    pub const ADC_DISABLE_BIT: u8 = 0x01;

    /// Power supply voltage sample
    pub const ADC_POWER_SUPPLY: u16 = 0x4060;
    /// Battery voltage sample
    pub const ADC_BATTERY: u16 = 0x4061;
    /// Level A potentiometer
    pub const ADC_LEVEL_A: u16 = 0x4062;
    /// Level B potentiometer
    pub const ADC_LEVEL_B: u16 = 0x4063;
    /// Audio input A
    pub const ADC_AUDIO_A: u16 = 0x4064;
    /// Audio input B
    pub const ADC_AUDIO_B: u16 = 0x4065;
    /// Multi-adjust potentiometer
    pub const ADC_MULTI_ADJUST: u16 = 0x4066;

    /// Menu state
    pub const MENU_STATE: u16 = 0x406D;
    /// Primary box command register, reads back `BoxCommand::None` when idle
    pub const BOX_COMMAND_1: u16 = 0x4070;
    /// Secondary box command register
    pub const BOX_COMMAND_2: u16 = 0x4071;
    /// Currently running mode
    pub const CURRENT_MODE: u16 = 0x407B;
    /// Output control flags
    pub const OUTPUT_FLAGS: u16 = 0x4083;
    /// Multi-adjust range minimum
    pub const MULTI_ADJUST_MIN: u16 = 0x4086;
    /// Multi-adjust range maximum
    pub const MULTI_ADJUST_MAX: u16 = 0x4087;

    /// Base of the channel A register block
    pub const CHANNEL_A_BASE: u16 = 0x4000;
    /// Base of the channel B register block
    pub const CHANNEL_B_BASE: u16 = 0x4100;

    /// Character to write with `BoxCommand::WriteLcdCharacter`
    pub const LCD_PARAMETER: u16 = 0x4180;
    /// Display position for `BoxCommand::WriteLcdCharacter`
    pub const LCD_POSITION: u16 = 0x4181;

    /// Current power level
    pub const POWER_LEVEL: u16 = 0x41F4;
    /// Active top-level mode in the menu
    pub const TOP_MODE: u16 = 0x41F3;
    /// Split mode channel A program
    pub const SPLIT_MODE_A: u16 = 0x41F5;
    /// Split mode channel B program
    pub const SPLIT_MODE_B: u16 = 0x41F6;
    /// Box encryption key
    pub const BOX_KEY: u16 = 0x4213;
}

/// Persistent EEPROM
pub mod eeprom {
    /// First EEPROM address
    pub const START: u16 = 0x8000;
    /// Last EEPROM address
    pub const END: u16 = 0x81FF;

    /// Non-zero once the box has been provisioned
    pub const PROVISIONED: u16 = 0x8001;
    /// Serial number (two bytes)
    pub const BOX_SERIAL: u16 = 0x8002;
    /// ELink signature, first byte
    pub const ELINK_SIG1: u16 = 0x8006;
    /// ELink signature, second byte
    pub const ELINK_SIG2: u16 = 0x8007;
    /// Top mode restored at power on
    pub const TOP_MODE: u16 = 0x8008;
    /// Power level restored at power on
    pub const POWER_LEVEL: u16 = 0x8009;
    /// Split mode channel A program
    pub const SPLIT_A_MODE: u16 = 0x800A;
    /// Split mode channel B program
    pub const SPLIT_B_MODE: u16 = 0x800B;
    /// Favourite mode
    pub const FAVOURITE_MODE: u16 = 0x800C;
    /// Advanced parameter: ramp level
    pub const ADV_RAMP_LEVEL: u16 = 0x800D;
    /// Advanced parameter: ramp time
    pub const ADV_RAMP_TIME: u16 = 0x800E;
    /// Advanced parameter: depth
    pub const ADV_DEPTH: u16 = 0x800F;
    /// Advanced parameter: tempo
    pub const ADV_TEMPO: u16 = 0x8010;
    /// Advanced parameter: frequency
    pub const ADV_FREQUENCY: u16 = 0x8011;
    /// Advanced parameter: effect
    pub const ADV_EFFECT: u16 = 0x8012;
    /// Advanced parameter: width
    pub const ADV_WIDTH: u16 = 0x8013;
    /// Advanced parameter: pace
    pub const ADV_PACE: u16 = 0x8014;
    /// First byte of the user routine area
    pub const USER_ROUTINES: u16 = 0x8018;
}

/// Offsets of the per-channel RAM registers, relative to the channel base
///
/// Each modulated parameter (ramp, intensity, frequency, width) is a group of
/// nine consecutive registers: value, min, max, rate, step, action at min,
/// action at max, select, timer.
pub mod channel_offset {
    /// Current gate state
    pub const GATE_VALUE: u16 = 0x90;
    /// Gate on time
    pub const GATE_ON_TIME: u16 = 0x98;
    /// Gate off time
    pub const GATE_OFF_TIME: u16 = 0x99;
    /// Gate select, see `Gate`
    pub const GATE_SELECT: u16 = 0x9A;
    /// Ramp parameter group
    pub const RAMP: u16 = 0x9C;
    /// Intensity parameter group
    pub const INTENSITY: u16 = 0xA5;
    /// Frequency parameter group
    pub const FREQUENCY: u16 = 0xAE;
    /// Width parameter group
    pub const WIDTH: u16 = 0xB7;

    /// Offset of the value register inside a parameter group
    pub const VALUE: u16 = 0;
    /// Offset of the minimum register inside a parameter group
    pub const MIN: u16 = 1;
    /// Offset of the maximum register inside a parameter group
    pub const MAX: u16 = 2;
    /// Offset of the rate register inside a parameter group
    pub const RATE: u16 = 3;
    /// Offset of the step register inside a parameter group
    pub const STEP: u16 = 4;
    /// Offset of the action-at-min register inside a parameter group
    pub const ACTION_MIN: u16 = 5;
    /// Offset of the action-at-max register inside a parameter group
    pub const ACTION_MAX: u16 = 6;
    /// Offset of the select register inside a parameter group
    pub const SELECT: u16 = 7;
    /// Offset of the timer register inside a parameter group
    pub const TIMER: u16 = 8;
}

/// Output channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Channel {
    A,
    B,
}

impl Channel {
    /// Both channels, A first
    pub const ALL: [Channel; 2] = [Channel::A, Channel::B];

    /// Base address of this channel's register block
    pub fn base(self) -> u16 {
        match self {
            Channel::A => ram::CHANNEL_A_BASE,
            Channel::B => ram::CHANNEL_B_BASE,
        }
    }

    /// Absolute address of a channel register
    pub fn register(self, offset: u16) -> u16 {
        self.base() + offset
    }

    /// Gate select register
    pub fn gate_select(self) -> u16 {
        self.register(channel_offset::GATE_SELECT)
    }

    /// Intensity value register
    pub fn intensity(self) -> u16 {
        self.register(channel_offset::INTENSITY + channel_offset::VALUE)
    }

    /// Intensity select register
    pub fn intensity_select(self) -> u16 {
        self.register(channel_offset::INTENSITY + channel_offset::SELECT)
    }

    /// Frequency value register
    pub fn frequency(self) -> u16 {
        self.register(channel_offset::FREQUENCY + channel_offset::VALUE)
    }

    /// Frequency select register
    pub fn frequency_select(self) -> u16 {
        self.register(channel_offset::FREQUENCY + channel_offset::SELECT)
    }

    /// Width value register
    pub fn width(self) -> u16 {
        self.register(channel_offset::WIDTH + channel_offset::VALUE)
    }

    /// Width select register
    pub fn width_select(self) -> u16 {
        self.register(channel_offset::WIDTH + channel_offset::SELECT)
    }

    /// Ramp value register
    pub fn ramp(self) -> u16 {
        self.register(channel_offset::RAMP + channel_offset::VALUE)
    }

    /// Single-letter name
    pub fn name(self) -> &'static str {
        match self {
            Channel::A => "A",
            Channel::B => "B",
        }
    }
}
