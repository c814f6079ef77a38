//! Modes, box commands, and channel register values

use crate::error::FrameError;

/// Built-in program modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    Waves = 0x76,
    Stroke = 0x77,
    Climb = 0x78,
    Combo = 0x79,
    Intense = 0x7A,
    Rhythm = 0x7B,
    Audio1 = 0x7C,
    Audio2 = 0x7D,
    Audio3 = 0x7E,
    Split = 0x7F,
    Random1 = 0x80,
    Random2 = 0x81,
    Toggle = 0x82,
    Orgasm = 0x83,
    Torment = 0x84,
    Phase1 = 0x85,
    Phase2 = 0x86,
    Phase3 = 0x87,
    User1 = 0x88,
    User2 = 0x89,
    User3 = 0x8A,
    User4 = 0x8B,
    User5 = 0x8C,
    User6 = 0x8D,
    User7 = 0x8E,
}

impl Mode {
    /// Every mode in firmware order
    pub const ALL: [Mode; 25] = [
        Mode::Waves,
        Mode::Stroke,
        Mode::Climb,
        Mode::Combo,
        Mode::Intense,
        Mode::Rhythm,
        Mode::Audio1,
        Mode::Audio2,
        Mode::Audio3,
        Mode::Split,
        Mode::Random1,
        Mode::Random2,
        Mode::Toggle,
        Mode::Orgasm,
        Mode::Torment,
        Mode::Phase1,
        Mode::Phase2,
        Mode::Phase3,
        Mode::User1,
        Mode::User2,
        Mode::User3,
        Mode::User4,
        Mode::User5,
        Mode::User6,
        Mode::User7,
    ];

    /// Name as shown on the box display
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Waves => "Waves",
            Mode::Stroke => "Stroke",
            Mode::Climb => "Climb",
            Mode::Combo => "Combo",
            Mode::Intense => "Intense",
            Mode::Rhythm => "Rhythm",
            Mode::Audio1 => "Audio 1",
            Mode::Audio2 => "Audio 2",
            Mode::Audio3 => "Audio 3",
            Mode::Split => "Split",
            Mode::Random1 => "Random 1",
            Mode::Random2 => "Random 2",
            Mode::Toggle => "Toggle",
            Mode::Orgasm => "Orgasm",
            Mode::Torment => "Torment",
            Mode::Phase1 => "Phase 1",
            Mode::Phase2 => "Phase 2",
            Mode::Phase3 => "Phase 3",
            Mode::User1 => "User 1",
            Mode::User2 => "User 2",
            Mode::User3 => "User 3",
            Mode::User4 => "User 4",
            Mode::User5 => "User 5",
            Mode::User6 => "User 6",
            Mode::User7 => "User 7",
        }
    }

    /// Look a mode up by its display name, ignoring case and spaces
    pub fn from_name(name: &str) -> Option<Mode> {
        let wanted: String = name
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL.into_iter().find(|m| {
            m.name()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_lowercase()
                == wanted
        })
    }
}

impl TryFrom<u8> for Mode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        Self::ALL
            .into_iter()
            .find(|m| *m as u8 == value)
            .ok_or(FrameError::InvalidReply(value))
    }
}

impl From<Mode> for u8 {
    fn from(mode: Mode) -> u8 {
        mode as u8
    }
}

/// Commands executed by writing to the box command register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxCommand {
    /// Show the status screen
    DisplayStatus = 0x02,
    /// Select the highlighted menu item
    SelectMenuItem = 0x03,
    /// Leave the menu
    ExitMenu = 0x04,
    /// Swap channel A and B parameters
    SwapChannels = 0x0A,
    /// Copy channel A parameters to B
    CopyAToB = 0x0B,
    /// Copy channel B parameters to A
    CopyBToA = 0x0C,
    /// Advance to the next mode
    NextMode = 0x10,
    /// Go back to the previous mode
    PreviousMode = 0x11,
    /// Start the mode stored in the current mode register
    NewMode = 0x12,
    /// Write the character in the LCD parameter register
    WriteLcdCharacter = 0x13,
    /// Write the number in the LCD parameter register
    WriteLcdNumber = 0x14,
    /// Write a stored string
    WriteLcdString = 0x15,
    /// Load a mode module
    LoadModule = 0x16,
    /// Apply the power level register
    SetPowerLevel = 0x21,
    /// Idle; the command register returns to this once a command completes
    None = 0xFF,
}

impl From<BoxCommand> for u8 {
    fn from(command: BoxCommand) -> u8 {
        command as u8
    }
}

/// Gate select register values
pub struct Gate;

impl Gate {
    /// No gating, output runs continuously
    pub const OFF: u8 = 0x06;
    /// Gate on/off times from the gate time registers
    pub const ON: u8 = 0x07;
    /// Gate timing from the advanced tempo parameter
    pub const ADVANCED_TEMPO: u8 = 0x0E;
    /// Gate timing from the multi-adjust knob
    pub const MULTI_ADJUST: u8 = 0x16;
}

/// Parameter select register values
pub struct ValueSelect;

impl ValueSelect {
    /// Use the value register as-is
    pub const STATIC: u8 = 0x00;
    /// Take the value from the advanced menu default
    pub const ADVANCED_DEFAULT: u8 = 0x04;
    /// Take the value from the multi-adjust knob
    pub const MULTI_ADJUST: u8 = 0x08;
    /// Take the value from the other channel
    pub const OTHER_CHANNEL: u8 = 0x0C;
    /// Sweep between min and max at the group rate
    pub const RATE: u8 = 0x01;
}

/// Ramp action values used in the action-at-min and action-at-max registers
///
/// `STOP` and `TOGGLE_GATE` share a value in the firmware table.
pub struct Ramp;

impl Ramp {
    /// Stop ramping
    pub const STOP: u8 = 0xFC;
    /// Toggle the gate
    pub const TOGGLE_GATE: u8 = 0xFC;
    /// Loop back to the other bound
    pub const LOOP: u8 = 0xFD;
    /// Reverse direction and toggle the gate
    pub const REVERSE_AND_TOGGLE: u8 = 0xFE;
    /// Reverse direction
    pub const REVERSE: u8 = 0xFF;
}
