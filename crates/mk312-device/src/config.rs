//! Device configuration

use std::time::Duration;

use mk312_protocol::Channel;
use serde::{Deserialize, Serialize};

/// Frequency register value written to both channels by default
pub const DEFAULT_FREQUENCY: u8 = 0x16;

/// Intensity register values a channel is driven between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRange {
    /// Register value at level 0.0
    pub min: u8,
    /// Register value at level 1.0
    pub max: u8,
}

impl Default for ChannelRange {
    fn default() -> Self {
        Self { min: 0, max: 255 }
    }
}

/// How a single position is split across the two channels
///
/// Channel A follows the inverse of the position and channel B follows the
/// position itself. `fade` is the floor a channel never falls below, as a
/// fraction of full scale. `balance` in -1.0..=1.0 attenuates channel A when
/// positive and channel B when negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelMix {
    pub fade: f64,
    pub balance: f64,
}

impl Default for ChannelMix {
    fn default() -> Self {
        Self {
            fade: 0.0,
            balance: 0.0,
        }
    }
}

/// Throttling and shutdown parameters for a [`DeviceScheduler`](crate::DeviceScheduler)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Minimum time from one dispatch to the next
    pub min_delay_between_commands: Duration,
    /// How long close waits for the consumer thread
    pub join_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_delay_between_commands: Duration::from_millis(166),
            join_timeout: Duration::from_secs(1),
        }
    }
}

/// Configuration for the device facade and its real-time loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Intensity register range for channel A
    pub channel_a: ChannelRange,
    /// Intensity register range for channel B
    pub channel_b: ChannelRange,
    /// Frequency register value for channel A at initialization
    pub frequency_a: u8,
    /// Frequency register value for channel B at initialization
    pub frequency_b: u8,
    /// Exponent applied to normalized levels before scaling
    pub gamma: f64,
    /// Position to channel split
    pub mix: ChannelMix,
    /// Interpolator tick period
    pub tick_interval: Duration,
    /// Delay between polls of the box command register
    pub command_poll_interval: Duration,
    /// Polls before a box command is considered stuck
    pub command_poll_attempts: u32,
    /// Command scheduler settings
    pub scheduler: SchedulerConfig,
}

impl DeviceConfig {
    /// Intensity range configured for `channel`
    pub fn range(&self, channel: Channel) -> ChannelRange {
        match channel {
            Channel::A => self.channel_a,
            Channel::B => self.channel_b,
        }
    }

    /// Initial frequency register value for `channel`
    pub fn frequency(&self, channel: Channel) -> u8 {
        match channel {
            Channel::A => self.frequency_a,
            Channel::B => self.frequency_b,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            channel_a: ChannelRange::default(),
            channel_b: ChannelRange::default(),
            frequency_a: DEFAULT_FREQUENCY,
            frequency_b: DEFAULT_FREQUENCY,
            gamma: 1.5,
            mix: ChannelMix::default(),
            tick_interval: Duration::from_micros(8_333),
            command_poll_interval: Duration::from_millis(5),
            command_poll_attempts: 50,
            scheduler: SchedulerConfig::default(),
        }
    }
}
