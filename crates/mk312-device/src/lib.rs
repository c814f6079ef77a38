//! MK312 Device Library
//!
//! This crate drives a connected box at the level of named operations:
//!
//! - **Mk312**: mode, display, ADC, rekeying, box commands, and channel
//!   output over any [`RegisterAccess`](mk312_link::RegisterAccess)
//! - **Interpolator**: a fixed-rate loop that moves both channels along
//!   linear position ramps without blocking the caller
//! - **DeviceScheduler**: throttled single-consumer dispatch of positional
//!   commands to any [`Device`]
//! - **Mk312Device**: the box wired up as a [`Device`]
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mk312_device::{DeviceCommandInformation, DeviceConfig, DeviceScheduler, Mk312Device};
//! use mk312_link::{LinkConfig, SerialConfig, SerialTransport};
//!
//! let transport = SerialTransport::new(SerialConfig::new("/dev/ttyUSB0"));
//! let config = DeviceConfig::default();
//! let scheduler_config = config.scheduler.clone();
//!
//! let device = Arc::new(Mk312Device::connect(transport, LinkConfig::default(), config).unwrap());
//! let scheduler = DeviceScheduler::new(device, scheduler_config).unwrap();
//!
//! scheduler
//!     .enqueue(DeviceCommandInformation::new(0.0, 100.0, Duration::from_secs(2)))
//!     .unwrap();
//! std::thread::sleep(Duration::from_secs(2));
//! scheduler.stop();
//! scheduler.close();
//! ```

pub mod backend;
pub mod channel;
pub mod config;
pub mod error;
pub mod interpolator;
pub mod mk312;
pub mod pending;
pub mod scheduler;

pub use backend::Mk312Device;
pub use channel::{intensity_value, ChannelLevels};
pub use config::{ChannelMix, ChannelRange, DeviceConfig, SchedulerConfig};
pub use error::DeviceError;
pub use interpolator::{Interpolator, MotionState};
pub use mk312::{Mk312, DISPLAY_WIDTH};
pub use pending::PendingQueue;
pub use scheduler::{Device, DeviceCommandInformation, DeviceScheduler};
