//! MK312 box as a schedulable [`Device`]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mk312_link::{LinkConfig, QueuedRegisters, RegisterAccess, Transport};
use tracing::{info, warn};

use crate::channel::ChannelLevels;
use crate::config::DeviceConfig;
use crate::error::DeviceError;
use crate::interpolator::{Interpolator, MotionState};
use crate::mk312::Mk312;
use crate::scheduler::{Device, DeviceCommandInformation};

/// A connected box whose channels follow positional commands in real time
pub struct Mk312Device<R: RegisterAccess + 'static> {
    name: String,
    mk312: Arc<Mk312<R>>,
    interpolator: Interpolator<R>,
    torn_down: AtomicBool,
}

impl<T: Transport + 'static> Mk312Device<QueuedRegisters<T>> {
    /// Connect over `transport` with queued register access
    pub fn connect(
        transport: T,
        link_config: LinkConfig,
        config: DeviceConfig,
    ) -> Result<Self, DeviceError> {
        let name = transport.connector_name();
        let mk312 = Mk312::connect(transport, link_config, config)?;
        Self::new(name, mk312)
    }
}

impl<R: RegisterAccess + 'static> Mk312Device<R> {
    /// Initialize both channels and start the interpolation loop
    pub fn new(name: impl Into<String>, mk312: Mk312<R>) -> Result<Self, DeviceError> {
        let name = name.into();
        mk312.initialize_channels()?;
        let mk312 = Arc::new(mk312);
        let interpolator = Interpolator::spawn(Arc::clone(&mk312))?;
        info!("{} ready", name);

        Ok(Self {
            name,
            mk312,
            interpolator,
            torn_down: AtomicBool::new(false),
        })
    }

    /// Facade for direct box operations
    pub fn mk312(&self) -> &Mk312<R> {
        &self.mk312
    }

    /// Position the loop last computed, 0..=100
    pub fn current_level(&self) -> f64 {
        self.interpolator.current_level()
    }

    /// Channel levels the loop last computed
    pub fn levels(&self) -> ChannelLevels {
        self.interpolator.levels()
    }

    /// Current move, `None` while stopped
    pub fn motion(&self) -> Option<MotionState> {
        self.interpolator.motion()
    }
}

impl<R: RegisterAccess + 'static> Device for Mk312Device<R> {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn set(&self, command: DeviceCommandInformation) -> Result<(), DeviceError> {
        self.interpolator.set(command.from, command.to, command.duration);
        Ok(())
    }

    fn stop_internal(&self) {
        self.interpolator.stop();
    }

    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.interpolator.shutdown();
        if let Err(e) = self.mk312.reset_channels() {
            warn!("{}: failed to zero channels on teardown: {}", self.name, e);
        }
        if let Err(e) = self.mk312.disconnect() {
            warn!("{}: disconnect failed: {}", self.name, e);
        }
        info!("{} torn down", self.name);
    }
}

impl<R: RegisterAccess + 'static> Drop for Mk312Device<R> {
    fn drop(&mut self) {
        self.teardown();
    }
}
