//! Real-time channel interpolation
//!
//! Commands only record a motion; a dedicated thread turns the motion into
//! register writes at a fixed tick. Command arrival never waits on the box.
//!
//! # Tick
//!
//! 1. Snapshot the [`MotionState`] under its lock; skip the tick when stopped
//! 2. Compute the position for `now`, clamped to 0..=100
//! 3. Split it across both channels and apply the gamma curve
//! 4. Poke only the channels whose register value changed
//!
//! Failed writes are logged and retried on the next tick. A tick holds the
//! output lock while writing, so [`Interpolator::stop`] never interleaves
//! with one. The computed position is published before the writes, so
//! readers of [`Interpolator::current_level`] never wait on the box.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use mk312_link::RegisterAccess;
use mk312_protocol::Channel;
use tracing::{debug, error, warn};

use crate::channel::ChannelLevels;
use crate::config::ChannelMix;
use crate::error::DeviceError;
use crate::mk312::Mk312;

/// Highest position a motion can reach
pub const MAX_LEVEL: f64 = 100.0;

/// A linear move from one position to another
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionState {
    pub action_time: Instant,
    pub action_level: f64,
    pub target_time: Instant,
    pub target_level: f64,
}

impl MotionState {
    /// Hold `level` from `now` on
    pub fn hold(level: f64, now: Instant) -> Self {
        Self {
            action_time: now,
            action_level: level,
            target_time: now,
            target_level: level,
        }
    }

    /// Move from `from` to `to` over `duration`, starting at `now`
    pub fn start(from: f64, to: f64, duration: Duration, now: Instant) -> Self {
        Self {
            action_time: now,
            action_level: from,
            target_time: now + duration,
            target_level: to,
        }
    }

    /// Position at `now`, clamped to 0..=100
    pub fn level_at(&self, now: Instant) -> f64 {
        let level = if now >= self.target_time {
            self.target_level
        } else if now <= self.action_time {
            self.action_level
        } else {
            let span = (self.target_time - self.action_time).as_secs_f64();
            let elapsed = (now - self.action_time).as_secs_f64();
            self.action_level + (self.target_level - self.action_level) * elapsed / span
        };

        if level.is_nan() {
            0.0
        } else {
            level.clamp(0.0, MAX_LEVEL)
        }
    }

    /// Whether the move has finished by `now`
    pub fn is_settled(&self, now: Instant) -> bool {
        now >= self.target_time
    }
}

/// Register values the loop last put on the wire
#[derive(Debug, Clone, Copy, Default)]
struct Output {
    values: [Option<u8>; 2],
}

/// Position the loop last computed
#[derive(Debug, Clone, Copy, Default)]
struct Published {
    level: f64,
    levels: ChannelLevels,
}

struct Shared {
    /// `None` while stopped
    motion: Mutex<Option<MotionState>>,
    output: Mutex<Output>,
    published: Mutex<Published>,
    running: AtomicBool,
}

impl Shared {
    fn motion(&self) -> Option<MotionState> {
        *self.motion.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_motion(&self, motion: Option<MotionState>) {
        *self.motion.lock().unwrap_or_else(PoisonError::into_inner) = motion;
    }

    fn output(&self) -> MutexGuard<'_, Output> {
        self.output.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn published(&self) -> Published {
        *self.published.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, level: f64, levels: ChannelLevels) {
        *self.published.lock().unwrap_or_else(PoisonError::into_inner) =
            Published { level, levels };
    }
}

/// Background loop driving both channels from a [`MotionState`]
pub struct Interpolator<R: RegisterAccess + 'static> {
    device: Arc<Mk312<R>>,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<R: RegisterAccess + 'static> Interpolator<R> {
    /// Start the loop in the stopped state
    ///
    /// Both channels are assumed to be at zero, as after
    /// [`Mk312::initialize_channels`].
    pub fn spawn(device: Arc<Mk312<R>>) -> Result<Self, DeviceError> {
        let shared = Arc::new(Shared {
            motion: Mutex::new(None),
            output: Mutex::new(Output {
                values: [Some(0); 2],
            }),
            published: Mutex::new(Published::default()),
            running: AtomicBool::new(true),
        });

        let worker = {
            let device = Arc::clone(&device);
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("mk312-interpolator".to_string())
                .spawn(move || Self::run(device, shared))?
        };

        Ok(Self {
            device,
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Begin a new move; returns without touching the box
    pub fn set(&self, from: f64, to: f64, duration: Duration) {
        self.shared
            .set_motion(Some(MotionState::start(from, to, duration, Instant::now())));
    }

    /// Snapshot of the current move, `None` while stopped
    pub fn motion(&self) -> Option<MotionState> {
        self.shared.motion()
    }

    /// Position the loop last computed
    pub fn current_level(&self) -> f64 {
        self.shared.published().level
    }

    /// Channel levels the loop last computed
    pub fn levels(&self) -> ChannelLevels {
        self.shared.published().levels
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Abandon the current move and zero both channels
    ///
    /// The loop writes nothing more until the next [`set`](Self::set).
    pub fn stop(&self) {
        let mut output = self.shared.output();
        self.shared.set_motion(None);
        self.shared.publish(0.0, ChannelLevels::default());
        match self.device.reset_channels() {
            Ok(()) => output.values = [Some(0); 2],
            Err(e) => {
                warn!("Failed to reset channels: {}", e);
                output.values = [None; 2];
            }
        }
    }

    /// Stop the loop and wait for it to exit
    pub fn shutdown(&self) {
        self.shared.running.store(false, Ordering::Release);
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!("Interpolator thread panicked");
            }
        }
    }

    fn run(device: Arc<Mk312<R>>, shared: Arc<Shared>) {
        let tick = device.config().tick_interval;
        let mix = device.config().mix;
        debug!("Interpolator started, tick {:?}", tick);

        while shared.running.load(Ordering::Acquire) {
            let started = Instant::now();
            Self::tick(&device, &shared, started, mix);

            if let Some(remaining) = tick.checked_sub(started.elapsed()) {
                thread::sleep(remaining);
            }
        }
        debug!("Interpolator stopped");
    }

    fn tick(device: &Mk312<R>, shared: &Shared, now: Instant, mix: ChannelMix) {
        let mut output = shared.output();
        let Some(motion) = shared.motion() else {
            return;
        };

        let level = motion.level_at(now);
        let levels = mix.levels(level / MAX_LEVEL);
        shared.publish(level, levels);

        for (index, channel) in Channel::ALL.into_iter().enumerate() {
            let value = device.channel_value(channel, levels.get(channel));
            if output.values[index] == Some(value) {
                continue;
            }
            match device.set_channel_value(channel, value) {
                Ok(()) => output.values[index] = Some(value),
                Err(e) => {
                    output.values[index] = None;
                    warn!("Channel {} write failed: {}", channel.name(), e);
                }
            }
        }
    }
}

impl<R: RegisterAccess + 'static> Drop for Interpolator<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
