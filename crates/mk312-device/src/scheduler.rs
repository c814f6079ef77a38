//! Per-device command scheduling
//!
//! Callers can produce position commands far faster than hardware should
//! receive them. [`DeviceScheduler`] keeps at most a short queue of pending
//! commands, folds similar ones together, and dispatches them from one
//! consumer thread with a minimum spacing between dispatches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

use crate::config::SchedulerConfig;
use crate::error::DeviceError;
use crate::pending::PendingQueue;

/// One positional move for a device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceCommandInformation {
    /// Starting position, 0..=100
    pub from: f64,
    /// Target position, 0..=100
    pub to: f64,
    /// Time to reach the target
    pub duration: Duration,
}

impl DeviceCommandInformation {
    pub fn new(from: f64, to: f64, duration: Duration) -> Self {
        Self { from, to, duration }
    }

    /// Whether the targets differ by less than `tolerance`
    pub fn is_similar(&self, other: &Self, tolerance: f64) -> bool {
        (self.to - other.to).abs() < tolerance
    }
}

/// Something that can be driven by a [`DeviceScheduler`]
pub trait Device: Send + Sync + 'static {
    /// Name for logging
    fn name(&self) -> String;

    /// Start executing `command`
    fn set(&self, command: DeviceCommandInformation) -> Result<(), DeviceError>;

    /// Halt output immediately
    fn stop_internal(&self);

    /// Release the hardware
    fn teardown(&self);
}

type Similarity =
    dyn Fn(&DeviceCommandInformation, &DeviceCommandInformation) -> bool + Send + Sync;

/// Similarity used by [`DeviceScheduler::new`]: targets within 10 units
pub const DEFAULT_SIMILARITY_TOLERANCE: f64 = 10.0;

struct Worker {
    handle: JoinHandle<()>,
    done: mpsc::Receiver<()>,
}

/// Throttled single-consumer dispatcher for one device
pub struct DeviceScheduler<D: Device> {
    device: Arc<D>,
    queue: Arc<PendingQueue<DeviceCommandInformation>>,
    enabled: Arc<AtomicBool>,
    similar: Box<Similarity>,
    join_timeout: Duration,
    worker: Mutex<Option<Worker>>,
}

impl<D: Device> DeviceScheduler<D> {
    /// Start a scheduler that folds commands with targets within
    /// [`DEFAULT_SIMILARITY_TOLERANCE`] of each other
    pub fn new(device: Arc<D>, config: SchedulerConfig) -> Result<Self, DeviceError> {
        Self::with_similarity(device, config, |queued, new| {
            queued.is_similar(new, DEFAULT_SIMILARITY_TOLERANCE)
        })
    }

    /// Start a scheduler with a caller-defined similarity rule
    pub fn with_similarity<F>(
        device: Arc<D>,
        config: SchedulerConfig,
        similar: F,
    ) -> Result<Self, DeviceError>
    where
        F: Fn(&DeviceCommandInformation, &DeviceCommandInformation) -> bool
            + Send
            + Sync
            + 'static,
    {
        let queue = Arc::new(PendingQueue::new());
        let enabled = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = mpsc::channel();

        let handle = {
            let device = Arc::clone(&device);
            let queue = Arc::clone(&queue);
            let enabled = Arc::clone(&enabled);
            let min_delay = config.min_delay_between_commands;
            thread::Builder::new()
                .name(format!("mk312-scheduler {}", device.name()))
                .spawn(move || {
                    Self::consume(&*device, &queue, &enabled, min_delay);
                    let _ = done_tx.send(());
                })?
        };

        Ok(Self {
            device,
            queue,
            enabled,
            similar: Box::new(similar),
            join_timeout: config.join_timeout,
            worker: Mutex::new(Some(Worker {
                handle,
                done: done_rx,
            })),
        })
    }

    fn consume(
        device: &D,
        queue: &PendingQueue<DeviceCommandInformation>,
        enabled: &AtomicBool,
        min_delay: Duration,
    ) {
        debug!("Scheduler for {} started", device.name());
        while let Some(command) = queue.pop() {
            if !enabled.load(Ordering::Acquire) {
                trace!("Dropping {:?}, device disabled", command);
                continue;
            }

            let started = Instant::now();
            if let Err(e) = device.set(command) {
                warn!("{}: command failed: {}", device.name(), e);
            }

            if let Some(remaining) = min_delay.checked_sub(started.elapsed()) {
                if queue.wait_closed(remaining) {
                    break;
                }
            }
        }
        debug!("Scheduler for {} stopped", device.name());
    }

    /// Queue `command`, replacing a pending similar one
    pub fn enqueue(&self, command: DeviceCommandInformation) -> Result<(), DeviceError> {
        let accepted = self
            .queue
            .replace_existing(command, |queued| (self.similar)(queued, &command));
        if accepted {
            Ok(())
        } else {
            Err(DeviceError::SchedulerClosed)
        }
    }

    /// Drop pending commands and halt the device
    pub fn stop(&self) {
        let dropped = self.queue.clear();
        debug!(
            "{}: stop, {} pending command(s) dropped",
            self.device.name(),
            dropped
        );
        self.device.stop_internal();
    }

    /// Accept or silently drop commands at dispatch time
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Commands waiting for dispatch
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Stop the consumer thread and tear the device down
    ///
    /// A consumer still busy after the join timeout is detached. Calling this
    /// twice is a no-op.
    pub fn close(&self) {
        let Some(worker) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        self.queue.close();
        match worker.done.recv_timeout(self.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    error!("Scheduler thread for {} panicked", self.device.name());
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Scheduler thread for {} did not exit within {:?}, detaching",
                    self.device.name(),
                    self.join_timeout
                );
            }
        }
        self.device.teardown();
    }
}

impl<D: Device> Drop for DeviceScheduler<D> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingDevice {
        commands: Mutex<Vec<DeviceCommandInformation>>,
        dispatched_at: Mutex<Vec<Instant>>,
        stops: Mutex<u32>,
        torn_down: AtomicBool,
        slow: Option<Duration>,
    }

    impl Device for RecordingDevice {
        fn name(&self) -> String {
            "recorder".to_string()
        }

        fn set(&self, command: DeviceCommandInformation) -> Result<(), DeviceError> {
            self.dispatched_at.lock().unwrap().push(Instant::now());
            self.commands.lock().unwrap().push(command);
            if let Some(delay) = self.slow {
                thread::sleep(delay);
            }
            Ok(())
        }

        fn stop_internal(&self) {
            *self.stops.lock().unwrap() += 1;
        }

        fn teardown(&self) {
            self.torn_down.store(true, Ordering::SeqCst);
        }
    }

    fn config(min_delay_ms: u64) -> SchedulerConfig {
        SchedulerConfig {
            min_delay_between_commands: Duration::from_millis(min_delay_ms),
            join_timeout: Duration::from_millis(500),
        }
    }

    fn cmd(to: f64) -> DeviceCommandInformation {
        DeviceCommandInformation::new(0.0, to, Duration::from_millis(100))
    }

    fn wait_for<F: Fn() -> bool>(condition: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_similarity() {
        assert!(cmd(50.0).is_similar(&cmd(55.0), 10.0));
        assert!(!cmd(50.0).is_similar(&cmd(60.0), 10.0));
    }

    #[test]
    fn test_dispatch_respects_min_delay() {
        let device = Arc::new(RecordingDevice::default());
        let scheduler = DeviceScheduler::new(Arc::clone(&device), config(50)).unwrap();

        scheduler.enqueue(cmd(0.0)).unwrap();
        scheduler.enqueue(cmd(40.0)).unwrap();
        scheduler.enqueue(cmd(80.0)).unwrap();
        wait_for(|| device.commands.lock().unwrap().len() == 3);

        let times = device.dispatched_at.lock().unwrap().clone();
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(50));
        }
        scheduler.close();
    }

    #[test]
    fn test_similar_pending_command_is_replaced() {
        let device = Arc::new(RecordingDevice {
            slow: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        let scheduler = DeviceScheduler::new(Arc::clone(&device), config(0)).unwrap();

        scheduler.enqueue(cmd(0.0)).unwrap();
        wait_for(|| device.commands.lock().unwrap().len() == 1);
        // Dispatch of the first command is still in progress
        scheduler.enqueue(cmd(50.0)).unwrap();
        scheduler.enqueue(cmd(52.0)).unwrap();
        scheduler.enqueue(cmd(55.0)).unwrap();
        assert_eq!(scheduler.pending(), 1);

        wait_for(|| device.commands.lock().unwrap().len() == 2);
        assert_eq!(device.commands.lock().unwrap()[1].to, 55.0);
        scheduler.close();
    }

    #[test]
    fn test_disabled_drops_commands() {
        let device = Arc::new(RecordingDevice::default());
        let scheduler = DeviceScheduler::new(Arc::clone(&device), config(0)).unwrap();

        scheduler.set_enabled(false);
        scheduler.enqueue(cmd(30.0)).unwrap();
        wait_for(|| scheduler.pending() == 0);
        thread::sleep(Duration::from_millis(20));
        assert!(device.commands.lock().unwrap().is_empty());

        scheduler.set_enabled(true);
        scheduler.enqueue(cmd(60.0)).unwrap();
        wait_for(|| device.commands.lock().unwrap().len() == 1);
        scheduler.close();
    }

    #[test]
    fn test_stop_clears_queue_and_halts() {
        let device = Arc::new(RecordingDevice {
            slow: Some(Duration::from_millis(100)),
            ..Default::default()
        });
        let scheduler = DeviceScheduler::new(Arc::clone(&device), config(0)).unwrap();

        scheduler.enqueue(cmd(0.0)).unwrap();
        wait_for(|| device.commands.lock().unwrap().len() == 1);
        scheduler.enqueue(cmd(90.0)).unwrap();
        scheduler.stop();

        assert_eq!(scheduler.pending(), 0);
        assert_eq!(*device.stops.lock().unwrap(), 1);
        scheduler.close();
        assert_eq!(device.commands.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_close_tears_down_and_rejects() {
        let device = Arc::new(RecordingDevice::default());
        let scheduler = DeviceScheduler::new(Arc::clone(&device), config(0)).unwrap();

        scheduler.close();
        assert!(device.torn_down.load(Ordering::SeqCst));
        assert!(matches!(
            scheduler.enqueue(cmd(10.0)),
            Err(DeviceError::SchedulerClosed)
        ));
        scheduler.close();
    }

    #[test]
    fn test_close_detaches_stuck_consumer() {
        let device = Arc::new(RecordingDevice {
            slow: Some(Duration::from_millis(400)),
            ..Default::default()
        });
        let scheduler = DeviceScheduler::new(
            Arc::clone(&device),
            SchedulerConfig {
                min_delay_between_commands: Duration::ZERO,
                join_timeout: Duration::from_millis(20),
            },
        )
        .unwrap();

        scheduler.enqueue(cmd(10.0)).unwrap();
        wait_for(|| device.commands.lock().unwrap().len() == 1);

        let started = Instant::now();
        scheduler.close();
        assert!(started.elapsed() < Duration::from_millis(300));
        assert!(device.torn_down.load(Ordering::SeqCst));
    }
}
