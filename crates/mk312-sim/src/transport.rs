//! Transport adapter connecting a [`Session`](mk312_link::Session) to a
//! [`VirtualBox`]

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use mk312_link::{LinkError, Transport};
use tracing::trace;

use crate::firmware::VirtualBox;

/// Virtual box shared between a transport and the test inspecting it
pub type SharedBox = Arc<Mutex<VirtualBox>>;

/// Wrap a box for sharing
pub fn shared(vbox: VirtualBox) -> SharedBox {
    Arc::new(Mutex::new(vbox))
}

/// Lock a shared box, ignoring poisoning from a panicked test thread
pub fn lock(vbox: &SharedBox) -> MutexGuard<'_, VirtualBox> {
    vbox.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One transport call as seen on the wire (raw, encrypted bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    Write(Vec<u8>),
    Read(Vec<u8>),
}

#[derive(Debug, Default)]
struct WireState {
    events: Vec<WireEvent>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Record of traffic through a [`SimTransport`]
#[derive(Debug, Clone, Default)]
pub struct WireLog(Arc<Mutex<WireState>>);

impl WireLog {
    fn state(&self) -> MutexGuard<'_, WireState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All writes and reads in order
    pub fn events(&self) -> Vec<WireEvent> {
        self.state().events.clone()
    }

    /// Bytes of every write in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                WireEvent::Write(bytes) => Some(bytes.clone()),
                WireEvent::Read(_) => None,
            })
            .collect()
    }

    /// Most requests ever awaiting a reply at once
    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    /// Forget recorded traffic
    pub fn clear(&self) {
        let mut state = self.state();
        state.events.clear();
        state.max_in_flight = state.in_flight;
    }
}

/// In-memory transport to a virtual box
pub struct SimTransport {
    name: String,
    vbox: SharedBox,
    log: WireLog,
    latency: Duration,
    open: bool,
}

impl SimTransport {
    pub fn new(vbox: SharedBox) -> Self {
        Self {
            name: "virtual".to_string(),
            vbox,
            log: WireLog::default(),
            latency: Duration::ZERO,
            open: false,
        }
    }

    /// Delay each write, widening the window for overlapping requests
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Handle to the traffic record
    pub fn wire_log(&self) -> WireLog {
        self.log.clone()
    }

    fn ensure_open(&self) -> Result<(), LinkError> {
        if self.open {
            Ok(())
        } else {
            Err(LinkError::NotConnected)
        }
    }
}

impl Transport for SimTransport {
    fn connect(&mut self) -> Result<(), LinkError> {
        lock(&self.vbox).reset_link();
        self.open = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<(), LinkError> {
        self.open = false;
        Ok(())
    }

    fn read_bytes(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<(), LinkError> {
        self.ensure_open()?;

        let (bytes, drained) = {
            let mut vbox = lock(&self.vbox);
            let bytes = vbox.take_output(buffer.len());
            (bytes, vbox.pending_output() == 0)
        };

        if !bytes.is_empty() {
            let mut state = self.log.state();
            state.events.push(WireEvent::Read(bytes.clone()));
            if drained {
                state.in_flight = 0;
            }
        }

        if bytes.is_empty() {
            return Err(LinkError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        if bytes.len() < buffer.len() {
            return Err(LinkError::ShortRead {
                expected: buffer.len(),
                actual: bytes.len(),
            });
        }
        buffer.copy_from_slice(&bytes);
        Ok(())
    }

    fn write_bytes(&mut self, buffer: &[u8]) -> Result<(), LinkError> {
        self.ensure_open()?;
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        trace!("Sim write {:02X?}", buffer);
        let answered = {
            let mut vbox = lock(&self.vbox);
            vbox.receive(buffer);
            vbox.pending_output() > 0
        };

        let mut state = self.log.state();
        state.events.push(WireEvent::Write(buffer.to_vec()));
        if answered {
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }
        Ok(())
    }

    fn connector_name(&self) -> String {
        self.name.clone()
    }
}
