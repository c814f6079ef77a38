//! Scripted in-memory transport for unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::LinkError;
use crate::transport::Transport;

#[derive(Default)]
struct Inner {
    open: bool,
    pending: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    on_write: HashMap<usize, Vec<u8>>,
    read_delay: Duration,
}

/// Shared view of a [`MockTransport`] that survives moving it into a session
#[derive(Clone, Default)]
pub struct MockLog(Arc<Mutex<Inner>>);

impl MockLog {
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().writes.clone()
    }

    pub fn is_open(&self) -> bool {
        self.0.lock().unwrap().open
    }

    /// Make bytes readable right away
    pub fn push_replies(&self, bytes: &[u8]) {
        self.0.lock().unwrap().pending.extend(bytes);
    }

    /// Make bytes readable once the `n`th write (1-based) has happened
    pub fn reply_on_write(&self, n: usize, bytes: &[u8]) {
        self.0.lock().unwrap().on_write.insert(n, bytes.to_vec());
    }

    /// Make every read stall for `delay` before looking at the input
    pub fn stall_reads(&self, delay: Duration) {
        self.0.lock().unwrap().read_delay = delay;
    }
}

/// Transport whose replies are scripted per write
pub struct MockTransport {
    log: MockLog,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            log: MockLog::default(),
        }
    }

    /// Transport that completes the connect sequence with `box_key`
    pub fn connectable(box_key: u8) -> Self {
        let transport = Self::new();
        transport.log.reply_on_write(1, &[0x07]);
        transport
            .log
            .reply_on_write(2, &[0x01, box_key, 0x01u8.wrapping_add(box_key)]);
        transport
    }

    pub fn log(&self) -> MockLog {
        self.log.clone()
    }
}

impl Transport for MockTransport {
    fn connect(&mut self) -> Result<(), LinkError> {
        self.log.0.lock().unwrap().open = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.log.is_open()
    }

    fn close(&mut self) -> Result<(), LinkError> {
        self.log.0.lock().unwrap().open = false;
        Ok(())
    }

    fn read_bytes(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<(), LinkError> {
        let delay = self.log.0.lock().unwrap().read_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let mut inner = self.log.0.lock().unwrap();
        if inner.pending.is_empty() {
            return Err(LinkError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        if inner.pending.len() < buffer.len() {
            let actual = inner.pending.len();
            inner.pending.clear();
            return Err(LinkError::ShortRead {
                expected: buffer.len(),
                actual,
            });
        }
        for b in buffer.iter_mut() {
            *b = inner.pending.pop_front().unwrap_or_default();
        }
        Ok(())
    }

    fn write_bytes(&mut self, buffer: &[u8]) -> Result<(), LinkError> {
        let mut inner = self.log.0.lock().unwrap();
        if !inner.open {
            return Err(LinkError::NotConnected);
        }
        inner.writes.push(buffer.to_vec());
        let n = inner.writes.len();
        if let Some(reply) = inner.on_write.remove(&n) {
            inner.pending.extend(reply);
        }
        Ok(())
    }

    fn connector_name(&self) -> String {
        "mock".to_string()
    }
}
