//! Transport with replies scripted per write
//!
//! Used where the exact bytes on the wire matter more than box behavior.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mk312_link::{LinkError, Transport};

#[derive(Debug, Default)]
struct Script {
    open: bool,
    pending: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    on_write: HashMap<usize, Vec<u8>>,
}

/// Shared view of a [`ScriptedTransport`]
#[derive(Debug, Clone, Default)]
pub struct ScriptHandle(Arc<Mutex<Script>>);

impl ScriptHandle {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every write so far
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.script().writes.clone()
    }

    /// Whether the transport is open
    pub fn is_open(&self) -> bool {
        self.script().open
    }

    /// Make bytes readable right away
    pub fn push_replies(&self, bytes: &[u8]) {
        self.script().pending.extend(bytes);
    }

    /// Make bytes readable once the `n`th write (1-based) has happened
    pub fn reply_on_write(&self, n: usize, bytes: &[u8]) {
        self.script().on_write.insert(n, bytes.to_vec());
    }
}

/// Transport answering from a script
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    handle: ScriptHandle,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the `n`th write (1-based)
    pub fn reply_on_write(self, n: usize, bytes: &[u8]) -> Self {
        self.handle.reply_on_write(n, bytes);
        self
    }

    pub fn handle(&self) -> ScriptHandle {
        self.handle.clone()
    }
}

impl Transport for ScriptedTransport {
    fn connect(&mut self) -> Result<(), LinkError> {
        self.handle.script().open = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.handle.is_open()
    }

    fn close(&mut self) -> Result<(), LinkError> {
        self.handle.script().open = false;
        Ok(())
    }

    fn read_bytes(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<(), LinkError> {
        let mut script = self.handle.script();
        if script.pending.is_empty() {
            return Err(LinkError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        if script.pending.len() < buffer.len() {
            let actual = script.pending.len();
            script.pending.clear();
            return Err(LinkError::ShortRead {
                expected: buffer.len(),
                actual,
            });
        }
        for slot in buffer.iter_mut() {
            *slot = script.pending.pop_front().unwrap_or_default();
        }
        Ok(())
    }

    fn write_bytes(&mut self, buffer: &[u8]) -> Result<(), LinkError> {
        let mut script = self.handle.script();
        script.writes.push(buffer.to_vec());
        let n = script.writes.len();
        if let Some(reply) = script.on_write.remove(&n) {
            script.pending.extend(reply);
        }
        Ok(())
    }

    fn connector_name(&self) -> String {
        "scripted".to_string()
    }
}
