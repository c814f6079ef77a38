//! Serialized register access from many threads
//!
//! The wire protocol allows exactly one outstanding request. A single
//! consumer thread owns the [`Session`] and executes queued peeks and pokes
//! one at a time, in the order they were enqueued. Callers block on a
//! per-command reply channel until the consumer answers or the queue
//! timeout elapses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::error::LinkError;
use crate::registers::RegisterAccess;
use crate::session::Session;
use crate::transport::Transport;

/// Operation a caller asks the consumer to perform
#[derive(Debug)]
enum Job {
    Peek(u16),
    Poke(u16, Vec<u8>),
    SetKey(u8),
}

/// A queued job and where its single result goes
struct QueuedCommand {
    job: Job,
    reply: mpsc::SyncSender<Result<u8, LinkError>>,
}

/// Register access through a dedicated consumer thread
pub struct QueuedRegisters<T: Transport + 'static> {
    sender: Mutex<Option<mpsc::Sender<QueuedCommand>>>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<Session<T>>>>,
    timeout: Duration,
}

impl<T: Transport + 'static> QueuedRegisters<T> {
    /// Hand a connected session to a new consumer thread
    pub fn new(session: Session<T>) -> Result<Self, LinkError> {
        let timeout = session.config().queue_timeout;
        let poll_interval = session.config().queue_poll_interval;
        let name = session.connector_name();

        let (sender, receiver) = mpsc::channel::<QueuedCommand>();
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        let worker = thread::Builder::new()
            .name(format!("mk312-queue {}", name))
            .spawn(move || Self::consumer_loop(session, receiver, running_clone, poll_interval))?;

        info!("Command queue started for {}", name);

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            running,
            worker: Mutex::new(Some(worker)),
            timeout,
        })
    }

    fn consumer_loop(
        mut session: Session<T>,
        receiver: mpsc::Receiver<QueuedCommand>,
        running: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> Session<T> {
        while running.load(Ordering::Acquire) {
            let command = match receiver.recv_timeout(poll_interval) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            let result = if running.load(Ordering::Acquire) {
                Self::execute(&mut session, command.job)
            } else {
                Err(LinkError::QueueClosed)
            };
            // The caller may have given up waiting
            let _ = command.reply.send(result);
        }

        debug!("Command queue for {} stopped", session.connector_name());
        session
    }

    fn execute(session: &mut Session<T>, job: Job) -> Result<u8, LinkError> {
        match job {
            Job::Peek(address) => session.peek(address),
            Job::Poke(address, payload) => session.poke(address, &payload).map(|()| 0),
            Job::SetKey(key) => {
                session.set_session_key(key);
                Ok(0)
            }
        }
    }

    /// Enqueue `job` and wait for its result
    fn submit(&self, job: Job) -> Result<u8, LinkError> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        {
            let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
            let sender = sender.as_ref().ok_or(LinkError::QueueClosed)?;
            sender
                .send(QueuedCommand {
                    job,
                    reply: reply_tx,
                })
                .map_err(|_| LinkError::QueueClosed)?;
        }

        match reply_rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(LinkError::QueueTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(LinkError::QueueClosed),
        }
    }

    /// Stop the consumer thread and return the session it owned
    fn stop(&self) -> Option<Session<T>> {
        self.running.store(false, Ordering::Release);
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        match worker.join() {
            Ok(session) => Some(session),
            Err(_) => {
                error!("Command queue thread panicked");
                None
            }
        }
    }
}

impl<T: Transport + 'static> RegisterAccess for QueuedRegisters<T> {
    fn peek(&self, address: u16) -> Result<u8, LinkError> {
        self.submit(Job::Peek(address))
    }

    fn poke(&self, address: u16, payload: &[u8]) -> Result<(), LinkError> {
        self.submit(Job::Poke(address, payload.to_vec())).map(|_| ())
    }

    fn set_session_key(&self, key: u8) -> Result<(), LinkError> {
        self.submit(Job::SetKey(key)).map(|_| ())
    }

    fn is_connected(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop dispatching before the session is torn down
    fn disconnect(&self) -> Result<(), LinkError> {
        match self.stop() {
            Some(mut session) => session.disconnect(),
            None => Ok(()),
        }
    }
}

impl<T: Transport + 'static> Drop for QueuedRegisters<T> {
    fn drop(&mut self) {
        if let Some(mut session) = self.stop() {
            let _ = session.disconnect();
        }
    }
}
