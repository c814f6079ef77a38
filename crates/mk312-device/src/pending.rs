//! Blocking queue that coalesces similar entries

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// FIFO queue where a new entry may replace a queued one in place
#[derive(Debug)]
pub struct PendingQueue<T> {
    state: Mutex<State<T>>,
    signal: Condvar,
}

impl<T> PendingQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            signal: Condvar::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `item`
    ///
    /// Returns false once the queue is closed.
    pub fn push(&self, item: T) -> bool {
        self.replace_existing(item, |_| false)
    }

    /// Put `item` in the place of the first queued entry matching `similar`,
    /// or append it when none matches
    ///
    /// Returns false once the queue is closed.
    pub fn replace_existing<F>(&self, item: T, similar: F) -> bool
    where
        F: Fn(&T) -> bool,
    {
        let mut state = self.state();
        if state.closed {
            return false;
        }
        match state.items.iter_mut().find(|queued| similar(queued)) {
            Some(slot) => *slot = item,
            None => state.items.push_back(item),
        }
        drop(state);
        self.signal.notify_all();
        true
    }

    /// Take the oldest entry, waiting while the queue is empty
    ///
    /// Returns `None` once the queue is closed.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            state = self
                .signal
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Sleep for `duration` unless the queue closes first
    ///
    /// Returns true if the queue closed.
    pub fn wait_closed(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut state = self.state();
        while !state.closed {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                break;
            };
            if remaining.is_zero() {
                break;
            }
            state = self
                .signal
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        state.closed
    }

    /// Drop every queued entry
    pub fn clear(&self) -> usize {
        let mut state = self.state();
        let dropped = state.items.len();
        state.items.clear();
        dropped
    }

    /// Refuse further entries and wake all waiters
    pub fn close(&self) {
        let mut state = self.state();
        state.closed = true;
        state.items.clear();
        drop(state);
        self.signal.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = PendingQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
    }

    #[test]
    fn test_replace_existing_keeps_position() {
        let queue = PendingQueue::new();
        queue.push(10);
        queue.push(50);
        queue.replace_existing(12, |q| (q - 12i32).abs() < 5);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(12));
        assert_eq!(queue.pop(), Some(50));
    }

    #[test]
    fn test_replace_appends_when_nothing_similar() {
        let queue = PendingQueue::new();
        queue.push(10);
        queue.replace_existing(90, |q| (q - 90i32).abs() < 5);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_close_wakes_blocked_pop() {
        let queue = Arc::new(PendingQueue::<u32>::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();

        assert_eq!(waiter.join().unwrap(), None);
        assert!(!queue.push(1));
    }

    #[test]
    fn test_wait_closed() {
        let queue = PendingQueue::<u32>::new();
        let started = Instant::now();
        assert!(!queue.wait_closed(Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(20));

        queue.close();
        assert!(queue.wait_closed(Duration::from_secs(5)));
    }

    #[test]
    fn test_clear() {
        let queue = PendingQueue::new();
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }
}
