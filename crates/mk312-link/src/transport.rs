//! Byte transport abstraction
//!
//! A transport moves raw bytes to and from a box. It knows nothing about
//! framing; [`Session`](crate::Session) layers the protocol on top.

use std::time::Duration;

use crate::error::LinkError;

/// Shortest timeout handed to an OS read
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Blocking byte-oriented connection to a box
pub trait Transport: Send {
    /// Open the connection
    fn connect(&mut self) -> Result<(), LinkError>;

    /// Whether the connection is open
    fn is_connected(&self) -> bool;

    /// Close the connection; closing a closed transport is a no-op
    fn close(&mut self) -> Result<(), LinkError>;

    /// Fill `buffer` completely or fail
    ///
    /// Fails with [`LinkError::Timeout`] when nothing arrives within `timeout`
    /// and with [`LinkError::ShortRead`] when only part of the buffer arrives.
    fn read_bytes(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<(), LinkError>;

    /// Write all of `buffer`
    fn write_bytes(&mut self, buffer: &[u8]) -> Result<(), LinkError>;

    /// Human-readable connection name (port path, address)
    fn connector_name(&self) -> String;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self) -> Result<(), LinkError> {
        (**self).connect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn close(&mut self) -> Result<(), LinkError> {
        (**self).close()
    }

    fn read_bytes(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<(), LinkError> {
        (**self).read_bytes(buffer, timeout)
    }

    fn write_bytes(&mut self, buffer: &[u8]) -> Result<(), LinkError> {
        (**self).write_bytes(buffer)
    }

    fn connector_name(&self) -> String {
        (**self).connector_name()
    }
}

/// Read into `buffer` from a `std::io::Read` until full or out of time
///
/// Shared by the serial and TCP transports, whose reads return early with
/// partial data or `TimedOut`/`WouldBlock` errors. `set_timeout` arms the
/// reader with the time left before each read, so the whole call never
/// outlasts `timeout` by more than one OS timer slack.
pub(crate) fn read_exact_within<R, F>(
    reader: &mut R,
    buffer: &mut [u8],
    timeout: Duration,
    mut set_timeout: F,
) -> Result<(), LinkError>
where
    R: std::io::Read,
    F: FnMut(&mut R, Duration) -> Result<(), LinkError>,
{
    let deadline = std::time::Instant::now() + timeout;
    let mut filled = 0;

    while filled < buffer.len() {
        // Zero means "block forever" to the OS APIs
        let remaining = deadline
            .saturating_duration_since(std::time::Instant::now())
            .max(MIN_READ_TIMEOUT);
        set_timeout(reader, remaining)?;

        match reader.read(&mut buffer[filled..]) {
            Ok(0) => {
                return Err(LinkError::ShortRead {
                    expected: buffer.len(),
                    actual: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }

        if filled < buffer.len() && std::time::Instant::now() >= deadline {
            if filled == 0 {
                return Err(LinkError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            return Err(LinkError::ShortRead {
                expected: buffer.len(),
                actual: filled,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{self, Cursor, Read};
    use std::time::Instant;

    fn no_timeout<R>(_: &mut R, _: Duration) -> Result<(), LinkError> {
        Ok(())
    }

    /// Reader that trickles bytes in after `delay` and honours its timeout
    struct TrickleReader {
        data: VecDeque<u8>,
        delay: Duration,
        timeout: Duration,
        armed: Vec<Duration>,
    }

    impl Read for TrickleReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.pop_front() {
                Some(byte) => {
                    std::thread::sleep(self.delay);
                    buf[0] = byte;
                    Ok(1)
                }
                None => {
                    std::thread::sleep(self.timeout);
                    Err(io::ErrorKind::TimedOut.into())
                }
            }
        }
    }

    #[test]
    fn test_read_exact_within_full() {
        let mut reader = Cursor::new(vec![1, 2, 3, 4]);
        let mut buf = [0u8; 3];
        read_exact_within(&mut reader, &mut buf, Duration::from_millis(10), no_timeout).unwrap();
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn test_read_exact_within_keeps_deadline_after_partial_data() {
        let mut reader = TrickleReader {
            data: VecDeque::from([0xAA]),
            delay: Duration::from_millis(60),
            timeout: Duration::ZERO,
            armed: Vec::new(),
        };
        let mut buf = [0u8; 3];
        let started = Instant::now();

        let err = read_exact_within(
            &mut reader,
            &mut buf,
            Duration::from_millis(100),
            |r: &mut TrickleReader, t| {
                r.timeout = t;
                r.armed.push(t);
                Ok(())
            },
        )
        .unwrap_err();

        assert!(matches!(
            err,
            LinkError::ShortRead {
                expected: 3,
                actual: 1
            }
        ));
        assert_eq!(reader.armed[0], Duration::from_millis(100));
        assert!(reader.armed[1] <= Duration::from_millis(40));
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[test]
    fn test_read_exact_within_short() {
        let mut reader = Cursor::new(vec![1]);
        let mut buf = [0u8; 3];
        let err = read_exact_within(&mut reader, &mut buf, Duration::from_millis(10), no_timeout)
            .unwrap_err();
        assert!(matches!(
            err,
            LinkError::ShortRead {
                expected: 3,
                actual: 1
            }
        ));
    }
}
