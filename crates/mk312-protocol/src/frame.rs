//! Command and reply framing
//!
//! Every multi-byte frame ends in a checksum byte equal to the sum of all
//! preceding bytes modulo 256.
//!
//! # Frame Formats
//! ```text
//! peek request   3C  hi  lo  cs              (encrypted)
//! peek reply     22  val cs                  (plaintext)
//! poke request   LD  hi  lo  b0..bN  cs      (encrypted, L = frame length - 1)
//! poke reply     06 | 07                     (plaintext, no checksum)
//! key exchange   2F  host  cs  ->  01  box  cs
//! ```
//!
//! Outgoing frames are XORed with the session key once one has been
//! negotiated. Replies are never encrypted by the box.

use crate::error::FrameError;
use crate::opcodes::{Reply, Request, MAX_POKE_LEN, NO_ENCRYPTION_REQUEST};

/// Length of a peek request frame
pub const PEEK_REQUEST_LEN: usize = 4;
/// Length of a peek reply frame
pub const PEEK_REPLY_LEN: usize = 3;
/// Length of a key exchange request or reply frame
pub const KEY_EXCHANGE_LEN: usize = 3;

/// Sum of `bytes` modulo 256
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Store the checksum of all preceding bytes in the last byte of `buffer`
///
/// An empty buffer is left untouched.
pub fn add_checksum(buffer: &mut [u8]) {
    if let Some((last, body)) = buffer.split_last_mut() {
        *last = checksum(body);
    }
}

/// Verify the trailing checksum byte of `buffer`
pub fn check_checksum(buffer: &[u8]) -> Result<(), FrameError> {
    let (actual, body) = buffer.split_last().ok_or(FrameError::FrameLength {
        expected: 1,
        actual: 0,
    })?;
    let expected = checksum(body);
    if expected != *actual {
        return Err(FrameError::ChecksumMismatch {
            expected,
            actual: *actual,
        });
    }
    Ok(())
}

/// XOR every byte with `key`
///
/// Applying the same key twice restores the original bytes.
pub fn xor_in_place(buffer: &mut [u8], key: u8) {
    for b in buffer.iter_mut() {
        *b ^= key;
    }
}

/// Build a checksummed peek request
pub fn peek_request(address: u16) -> [u8; PEEK_REQUEST_LEN] {
    let [hi, lo] = address.to_be_bytes();
    let mut frame = [Request::Read as u8, hi, lo, 0];
    add_checksum(&mut frame);
    frame
}

/// Build a checksummed poke request
///
/// The frame length lives in the high nibble of the opcode, so payloads above
/// twelve bytes wrap that nibble and only shorter writes frame correctly.
pub fn poke_request(address: u16, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_POKE_LEN {
        return Err(FrameError::TooManyBytes {
            len: payload.len(),
            max: MAX_POKE_LEN,
        });
    }

    let [hi, lo] = address.to_be_bytes();
    let length_nibble = ((3 + payload.len()) & 0x0F) as u8;

    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.push(Request::Write as u8 | (length_nibble << 4));
    frame.push(hi);
    frame.push(lo);
    frame.extend_from_slice(payload);
    frame.push(0);
    add_checksum(&mut frame);
    Ok(frame)
}

/// Build a checksummed key exchange request offering `host_key`
pub fn key_exchange_request(host_key: u8) -> [u8; KEY_EXCHANGE_LEN] {
    let mut frame = [Request::KeyExchange as u8, host_key, 0];
    add_checksum(&mut frame);
    frame
}

/// Build the no-encryption compatibility request
pub fn no_encryption_request() -> [u8; 3] {
    let mut frame = [NO_ENCRYPTION_REQUEST, 0x00, 0];
    add_checksum(&mut frame);
    frame
}

/// Validate a peek reply and return the value it carries
pub fn parse_peek_reply(reply: &[u8]) -> Result<u8, FrameError> {
    expect_len(reply, PEEK_REPLY_LEN)?;
    check_checksum(reply)?;
    expect_opcode(reply[0], Reply::Read)?;
    Ok(reply[1])
}

/// Validate a key exchange reply and return the box key it carries
pub fn parse_key_exchange_reply(reply: &[u8]) -> Result<u8, FrameError> {
    expect_len(reply, KEY_EXCHANGE_LEN)?;
    check_checksum(reply)?;
    expect_opcode(reply[0], Reply::KeyExchangeAck)?;
    Ok(reply[1])
}

/// Validate the single-byte acknowledgement of a poke
pub fn parse_poke_ack(byte: u8) -> Result<(), FrameError> {
    if byte == Reply::Ok as u8 {
        Ok(())
    } else {
        Err(FrameError::InvalidReply(byte))
    }
}

fn expect_len(buffer: &[u8], expected: usize) -> Result<(), FrameError> {
    if buffer.len() != expected {
        return Err(FrameError::FrameLength {
            expected,
            actual: buffer.len(),
        });
    }
    Ok(())
}

fn expect_opcode(actual: u8, expected: Reply) -> Result<(), FrameError> {
    if actual != expected as u8 {
        return Err(FrameError::UnexpectedReply {
            expected: expected as u8,
            actual,
        });
    }
    Ok(())
}

/// Format bytes as space-separated hex for trace output
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_peek_request() {
        let frame = peek_request(0x4070);
        assert_eq!(frame, [0x3C, 0x40, 0x70, 0xEC]);
    }

    #[test]
    fn test_poke_request_single_byte() {
        let frame = poke_request(0x4000, &[0xAB]).unwrap();
        // 0x4D + 0x40 + 0x00 + 0xAB = 0x138
        assert_eq!(frame, vec![0x4D, 0x40, 0x00, 0xAB, 0x38]);
    }

    #[test]
    fn test_poke_request_length_nibble() {
        let frame = poke_request(0x40A5, &[1, 2, 3]).unwrap();
        assert_eq!(frame[0], 0x6D);
        assert_eq!(frame.len(), 7);
    }

    #[test]
    fn test_poke_request_boundary() {
        assert!(poke_request(0x4000, &[0u8; MAX_POKE_LEN]).is_ok());
        assert_eq!(
            poke_request(0x4000, &[0u8; MAX_POKE_LEN + 1]),
            Err(FrameError::TooManyBytes { len: 17, max: 16 })
        );
    }

    #[test]
    fn test_key_exchange_request() {
        assert_eq!(key_exchange_request(0x00), [0x2F, 0x00, 0x2F]);
    }

    #[test]
    fn test_parse_peek_reply() {
        assert_eq!(parse_peek_reply(&[0x22, 0xAB, 0xCD]), Ok(0xAB));
        assert_eq!(
            parse_peek_reply(&[0x23, 0xAB, 0xCE]),
            Err(FrameError::UnexpectedReply {
                expected: 0x22,
                actual: 0x23
            })
        );
        assert_eq!(
            parse_peek_reply(&[0x22, 0xAB, 0x00]),
            Err(FrameError::ChecksumMismatch {
                expected: 0xCD,
                actual: 0x00
            })
        );
    }

    #[test]
    fn test_parse_key_exchange_reply() {
        assert_eq!(parse_key_exchange_reply(&[0x01, 0x00, 0x01]), Ok(0x00));
        assert_eq!(parse_key_exchange_reply(&[0x01, 0x42, 0x43]), Ok(0x42));
        assert!(parse_key_exchange_reply(&[0x01, 0x42]).is_err());
    }

    #[test]
    fn test_parse_poke_ack() {
        assert_eq!(parse_poke_ack(0x06), Ok(()));
        assert_eq!(parse_poke_ack(0x07), Err(FrameError::InvalidReply(0x07)));
    }

    #[test]
    fn test_check_checksum_empty() {
        assert!(check_checksum(&[]).is_err());
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x3C, 0x40, 0x0A]), "3C 40 0A");
    }

    proptest! {
        #[test]
        fn checksum_roundtrip(mut body in prop::collection::vec(any::<u8>(), 1..32)) {
            body.push(0);
            add_checksum(&mut body);
            prop_assert!(check_checksum(&body).is_ok());
        }

        #[test]
        fn checksum_detects_corruption(
            mut body in prop::collection::vec(any::<u8>(), 1..32),
            index in any::<prop::sample::Index>(),
            delta in 1u8..=255,
        ) {
            body.push(0);
            add_checksum(&mut body);
            let i = index.index(body.len() - 1);
            body[i] = body[i].wrapping_add(delta);
            prop_assert!(check_checksum(&body).is_err());
        }

        #[test]
        fn xor_is_an_involution(
            original in prop::collection::vec(any::<u8>(), 0..32),
            key: u8,
        ) {
            let mut buffer = original.clone();
            xor_in_place(&mut buffer, key);
            xor_in_place(&mut buffer, key);
            prop_assert_eq!(&buffer, &original);

            let mut unkeyed = original.clone();
            xor_in_place(&mut unkeyed, 0);
            prop_assert_eq!(unkeyed, original);
        }
    }
}
