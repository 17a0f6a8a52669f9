//! Server-side handshake
//!
//! ```text
//! Client                                   Server
//!   |------- C0 (1 byte: version) --------->|
//!   |------- C1 (1536 bytes: time+random) ->|
//!   |<------ S0 (1 byte: version) ----------|
//!   |<------ S1 (1536 bytes: time+random) --|
//!   |<------ S2 (1536 bytes: echo C1) ------|
//!   |------- C2 (1536 bytes, ignored) ----->|
//!   |          [Handshake Complete]          |
//! ```
//!
//! Simple handshake only (no HMAC digest). C1/C2 content is accepted
//! as-is beyond its length; the version byte is the one thing checked,
//! and a mismatch is fatal before anything is written back.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{HandshakeError, Result};
use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

/// Handshake progress; advances monotonically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// Waiting for C0 + C1 (1537 bytes)
    WaitingC0C1,
    /// S0S1S2 sent, waiting for C2 (1536 bytes)
    AckSent,
    /// Handshake complete, chunk processing may begin
    Done,
}

/// Server handshake state machine driven by the session's inbound buffer
#[derive(Debug)]
pub struct ServerHandshake {
    phase: HandshakePhase,
}

impl ServerHandshake {
    pub fn new() -> Self {
        Self {
            phase: HandshakePhase::WaitingC0C1,
        }
    }

    /// Check if the handshake is complete
    pub fn is_done(&self) -> bool {
        self.phase == HandshakePhase::Done
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Consume handshake bytes from the front of `buf` and return any
    /// response to write.
    ///
    /// Returns `Ok(None)` when more data is needed. Bytes beyond what the
    /// current phase requires are left in `buf` untouched; after the
    /// transition to [`HandshakePhase::Done`] they belong to the chunk
    /// decoder.
    pub fn process(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.phase {
            HandshakePhase::WaitingC0C1 => {
                if buf.len() < 1 + HANDSHAKE_SIZE {
                    return Ok(None);
                }

                let version = buf[0];
                if version != RTMP_VERSION {
                    return Err(HandshakeError::InvalidVersion(version).into());
                }
                buf.advance(1);

                let c1 = buf.split_to(HANDSHAKE_SIZE);

                // S0 + S1 + S2
                let mut response = BytesMut::with_capacity(1 + HANDSHAKE_SIZE * 2);
                response.put_u8(RTMP_VERSION);
                response.put_slice(&generate_s1());
                // S2 echoes C1 byte-for-byte
                response.put_slice(&c1);

                self.phase = HandshakePhase::AckSent;
                Ok(Some(response.freeze()))
            }
            HandshakePhase::AckSent => {
                if buf.len() < HANDSHAKE_SIZE {
                    return Ok(None);
                }

                // C2 content is ignored beyond its length
                buf.advance(HANDSHAKE_SIZE);
                self.phase = HandshakePhase::Done;
                Ok(None)
            }
            HandshakePhase::Done => Ok(None),
        }
    }
}

impl Default for ServerHandshake {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate the S1 block: 4-byte big-endian epoch timestamp, 4 zero
/// bytes, 1528 pseudorandom bytes.
///
/// The random block uses a simple LCG seeded from the clock; the
/// handshake carries no cryptographic weight.
fn generate_s1() -> [u8; HANDSHAKE_SIZE] {
    let mut packet = [0u8; HANDSHAKE_SIZE];

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0);

    packet[0..4].copy_from_slice(&timestamp.to_be_bytes());
    // Bytes 4..8 stay zero (simple handshake)

    let mut seed = timestamp as u64 | 1;
    for chunk in packet[8..].chunks_mut(8) {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = seed.to_le_bytes();
        chunk.copy_from_slice(&bytes[..chunk.len()]);
    }

    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c0c1(version: u8) -> BytesMut {
        let mut buf = BytesMut::with_capacity(1 + HANDSHAKE_SIZE);
        buf.put_u8(version);
        for i in 0..HANDSHAKE_SIZE {
            buf.put_u8((i % 251) as u8);
        }
        buf
    }

    #[test]
    fn test_full_server_handshake() {
        let mut hs = ServerHandshake::new();
        let mut buf = c0c1(RTMP_VERSION);
        let c1: Vec<u8> = buf[1..].to_vec();

        let response = hs.process(&mut buf).unwrap().expect("should emit S0S1S2");
        assert_eq!(response.len(), 1 + HANDSHAKE_SIZE * 2);
        assert_eq!(response[0], RTMP_VERSION);
        assert_eq!(hs.phase(), HandshakePhase::AckSent);
        assert!(buf.is_empty());

        // S2 is a byte-exact echo of C1
        assert_eq!(&response[1 + HANDSHAKE_SIZE..], &c1[..]);

        // C2: arbitrary 1536 bytes
        buf.extend_from_slice(&[0xAB; HANDSHAKE_SIZE]);
        let response = hs.process(&mut buf).unwrap();
        assert!(response.is_none());
        assert!(hs.is_done());
    }

    #[test]
    fn test_s1_layout() {
        let s1 = generate_s1();
        // Bytes 4..8 are zero
        assert_eq!(&s1[4..8], &[0, 0, 0, 0]);
        // Random block is not all zeros
        assert!(s1[8..].iter().any(|&b| b != 0));
    }

    #[test]
    fn test_invalid_version_is_fatal_and_writes_nothing() {
        let mut hs = ServerHandshake::new();
        let mut buf = c0c1(0x06);

        let result = hs.process(&mut buf);
        assert!(result.is_err());
        // Nothing consumed, nothing emitted, phase unchanged
        assert_eq!(hs.phase(), HandshakePhase::WaitingC0C1);
    }

    #[test]
    fn test_incomplete_c0c1_waits() {
        let mut hs = ServerHandshake::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[RTMP_VERSION; 100]);

        assert!(hs.process(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 100);
        assert_eq!(hs.phase(), HandshakePhase::WaitingC0C1);
    }

    #[test]
    fn test_trailing_bytes_survive_phase_transition() {
        let mut hs = ServerHandshake::new();
        let mut buf = c0c1(RTMP_VERSION);
        // Chunk data the client pipelined right behind C1
        buf.extend_from_slice(&[0x02, 0x99]);

        hs.process(&mut buf).unwrap().unwrap();
        assert_eq!(&buf[..], &[0x02, 0x99]);

        // C2 plus pipelined chunk data
        let mut c2 = BytesMut::from(&[0u8; HANDSHAKE_SIZE][..]);
        c2.extend_from_slice(&buf[..]);
        let mut buf = c2;
        hs.process(&mut buf).unwrap();
        assert!(hs.is_done());
        assert_eq!(&buf[..], &[0x02, 0x99]);
    }

    #[test]
    fn test_one_byte_at_a_time() {
        let mut hs = ServerHandshake::new();
        let full = c0c1(RTMP_VERSION);
        let mut buf = BytesMut::new();

        let mut response = None;
        for &b in full.iter() {
            buf.put_u8(b);
            if let Some(r) = hs.process(&mut buf).unwrap() {
                response = Some(r);
            }
        }
        let response = response.expect("S0S1S2 after final byte");
        assert_eq!(response.len(), 1 + HANDSHAKE_SIZE * 2);

        for _ in 0..HANDSHAKE_SIZE {
            buf.put_u8(0);
            hs.process(&mut buf).unwrap();
        }
        assert!(hs.is_done());
    }
}
