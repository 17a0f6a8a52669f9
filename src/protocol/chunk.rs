//! Chunk stream decoder
//!
//! Inbound messages arrive split into chunks, multiplexed over logical
//! chunk streams. Each chunk carries a basic header naming its chunk
//! stream (csid) and a format, a message header whose size depends on the
//! format, and up to one chunk-size worth of payload.
//!
//! ```text
//! +--------------+------------------+-----------------+
//! | Basic Header | Message Header   | Chunk Data      |
//! | (1-3 bytes)  | (0,3,7,11 bytes) | (variable)      |
//! +--------------+------------------+-----------------+
//!
//! Basic Header:
//! - 1 byte:  fmt(2) + csid(6)                  for csid 2-63
//! - 2 bytes: fmt(2) + 0, csid = b1 + 64        for csid 64-319
//! - 3 bytes: fmt(2) + 1, csid = b2*256+b1+64   for csid 64-65599
//!
//! Message Header by fmt:
//! - 0 (11 bytes): timestamp(3) + length(3) + type(1) + stream_id(4, LE)
//! - 1 (7 bytes):  timestamp_delta(3) + length(3) + type(1)
//! - 2 (3 bytes):  timestamp_delta(3)
//! - 3 (0 bytes):  everything from the csid's cached header
//! ```
//!
//! A 24-bit timestamp field of 0xFFFFFF is followed by a 4-byte extended
//! timestamp; fmt-3 continuations of such a message re-carry it.
//!
//! The decoder never consumes a partial chunk: the full extent of the
//! chunk (headers plus payload) is computed by peeking, and the buffer is
//! only advanced once all of it is present. Callers can therefore feed
//! bytes in arbitrary fragments, one byte at a time included.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use crate::error::{ProtocolError, Result};
use crate::protocol::constants::*;

/// A fully reassembled protocol message
#[derive(Debug, Clone)]
pub struct Message {
    /// Chunk stream the message arrived on
    pub csid: u32,
    /// Message timestamp (milliseconds)
    pub timestamp: u32,
    /// Message type id
    pub message_type: u8,
    /// Message stream id
    pub stream_id: u32,
    /// Reassembled payload
    pub payload: Bytes,
}

/// Per-csid header cache plus in-progress reassembly
#[derive(Debug, Default)]
struct ChunkStreamContext {
    /// Last absolute timestamp
    timestamp: u32,
    /// Last declared message length
    message_length: u32,
    /// Last message type
    message_type: u8,
    /// Last message stream id
    stream_id: u32,
    /// Current message uses the extended timestamp field
    has_extended_timestamp: bool,
    /// A fmt-0 header has seeded this context
    initialized: bool,
    /// Accumulated payload of the in-progress message
    partial: BytesMut,
    /// Declared total length of the in-progress message
    expected: u32,
}

/// Chunk stream decoder: demultiplexes chunks and reassembles messages
pub struct ChunkDecoder {
    /// Peer's chunk size (updated by Set Chunk Size)
    chunk_size: u32,
    /// Per-csid contexts, created lazily, never shared across connections
    streams: HashMap<u32, ChunkStreamContext>,
    /// Sanity limit on declared message length
    max_message_size: u32,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            streams: HashMap::new(),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }

    /// Update the peer chunk size (on an inbound Set Chunk Size)
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Discard the in-progress message on a chunk stream (Abort message)
    pub fn abort(&mut self, csid: u32) {
        if let Some(ctx) = self.streams.get_mut(&csid) {
            ctx.partial.clear();
            ctx.expected = 0;
        }
    }

    /// Try to consume one chunk from the buffer.
    ///
    /// Returns `Ok(Some(message))` when that chunk completed a message,
    /// `Ok(None)` when either the buffer does not yet hold a full chunk
    /// (nothing is consumed) or the chunk continued a still-incomplete
    /// message (the chunk is consumed). Callers distinguish the two by
    /// watching the buffer length.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Message>> {
        // Basic header
        let (fmt, csid, basic_len) = match parse_basic_header(buf) {
            Some(v) => v,
            None => return Ok(None),
        };

        let header_len = match fmt {
            0 => 11,
            1 => 7,
            2 => 3,
            3 => 0,
            _ => unreachable!("fmt is 2 bits"),
        };
        if buf.len() < basic_len + header_len {
            return Ok(None);
        }

        let ctx = self.streams.entry(csid).or_default();

        // A compressed header inherits from the csid's cache; without a
        // prior fmt-0 header there is nothing to inherit and the stream
        // cannot be framed
        if fmt != 0 && !ctx.initialized {
            return Err(ProtocolError::InvalidChunkHeader.into());
        }

        let header = &buf[basic_len..basic_len + header_len];

        // Peek the message header without consuming anything
        let (ts_field, message_length, message_type, stream_id) = match fmt {
            0 => (
                read_u24(&header[0..3]),
                read_u24(&header[3..6]),
                header[6],
                u32::from_le_bytes([header[7], header[8], header[9], header[10]]),
            ),
            1 => (
                read_u24(&header[0..3]),
                read_u24(&header[3..6]),
                header[6],
                ctx.stream_id,
            ),
            2 => (
                read_u24(&header[0..3]),
                ctx.message_length,
                ctx.message_type,
                ctx.stream_id,
            ),
            _ => (0, ctx.message_length, ctx.message_type, ctx.stream_id),
        };

        // fmt 0-2 signal an extended timestamp in the 24-bit field; fmt-3
        // continuations inherit the flag from the message they continue
        let needs_extended = if fmt == 3 {
            ctx.has_extended_timestamp
        } else {
            ts_field >= EXTENDED_TIMESTAMP_THRESHOLD
        };
        let extended_len = if needs_extended { 4 } else { 0 };

        if message_length > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size: message_length,
                max: self.max_message_size,
            }
            .into());
        }

        // Payload carried by this chunk: the message's remainder, capped
        // at the negotiated chunk size. A PartialMessage never accumulates
        // past its declared total.
        let already = ctx.partial.len() as u32;
        let remaining = message_length.saturating_sub(already);
        let data_len = remaining.min(self.chunk_size) as usize;

        let total = basic_len + header_len + extended_len + data_len;
        if buf.len() < total {
            // Not fully buffered; leave everything for the next pass
            return Ok(None);
        }

        // The whole chunk is present; consume it
        buf.advance(basic_len + header_len);
        let ts_value = if needs_extended {
            buf.get_u32()
        } else {
            ts_field
        };

        match fmt {
            0 => {
                ctx.timestamp = ts_value;
                ctx.message_length = message_length;
                ctx.message_type = message_type;
                ctx.stream_id = stream_id;
                ctx.has_extended_timestamp = needs_extended;
                ctx.initialized = true;
            }
            1 => {
                ctx.timestamp = ctx.timestamp.wrapping_add(ts_value);
                ctx.message_length = message_length;
                ctx.message_type = message_type;
                ctx.has_extended_timestamp = needs_extended;
            }
            2 => {
                ctx.timestamp = ctx.timestamp.wrapping_add(ts_value);
                ctx.has_extended_timestamp = needs_extended;
            }
            _ => {
                // fmt 3 reuses the cache verbatim
            }
        }

        if ctx.partial.is_empty() {
            ctx.expected = message_length;
            ctx.partial.reserve(message_length as usize);
        }

        ctx.partial.put_slice(&buf[..data_len]);
        buf.advance(data_len);

        if ctx.partial.len() as u32 >= ctx.expected {
            let payload = ctx.partial.split().freeze();
            ctx.expected = 0;

            Ok(Some(Message {
                csid,
                timestamp: ctx.timestamp,
                message_type: ctx.message_type,
                stream_id: ctx.stream_id,
                payload,
            }))
        } else {
            Ok(None)
        }
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Peek the basic header: (fmt, csid, header length), or None if not
/// enough bytes are buffered.
fn parse_basic_header(buf: &[u8]) -> Option<(u8, u32, usize)> {
    let first = *buf.first()?;
    let fmt = first >> 6;
    match first & 0x3F {
        0 => {
            // 2-byte form: csid = 64 + b1
            let b1 = *buf.get(1)?;
            Some((fmt, 64 + b1 as u32, 2))
        }
        1 => {
            // 3-byte form: csid = 64 + b1 + b2*256
            let b1 = *buf.get(1)?;
            let b2 = *buf.get(2)?;
            Some((fmt, 64 + b1 as u32 + (b2 as u32) * 256, 3))
        }
        csid => Some((fmt, csid as u32, 1)),
    }
}

fn read_u24(bytes: &[u8]) -> u32 {
    ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32)
}
