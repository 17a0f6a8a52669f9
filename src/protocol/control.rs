//! Outbound message framing and protocol control builders
//!
//! Every server-to-client message is framed here: a full fmt-0 header on
//! the first chunk, fmt-3 basic headers on continuations once the payload
//! exceeds the server's own chunk size.
//!
//! Protocol control messages (types 1-6) always travel on csid 2, message
//! stream 0, timestamp 0. Command responses travel on csid 3.

use bytes::{BufMut, Bytes, BytesMut};

use crate::amf::{Amf0Encoder, AmfValue};
use crate::protocol::constants::*;

/// Frames outbound messages into chunks
#[derive(Debug)]
pub struct MessageEncoder {
    /// The chunk size this server writes with
    chunk_size: u32,
}

impl MessageEncoder {
    pub fn new() -> Self {
        Self {
            chunk_size: SERVER_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(chunk_size: u32) -> Self {
        Self {
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE),
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Frame one message into `out`, splitting into chunks as needed
    pub fn write_message(
        &self,
        out: &mut BytesMut,
        csid: u32,
        timestamp: u32,
        message_type: u8,
        stream_id: u32,
        payload: &[u8],
    ) {
        let extended = timestamp >= EXTENDED_TIMESTAMP_THRESHOLD;
        let ts_field = if extended {
            EXTENDED_TIMESTAMP_THRESHOLD
        } else {
            timestamp
        };

        write_basic_header(out, 0, csid);
        out.put_uint(ts_field as u64, 3);
        out.put_uint(payload.len() as u64, 3);
        out.put_u8(message_type);
        out.put_u32_le(stream_id);
        if extended {
            out.put_u32(timestamp);
        }

        let mut chunks = payload.chunks(self.chunk_size as usize);
        if let Some(first) = chunks.next() {
            out.put_slice(first);
        }
        for rest in chunks {
            write_basic_header(out, 3, csid);
            if extended {
                out.put_u32(timestamp);
            }
            out.put_slice(rest);
        }
    }

    /// Set Chunk Size (type 1): announce the size this server writes with
    pub fn write_set_chunk_size(&self, out: &mut BytesMut) {
        let payload = self.chunk_size.to_be_bytes();
        self.write_control(out, MSG_SET_CHUNK_SIZE, &payload);
    }

    /// Acknowledgement (type 3): cumulative byte count received
    pub fn write_acknowledgement(&self, out: &mut BytesMut, sequence: u32) {
        self.write_control(out, MSG_ACKNOWLEDGEMENT, &sequence.to_be_bytes());
    }

    /// Window Acknowledgement Size (type 5)
    pub fn write_window_ack_size(&self, out: &mut BytesMut, size: u32) {
        self.write_control(out, MSG_WINDOW_ACK_SIZE, &size.to_be_bytes());
    }

    /// Set Peer Bandwidth (type 6): window size plus limit type byte
    pub fn write_set_peer_bandwidth(&self, out: &mut BytesMut, size: u32, limit_type: u8) {
        let mut payload = [0u8; 5];
        payload[0..4].copy_from_slice(&size.to_be_bytes());
        payload[4] = limit_type;
        self.write_control(out, MSG_SET_PEER_BANDWIDTH, &payload);
    }

    /// User Control Stream Begin (type 4, event 0)
    pub fn write_stream_begin(&self, out: &mut BytesMut, stream_id: u32) {
        let mut payload = [0u8; 6];
        payload[0..2].copy_from_slice(&UC_STREAM_BEGIN.to_be_bytes());
        payload[2..6].copy_from_slice(&stream_id.to_be_bytes());
        self.write_control(out, MSG_USER_CONTROL, &payload);
    }

    /// AMF0 command message (type 20) on the command chunk stream
    pub fn write_command(&self, out: &mut BytesMut, stream_id: u32, values: &[AmfValue]) {
        let payload = encode_amf_sequence(values);
        self.write_message(out, CSID_COMMAND, 0, MSG_COMMAND_AMF0, stream_id, &payload);
    }

    fn write_control(&self, out: &mut BytesMut, message_type: u8, payload: &[u8]) {
        self.write_message(out, CSID_PROTOCOL_CONTROL, 0, message_type, 0, payload);
    }
}

impl Default for MessageEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn write_basic_header(out: &mut BytesMut, fmt: u8, csid: u32) {
    match csid {
        2..=63 => out.put_u8((fmt << 6) | csid as u8),
        64..=319 => {
            out.put_u8(fmt << 6);
            out.put_u8((csid - 64) as u8);
        }
        _ => {
            out.put_u8((fmt << 6) | 1);
            let rest = csid - 64;
            out.put_u8((rest & 0xFF) as u8);
            out.put_u8((rest >> 8) as u8);
        }
    }
}

/// Encode a sequence of AMF0 values back-to-back
pub fn encode_amf_sequence(values: &[AmfValue]) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    for value in values {
        encoder.encode(value);
    }
    encoder.finish()
}
