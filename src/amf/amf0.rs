//! AMF0 encoder and decoder
//!
//! Type markers on the wire:
//! ```text
//! 0x00 - Number (IEEE 754 double, big-endian)
//! 0x01 - Boolean (1 byte)
//! 0x02 - String (16-bit big-endian length + UTF-8)
//! 0x03 - Object (key-value pairs until 0x00 0x00 0x09)
//! 0x05 - Null
//! ```
//!
//! Any other marker is a decode failure for the message being parsed;
//! the session drops that message and keeps the connection.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::value::AmfValue;
use crate::error::AmfError;

const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_NULL: u8 = 0x05;
const MARKER_OBJECT_END: u8 = 0x09;

/// Maximum object nesting depth (prevents stack overflow on hostile input)
const MAX_NESTING_DEPTH: usize = 64;

/// AMF0 decoder
pub struct Amf0Decoder {
    depth: usize,
}

impl Amf0Decoder {
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Decode a single AMF0 value from the buffer
    pub fn decode(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        if buf.is_empty() {
            return Err(AmfError::UnexpectedEof);
        }

        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            self.depth -= 1;
            return Err(AmfError::NestingTooDeep);
        }

        let marker = buf.get_u8();
        let result = self.decode_marked(marker, buf);
        self.depth -= 1;
        result
    }

    /// Decode values until the buffer is exhausted
    pub fn decode_all(&mut self, buf: &mut Bytes) -> Result<Vec<AmfValue>, AmfError> {
        let mut values = Vec::new();
        while buf.has_remaining() {
            values.push(self.decode(buf)?);
        }
        Ok(values)
    }

    fn decode_marked(&mut self, marker: u8, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        match marker {
            MARKER_NUMBER => {
                if buf.remaining() < 8 {
                    return Err(AmfError::UnexpectedEof);
                }
                Ok(AmfValue::Number(buf.get_f64()))
            }
            MARKER_BOOLEAN => {
                if buf.is_empty() {
                    return Err(AmfError::UnexpectedEof);
                }
                Ok(AmfValue::Boolean(buf.get_u8() != 0))
            }
            MARKER_STRING => Ok(AmfValue::String(read_utf8(buf)?)),
            MARKER_OBJECT => self.decode_object(buf),
            MARKER_NULL => Ok(AmfValue::Null),
            other => Err(AmfError::UnknownMarker(other)),
        }
    }

    fn decode_object(&mut self, buf: &mut Bytes) -> Result<AmfValue, AmfError> {
        let mut properties = Vec::new();

        loop {
            let key = read_utf8(buf)?;

            // An empty key followed by 0x09 terminates the object
            if key.is_empty() {
                if buf.is_empty() {
                    return Err(AmfError::UnexpectedEof);
                }
                let end = buf.get_u8();
                if end == MARKER_OBJECT_END {
                    break;
                }
                return Err(AmfError::UnknownMarker(end));
            }

            let value = self.decode(buf)?;
            properties.push((key, value));
        }

        Ok(AmfValue::Object(properties))
    }
}

impl Default for Amf0Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a UTF-8 string with a 16-bit big-endian length prefix
fn read_utf8(buf: &mut Bytes) -> Result<String, AmfError> {
    if buf.remaining() < 2 {
        return Err(AmfError::UnexpectedEof);
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(AmfError::UnexpectedEof);
    }
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| AmfError::InvalidUtf8)
}

/// AMF0 encoder accumulating into an owned buffer
pub struct Amf0Encoder {
    buf: BytesMut,
}

impl Amf0Encoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Append one value
    pub fn encode(&mut self, value: &AmfValue) {
        encode_into(value, &mut self.buf);
    }

    /// Take the encoded bytes
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_into(value: &AmfValue, buf: &mut BytesMut) {
    match value {
        AmfValue::Number(n) => {
            buf.put_u8(MARKER_NUMBER);
            buf.put_f64(*n);
        }
        AmfValue::Boolean(b) => {
            buf.put_u8(MARKER_BOOLEAN);
            buf.put_u8(u8::from(*b));
        }
        AmfValue::String(s) => {
            buf.put_u8(MARKER_STRING);
            write_utf8(s, buf);
        }
        AmfValue::Object(props) => {
            buf.put_u8(MARKER_OBJECT);
            for (key, value) in props {
                write_utf8(key, buf);
                encode_into(value, buf);
            }
            buf.put_u8(0x00);
            buf.put_u8(0x00);
            buf.put_u8(MARKER_OBJECT_END);
        }
        AmfValue::Null => {
            buf.put_u8(MARKER_NULL);
        }
    }
}

/// Write a string with its 16-bit length prefix. The short-string form
/// caps at 65,535 bytes; longer input is cut at the last char boundary
/// that fits so the prefix always matches the bytes written.
fn write_utf8(s: &str, buf: &mut BytesMut) {
    let mut len = s.len().min(u16::MAX as usize);
    while !s.is_char_boundary(len) {
        len -= 1;
    }
    buf.put_u16(len as u16);
    buf.put_slice(&s.as_bytes()[..len]);
}

/// Decode one value from a standalone buffer
pub fn decode_value(buf: &mut Bytes) -> Result<AmfValue, AmfError> {
    Amf0Decoder::new().decode(buf)
}

/// Decode every value in the buffer
pub fn decode_all(buf: &mut Bytes) -> Result<Vec<AmfValue>, AmfError> {
    Amf0Decoder::new().decode_all(buf)
}

/// Encode one value into a fresh buffer
pub fn encode_value(value: &AmfValue) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.encode(value);
    encoder.finish()
}
