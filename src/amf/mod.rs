//! AMF0 command-value codec
//!
//! Commands on the wire are a sequence of AMF0-encoded values. This crate
//! speaks the subset every ingest encoder actually uses: Number, Boolean,
//! String, Object and Null.

pub mod amf0;
pub mod value;

pub use amf0::{decode_all, decode_value, encode_value, Amf0Decoder, Amf0Encoder};
pub use value::AmfValue;
