//! Wire protocol: handshake, chunk transport, outbound framing

pub mod chunk;
pub mod constants;
pub mod control;
pub mod handshake;

pub use chunk::{ChunkDecoder, Message};
pub use control::MessageEncoder;
pub use handshake::{HandshakePhase, ServerHandshake};
