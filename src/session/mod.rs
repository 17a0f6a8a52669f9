//! Per-connection session: command dispatch, flow control, media routing

pub mod connection;
pub mod state;

pub use connection::Session;
pub use state::SessionState;
