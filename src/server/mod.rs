//! TCP server: configuration, accept loop, connection I/O

pub mod config;
pub mod listener;

pub use config::ServerConfig;
pub use listener::IngestServer;
