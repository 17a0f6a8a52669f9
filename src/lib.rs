//! rtmp-ingest: server-side core for RTMP-style live ingest
//!
//! This library implements the receive path of an RTMP-style ingest server:
//! the fixed handshake, the chunk-stream transport (message reassembly with
//! per-chunk-stream header compression), the AMF0 command codec, and the
//! per-connection command dispatch for the connect/createStream/publish
//! flow. Decoded audio/video payloads are handed to a [`MediaPipeline`]
//! collaborator; everything the library writes back to the peer is framed
//! protocol bytes.
//!
//! # Example: ingest server
//!
//! ```no_run
//! use rtmp_ingest::{IngestServer, ServerConfig, NullPipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = IngestServer::new(ServerConfig::default(), NullPipeline);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! [`MediaPipeline`]: pipeline::MediaPipeline

pub mod amf;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod server;
pub mod session;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use pipeline::{MediaPipeline, NullPipeline};
pub use server::config::ServerConfig;
pub use server::listener::IngestServer;
pub use session::connection::Session;
