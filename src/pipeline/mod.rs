//! Media pipeline integration
//!
//! The session hands de-containerized audio and video to a
//! [`MediaPipeline`]. Implementations own whatever happens next:
//! transcoding, segmenting, relaying. The server is generic over the
//! pipeline, one instance shared across connections.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::Result;

/// Receiver for a published media stream
#[async_trait]
pub trait MediaPipeline: Send + Sync + 'static {
    /// Called once when a publish command is accepted, with the stream
    /// key the client published under.
    async fn initialize(&self, stream_key: &str) -> Result<()>;

    /// One audio payload, container header already stripped
    async fn ingest_audio(&self, payload: Bytes, timestamp: u32) -> Result<()>;

    /// One video payload, container header already stripped
    async fn ingest_video(&self, payload: Bytes, timestamp: u32) -> Result<()>;

    /// Called when the publishing connection ends, cleanly or not
    async fn teardown(&self);
}

/// Pipeline that discards everything; useful for tests and for running
/// the server as a protocol sink.
#[derive(Debug, Default, Clone)]
pub struct NullPipeline;

#[async_trait]
impl MediaPipeline for NullPipeline {
    async fn initialize(&self, stream_key: &str) -> Result<()> {
        debug!(stream_key, "pipeline initialized");
        Ok(())
    }

    async fn ingest_audio(&self, _payload: Bytes, _timestamp: u32) -> Result<()> {
        Ok(())
    }

    async fn ingest_video(&self, _payload: Bytes, _timestamp: u32) -> Result<()> {
        Ok(())
    }

    async fn teardown(&self) {}
}
