//! TCP accept loop and per-connection I/O
//!
//! One tokio task per connection. The task owns the socket and a
//! [`Session`]; it reads, feeds the session, and writes whatever the
//! session queued. Session errors end the connection; the accept loop
//! keeps running.

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::pipeline::MediaPipeline;
use crate::server::config::ServerConfig;
use crate::session::Session;

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// The ingest server: binds, accepts, and runs sessions
pub struct IngestServer<P: MediaPipeline> {
    config: ServerConfig,
    pipeline: Arc<P>,
}

impl<P: MediaPipeline> IngestServer<P> {
    pub fn new(config: ServerConfig, pipeline: P) -> Self {
        Self {
            config,
            pipeline: Arc::new(pipeline),
        }
    }

    /// Bind the configured address and serve until the listener fails
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        info!(addr = %self.config.bind_addr(), "ingest server listening");
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer_addr) = listener.accept().await?;
            debug!(%peer_addr, "connection accepted");

            if let Err(e) = stream.set_nodelay(self.config.tcp_nodelay()) {
                warn!(%peer_addr, error = %e, "failed to set TCP_NODELAY");
            }

            let config = self.config.clone();
            let pipeline = Arc::clone(&self.pipeline);
            tokio::spawn(async move {
                match run_connection(stream, config, pipeline).await {
                    Ok(()) => debug!(%peer_addr, "connection closed"),
                    Err(Error::ConnectionClosed) => debug!(%peer_addr, "peer disconnected"),
                    Err(Error::Timeout) => debug!(%peer_addr, "connection timed out"),
                    Err(e) => error!(%peer_addr, error = %e, "connection failed"),
                }
            });
        }
    }
}

/// Drive one connection to completion
async fn run_connection<P: MediaPipeline>(
    stream: TcpStream,
    config: ServerConfig,
    pipeline: Arc<P>,
) -> Result<()> {
    let mut session = Session::with_config(pipeline, &config);
    let result = pump(stream, &mut session, &config).await;
    session.close().await;
    result
}

async fn pump<P: MediaPipeline>(
    mut stream: TcpStream,
    session: &mut Session<P>,
    config: &ServerConfig,
) -> Result<()> {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read_timeout = if session.handshake_done() {
            config.idle_timeout()
        } else {
            config.handshake_timeout()
        };

        let n = timeout(read_timeout, stream.read(&mut buf))
            .await
            .map_err(|_| Error::Timeout)??;
        if n == 0 {
            return Ok(());
        }

        let fed = session.feed(&buf[..n]).await;

        // Flush anything produced before a failure surfaced
        if session.has_output() {
            let output = session.take_output();
            stream.write_all(&output).await?;
        }

        fed?;
    }
}
