//! Session state machine
//!
//! One [`Session`] per TCP connection. The session is sans-io: the
//! listener feeds it raw inbound bytes and writes out whatever
//! [`Session::take_output`] returns afterwards. Internally it drives the
//! handshake, then the chunk decoder, and dispatches each reassembled
//! message.
//!
//! ```text
//! [Handshake] → connect → releaseStream/FCPublish → createStream
//!     → publish → [audio/video ingest] → deleteStream / disconnect
//! ```
//!
//! Per-message parse failures (bad AMF, unknown command, truncated
//! control payload) drop that message and keep the connection. Handshake
//! and framing failures are fatal.

use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::amf::{self, AmfValue};
use crate::error::{Error, ProtocolError, Result};
use crate::pipeline::MediaPipeline;
use crate::protocol::constants::*;
use crate::protocol::{ChunkDecoder, Message, MessageEncoder, ServerHandshake};
use crate::session::state::SessionState;

/// Audio codec id for AAC (sound format nibble)
const SOUND_FORMAT_AAC: u8 = 10;
/// Video codec id for AVC/H.264 (codec id nibble)
const CODEC_ID_AVC: u8 = 7;

/// Per-connection protocol session, generic over the media pipeline
pub struct Session<P: MediaPipeline> {
    pipeline: Arc<P>,
    handshake: ServerHandshake,
    decoder: ChunkDecoder,
    encoder: MessageEncoder,
    state: SessionState,
    inbound: BytesMut,
    outbound: BytesMut,
    closed: bool,
}

impl<P: MediaPipeline> Session<P> {
    pub fn new(pipeline: Arc<P>) -> Self {
        Self {
            pipeline,
            handshake: ServerHandshake::new(),
            decoder: ChunkDecoder::new(),
            encoder: MessageEncoder::new(),
            state: SessionState::new(),
            inbound: BytesMut::new(),
            outbound: BytesMut::new(),
            closed: false,
        }
    }

    /// Build a session using the server's negotiation parameters
    pub fn with_config(pipeline: Arc<P>, config: &crate::server::ServerConfig) -> Self {
        let mut state = SessionState::new();
        state.set_window_ack_size(config.window_ack_size());
        state.set_peer_bandwidth(config.peer_bandwidth());

        Self {
            pipeline,
            handshake: ServerHandshake::new(),
            decoder: ChunkDecoder::new(),
            encoder: MessageEncoder::with_chunk_size(config.chunk_size()),
            state,
            inbound: BytesMut::new(),
            outbound: BytesMut::new(),
            closed: false,
        }
    }

    /// Whether the handshake has completed
    pub fn handshake_done(&self) -> bool {
        self.handshake.is_done()
    }

    /// Feed raw bytes from the socket and process everything now
    /// decodable. After this returns, [`Session::take_output`] holds the
    /// bytes to write back.
    ///
    /// A returned error is fatal to the connection.
    pub async fn feed(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }

        self.inbound.extend_from_slice(data);

        if self.state.add_bytes_received(data.len()) && self.handshake.is_done() {
            let sequence = self.state.mark_ack_sent();
            trace!(sequence, "sending acknowledgement");
            self.encoder
                .write_acknowledgement(&mut self.outbound, sequence);
        }

        self.drive().await
    }

    /// Drain the bytes queued for the peer
    pub fn take_output(&mut self) -> Bytes {
        self.outbound.split().freeze()
    }

    pub fn has_output(&self) -> bool {
        !self.outbound.is_empty()
    }

    pub fn is_publishing(&self) -> bool {
        self.state.is_publishing()
    }

    pub fn stream_key(&self) -> Option<&str> {
        self.state.stream_key()
    }

    /// Tear the session down. Idempotent; called by the listener when
    /// the connection ends for any reason.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if self.state.is_publishing() {
            self.state.set_publishing(false);
            self.pipeline.teardown().await;
            info!(stream_key = ?self.state.stream_key(), "publish ended");
        }
    }

    async fn drive(&mut self) -> Result<()> {
        while !self.handshake.is_done() {
            let before = self.inbound.len();
            if let Some(response) = self.handshake.process(&mut self.inbound)? {
                self.outbound.extend_from_slice(&response);
            }

            if self.handshake.is_done() {
                debug!("handshake complete");
                self.encoder.write_set_chunk_size(&mut self.outbound);
            } else if self.inbound.len() == before {
                return Ok(());
            }
        }

        loop {
            let before = self.inbound.len();
            // Framing errors are fatal: once a header is bad there is no
            // way to find the next chunk boundary
            match self.decoder.decode(&mut self.inbound)? {
                Some(message) => self.dispatch(message).await?,
                None if self.inbound.len() == before => return Ok(()),
                None => {}
            }
        }
    }

    async fn dispatch(&mut self, message: Message) -> Result<()> {
        let message_type = message.message_type;
        let result = match message_type {
            MSG_SET_CHUNK_SIZE
            | MSG_ABORT
            | MSG_ACKNOWLEDGEMENT
            | MSG_USER_CONTROL
            | MSG_WINDOW_ACK_SIZE
            | MSG_SET_PEER_BANDWIDTH => self.handle_protocol_control(&message),
            MSG_AUDIO => self.handle_audio(message).await,
            MSG_VIDEO => self.handle_video(message).await,
            MSG_COMMAND_AMF0 => self.handle_command(message).await,
            MSG_DATA_AMF0 => {
                // @setDataFrame / onMetaData; metadata is not forwarded
                trace!("ignoring AMF0 data message");
                Ok(())
            }
            MSG_COMMAND_AMF3 | MSG_DATA_AMF3 => {
                debug!("ignoring AMF3 message");
                Ok(())
            }
            other => {
                trace!(message_type = other, "ignoring message type");
                Ok(())
            }
        };

        match result {
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, message_type, "dropping message");
                Ok(())
            }
            other => other,
        }
    }

    fn handle_protocol_control(&mut self, message: &Message) -> Result<()> {
        let payload = &message.payload;
        let read_u32 = |payload: &Bytes| -> Result<u32> {
            payload
                .get(0..4)
                .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
                .ok_or_else(|| ProtocolError::TruncatedControl(message.message_type).into())
        };

        match message.message_type {
            MSG_SET_CHUNK_SIZE => {
                // Top bit of the field is reserved
                let size = read_u32(payload)? & 0x7FFF_FFFF;
                debug!(size, "peer chunk size updated");
                self.decoder.set_chunk_size(size);
            }
            MSG_ABORT => {
                let csid = read_u32(payload)?;
                debug!(csid, "abort received");
                self.decoder.abort(csid);
            }
            MSG_ACKNOWLEDGEMENT => {
                let sequence = read_u32(payload)?;
                trace!(sequence, "peer acknowledgement");
            }
            MSG_WINDOW_ACK_SIZE => {
                let size = read_u32(payload)?;
                debug!(size, "peer window acknowledgement size");
                self.state.set_window_ack_size(size);
            }
            MSG_SET_PEER_BANDWIDTH => {
                // Informational from a publisher; nothing to adjust
                let size = read_u32(payload)?;
                trace!(size, "peer bandwidth message");
            }
            MSG_USER_CONTROL => {
                if payload.len() < 2 {
                    return Err(ProtocolError::TruncatedControl(MSG_USER_CONTROL).into());
                }
                let event = u16::from_be_bytes([payload[0], payload[1]]);
                trace!(event, "user control event");
            }
            _ => unreachable!("dispatch routes only control types here"),
        }
        Ok(())
    }

    async fn handle_command(&mut self, message: Message) -> Result<()> {
        let mut payload = message.payload;
        let values = amf::decode_all(&mut payload)?;

        let name = values
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProtocolError::InvalidCommand("missing command name".into()))?
            .to_string();
        let transaction_id = values.get(1).and_then(|v| v.as_number()).unwrap_or(0.0);

        debug!(command = %name, transaction_id, "command received");

        match name.as_str() {
            CMD_CONNECT => self.handle_connect(transaction_id, &values),
            CMD_RELEASE_STREAM | CMD_FC_PUBLISH => {
                // Acknowledged without further effect; publish is the
                // authoritative stream-key source
                self.encoder.write_command(
                    &mut self.outbound,
                    0,
                    &[
                        AmfValue::String(CMD_RESULT.into()),
                        AmfValue::Number(transaction_id),
                        AmfValue::Null,
                    ],
                );
                Ok(())
            }
            CMD_CREATE_STREAM => self.handle_create_stream(transaction_id),
            CMD_PUBLISH => self.handle_publish(&values).await,
            CMD_DELETE_STREAM => self.handle_delete_stream().await,
            other => Err(ProtocolError::InvalidCommand(other.to_string()).into()),
        }
    }

    fn handle_connect(&mut self, transaction_id: f64, values: &[AmfValue]) -> Result<()> {
        if let Some(app) = values.get(2).and_then(|obj| obj.get_str("app")) {
            self.state.set_app(app.to_string());
        }
        info!(app = ?self.state.app(), "connect");

        self.encoder
            .write_window_ack_size(&mut self.outbound, self.state.window_ack_size());
        self.encoder.write_set_peer_bandwidth(
            &mut self.outbound,
            self.state.peer_bandwidth(),
            BANDWIDTH_LIMIT_DYNAMIC,
        );
        self.encoder.write_stream_begin(&mut self.outbound, 0);

        let properties = AmfValue::object([
            ("fmsVer", AmfValue::String("FMS/3,5,7,7009".into())),
            ("capabilities", AmfValue::Number(31.0)),
        ]);
        let information = AmfValue::object([
            ("level", AmfValue::String("status".into())),
            ("code", AmfValue::String(NC_CONNECT_SUCCESS.into())),
            ("description", AmfValue::String("Connection succeeded.".into())),
            ("objectEncoding", AmfValue::Number(0.0)),
        ]);
        self.encoder.write_command(
            &mut self.outbound,
            0,
            &[
                AmfValue::String(CMD_RESULT.into()),
                AmfValue::Number(transaction_id),
                properties,
                information,
            ],
        );

        self.state.mark_connected();
        Ok(())
    }

    fn handle_create_stream(&mut self, transaction_id: f64) -> Result<()> {
        self.encoder.write_command(
            &mut self.outbound,
            0,
            &[
                AmfValue::String(CMD_RESULT.into()),
                AmfValue::Number(transaction_id),
                AmfValue::Null,
                AmfValue::Number(PUBLISH_STREAM_ID as f64),
            ],
        );
        self.encoder
            .write_stream_begin(&mut self.outbound, PUBLISH_STREAM_ID);
        Ok(())
    }

    async fn handle_publish(&mut self, values: &[AmfValue]) -> Result<()> {
        // The stream key is the first String argument after the
        // transaction id; a Null command object may sit in between
        let stream_key = values
            .iter()
            .skip(2)
            .find_map(|v| v.as_str())
            .ok_or_else(|| ProtocolError::InvalidCommand("publish without stream key".into()))?
            .to_string();

        info!(stream_key = %stream_key, "publish");
        self.state.set_stream_key(stream_key.clone());
        self.state.set_publishing(true);

        let status = AmfValue::object([
            ("level", AmfValue::String("status".into())),
            ("code", AmfValue::String(NS_PUBLISH_START.into())),
            (
                "description",
                AmfValue::String(format!("{} is now published.", stream_key)),
            ),
        ]);
        self.encoder.write_command(
            &mut self.outbound,
            PUBLISH_STREAM_ID,
            &[
                AmfValue::String(CMD_ON_STATUS.into()),
                AmfValue::Number(0.0),
                AmfValue::Null,
                status,
            ],
        );

        // Pipeline setup runs off the session task so a slow collaborator
        // cannot stall protocol handling
        let pipeline = Arc::clone(&self.pipeline);
        tokio::spawn(async move {
            if let Err(e) = pipeline.initialize(&stream_key).await {
                warn!(error = %e, stream_key = %stream_key, "pipeline initialization failed");
            }
        });

        Ok(())
    }

    async fn handle_delete_stream(&mut self) -> Result<()> {
        if self.state.is_publishing() {
            self.state.set_publishing(false);
            self.pipeline.teardown().await;
            info!(stream_key = ?self.state.stream_key(), "publish ended");
        }
        Ok(())
    }

    async fn handle_audio(&mut self, message: Message) -> Result<()> {
        if !self.state.is_publishing() {
            trace!("audio before publish, dropped");
            return Ok(());
        }
        let payload = message.payload;
        if payload.is_empty() {
            return Ok(());
        }

        // 1-byte container header; AAC carries an extra packet-type byte
        let sound_format = payload[0] >> 4;
        let header_len = if sound_format == SOUND_FORMAT_AAC { 2 } else { 1 };
        if payload.len() < header_len {
            return Ok(());
        }

        self.pipeline
            .ingest_audio(payload.slice(header_len..), message.timestamp)
            .await
            .map_err(|e| Error::Pipeline(e.to_string()))
    }

    async fn handle_video(&mut self, message: Message) -> Result<()> {
        if !self.state.is_publishing() {
            trace!("video before publish, dropped");
            return Ok(());
        }
        let payload = message.payload;
        if payload.is_empty() {
            return Ok(());
        }

        // 1-byte frame/codec header; AVC adds packet type + composition
        // time offset (4 bytes)
        let codec_id = payload[0] & 0x0F;
        let header_len = if codec_id == CODEC_ID_AVC { 5 } else { 1 };
        if payload.len() < header_len {
            return Ok(());
        }

        self.pipeline
            .ingest_video(payload.slice(header_len..), message.timestamp)
            .await
            .map_err(|e| Error::Pipeline(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::NullPipeline;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Pipeline that records every call for assertions
    #[derive(Default)]
    struct RecordingPipeline {
        initialized: Mutex<Vec<String>>,
        audio: Mutex<Vec<(Vec<u8>, u32)>>,
        video: Mutex<Vec<(Vec<u8>, u32)>>,
        teardowns: Mutex<u32>,
    }

    #[async_trait]
    impl MediaPipeline for RecordingPipeline {
        async fn initialize(&self, stream_key: &str) -> Result<()> {
            self.initialized.lock().unwrap().push(stream_key.to_string());
            Ok(())
        }

        async fn ingest_audio(&self, payload: Bytes, timestamp: u32) -> Result<()> {
            self.audio.lock().unwrap().push((payload.to_vec(), timestamp));
            Ok(())
        }

        async fn ingest_video(&self, payload: Bytes, timestamp: u32) -> Result<()> {
            self.video.lock().unwrap().push((payload.to_vec(), timestamp));
            Ok(())
        }

        async fn teardown(&self) {
            *self.teardowns.lock().unwrap() += 1;
        }
    }

    /// Wait for the spawned initialize task to land
    async fn wait_for_initialize(pipeline: &RecordingPipeline) -> Vec<String> {
        for _ in 0..100 {
            {
                let inits = pipeline.initialized.lock().unwrap();
                if !inits.is_empty() {
                    return inits.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Vec::new()
    }

    fn c0c1() -> Vec<u8> {
        let mut buf = vec![RTMP_VERSION];
        buf.extend((0..HANDSHAKE_SIZE).map(|i| (i % 251) as u8));
        buf
    }

    /// Client-side framer for building inbound wire bytes
    fn client_command(values: &[AmfValue]) -> BytesMut {
        let mut out = BytesMut::new();
        MessageEncoder::with_chunk_size(DEFAULT_CHUNK_SIZE).write_message(
            &mut out,
            CSID_COMMAND,
            0,
            MSG_COMMAND_AMF0,
            0,
            &crate::protocol::control::encode_amf_sequence(values),
        );
        out
    }

    fn client_media(message_type: u8, timestamp: u32, payload: &[u8]) -> BytesMut {
        let mut out = BytesMut::new();
        MessageEncoder::with_chunk_size(DEFAULT_CHUNK_SIZE).write_message(
            &mut out,
            4,
            timestamp,
            message_type,
            PUBLISH_STREAM_ID,
            payload,
        );
        out
    }

    fn client_control(message_type: u8, value: u32) -> BytesMut {
        let mut out = BytesMut::new();
        MessageEncoder::with_chunk_size(DEFAULT_CHUNK_SIZE).write_message(
            &mut out,
            CSID_PROTOCOL_CONTROL,
            0,
            message_type,
            0,
            &value.to_be_bytes(),
        );
        out
    }

    /// Decode every message the server wrote. The server announces its
    /// chunk size right after the handshake; tests often drain that frame
    /// separately, so the decoder starts at the announced size.
    fn decode_server_output(output: &[u8]) -> Vec<Message> {
        let mut decoder = ChunkDecoder::new();
        decoder.set_chunk_size(SERVER_CHUNK_SIZE);
        let mut buf = BytesMut::from(output);
        let mut messages = Vec::new();
        loop {
            let before = buf.len();
            match decoder.decode(&mut buf).unwrap() {
                Some(msg) => {
                    if msg.message_type == MSG_SET_CHUNK_SIZE {
                        let size = u32::from_be_bytes([
                            msg.payload[0],
                            msg.payload[1],
                            msg.payload[2],
                            msg.payload[3],
                        ]);
                        decoder.set_chunk_size(size);
                    }
                    messages.push(msg);
                }
                None if buf.len() == before => break,
                None => {}
            }
        }
        messages
    }

    fn amf_values(msg: &Message) -> Vec<AmfValue> {
        let mut payload = msg.payload.clone();
        amf::decode_all(&mut payload).unwrap()
    }

    async fn handshaken_session<P: MediaPipeline>(pipeline: Arc<P>) -> Session<P> {
        let mut session = Session::new(pipeline);
        session.feed(&c0c1()).await.unwrap();
        let response = session.take_output();
        assert_eq!(response.len(), 1 + HANDSHAKE_SIZE * 2);
        session.feed(&[0u8; HANDSHAKE_SIZE]).await.unwrap();
        session
    }

    async fn published_session(
        pipeline: Arc<RecordingPipeline>,
        stream_key: &str,
    ) -> Session<RecordingPipeline> {
        let mut session = handshaken_session(pipeline).await;
        session
            .feed(&client_command(&[
                AmfValue::String("connect".into()),
                AmfValue::Number(1.0),
                AmfValue::object([("app", AmfValue::String("live".into()))]),
            ]))
            .await
            .unwrap();
        session
            .feed(&client_command(&[
                AmfValue::String("createStream".into()),
                AmfValue::Number(4.0),
                AmfValue::Null,
            ]))
            .await
            .unwrap();
        session
            .feed(&client_command(&[
                AmfValue::String("publish".into()),
                AmfValue::Number(5.0),
                AmfValue::Null,
                AmfValue::String(stream_key.into()),
                AmfValue::String("live".into()),
            ]))
            .await
            .unwrap();
        session.take_output();
        session
    }

    #[tokio::test]
    async fn test_handshake_exchange() {
        let mut session = Session::new(Arc::new(NullPipeline));

        session.feed(&c0c1()).await.unwrap();
        let response = session.take_output();
        assert_eq!(response.len(), 1 + HANDSHAKE_SIZE * 2);
        assert_eq!(response[0], RTMP_VERSION);

        // C2 completes the handshake; server announces its chunk size
        session.feed(&[0u8; HANDSHAKE_SIZE]).await.unwrap();
        let output = session.take_output();
        let messages = decode_server_output(&output);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_type, MSG_SET_CHUNK_SIZE);
    }

    #[tokio::test]
    async fn test_wrong_version_closes_with_no_output() {
        let mut session = Session::new(Arc::new(NullPipeline));

        let mut bad = c0c1();
        bad[0] = 0x06;
        let result = session.feed(&bad).await;
        assert!(result.is_err());
        assert!(!session.has_output());
    }

    #[tokio::test]
    async fn test_connect_response_sequence() {
        let mut session = handshaken_session(Arc::new(NullPipeline)).await;
        session.take_output();

        session
            .feed(&client_command(&[
                AmfValue::String("connect".into()),
                AmfValue::Number(1.0),
                AmfValue::object([("app", AmfValue::String("live".into()))]),
            ]))
            .await
            .unwrap();

        let messages = decode_server_output(&session.take_output());
        let types: Vec<u8> = messages.iter().map(|m| m.message_type).collect();
        assert_eq!(
            types,
            [
                MSG_WINDOW_ACK_SIZE,
                MSG_SET_PEER_BANDWIDTH,
                MSG_USER_CONTROL,
                MSG_COMMAND_AMF0
            ]
        );

        let values = amf_values(&messages[3]);
        assert_eq!(values[0].as_str(), Some("_result"));
        assert_eq!(values[1].as_number(), Some(1.0));
        assert_eq!(
            values[3].get_str("code"),
            Some("NetConnection.Connect.Success")
        );
    }

    #[tokio::test]
    async fn test_create_stream_returns_stream_id() {
        let mut session = handshaken_session(Arc::new(NullPipeline)).await;
        session
            .feed(&client_command(&[
                AmfValue::String("connect".into()),
                AmfValue::Number(1.0),
                AmfValue::object([("app", AmfValue::String("live".into()))]),
            ]))
            .await
            .unwrap();
        session.take_output();

        session
            .feed(&client_command(&[
                AmfValue::String("createStream".into()),
                AmfValue::Number(4.0),
                AmfValue::Null,
            ]))
            .await
            .unwrap();

        let messages = decode_server_output(&session.take_output());
        let values = amf_values(&messages[0]);
        assert_eq!(values[0].as_str(), Some("_result"));
        assert_eq!(values[1].as_number(), Some(4.0));
        assert_eq!(values[3].as_number(), Some(1.0));

        // Stream Begin for the new message stream
        assert_eq!(messages[1].message_type, MSG_USER_CONTROL);
        assert_eq!(&messages[1].payload[..], &[0, 0, 0, 0, 0, 1]);
    }

    #[tokio::test]
    async fn test_publish_starts_pipeline_once() {
        let pipeline = Arc::new(RecordingPipeline::default());
        let mut session = handshaken_session(Arc::clone(&pipeline)).await;

        session
            .feed(&client_command(&[
                AmfValue::String("connect".into()),
                AmfValue::Number(1.0),
                AmfValue::object([("app", AmfValue::String("live".into()))]),
            ]))
            .await
            .unwrap();
        session
            .feed(&client_command(&[
                AmfValue::String("publish".into()),
                AmfValue::Number(5.0),
                AmfValue::Null,
                AmfValue::String("mystream".into()),
                AmfValue::String("live".into()),
            ]))
            .await
            .unwrap();

        let messages = decode_server_output(&session.take_output());
        let on_status = messages
            .iter()
            .rev()
            .find(|m| m.message_type == MSG_COMMAND_AMF0)
            .unwrap();
        assert_eq!(on_status.stream_id, PUBLISH_STREAM_ID);
        let values = amf_values(on_status);
        assert_eq!(values[0].as_str(), Some("onStatus"));
        assert_eq!(values[3].get_str("code"), Some("NetStream.Publish.Start"));

        assert_eq!(wait_for_initialize(&pipeline).await, ["mystream"]);
        assert!(session.is_publishing());
        assert_eq!(session.stream_key(), Some("mystream"));
    }

    #[tokio::test]
    async fn test_release_stream_and_fc_publish_acknowledged() {
        let mut session = handshaken_session(Arc::new(NullPipeline)).await;
        session.take_output();

        for (cmd, txn) in [("releaseStream", 2.0), ("FCPublish", 3.0)] {
            session
                .feed(&client_command(&[
                    AmfValue::String(cmd.into()),
                    AmfValue::Number(txn),
                    AmfValue::Null,
                    AmfValue::String("mystream".into()),
                ]))
                .await
                .unwrap();

            let messages = decode_server_output(&session.take_output());
            assert_eq!(messages.len(), 1);
            let values = amf_values(&messages[0]);
            assert_eq!(values[0].as_str(), Some("_result"));
            assert_eq!(values[1].as_number(), Some(txn));
        }
    }

    #[tokio::test]
    async fn test_media_forwarding_strips_container_headers() {
        let pipeline = Arc::new(RecordingPipeline::default());
        let mut session = published_session(Arc::clone(&pipeline), "mystream").await;

        // AAC audio: sound format 10 in the high nibble, packet type byte
        session
            .feed(&client_media(MSG_AUDIO, 100, &[0xAF, 0x01, 0x11, 0x22]))
            .await
            .unwrap();
        // MP3 audio: 1-byte header only
        session
            .feed(&client_media(MSG_AUDIO, 120, &[0x2F, 0x33]))
            .await
            .unwrap();
        // AVC video: frame/codec byte, packet type, 3-byte composition time
        session
            .feed(&client_media(
                MSG_VIDEO,
                110,
                &[0x17, 0x01, 0x00, 0x00, 0x00, 0xAA, 0xBB],
            ))
            .await
            .unwrap();

        let audio = pipeline.audio.lock().unwrap().clone();
        assert_eq!(audio, [(vec![0x11, 0x22], 100), (vec![0x33], 120)]);

        let video = pipeline.video.lock().unwrap().clone();
        assert_eq!(video, [(vec![0xAA, 0xBB], 110)]);
    }

    #[tokio::test]
    async fn test_media_before_publish_is_dropped() {
        let pipeline = Arc::new(RecordingPipeline::default());
        let mut session = handshaken_session(Arc::clone(&pipeline)).await;

        session
            .feed(&client_media(MSG_AUDIO, 0, &[0xAF, 0x01, 0x11]))
            .await
            .unwrap();

        assert!(pipeline.audio.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_acknowledgement_after_window() {
        let pipeline = Arc::new(RecordingPipeline::default());
        let mut session = published_session(Arc::clone(&pipeline), "mystream").await;

        // Shrink the window so the test does not need megabytes
        session
            .feed(&client_control(MSG_WINDOW_ACK_SIZE, 1_000))
            .await
            .unwrap();
        session.take_output();

        let frame = client_media(MSG_VIDEO, 0, &[0x27; 100]);
        let mut acks = Vec::new();
        for _ in 0..40 {
            session.feed(&frame).await.unwrap();
            let output = session.take_output();
            acks.extend(
                decode_server_output(&output)
                    .into_iter()
                    .filter(|m| m.message_type == MSG_ACKNOWLEDGEMENT),
            );
        }

        // ~4.5 KB fed against a 1 KB window: several acks, each carrying
        // a strictly growing cumulative sequence
        assert!(acks.len() >= 2, "expected repeated acks, got {}", acks.len());
        let sequences: Vec<u32> = acks
            .iter()
            .map(|m| u32::from_be_bytes([m.payload[0], m.payload[1], m.payload[2], m.payload[3]]))
            .collect();
        assert!(sequences.windows(2).all(|w| w[1] > w[0]));
        assert!(sequences[0] >= 1_000);
    }

    #[tokio::test]
    async fn test_bad_command_payload_keeps_connection() {
        let mut session = handshaken_session(Arc::new(NullPipeline)).await;
        session.take_output();

        // Type 20 message whose payload is not valid AMF0
        let mut garbage = BytesMut::new();
        MessageEncoder::with_chunk_size(DEFAULT_CHUNK_SIZE).write_message(
            &mut garbage,
            CSID_COMMAND,
            0,
            MSG_COMMAND_AMF0,
            0,
            &[0xFF, 0xFE, 0xFD],
        );
        session.feed(&garbage).await.unwrap();

        // Session still answers commands afterwards
        session
            .feed(&client_command(&[
                AmfValue::String("createStream".into()),
                AmfValue::Number(9.0),
                AmfValue::Null,
            ]))
            .await
            .unwrap();
        let messages = decode_server_output(&session.take_output());
        assert!(!messages.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_connection() {
        let mut session = handshaken_session(Arc::new(NullPipeline)).await;
        session.take_output();

        session
            .feed(&client_command(&[
                AmfValue::String("getStreamLength".into()),
                AmfValue::Number(7.0),
                AmfValue::Null,
            ]))
            .await
            .unwrap();

        session
            .feed(&client_command(&[
                AmfValue::String("createStream".into()),
                AmfValue::Number(8.0),
                AmfValue::Null,
            ]))
            .await
            .unwrap();
        assert!(session.has_output());
    }

    #[tokio::test]
    async fn test_delete_stream_tears_down_pipeline() {
        let pipeline = Arc::new(RecordingPipeline::default());
        let mut session = published_session(Arc::clone(&pipeline), "mystream").await;

        session
            .feed(&client_command(&[
                AmfValue::String("deleteStream".into()),
                AmfValue::Number(6.0),
                AmfValue::Null,
                AmfValue::Number(1.0),
            ]))
            .await
            .unwrap();

        assert!(!session.is_publishing());
        assert_eq!(*pipeline.teardowns.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_close_tears_down_once() {
        let pipeline = Arc::new(RecordingPipeline::default());
        let mut session = published_session(Arc::clone(&pipeline), "mystream").await;

        session.close().await;
        session.close().await;
        assert_eq!(*pipeline.teardowns.lock().unwrap(), 1);

        assert!(session.feed(&[0u8; 4]).await.is_err());
    }

    #[tokio::test]
    async fn test_fragmented_delivery_one_byte_at_a_time() {
        let mut session = handshaken_session(Arc::new(NullPipeline)).await;
        session.take_output();

        let wire = client_command(&[
            AmfValue::String("connect".into()),
            AmfValue::Number(1.0),
            AmfValue::object([("app", AmfValue::String("live".into()))]),
        ]);
        for &b in wire.iter() {
            session.feed(&[b]).await.unwrap();
        }

        let messages = decode_server_output(&session.take_output());
        assert_eq!(messages.len(), 4);
    }

    #[tokio::test]
    async fn test_client_set_chunk_size_respected() {
        let pipeline = Arc::new(RecordingPipeline::default());
        let mut session = published_session(Arc::clone(&pipeline), "mystream").await;

        session
            .feed(&client_control(MSG_SET_CHUNK_SIZE, 4096))
            .await
            .unwrap();

        // A single 1000-byte chunk, valid only at the new size. First
        // byte is a non-AVC codec header so only 1 byte is stripped.
        let payload: Vec<u8> = std::iter::once(0x12)
            .chain(std::iter::repeat(0xEE).take(999))
            .collect();
        let mut out = BytesMut::new();
        MessageEncoder::with_chunk_size(4096).write_message(
            &mut out,
            4,
            50,
            MSG_VIDEO,
            PUBLISH_STREAM_ID,
            &payload,
        );
        session.feed(&out).await.unwrap();

        let video = pipeline.video.lock().unwrap().clone();
        assert_eq!(video.len(), 1);
        assert_eq!(video[0].0.len(), 999);
        assert_eq!(video[0].1, 50);
    }
}
