//! Protocol constants
//!
//! Reference: Adobe RTMP Specification (December 2012)

/// Protocol version byte (always 3)
pub const RTMP_VERSION: u8 = 3;

/// Default ingest port
pub const RTMP_PORT: u16 = 1935;

/// Handshake payload size (C1/C2/S1/S2)
pub const HANDSHAKE_SIZE: usize = 1536;

/// Default chunk size until Set Chunk Size renegotiates it
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Chunk size this server announces to peers
pub const SERVER_CHUNK_SIZE: u32 = 4096;

/// Maximum chunk size allowed
pub const MAX_CHUNK_SIZE: u32 = 0xFFFFFF;

/// Maximum message size (sanity limit)
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// 24-bit timestamp field value signalling an extended timestamp
pub const EXTENDED_TIMESTAMP_THRESHOLD: u32 = 0xFFFFFF;

// ============================================================================
// Chunk Stream IDs (csid)
// ============================================================================

/// Protocol control messages (Set Chunk Size, Ack, etc.)
pub const CSID_PROTOCOL_CONTROL: u32 = 2;

/// Command messages (connect, createStream, publish responses)
pub const CSID_COMMAND: u32 = 3;

// ============================================================================
// Message Type IDs
// ============================================================================

/// Set Chunk Size (1)
pub const MSG_SET_CHUNK_SIZE: u8 = 1;

/// Abort Message (2)
pub const MSG_ABORT: u8 = 2;

/// Acknowledgement (3)
pub const MSG_ACKNOWLEDGEMENT: u8 = 3;

/// User Control Message (4)
pub const MSG_USER_CONTROL: u8 = 4;

/// Window Acknowledgement Size (5)
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;

/// Set Peer Bandwidth (6)
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;

/// Audio Message (8)
pub const MSG_AUDIO: u8 = 8;

/// Video Message (9)
pub const MSG_VIDEO: u8 = 9;

/// AMF3 Data Message (15)
pub const MSG_DATA_AMF3: u8 = 15;

/// AMF3 Command Message (17)
pub const MSG_COMMAND_AMF3: u8 = 17;

/// AMF0 Data Message (18) - @setDataFrame, onMetaData
pub const MSG_DATA_AMF0: u8 = 18;

/// AMF0 Command Message (20) - connect, createStream, publish
pub const MSG_COMMAND_AMF0: u8 = 20;

// ============================================================================
// User Control Event Types
// ============================================================================

/// Stream Begin - sent when a stream becomes functional
pub const UC_STREAM_BEGIN: u16 = 0;

// ============================================================================
// Peer Bandwidth Limit Types
// ============================================================================

pub const BANDWIDTH_LIMIT_HARD: u8 = 0;
pub const BANDWIDTH_LIMIT_SOFT: u8 = 1;
pub const BANDWIDTH_LIMIT_DYNAMIC: u8 = 2;

// ============================================================================
// Command Names
// ============================================================================

pub const CMD_CONNECT: &str = "connect";
pub const CMD_CREATE_STREAM: &str = "createStream";
pub const CMD_PUBLISH: &str = "publish";
pub const CMD_RELEASE_STREAM: &str = "releaseStream";
pub const CMD_FC_PUBLISH: &str = "FCPublish";
pub const CMD_DELETE_STREAM: &str = "deleteStream";

/// Response command names
pub const CMD_RESULT: &str = "_result";
pub const CMD_ON_STATUS: &str = "onStatus";

// ============================================================================
// Status Codes
// ============================================================================

pub const NC_CONNECT_SUCCESS: &str = "NetConnection.Connect.Success";
pub const NS_PUBLISH_START: &str = "NetStream.Publish.Start";

// ============================================================================
// Default Server Settings
// ============================================================================

/// Default window acknowledgement size (2.5 MB)
pub const DEFAULT_WINDOW_ACK_SIZE: u32 = 2_500_000;

/// Default peer bandwidth (2.5 MB)
pub const DEFAULT_PEER_BANDWIDTH: u32 = 2_500_000;

/// Message stream id handed out by createStream; one publish stream per
/// connection, so it never changes
pub const PUBLISH_STREAM_ID: u32 = 1;
