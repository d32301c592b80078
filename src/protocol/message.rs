//! Protocol messages
//!
//! Defines all message types exchanged between node and client, with their
//! binary encoding. Structured payloads (file listings, error frames) are
//! carried as JSON inside the binary frame; bulk payloads stay raw.

use bytes::{Buf, BufMut, BytesMut};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{error, trace};

use crate::crypto::NONCE_SIZE;
use crate::error::ShareError;
use crate::registry::FileMeta;

/// Protocol message IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    List = 0,
    Search = 1,
    Download = 2,
    FileList = 3,
    Chunk = 4,
    EndOfStream = 5,
    Error = 6,
    Challenge = 7,
    ChallengeResponse = 8,
    AuthOk = 9,
}

impl TryFrom<u8> for MessageId {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MessageId::List),
            1 => Ok(MessageId::Search),
            2 => Ok(MessageId::Download),
            3 => Ok(MessageId::FileList),
            4 => Ok(MessageId::Chunk),
            5 => Ok(MessageId::EndOfStream),
            6 => Ok(MessageId::Error),
            7 => Ok(MessageId::Challenge),
            8 => Ok(MessageId::ChallengeResponse),
            9 => Ok(MessageId::AuthOk),
            _ => {
                error!("Invalid message ID: {}", value);
                Err(ShareError::protocol_error_with_source(
                    "Invalid message ID",
                    format!("value: {}", value),
                )
                .into())
            }
        }
    }
}

/// JSON body of an error frame
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ErrorBody {
    kind: String,
    message: String,
}

/// Protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Request the full registry listing
    List,
    /// Request files whose names contain the query
    Search { query: String },
    /// Request file content starting at a byte offset
    Download { name: String, offset: u64 },
    /// Registry snapshot reply
    FileList { files: Vec<FileMeta> },
    /// One encrypted unit of file content covering `[start, end)`
    Chunk {
        start: u64,
        end: u64,
        nonce: [u8; NONCE_SIZE],
        payload: Vec<u8>,
    },
    /// Marks the end of a download stream
    EndOfStream,
    /// Error reply; the connection closes after this frame
    Error { kind: String, message: String },
    /// Server's encrypted authentication token
    Challenge {
        nonce: [u8; NONCE_SIZE],
        payload: Vec<u8>,
    },
    /// Client's re-encryption of the token under a fresh nonce
    ChallengeResponse {
        nonce: [u8; NONCE_SIZE],
        payload: Vec<u8>,
    },
    /// Authentication accepted
    AuthOk,
}

impl Message {
    /// Get the message ID
    pub fn message_id(&self) -> MessageId {
        match self {
            Message::List => MessageId::List,
            Message::Search { .. } => MessageId::Search,
            Message::Download { .. } => MessageId::Download,
            Message::FileList { .. } => MessageId::FileList,
            Message::Chunk { .. } => MessageId::Chunk,
            Message::EndOfStream => MessageId::EndOfStream,
            Message::Error { .. } => MessageId::Error,
            Message::Challenge { .. } => MessageId::Challenge,
            Message::ChallengeResponse { .. } => MessageId::ChallengeResponse,
            Message::AuthOk => MessageId::AuthOk,
        }
    }

    /// Build an error frame from a ShareError
    pub fn error_frame(err: &ShareError) -> Self {
        Message::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    /// Serialize the message body (message ID plus payload, no length prefix)
    pub fn serialize(&self) -> Result<Vec<u8>> {
        trace!("Serializing message: {:?}", self.message_id());
        let mut buf = BytesMut::new();
        buf.put_u8(self.message_id() as u8);

        match self {
            Message::List | Message::EndOfStream | Message::AuthOk => {}
            Message::Search { query } => {
                let bytes = query.as_bytes();
                buf.put_u32(bytes.len() as u32);
                buf.put_slice(bytes);
            }
            Message::Download { name, offset } => {
                let bytes = name.as_bytes();
                buf.put_u32(bytes.len() as u32);
                buf.put_slice(bytes);
                buf.put_u64(*offset);
            }
            Message::FileList { files } => {
                let json = serde_json::to_vec(files)
                    .map_err(|e| ShareError::protocol_error_with_source("Failed to encode file list", e.to_string()))?;
                buf.put_slice(&json);
            }
            Message::Chunk { start, end, nonce, payload } => {
                buf.put_u64(*start);
                buf.put_u64(*end);
                buf.put_slice(nonce);
                buf.put_slice(payload);
            }
            Message::Error { kind, message } => {
                let body = ErrorBody {
                    kind: kind.clone(),
                    message: message.clone(),
                };
                let json = serde_json::to_vec(&body)
                    .map_err(|e| ShareError::protocol_error_with_source("Failed to encode error frame", e.to_string()))?;
                buf.put_slice(&json);
            }
            Message::Challenge { nonce, payload } | Message::ChallengeResponse { nonce, payload } => {
                buf.put_slice(nonce);
                buf.put_slice(payload);
            }
        }

        Ok(buf.to_vec())
    }

    /// Deserialize a message body (message ID plus payload, no length prefix)
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            error!("Empty message data");
            return Err(ShareError::protocol_error("Empty message data").into());
        }

        let mut buf = BytesMut::from(data);
        let id = buf.get_u8();
        let message_id = MessageId::try_from(id)?;
        trace!("Deserializing {:?} message ({} bytes)", message_id, data.len());

        match message_id {
            MessageId::List => Ok(Message::List),
            MessageId::EndOfStream => Ok(Message::EndOfStream),
            MessageId::AuthOk => Ok(Message::AuthOk),
            MessageId::Search => {
                let query = read_string(&mut buf, "Search")?;
                Ok(Message::Search { query })
            }
            MessageId::Download => {
                let name = read_string(&mut buf, "Download")?;
                if buf.remaining() < 8 {
                    return Err(too_short("Download", 8, buf.remaining()));
                }
                let offset = buf.get_u64();
                Ok(Message::Download { name, offset })
            }
            MessageId::FileList => {
                let files: Vec<FileMeta> = serde_json::from_slice(&buf)
                    .map_err(|e| ShareError::protocol_error_with_source("Malformed file list", e.to_string()))?;
                Ok(Message::FileList { files })
            }
            MessageId::Chunk => {
                if buf.remaining() < 16 + NONCE_SIZE {
                    return Err(too_short("Chunk", 16 + NONCE_SIZE, buf.remaining()));
                }
                let start = buf.get_u64();
                let end = buf.get_u64();
                let mut nonce = [0u8; NONCE_SIZE];
                buf.copy_to_slice(&mut nonce);
                let payload = buf.to_vec();
                Ok(Message::Chunk { start, end, nonce, payload })
            }
            MessageId::Error => {
                let body: ErrorBody = serde_json::from_slice(&buf)
                    .map_err(|e| ShareError::protocol_error_with_source("Malformed error frame", e.to_string()))?;
                Ok(Message::Error {
                    kind: body.kind,
                    message: body.message,
                })
            }
            MessageId::Challenge | MessageId::ChallengeResponse => {
                if buf.remaining() < NONCE_SIZE {
                    return Err(too_short("Challenge", NONCE_SIZE, buf.remaining()));
                }
                let mut nonce = [0u8; NONCE_SIZE];
                buf.copy_to_slice(&mut nonce);
                let payload = buf.to_vec();
                if message_id == MessageId::Challenge {
                    Ok(Message::Challenge { nonce, payload })
                } else {
                    Ok(Message::ChallengeResponse { nonce, payload })
                }
            }
        }
    }
}

/// Read a u32-length-prefixed UTF-8 string field
fn read_string(buf: &mut BytesMut, context: &str) -> Result<String> {
    if buf.remaining() < 4 {
        return Err(too_short(context, 4, buf.remaining()));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(too_short(context, len, buf.remaining()));
    }
    let bytes = buf.split_to(len);
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ShareError::protocol_error_with_source(format!("{} string is not UTF-8", context), e.to_string()).into())
}

fn too_short(context: &str, expected: usize, got: usize) -> anyhow::Error {
    error!("{} message too short: expected {} bytes, got {}", context, expected, got);
    ShareError::protocol_error_with_source(
        format!("{} message too short", context),
        format!("expected {} bytes, got {}", expected, got),
    )
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(message: Message) -> Message {
        let serialized = message.serialize().unwrap();
        Message::deserialize(&serialized).unwrap()
    }

    #[test]
    fn test_round_trip_list() {
        assert_eq!(round_trip(Message::List), Message::List);
    }

    #[test]
    fn test_round_trip_search() {
        let message = Message::Search { query: "report".to_string() };
        assert_eq!(round_trip(message.clone()), message);
    }

    #[test]
    fn test_round_trip_search_empty_query() {
        let message = Message::Search { query: String::new() };
        assert_eq!(round_trip(message.clone()), message);
    }

    #[test]
    fn test_round_trip_download() {
        let message = Message::Download {
            name: "dir/a.txt".to_string(),
            offset: 400,
        };
        assert_eq!(round_trip(message.clone()), message);
    }

    #[test]
    fn test_round_trip_file_list() {
        let message = Message::FileList {
            files: vec![FileMeta {
                name: "a.txt".to_string(),
                size: 1000,
                checksum: "aa".repeat(32),
                modified: 1700000000,
            }],
        };
        assert_eq!(round_trip(message.clone()), message);
    }

    #[test]
    fn test_round_trip_chunk() {
        let message = Message::Chunk {
            start: 400,
            end: 1000,
            nonce: [7u8; NONCE_SIZE],
            payload: vec![1, 2, 3, 4, 5],
        };
        assert_eq!(round_trip(message.clone()), message);
    }

    #[test]
    fn test_round_trip_error() {
        let message = Message::Error {
            kind: "file_not_found".to_string(),
            message: "File not found: a.txt".to_string(),
        };
        assert_eq!(round_trip(message.clone()), message);
    }

    #[test]
    fn test_round_trip_challenge() {
        let message = Message::Challenge {
            nonce: [3u8; NONCE_SIZE],
            payload: vec![9; 32],
        };
        assert_eq!(round_trip(message.clone()), message);
        let message = Message::ChallengeResponse {
            nonce: [4u8; NONCE_SIZE],
            payload: vec![8; 32],
        };
        assert_eq!(round_trip(message.clone()), message);
    }

    #[test]
    fn test_error_frame_from_share_error() {
        let err = ShareError::file_not_found("a.txt");
        let frame = Message::error_frame(&err);
        match frame {
            Message::Error { kind, message } => {
                assert_eq!(kind, "file_not_found");
                assert!(message.contains("a.txt"));
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_deserialize_empty_fails() {
        assert!(Message::deserialize(&[]).is_err());
    }

    #[test]
    fn test_deserialize_invalid_id_fails() {
        assert!(Message::deserialize(&[200]).is_err());
    }

    #[test]
    fn test_deserialize_truncated_download_fails() {
        let serialized = Message::Download {
            name: "a.txt".to_string(),
            offset: 0,
        }
        .serialize()
        .unwrap();
        assert!(Message::deserialize(&serialized[..serialized.len() - 4]).is_err());
    }

    #[test]
    fn test_deserialize_truncated_chunk_fails() {
        // Chunk header requires start + end + nonce
        assert!(Message::deserialize(&[MessageId::Chunk as u8, 0, 0]).is_err());
    }

    #[test]
    fn test_deserialize_non_utf8_search_fails() {
        let mut data = vec![MessageId::Search as u8];
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(&[0xFF, 0xFE]);
        assert!(Message::deserialize(&data).is_err());
    }

    #[test]
    fn test_message_id_try_from() {
        assert_eq!(MessageId::try_from(0).unwrap(), MessageId::List);
        assert_eq!(MessageId::try_from(9).unwrap(), MessageId::AuthOk);
        assert!(MessageId::try_from(10).is_err());
    }
}
