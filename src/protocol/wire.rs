//! Wire framing utilities
//!
//! Every message travels as a length-prefixed frame: a 4-byte big-endian
//! length followed by the serialized message body.

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::trace;

use crate::error::ShareError;
use crate::protocol::message::Message;

/// Upper bound on a single frame; comfortably fits one encrypted chunk
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Read one frame body from the stream
///
/// Returns `None` on a clean end-of-stream (the peer closed between
/// frames); a close mid-frame is an error.
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut length_buf = [0u8; 4];
    match reader.read_exact(&mut length_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => {
            return Err(ShareError::connection_error_full("Failed to read frame length", "peer", e.to_string()).into())
        }
    }

    let length = u32::from_be_bytes(length_buf) as usize;
    if length == 0 {
        return Err(ShareError::protocol_error("Zero-length frame").into());
    }
    if length > MAX_FRAME_SIZE {
        return Err(ShareError::protocol_error_with_source(
            "Frame exceeds maximum size",
            format!("length: {}", length),
        )
        .into());
    }

    let mut payload = vec![0u8; length];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| ShareError::connection_error_full("Failed to read frame body", "peer", e.to_string()))?;

    trace!("Read frame: {} bytes", length);
    Ok(Some(payload))
}

/// Read one message from the stream (`None` on clean end-of-stream)
pub async fn read_message<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Message>> {
    match read_frame(reader).await? {
        Some(payload) => Ok(Some(Message::deserialize(&payload)?)),
        None => Ok(None),
    }
}

/// Read one message, treating end-of-stream as a connection error
pub async fn expect_message<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Message> {
    read_message(reader)
        .await?
        .ok_or_else(|| ShareError::connection_error("Connection closed by peer").into())
}

/// Write one message to the stream as a length-prefixed frame
pub async fn write_message<W: AsyncWriteExt + Unpin>(writer: &mut W, message: &Message) -> Result<()> {
    let body = message.serialize()?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(ShareError::protocol_error_with_source(
            "Frame exceeds maximum size",
            format!("length: {}", body.len()),
        )
        .into());
    }

    writer
        .write_all(&(body.len() as u32).to_be_bytes())
        .await
        .map_err(|e| ShareError::connection_error_full("Failed to write frame length", "peer", e.to_string()))?;
    writer
        .write_all(&body)
        .await
        .map_err(|e| ShareError::connection_error_full("Failed to write frame body", "peer", e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| ShareError::connection_error_full("Failed to flush frame", "peer", e.to_string()))?;

    trace!("Wrote {:?} frame: {} bytes", message.message_id(), body.len());
    Ok(())
}
