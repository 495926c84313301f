//! Bus wire protocol and framing.
//!
//! Every frame is a 4-byte big-endian length prefix followed by a UTF-8 JSON
//! [`BusMessage`]:
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! Clients send `call` frames; the broker answers each with exactly one
//! `reply` or `error` frame carrying the same id, and pushes `signal` frames
//! to every connection whenever the published object set changes.

use berth_core::{BerthError, BusConfig, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// A single message on a bus connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusMessage {
    /// Method invocation on one remote object.
    Call {
        id: u64,
        path: String,
        interface: String,
        method: String,
        #[serde(default)]
        args: Value,
    },
    /// Successful response to the call with the same `id`.
    Reply { id: u64, result: Value },
    /// Named error response to the call with the same `id`.
    Error {
        id: u64,
        name: String,
        message: String,
    },
    /// Broadcast notification; not tied to any call.
    Signal {
        path: String,
        interface: String,
        member: String,
        body: Value,
    },
}

impl BusMessage {
    pub fn reply(id: u64, result: Value) -> Self {
        BusMessage::Reply { id, result }
    }

    /// Build the error frame for a failed call.
    pub fn error(id: u64, err: &BerthError) -> Self {
        BusMessage::Error {
            id,
            name: err.bus_name().to_string(),
            message: err.to_string(),
        }
    }
}

/// Read a length-prefixed frame and decode it.
///
/// Returns `None` on clean EOF (peer closed the connection).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<BusMessage>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > BusConfig::MAX_MESSAGE_SIZE {
        return Err(BerthError::Protocol {
            message: format!(
                "frame size {} exceeds maximum {}",
                len,
                BusConfig::MAX_MESSAGE_SIZE
            ),
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    let message = serde_json::from_slice(&payload).map_err(|e| BerthError::Protocol {
        message: format!("malformed frame: {e}"),
    })?;
    Ok(Some(message))
}

/// Encode and write one length-prefixed frame.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    message: &BusMessage,
) -> Result<()> {
    let payload = serde_json::to_vec(message)?;
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}
