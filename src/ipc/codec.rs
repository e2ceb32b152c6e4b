//! Frame codec for the module RPC wire protocol.
//!
//! Frame format:
//! ```text
//! ┌──────────┬──────────┬────────────────────────┐
//! │ len (4B) │ type(1B) │   msgpack payload      │
//! │ u32 BE   │ u8       │                        │
//! └──────────┴──────────┴────────────────────────┘
//! ```
//! Length = sizeof(type byte) + sizeof(payload), NOT including the 4-byte prefix.
//!
//! The same framing is used in both directions: the orchestrator calling the
//! module server, and the network context calling the orchestrator API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::types::{Error, Result};

/// Message type: request from client.
pub const MSG_REQUEST: u8 = 0x01;
/// Message type: response to client.
pub const MSG_RESPONSE: u8 = 0x02;
/// Message type: error response to client.
pub const MSG_ERROR: u8 = 0xFF;

/// Request envelope carried in a `MSG_REQUEST` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub method: String,
    #[serde(default = "empty_object")]
    pub body: Value,
}

/// Payload of a `MSG_RESPONSE` or `MSG_ERROR` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    #[serde(default)]
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Error detail inside a failed [`ResponseFrame`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ResponseFrame {
    pub fn success(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            ok: true,
            body: Some(body),
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: false,
            body: None,
            error: Some(ErrorBody {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    pub fn from_error(id: impl Into<String>, err: &Error) -> Self {
        Self::failure(id, err.to_ipc_error_code(), err.to_string())
    }

    /// Frame type this payload is written with.
    pub fn msg_type(&self) -> u8 {
        if self.ok {
            MSG_RESPONSE
        } else {
            MSG_ERROR
        }
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Encode a payload to msgpack with named fields.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(value).map_err(|e| {
        tracing::error!("Msgpack encoding failed: {}", e);
        Error::from(e)
    })
}

/// Decode a msgpack payload.
pub fn decode<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> Result<T> {
    Ok(rmp_serde::from_slice(payload)?)
}

/// Read one frame from the stream.
///
/// Returns `(msg_type, payload_bytes)`. Returns `None` on clean EOF.
/// `max_frame_bytes` caps the maximum accepted payload size.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    max_frame_bytes: u32,
) -> std::io::Result<Option<(u8, Vec<u8>)>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let frame_len = u32::from_be_bytes(len_buf);
    if frame_len > max_frame_bytes {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Frame too large: {} bytes", frame_len),
        ));
    }
    if frame_len < 1 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Frame too short: missing type byte",
        ));
    }

    let mut frame_data = vec![0u8; frame_len as usize];
    reader.read_exact(&mut frame_data).await?;

    let msg_type = frame_data[0];
    frame_data.remove(0);

    Ok(Some((msg_type, frame_data)))
}

/// Write one frame to the stream.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg_type: u8,
    payload: &[u8],
) -> std::io::Result<()> {
    let frame_len = u32::try_from(payload.len() + 1).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "payload exceeds u32 frame length")
    })?;
    writer.write_all(&frame_len.to_be_bytes()).await?;
    writer.write_all(&[msg_type]).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn frame_layout_is_length_type_payload() {
        let mut buf = Vec::new();
        write_frame(&mut buf, MSG_RESPONSE, b"abc").await.unwrap();
        assert_eq!(buf, vec![0, 0, 0, 4, MSG_RESPONSE, b'a', b'b', b'c']);

        let mut cursor = Cursor::new(buf);
        let (msg_type, payload) = read_frame(&mut cursor, 1024).await.unwrap().unwrap();
        assert_eq!(msg_type, MSG_RESPONSE);
        assert_eq!(payload, b"abc");
        assert!(read_frame(&mut cursor, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let mut cursor = Cursor::new(vec![0, 0, 1, 0, MSG_REQUEST]);
        let err = read_frame(&mut cursor, 16).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn zero_length_frame_is_rejected() {
        let mut cursor = Cursor::new(vec![0, 0, 0, 0]);
        let err = read_frame(&mut cursor, 16).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn request_defaults_missing_fields() {
        let raw = encode(&serde_json::json!({"service": "ModuleService"})).unwrap();
        let request: RequestFrame = decode(&raw).unwrap();
        assert_eq!(request.id, "");
        assert_eq!(request.method, "");
        assert_eq!(request.body, serde_json::json!({}));
    }

    #[test]
    fn failure_frame_uses_error_type() {
        let frame = ResponseFrame::from_error("r1", &Error::not_found("nope"));
        assert_eq!(frame.msg_type(), MSG_ERROR);
        let error = frame.error.unwrap();
        assert_eq!(error.code, "NOT_FOUND");
        assert!(error.message.contains("nope"));
    }
}
