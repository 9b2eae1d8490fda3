//! Relay wire protocol
//!
//! Requests and replies exchanged between clients, orchestrators and leaf
//! nodes. Every message is MessagePack (rmp-serde) encoded.
//!
//! # Protocol Version
//!
//! Current version: 1
//!
//! Requests carry the sender's protocol version; a node answers a mismatched
//! version with `Error` and keeps the connection open.
//!
//! # Message Flow
//!
//! ```text
//! Client / Orchestrator            Node
//!     |                              |
//!     |-------- CALL(params) ------->|
//!     |<------- REPLY(outcome) ------|
//!     |                              |
//!     |-------- GET_REPORT --------->|
//!     |<------- REPORT --------------|
//!     |                              |
//!     |-------- ADD_CLIENT_KEY ----->|
//!     |<------- REPLY(status) -------|
//! ```
//!
//! # Message Framing
//!
//! Each message is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! [4 bytes: message length][N bytes: MessagePack-serialized message]
//! ```

use crate::backend::{AttestationReport, ClientKey};
use crate::error::{DispatchError, STATUS_FAILED, STATUS_OK};
use crate::operation::{Outcome, Params};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Increment this when making breaking changes to the protocol.
pub const PROTOCOL_VERSION: u32 = 1;

/// Upper bound on a single frame
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Barriered operation call (Client → Node)
    Call(CallMessage),

    /// Attestation report request, never barriered (Client → Node)
    GetReport(ReportRequest),

    /// Client key provisioning (Client → Node)
    AddClientKey(AddClientKeyMessage),

    /// Operation or key provisioning reply (Node → Client)
    Reply(ReplyMessage),

    /// Attestation report reply (Node → Client)
    Report(ReportMessage),

    /// Request rejected before dispatch (Node → Client)
    ///
    /// Sent for undecodable frames, unexpected message types and protocol
    /// version mismatches.
    Error(ErrorMessage),
}

impl Message {
    /// Protocol version of a request, `None` for replies
    pub fn protocol_version(&self) -> Option<u32> {
        match self {
            Message::Call(m) => Some(m.protocol_version),
            Message::GetReport(m) => Some(m.protocol_version),
            Message::AddClientKey(m) => Some(m.protocol_version),
            Message::Reply(_) | Message::Report(_) | Message::Error(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Message::Call(_) => "CALL",
            Message::GetReport(_) => "GET_REPORT",
            Message::AddClientKey(_) => "ADD_CLIENT_KEY",
            Message::Reply(_) => "REPLY",
            Message::Report(_) => "REPORT",
            Message::Error(_) => "ERROR",
        }
    }
}

/// Call message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMessage {
    /// Protocol version (must match)
    pub protocol_version: u32,

    /// Participant identity of the caller
    pub caller: String,

    /// Operation and its parameters
    pub params: Params,
}

impl CallMessage {
    pub fn new(caller: impl Into<String>, params: Params) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            caller: caller.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub protocol_version: u32,
}

impl Default for ReportRequest {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddClientKeyMessage {
    pub protocol_version: u32,
    pub key: ClientKey,
}

impl AddClientKeyMessage {
    pub fn new(key: ClientKey) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            key,
        }
    }
}

/// Reply message
///
/// `status` is 0 with an `outcome` on success, -1 with an `error` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyMessage {
    pub status: i32,

    #[serde(default)]
    pub outcome: Option<Outcome>,

    #[serde(default)]
    pub error: Option<String>,
}

impl ReplyMessage {
    pub fn success(outcome: Outcome) -> Self {
        Self {
            status: STATUS_OK,
            outcome: Some(outcome),
            error: None,
        }
    }

    pub fn failure(error: &DispatchError) -> Self {
        Self {
            status: STATUS_FAILED,
            outcome: None,
            error: Some(error.to_string()),
        }
    }

    /// Split into the outcome or the remote error text
    pub fn into_result(self) -> std::result::Result<Outcome, String> {
        match (self.status, self.outcome) {
            (STATUS_OK, Some(outcome)) => Ok(outcome),
            (STATUS_OK, None) => Err("success reply without a payload".to_string()),
            (status, _) => Err(self
                .error
                .unwrap_or_else(|| format!("remote status {}", status))),
        }
    }
}

/// Attestation report reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMessage {
    pub status: i32,

    #[serde(default)]
    pub report: Option<AttestationReport>,

    #[serde(default)]
    pub error: Option<String>,
}

impl ReportMessage {
    pub fn success(report: AttestationReport) -> Self {
        Self {
            status: STATUS_OK,
            report: Some(report),
            error: None,
        }
    }

    pub fn failure(error: &DispatchError) -> Self {
        Self {
            status: STATUS_FAILED,
            report: None,
            error: Some(error.to_string()),
        }
    }
}

/// Error message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error description
    pub error: String,
}

impl ErrorMessage {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

/// Serialize a message to bytes
///
/// Prepends a 4-byte length field for framing.
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>> {
    let msg_bytes = rmp_serde::to_vec(msg).context("Failed to serialize message")?;

    if msg_bytes.len() > MAX_MESSAGE_SIZE {
        anyhow::bail!("Message too large: {} bytes (max 100MB)", msg_bytes.len());
    }

    let msg_len = msg_bytes.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg_bytes.len());
    framed.extend_from_slice(&msg_len.to_le_bytes());
    framed.extend_from_slice(&msg_bytes);

    Ok(framed)
}

/// Read one length-prefixed frame
///
/// Returns `None` on a clean end of stream before the length field.
pub async fn read_frame<R>(stream: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("Failed to read message length"),
    }

    let msg_len = u32::from_le_bytes(len_buf) as usize;

    // Sanity check: reject messages > 100MB
    if msg_len > MAX_MESSAGE_SIZE {
        anyhow::bail!("Message too large: {} bytes (max 100MB)", msg_len);
    }

    let mut msg_buf = vec![0u8; msg_len];
    stream
        .read_exact(&mut msg_buf)
        .await
        .context("Failed to read message body")?;

    Ok(Some(msg_buf))
}

/// Decode the body of a frame read by [`read_frame`]
pub fn decode_message(body: &[u8]) -> Result<Message> {
    rmp_serde::from_slice(body).context("Failed to deserialize message")
}

/// Read a complete message from a stream
pub async fn read_message<R>(stream: &mut R) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let body = read_frame(stream)
        .await?
        .context("Connection closed before message")?;
    decode_message(&body)
}

/// Write a message to a stream
///
/// Serializes the message with length prefix, writes and flushes it.
pub async fn write_message<W>(stream: &mut W, msg: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let framed = serialize_message(msg)?;

    stream.write_all(&framed).await.context("Failed to write message")?;

    stream.flush().await.context("Failed to flush stream")?;

    Ok(())
}
