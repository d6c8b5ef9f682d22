//! Peer wire envelopes and length-delimited framing.
//!
//! All peer-to-peer messages use a top-level `type` field for discriminated
//! deserialization (spec §6). Every envelope additionally carries a
//! monotonically increasing `sequence`; receivers must tolerate and log
//! unknown `type` values rather than terminating (spec §4.1).

use std::sync::atomic::{AtomicU32, Ordering};

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

// ---------------------------------------------------------------------------
// Envelope payloads
// ---------------------------------------------------------------------------

/// Broadcast on the trigger link (Master → Slave), spec §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEnvelope {
    pub sequence: u32,
    pub timestamp: u64,
    pub duration: f64,
    pub channels: Vec<u32>,
}

/// Pushed on the sync link (Slave → Master) once the trigger is decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaveTriggerEnvelope {
    pub sequence: u32,
    pub timestamp: u64,
}

/// A "ready" notification on the sync link, acknowledging a
/// `request_ready` RPC (spec §4.4.1). Carries no payload beyond sequencing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyEnvelope {
    pub sequence: u32,
    pub timestamp: u64,
}

/// A named RPC on the command link (Master → Slave), spec §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub sequence: u32,
}

/// The reply to a [`CommandEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub command: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub sequence: u32,
}

/// Heartbeat/status push (Slave → Master), spec §6. The same shape backs
/// both the `status` and `heartbeat` wire types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEnvelope {
    pub state: String,
    pub progress: f64,
    pub trigger_timestamp: u64,
    pub sequence: u32,
}

/// Frozen command names for the command link (spec §4.4).
pub mod commands {
    pub const REQUEST_READY: &str = "request_ready";
    pub const REQUEST_PARTIAL: &str = "request_partial";
    pub const REQUEST_FULL: &str = "request_full";
    pub const REQUEST_TEXT: &str = "request_text";
    pub const STATUS: &str = "status";
    pub const STOP: &str = "stop";
}

// ---------------------------------------------------------------------------
// Top-level discriminated union
// ---------------------------------------------------------------------------

/// All peer message kinds, tagged by `type` (spec §6).
///
/// ```json
/// { "type": "trigger", ... }
/// ```
///
/// Unrecognized `type` values deserialize into [`PeerMessage::Unknown`]
/// instead of failing, per spec §4.1's tolerance requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum PeerMessage {
    Trigger(TriggerEnvelope),
    SlaveTrigger(SlaveTriggerEnvelope),
    Ready(ReadyEnvelope),
    Command(CommandEnvelope),
    Response(ResponseEnvelope),
    Status(StatusEnvelope),
    Heartbeat(StatusEnvelope),
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// Sequence numbers
// ---------------------------------------------------------------------------

/// A monotonically increasing per-socket sequence counter.
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU32);

impl SequenceCounter {
    #[must_use]
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Return the next sequence number, starting at 1.
    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

// ---------------------------------------------------------------------------
// Length-delimited framing
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed")]
    Closed,
}

/// Serialize `msg` to JSON and write it as one length-delimited frame.
pub async fn send_message<W>(
    framed: &mut FramedWrite<W, LengthDelimitedCodec>,
    msg: &PeerMessage,
) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    use futures_util::SinkExt;
    let json = serde_json::to_vec(msg).expect("PeerMessage always serializes");
    framed.send(Bytes::from(json)).await?;
    Ok(())
}

/// Read the next length-delimited frame and parse it as a [`PeerMessage`].
///
/// Malformed JSON is logged and skipped (ParseError, spec §7) rather than
/// propagated — the loop advances to the next frame. Returns `Ok(None)` on
/// a clean stream close.
pub async fn recv_message<R>(
    framed: &mut FramedRead<R, LengthDelimitedCodec>,
) -> Result<Option<PeerMessage>, WireError>
where
    R: AsyncRead + Unpin,
{
    use futures_util::StreamExt;
    loop {
        let Some(frame) = framed.next().await else {
            return Ok(None);
        };
        let frame: BytesMut = frame?;
        match serde_json::from_slice::<PeerMessage>(&frame) {
            Ok(msg) => return Ok(Some(msg)),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed peer envelope");
                continue;
            }
        }
    }
}
