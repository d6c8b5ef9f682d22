//! The co-located DataLinkTargetService (DLT) command protocol.
//!
//! Requests are short CLI-style command strings (spec §6); replies are
//! JSON documents. `error.description` on any reply is mapped to a
//! [`DltError::Device`].

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Request builders
// ---------------------------------------------------------------------------

#[must_use]
pub fn list_command() -> String {
    "list".to_owned()
}

#[must_use]
pub fn start_stream_command(address: &str, channel: u32, stream_port: u16) -> String {
    format!("start-stream --address {address} --channel {channel} --stream-port {stream_port}")
}

#[must_use]
pub fn status_command(acquisition_id: &str) -> String {
    format!("status --id {acquisition_id}")
}

#[must_use]
pub fn stop_command(acquisition_id: &str) -> String {
    format!("stop --id {acquisition_id}")
}

// ---------------------------------------------------------------------------
// Reply shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDescription {
    pub description: String,
}

/// Any DLT reply may carry an `error` field; every concrete reply type
/// embeds it so [`raise_if_error`] can check without re-parsing.
#[derive(Debug, Clone, Deserialize)]
pub struct StartStreamReply {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub error: Option<ErrorDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusReply {
    #[serde(default)]
    pub acquisitions_count: u64,
    #[serde(default)]
    pub inactivity: f64,
    #[serde(default)]
    pub errors: Option<u64>,
    #[serde(default)]
    pub error: Option<ErrorDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopStatus {
    #[serde(default)]
    pub acquisitions_count: u64,
    #[serde(default)]
    pub errors: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopReply {
    #[serde(default)]
    pub status: Option<StopStatus>,
    #[serde(default)]
    pub error: Option<ErrorDescription>,
}

/// `list` replies with a bare JSON array of acquisition IDs on success, or
/// `{"error": {...}}` on failure (spec §6).
#[derive(Debug, Clone)]
pub struct ListReply {
    pub acquisitions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ListErrorEnvelope {
    error: Option<ErrorDescription>,
}

#[derive(Debug, thiserror::Error)]
pub enum DltError {
    #[error("DLT command timed out: {0}")]
    Timeout(String),
    #[error("DLT reported an error: {0}")]
    Device(String),
    #[error("I/O error talking to DLT: {0}")]
    Io(String),
    #[error("malformed DLT reply: {0}")]
    Json(String),
}

/// Parse a `start-stream` reply, escalating any `error.description` to
/// [`DltError::Device`].
pub fn parse_start_stream(raw: &str) -> Result<StartStreamReply, DltError> {
    let reply: StartStreamReply =
        serde_json::from_str(raw).map_err(|e| DltError::Json(e.to_string()))?;
    if let Some(err) = &reply.error {
        return Err(DltError::Device(err.description.clone()));
    }
    Ok(reply)
}

pub fn parse_status(raw: &str) -> Result<StatusReply, DltError> {
    let reply: StatusReply = serde_json::from_str(raw).map_err(|e| DltError::Json(e.to_string()))?;
    if let Some(err) = &reply.error {
        return Err(DltError::Device(err.description.clone()));
    }
    Ok(reply)
}

/// Parse a `stop` reply. Unlike the other calls, `stop` failures during
/// cleanup are not escalated here — callers in the cleanup path use
/// `sync_core::supervision::best_effort` to ignore them (spec §4.6).
pub fn parse_stop(raw: &str) -> Result<StopReply, DltError> {
    serde_json::from_str(raw).map_err(|e| DltError::Json(e.to_string()))
}

pub fn parse_list(raw: &str) -> Result<ListReply, DltError> {
    if let Ok(ids) = serde_json::from_str::<Vec<String>>(raw) {
        return Ok(ListReply { acquisitions: ids });
    }
    let envelope: ListErrorEnvelope =
        serde_json::from_str(raw).map_err(|e| DltError::Json(e.to_string()))?;
    if let Some(err) = envelope.error {
        return Err(DltError::Device(err.description));
    }
    Ok(ListReply {
        acquisitions: Vec::new(),
    })
}
