//! A scripted DLT fake: answers `start-stream`/`status`/`stop`/`list`
//! commands with deterministic JSON, optionally simulating a DLT that
//! never replies to a given command (to exercise timeout paths).

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::line_server::FakeLineServer;

#[derive(Debug, Clone, Copy, Default)]
pub struct FakeDltBehavior {
    /// If set, `start-stream` never replies (the caller's request/reply
    /// round trip will time out).
    pub silent_start_stream: bool,
    /// If set, `stop` never replies.
    pub silent_stop: bool,
    /// `status` reports this acquisitions_count and inactivity (seconds)
    /// for every poll, so quiescence tests can control timing precisely.
    pub status_count: u64,
    pub status_inactivity: f64,
}

/// Starts a fake DLT. `start-stream` assigns sequential acquisition ids
/// (`acq-0`, `acq-1`, ...); `status`/`stop` always reference those ids.
pub async fn start(behavior: FakeDltBehavior) -> std::io::Result<FakeLineServer> {
    let next_id = Arc::new(AtomicU32::new(0));
    FakeLineServer::start(move |line| {
        if line.starts_with("start-stream") {
            if behavior.silent_start_stream {
                return "\u{0}".to_owned(); // never a valid JSON line; treated as a parse skip, not a reply
            }
            let id = next_id.fetch_add(1, Ordering::SeqCst);
            return format!(r#"{{"id":"acq-{id}"}}"#);
        }
        if line.starts_with("status") {
            return format!(
                r#"{{"acquisitions_count":{},"inactivity":{}}}"#,
                behavior.status_count, behavior.status_inactivity
            );
        }
        if line.starts_with("stop") {
            if behavior.silent_stop {
                return "\u{0}".to_owned();
            }
            return format!(r#"{{"status":{{"acquisitions_count":{}}}}}"#, behavior.status_count);
        }
        if line == "list" {
            return "[]".to_owned();
        }
        "{}".to_owned()
    })
    .await
}

/// Starts a fake DLT that, on `start-stream`, connects back to the
/// caller's per-channel stream socket and pushes packed little-endian
/// timestamps before closing — simulating the real DLT attaching to a
/// `TcpStreamSources`-opened listener (spec.md §4.2.2).
pub async fn start_streaming(
    behavior: FakeDltBehavior,
    channel_data: std::collections::HashMap<u32, Vec<u64>>,
) -> std::io::Result<FakeLineServer> {
    let next_id = Arc::new(AtomicU32::new(0));
    let channel_data = Arc::new(channel_data);
    FakeLineServer::start(move |line| {
        if let Some(rest) = line.strip_prefix("start-stream ") {
            if behavior.silent_start_stream {
                return "\u{0}".to_owned();
            }
            if let Some((address, channel, port)) = parse_start_stream_args(rest) {
                if let Some(values) = channel_data.get(&channel).cloned() {
                    tokio::spawn(async move {
                        if let Ok(mut stream) = tokio::net::TcpStream::connect((address.as_str(), port)).await {
                            use tokio::io::AsyncWriteExt;
                            let bytes: Vec<u8> = values.iter().flat_map(|t| t.to_le_bytes()).collect();
                            let _ = stream.write_all(&bytes).await;
                            let _ = stream.shutdown().await;
                        }
                    });
                }
            }
            let id = next_id.fetch_add(1, Ordering::SeqCst);
            return format!(r#"{{"id":"acq-{id}"}}"#);
        }
        if line.starts_with("status") {
            return format!(
                r#"{{"acquisitions_count":{},"inactivity":{}}}"#,
                behavior.status_count, behavior.status_inactivity
            );
        }
        if line.starts_with("stop") {
            if behavior.silent_stop {
                return "\u{0}".to_owned();
            }
            return format!(r#"{{"status":{{"acquisitions_count":{}}}}}"#, behavior.status_count);
        }
        if line == "list" {
            return "[]".to_owned();
        }
        "{}".to_owned()
    })
    .await
}

fn parse_start_stream_args(rest: &str) -> Option<(String, u32, u16)> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let mut address = None;
    let mut channel = None;
    let mut port = None;
    let mut i = 0;
    while i + 1 < tokens.len() {
        match tokens[i] {
            "--address" => address = Some(tokens[i + 1].to_owned()),
            "--channel" => channel = tokens[i + 1].parse().ok(),
            "--stream-port" => port = tokens[i + 1].parse().ok(),
            _ => {}
        }
        i += 2;
    }
    Some((address?, channel?, port?))
}
