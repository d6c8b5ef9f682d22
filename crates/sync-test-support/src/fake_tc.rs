//! A scripted Time Controller fake: accepts SCPI tokens over a TCP
//! socket and answers deterministically, so transport-level tests can
//! exercise a real `TcLink` implementation without hardware.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::line_server::FakeLineServer;

/// Starts a fake TC that reports `PLAY` for the first `play_polls`
/// `REC:STAGe?` queries, then `STOP` forever after — enough to exercise
/// the quiescence loop deterministically. All other commands are
/// acknowledged with an empty reply.
pub async fn start(play_polls: u32) -> std::io::Result<FakeLineServer> {
    let stage_polls = Arc::new(AtomicU32::new(0));
    FakeLineServer::start(move |line| {
        if line == "REC:STAGe?" {
            let n = stage_polls.fetch_add(1, Ordering::SeqCst);
            return if n < play_polls { "PLAY".to_owned() } else { "STOP".to_owned() };
        }
        if line == "REC:NUMber?" {
            return "1".to_owned();
        }
        if line == "*IDN?" {
            return "FAKE-TC,1.0".to_owned();
        }
        String::new()
    })
    .await
}

/// Starts a fake TC serving only the fallback-collector query surface
/// (`DATA:COUNt?` / `DATA:VALue?`), with a fixed per-channel timestamp
/// list supplied by the caller.
pub async fn start_fallback(channel_values: Vec<(u32, Vec<u64>)>) -> std::io::Result<FakeLineServer> {
    FakeLineServer::start(move |line| {
        for (channel, values) in &channel_values {
            if line == tc_scpi::scpi::data_count_query(*channel) {
                return values.len().to_string();
            }
            if line == tc_scpi::scpi::data_value_query(*channel) {
                return values
                    .iter()
                    .map(std::string::ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(";");
            }
        }
        String::new()
    })
    .await
}
