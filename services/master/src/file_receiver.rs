//! File-receiver policy (Master side): accept up to three file payloads
//! after the local acquisition completes, classifying each by size and
//! stopping after three messages or a 20 s wall-clock budget (spec.md
//! §4.4).

use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::transport::FileLink;

/// `< 100 KiB` is the Slave's partial sample; anything at or above this
/// is a full or textual dataset (spec.md §4.4's file-receiver policy —
/// the receiver itself does not distinguish full from text).
const PARTIAL_SIZE_CEILING: usize = 100 * 1024;
const MAX_MESSAGES: usize = 3;
const WALL_CLOCK_BUDGET: Duration = Duration::from_secs(20);
const PER_RECV_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Partial,
    Data,
}

pub struct ReceivedFile {
    pub kind: FileKind,
    pub bytes: Vec<u8>,
}

/// Drain up to three files from the file link, classifying each by
/// size. Per-recv timeouts continue the loop rather than terminating it
/// (spec.md §4.4: "timeouts do NOT terminate the receiver"); only the
/// message count and the wall-clock budget end it early.
///
/// `first_partial` is fired the instant the first [`FileKind::Partial`]
/// file lands, independent of whether the remaining full/text files show
/// up later: the caller needs the partial alone to run sync analysis and
/// must not wait on this whole loop's wall-clock budget to get it.
pub async fn receive(
    link: &mut FileLink,
    mut first_partial: Option<oneshot::Sender<()>>,
) -> Vec<ReceivedFile> {
    let mut received = Vec::new();
    let started = Instant::now();
    while received.len() < MAX_MESSAGES && started.elapsed() < WALL_CLOCK_BUDGET {
        match link.recv_timeout(PER_RECV_TIMEOUT).await {
            Ok(Some(bytes)) => {
                let kind = if bytes.len() < PARTIAL_SIZE_CEILING {
                    FileKind::Partial
                } else {
                    FileKind::Data
                };
                tracing::info!(kind = ?kind, bytes = bytes.len(), "received file");
                if kind == FileKind::Partial {
                    if let Some(tx) = first_partial.take() {
                        let _ = tx.send(());
                    }
                }
                received.push(ReceivedFile { kind, bytes });
            }
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "file link read error, ending receive loop");
                break;
            }
        }
    }
    received
}
