//! Per-channel stream workers and the merger that combines their output
//! into a single ordered `ChannelRecord` sequence (spec.md §4.2.3).
//!
//! Internal unit contract: every [`Timestamp`](crate::models::Timestamp)
//! that crosses this module's boundary is nanoseconds. The TC's
//! picosecond-denominated `PWID`/`PPER` tokens are converted to
//! nanoseconds once, at the pipeline boundary, before being handed to the
//! merger as `period_ns`.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

use crate::models::{ChannelId, ChannelRecord, Timestamp};
use crate::supervision::CancelFlag;

/// How often the merger re-checks `cancel` while waiting on a channel
/// that has nothing buffered, so a mid-batch cancellation is noticed at
/// the next tick rather than only between batches.
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// One raw 8-byte-timestamp block read off a channel's stream socket, as
/// produced by the DLT (or, in fallback mode, assembled directly from a
/// `RAW<c>:DATA:VALue?` reply). A single `Message` may carry zero or more
/// timestamps; in practice a sub-acquisition window yields at most one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message(pub Vec<u8>);

impl Message {
    #[must_use]
    pub fn from_timestamps(timestamps: &[Timestamp]) -> Self {
        let mut buf = Vec::with_capacity(timestamps.len() * 8);
        for ts in timestamps {
            buf.extend_from_slice(&ts.to_le_bytes());
        }
        Self(buf)
    }

    /// Parse the contained 8-byte little-endian timestamps. A trailing
    /// partial block is dropped; stream framing guarantees whole blocks
    /// in practice, and this is not a path the spec asks us to harden.
    #[must_use]
    pub fn timestamps(&self) -> Vec<Timestamp> {
        self.0
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }
}

/// Reads raw 8-byte timestamp blocks from a channel's stream socket and
/// forwards each as a [`Message`] over a single-producer/single-consumer
/// channel to the merger (spec.md §5: per-channel buffers are SPSC).
pub struct StreamWorker {
    channel: ChannelId,
    tx: mpsc::Sender<Message>,
}

impl StreamWorker {
    #[must_use]
    pub fn new(channel: ChannelId, tx: mpsc::Sender<Message>) -> Self {
        Self { channel, tx }
    }

    #[must_use]
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Drain `source` 8 bytes at a time until EOF, error, or cancellation.
    /// Never panics on a read error; logs and stops, leaving whatever was
    /// already forwarded in the merger's hands.
    pub async fn run<R>(self, mut source: R, cancel: CancelFlag)
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = [0u8; 8];
        loop {
            if cancel.is_set() {
                tracing::debug!(channel = self.channel, "stream worker cancelled");
                return;
            }
            match source.read_exact(&mut buf).await {
                Ok(_) => {
                    let msg = Message(buf.to_vec());
                    if self.tx.send(msg).await.is_err() {
                        tracing::debug!(channel = self.channel, "merger gone, stopping stream worker");
                        return;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::debug!(channel = self.channel, "stream source closed");
                    return;
                }
                Err(e) => {
                    tracing::warn!(channel = self.channel, error = %e, "stream read failed");
                    return;
                }
            }
        }
    }
}

/// Consumes every live channel's `Message` stream in lockstep: batch `i`
/// is only emitted once every still-live channel has produced its `i`-th
/// message. A channel whose sender drops (stream closed) is removed from
/// the live set for subsequent batches, never re-admitted.
pub struct Merger {
    channels: Vec<(ChannelId, mpsc::Receiver<Message>)>,
    period_ns: Timestamp,
}

impl Merger {
    #[must_use]
    pub fn new(channels: Vec<(ChannelId, mpsc::Receiver<Message>)>, period_ns: Timestamp) -> Self {
        Self { channels, period_ns }
    }

    /// Run to completion: either every channel's receiver closes, or
    /// `cancel` is set. Returns the merged, batch-ordered record sequence.
    pub async fn run(mut self, cancel: &CancelFlag) -> Vec<ChannelRecord> {
        let mut output = Vec::new();
        let mut live: Vec<usize> = (0..self.channels.len()).collect();
        let mut batch_index: u64 = 0;

        while !live.is_empty() && !cancel.is_set() {
            let mut batch = Vec::new();
            let mut still_live = Vec::with_capacity(live.len());
            for idx in &live {
                let (channel, rx) = &mut self.channels[*idx];
                tokio::select! {
                    () = wait_for_cancel(cancel) => return output,
                    msg = rx.recv() => match msg {
                        Some(msg) => {
                            for ts in msg.timestamps() {
                                let corrected = ts + batch_index * self.period_ns;
                                batch.push(ChannelRecord::new(*channel, corrected));
                            }
                            still_live.push(*idx);
                        }
                        None => {
                            tracing::debug!(channel = *channel, "channel exhausted, dropping from merger");
                        }
                    },
                }
            }
            live = still_live;
            // Stable sort: ties keep arrival (channel) order, per spec.md §3.
            batch.sort_by_key(|r| r.timestamp);
            output.extend(batch);
            batch_index += 1;
        }
        output
    }
}

/// Resolves once `cancel` is set, polling at [`CANCEL_POLL`] so the
/// merger's per-channel `recv` can be raced against cancellation instead
/// of blocking past it (spec.md §5: cooperative wait loops exit at their
/// next tick).
async fn wait_for_cancel(cancel: &CancelFlag) {
    while !cancel.is_set() {
        tokio::time::sleep(CANCEL_POLL).await;
    }
}
