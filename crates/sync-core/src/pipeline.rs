//! The per-host acquisition pipeline (C2): configure the TC, open one
//! stream per active channel, merge them, and stop cleanly
//! (spec.md §4.2).

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::time::Instant;

use tc_scpi::{dlt, scpi};

use crate::fallback;
use crate::models::{AcquisitionId, ChannelId, ChannelRecord};
use crate::supervision::{self, CancelFlag, JOIN_DEADLINE};
use crate::workers::{Merger, StreamWorker};

/// Local state machine driving one session (spec.md §4.2): `Idle →
/// Configuring → Streaming → Stopping → Quiescing → Done`, with `Error`
/// reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Configuring,
    Streaming,
    Stopping,
    Quiescing,
    Done,
    Error,
}

/// A request/reply round trip with the host's Time Controller.
pub trait TcLink: Send {
    async fn send(&mut self, command: &str) -> Result<String, scpi::TcError>;
}

/// A request/reply round trip with the co-located DLT.
pub trait DltLink: Send {
    async fn send(&mut self, command: &str) -> Result<String, dlt::DltError>;
}

/// Opens the per-channel socket the DLT's `start-stream` endpoint
/// attaches to. The real implementation binds a TCP listener per
/// channel; tests substitute an in-memory duplex.
pub trait StreamSourceFactory {
    type Source: AsyncRead + Unpin + Send + 'static;
    async fn open(&mut self, channel: ChannelId) -> std::io::Result<Self::Source>;
}

/// How long the accept/start-stream pair may run before a stalled DLT
/// counts as a start-stream failure and the channel falls back.
const STREAM_ATTACH_TIMEOUT: Duration = Duration::from_secs(6);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub channels: Vec<ChannelId>,
    pub duration: Duration,
    pub width: scpi::Picoseconds,
    pub base_port: u16,
    pub dlt_address: String,
}

pub struct PipelineOutput {
    pub records: Vec<ChannelRecord>,
    pub used_fallback: bool,
    pub warnings: Vec<String>,
    pub final_state: PipelineState,
}

/// Run one full session. Never panics on a TC/DLT error: every failure
/// is recorded in `warnings` and either escalates to fallback (DLT
/// `start-stream` failures, spec.md §4.3) or, for a Configure failure,
/// ends the session early with an empty record set.
pub async fn run<T, D, F>(
    tc: &mut T,
    dlt: &mut D,
    sources: &mut F,
    config: &PipelineConfig,
    cancel: &CancelFlag,
    progress_tx: Option<mpsc::Sender<f64>>,
) -> PipelineOutput
where
    T: TcLink,
    D: DltLink,
    F: StreamSourceFactory,
{
    let mut warnings = Vec::new();

    if config.channels.is_empty() {
        warnings.push("empty channel set rejected before configure".to_owned());
        return PipelineOutput {
            records: Vec::new(),
            used_fallback: false,
            warnings,
            final_state: PipelineState::Error,
        };
    }

    let period = scpi::period_for_width(config.width);
    let period_ns = period.0 / 1_000;

    // 1. Configure.
    for &channel in &config.channels {
        let _ = tc.send(&scpi::ref_link_none(channel)).await;
        let _ = tc.send(&scpi::errors_clear(channel)).await;
    }
    if let Err(e) = tc.send(scpi::trig_arm_mode_manual()).await {
        warnings.push(format!("configure: arm mode failed: {e}"));
        return PipelineOutput { records: Vec::new(), used_fallback: false, warnings, final_state: PipelineState::Error };
    }
    let _ = tc.send(&scpi::rec_enable(true)).await;
    let _ = tc.send(scpi::rec_stop()).await;
    let _ = tc.send(scpi::rec_num_inf()).await;
    if let Err(e) = tc.send(&scpi::rec_pwid_pper(config.width, period)).await {
        warnings.push(format!("configure: pwid/pper failed: {e}"));
        return PipelineOutput { records: Vec::new(), used_fallback: false, warnings, final_state: PipelineState::Error };
    }
    for &channel in &config.channels {
        let _ = tc.send(&scpi::send_enable(channel, true)).await;
    }

    // 2. Open streams; request DLT start-stream per channel.
    let mut acquisition_ids: HashMap<ChannelId, AcquisitionId> = HashMap::new();
    let mut merger_inputs = Vec::new();
    let mut worker_handles: Vec<(ChannelId, tokio::task::JoinHandle<()>)> = Vec::new();
    let mut used_fallback = false;

    for &channel in &config.channels {
        let port = config.base_port + u16::try_from(channel).unwrap_or(u16::MAX);
        let start_cmd = dlt::start_stream_command(&config.dlt_address, channel, port);

        // The per-channel listener only accepts once the DLT has parsed
        // this start-stream command and connected back to it, so the
        // accept and the command's round trip must run concurrently,
        // not one after the other. Bound the pair by the same window a
        // stalled DLT would otherwise hang the accept past forever.
        let joined = tokio::time::timeout(STREAM_ATTACH_TIMEOUT, async {
            tokio::join!(sources.open(channel), dlt.send(&start_cmd))
        })
        .await;
        let (open_result, dlt_result) = match joined {
            Ok(pair) => pair,
            Err(_) => {
                warnings.push(format!("channel {channel}: DLT never attached to the stream socket"));
                used_fallback = true;
                continue;
            }
        };

        let source = match open_result {
            Ok(s) => s,
            Err(e) => {
                warnings.push(format!("channel {channel}: could not open stream socket: {e}"));
                used_fallback = true;
                continue;
            }
        };
        match dlt_result {
            Ok(raw) => match dlt::parse_start_stream(&raw) {
                Ok(reply) if reply.id.is_some() => {
                    acquisition_ids.insert(channel, reply.id.unwrap());
                    let (tx, rx) = mpsc::channel(256);
                    merger_inputs.push((channel, rx));
                    let handle = tokio::spawn(StreamWorker::new(channel, tx).run(source, cancel.clone()));
                    worker_handles.push((channel, handle));
                }
                Ok(_) => {
                    warnings.push(format!("channel {channel}: DLT start-stream returned no id"));
                    used_fallback = true;
                }
                Err(e) => {
                    warnings.push(format!("channel {channel}: DLT start-stream error: {e}"));
                    used_fallback = true;
                }
            },
            Err(e) => {
                warnings.push(format!("channel {channel}: DLT start-stream timed out: {e}"));
                used_fallback = true;
            }
        }
    }

    if used_fallback {
        warnings.push("falling back to direct SCPI collection".to_owned());
        let records = fallback::collect(tc, &config.channels).await;
        return PipelineOutput { records, used_fallback: true, warnings, final_state: PipelineState::Done };
    }

    // 3. Start merger.
    let merger = Merger::new(merger_inputs, period_ns);
    let merger_cancel = cancel.clone();
    let merger_handle = tokio::spawn(async move { merger.run(&merger_cancel).await });

    // 4. Start recording.
    if let Err(e) = tc.send(scpi::rec_play()).await {
        warnings.push(format!("REC:PLAY failed: {e}"));
    }

    // 5. Wait duration in 100 ms slices, honouring cancel, reporting progress 0..100.
    let slice = Duration::from_millis(100);
    let started = Instant::now();
    loop {
        if cancel.is_set() {
            break;
        }
        let elapsed = started.elapsed();
        if elapsed >= config.duration {
            break;
        }
        if let Some(tx) = &progress_tx {
            let pct = (elapsed.as_secs_f64() / config.duration.as_secs_f64() * 100.0).min(100.0);
            let _ = tx.try_send(pct);
        }
        tokio::time::sleep(slice.min(config.duration.saturating_sub(elapsed))).await;
    }
    if !cancel.is_set() {
        if let Some(tx) = &progress_tx {
            let _ = tx.try_send(100.0);
        }
    }

    // 6. Stop recording, then DLT stop per channel (best-effort).
    let _ = tc.send(scpi::rec_stop()).await;
    for id in acquisition_ids.values() {
        match dlt.send(&dlt::stop_command(id)).await {
            Ok(raw) => {
                if let Err(e) = dlt::parse_stop(&raw) {
                    warnings.push(format!("DLT stop warning for {id}: {e}"));
                }
            }
            Err(e) => warnings.push(format!("DLT stop timed out for {id}: {e}")),
        }
    }
    close_active_acquisitions(dlt, acquisition_ids.values()).await;

    // 7. Quiescence wait.
    warnings.extend(quiesce(tc, dlt, &acquisition_ids, cancel).await);

    // 8. Turn SEND off per channel, join each stream client, then the merger.
    for &channel in &config.channels {
        let _ = tc.send(&scpi::send_enable(channel, false)).await;
    }
    for (channel, handle) in worker_handles {
        supervision::bounded_join(handle, JOIN_DEADLINE, &format!("stream-worker-{channel}")).await;
    }
    let records = supervision::bounded_join(merger_handle, JOIN_DEADLINE, "merger")
        .await
        .unwrap_or_default();

    PipelineOutput { records, used_fallback: false, warnings, final_state: PipelineState::Done }
}

/// List the DLT's still-active acquisitions and stop whatever this
/// session didn't already stop above, ignoring every error (spec.md
/// §4.6's `close_active_acquisitions`: a leftover from a prior session
/// or a channel that never made it into `acquisition_ids` must not be
/// left running).
async fn close_active_acquisitions<D: DltLink>(
    dlt: &mut D,
    already_stopped: impl Iterator<Item = impl AsRef<str>>,
) {
    let already_stopped: std::collections::HashSet<String> =
        already_stopped.map(|id| id.as_ref().to_owned()).collect();

    let listed = match dlt.send(&dlt::list_command()).await {
        Ok(raw) => dlt::parse_list(&raw),
        Err(e) => Err(e),
    };
    let Ok(reply) = listed else {
        return;
    };
    for id in &reply.acquisitions {
        if already_stopped.contains(id) {
            continue;
        }
        supervision::best_effort(&format!("close leftover acquisition {id}"), || async {
            dlt.send(&dlt::stop_command(id)).await.map(|_| ())
        })
        .await;
    }
}

/// Poll DLT `status` at 1 Hz until every channel is quiescent or a hard
/// cap fires (spec.md §4.2.7). Since Configure always sets `REC:NUM
/// INF`, only the infinite-run condition (current max count, inactivity
/// past `NATURAL_INACTIVITY`) applies here.
async fn quiesce<T, D>(
    tc: &mut T,
    dlt: &mut D,
    acquisition_ids: &HashMap<ChannelId, AcquisitionId>,
    cancel: &CancelFlag,
) -> Vec<String>
where
    T: TcLink,
    D: DltLink,
{
    let mut warnings = Vec::new();
    if acquisition_ids.is_empty() {
        return warnings;
    }
    let iterations = scpi::max_iterations(scpi::MAX_TOTAL_TIMEOUT, scpi::QUIESCENCE_POLL);

    for _ in 0..iterations {
        if cancel.is_set() {
            return warnings;
        }

        let stage = match tc.send(scpi::rec_stage_query()).await {
            Ok(raw) => scpi::parse_rec_stage(&raw),
            Err(_) => scpi::RecStage::Stopped,
        };

        let mut counts = HashMap::new();
        let mut quiescent = HashMap::new();
        for (channel, id) in acquisition_ids {
            match dlt.send(&dlt::status_command(id)).await {
                Ok(raw) => match dlt::parse_status(&raw) {
                    Ok(status) => {
                        counts.insert(*channel, status.acquisitions_count);
                        quiescent.insert(*channel, status.inactivity >= scpi::NATURAL_INACTIVITY.as_secs_f64());
                    }
                    Err(_) => {
                        quiescent.insert(*channel, true);
                    }
                },
                Err(e) => {
                    warnings.push(format!("status poll timed out for {id}: {e}"));
                    quiescent.insert(*channel, true);
                }
            }
        }
        let max_count = counts.values().copied().max().unwrap_or(0);
        let all_done = stage != scpi::RecStage::Playing
            && acquisition_ids.keys().all(|c| {
                let at_max = counts.get(c).copied().unwrap_or(0) >= max_count;
                at_max && *quiescent.get(c).unwrap_or(&true)
            });
        if all_done {
            return warnings;
        }
        tokio::time::sleep(scpi::QUIESCENCE_POLL).await;
    }
    warnings.push("quiescence wait hit the hard cap".to_owned());
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncWriteExt;
    use tokio::sync::Mutex as AsyncMutex;

    /// A TC fake that answers every command with a fixed reply, tracking
    /// how many `REC:STAGe?` polls it has served so a test can make the
    /// session go quiescent after a couple of iterations.
    struct FakeTc {
        stage_polls: Arc<AtomicUsize>,
    }

    impl TcLink for FakeTc {
        async fn send(&mut self, command: &str) -> Result<String, scpi::TcError> {
            if command == scpi::rec_stage_query() {
                let n = self.stage_polls.fetch_add(1, Ordering::SeqCst);
                return Ok(if n == 0 { "PLAY".to_owned() } else { "STOP".to_owned() });
            }
            Ok(String::new())
        }
    }

    struct FakeDlt {
        next_id: Arc<AtomicUsize>,
        status_polls: Arc<AtomicUsize>,
    }

    impl DltLink for FakeDlt {
        async fn send(&mut self, command: &str) -> Result<String, dlt::DltError> {
            if command.starts_with("start-stream") {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                return Ok(format!(r#"{{"id":"acq-{id}"}}"#));
            }
            if command.starts_with("status") {
                self.status_polls.fetch_add(1, Ordering::SeqCst);
                return Ok(r#"{"acquisitions_count":1,"inactivity":2.0}"#.to_owned());
            }
            if command.starts_with("stop") {
                return Ok(r#"{"status":{"acquisitions_count":1}}"#.to_owned());
            }
            Ok("{}".to_owned())
        }
    }

    struct DuplexSources {
        writers: Arc<AsyncMutex<Vec<tokio::io::DuplexStream>>>,
    }

    impl StreamSourceFactory for DuplexSources {
        type Source = tokio::io::DuplexStream;
        async fn open(&mut self, _channel: ChannelId) -> std::io::Result<Self::Source> {
            let (client, server) = tokio::io::duplex(256);
            self.writers.lock().await.push(client);
            Ok(server)
        }
    }

    #[tokio::test]
    async fn empty_channel_set_is_rejected_before_configure() {
        let mut tc = FakeTc { stage_polls: Arc::new(AtomicUsize::new(0)) };
        let mut dlt = FakeDlt { next_id: Arc::new(AtomicUsize::new(0)), status_polls: Arc::new(AtomicUsize::new(0)) };
        let mut sources = DuplexSources { writers: Arc::new(AsyncMutex::new(Vec::new())) };
        let config = PipelineConfig {
            channels: vec![],
            duration: Duration::from_millis(10),
            width: scpi::Picoseconds(1_000),
            base_port: 9000,
            dlt_address: "127.0.0.1".to_owned(),
        };
        let out = run(&mut tc, &mut dlt, &mut sources, &config, &CancelFlag::new(), None).await;
        assert_eq!(out.final_state, PipelineState::Error);
        assert!(out.records.is_empty());
    }

    #[tokio::test]
    async fn happy_path_merges_one_channel_and_reaches_done() {
        let writers = Arc::new(AsyncMutex::new(Vec::new()));
        let mut tc = FakeTc { stage_polls: Arc::new(AtomicUsize::new(0)) };
        let mut dlt = FakeDlt { next_id: Arc::new(AtomicUsize::new(0)), status_polls: Arc::new(AtomicUsize::new(0)) };
        let mut sources = DuplexSources { writers: writers.clone() };
        let config = PipelineConfig {
            channels: vec![1],
            duration: Duration::from_millis(50),
            width: scpi::Picoseconds(1_000),
            base_port: 9000,
            dlt_address: "127.0.0.1".to_owned(),
        };
        let cancel = CancelFlag::new();

        let run_fut = run(&mut tc, &mut dlt, &mut sources, &config, &cancel, None);
        tokio::pin!(run_fut);

        // Give the pipeline a moment to open the stream socket, then feed
        // one event through it and close the socket so the worker sees a
        // clean EOF instead of waiting on a second message that never
        // comes.
        tokio::time::sleep(Duration::from_millis(10)).await;
        {
            let mut guard = writers.lock().await;
            if let Some(mut w) = guard.pop() {
                w.write_all(&1_000u64.to_le_bytes()).await.unwrap();
            }
        }

        let out = run_fut.await;
        assert_eq!(out.final_state, PipelineState::Done);
        assert!(!out.used_fallback);
        assert_eq!(out.records, vec![ChannelRecord::new(1, 1_000)]);
    }

    #[tokio::test]
    async fn dlt_failure_at_start_stream_falls_back() {
        struct FailingDlt;
        impl DltLink for FailingDlt {
            async fn send(&mut self, command: &str) -> Result<String, dlt::DltError> {
                if command.starts_with("start-stream") {
                    return Err(dlt::DltError::Timeout("no reply".to_owned()));
                }
                Ok(String::new())
            }
        }
        struct FallbackTc;
        impl TcLink for FallbackTc {
            async fn send(&mut self, command: &str) -> Result<String, scpi::TcError> {
                if command.contains("DATA:COUNt") {
                    return Ok("2".to_owned());
                }
                if command.contains("DATA:VALue") {
                    return Ok("10;20".to_owned());
                }
                Ok(String::new())
            }
        }

        let mut tc = FallbackTc;
        let mut dlt = FailingDlt;
        let mut sources = DuplexSources { writers: Arc::new(AsyncMutex::new(Vec::new())) };
        let config = PipelineConfig {
            channels: vec![1],
            duration: Duration::from_millis(10),
            width: scpi::Picoseconds(1_000),
            base_port: 9000,
            dlt_address: "127.0.0.1".to_owned(),
        };
        let out = run(&mut tc, &mut dlt, &mut sources, &config, &CancelFlag::new(), None).await;
        assert!(out.used_fallback);
        assert_eq!(out.records, vec![ChannelRecord::new(1, 10), ChannelRecord::new(1, 20)]);
    }

    #[tokio::test]
    async fn cancellation_mid_wait_still_yields_partial_records() {
        let writers = Arc::new(AsyncMutex::new(Vec::new()));
        let mut tc = FakeTc { stage_polls: Arc::new(AtomicUsize::new(0)) };
        let mut dlt = FakeDlt { next_id: Arc::new(AtomicUsize::new(0)), status_polls: Arc::new(AtomicUsize::new(0)) };
        let mut sources = DuplexSources { writers: writers.clone() };
        let config = PipelineConfig {
            channels: vec![1],
            duration: Duration::from_secs(5),
            width: scpi::Picoseconds(1_000),
            base_port: 9000,
            dlt_address: "127.0.0.1".to_owned(),
        };
        let cancel = CancelFlag::new();
        let run_fut = run(&mut tc, &mut dlt, &mut sources, &config, &cancel, None);
        tokio::pin!(run_fut);

        tokio::time::sleep(Duration::from_millis(10)).await;
        {
            let mut guard = writers.lock().await;
            if let Some(w) = guard.first_mut() {
                w.write_all(&5u64.to_le_bytes()).await.unwrap();
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.set();

        let out = run_fut.await;
        assert_eq!(out.records, vec![ChannelRecord::new(1, 5)]);
    }
}
