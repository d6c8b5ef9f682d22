//! The Master's distributed state machine (C4, spec.md §4.4): probe
//! readiness, trigger, run the local acquisition pipeline, collect the
//! Slave's files, and synchronize.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::Local;

use sync_core::io;
use sync_core::models::{ChannelRecord, OffsetReport};
use sync_core::net::{TcpDltLink, TcpStreamSources, TcpTcLink};
use sync_core::pipeline::{self, PipelineConfig};
use sync_core::supervision::{CancelFlag, PEER_TERMINATION_CAP};
use sync_core::sync_engine;
use sync_wire::{commands, CommandEnvelope, PeerMessage, TriggerEnvelope};

use crate::config::MasterConfig;
use crate::file_receiver::{self, ReceivedFile};
use crate::persist;
use crate::transport::{ControlLink, FileLink};

/// Master probes readiness for up to this long before giving up and
/// running its own acquisition anyway (spec.md §4.6's hard peer cap
/// bounds every phase, not just shutdown).
const READINESS_TIMEOUT: Duration = PEER_TERMINATION_CAP;

/// Master waits up to this long for the partial file to arrive on the
/// file link once requested (spec.md §4.4.5, scenario 6).
const PARTIAL_WAIT: Duration = Duration::from_secs(15);

pub struct SessionOutcome {
    pub records: Vec<ChannelRecord>,
    pub used_fallback: bool,
    pub report: Option<OffsetReport>,
    pub warnings: Vec<String>,
}

/// Run one Master session end to end.
pub async fn run(config: &MasterConfig, cancel: &CancelFlag) -> SessionOutcome {
    let mut warnings = Vec::new();

    tracing::info!(control = %config.peer.control_bind, file = %config.peer.file_bind, "waiting for slave to connect");
    let (control_result, file_result) = tokio::join!(
        ControlLink::accept(&config.peer.control_bind),
        FileLink::accept(&config.peer.file_bind),
    );
    let mut control = match control_result {
        Ok(link) => link,
        Err(e) => {
            warnings.push(format!("could not accept control link: {e}"));
            return SessionOutcome { records: Vec::new(), used_fallback: false, report: None, warnings };
        }
    };
    let file_link = match file_result {
        Ok(link) => link,
        Err(e) => {
            warnings.push(format!("could not accept file link: {e}"));
            return SessionOutcome { records: Vec::new(), used_fallback: false, report: None, warnings };
        }
    };

    // 1. Probe readiness.
    let ready_sent = control
        .send(&PeerMessage::Command(CommandEnvelope {
            command: commands::REQUEST_READY.to_owned(),
            params: serde_json::Value::Null,
            sequence: control.next_sequence(),
        }))
        .await;
    if let Err(e) = ready_sent {
        warnings.push(format!("request_ready failed: {e}"));
    }
    if wait_for(&mut control, READINESS_TIMEOUT, |m| matches!(m, PeerMessage::Ready(_)))
        .await
        .is_none()
    {
        warnings.push("slave never signalled ready; proceeding anyway".to_owned());
    }

    // 2. Send trigger.
    let t_master = now_ns();
    let sequence = control.next_sequence();
    let trigger = PeerMessage::Trigger(TriggerEnvelope {
        sequence,
        timestamp: t_master,
        duration: config.acquisition.duration_secs,
        channels: config.acquisition.channels.clone(),
    });
    if let Err(e) = control.send(&trigger).await {
        warnings.push(format!("trigger send failed: {e}"));
    }

    // 3. Receive slave trigger instant.
    let slave_wait = Duration::from_secs_f64(config.acquisition.duration_secs) + Duration::from_secs(5);
    match wait_for(&mut control, slave_wait, |m| matches!(m, PeerMessage::SlaveTrigger(_))).await {
        Some(PeerMessage::SlaveTrigger(env)) => {
            let coarse = sync_engine::coarse_offset(t_master, env.timestamp);
            tracing::info!(coarse_offset_ns = coarse, "coarse offset computed");
        }
        _ => warnings.push("slave never reported its trigger instant; no coarse offset".to_owned()),
    }

    // 4. Run the local acquisition.
    let pipeline_config = PipelineConfig {
        channels: config.acquisition.channels.clone(),
        duration: Duration::from_secs_f64(config.acquisition.duration_secs),
        width: tc_scpi::scpi::Picoseconds(config.acquisition.width_ps),
        base_port: config.dlt.base_port,
        dlt_address: config.dlt.stream_address.clone(),
    };
    let mut tc_link = match TcpTcLink::connect(&config.tc.address).await {
        Ok(link) => link,
        Err(e) => {
            warnings.push(format!("could not connect to time controller: {e}"));
            return SessionOutcome { records: Vec::new(), used_fallback: false, report: None, warnings };
        }
    };
    let mut dlt_link = match TcpDltLink::connect(&config.dlt.command_address).await {
        Ok(link) => link,
        Err(e) => {
            warnings.push(format!("could not connect to DLT: {e}"));
            return SessionOutcome { records: Vec::new(), used_fallback: false, report: None, warnings };
        }
    };
    let mut sources = TcpStreamSources {
        bind_address: config.dlt.stream_address.clone(),
        base_port: config.dlt.base_port,
    };
    let output = pipeline::run(&mut tc_link, &mut dlt_link, &mut sources, &pipeline_config, cancel, None).await;
    warnings.extend(output.warnings);

    // 5/6. Request the slave's files, draining the file link in the background.
    // PARTIAL_WAIT only gates the first partial file's arrival, signaled
    // via `first_partial_rx`: the full/text replies the loop keeps
    // collecting afterward run on their own wall-clock budget and must
    // not cause an already-landed partial to be abandoned with the rest
    // of the task (spec.md §4.4).
    let (first_partial_tx, first_partial_rx) = tokio::sync::oneshot::channel();
    let file_task = tokio::spawn(async move {
        let mut file_link = file_link;
        file_receiver::receive(&mut file_link, Some(first_partial_tx)).await
    });
    for command in [commands::REQUEST_PARTIAL, commands::REQUEST_FULL, commands::REQUEST_TEXT] {
        let sequence = control.next_sequence();
        if let Err(e) = control
            .send(&PeerMessage::Command(CommandEnvelope {
                command: command.to_owned(),
                params: serde_json::Value::Null,
                sequence,
            }))
            .await
        {
            warnings.push(format!("{command} send failed: {e}"));
        }
    }
    match tokio::time::timeout(PARTIAL_WAIT, first_partial_rx).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => warnings.push("file receiver finished without ever receiving a partial file".to_owned()),
        Err(_) => warnings.push("no partial file arrived from slave within 15s".to_owned()),
    }
    let received: Vec<ReceivedFile> = match file_task.await {
        Ok(files) => files,
        Err(e) => {
            warnings.push(format!("file receiver task panicked: {e}"));
            Vec::new()
        }
    };

    // 7. Synchronize against the first partial-sized file received.
    let slave_partial = received
        .iter()
        .find(|f| f.kind == file_receiver::FileKind::Partial)
        .and_then(|f| io::read_binary(&mut f.bytes.as_slice()).ok())
        .unwrap_or_default();
    let mode = crate::config::correction_mode(&config.sync);
    let (report, corrected) = sync_engine::analyze(&output.records, &slave_partial, mode);

    // 8. Terminate: tell the slave to stop, best-effort.
    let sequence = control.next_sequence();
    if let Err(e) = control
        .send(&PeerMessage::Command(CommandEnvelope {
            command: commands::STOP.to_owned(),
            params: serde_json::Value::Null,
            sequence,
        }))
        .await
    {
        tracing::warn!(error = %e, "stop command failed, slave may linger until it notices the closed socket");
    }

    if let Err(e) = persist::write_artifacts(
        std::path::Path::new(&config.output.directory),
        &timestamp_base(),
        &output.records,
        corrected.as_deref(),
        report.clone(),
        &received,
        Local::now(),
    ) {
        warnings.push(format!("failed to persist session artifacts: {e}"));
    }

    SessionOutcome {
        records: output.records,
        used_fallback: output.used_fallback,
        report: Some(report),
        warnings,
    }
}

async fn wait_for<F>(link: &mut ControlLink, deadline: Duration, mut matches: F) -> Option<PeerMessage>
where
    F: FnMut(&PeerMessage) -> bool,
{
    let started = Instant::now();
    loop {
        if started.elapsed() >= deadline {
            return None;
        }
        match link.recv_timeout().await {
            Ok(Some(msg)) if matches(&msg) => return Some(msg),
            Ok(Some(_)) | Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "control link recv error while waiting");
                return None;
            }
        }
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn timestamp_base() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}
