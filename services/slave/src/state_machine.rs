//! The Slave's distributed state machine (C4, spec.md §4.4): wait for
//! the readiness probe, record the trigger instant, run the local
//! acquisition pipeline, then serve file requests until told to stop.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use sync_core::io;
use sync_core::models::ChannelRecord;
use sync_core::net::{TcpDltLink, TcpStreamSources, TcpTcLink};
use sync_core::pipeline::{self, PipelineConfig};
use sync_core::supervision::{CancelFlag, PEER_TERMINATION_CAP};
use sync_wire::{commands, CommandEnvelope, PeerMessage, ReadyEnvelope, ResponseEnvelope, SlaveTriggerEnvelope};

use crate::config::SlaveConfig;
use crate::retained::Retained;
use crate::transport::{ControlLink, FileLink};

pub struct SessionOutcome {
    pub records: Vec<ChannelRecord>,
    pub used_fallback: bool,
    pub warnings: Vec<String>,
}

/// Run one Slave session end to end.
pub async fn run(config: &SlaveConfig, cancel: &CancelFlag) -> SessionOutcome {
    let mut warnings = Vec::new();

    let mut control = match ControlLink::connect(&config.peer.master_control_addr).await {
        Ok(link) => link,
        Err(e) => {
            warnings.push(format!("could not connect to master control link: {e}"));
            return SessionOutcome { records: Vec::new(), used_fallback: false, warnings };
        }
    };
    let mut file_link = match FileLink::connect(&config.peer.master_file_addr).await {
        Ok(link) => link,
        Err(e) => {
            warnings.push(format!("could not connect to master file link: {e}"));
            return SessionOutcome { records: Vec::new(), used_fallback: false, warnings };
        }
    };

    // 1/2. Wait for the readiness probe, acknowledge it, push ready.
    loop {
        match control.recv_timeout().await {
            Ok(Some(PeerMessage::Command(cmd))) if cmd.command == commands::REQUEST_READY => {
                let sequence = control.next_sequence();
                let _ = control
                    .send(&PeerMessage::Response(ResponseEnvelope {
                        command: cmd.command.clone(),
                        success: true,
                        error: None,
                        data: None,
                        sequence,
                    }))
                    .await;
                let sequence = control.next_sequence();
                let _ = control
                    .send(&PeerMessage::Ready(ReadyEnvelope { sequence, timestamp: now_ns() }))
                    .await;
                break;
            }
            Ok(Some(_)) | Ok(None) => continue,
            Err(e) => {
                warnings.push(format!("control link error while waiting for readiness probe: {e}"));
                return SessionOutcome { records: Vec::new(), used_fallback: false, warnings };
            }
        }
    }

    // 3. Wait for the trigger, recording T_slave immediately after decode.
    let trigger = loop {
        match control.recv_timeout().await {
            Ok(Some(PeerMessage::Trigger(env))) => break env,
            Ok(Some(_)) | Ok(None) => continue,
            Err(e) => {
                warnings.push(format!("control link error while waiting for trigger: {e}"));
                return SessionOutcome { records: Vec::new(), used_fallback: false, warnings };
            }
        }
    };
    let t_slave = now_ns();
    let sequence = control.next_sequence();
    if let Err(e) = control
        .send(&PeerMessage::SlaveTrigger(SlaveTriggerEnvelope { sequence, timestamp: t_slave }))
        .await
    {
        warnings.push(format!("slave_trigger push failed: {e}"));
    }

    // 4. Run the local acquisition with the trigger's duration and channels.
    let pipeline_config = PipelineConfig {
        channels: trigger.channels.clone(),
        duration: Duration::from_secs_f64(trigger.duration),
        width: tc_scpi::scpi::Picoseconds(config.width_ps),
        base_port: config.dlt.base_port,
        dlt_address: config.dlt.stream_address.clone(),
    };
    let mut tc_link = match TcpTcLink::connect(&config.tc.address).await {
        Ok(link) => link,
        Err(e) => {
            warnings.push(format!("could not connect to time controller: {e}"));
            return SessionOutcome { records: Vec::new(), used_fallback: false, warnings };
        }
    };
    let mut dlt_link = match TcpDltLink::connect(&config.dlt.command_address).await {
        Ok(link) => link,
        Err(e) => {
            warnings.push(format!("could not connect to DLT: {e}"));
            return SessionOutcome { records: Vec::new(), used_fallback: false, warnings };
        }
    };
    let mut sources = TcpStreamSources {
        bind_address: config.dlt.stream_address.clone(),
        base_port: config.dlt.base_port,
    };
    let output = pipeline::run(&mut tc_link, &mut dlt_link, &mut sources, &pipeline_config, cancel, None).await;
    warnings.extend(output.warnings.clone());

    let retained = Retained::new();
    retained.store(output.records.clone());

    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    if let Err(e) = crate::persist::write_artifacts(std::path::Path::new(&config.output.directory), &ts, &output.records)
    {
        warnings.push(format!("failed to persist slave results: {e}"));
    }

    // 5-7. Serve file requests until told to stop, the peer disappears,
    // or the hard per-peer cap fires (spec.md §4.6).
    let deadline = Instant::now() + PEER_TERMINATION_CAP;
    loop {
        if cancel.is_set() || Instant::now() >= deadline {
            break;
        }
        match control.recv_timeout().await {
            Ok(Some(PeerMessage::Command(cmd))) => {
                if cmd.command == commands::STOP {
                    break;
                }
                handle_command(&mut control, &mut file_link, &retained, &cmd, &mut warnings).await;
            }
            Ok(Some(_)) | Ok(None) => continue,
            Err(e) => {
                warnings.push(format!("control link error, peer likely gone: {e}"));
                break;
            }
        }
    }

    SessionOutcome { records: output.records, used_fallback: output.used_fallback, warnings }
}

async fn handle_command(
    control: &mut ControlLink,
    file_link: &mut FileLink,
    retained: &Retained,
    cmd: &CommandEnvelope,
    warnings: &mut Vec<String>,
) {
    let (success, error) = match cmd.command.as_str() {
        commands::REQUEST_PARTIAL => send_dataset(file_link, retained.partial(), Encoding::Binary).await,
        commands::REQUEST_FULL => send_dataset(file_link, retained.full(), Encoding::Binary).await,
        commands::REQUEST_TEXT => send_dataset(file_link, retained.full(), Encoding::Text).await,
        other => (false, Some(format!("unrecognized command '{other}'"))),
    };
    if let Some(e) = &error {
        warnings.push(format!("{}: {e}", cmd.command));
    }
    let sequence = control.next_sequence();
    let _ = control
        .send(&PeerMessage::Response(ResponseEnvelope {
            command: cmd.command.clone(),
            success,
            error,
            data: None,
            sequence,
        }))
        .await;
}

enum Encoding {
    Binary,
    Text,
}

/// Encode and push `dataset` on the file link. Returns `(success, error)`
/// for the RPC reply; a missing dataset is a StateError (spec.md §7:
/// "command received in wrong phase").
async fn send_dataset(
    file_link: &mut FileLink,
    dataset: Option<Vec<ChannelRecord>>,
    encoding: Encoding,
) -> (bool, Option<String>) {
    let Some(records) = dataset else {
        return (false, Some("not-ready".to_owned()));
    };
    let mut buf = Vec::new();
    let encoded = match encoding {
        Encoding::Binary => io::write_binary(&mut buf, &records),
        Encoding::Text => io::write_text(&mut buf, &records),
    };
    if let Err(e) = encoded {
        return (false, Some(e.to_string()));
    }
    match file_link.send(buf).await {
        Ok(()) => (true, None),
        Err(e) => (false, Some(e.to_string())),
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
