//! A Slave that completes the trigger handshake but then goes silent —
//! never answering `request_partial` — still leaves the Master with a
//! clean, terminated session: the partial wait times out, and the
//! report honestly states there wasn't enough data to correct against
//! (spec.md §4.4.1's `PARTIAL_WAIT` bound, §8's insufficient-data case).

#[path = "common.rs"]
mod common;

use std::time::Duration;

use sync_core::supervision::CancelFlag;
use sync_test_support::{fake_dlt, fake_peer, fake_tc, FakeDltBehavior};
use sync_wire::{commands, recv_message, send_message, PeerMessage, ResponseEnvelope};

#[tokio::test(start_paused = true)]
async fn slave_that_never_serves_files_yields_insufficient_data() {
    let output_dir = tempfile::tempdir().unwrap();

    let master_tc = fake_tc::start(0).await.unwrap();
    let master_stream_base = common::free_port();
    let behavior = FakeDltBehavior { status_count: 1, status_inactivity: 2.0, ..Default::default() };
    let master_dlt = fake_dlt::start(behavior).await.unwrap();

    let control_bind = format!("127.0.0.1:{}", common::free_port());
    let file_bind = format!("127.0.0.1:{}", common::free_port());
    let control_addr: std::net::SocketAddr = control_bind.parse().unwrap();
    let file_addr: std::net::SocketAddr = file_bind.parse().unwrap();

    let master_cfg = master::config::load_config_from_str(&common::master_config_toml(
        &master_tc.addr().to_string(),
        &master_dlt.addr().to_string(),
        &control_bind,
        &file_bind,
        &[1],
        0.1,
        master_stream_base,
        output_dir.path(),
    ))
    .unwrap();

    let cancel = CancelFlag::new();
    let master_cancel = cancel.clone();
    let master_task = tokio::spawn(async move { master::run(&master_cfg, &master_cancel).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The fake slave completes the handshake (ready, then a trigger
    // acknowledgement) so the Master's session proceeds past waiting for
    // it, then holds the file link open without ever answering a file
    // request, so the Master's partial-wait bound is what ends the
    // session rather than a dropped connection.
    let fake_slave = tokio::spawn(async move {
        let _file_conn = fake_peer::connect_framed(file_addr).await.unwrap();
        let (mut reader, mut writer) = fake_peer::connect_framed(control_addr).await.unwrap();

        loop {
            match recv_message(&mut reader).await.unwrap() {
                Some(PeerMessage::Command(cmd)) if cmd.command == commands::REQUEST_READY => {
                    send_message(
                        &mut writer,
                        &PeerMessage::Response(ResponseEnvelope {
                            command: cmd.command.clone(),
                            success: true,
                            error: None,
                            data: None,
                            sequence: 1,
                        }),
                    )
                    .await
                    .unwrap();
                    send_message(&mut writer, &PeerMessage::Ready(sync_wire::ReadyEnvelope { sequence: 2, timestamp: 0 }))
                        .await
                        .unwrap();
                }
                Some(PeerMessage::Trigger(_)) => {
                    send_message(
                        &mut writer,
                        &PeerMessage::SlaveTrigger(sync_wire::SlaveTriggerEnvelope { sequence: 3, timestamp: 0 }),
                    )
                    .await
                    .unwrap();
                    break;
                }
                Some(_) => continue,
                None => return,
            }
        }

        // Outlast the Master's partial-wait bound without answering
        // anything further, including `stop`.
        tokio::time::sleep(Duration::from_secs(20)).await;
    });

    let master_outcome = master_task.await.unwrap();
    fake_slave.abort();

    let report = master_outcome.report.expect("report still produced when the slave goes silent");
    assert!(report.insufficient_data);
    assert!(report.corrected_file.is_none());
}
