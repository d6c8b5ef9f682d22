//! The Master's DLT never returns a usable `start-stream` id; the
//! pipeline falls back to direct SCPI collection instead of hanging
//! (spec.md §4.3).

#[path = "common.rs"]
mod common;

use std::collections::HashMap;
use std::time::Duration;

use sync_core::supervision::CancelFlag;
use sync_test_support::{fake_dlt, fake_tc, FakeDltBehavior};

#[tokio::test(start_paused = true)]
async fn unresponsive_dlt_falls_back_to_scpi_collection() {
    let output_dir = tempfile::tempdir().unwrap();

    let master_tc = fake_tc::start_fallback(vec![(1, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110, 120])])
        .await
        .unwrap();
    let slave_tc = fake_tc::start(0).await.unwrap();

    let master_stream_base = common::free_port();
    let slave_stream_base = common::free_port();

    // Master's DLT answers every line with garbage, so `start-stream`
    // never resolves to a usable id.
    let master_dlt = fake_dlt::start(FakeDltBehavior { silent_start_stream: true, ..Default::default() })
        .await
        .unwrap();
    let slave_channel_data: HashMap<u32, Vec<u64>> = [(1, vec![5u64; 12])].into_iter().collect();
    let slave_dlt = fake_dlt::start_streaming(
        FakeDltBehavior { status_count: 1, status_inactivity: 2.0, ..Default::default() },
        slave_channel_data,
    )
    .await
    .unwrap();

    let control_bind = format!("127.0.0.1:{}", common::free_port());
    let file_bind = format!("127.0.0.1:{}", common::free_port());

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
    let slave_cfg = slave::config::load_config_from_str(&common::slave_config_toml(
        &slave_tc.addr().to_string(),
        &slave_dlt.addr().to_string(),
        &control_bind,
        &file_bind,
        slave_stream_base,
        output_dir.path(),
    ))
    .unwrap();

    let cancel = CancelFlag::new();
    let master_cancel = cancel.clone();
    let master_task = tokio::spawn(async move { master::run(&master_cfg, &master_cancel).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    let _slave_outcome = slave::run(&slave_cfg, &cancel).await;
    let master_outcome = master_task.await.unwrap();

    assert!(master_outcome.used_fallback);
    assert_eq!(master_outcome.records.len(), 12);
    assert_eq!(master_outcome.records[0].timestamp, 10);
    assert_eq!(master_outcome.records[11].timestamp, 120);
}
