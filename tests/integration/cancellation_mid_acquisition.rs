//! Cancelling mid-acquisition still yields a complete, well-formed
//! session: whatever was collected is persisted, and a too-small
//! partial sample is reported as insufficient rather than corrected
//! against (spec.md §4.6, §8).

#[path = "common.rs"]
mod common;

use std::collections::HashMap;
use std::time::Duration;

use sync_core::supervision::CancelFlag;
use sync_test_support::{fake_dlt, fake_tc, FakeDltBehavior};

#[tokio::test(start_paused = true)]
async fn cancelling_partway_through_still_produces_a_clean_session() {
    let output_dir = tempfile::tempdir().unwrap();

    let master_tc = fake_tc::start(0).await.unwrap();
    let slave_tc = fake_tc::start(0).await.unwrap();

    let master_stream_base = common::free_port();
    let slave_stream_base = common::free_port();

    // Five records per channel is below the partial-sample floor of
    // ten, so `insufficient_data` is guaranteed regardless of exactly
    // when cancellation lands relative to the merger draining them.
    let channel_data: HashMap<u32, Vec<u64>> = [(1, vec![42u64; 5])].into_iter().collect();
    let behavior = FakeDltBehavior { status_count: 1, status_inactivity: 2.0, ..Default::default() };
    let master_dlt = fake_dlt::start_streaming(behavior, channel_data.clone()).await.unwrap();
    let slave_dlt = fake_dlt::start_streaming(behavior, channel_data).await.unwrap();

    let control_bind = format!("127.0.0.1:{}", common::free_port());
    let file_bind = format!("127.0.0.1:{}", common::free_port());

    let master_cfg = master::config::load_config_from_str(&common::master_config_toml(
        &master_tc.addr().to_string(),
        &master_dlt.addr().to_string(),
        &control_bind,
        &file_bind,
        &[1],
        1.0,
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
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        canceller.set();
    });

    let master_cancel = cancel.clone();
    let master_task = tokio::spawn(async move { master::run(&master_cfg, &master_cancel).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    let slave_outcome = slave::run(&slave_cfg, &cancel).await;
    let master_outcome = master_task.await.unwrap();

    assert!(!master_outcome.records.is_empty());
    assert!(!slave_outcome.records.is_empty());

    let report = master_outcome.report.expect("report produced even on cancellation");
    assert!(report.insufficient_data);
    assert!(report.corrected_file.is_none());

    let entries: Vec<_> = std::fs::read_dir(output_dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
    assert!(!entries.iter().any(|n| n.to_string_lossy().contains("sync_corrected")));
}
