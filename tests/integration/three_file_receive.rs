//! The Master receives exactly three files from the Slave — partial,
//! full binary, full text — and classifies each by size (spec.md §4.4's
//! file-receiver policy). Record counts are scaled down from the
//! spec's illustrative 50 KiB / 800 KiB / 600 KiB so the test runs fast;
//! what's under test is the `< 100 KiB` classification boundary and the
//! three-message stop condition, not the literal byte counts.

#[path = "common.rs"]
mod common;

use std::collections::HashMap;
use std::time::Duration;

use sync_core::supervision::CancelFlag;
use sync_test_support::{fake_dlt, fake_tc, FakeDltBehavior};

const TOTAL_RECORDS: usize = 20_000;

#[tokio::test(start_paused = true)]
async fn three_files_arrive_and_classify_by_size() {
    let output_dir = tempfile::tempdir().unwrap();

    let master_tc = fake_tc::start(0).await.unwrap();
    let slave_tc = fake_tc::start(0).await.unwrap();

    let master_stream_base = common::free_port();
    let slave_stream_base = common::free_port();

    let master_channel_data: HashMap<u32, Vec<u64>> = [(1, vec![7u64; TOTAL_RECORDS])].into_iter().collect();
    let slave_channel_data: HashMap<u32, Vec<u64>> = [(1, vec![7u64; TOTAL_RECORDS])].into_iter().collect();
    let behavior = FakeDltBehavior { status_count: 1, status_inactivity: 2.0, ..Default::default() };
    let master_dlt = fake_dlt::start_streaming(behavior, master_channel_data).await.unwrap();
    let slave_dlt = fake_dlt::start_streaming(behavior, slave_channel_data).await.unwrap();

    let control_bind = format!("127.0.0.1:{}", common::free_port());
    let file_bind = format!("127.0.0.1:{}", common::free_port());

    let master_cfg = master::config::load_config_from_str(&common::master_config_toml(
        &master_tc.addr().to_string(),
        &master_dlt.addr().to_string(),
        &control_bind,
        &file_bind,
        &[1],
        0.2,
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
    let slave_outcome = slave::run(&slave_cfg, &cancel).await;
    let _master_outcome = master_task.await.unwrap();

    assert_eq!(slave_outcome.records.len(), TOTAL_RECORDS);

    let mut received: Vec<_> = std::fs::read_dir(output_dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with("partial_data_"))
        .collect();
    received.sort();

    assert_eq!(received.len(), 3, "expected exactly three received files, got {received:?}");

    let sizes: Vec<u64> = received.iter().map(|p| std::fs::metadata(p).unwrap().len()).collect();
    const CEILING: u64 = 100 * 1024;
    assert!(sizes[0] < CEILING, "first file (partial) should classify under the ceiling: {sizes:?}");
    assert!(sizes[1] >= CEILING, "second file (full binary) should classify at/above the ceiling: {sizes:?}");
    assert!(sizes[2] >= CEILING, "third file (full text) should classify at/above the ceiling: {sizes:?}");
}
