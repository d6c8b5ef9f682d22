//! Full two-sided session: both peers stream real data through their
//! (faked) Time Controller and DLT, Master synchronizes against the
//! Slave's partial sample, and every artefact lands on disk.
//!
//! Record counts are scaled down from a production run for test speed;
//! the classification and synchronization logic they exercise is
//! unaffected by scale.

#[path = "common.rs"]
mod common;

use std::collections::HashMap;
use std::time::Duration;

use sync_core::supervision::CancelFlag;
use sync_test_support::{fake_dlt, fake_tc, FakeDltBehavior};

const MESSAGES_PER_CHANNEL: usize = 15;

#[tokio::test(start_paused = true)]
async fn two_channels_synchronize_with_a_constant_offset() {
    let output_dir = tempfile::tempdir().unwrap();

    let master_tc = fake_tc::start(0).await.unwrap();
    let slave_tc = fake_tc::start(0).await.unwrap();

    let master_stream_base = common::free_port();
    let slave_stream_base = common::free_port();

    // Master's own channel data is offset 1357 ns ahead of what the
    // Slave observes; both channels carry identical values so the
    // merger's stable tie-break keeps their relative order lined up.
    let master_channel_data: HashMap<u32, Vec<u64>> = [
        (1, vec![1_857u64; MESSAGES_PER_CHANNEL]),
        (2, vec![1_857u64; MESSAGES_PER_CHANNEL]),
    ]
    .into_iter()
    .collect();
    let slave_channel_data: HashMap<u32, Vec<u64>> = [
        (1, vec![500u64; MESSAGES_PER_CHANNEL]),
        (2, vec![500u64; MESSAGES_PER_CHANNEL]),
    ]
    .into_iter()
    .collect();

    let behavior = FakeDltBehavior { status_count: 1, status_inactivity: 2.0, ..Default::default() };
    let master_dlt = fake_dlt::start_streaming(behavior, master_channel_data).await.unwrap();
    let slave_dlt = fake_dlt::start_streaming(behavior, slave_channel_data).await.unwrap();

    let control_port = common::free_port();
    let file_port = common::free_port();
    let control_bind = format!("127.0.0.1:{control_port}");
    let file_bind = format!("127.0.0.1:{file_port}");

    let master_cfg = master::config::load_config_from_str(&common::master_config_toml(
        &master_tc.addr().to_string(),
        &master_dlt.addr().to_string(),
        &control_bind,
        &file_bind,
        &[1, 2],
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
    let slave_outcome = slave::run(&slave_cfg, &cancel).await;
    let master_outcome = master_task.await.unwrap();

    assert!(slave_outcome.warnings.is_empty(), "slave warnings: {:?}", slave_outcome.warnings);
    assert_eq!(master_outcome.records.len(), MESSAGES_PER_CHANNEL * 2);
    assert_eq!(slave_outcome.records.len(), MESSAGES_PER_CHANNEL * 2);
    assert!(!master_outcome.used_fallback);
    assert!(!slave_outcome.used_fallback);

    let report = master_outcome.report.expect("report produced");
    assert!(!report.insufficient_data);
    assert_eq!(report.sample_count, 10);
    assert!((report.mean - 1_357.0).abs() < f64::EPSILON, "mean was {}", report.mean);
    assert_eq!(report.min, 1_357);
    assert_eq!(report.max, 1_357);

    let entries: Vec<_> = std::fs::read_dir(output_dir.path()).unwrap().map(|e| e.unwrap().file_name()).collect();
    assert!(entries.iter().any(|n| n.to_string_lossy().contains("sync_corrected")));
    assert!(entries.iter().any(|n| n.to_string_lossy().starts_with("sync_report_")));
}
