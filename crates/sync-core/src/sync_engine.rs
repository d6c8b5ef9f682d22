//! The synchronization engine (C5): coarse and fine clock offset
//! computation, start-point correction of the Master's dataset, and
//! `OffsetReport` rendering (spec.md §4.5).

use chrono::{DateTime, Local};

use crate::models::{ChannelRecord, CorrectionMode, OffsetReport, Timestamp};

/// `Δ₀ = T_slave − T_master`, the coarse offset from the trigger
/// exchange (spec.md §4.4.3).
#[must_use]
pub fn coarse_offset(t_master: Timestamp, t_slave: Timestamp) -> i64 {
    i64::try_from(t_slave).unwrap_or(i64::MAX) - i64::try_from(t_master).unwrap_or(i64::MAX)
}

/// Compare the Master's own dataset against the Slave's partial sample
/// and, unless the partial is too small, produce a corrected Master
/// dataset alongside the offset statistics.
///
/// Returns `(report, corrected_records)`; `corrected_records` is `None`
/// when the partial has fewer than 10 records (spec.md §4.5, §8:
/// "insufficient data", still a successful session).
#[must_use]
pub fn analyze(
    master: &[ChannelRecord],
    slave_partial: &[ChannelRecord],
    mode: CorrectionMode,
) -> (OffsetReport, Option<Vec<ChannelRecord>>) {
    if slave_partial.len() < 10 {
        return (
            OffsetReport {
                mean: 0.0,
                min: 0,
                max: 0,
                stddev: 0.0,
                relative_spread: 0.0,
                sample_count: slave_partial.len(),
                applied: None,
                corrected_file: None,
                insufficient_data: true,
            },
            None,
        );
    }

    let n = master.len().min(slave_partial.len());
    let diffs: Vec<i64> = (0..n)
        .map(|i| {
            i64::try_from(master[i].timestamp).unwrap_or(i64::MAX)
                - i64::try_from(slave_partial[i].timestamp).unwrap_or(i64::MAX)
        })
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let mean = diffs.iter().sum::<i64>() as f64 / n as f64;
    let min = *diffs.iter().min().unwrap_or(&0);
    let max = *diffs.iter().max().unwrap_or(&0);
    #[allow(clippy::cast_precision_loss)]
    let variance = diffs
        .iter()
        .map(|&d| {
            let delta = d as f64 - mean;
            delta * delta
        })
        .sum::<f64>()
        / n as f64;
    let stddev = variance.sqrt();
    // Mean of zero means "already synchronized": report zero spread
    // rather than divide by zero (spec.md §4.5 tie-break).
    #[allow(clippy::cast_precision_loss)]
    let relative_spread = if mean == 0.0 {
        0.0
    } else {
        (max - min) as f64 / mean * 100.0
    };

    let slave_min = slave_partial.iter().map(|r| r.timestamp).min().unwrap_or(0);
    let master_min = master.iter().map(|r| r.timestamp).min().unwrap_or(0);
    let start_point = slave_min.max(master_min);

    let corrected = match mode {
        CorrectionMode::Trim => master
            .iter()
            .filter(|r| r.timestamp >= start_point)
            .copied()
            .collect::<Vec<_>>(),
        CorrectionMode::Shift => {
            let offset = mean.round() as i64;
            master
                .iter()
                .map(|r| {
                    let shifted = i64::try_from(r.timestamp).unwrap_or(i64::MAX) + offset;
                    ChannelRecord::new(r.channel, shifted.max(0) as u64)
                })
                .collect::<Vec<_>>()
        }
    };

    let report = OffsetReport {
        mean,
        min,
        max,
        stddev,
        relative_spread,
        sample_count: n,
        applied: Some(mode),
        corrected_file: None,
        insufficient_data: false,
    };
    (report, Some(corrected))
}

/// Render the report in the textual layout spec.md §6 defines.
/// `corrected_file` and `applied` should already be filled in by the
/// caller (the state machine, once it knows the on-disk path).
#[must_use]
pub fn format_report(report: &OffsetReport, generated_at: DateTime<Local>) -> String {
    let mut out = String::new();
    out.push_str("Synchronization Analysis Report\n");
    out.push_str(&format!("Generated: {}\n", generated_at.format("%Y%m%d_%H%M%S")));
    if report.insufficient_data {
        out.push_str("Note: insufficient data\n");
    }
    out.push_str(&format!("Sample count: {}\n", report.sample_count));
    out.push_str(&format!("Mean offset:  {:.3} ns\n", report.mean));
    out.push_str(&format!("Min offset:   {} ns\n", report.min));
    out.push_str(&format!("Max offset:   {} ns\n", report.max));
    out.push_str(&format!("Std deviation:{:.3} ns\n", report.stddev));
    out.push_str(&format!("Relative spread: {:.3}%\n", report.relative_spread));
    out.push_str(&format!(
        "Applied: {}\n",
        report.applied.map(CorrectionMode::as_str).unwrap_or("none")
    ));
    out.push_str(&format!(
        "Corrected file: {}\n",
        report.corrected_file.as_deref().unwrap_or("none")
    ));
    out
}
