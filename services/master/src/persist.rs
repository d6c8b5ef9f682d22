//! Persisted session artefacts (spec.md §6): the Master's own merged
//! dataset, the synchronization-corrected rewrite, the rendered report,
//! and the raw files received from the Slave.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use sync_core::io::{self, IoCodecError};
use sync_core::models::{ChannelRecord, OffsetReport};
use sync_core::sync_engine;

use crate::file_receiver::ReceivedFile;

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("codec error: {0}")]
    Codec(#[from] IoCodecError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Paths written for one session, for logging or for tests to assert on.
#[derive(Debug)]
pub struct Artifacts {
    pub results_bin: PathBuf,
    pub results_txt: PathBuf,
    pub corrected_bin: Option<PathBuf>,
    pub report_txt: PathBuf,
    pub partial_files: Vec<PathBuf>,
}

/// Write every artefact for one session under `output_dir`, named with
/// the shared timestamp base `ts` (spec.md §6's `YYYYMMDD_HHMMSS`
/// convention).
pub fn write_artifacts(
    output_dir: &Path,
    ts: &str,
    master_records: &[ChannelRecord],
    corrected: Option<&[ChannelRecord]>,
    mut report: OffsetReport,
    received_files: &[ReceivedFile],
    generated_at: DateTime<Local>,
) -> Result<Artifacts, PersistError> {
    std::fs::create_dir_all(output_dir)?;

    let results_bin = output_dir.join(format!("master_results_{ts}.bin"));
    io::write_binary_file(&results_bin, master_records)?;
    let results_txt = output_dir.join(format!("master_results_{ts}.txt"));
    io::write_text_file(&results_txt, master_records)?;

    let corrected_bin = match corrected {
        Some(records) => {
            let path = output_dir.join(format!("master_results_{ts}_sync_corrected.bin"));
            io::write_binary_file(&path, records)?;
            report.corrected_file = Some(path.display().to_string());
            Some(path)
        }
        None => None,
    };

    let mut partial_files = Vec::with_capacity(received_files.len());
    for (idx, file) in received_files.iter().enumerate() {
        let path = output_dir.join(format!("partial_data_{}.bin", idx + 1));
        std::fs::write(&path, &file.bytes)?;
        partial_files.push(path);
    }

    let report_txt = output_dir.join(format!("sync_report_{ts}.txt"));
    std::fs::write(&report_txt, sync_engine::format_report(&report, generated_at))?;

    Ok(Artifacts { results_bin, results_txt, corrected_bin, report_txt, partial_files })
}
