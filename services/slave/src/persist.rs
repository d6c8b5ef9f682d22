//! Persisted session artefacts (spec.md §6): the Slave's own merged
//! dataset, both binary and textual.

use std::path::{Path, PathBuf};

use sync_core::io::{self, IoCodecError};
use sync_core::models::ChannelRecord;

#[derive(Debug)]
pub struct Artifacts {
    pub results_bin: PathBuf,
    pub results_txt: PathBuf,
}

/// Write `slave_results_<ts>.bin` and `.txt` under `output_dir`.
pub fn write_artifacts(output_dir: &Path, ts: &str, records: &[ChannelRecord]) -> Result<Artifacts, IoCodecError> {
    std::fs::create_dir_all(output_dir)?;
    let results_bin = output_dir.join(format!("slave_results_{ts}.bin"));
    io::write_binary_file(&results_bin, records)?;
    let results_txt = output_dir.join(format!("slave_results_{ts}.txt"));
    io::write_text_file(&results_txt, records)?;
    Ok(Artifacts { results_bin, results_txt })
}
