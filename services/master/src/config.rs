//! Master configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides.
//! Default config path: `/etc/tc-sync/master.toml`.
//!
//! # Required fields
//! - `tc.address`
//! - `dlt.command_address`
//! - At least one entry in `acquisition.channels`

use serde::Deserialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// Config types (validated, used by the rest of the crate)
// ---------------------------------------------------------------------------

/// Top-level Master configuration.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub tc: TcConfig,
    pub dlt: DltConfig,
    pub acquisition: AcquisitionConfig,
    pub peer: PeerConfig,
    pub sync: SyncConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone)]
pub struct TcConfig {
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct DltConfig {
    pub command_address: String,
    /// The address this host's own stream sockets listen on; handed to
    /// the DLT's `start-stream --address` so it knows where to connect
    /// back (spec.md §4.2.2).
    pub stream_address: String,
    pub base_port: u16,
}

#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    pub channels: Vec<u32>,
    pub duration_secs: f64,
    pub width_ps: u64,
}

#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Bind address for the control link (trigger/sync/command/status
    /// all multiplexed over one `PeerMessage` socket, spec.md §4.1).
    pub control_bind: String,
    /// Bind address for the file link (opaque byte payloads).
    pub file_bind: String,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub correction_mode: String,
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub directory: String,
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    tc: Option<RawTcConfig>,
    dlt: Option<RawDltConfig>,
    acquisition: Option<RawAcquisitionConfig>,
    peer: Option<RawPeerConfig>,
    sync: Option<RawSyncConfig>,
    output: Option<RawOutputConfig>,
}

#[derive(Debug, Deserialize)]
struct RawTcConfig {
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDltConfig {
    command_address: Option<String>,
    stream_address: Option<String>,
    base_port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct RawAcquisitionConfig {
    channels: Option<Vec<u32>>,
    duration_secs: Option<f64>,
    width_ps: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawPeerConfig {
    control_bind: Option<String>,
    file_bind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSyncConfig {
    correction_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOutputConfig {
    directory: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load Master config from a custom path.
pub fn load_config_from_path(path: &Path) -> Result<MasterConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

/// Load Master config from the default path `/etc/tc-sync/master.toml`.
pub fn load_config() -> Result<MasterConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/tc-sync/master.toml"))
}

/// Load Master config from a TOML string.
pub fn load_config_from_str(toml_str: &str) -> Result<MasterConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let raw_tc = raw.tc.ok_or_else(|| ConfigError::MissingField("tc".to_owned()))?;
    let tc = TcConfig {
        address: raw_tc
            .address
            .ok_or_else(|| ConfigError::MissingField("tc.address".to_owned()))?,
    };

    let raw_dlt = raw.dlt.ok_or_else(|| ConfigError::MissingField("dlt".to_owned()))?;
    let dlt = DltConfig {
        command_address: raw_dlt
            .command_address
            .ok_or_else(|| ConfigError::MissingField("dlt.command_address".to_owned()))?,
        stream_address: raw_dlt.stream_address.unwrap_or_else(|| "127.0.0.1".to_owned()),
        base_port: raw_dlt.base_port.unwrap_or(9100),
    };

    let raw_acq = raw
        .acquisition
        .ok_or_else(|| ConfigError::MissingField("acquisition".to_owned()))?;
    let channels = raw_acq
        .channels
        .ok_or_else(|| ConfigError::MissingField("acquisition.channels".to_owned()))?;
    if channels.is_empty() {
        return Err(ConfigError::InvalidValue(
            "acquisition.channels must have at least one entry".to_owned(),
        ));
    }
    let acquisition = AcquisitionConfig {
        channels,
        duration_secs: raw_acq.duration_secs.unwrap_or(1.0),
        width_ps: raw_acq.width_ps.unwrap_or(1_000_000),
    };

    let peer = match raw.peer {
        Some(p) => PeerConfig {
            control_bind: p.control_bind.unwrap_or_else(|| "0.0.0.0:9300".to_owned()),
            file_bind: p.file_bind.unwrap_or_else(|| "0.0.0.0:9301".to_owned()),
        },
        None => PeerConfig {
            control_bind: "0.0.0.0:9300".to_owned(),
            file_bind: "0.0.0.0:9301".to_owned(),
        },
    };

    let sync = match raw.sync {
        Some(s) => {
            let mode = s.correction_mode.unwrap_or_else(|| "trim".to_owned());
            if mode != "trim" && mode != "shift" {
                return Err(ConfigError::InvalidValue(format!(
                    "sync.correction_mode must be 'trim' or 'shift', got '{mode}'"
                )));
            }
            SyncConfig { correction_mode: mode }
        }
        None => SyncConfig { correction_mode: "trim".to_owned() },
    };

    let output = match raw.output {
        Some(o) => OutputConfig {
            directory: o.directory.unwrap_or_else(|| ".".to_owned()),
        },
        None => OutputConfig { directory: ".".to_owned() },
    };

    Ok(MasterConfig { tc, dlt, acquisition, peer, sync, output })
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {s}"),
            ConfigError::Parse(s) => write!(f, "Parse error: {s}"),
            ConfigError::MissingField(s) => write!(f, "Missing required field: {s}"),
            ConfigError::InvalidValue(s) => write!(f, "Invalid config value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse the validated `sync.correction_mode` string into the core type.
#[must_use]
pub fn correction_mode(cfg: &SyncConfig) -> sync_core::models::CorrectionMode {
    match cfg.correction_mode.as_str() {
        "shift" => sync_core::models::CorrectionMode::Shift,
        _ => sync_core::models::CorrectionMode::Trim,
    }
}
