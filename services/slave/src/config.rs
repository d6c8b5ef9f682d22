//! Slave configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides.
//! Default config path: `/etc/tc-sync/slave.toml`.
//!
//! Unlike the Master, the Slave does not configure its own channel set
//! or duration — those arrive in the trigger envelope (spec.md §4.4.3).
//!
//! # Required fields
//! - `tc.address`
//! - `dlt.command_address`
//! - `peer.master_control_addr`
//! - `peer.master_file_addr`

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct SlaveConfig {
    pub tc: TcConfig,
    pub dlt: DltConfig,
    pub peer: PeerConfig,
    pub output: OutputConfig,
    /// Sub-acquisition width in picoseconds. Not carried by the trigger
    /// envelope (spec.md §6 only transmits `duration` and `channels`),
    /// so both peers must be configured with the same value.
    pub width_ps: u64,
}

#[derive(Debug, Clone)]
pub struct TcConfig {
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct DltConfig {
    pub command_address: String,
    pub stream_address: String,
    pub base_port: u16,
}

#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Where the Master's control link listens; the Slave connects out
    /// (spec.md §4.1's "Initiator" column names message direction, not
    /// socket ownership — Master binds both sockets).
    pub master_control_addr: String,
    pub master_file_addr: String,
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub directory: String,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    tc: Option<RawTcConfig>,
    dlt: Option<RawDltConfig>,
    peer: Option<RawPeerConfig>,
    output: Option<RawOutputConfig>,
    width_ps: Option<u64>,
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
struct RawPeerConfig {
    master_control_addr: Option<String>,
    master_file_addr: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOutputConfig {
    directory: Option<String>,
}

pub fn load_config_from_path(path: &Path) -> Result<SlaveConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

pub fn load_config() -> Result<SlaveConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/tc-sync/slave.toml"))
}

pub fn load_config_from_str(toml_str: &str) -> Result<SlaveConfig, ConfigError> {
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

    let raw_peer = raw.peer.ok_or_else(|| ConfigError::MissingField("peer".to_owned()))?;
    let peer = PeerConfig {
        master_control_addr: raw_peer
            .master_control_addr
            .ok_or_else(|| ConfigError::MissingField("peer.master_control_addr".to_owned()))?,
        master_file_addr: raw_peer
            .master_file_addr
            .ok_or_else(|| ConfigError::MissingField("peer.master_file_addr".to_owned()))?,
    };

    let output = match raw.output {
        Some(o) => OutputConfig {
            directory: o.directory.unwrap_or_else(|| ".".to_owned()),
        },
        None => OutputConfig { directory: ".".to_owned() },
    };

    let width_ps = raw.width_ps.unwrap_or(1_000_000);

    Ok(SlaveConfig { tc, dlt, peer, output, width_ps })
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {s}"),
            ConfigError::Parse(s) => write!(f, "Parse error: {s}"),
            ConfigError::MissingField(s) => write!(f, "Missing required field: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}
