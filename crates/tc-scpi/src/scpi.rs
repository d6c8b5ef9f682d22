//! SCPI-style command tokens consumed from the Time Controller (TC).
//!
//! Tokens are exact ASCII, newline-terminated, case-preserved (spec §6).
//! Parsing helpers are tolerant: an individual malformed value is skipped
//! and logged, never treated as a reason to abort the whole session.

use std::fmt;

/// A duration expressed in picoseconds, as the TC's `REC:PWID`/`REC:PPER`
/// tokens require. Kept as a distinct type from [`Nanoseconds`] so the two
/// units the source mixes (wall-clock ns vs. sub-acquisition-width ps)
/// can never be silently swapped (spec §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Picoseconds(pub u64);

/// A duration or instant expressed in nanoseconds, the unit Timestamps and
/// TriggerInstants are carried in end-to-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Nanoseconds(pub u64);

impl Nanoseconds {
    #[must_use]
    pub fn as_picoseconds(self) -> Picoseconds {
        Picoseconds(self.0.saturating_mul(1_000))
    }
}

impl fmt::Display for Picoseconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The mandatory guard between successive sub-acquisitions: `period = width
/// + 40 ns` (spec §4.2.1).
pub const GUARD: Nanoseconds = Nanoseconds(40);

/// Compute the sub-acquisition period for a requested width, applying the
/// fixed 40 ns guard.
#[must_use]
pub fn period_for_width(width: Picoseconds) -> Picoseconds {
    Picoseconds(width.0 + GUARD.as_picoseconds().0)
}

/// `NATURAL_INACTIVITY`: how long an infinite-run channel may go without a
/// new sub-acquisition before quiescence declares it done (spec §4.2.7).
pub const NATURAL_INACTIVITY: std::time::Duration = std::time::Duration::from_secs(1);

/// Hard cap on the total time the quiescence loop may run (spec §4.2.7).
pub const MAX_TOTAL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// The 1 Hz poll interval used while waiting for quiescence.
pub const QUIESCENCE_POLL: std::time::Duration = std::time::Duration::from_secs(1);

/// `MAX_ITERATIONS = floor(timeout / SLEEP) + 10` for a given timeout.
#[must_use]
pub fn max_iterations(timeout: std::time::Duration, sleep: std::time::Duration) -> u64 {
    (timeout.as_secs_f64() / sleep.as_secs_f64()).floor() as u64 + 10
}

// ---------------------------------------------------------------------------
// Command builders
// ---------------------------------------------------------------------------

#[must_use]
pub fn idn_query() -> &'static str {
    "*IDN?"
}

#[must_use]
pub fn ref_link_none(channel: u32) -> String {
    format!("RAW{channel}:REF:LINK NONE")
}

#[must_use]
pub fn errors_clear(channel: u32) -> String {
    format!("RAW{channel}:ERRORS:CLEAR")
}

#[must_use]
pub fn errors_query(channel: u32) -> String {
    format!("RAW{channel}:ERRORS?")
}

#[must_use]
pub fn send_enable(channel: u32, on: bool) -> String {
    format!("RAW{channel}:SEND {}", if on { "ON" } else { "OFF" })
}

#[must_use]
pub fn trig_arm_mode_manual() -> &'static str {
    "REC:TRIG:ARM:MODE MANUal"
}

#[must_use]
pub fn rec_enable(on: bool) -> String {
    format!("REC:ENABle {}", if on { "ON" } else { "OFF" })
}

#[must_use]
pub fn rec_stop() -> &'static str {
    "REC:STOP"
}

#[must_use]
pub fn rec_num_inf() -> &'static str {
    "REC:NUM INF"
}

#[must_use]
pub fn rec_pwid_pper(width: Picoseconds, period: Picoseconds) -> String {
    format!("REC:PWID {width};PPER {period}")
}

#[must_use]
pub fn rec_play() -> &'static str {
    "REC:PLAY"
}

#[must_use]
pub fn rec_stage_query() -> &'static str {
    "REC:STAGe?"
}

#[must_use]
pub fn rec_number_query() -> &'static str {
    "REC:NUMber?"
}

#[must_use]
pub fn data_count_query(channel: u32) -> String {
    format!("RAW{channel}:DATA:COUNt?")
}

#[must_use]
pub fn data_value_query(channel: u32) -> String {
    format!("RAW{channel}:DATA:VALue?")
}

#[must_use]
pub fn data_value_query_at(channel: u32, index: u64) -> String {
    format!("RAW{channel}:DATA:VALue? {index}")
}

// ---------------------------------------------------------------------------
// Recording stage
// ---------------------------------------------------------------------------

/// The `REC:STAGe?` response, used by the quiescence poll (spec §4.2.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecStage {
    Playing,
    Stopped,
    Other(String),
}

#[must_use]
pub fn parse_rec_stage(raw: &str) -> RecStage {
    match raw.trim().to_ascii_uppercase().as_str() {
        "PLAY" | "PLAYING" => RecStage::Playing,
        "STOP" | "STOPPED" => RecStage::Stopped,
        other if other.is_empty() => RecStage::Other(String::new()),
        other => RecStage::Other(other.to_owned()),
    }
}

// ---------------------------------------------------------------------------
// Tolerant response parsing
// ---------------------------------------------------------------------------

/// Parse a `;`-delimited list of unsigned integers, skipping (and logging)
/// any token that's empty, whitespace-only, or fails to parse. Never
/// returns an error — per spec §4.3, a single bad record must not abort
/// the session.
#[must_use]
pub fn parse_tolerant_u64_list(raw: &str) -> Vec<u64> {
    let mut out = Vec::new();
    for token in raw.split(';') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed.parse::<u64>() {
            Ok(v) => out.push(v),
            Err(_) => {
                tracing::warn!(token = trimmed, "skipping malformed TC data value");
            }
        }
    }
    out
}

/// Parse a single tolerant integer reply (e.g. `RAW<c>:DATA:COUNt?`),
/// returning `None` (and logging) rather than erroring on a bad token.
#[must_use]
pub fn parse_tolerant_u64(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(token = trimmed, "skipping malformed TC integer reply");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A failed SCPI round trip: no reply within the timeout, or the TC
/// returned a non-empty error token (spec §7: TcError).
#[derive(Debug, thiserror::Error)]
pub enum TcError {
    #[error("TC command timed out: {0}")]
    Timeout(String),
    #[error("TC returned an error for {command}: {detail}")]
    Device { command: String, detail: String },
    #[error("I/O error talking to TC: {0}")]
    Io(String),
}
