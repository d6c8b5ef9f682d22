//! Core data types shared by the acquisition pipeline, the fallback
//! collector, and the synchronization engine.

/// A Time Controller input channel. Typically `1..=4`.
pub type ChannelId = u32;

/// A wall-clock or sub-acquisition-corrected instant, nanoseconds.
pub type Timestamp = u64;

/// One decoded event: which channel it arrived on, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ChannelRecord {
    pub channel: ChannelId,
    pub timestamp: Timestamp,
}

impl ChannelRecord {
    #[must_use]
    pub fn new(channel: ChannelId, timestamp: Timestamp) -> Self {
        Self { channel, timestamp }
    }
}

/// An opaque identifier DLT assigns to a running channel stream. Absent in
/// fallback mode, where there is no DLT-managed acquisition to name.
pub type AcquisitionId = String;

/// The first `p` (default 0.10) fraction of a merged `ChannelRecord`
/// sequence, floored at 10 records and capped at the full length.
#[derive(Debug, Clone, Default)]
pub struct PartialSample(pub Vec<ChannelRecord>);

impl PartialSample {
    /// Build the partial sample from a full sequence, spec.md §3/§9: record
    /// count, not elapsed time, determines the cut.
    #[must_use]
    pub fn from_full(records: &[ChannelRecord], fraction: f64) -> Self {
        let wanted = ((records.len() as f64) * fraction).ceil() as usize;
        let take = wanted.max(10).min(records.len());
        Self(records[..take].to_vec())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Which rewrite the synchronization engine applied to the Master dataset,
/// an open question the spec left to the implementation (spec.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrectionMode {
    #[default]
    Trim,
    Shift,
}

impl CorrectionMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CorrectionMode::Trim => "trim",
            CorrectionMode::Shift => "shift",
        }
    }
}

/// Summary statistics from comparing Master and Slave partial samples,
/// and the correction that was (or wasn't) applied as a result.
#[derive(Debug, Clone)]
pub struct OffsetReport {
    pub mean: f64,
    pub min: i64,
    pub max: i64,
    pub stddev: f64,
    pub relative_spread: f64,
    pub sample_count: usize,
    pub applied: Option<CorrectionMode>,
    pub corrected_file: Option<String>,
    pub insufficient_data: bool,
}
