//! The fallback collector (C3): queries the TC directly when the DLT is
//! unresponsive, producing the same record shape C2's merger would
//! (spec.md §4.3).

use tc_scpi::scpi;

use crate::models::{ChannelId, ChannelRecord};
use crate::pipeline::TcLink;

/// For each requested channel, query the record count then fetch values
/// in one semicolon-delimited reply, tolerating malformed tokens by
/// skipping and logging them (never aborting the session). Per spec.md
/// §9's resolution of the sub-acquisition-normalization open question,
/// no `i * period` correction is applied here: fallback mode treats each
/// channel's full reply as a single pseudo-batch.
pub async fn collect<T: TcLink>(tc: &mut T, channels: &[ChannelId]) -> Vec<ChannelRecord> {
    let mut records = Vec::new();
    for &channel in channels {
        let count = match tc.send(&scpi::data_count_query(channel)).await {
            Ok(raw) => scpi::parse_tolerant_u64(&raw).unwrap_or(0),
            Err(e) => {
                tracing::warn!(channel, error = %e, "fallback: count query failed");
                0
            }
        };
        if count == 0 {
            continue;
        }
        let raw_values = match tc.send(&scpi::data_value_query(channel)).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(channel, error = %e, "fallback: value query failed");
                continue;
            }
        };
        for ts in scpi::parse_tolerant_u64_list(&raw_values) {
            records.push(ChannelRecord::new(channel, ts));
        }
    }
    // The merged-file invariant (spec.md §8: non-decreasing timestamps
    // across the whole file) still applies in fallback mode even though
    // there's no real merger here.
    records.sort_by_key(|r| r.timestamp);
    records
}
