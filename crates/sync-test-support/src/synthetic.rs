//! Synthetic per-channel timestamp generation, for injecting realistic
//! streams into a pipeline or sync-engine test without real hardware.

/// Evenly spaced timestamps starting at `start`, `spacing` ns apart.
#[must_use]
pub fn evenly_spaced(start: u64, count: usize, spacing: u64) -> Vec<u64> {
    (0..count as u64).map(|i| start + i * spacing).collect()
}

/// Pack timestamps into 8-byte little-endian blocks, the wire format a
/// stream socket delivers to a `StreamWorker`.
#[must_use]
pub fn pack_le(timestamps: &[u64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(timestamps.len() * 8);
    for ts in timestamps {
        buf.extend_from_slice(&ts.to_le_bytes());
    }
    buf
}
