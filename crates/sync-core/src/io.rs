//! Merged-file codec: the binary and textual dump formats a session
//! produces (spec.md §6), and lossless conversion between them.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;

use crate::models::ChannelRecord;

#[derive(Debug, thiserror::Error)]
pub enum IoCodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed textual record at line {line}: {content:?}")]
    MalformedLine { line: usize, content: String },
    #[error("truncated binary record at byte offset {offset}")]
    TruncatedBinary { offset: usize },
}

/// Write records as `[u64 timestamp_le][i32 channel_le]` pairs.
pub fn write_binary<W: Write>(writer: &mut W, records: &[ChannelRecord]) -> Result<(), IoCodecError> {
    for record in records {
        writer.write_all(&record.timestamp.to_le_bytes())?;
        #[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
        let channel = record.channel as i32;
        writer.write_all(&channel.to_le_bytes())?;
    }
    Ok(())
}

/// Parse a binary-encoded buffer of `[u64 timestamp_le][i32 channel_le]`
/// pairs. Any trailing bytes that don't form a full 12-byte record are
/// reported, never silently dropped.
pub fn read_binary<R: Read>(reader: &mut R) -> Result<Vec<ChannelRecord>, IoCodecError> {
    const RECORD_LEN: usize = 12;
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    let mut out = Vec::with_capacity(buf.len() / RECORD_LEN);
    let mut offset = 0;
    while offset < buf.len() {
        if buf.len() - offset < RECORD_LEN {
            return Err(IoCodecError::TruncatedBinary { offset });
        }
        let ts = u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap());
        let channel_raw = i32::from_le_bytes(buf[offset + 8..offset + 12].try_into().unwrap());
        #[allow(clippy::cast_sign_loss)]
        let channel = channel_raw as u32;
        out.push(ChannelRecord::new(channel, ts));
        offset += RECORD_LEN;
    }
    Ok(out)
}

/// Write records as UTF-8 `"<channel>;<timestamp>\n"` lines.
pub fn write_text<W: Write>(writer: &mut W, records: &[ChannelRecord]) -> Result<(), IoCodecError> {
    for record in records {
        writeln!(writer, "{};{}", record.channel, record.timestamp)?;
    }
    Ok(())
}

/// Parse `"<channel>;<timestamp>\n"` lines. A malformed line is reported
/// with its 1-based line number rather than silently skipped: unlike the
/// TC/DLT wire parsers (spec.md §4.3), a corrupted merged file is a
/// programming error, not an expected transient.
pub fn read_text<R: Read>(reader: R) -> Result<Vec<ChannelRecord>, IoCodecError> {
    let reader = BufReader::new(reader);
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let Some((channel_str, ts_str)) = line.split_once(';') else {
            return Err(IoCodecError::MalformedLine {
                line: idx + 1,
                content: line,
            });
        };
        let (Ok(channel), Ok(timestamp)) = (channel_str.parse(), ts_str.parse()) else {
            return Err(IoCodecError::MalformedLine {
                line: idx + 1,
                content: line,
            });
        };
        out.push(ChannelRecord::new(channel, timestamp));
    }
    Ok(out)
}

/// Write a binary merged file to `path`.
pub fn write_binary_file(path: &Path, records: &[ChannelRecord]) -> Result<(), IoCodecError> {
    let mut file = std::fs::File::create(path)?;
    write_binary(&mut file, records)
}

/// Write a textual merged file to `path`.
pub fn write_text_file(path: &Path, records: &[ChannelRecord]) -> Result<(), IoCodecError> {
    let mut file = std::fs::File::create(path)?;
    write_text(&mut file, records)
}

/// Read a binary merged file from `path`.
pub fn read_binary_file(path: &Path) -> Result<Vec<ChannelRecord>, IoCodecError> {
    let mut file = std::fs::File::open(path)?;
    read_binary(&mut file)
}
