//! Fixed-width binary codecs for the enhanced-trace streams.
//!
//! All integers are big-endian; records sit back-to-back with no framing,
//! header, or count. Three streams: last-use and unreachable (20-byte
//! records), IID updates (12-byte records). Decoders are provided for
//! downstream consumers of the enhanced trace and for round-trip checks.

use std::io::{self, Write};

use crate::record::{IidUpdateRecord, ObjectId};
use crate::source_loc::SourceLocId;

/// Byte width of one last-use or unreachable record.
pub const TIMED_SITE_RECORD_LEN: usize = 20;

/// Byte width of one IID-update record.
pub const IID_UPDATE_RECORD_LEN: usize = 12;

// ---------------------------------------------------------------------------
// TimedSiteRecord — wire form of last-use and unreachable entries
// ---------------------------------------------------------------------------

/// One `{ object, time, site }` entry of the last-use or unreachable stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedSiteRecord {
    pub object_id: ObjectId,
    pub time: u64,
    pub site: SourceLocId,
}

pub fn write_timed_site(out: &mut dyn Write, record: &TimedSiteRecord) -> io::Result<()> {
    out.write_all(&record.object_id.to_be_bytes())?;
    out.write_all(&record.time.to_be_bytes())?;
    out.write_all(&record.site.file_id.to_be_bytes())?;
    out.write_all(&record.site.iid.to_be_bytes())?;
    Ok(())
}

/// Decode a whole last-use or unreachable stream. A trailing partial record
/// is corruption, not padding.
pub fn decode_timed_site_stream(bytes: &[u8]) -> io::Result<Vec<TimedSiteRecord>> {
    if bytes.len() % TIMED_SITE_RECORD_LEN != 0 {
        return Err(truncated(bytes.len(), TIMED_SITE_RECORD_LEN));
    }
    let mut records = Vec::with_capacity(bytes.len() / TIMED_SITE_RECORD_LEN);
    for chunk in bytes.chunks_exact(TIMED_SITE_RECORD_LEN) {
        records.push(TimedSiteRecord {
            object_id: be_i32(&chunk[0..4]),
            time: be_u64(&chunk[4..12]),
            site: SourceLocId::new(be_i32(&chunk[12..16]), be_i32(&chunk[16..20])),
        });
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// IID-update records
// ---------------------------------------------------------------------------

/// The sort key (`creation_time`) is not emitted; the wire record is only
/// `{ object, site }`.
pub fn write_iid_update(out: &mut dyn Write, record: &IidUpdateRecord) -> io::Result<()> {
    out.write_all(&record.object_id.to_be_bytes())?;
    out.write_all(&record.new_site.file_id.to_be_bytes())?;
    out.write_all(&record.new_site.iid.to_be_bytes())?;
    Ok(())
}

pub fn decode_iid_update_stream(bytes: &[u8]) -> io::Result<Vec<(ObjectId, SourceLocId)>> {
    if bytes.len() % IID_UPDATE_RECORD_LEN != 0 {
        return Err(truncated(bytes.len(), IID_UPDATE_RECORD_LEN));
    }
    let mut records = Vec::with_capacity(bytes.len() / IID_UPDATE_RECORD_LEN);
    for chunk in bytes.chunks_exact(IID_UPDATE_RECORD_LEN) {
        records.push((
            be_i32(&chunk[0..4]),
            SourceLocId::new(be_i32(&chunk[4..8]), be_i32(&chunk[8..12])),
        ));
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn truncated(len: usize, record_len: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("stream length {len} is not a multiple of the {record_len}-byte record width"),
    )
}

fn be_i32(bytes: &[u8]) -> i32 {
    i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn be_u64(bytes: &[u8]) -> u64 {
    u64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
