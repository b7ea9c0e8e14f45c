//! Decoding of the reader's raw tag buffer.
//!
//! `SWHid_GetTagBuf` fills a buffer with `tag_count` variable-length records,
//! each laid out as:
//!
//! ```text
//! [L][type][antenna][id bytes ...][rssi]
//!  ^  \______________ L bytes ______/
//! ```
//!
//! `L` counts the bytes following it, so the tag identifier is `L - 3` bytes
//! long and the next record starts `L + 1` bytes after the current one.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

pub use tagrecorder_swhid::TAG_BUFFER_SIZE;

/// RSSI byte mapped to 0 %.
pub const RSSI_MIN: u8 = 0x82;

/// RSSI byte mapped to 100 %.
pub const RSSI_MAX: u8 = 0xA0;

/// Smallest valid packet length: type, antenna, one id byte and RSSI.
pub const MIN_RECORD_LENGTH: u8 = 4;

/// Bytes in a record besides the tag identifier.
const RECORD_OVERHEAD: usize = 3;

/// Errors produced while decoding a tag buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A packet length byte is too small to hold a record.
    #[error("record {index} has packet length {length}, need at least 4")]
    RecordTooShort {
        /// Zero-based record index.
        index: usize,
        /// The packet length byte.
        length: u8,
    },

    /// A record extends past the end of the data the driver returned.
    #[error("record {index} at offset {offset} needs {needed} bytes, only {available} available")]
    Truncated {
        /// Zero-based record index.
        index: usize,
        /// Offset of the record's length byte.
        offset: usize,
        /// Bytes the record needs, including its length byte.
        needed: usize,
        /// Bytes left in the buffer from `offset`.
        available: usize,
    },

    /// A tag identifier does not fit a single packet.
    #[error("tag identifier of {0} bytes cannot be encoded in one record")]
    RecordIdTooLong(usize),

    /// A hex dump contained something other than byte values.
    #[error("invalid hex dump: {0}")]
    InvalidHex(String),

    /// A declared byte length is longer than the dump it describes.
    #[error("declared length {length} exceeds the {available} bytes given")]
    LengthExceedsDump {
        /// The declared length.
        length: usize,
        /// Bytes in the dump.
        available: usize,
    },
}

/// Result of a `SWHid_GetTagBuf` call, by return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadStatus {
    /// The buffer holds tag records (code 2).
    Tags,
    /// The read succeeded but no tags were present (code 1).
    Empty,
    /// The driver reported an error.
    Failed(i32),
}

impl ReadStatus {
    /// Map a driver return code.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            2 => Self::Tags,
            1 => Self::Empty,
            other => Self::Failed(other),
        }
    }

    /// The driver return code for this status.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Tags => 2,
            Self::Empty => 1,
            Self::Failed(code) => code,
        }
    }
}

/// One decoded record, before it is stamped and attributed to a reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTag {
    /// Tag type byte.
    pub tag_type: u8,
    /// Antenna the tag was read on.
    pub antenna: u8,
    /// Tag identifier bytes.
    pub tag_id: Vec<u8>,
    /// Raw signal strength byte.
    pub rssi: u8,
}

/// Map an RSSI byte linearly onto 0-100 %.
///
/// Values below [`RSSI_MIN`] read as 0 %, values above [`RSSI_MAX`] as 100 %.
#[must_use]
pub fn rssi_percent(rssi: u8) -> f64 {
    if rssi < RSSI_MIN {
        return 0.0;
    }
    let span = f64::from(RSSI_MAX - RSSI_MIN);
    (f64::from(rssi - RSSI_MIN) / span * 100.0).min(100.0)
}

/// Iterator over the records of a tag buffer.
///
/// Yields at most `tag_count` items and stops after the first error.
#[derive(Debug, Clone)]
pub struct TagRecords<'a> {
    data: &'a [u8],
    offset: usize,
    index: usize,
    remaining: usize,
    failed: bool,
}

impl TagRecords<'_> {
    /// Offset just past the last record consumed.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for TagRecords<'_> {
    type Item = Result<RawTag, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let index = self.index;
        self.index += 1;

        let offset = self.offset;
        let available = self.data.len().saturating_sub(offset);
        let Some(&length) = self.data.get(offset) else {
            self.failed = true;
            return Some(Err(ProtocolError::Truncated {
                index,
                offset,
                needed: 1,
                available,
            }));
        };

        if length < MIN_RECORD_LENGTH {
            self.failed = true;
            return Some(Err(ProtocolError::RecordTooShort { index, length }));
        }

        let needed = usize::from(length) + 1;
        if needed > available {
            self.failed = true;
            return Some(Err(ProtocolError::Truncated {
                index,
                offset,
                needed,
                available,
            }));
        }

        let packet = &self.data[offset + 1..offset + needed];
        let rssi_at = packet.len() - 1;
        let tag = RawTag {
            tag_type: packet[0],
            antenna: packet[1],
            tag_id: packet[2..rssi_at].to_vec(),
            rssi: packet[rssi_at],
        };
        trace!(
            index,
            offset,
            length,
            raw = %format_hex_dump(&self.data[offset..offset + needed]),
            "Decoded tag record"
        );

        self.offset += needed;
        Some(Ok(tag))
    }
}

impl std::iter::FusedIterator for TagRecords<'_> {}

/// Iterate over `tag_count` records at the start of `data`.
#[must_use]
pub fn records(data: &[u8], tag_count: usize) -> TagRecords<'_> {
    TagRecords {
        data,
        offset: 0,
        index: 0,
        remaining: tag_count,
        failed: false,
    }
}

/// The outcome of decoding one tag buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBuffer {
    /// Records decoded before any error.
    pub tags: Vec<RawTag>,
    /// The error that stopped decoding, if any.
    pub error: Option<ProtocolError>,
    /// Bytes consumed by the decoded records.
    pub consumed: usize,
}

impl ParsedBuffer {
    /// Whether every declared record decoded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Decode the records of a tag buffer.
///
/// `tag_length` is the byte count the driver reported; when it falls within
/// the buffer it bounds decoding, otherwise the whole buffer is used.
#[must_use]
pub fn parse_tag_buffer(data: &[u8], tag_length: usize, tag_count: usize) -> ParsedBuffer {
    let region = if tag_length > 0 && tag_length <= data.len() {
        &data[..tag_length]
    } else {
        if tag_length > data.len() {
            warn!(
                tag_length,
                buffer = data.len(),
                "Driver reported more tag bytes than the buffer holds"
            );
        }
        data
    };

    let mut iter = records(region, tag_count);
    let mut parsed = ParsedBuffer::default();
    for result in iter.by_ref() {
        match result {
            Ok(tag) => parsed.tags.push(tag),
            Err(e) => {
                parsed.error = Some(e);
                break;
            }
        }
    }
    parsed.consumed = iter.offset();

    if parsed.error.is_none() && tag_length > parsed.consumed && tag_length <= data.len() {
        trace!(
            trailing = tag_length - parsed.consumed,
            "Ignoring bytes after the last declared record"
        );
    }
    debug!(
        declared = tag_count,
        decoded = parsed.tags.len(),
        consumed = parsed.consumed,
        "Parsed tag buffer"
    );
    parsed
}

/// Decode a dump whose record count is unknown.
///
/// Walks the length bytes to count the records that start inside `data`,
/// then decodes them as [`parse_tag_buffer`] would.
#[must_use]
pub fn parse_dump(data: &[u8]) -> ParsedBuffer {
    let mut count = 0;
    let mut offset = 0;
    while let Some(&length) = data.get(offset) {
        count += 1;
        offset += usize::from(length) + 1;
    }
    parse_tag_buffer(data, data.len(), count)
}

/// Decode a captured dump with an optional declared length and record count.
///
/// A length of `None` or `Some(0)` means unknown and covers the whole dump,
/// matching what [`parse_tag_buffer`] does for a zero length. Without a
/// count, every record that starts inside the covered bytes is decoded.
///
/// # Errors
///
/// Returns [`ProtocolError::LengthExceedsDump`] if the declared length is
/// longer than the dump.
pub fn decode_dump(
    bytes: &[u8],
    length: Option<usize>,
    count: Option<usize>,
) -> Result<ParsedBuffer, ProtocolError> {
    let length = match length {
        Some(0) | None => bytes.len(),
        Some(length) if length > bytes.len() => {
            return Err(ProtocolError::LengthExceedsDump {
                length,
                available: bytes.len(),
            })
        }
        Some(length) => length,
    };
    Ok(match count {
        Some(count) => parse_tag_buffer(bytes, length, count),
        None => parse_dump(&bytes[..length]),
    })
}

/// Append the wire form of `tag` to `out`.
///
/// # Errors
///
/// Returns [`ProtocolError::RecordIdTooLong`] if the identifier would push
/// the packet length past 255, and [`ProtocolError::RecordTooShort`] for an
/// empty identifier.
pub fn encode_record(tag: &RawTag, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    let length = u8::try_from(tag.tag_id.len() + RECORD_OVERHEAD)
        .map_err(|_| ProtocolError::RecordIdTooLong(tag.tag_id.len()))?;
    if length < MIN_RECORD_LENGTH {
        return Err(ProtocolError::RecordTooShort { index: 0, length });
    }
    out.push(length);
    out.push(tag.tag_type);
    out.push(tag.antenna);
    out.extend_from_slice(&tag.tag_id);
    out.push(tag.rssi);
    Ok(())
}

fn hex_token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"(?i)^(?:0x)?([0-9a-f]+)$").expect("Invalid regex pattern"))
}

/// Parse a byte dump such as `0x0f 0x1 0x2`, `0f:01:02` or `0f0102`.
///
/// Tokens are split on whitespace, commas, colons and dashes. A `0x`-prefixed
/// token is one byte; an unprefixed token is read as consecutive byte pairs.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidHex`] for a token that is not hex, a
/// prefixed value above `0xff`, or an unprefixed token of odd length.
pub fn parse_hex_dump(text: &str) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = Vec::new();
    for token in text
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | ':' | '-'))
        .filter(|t| !t.is_empty())
    {
        let caps = hex_token()
            .captures(token)
            .ok_or_else(|| ProtocolError::InvalidHex(token.to_string()))?;
        let digits = &caps[1];

        let prefixed = token.len() != digits.len();
        if prefixed {
            let value = u8::from_str_radix(digits, 16)
                .map_err(|_| ProtocolError::InvalidHex(token.to_string()))?;
            bytes.push(value);
        } else {
            let decoded =
                hex::decode(digits).map_err(|_| ProtocolError::InvalidHex(token.to_string()))?;
            bytes.extend(decoded);
        }
    }
    Ok(bytes)
}

/// Render bytes the way raw buffers appear in reader logs: `0x5 0x1 0x9a`.
#[must_use]
pub fn format_hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:#x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
