//! Core tag types for tagrecorder.
//!
//! A [`TagRead`] is one sighting of a tag by the reader; a [`TagRecord`] is
//! what storage keeps about a tag across all of its sightings.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::{rssi_percent, RawTag};

/// Timestamp format used when showing reads to the user.
pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// A single tag sighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRead {
    /// When the tag was read.
    pub timestamp: DateTime<Utc>,

    /// Tag type byte reported by the reader.
    pub tag_type: u8,

    /// Antenna the tag was read on.
    pub antenna: u8,

    /// Tag identifier as lowercase hex, two digits per byte.
    pub tag_id: String,

    /// Raw signal strength byte.
    pub rssi: u8,

    /// Signal strength mapped onto 0-100.
    pub rssi_percent: f64,

    /// Identifier of the reader that produced this read.
    pub reader_id: String,
}

impl TagRead {
    /// Build a read from a decoded record, stamped with the current time.
    #[must_use]
    pub fn from_raw(raw: &RawTag, reader_id: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            tag_type: raw.tag_type,
            antenna: raw.antenna,
            tag_id: hex::encode(&raw.tag_id),
            rssi: raw.rssi,
            rssi_percent: rssi_percent(raw.rssi),
            reader_id: reader_id.into(),
        }
    }

    /// Tag type as `0x1` style hex.
    #[must_use]
    pub fn tag_type_hex(&self) -> String {
        format!("{:#x}", self.tag_type)
    }

    /// Antenna as `0x1` style hex.
    #[must_use]
    pub fn antenna_hex(&self) -> String {
        format!("{:#x}", self.antenna)
    }

    /// RSSI as `0x9a` style hex.
    #[must_use]
    pub fn rssi_hex(&self) -> String {
        format!("{:#x}", self.rssi)
    }

    /// Signal strength as a percentage with one decimal, e.g. `53.3%`.
    #[must_use]
    pub fn signal_label(&self) -> String {
        signal_label(self.rssi_percent)
    }

    /// Local time of the read, formatted for display.
    #[must_use]
    pub fn display_time(&self) -> String {
        display_time(self.timestamp)
    }
}

/// What storage knows about a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRecord {
    /// Tag identifier as lowercase hex.
    pub tag_id: String,
    /// First time the tag was read.
    pub first_seen: DateTime<Utc>,
    /// Most recent time the tag was read.
    pub last_seen: DateTime<Utc>,
    /// Tag type from the most recent read.
    pub tag_type: u8,
    /// Antenna from the most recent read.
    pub antenna: u8,
    /// RSSI byte from the most recent read.
    pub rssi: u8,
    /// Signal strength from the most recent read.
    pub rssi_percent: f64,
    /// Reader that first recorded the tag.
    pub reader_id: String,
    /// Number of reads recorded.
    pub read_count: u64,
}

impl TagRecord {
    /// Signal strength as a percentage with one decimal.
    #[must_use]
    pub fn signal_label(&self) -> String {
        signal_label(self.rssi_percent)
    }
}

fn signal_label(percent: f64) -> String {
    format!("{percent:.1}%")
}

/// Format a timestamp in local time for display.
#[must_use]
pub fn display_time(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format(DISPLAY_TIME_FORMAT)
        .to_string()
}
