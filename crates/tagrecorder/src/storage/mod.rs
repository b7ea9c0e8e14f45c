//! Storage layer for tagrecorder.
//!
//! This module provides `SQLite`-based persistent storage for tag reads.
//! Each tag identifier has a single row tracking when it was first and last
//! seen, its most recent signal, and how often it has been read.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::tag::{TagRead, TagRecord};

/// Columns selected for every [`TagRecord`] query, in `row_to_record` order.
const RECORD_COLUMNS: &str = "tag_id, first_seen, last_seen, tag_type, antenna, rssi, \
                              rssi_percent, reader_id, read_count";

/// Whether a recorded read introduced a new tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The tag had never been seen before.
    New,
    /// The tag already existed and its row was refreshed.
    Updated,
}

/// Storage engine for tag reads.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        // WAL lets `tagrec tags` read while `tagrec watch` is writing
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a tag read.
    ///
    /// A new tag gets a fresh row; a known tag keeps its `first_seen` and
    /// reader, and has its last-seen time, signal and antenna refreshed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn record(&self, read: &TagRead) -> Result<RecordOutcome> {
        // Fixed-width timestamps keep text ordering chronological
        let timestamp = read.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true);

        let updated = self.conn.execute(
            r"
            UPDATE tags
            SET last_seen = ?1, tag_type = ?2, antenna = ?3, rssi = ?4,
                rssi_percent = ?5, read_count = read_count + 1
            WHERE tag_id = ?6
            ",
            params![
                timestamp,
                read.tag_type,
                read.antenna,
                read.rssi,
                read.rssi_percent,
                read.tag_id,
            ],
        )?;

        if updated > 0 {
            debug!(tag_id = %read.tag_id, "Updated existing tag");
            return Ok(RecordOutcome::Updated);
        }

        self.conn.execute(
            r"
            INSERT INTO tags (
                tag_id, first_seen, last_seen, tag_type, antenna,
                rssi, rssi_percent, reader_id, read_count
            ) VALUES (?1, ?2, ?2, ?3, ?4, ?5, ?6, ?7, 1)
            ",
            params![
                read.tag_id,
                timestamp,
                read.tag_type,
                read.antenna,
                read.rssi,
                read.rssi_percent,
                read.reader_id,
            ],
        )?;

        debug!(tag_id = %read.tag_id, "Inserted new tag");
        Ok(RecordOutcome::New)
    }

    /// Get a tag by its identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, tag_id: &str) -> Result<Option<TagRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM tags WHERE tag_id = ?1");
        let record = self
            .conn
            .query_row(&sql, [tag_id], Self::row_to_record)
            .optional()?;
        Ok(record)
    }

    /// Get every tag, most recently seen first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn all_tags(&self) -> Result<Vec<TagRecord>> {
        self.recent(usize::MAX)
    }

    /// Get the most recently seen tags.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent(&self, limit: usize) -> Result<Vec<TagRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM tags ORDER BY last_seen DESC, tag_id ASC LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map([limit_i64], Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Count distinct tags in storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete every tag. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn clear(&self) -> Result<usize> {
        let affected = self.conn.execute("DELETE FROM tags", [])?;
        info!("Cleared {} tags from database", affected);
        Ok(affected)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let (total_tags, total_reads, first, last): (i64, i64, Option<String>, Option<String>) =
            self.conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(read_count), 0), MIN(first_seen), MAX(last_seen) FROM tags",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_tags,
            total_reads,
            first_read: first.as_deref().and_then(parse_timestamp),
            last_read: last.as_deref().and_then(parse_timestamp),
            db_size_bytes,
        })
    }

    /// Convert a database row to a `TagRecord`.
    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<TagRecord> {
        let read_count: i64 = row.get(8)?;

        Ok(TagRecord {
            tag_id: row.get(0)?,
            first_seen: timestamp_column(row, 1)?,
            last_seen: timestamp_column(row, 2)?,
            tag_type: row.get(3)?,
            antenna: row.get(4)?,
            rssi: row.get(5)?,
            rssi_percent: row.get(6)?,
            reader_id: row.get(7)?,
            read_count: u64::try_from(read_count).unwrap_or(0),
        })
    }
}

/// Read an RFC 3339 text column, failing the row if it does not parse.
fn timestamp_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of distinct tags stored.
    pub total_tags: i64,
    /// Reads recorded across all tags.
    pub total_reads: i64,
    /// Earliest first-seen time.
    pub first_read: Option<DateTime<Utc>>,
    /// Latest last-seen time.
    pub last_read: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::protocol::RawTag;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    fn read(id: &[u8], rssi: u8) -> TagRead {
        TagRead::from_raw(
            &RawTag {
                tag_type: 0x01,
                antenna: 0x01,
                tag_id: id.to_vec(),
                rssi,
            },
            "default",
        )
    }

    #[test]
    fn test_open_in_memory() {
        let storage = Storage::open_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_record_new_and_get() {
        let storage = create_test_storage();
        let tag = read(&[0xE2, 0x00, 0x01], 0x91);

        let outcome = storage.record(&tag).unwrap();
        assert_eq!(outcome, RecordOutcome::New);
        assert_eq!(outcome, RecordOutcome::New);

        let stored = storage.get("e20001").unwrap().unwrap();
        assert_eq!(stored.tag_id, "e20001");
        assert_eq!(stored.rssi, 0x91);
        assert_eq!(stored.read_count, 1);
        assert_eq!(stored.first_seen, stored.last_seen);
        assert_eq!(stored.reader_id, "default");
    }

    #[test]
    fn test_record_existing_updates_row() {
        let storage = create_test_storage();
        let first = read(&[0x0A], 0x85);
        storage.record(&first).unwrap();

        let mut second = read(&[0x0A], 0x9F);
        second.antenna = 0x02;
        second.reader_id = "other".to_string();
        second.timestamp = first.timestamp + Duration::seconds(5);

        let outcome = storage.record(&second).unwrap();
        assert_eq!(outcome, RecordOutcome::Updated);

        let stored = storage.get("0a").unwrap().unwrap();
        assert_eq!(stored.read_count, 2);
        assert_eq!(stored.rssi, 0x9F);
        assert_eq!(stored.antenna, 0x02);
        assert!(stored.last_seen > stored.first_seen);
        // first_seen and the recording reader stay with the original read
        assert_eq!(stored.reader_id, "default");
        assert_eq!(storage.count().unwrap(), 1);
    }

    #[test]
    fn test_get_nonexistent() {
        let storage = create_test_storage();
        assert!(storage.get("ffff").unwrap().is_none());
    }

    #[test]
    fn test_all_tags_newest_first() {
        let storage = create_test_storage();
        let base = Utc::now();

        for (i, id) in [[0x01u8], [0x02], [0x03]].iter().enumerate() {
            let mut tag = read(id, 0x90);
            tag.timestamp = base + Duration::seconds(i64::try_from(i).unwrap());
            storage.record(&tag).unwrap();
        }

        let mut again = read(&[0x01], 0x90);
        again.timestamp = base + Duration::seconds(10);
        storage.record(&again).unwrap();

        let ids: Vec<String> = storage
            .all_tags()
            .unwrap()
            .into_iter()
            .map(|r| r.tag_id)
            .collect();
        assert_eq!(ids, vec!["01", "03", "02"]);
    }

    #[test]
    fn test_recent_limit() {
        let storage = create_test_storage();
        for i in 0..5u8 {
            storage.record(&read(&[i], 0x90)).unwrap();
        }
        assert_eq!(storage.recent(3).unwrap().len(), 3);
    }

    #[test]
    fn test_count_and_clear() {
        let storage = create_test_storage();
        assert_eq!(storage.count().unwrap(), 0);

        storage.record(&read(&[0x01], 0x90)).unwrap();
        storage.record(&read(&[0x02], 0x90)).unwrap();
        storage.record(&read(&[0x02], 0x90)).unwrap();
        assert_eq!(storage.count().unwrap(), 2);

        assert_eq!(storage.clear().unwrap(), 2);
        assert_eq!(storage.count().unwrap(), 0);

        // A cleared tag counts as new again
        assert_eq!(
            storage.record(&read(&[0x01], 0x90)).unwrap(),
            RecordOutcome::New
        );
    }

    #[test]
    fn test_stats_empty() {
        let storage = create_test_storage();
        let stats = storage.stats().unwrap();

        assert_eq!(stats.total_tags, 0);
        assert_eq!(stats.total_reads, 0);
        assert!(stats.first_read.is_none());
        assert!(stats.last_read.is_none());
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[test]
    fn test_stats_with_reads() {
        let storage = create_test_storage();
        storage.record(&read(&[0x01], 0x90)).unwrap();
        storage.record(&read(&[0x01], 0x90)).unwrap();
        storage.record(&read(&[0x02], 0x90)).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.total_tags, 2);
        assert_eq!(stats.total_reads, 3);
        assert!(stats.first_read.is_some());
        assert!(stats.last_read >= stats.first_read);
    }

    #[test]
    fn test_open_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tags.db");

        let storage = Storage::open(&path).unwrap();
        storage.record(&read(&[0x01], 0x90)).unwrap();
        assert_eq!(storage.path(), path.as_path());
        drop(storage);

        let reopened = Storage::open(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
        assert!(reopened.stats().unwrap().db_size_bytes > 0);
    }

    #[test]
    fn test_unparseable_timestamp_fails_the_row() {
        let storage = create_test_storage();
        let tag = read(&[0x01], 0x90);
        storage.record(&tag).unwrap();
        storage
            .conn
            .execute(
                "UPDATE tags SET first_seen = 'garbage' WHERE tag_id = ?1",
                [&tag.tag_id],
            )
            .unwrap();

        assert!(storage.get(&tag.tag_id).is_err());
        assert!(storage.all_tags().is_err());
    }
}
