//! `SQLite` schema definitions for tagrecorder.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// SQL statement to create the tags table.
///
/// One row per tag identifier; repeated reads update the row in place.
pub const CREATE_TAGS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS tags (
    tag_id TEXT PRIMARY KEY,
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    tag_type INTEGER NOT NULL,
    antenna INTEGER NOT NULL,
    rssi INTEGER NOT NULL,
    rssi_percent REAL NOT NULL,
    reader_id TEXT NOT NULL DEFAULT 'default',
    read_count INTEGER NOT NULL DEFAULT 1
)
";

/// SQL statement to create an index on `last_seen` for newest-first listing.
pub const CREATE_LAST_SEEN_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_tags_last_seen ON tags(last_seen DESC)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_TAGS_TABLE,
    CREATE_LAST_SEEN_INDEX,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.is_empty());
        }
    }

    #[test]
    fn test_create_tags_table_contains_required_columns() {
        assert!(CREATE_TAGS_TABLE.contains("tag_id TEXT PRIMARY KEY"));
        assert!(CREATE_TAGS_TABLE.contains("first_seen TEXT NOT NULL"));
        assert!(CREATE_TAGS_TABLE.contains("last_seen TEXT NOT NULL"));
        assert!(CREATE_TAGS_TABLE.contains("rssi INTEGER NOT NULL"));
        assert!(CREATE_TAGS_TABLE.contains("read_count INTEGER"));
    }
}
