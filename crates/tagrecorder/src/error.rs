//! Error types for tagrecorder.
//!
//! This module defines all error types used throughout the tagrecorder crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

use crate::protocol::ProtocolError;

/// The main error type for tagrecorder operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Reader Errors ===
    /// The vendor driver library could not be loaded.
    #[error("failed to initialize reader: {0}")]
    DriverLoad(#[from] tagrecorder_swhid::SwHidError),

    /// A driver call failed.
    #[error("driver error: {0}")]
    Driver(String),

    /// No reader is attached.
    #[error("no USB reader device found")]
    NoDevice,

    /// The reader at the given index could not be opened.
    #[error("failed to open reader at index {index}")]
    DeviceOpen {
        /// Device index passed to the driver.
        index: u32,
    },

    /// The reader refused to enter continuous read mode.
    #[error("failed to start reading")]
    StartRead,

    /// A tag buffer could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for tagrecorder operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new driver error.
    #[must_use]
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver(message.into())
    }

    /// Check if this error means no reader could be reached.
    #[must_use]
    pub fn is_device_unavailable(&self) -> bool {
        matches!(
            self,
            Self::DriverLoad(_) | Self::NoDevice | Self::DeviceOpen { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NoDevice;
        assert_eq!(err.to_string(), "no USB reader device found");

        let err = Error::driver("GetTagBuf returned -1");
        assert_eq!(err.to_string(), "driver error: GetTagBuf returned -1");
    }

    #[test]
    fn test_is_device_unavailable() {
        assert!(Error::NoDevice.is_device_unavailable());
        assert!(Error::DeviceOpen { index: 1 }.is_device_unavailable());
        assert!(!Error::StartRead.is_device_unavailable());
        assert!(!Error::driver("x").is_device_unavailable());
    }

    #[test]
    fn test_device_open_display() {
        let err = Error::DeviceOpen { index: 3 };
        assert!(err.to_string().contains("index 3"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: Error = ProtocolError::InvalidHex("zz".to_string()).into();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(err.to_string().contains("zz"));
    }

    #[test]
    fn test_from_driver_load_error() {
        let load = tagrecorder_swhid::SwHid::load("/nonexistent/libSWHidApi.so").unwrap_err();
        let err: Error = load.into();
        assert!(err.is_device_unavailable());
        assert!(err.to_string().starts_with("failed to initialize reader"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_database_migration_error_display() {
        let err = Error::DatabaseMigration {
            message: "version mismatch".to_string(),
        };
        assert!(err.to_string().contains("version mismatch"));
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "invalid interval".to_string(),
        };
        assert!(err.to_string().contains("invalid interval"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }
}
