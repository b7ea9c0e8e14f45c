//! `tagrecorder` - Records every tag a USB RFID reader sees
//!
//! This library provides the tag buffer codec, the reader driver seam, the
//! poll loop that records reads into a local database, and the live
//! terminal view of new and returning tags.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod protocol;
pub mod reader;
pub mod storage;
pub mod tag;
pub mod view;

pub use config::Config;
pub use driver::{NativeDriver, SimulatedDriver, TagDriver};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use monitor::{MonitorHandle, MonitorSummary, ReaderEvent, ReaderMonitor};
pub use reader::Reader;
pub use storage::{RecordOutcome, Storage, StorageStats};
pub use tag::{TagRead, TagRecord};
pub use view::TagView;
