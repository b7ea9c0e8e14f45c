//! The reader poll loop.
//!
//! [`ReaderMonitor`] brings the reader up, polls it on a fixed interval,
//! records every read in storage and reports what happened as
//! [`ReaderEvent`]s on a channel for the display to drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::driver::TagDriver;
use crate::error::{Error, Result};
use crate::reader::{ConnectStep, Reader};
use crate::storage::{RecordOutcome, Storage};
use crate::tag::TagRead;

/// Poll attempts between "still polling" debug lines.
const POLL_LOG_EVERY: u64 = 100;

/// Notifications from the poll loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent {
    /// A human-readable status line.
    Status(String),
    /// A tag that storage had never seen.
    NewTag(TagRead),
    /// A re-read of a tag already in storage.
    Seen(TagRead),
    /// Distinct tags now in storage.
    Count(i64),
}

/// A handle to stop a running monitor.
///
/// This is a lightweight, cloneable handle that can be used to stop the
/// monitor from another task.
#[derive(Debug, Clone, Default)]
pub struct MonitorHandle {
    stop_signal: Arc<AtomicBool>,
}

impl MonitorHandle {
    /// Create a new monitor handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the monitor to stop.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }
}

/// Totals for one monitor run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    /// Poll attempts made.
    pub polls: u64,
    /// Tag reads decoded.
    pub reads: u64,
    /// Reads that introduced a new tag.
    pub new_tags: u64,
}

/// Polls a reader and records what it sees.
#[derive(Debug)]
pub struct ReaderMonitor<D: TagDriver> {
    reader: Reader<D>,
    storage: Storage,
    device_index: u32,
    poll_interval: Duration,
    handle: MonitorHandle,
}

impl<D: TagDriver> ReaderMonitor<D> {
    /// Create a monitor for `reader`, recording into `storage`.
    pub fn new(reader: Reader<D>, storage: Storage, poll_interval: Duration) -> Self {
        Self {
            reader,
            storage,
            device_index: 0,
            poll_interval,
            handle: MonitorHandle::new(),
        }
    }

    /// Open the device at `index` instead of the first one.
    #[must_use]
    pub fn device_index(mut self, index: u32) -> Self {
        self.device_index = index;
        self
    }

    /// A handle that stops this monitor.
    #[must_use]
    pub fn handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    /// Bring the reader up and poll until stopped.
    ///
    /// Runs until the handle is stopped or the receiver is dropped. The
    /// reader is always disconnected before returning.
    ///
    /// # Errors
    ///
    /// Returns the bring-up error if the reader cannot be connected; the
    /// matching status line has already been sent.
    pub async fn run(mut self, tx: mpsc::Sender<ReaderEvent>) -> Result<MonitorSummary> {
        info!("Starting reader monitor");
        let result = self.poll(&tx).await;

        self.reader.disconnect();
        // The receiver may already be gone during shutdown
        let _ = tx
            .send(ReaderEvent::Status("Reader disconnected".to_string()))
            .await;

        if let Ok(summary) = &result {
            info!(
                polls = summary.polls,
                reads = summary.reads,
                new_tags = summary.new_tags,
                "Reader monitor stopped"
            );
        }
        result
    }

    async fn poll(&mut self, tx: &mpsc::Sender<ReaderEvent>) -> Result<MonitorSummary> {
        let mut summary = MonitorSummary::default();

        if !status(tx, "Initializing reader...").await {
            return Ok(summary);
        }
        if let Err(e) = self.bring_up(tx).await {
            status(tx, bring_up_message(&e)).await;
            return Err(e);
        }
        if !status(tx, "Waiting for tags...").await {
            return Ok(summary);
        }
        match self.storage.count() {
            Ok(count) => {
                if tx.send(ReaderEvent::Count(count)).await.is_err() {
                    return Ok(summary);
                }
            }
            Err(e) => error!(error = %e, "Error getting tag count"),
        }

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.handle.should_stop() {
            ticker.tick().await;
            if self.handle.should_stop() {
                break;
            }

            summary.polls += 1;
            if summary.polls % POLL_LOG_EVERY == 0 {
                debug!(polls = summary.polls, "Read attempt");
            }

            let tags = self.reader.read_tags();
            if !tags.is_empty() {
                info!(count = tags.len(), "Found {} tags in this read cycle", tags.len());
            }

            for tag in tags {
                summary.reads += 1;
                let Some(events) = self.record(tag) else {
                    continue;
                };
                if matches!(events.first(), Some(ReaderEvent::NewTag(_))) {
                    summary.new_tags += 1;
                }
                for event in events {
                    if tx.send(event).await.is_err() {
                        debug!("Event channel closed, stopping monitor");
                        return Ok(summary);
                    }
                }
            }
        }

        Ok(summary)
    }

    async fn bring_up(&mut self, tx: &mpsc::Sender<ReaderEvent>) -> Result<()> {
        let mut steps = Vec::new();
        let result = self.reader.connect(self.device_index, |step| steps.push(step));

        for step in steps {
            let message = match step {
                ConnectStep::Counted(count) => format!("Found {count} USB device(s)"),
                ConnectStep::Opened => "Reader connected".to_string(),
            };
            status(tx, message).await;
        }
        result.map(|_| ())
    }

    /// Store one read and build the events it produces.
    fn record(&self, tag: TagRead) -> Option<Vec<ReaderEvent>> {
        match self.storage.record(&tag) {
            Ok(RecordOutcome::New) => {
                info!(
                    tag_id = %tag.tag_id,
                    tag_type = %tag.tag_type_hex(),
                    antenna = %tag.antenna_hex(),
                    rssi = %tag.rssi_hex(),
                    "New tag detected"
                );
                let mut events = vec![ReaderEvent::NewTag(tag)];
                match self.storage.count() {
                    Ok(count) => events.push(ReaderEvent::Count(count)),
                    Err(e) => error!(error = %e, "Error getting tag count"),
                }
                Some(events)
            }
            Ok(RecordOutcome::Updated) => Some(vec![ReaderEvent::Seen(tag)]),
            Err(e) => {
                error!(error = %e, tag_id = %tag.tag_id, "Error recording tag");
                None
            }
        }
    }
}

/// Send a status line; `false` once the receiver is gone.
async fn status(tx: &mpsc::Sender<ReaderEvent>, message: impl Into<String>) -> bool {
    let message = message.into();
    info!("{}", message);
    tx.send(ReaderEvent::Status(message)).await.is_ok()
}

fn bring_up_message(err: &Error) -> String {
    match err {
        Error::NoDevice => "No USB Device".to_string(),
        Error::DeviceOpen { .. } => "Failed to connect reader".to_string(),
        Error::StartRead => "Failed to start reading".to_string(),
        other => format!("Error: {other}"),
    }
}
