//! A connected reader session.
//!
//! [`Reader`] owns a [`TagDriver`] and the buffer it reads into, runs the
//! device bring-up sequence, and turns each poll into [`TagRead`]s.

use tracing::{debug, error, info, warn};

use crate::driver::TagDriver;
use crate::error::{Error, Result};
use crate::protocol::{format_hex_dump, parse_tag_buffer, ReadStatus, TAG_BUFFER_SIZE};
use crate::tag::TagRead;

/// Progress reported by [`Reader::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStep {
    /// Attached devices were counted.
    Counted(u32),
    /// The device is open; reading has not started yet.
    Opened,
}

/// A reader device session.
#[derive(Debug)]
pub struct Reader<D: TagDriver> {
    driver: D,
    buffer: Vec<u8>,
    reader_id: String,
}

impl<D: TagDriver> Reader<D> {
    /// Wrap `driver`, attributing reads to `reader_id`.
    pub fn new(driver: D, reader_id: impl Into<String>) -> Self {
        Self {
            driver,
            buffer: vec![0; TAG_BUFFER_SIZE],
            reader_id: reader_id.into(),
        }
    }

    /// Count devices, open the one at `index`, clear its buffer and start
    /// reading. `progress` is told about each step as it succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoDevice`] when no reader is attached,
    /// [`Error::DeviceOpen`] or [`Error::StartRead`] when that step fails.
    /// A device left open by a failed start is closed again.
    pub fn connect(&mut self, index: u32, mut progress: impl FnMut(ConnectStep)) -> Result<u32> {
        let count = self.driver.device_count()?;
        progress(ConnectStep::Counted(count));
        if count == 0 {
            return Err(Error::NoDevice);
        }

        self.driver.open(index)?;
        progress(ConnectStep::Opened);

        debug!("Clearing tag buffer before starting read");
        let started = self
            .driver
            .clear_buffer()
            .and_then(|()| self.driver.start_read());
        if let Err(e) = started {
            if let Err(stop_err) = self.driver.stop() {
                warn!(error = %stop_err, "Failed to close reader after start failure");
            }
            return Err(e);
        }

        info!(driver = self.driver.name(), index, "Reader started");
        Ok(count)
    }

    /// Poll the driver once and decode any tags it returns.
    ///
    /// Driver failures and malformed records are logged; records decoded
    /// before a malformed one are still returned.
    pub fn read_tags(&mut self) -> Vec<TagRead> {
        let read = match self.driver.read_buffer(&mut self.buffer) {
            Ok(read) => read,
            Err(e) => {
                error!(error = %e, "Error reading tags");
                return Vec::new();
            }
        };

        if read.status != ReadStatus::Tags {
            if matches!(read.status, ReadStatus::Failed(_)) {
                debug!(code = read.status.code(), "No tags found in buffer");
            }
            return Vec::new();
        }

        debug!(
            tag_count = read.tag_count,
            tag_length = read.tag_length,
            "Found tags in buffer"
        );
        let parsed = parse_tag_buffer(&self.buffer, read.tag_length, read.tag_count);
        if let Some(e) = &parsed.error {
            let end = read.tag_length.clamp(parsed.consumed, self.buffer.len());
            error!(
                error = %e,
                decoded = parsed.tags.len(),
                raw = %format_hex_dump(&self.buffer[parsed.consumed..end]),
                "Error processing tag buffer"
            );
        }

        parsed
            .tags
            .iter()
            .map(|raw| TagRead::from_raw(raw, self.reader_id.as_str()))
            .collect()
    }

    /// Stop reading and close the device.
    pub fn disconnect(&mut self) {
        match self.driver.stop() {
            Ok(()) => info!("Reader disconnected"),
            Err(e) => error!(error = %e, "Error stopping reader"),
        }
    }

    #[cfg(test)]
    fn driver(&self) -> &D {
        &self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Frame, SimulatedDriver};
    use crate::protocol::RawTag;

    fn raw(id: &[u8]) -> RawTag {
        RawTag {
            tag_type: 0x01,
            antenna: 0x01,
            tag_id: id.to_vec(),
            rssi: 0x91,
        }
    }

    fn connected(driver: SimulatedDriver) -> Reader<SimulatedDriver> {
        let mut reader = Reader::new(driver, "default");
        reader.connect(0, |_| {}).unwrap();
        reader
    }

    fn connect_steps(driver: SimulatedDriver) -> (Result<u32>, Vec<ConnectStep>) {
        let mut reader = Reader::new(driver, "default");
        let mut steps = Vec::new();
        let result = reader.connect(0, |step| steps.push(step));
        (result, steps)
    }

    #[test]
    fn test_connect_and_read() {
        let driver = SimulatedDriver::scripted([Frame::Tags(vec![raw(&[0x12, 0x34])])]);
        let mut reader = Reader::new(driver, "bench");

        let mut steps = Vec::new();
        assert_eq!(reader.connect(0, |step| steps.push(step)).unwrap(), 1);
        assert_eq!(steps, vec![ConnectStep::Counted(1), ConnectStep::Opened]);
        assert!(reader.driver().is_reading());

        let tags = reader.read_tags();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].tag_id, "1234");
        assert_eq!(tags[0].reader_id, "bench");
    }

    #[test]
    fn test_connect_no_device() {
        let (result, steps) = connect_steps(SimulatedDriver::new().devices(0));
        assert!(matches!(result, Err(Error::NoDevice)));
        assert_eq!(steps, vec![ConnectStep::Counted(0)]);
    }

    #[test]
    fn test_connect_open_failure() {
        let (result, steps) = connect_steps(SimulatedDriver::new().failing_open());
        assert!(matches!(result, Err(Error::DeviceOpen { index: 0 })));
        assert_eq!(steps, vec![ConnectStep::Counted(1)]);
    }

    #[test]
    fn test_start_failure_closes_device() {
        let mut reader = Reader::new(SimulatedDriver::new().failing_start(), "default");
        let mut steps = Vec::new();
        let result = reader.connect(0, |step| steps.push(step));

        assert!(matches!(result, Err(Error::StartRead)));
        assert_eq!(steps, vec![ConnectStep::Counted(1), ConnectStep::Opened]);
        assert!(!reader.driver().is_open());
    }

    #[test]
    fn test_read_empty_and_failed_frames() {
        let mut reader = connected(SimulatedDriver::scripted([Frame::Empty, Frame::Failed(-1)]));

        assert!(reader.read_tags().is_empty());
        assert!(reader.read_tags().is_empty());
    }

    #[test]
    fn test_read_keeps_records_before_malformed_one() {
        let mut bytes = Vec::new();
        crate::protocol::encode_record(&raw(&[0x01]), &mut bytes).unwrap();
        bytes.extend_from_slice(&[0x02, 0x00, 0x00]);
        let tag_length = bytes.len();

        let mut reader = connected(SimulatedDriver::scripted([Frame::Raw {
            bytes,
            tag_length,
            tag_count: 2,
        }]));

        let tags = reader.read_tags();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].tag_id, "01");
    }

    #[test]
    fn test_read_before_connect_is_empty() {
        let mut reader = Reader::new(SimulatedDriver::new(), "default");
        assert!(reader.read_tags().is_empty());
    }

    #[test]
    fn test_disconnect() {
        let mut reader = connected(SimulatedDriver::new());
        reader.disconnect();

        assert!(!reader.driver().is_open());
        assert!(!reader.driver().is_reading());
    }
}
