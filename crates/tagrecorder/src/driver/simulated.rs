//! A stand-in driver that produces tag buffers without hardware.

use std::collections::VecDeque;

use tracing::{debug, trace};

use super::{BufferRead, TagDriver};
use crate::error::{Error, Result};
use crate::protocol::{encode_record, RawTag, ReadStatus};

/// One scripted driver response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Return these tags, encoded in the vendor layout.
    Tags(Vec<RawTag>),
    /// Return "no tags".
    Empty,
    /// Return a driver failure code.
    Failed(i32),
    /// Return raw bytes with the given counts, well-formed or not.
    Raw {
        /// Bytes copied to the start of the buffer.
        bytes: Vec<u8>,
        /// Reported byte count.
        tag_length: usize,
        /// Reported record count.
        tag_count: usize,
    },
}

/// A deterministic [`TagDriver`].
///
/// Scripted frames are served first, in order. Once they run out the driver
/// returns one tag per read from its population, round-robin, or nothing if
/// the population is empty.
#[derive(Debug, Clone)]
pub struct SimulatedDriver {
    devices: u32,
    population: Vec<RawTag>,
    next: usize,
    frames: VecDeque<Frame>,
    fail_open: bool,
    fail_start: bool,
    open: bool,
    reading: bool,
}

impl SimulatedDriver {
    /// A single-device driver with a small demo tag population.
    #[must_use]
    pub fn new() -> Self {
        Self::with_population(demo_population())
    }

    /// A single-device driver cycling through `population`.
    #[must_use]
    pub fn with_population(population: Vec<RawTag>) -> Self {
        Self {
            devices: 1,
            population,
            next: 0,
            frames: VecDeque::new(),
            fail_open: false,
            fail_start: false,
            open: false,
            reading: false,
        }
    }

    /// A single-device driver that only serves scripted frames.
    #[must_use]
    pub fn scripted(frames: impl IntoIterator<Item = Frame>) -> Self {
        let mut driver = Self::with_population(Vec::new());
        driver.frames.extend(frames);
        driver
    }

    /// Report `devices` attached readers.
    #[must_use]
    pub fn devices(mut self, devices: u32) -> Self {
        self.devices = devices;
        self
    }

    /// Make `open` fail.
    #[must_use]
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Make `start_read` fail.
    #[must_use]
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        self.open
    }

    #[cfg(test)]
    pub(crate) fn is_reading(&self) -> bool {
        self.reading
    }

    fn next_frame(&mut self) -> Frame {
        if let Some(frame) = self.frames.pop_front() {
            return frame;
        }
        if self.population.is_empty() {
            return Frame::Empty;
        }
        let tag = self.population[self.next % self.population.len()].clone();
        self.next = self.next.wrapping_add(1);
        Frame::Tags(vec![tag])
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl TagDriver for SimulatedDriver {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn device_count(&mut self) -> Result<u32> {
        Ok(self.devices)
    }

    fn open(&mut self, index: u32) -> Result<()> {
        if self.fail_open || index >= self.devices {
            return Err(Error::DeviceOpen { index });
        }
        debug!(index, "Opened simulated reader");
        self.open = true;
        Ok(())
    }

    fn clear_buffer(&mut self) -> Result<()> {
        Ok(())
    }

    fn start_read(&mut self) -> Result<()> {
        if self.fail_start || !self.open {
            return Err(Error::StartRead);
        }
        self.reading = true;
        Ok(())
    }

    fn read_buffer(&mut self, buf: &mut [u8]) -> Result<BufferRead> {
        if !self.reading {
            return Err(Error::driver("simulated reader is not reading"));
        }

        let frame = self.next_frame();
        trace!(?frame, "Serving simulated frame");
        match frame {
            Frame::Empty => Ok(BufferRead::empty()),
            Frame::Failed(code) => Ok(BufferRead {
                status: ReadStatus::Failed(code),
                tag_length: 0,
                tag_count: 0,
            }),
            Frame::Tags(tags) => {
                let mut bytes = Vec::new();
                for tag in &tags {
                    encode_record(tag, &mut bytes)?;
                }
                copy_into(buf, &bytes)?;
                Ok(BufferRead {
                    status: ReadStatus::Tags,
                    tag_length: bytes.len(),
                    tag_count: tags.len(),
                })
            }
            Frame::Raw {
                bytes,
                tag_length,
                tag_count,
            } => {
                copy_into(buf, &bytes)?;
                Ok(BufferRead {
                    status: ReadStatus::Tags,
                    tag_length,
                    tag_count,
                })
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.reading = false;
        self.open = false;
        Ok(())
    }
}

fn copy_into(buf: &mut [u8], bytes: &[u8]) -> Result<()> {
    let len = buf.len();
    let dest = buf.get_mut(..bytes.len()).ok_or_else(|| {
        Error::driver(format!(
            "frame of {} bytes does not fit a {len} byte buffer",
            bytes.len()
        ))
    })?;
    dest.copy_from_slice(bytes);
    Ok(())
}

/// Tags served by `tagrec watch --simulate`.
fn demo_population() -> Vec<RawTag> {
    [
        (vec![0xE2, 0x00, 0x00, 0x17, 0x22, 0x0B, 0x01, 0x48], 0x01, 0x9C),
        (vec![0xE2, 0x00, 0x00, 0x17, 0x22, 0x0B, 0x01, 0x52], 0x01, 0x8E),
        (vec![0x30, 0x08, 0x33, 0xB2, 0xDD, 0xD9, 0x01, 0x40], 0x02, 0xA0),
    ]
    .into_iter()
    .map(|(tag_id, antenna, rssi)| RawTag {
        tag_type: 0x01,
        antenna,
        tag_id,
        rssi,
    })
    .collect()
}
