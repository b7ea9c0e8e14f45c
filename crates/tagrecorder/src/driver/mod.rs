//! Reader driver abstraction.
//!
//! [`TagDriver`] is the seam between the poll loop and the hardware. The
//! vendor library sits behind [`NativeDriver`]; [`SimulatedDriver`] stands
//! in for it when no reader is attached.

mod native;
mod simulated;

pub use native::NativeDriver;
pub use simulated::{Frame, SimulatedDriver};

use crate::error::Result;
use crate::protocol::ReadStatus;

/// Counts returned alongside a filled tag buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRead {
    /// How the driver classified the read.
    pub status: ReadStatus,
    /// Bytes the driver reports as written.
    pub tag_length: usize,
    /// Records the driver reports as written.
    pub tag_count: usize,
}

impl BufferRead {
    /// A read that produced no tags.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            status: ReadStatus::Empty,
            tag_length: 0,
            tag_count: 0,
        }
    }
}

/// A source of raw tag buffers.
///
/// Calls are synchronous; each maps to a single short driver call.
pub trait TagDriver: Send {
    /// The name of this driver (for logging/debugging).
    fn name(&self) -> &'static str;

    /// Number of reader devices attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver cannot enumerate devices.
    fn device_count(&mut self) -> Result<u32>;

    /// Open the device at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DeviceOpen`] if the device cannot be opened.
    fn open(&mut self, index: u32) -> Result<()>;

    /// Discard tags buffered in the driver.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver rejects the call.
    fn clear_buffer(&mut self) -> Result<()>;

    /// Enter continuous read mode.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::StartRead`] if the reader refuses.
    fn start_read(&mut self) -> Result<()>;

    /// Fill `buf` with buffered tag records.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver call itself fails; a driver-reported
    /// failure code is returned as [`ReadStatus::Failed`] instead.
    fn read_buffer(&mut self, buf: &mut [u8]) -> Result<BufferRead>;

    /// Leave read mode and close the device. Safe to call more than once.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to shut down cleanly.
    fn stop(&mut self) -> Result<()>;
}

impl<D: TagDriver + ?Sized> TagDriver for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn device_count(&mut self) -> Result<u32> {
        (**self).device_count()
    }

    fn open(&mut self, index: u32) -> Result<()> {
        (**self).open(index)
    }

    fn clear_buffer(&mut self) -> Result<()> {
        (**self).clear_buffer()
    }

    fn start_read(&mut self) -> Result<()> {
        (**self).start_read()
    }

    fn read_buffer(&mut self, buf: &mut [u8]) -> Result<BufferRead> {
        (**self).read_buffer(buf)
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_read_empty() {
        let read = BufferRead::empty();
        assert_eq!(read.status, ReadStatus::Empty);
        assert_eq!(read.tag_count, 0);
    }

    #[test]
    fn test_boxed_driver_delegates() {
        let mut driver: Box<dyn TagDriver> = Box::new(SimulatedDriver::new());
        assert_eq!(driver.name(), "simulated");
        assert_eq!(driver.device_count().unwrap(), 1);
        driver.open(0).unwrap();
        driver.stop().unwrap();
    }
}
