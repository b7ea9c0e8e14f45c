//! The vendor `SWHidApi` driver.

use std::path::Path;

use tagrecorder_swhid::SwHid;
use tracing::{debug, info, warn};

use super::{BufferRead, TagDriver};
use crate::error::{Error, Result};
use crate::protocol::ReadStatus;

/// A [`TagDriver`] backed by the vendor's native library.
#[derive(Debug)]
pub struct NativeDriver {
    lib: SwHid,
    open: bool,
    reading: bool,
}

impl NativeDriver {
    /// Load the vendor library from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverLoad`] if the library cannot be loaded or is
    /// missing an entry point.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let lib = SwHid::load(path)?;
        Ok(Self {
            lib,
            open: false,
            reading: false,
        })
    }

    /// Path the library was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.lib.path()
    }
}

impl TagDriver for NativeDriver {
    fn name(&self) -> &'static str {
        "swhid"
    }

    fn device_count(&mut self) -> Result<u32> {
        let count = self.lib.usb_count();
        debug!(count, "SWHid_GetUsbCount");
        u32::try_from(count)
            .map_err(|_| Error::driver(format!("SWHid_GetUsbCount returned {count}")))
    }

    fn open(&mut self, index: u32) -> Result<()> {
        let raw_index = i32::try_from(index).map_err(|_| Error::DeviceOpen { index })?;
        if self.lib.open_device(raw_index) {
            info!(index, "Opened RFID reader");
            self.open = true;
            Ok(())
        } else {
            Err(Error::DeviceOpen { index })
        }
    }

    fn clear_buffer(&mut self) -> Result<()> {
        debug!("Clearing tag buffer");
        self.lib.clear_tag_buf();
        Ok(())
    }

    fn start_read(&mut self) -> Result<()> {
        if self.lib.start_read() {
            info!("Started tag reading");
            self.reading = true;
            Ok(())
        } else {
            Err(Error::StartRead)
        }
    }

    fn read_buffer(&mut self, buf: &mut [u8]) -> Result<BufferRead> {
        let raw = self
            .lib
            .get_tag_buf(buf)
            .map_err(|e| Error::driver(e.to_string()))?;
        let status = ReadStatus::from_code(raw.code);
        if let ReadStatus::Failed(code) = status {
            debug!(code, "GetTagBuf reported failure");
        }

        let tag_length = usize::try_from(raw.tag_length).unwrap_or_else(|_| {
            warn!(tag_length = raw.tag_length, "Negative tag length from driver");
            0
        });
        let tag_count = usize::try_from(raw.tag_count).unwrap_or_else(|_| {
            warn!(tag_count = raw.tag_count, "Negative tag count from driver");
            0
        });

        Ok(BufferRead {
            status,
            tag_length,
            tag_count,
        })
    }

    fn stop(&mut self) -> Result<()> {
        if self.reading {
            self.lib.stop_read();
            self.reading = false;
        }
        if self.open {
            self.lib.close_device();
            self.open = false;
            info!("Stopped tag reading and closed device");
        }
        Ok(())
    }
}

impl Drop for NativeDriver {
    fn drop(&mut self) {
        if self.open || self.reading {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_library() {
        let err = NativeDriver::load("/nonexistent/SWHidApi.dll").unwrap_err();
        assert!(matches!(err, Error::DriverLoad(_)));
        assert!(err.is_device_unavailable());
    }
}
