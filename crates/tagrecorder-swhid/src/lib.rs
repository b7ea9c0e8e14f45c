//! Binding to the `SWHidApi` USB RFID reader driver.
//!
//! The vendor ships the driver as a native shared library exporting a small
//! C API. This crate loads it at runtime and exposes each entry point as a
//! safe method on [`SwHid`]. It is the only crate in the workspace that
//! contains `unsafe` code.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![allow(unsafe_code)]

use std::ffi::c_int;
use std::path::{Path, PathBuf};

use libloading::Library;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Size of the tag buffer the driver fills on each `SWHid_GetTagBuf` call.
pub const TAG_BUFFER_SIZE: usize = 9182;

/// Base name of the vendor library, without platform prefix or extension.
pub const LIBRARY_NAME: &str = "SWHidApi";

/// Errors raised while loading or calling the vendor library.
#[derive(Debug, Error)]
pub enum SwHidError {
    /// The shared library could not be loaded.
    #[error("failed to load {path}: {source}")]
    Load {
        /// Path that was passed to the loader.
        path: PathBuf,
        /// The underlying loader error.
        #[source]
        source: libloading::Error,
    },

    /// The library does not export a required entry point.
    #[error("driver library is missing symbol {name}: {source}")]
    MissingSymbol {
        /// Name of the missing symbol.
        name: &'static str,
        /// The underlying loader error.
        #[source]
        source: libloading::Error,
    },

    /// The caller's buffer is smaller than the driver writes.
    #[error("tag buffer too small: {len} bytes, driver needs {required}")]
    BufferTooSmall {
        /// Length of the supplied buffer.
        len: usize,
        /// Length the driver may write.
        required: usize,
    },
}

/// Result type for driver calls.
pub type Result<T> = std::result::Result<T, SwHidError>;

/// Raw outcome of a `SWHid_GetTagBuf` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagBuf {
    /// Return code: 2 when tags were written, 1 when none, otherwise an error.
    pub code: i32,
    /// Number of bytes the driver reports as written.
    pub tag_length: i32,
    /// Number of tag records in the buffer.
    pub tag_count: i32,
}

type CountFn = unsafe extern "system" fn() -> c_int;
type IndexFn = unsafe extern "system" fn(c_int) -> c_int;
type CommandFn = unsafe extern "system" fn() -> c_int;
type TagBufFn = unsafe extern "system" fn(*mut u8, *mut c_int, *mut c_int) -> c_int;

#[derive(Debug, Clone, Copy)]
struct EntryPoints {
    get_usb_count: CountFn,
    open_device: IndexFn,
    close_device: CommandFn,
    clear_tag_buf: CommandFn,
    start_read: CommandFn,
    stop_read: CommandFn,
    get_tag_buf: TagBufFn,
}

/// A loaded `SWHidApi` library.
///
/// Entry points are resolved once at load time; the library stays mapped for
/// the lifetime of this value.
#[derive(Debug)]
pub struct SwHid {
    path: PathBuf,
    api: EntryPoints,
    _lib: Library,
}

impl SwHid {
    /// Load the driver library from `path` and resolve its entry points.
    ///
    /// # Errors
    ///
    /// Returns an error if the library cannot be loaded or lacks one of the
    /// required exports.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(path = %path.display(), "Loading reader driver library");

        // SAFETY: loading runs the library's initialisers; the vendor driver
        // has no initialisation requirements beyond being loaded once.
        let lib = unsafe { Library::new(&path) }.map_err(|source| SwHidError::Load {
            path: path.clone(),
            source,
        })?;

        let api = EntryPoints {
            get_usb_count: symbol(&lib, "SWHid_GetUsbCount")?,
            open_device: symbol(&lib, "SWHid_OpenDevice")?,
            close_device: symbol(&lib, "SWHid_CloseDevice")?,
            clear_tag_buf: symbol(&lib, "SWHid_ClearTagBuf")?,
            start_read: symbol(&lib, "SWHid_StartRead")?,
            stop_read: symbol(&lib, "SWHid_StopRead")?,
            get_tag_buf: symbol(&lib, "SWHid_GetTagBuf")?,
        };

        info!(path = %path.display(), "Loaded reader driver library");
        Ok(Self {
            path,
            api,
            _lib: lib,
        })
    }

    /// Path the library was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of reader devices attached over USB.
    #[must_use]
    pub fn usb_count(&self) -> i32 {
        // SAFETY: no arguments, returns a plain int.
        unsafe { (self.api.get_usb_count)() }
    }

    /// Open the device at `index`. Returns `true` when the driver reports 1.
    #[must_use]
    pub fn open_device(&self, index: i32) -> bool {
        // SAFETY: index is passed by value; out-of-range indices are
        // rejected by the driver with a non-1 return.
        unsafe { (self.api.open_device)(index) == 1 }
    }

    /// Close the currently open device.
    pub fn close_device(&self) {
        // SAFETY: no arguments; safe to call with no device open.
        let code = unsafe { (self.api.close_device)() };
        trace!(code, "SWHid_CloseDevice");
    }

    /// Discard any tags buffered by the driver.
    pub fn clear_tag_buf(&self) {
        // SAFETY: no arguments.
        let code = unsafe { (self.api.clear_tag_buf)() };
        trace!(code, "SWHid_ClearTagBuf");
    }

    /// Put the reader into continuous read mode. Returns `true` on success.
    #[must_use]
    pub fn start_read(&self) -> bool {
        // SAFETY: no arguments.
        unsafe { (self.api.start_read)() == 1 }
    }

    /// Leave continuous read mode.
    pub fn stop_read(&self) {
        // SAFETY: no arguments.
        let code = unsafe { (self.api.stop_read)() };
        trace!(code, "SWHid_StopRead");
    }

    /// Copy buffered tag records into `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`SwHidError::BufferTooSmall`] if `buf` is shorter than
    /// [`TAG_BUFFER_SIZE`], since the driver does not take a capacity.
    pub fn get_tag_buf(&self, buf: &mut [u8]) -> Result<TagBuf> {
        if buf.len() < TAG_BUFFER_SIZE {
            return Err(SwHidError::BufferTooSmall {
                len: buf.len(),
                required: TAG_BUFFER_SIZE,
            });
        }

        let mut tag_length: c_int = 0;
        let mut tag_count: c_int = 0;
        // SAFETY: buf holds at least TAG_BUFFER_SIZE writable bytes and both
        // out-pointers refer to live locals.
        let code =
            unsafe { (self.api.get_tag_buf)(buf.as_mut_ptr(), &mut tag_length, &mut tag_count) };

        Ok(TagBuf {
            code,
            tag_length,
            tag_count,
        })
    }
}

fn symbol<T: Copy>(lib: &Library, name: &'static str) -> Result<T> {
    let mut bytes = Vec::with_capacity(name.len() + 1);
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(0);

    // SAFETY: every call site names T as the function type documented for
    // that export in the vendor header.
    unsafe { lib.get::<T>(&bytes) }
        .map(|sym| *sym)
        .map_err(|source| SwHidError::MissingSymbol { name, source })
}

/// Platform file name of the vendor library (`SWHidApi.dll`,
/// `libSWHidApi.so`, `libSWHidApi.dylib`).
#[must_use]
pub fn library_file_name() -> String {
    libloading::library_filename(LIBRARY_NAME)
        .to_string_lossy()
        .into_owned()
}
