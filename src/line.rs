use std::{
    os::fd::{AsRawFd, OwnedFd, RawFd},
    sync::{Arc, Mutex, PoisonError},
};

use crate::{
    errors::{Error, Result},
    fixed_str::FixedStr,
    refcount::{ParentRef, SharedFd},
    uapi::{self, v1, Ioctl, Kernel, LineRequestFlags},
};

pub mod event;
mod info;
mod request;
mod values;

pub use event::{EventHandle, EventKind, LineEvent};
pub use info::{Direction, LineInfo};
pub use request::LineRequest;
pub use values::LineValues;

pub(crate) use request::consumer_label;
use values::Offsets;

/// One or more lines reserved with a single shared configuration.
///
/// Values are read in bulk with [`read`](Self::read). Output values are
/// staged with [`set_bulk`](Self::set_bulk) or a [`LineSetter`] and sent to
/// the kernel by [`flush`](Self::flush).
///
/// The handle keeps the chip's descriptor open until it is closed, either
/// explicitly through [`close`](Self::close) or by being dropped.
pub struct LineHandle {
    fd: SharedFd,
    parent: ParentRef,
    offsets: Offsets,
    flags: LineRequestFlags,
    consumer: FixedStr<{ v1::GPIO_MAX_NAME_SIZE }>,
    staged: Mutex<v1::gpiohandle_data>,
}

impl LineHandle {
    pub(crate) fn new(
        parent: ParentRef,
        kernel: Arc<dyn Kernel>,
        fd: OwnedFd,
        req: &v1::gpiohandle_request,
    ) -> Self {
        let mut staged = v1::gpiohandle_data::zeroed();
        staged.values = req.default_values;

        Self {
            fd: SharedFd::new(kernel, fd),
            parent,
            offsets: req.offsets().iter().copied().collect(),
            flags: LineRequestFlags::from_bits_truncate(req.flags),
            consumer: FixedStr::from_byte_array(req.consumer_label),
            staged: Mutex::new(staged),
        }
    }

    /// Offsets covered by this handle, in the order the kernel granted them
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Number of lines covered by this handle
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Always false for a handle granted by the kernel
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Flags the lines were requested with
    pub fn flags(&self) -> LineRequestFlags {
        self.flags
    }

    /// Consumer label the lines are held under
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Read the current value of every line.
    ///
    /// Works for output handles as well, which report what was last set.
    pub fn read(&self) -> Result<LineValues> {
        let hold = self.fd.hold()?;
        let mut data = v1::gpiohandle_data::zeroed();
        uapi::issue(hold.kernel(), hold.fd(), Ioctl::GetValues(&mut data))
            .map_err(|e| e.with_offsets(&self.offsets))?;
        Ok(LineValues::new(&self.offsets, &data))
    }

    /// Stage values for the next [`flush`](Self::flush), in offset order.
    ///
    /// Values past the number of lines are ignored; lines without a value
    /// keep whatever was staged before.
    pub fn set_bulk(&self, values: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let mut staged = self.staged();
        for (w, v) in staged.values.iter_mut().zip(values).take(self.offsets.len()) {
            *w = *v;
        }
        Ok(())
    }

    /// Stage values for individual lines of this handle.
    ///
    /// # Panics
    ///
    /// If `offset` is not covered by this handle.
    pub fn setter(&self, offset: u32) -> LineSetter<'_> {
        let idx = self
            .offsets
            .iter()
            .position(|o| *o == offset)
            .unwrap_or_else(|| {
                panic!(
                    "line {offset} is not part of this handle (offsets {:?})",
                    self.offsets
                )
            });
        LineSetter { handle: self, idx }
    }

    /// Send the staged values to the kernel.
    pub fn flush(&self) -> Result<()> {
        let hold = self.fd.hold()?;
        let mut data = *self.staged();
        uapi::issue(hold.kernel(), hold.fd(), Ioctl::SetValues(&mut data))
            .map_err(|e| e.with_offsets(&self.offsets))
    }

    /// [`set_bulk`](Self::set_bulk) followed by [`flush`](Self::flush).
    pub fn write(&self, values: &[u8]) -> Result<()> {
        self.set_bulk(values)?;
        self.flush()
    }

    /// Release the lines and the hold on the chip.
    ///
    /// Waits for reads and flushes in progress on other threads. A second
    /// call fails with [`Error::AlreadyClosed`].
    pub fn close(&self) -> Result<()> {
        close_child(&self.fd, &self.parent, || ())
    }

    pub fn is_closed(&self) -> bool {
        self.fd.is_released()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.fd.is_released() {
            Err(Error::AlreadyClosed)
        } else {
            Ok(())
        }
    }

    fn staged(&self) -> std::sync::MutexGuard<'_, v1::gpiohandle_data> {
        self.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AsRawFd for LineHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Drop for LineHandle {
    fn drop(&mut self) {
        if !self.fd.is_released() {
            if let Err(e) = self.close() {
                log::warn!("failed to close line handle {}: {e}", self.fd.as_raw_fd());
            }
        }
    }
}

impl std::fmt::Debug for LineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineHandle")
            .field("fd", &self.fd)
            .field("offsets", &self.offsets())
            .field("flags", &self.flags)
            .field("consumer", &self.consumer)
            .finish()
    }
}

/// Stages the value of a single line of a [`LineHandle`].
#[derive(Debug, Clone, Copy)]
pub struct LineSetter<'a> {
    handle: &'a LineHandle,
    idx: usize,
}

impl LineSetter<'_> {
    pub fn offset(&self) -> u32 {
        self.handle.offsets[self.idx]
    }

    /// Stage `value`; sent on the next flush.
    pub fn set(&self, value: u8) -> Result<()> {
        self.handle.ensure_open()?;
        self.handle.staged().values[self.idx] = value;
        Ok(())
    }
}

/// Shared close sequence of line and event handles: refuse further
/// operations, let in-flight ones finish, then give back the chip hold.
pub(crate) fn close_child(fd: &SharedFd, parent: &ParentRef, wake: impl FnOnce()) -> Result<()> {
    let res = fd.release();
    if let Err(Error::AlreadyClosed) = res {
        return res;
    }
    wake();
    fd.wait_closed();
    log::trace!("closed handle {}", fd.as_raw_fd());
    res.and(parent.release())
}
