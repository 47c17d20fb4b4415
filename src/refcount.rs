//! Reference counted descriptor ownership.
//!
//! A [`SharedFd`] owns one kernel descriptor and a count of everything that
//! currently depends on it being open: the owner's own hold, child handles
//! derived from it, and operations in flight on it. The descriptor is closed
//! exactly once, by whoever drops the count to zero, and only after the
//! owner has released its hold.
//!
//! Taking a hold fails once the owner has released, and the check happens
//! under the same lock as the increment. A hold taken before an ioctl is
//! therefore either refused outright or keeps the descriptor open until it
//! is given back.

use std::{
    os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
};

use crate::{
    errors::{Error, Result},
    uapi::Kernel,
};

#[derive(Debug)]
struct RefState {
    count: usize,
    released: bool,
    fd: Option<OwnedFd>,
    closed: bool,
}

pub(crate) struct SharedFd {
    kernel: Arc<dyn Kernel>,
    raw: RawFd,
    state: Mutex<RefState>,
    changed: Condvar,
}

impl SharedFd {
    /// Take ownership of `fd` with a count of one for the owner.
    pub(crate) fn new(kernel: Arc<dyn Kernel>, fd: OwnedFd) -> Self {
        Self {
            kernel,
            raw: fd.as_raw_fd(),
            state: Mutex::new(RefState {
                count: 1,
                released: false,
                fd: Some(fd),
                closed: false,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RefState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn kernel(&self) -> &dyn Kernel {
        &*self.kernel
    }

    pub(crate) fn kernel_arc(&self) -> Arc<dyn Kernel> {
        Arc::clone(&self.kernel)
    }

    pub(crate) fn count(&self) -> usize {
        self.lock().count
    }

    pub(crate) fn is_released(&self) -> bool {
        self.lock().released
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Add a hold. Refused once the owner has released the descriptor.
    pub(crate) fn incref(&self) -> Result<()> {
        let mut state = self.lock();
        if state.released {
            return Err(Error::AlreadyClosed);
        }
        state.count += 1;
        Ok(())
    }

    /// Give back a hold, closing the descriptor if it was the last one.
    ///
    /// # Panics
    ///
    /// Giving back more holds than were taken is a bug in the caller.
    pub(crate) fn decref(&self) -> Result<()> {
        let fd = {
            let mut state = self.lock();
            assert!(
                state.count > 0,
                "reference count underflow on descriptor {}",
                self.raw
            );
            state.count -= 1;
            if state.count > 0 {
                return Ok(());
            }
            state.fd.take()
        };

        let res = match fd {
            Some(fd) => {
                log::trace!("closing descriptor {}", self.raw);
                self.kernel.close(fd).map_err(|e| Error::Io(e.into()))
            }
            None => Ok(()),
        };

        self.lock().closed = true;
        self.changed.notify_all();
        res
    }

    /// Give back the owner's hold. Only the first call has any effect.
    pub(crate) fn release(&self) -> Result<()> {
        {
            let mut state = self.lock();
            if state.released {
                return Err(Error::AlreadyClosed);
            }
            state.released = true;
        }
        self.decref()
    }

    /// Block until the descriptor has been closed.
    pub(crate) fn wait_closed(&self) {
        let mut state = self.lock();
        while !state.closed {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Take a hold for the duration of one operation.
    pub(crate) fn hold(&self) -> Result<FdHold<'_>> {
        self.incref()?;
        Ok(FdHold { shared: self })
    }
}

impl AsRawFd for SharedFd {
    fn as_raw_fd(&self) -> RawFd {
        self.raw
    }
}

impl std::fmt::Debug for SharedFd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("SharedFd")
            .field("fd", &self.raw)
            .field("count", &state.count)
            .field("released", &state.released)
            .field("closed", &state.closed)
            .finish()
    }
}

/// A transient hold; given back when dropped.
#[must_use]
pub(crate) struct FdHold<'a> {
    shared: &'a SharedFd,
}

impl FdHold<'_> {
    pub(crate) fn fd(&self) -> BorrowedFd<'_> {
        // SAFETY: the count is non-zero while `self` lives, so the descriptor
        // has not been closed.
        unsafe { BorrowedFd::borrow_raw(self.shared.raw) }
    }

    pub(crate) fn kernel(&self) -> &dyn Kernel {
        self.shared.kernel()
    }

    /// Hand the hold over to a long-lived child of `parent`.
    pub(crate) fn into_parent_ref(self, parent: &Arc<SharedFd>) -> ParentRef {
        debug_assert!(std::ptr::eq(self.shared, &**parent));
        std::mem::forget(self);
        ParentRef {
            shared: Arc::clone(parent),
            released: AtomicBool::new(false),
        }
    }
}

impl Drop for FdHold<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.shared.decref() {
            log::warn!("failed to close descriptor {}: {e}", self.shared.raw);
        }
    }
}

/// A child's hold on its parent's descriptor, given back at most once.
#[derive(Debug)]
pub(crate) struct ParentRef {
    shared: Arc<SharedFd>,
    released: AtomicBool,
}

impl ParentRef {
    pub(crate) fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shared.decref()
    }
}

impl Drop for ParentRef {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!(
                "failed to close parent descriptor {}: {e}",
                self.shared.raw
            );
        }
    }
}
