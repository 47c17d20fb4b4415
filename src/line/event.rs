use std::{
    os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd},
    sync::Arc,
    time::{Duration, Instant},
};

use nix::{
    errno::Errno,
    poll::{PollFd, PollFlags, PollTimeout},
};

use crate::{
    errors::{Error, Result},
    fixed_str::FixedStr,
    refcount::{ParentRef, SharedFd},
    uapi::{self, v1, EventRequestFlags, Ioctl, Kernel, LineRequestFlags},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Rising,
    Falling,
}

/// An edge reported by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEvent {
    timestamp: u64,
    kind: EventKind,
}

impl LineEvent {
    pub(crate) fn from_v1(event: v1::gpioevent_data) -> Result<Self> {
        let kind = match event.id {
            v1::GPIOEVENT_EVENT_RISING_EDGE => EventKind::Rising,
            v1::GPIOEVENT_EVENT_FALLING_EDGE => EventKind::Falling,
            other => return Err(Error::UnknownEvent(other)),
        };

        Ok(Self {
            timestamp: event.timestamp,
            kind,
        })
    }

    /// Best estimate of when the edge occurred, in nanoseconds.
    ///
    /// The clock is `CLOCK_MONOTONIC` on kernels since 5.7 and
    /// `CLOCK_REALTIME` before.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

/// A single line reserved for edge notifications.
///
/// The handle keeps the chip's descriptor open until it is closed, either
/// explicitly through [`close`](Self::close) or by being dropped.
pub struct EventHandle {
    fd: SharedFd,
    parent: ParentRef,
    wake: OwnedFd,
    offset: u32,
    handle_flags: LineRequestFlags,
    event_flags: EventRequestFlags,
    consumer: FixedStr<{ v1::GPIO_MAX_NAME_SIZE }>,
}

impl EventHandle {
    pub(crate) fn new(
        parent: ParentRef,
        kernel: Arc<dyn Kernel>,
        fd: OwnedFd,
        wake: OwnedFd,
        req: &v1::gpioevent_request,
    ) -> Self {
        Self {
            fd: SharedFd::new(kernel, fd),
            parent,
            wake,
            offset: req.lineoffset,
            handle_flags: LineRequestFlags::from_bits_truncate(req.handleflags),
            event_flags: EventRequestFlags::from_bits_truncate(req.eventflags),
            consumer: FixedStr::from_byte_array(req.consumer_label),
        }
    }

    /// Offset of the watched line
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Flags the line was requested with; always includes `INPUT`
    pub fn handle_flags(&self) -> LineRequestFlags {
        self.handle_flags
    }

    /// The edges this handle reports
    pub fn event_flags(&self) -> EventRequestFlags {
        self.event_flags
    }

    /// Consumer label the line is held under
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Read the current value of the line.
    pub fn read(&self) -> Result<u8> {
        let hold = self.fd.hold()?;
        let mut data = v1::gpiohandle_data::zeroed();
        uapi::issue(hold.kernel(), hold.fd(), Ioctl::GetValues(&mut data))
            .map_err(|e| e.with_offsets(&[self.offset]))?;
        Ok(data.values[0])
    }

    /// Wait up to `timeout` for the next edge.
    ///
    /// Returns `Ok(None)` if no edge arrived in time. If the handle is closed
    /// from another thread while waiting, the wait ends with
    /// [`Error::AlreadyClosed`].
    pub fn wait(&self, timeout: Duration) -> Result<Option<LineEvent>> {
        self.wait_inner(Some(timeout))
    }

    /// Block until the next edge.
    pub fn next_event(&self) -> Result<LineEvent> {
        loop {
            if let Some(event) = self.wait_inner(None)? {
                return Ok(event);
            }
        }
    }

    /// Blocking iterator over edges; ends once the handle is closed.
    pub fn events(&self) -> Events<'_> {
        Events { handle: self }
    }

    /// Release the line and the hold on the chip.
    ///
    /// Waits in progress on other threads are woken and fail with
    /// [`Error::AlreadyClosed`]. A second call fails the same way.
    pub fn close(&self) -> Result<()> {
        super::close_child(&self.fd, &self.parent, || self.wake_waiters())
    }

    pub fn is_closed(&self) -> bool {
        self.fd.is_released()
    }

    fn wait_inner(&self, timeout: Option<Duration>) -> Result<Option<LineEvent>> {
        let hold = self.fd.hold()?;
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            let mut fds = [
                PollFd::new(hold.fd(), PollFlags::POLLIN),
                PollFd::new(self.wake.as_fd(), PollFlags::POLLIN),
            ];

            match nix::poll::poll(&mut fds, poll_timeout(remaining)) {
                Ok(0) => return Ok(None),
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(Error::Io(e.into())),
            }

            if is_ready(&fds[1]) {
                return Err(Error::AlreadyClosed);
            }
            if !is_ready(&fds[0]) {
                continue;
            }

            if let Some(event) = read_event(hold.fd())? {
                return Ok(Some(event));
            }
        }
    }

    fn wake_waiters(&self) {
        let one = 1u64.to_ne_bytes();
        // SAFETY: writes 8 bytes from a live buffer to our own eventfd.
        let res = Errno::result(unsafe {
            libc::write(self.wake.as_raw_fd(), one.as_ptr().cast(), one.len())
        });
        if let Err(e) = res {
            log::warn!("failed to wake waiters on line {}: {e}", self.offset);
        }
    }
}

impl AsRawFd for EventHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Drop for EventHandle {
    fn drop(&mut self) {
        if !self.fd.is_released() {
            if let Err(e) = self.close() {
                log::warn!("failed to close event handle for line {}: {e}", self.offset);
            }
        }
    }
}

impl std::fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandle")
            .field("fd", &self.fd)
            .field("offset", &self.offset)
            .field("handle_flags", &self.handle_flags)
            .field("event_flags", &self.event_flags)
            .field("consumer", &self.consumer)
            .finish()
    }
}

/// Iterator returned by [`EventHandle::events`]
#[derive(Debug)]
pub struct Events<'a> {
    handle: &'a EventHandle,
}

impl Iterator for Events<'_> {
    type Item = Result<LineEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.handle.next_event() {
            Err(Error::AlreadyClosed) => None,
            res => Some(res),
        }
    }
}

/// A non-blocking eventfd used to interrupt [`EventHandle::wait`].
pub(crate) fn wake_fd() -> Result<OwnedFd> {
    // SAFETY: plain syscall; the returned descriptor is owned below.
    let fd = Errno::result(unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) })
        .map_err(|e| Error::Io(e.into()))?;
    // SAFETY: `fd` was just created and nothing else refers to it.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Switch an event descriptor to non-blocking reads.
///
/// Several threads may wait on one handle; only one of them gets a given
/// record, and the others must go back to polling instead of blocking in
/// `read`.
pub(crate) fn set_nonblocking(fd: BorrowedFd<'_>) -> Result<()> {
    let fd = fd.as_raw_fd();
    // SAFETY: plain fcntl calls on a descriptor we own.
    unsafe {
        let flags = Errno::result(libc::fcntl(fd, libc::F_GETFL, 0))
            .map_err(|e| Error::Io(e.into()))?;
        Errno::result(libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK))
            .map_err(|e| Error::Io(e.into()))?;
    }
    Ok(())
}

/// Read one event record. `Ok(None)` means there was nothing to read after
/// all and the caller should poll again.
fn read_event(fd: BorrowedFd<'_>) -> Result<Option<LineEvent>> {
    let mut buf = [0u8; v1::gpioevent_data::SIZE];
    // SAFETY: reads at most `buf.len()` bytes into a live buffer.
    let res = Errno::result(unsafe {
        libc::read(fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len())
    });

    match res {
        Ok(n) if n as usize == buf.len() => {
            LineEvent::from_v1(v1::gpioevent_data::from_bytes(&buf)).map(Some)
        }
        Ok(n) => Err(Error::MalformedEvent {
            read: n as usize,
            expected: buf.len(),
        }),
        Err(Errno::EAGAIN) | Err(Errno::EINTR) => Ok(None),
        Err(e) => Err(Error::Io(e.into())),
    }
}

fn is_ready(fd: &PollFd<'_>) -> bool {
    fd.revents().is_some_and(|r| !r.is_empty())
}

/// Round up to whole milliseconds so short timeouts do not turn into a
/// non-blocking poll.
fn poll_timeout(remaining: Option<Duration>) -> PollTimeout {
    match remaining {
        None => PollTimeout::NONE,
        Some(d) => {
            let ms = d.as_nanos().div_ceil(1_000_000).min(i32::MAX as u128);
            ms.try_into().unwrap_or(PollTimeout::MAX)
        }
    }
}
