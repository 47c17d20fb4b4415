use std::{
    os::{
        fd::{AsFd, AsRawFd, FromRawFd, OwnedFd, RawFd},
        unix::ffi::OsStrExt,
    },
    path::{Path, PathBuf},
    sync::Arc,
};

use bstr::ByteSlice;

use crate::{
    errors::{Error, Result},
    fixed_str::FixedStr,
    line::{consumer_label, EventHandle, LineHandle, LineInfo, LineRequest},
    refcount::SharedFd,
    uapi::{self, v1, Cdev, EventRequestFlags, Ioctl, IoctlKind, Kernel, LineRequestFlags},
};

/// Identity of a chip, read once when it is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipInfo {
    name: FixedStr<{ v1::GPIO_MAX_NAME_SIZE }>,
    label: FixedStr<{ v1::GPIO_MAX_NAME_SIZE }>,
    lines: u32,
}

impl ChipInfo {
    fn from_v1(info: &v1::gpiochip_info) -> Self {
        Self {
            name: FixedStr::from_byte_array(info.name),
            label: FixedStr::from_byte_array(info.label),
            lines: info.lines,
        }
    }

    /// The name of the device driving this GPIO chip in the kernel
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// A functional name for this GPIO chip, such as a product number.  Might
    /// be an empty string.
    ///
    /// As an example, the SoC GPIO chip on a Raspberry Pi is "pinctrl-bcm2835"
    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    /// The number of lines/pins indexable through this chip
    ///
    /// Not all of these may be usable depending on how the hardware is
    /// configured/muxed.
    pub const fn num_lines(&self) -> u32 {
        self.lines
    }
}

impl std::fmt::Display for ChipInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "name={} label={} lines={}",
            self.name, self.label, self.lines
        )
    }
}

/// A GPIO Chip maps to the actual device driver instance in hardware that
/// one interacts with to interact with individual GPIOs.  Often these chips
/// map to IP chunks on an SoC but could also be enumerated within the kernel
/// via something like a PCI or USB bus.
///
/// Line and event handles opened from a chip keep its descriptor open: the
/// descriptor is closed once the chip itself and every handle derived from it
/// have been closed (or dropped), in any order.
///
/// It is best not to assume that a device will always be enumerated in the
/// same order (especially if it is connected via a bus).  To reliably find
/// the correct chip, either create a udev rule that sets up a stable symlink,
/// or iterate over all available chips with [`chips()`] and match on
/// [`ChipInfo`].
pub struct Chip {
    path: PathBuf,
    consumer: FixedStr<{ v1::GPIO_MAX_NAME_SIZE }>,
    info: ChipInfo,
    fd: Arc<SharedFd>,
}

impl Chip {
    /// Open the GPIO Chip at the provided path (e.g. `/dev/gpiochip<N>`)
    ///
    /// `consumer` is used as the label of requests that do not name one.
    pub fn open(path: impl AsRef<Path>, consumer: &str) -> Result<Self> {
        Self::open_with(Arc::new(Cdev), path, consumer)
    }

    /// Like [`open`](Self::open), with all traffic going through `kernel`.
    pub fn open_with(
        kernel: Arc<dyn Kernel>,
        path: impl AsRef<Path>,
        consumer: &str,
    ) -> Result<Self> {
        let path = path.as_ref();
        let consumer = FixedStr::new(consumer)?;

        let fd = kernel.open(path).map_err(|source| Error::OpenFailed {
            path: path.to_owned(),
            source,
        })?;

        let mut raw = v1::gpiochip_info::zeroed();
        if let Err(e) = uapi::issue(&*kernel, fd.as_fd(), Ioctl::ChipInfo(&mut raw)) {
            if let Err(close) = kernel.close(fd) {
                log::warn!("failed to close '{}': {close}", path.display());
            }
            return Err(e);
        }

        let info = ChipInfo::from_v1(&raw);
        log::trace!(
            "opened '{}' as fd {} ({info})",
            path.display(),
            fd.as_raw_fd()
        );

        Ok(Self {
            path: path.to_owned(),
            consumer,
            info,
            fd: Arc::new(SharedFd::new(kernel, fd)),
        })
    }

    /// Chip identity as read at open time
    pub fn info(&self) -> &ChipInfo {
        &self.info
    }

    /// Path the chip was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Default consumer label for requests made through this chip
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Get the information of a line at a given offset.
    pub fn line_info(&self, offset: u32) -> Result<LineInfo> {
        let hold = self.fd.hold()?;
        let mut raw = v1::gpioline_info::for_offset(offset);
        uapi::issue(hold.kernel(), hold.fd(), Ioctl::LineInfo(&mut raw))
            .map_err(|e| e.with_offsets(&[offset]))?;
        Ok(LineInfo::from_v1(&raw))
    }

    /// Information on every line of the chip, in offset order
    pub fn lines(&self) -> Lines<'_> {
        Lines {
            chip: self,
            offsets: 0..self.info.num_lines(),
        }
    }

    /// Reserve `offsets` with one shared configuration.
    ///
    /// Output lines start low; use [`request_lines`](Self::request_lines) to
    /// pick initial values.
    pub fn open_lines(
        &self,
        flags: LineRequestFlags,
        consumer: &str,
        offsets: &[u32],
    ) -> Result<LineHandle> {
        self.request_lines(&LineRequest::new(flags, offsets).with_consumer(consumer))
    }

    /// Reserve the lines described by `request`.
    pub fn request_lines(&self, request: &LineRequest<'_>) -> Result<LineHandle> {
        let mut req = request.to_v1(&self.consumer)?;

        let hold = self.fd.hold()?;
        uapi::issue(hold.kernel(), hold.fd(), Ioctl::LineHandle(&mut req))
            .map_err(|e| e.with_offsets(request.offsets()))?;
        let fd = adopt_fd(IoctlKind::LineHandle, req.fd)?;

        log::trace!(
            "opened line handle {} for offsets {:?}",
            fd.as_raw_fd(),
            req.offsets()
        );
        let parent = hold.into_parent_ref(&self.fd);
        Ok(LineHandle::new(parent, self.fd.kernel_arc(), fd, &req))
    }

    /// Reserve a single input line for edge notifications.
    ///
    /// [`LineRequestFlags::INPUT`] is always added to `flags`.
    pub fn get_line_event(
        &self,
        offset: u32,
        flags: LineRequestFlags,
        edges: EventRequestFlags,
        consumer: &str,
    ) -> Result<EventHandle> {
        let wake = crate::line::event::wake_fd()?;

        let mut req = v1::gpioevent_request::zeroed();
        req.lineoffset = offset;
        req.handleflags = (flags | LineRequestFlags::INPUT).bits();
        req.eventflags = edges.bits();
        req.consumer_label = consumer_label(consumer, &self.consumer)?;

        let hold = self.fd.hold()?;
        uapi::issue(hold.kernel(), hold.fd(), Ioctl::LineEvent(&mut req))
            .map_err(|e| e.with_offsets(&[offset]))?;
        let fd = adopt_fd(IoctlKind::LineEvent, req.fd)?;
        crate::line::event::set_nonblocking(fd.as_fd())?;

        log::trace!("opened event handle {} for offset {offset}", fd.as_raw_fd());
        let parent = hold.into_parent_ref(&self.fd);
        Ok(EventHandle::new(
            parent,
            self.fd.kernel_arc(),
            fd,
            wake,
            &req,
        ))
    }

    /// Give up this chip.
    ///
    /// Blocks until every handle opened from it has been closed, after which
    /// the descriptor is closed. New handles are refused from the moment this
    /// is called. A second call fails with [`Error::AlreadyClosed`].
    pub fn close(&self) -> Result<()> {
        let res = self.fd.release();
        if let Err(Error::AlreadyClosed) = res {
            return res;
        }
        self.fd.wait_closed();
        log::trace!("closed '{}'", self.path.display());
        res
    }

    pub fn is_closed(&self) -> bool {
        self.fd.is_released()
    }
}

/// Take ownership of a descriptor handed back by the kernel.
fn adopt_fd(kind: IoctlKind, fd: libc::c_int) -> Result<OwnedFd> {
    if fd <= 0 {
        return Err(Error::InvalidDescriptor { kind, fd });
    }
    // SAFETY: the kernel just created `fd` for us and nothing else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

impl AsRawFd for Chip {
    #[inline(always)]
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Drop for Chip {
    fn drop(&mut self) {
        // Handles still open keep the descriptor alive; the last one closes it.
        if !self.fd.is_released() {
            if let Err(e) = self.fd.release() {
                log::warn!("failed to close '{}': {e}", self.path.display());
            }
        }
    }
}

impl std::fmt::Debug for Chip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chip")
            .field("path", &self.path)
            .field("consumer", &self.consumer)
            .field("info", &self.info)
            .field("fd", &self.fd)
            .finish()
    }
}

/// Iterator returned by [`Chip::lines`]
#[derive(Debug)]
pub struct Lines<'a> {
    chip: &'a Chip,
    offsets: std::ops::Range<u32>,
}

impl Iterator for Lines<'_> {
    type Item = Result<LineInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.offsets.next()?;
        Some(self.chip.line_info(offset))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.offsets.size_hint()
    }
}

/// Iterate over all GPIO chips currently present on this system
///
/// Each chip is opened with `consumer` as its default consumer label.
pub fn chips(consumer: &str) -> Result<ChipIterator> {
    Ok(ChipIterator {
        readdir: std::fs::read_dir("/dev")?,
        consumer: consumer.to_owned(),
    })
}

/// Iterator over chips
#[derive(Debug)]
pub struct ChipIterator {
    readdir: std::fs::ReadDir,
    consumer: String,
}

impl Iterator for ChipIterator {
    type Item = Result<Chip>;

    fn next(&mut self) -> Option<Result<Chip>> {
        for entry in &mut self.readdir {
            let e = match entry {
                Ok(e) => e,
                Err(e) => {
                    return Some(Err(e.into()));
                }
            };
            let p = e.path();
            let Some(f) = p.file_name() else {
                continue;
            };
            if f.as_bytes().starts_with_str("gpiochip") {
                return Some(Chip::open(&p, &self.consumer));
            }
        }

        None
    }
}
