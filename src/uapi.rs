//! The kernel boundary.
//!
//! All traffic with the GPIO character device goes through a [`Kernel`]:
//! opening the chip, one [`Ioctl`] per request and closing descriptors.
//! [`Cdev`] talks to the real kernel; anything else (a simulator, a test
//! double) can stand in for it through [`Chip::open_with`].
//!
//! [`Chip::open_with`]: crate::Chip::open_with

use std::{
    fmt,
    fs::OpenOptions,
    io,
    os::{
        fd::{AsRawFd, BorrowedFd, IntoRawFd, OwnedFd},
        unix::fs::OpenOptionsExt,
    },
    path::Path,
};

use nix::errno::Errno;

use crate::errors::{Error, Result};

pub mod v1;

pub use v1::{EventRequestFlags, LineFlags, LineRequestFlags};

/// The kernel operation an ioctl stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlKind {
    ChipInfo,
    LineInfo,
    LineHandle,
    LineEvent,
    GetLine,
    SetLine,
}

impl fmt::Display for IoctlKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            IoctlKind::ChipInfo => write!(f, "get chip info"),
            IoctlKind::LineInfo => write!(f, "get line info"),
            IoctlKind::LineHandle => write!(f, "get line handle"),
            IoctlKind::LineEvent => write!(f, "get line event"),
            IoctlKind::GetLine => write!(f, "get line values"),
            IoctlKind::SetLine => write!(f, "set line values"),
        }
    }
}

/// A single request to the kernel together with the record it reads or fills.
#[derive(Debug)]
pub enum Ioctl<'a> {
    ChipInfo(&'a mut v1::gpiochip_info),
    LineInfo(&'a mut v1::gpioline_info),
    LineHandle(&'a mut v1::gpiohandle_request),
    LineEvent(&'a mut v1::gpioevent_request),
    GetValues(&'a mut v1::gpiohandle_data),
    SetValues(&'a mut v1::gpiohandle_data),
}

impl Ioctl<'_> {
    pub const fn kind(&self) -> IoctlKind {
        match self {
            Ioctl::ChipInfo(_) => IoctlKind::ChipInfo,
            Ioctl::LineInfo(_) => IoctlKind::LineInfo,
            Ioctl::LineHandle(_) => IoctlKind::LineHandle,
            Ioctl::LineEvent(_) => IoctlKind::LineEvent,
            Ioctl::GetValues(_) => IoctlKind::GetLine,
            Ioctl::SetValues(_) => IoctlKind::SetLine,
        }
    }

    /// The request code passed to `ioctl(2)`.
    pub const fn code(&self) -> nix::sys::ioctl::ioctl_num_type {
        match self {
            Ioctl::ChipInfo(_) => v1::GPIO_GET_CHIPINFO_IOCTL,
            Ioctl::LineInfo(_) => v1::GPIO_GET_LINEINFO_IOCTL,
            Ioctl::LineHandle(_) => v1::GPIO_GET_LINEHANDLE_IOCTL,
            Ioctl::LineEvent(_) => v1::GPIO_GET_LINEEVENT_IOCTL,
            Ioctl::GetValues(_) => v1::GPIOHANDLE_GET_LINE_VALUES_IOCTL,
            Ioctl::SetValues(_) => v1::GPIOHANDLE_SET_LINE_VALUES_IOCTL,
        }
    }
}

/// Access to the GPIO character device ABI.
pub trait Kernel: Send + Sync {
    /// Open a chip device read/write and close-on-exec.
    fn open(&self, path: &Path) -> io::Result<OwnedFd>;

    /// Issue one request on `fd`.
    fn ioctl(&self, fd: BorrowedFd<'_>, request: Ioctl<'_>) -> nix::Result<()>;

    /// Close a descriptor previously returned by [`Kernel::open`] or by a
    /// handle request.
    fn close(&self, fd: OwnedFd) -> nix::Result<()>;
}

/// The real `/dev/gpiochipN` interface.
#[derive(Debug, Default, Clone, Copy)]
pub struct Cdev;

impl Kernel for Cdev {
    fn open(&self, path: &Path) -> io::Result<OwnedFd> {
        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)?;
        Ok(OwnedFd::from(f))
    }

    fn ioctl(&self, fd: BorrowedFd<'_>, request: Ioctl<'_>) -> nix::Result<()> {
        let fd = fd.as_raw_fd();
        // SAFETY: each record is a live, exclusively borrowed `repr(C)` value
        // whose size is the one encoded in the request code.
        let res = unsafe {
            match request {
                Ioctl::ChipInfo(data) => v1::gpio_get_chipinfo(fd, data),
                Ioctl::LineInfo(data) => v1::gpio_get_lineinfo(fd, data),
                Ioctl::LineHandle(data) => v1::gpio_get_linehandle(fd, data),
                Ioctl::LineEvent(data) => v1::gpio_get_lineevent(fd, data),
                Ioctl::GetValues(data) => v1::gpiohandle_get_line_values(fd, data),
                Ioctl::SetValues(data) => v1::gpiohandle_set_line_values(fd, data),
            }
        }?;

        match res {
            0 => Ok(()),
            _ => Err(Errno::UnknownErrno),
        }
    }

    fn close(&self, fd: OwnedFd) -> nix::Result<()> {
        // SAFETY: ownership of the descriptor ends here.
        Errno::result(unsafe { libc::close(fd.into_raw_fd()) }).map(drop)
    }
}

/// Issue `request` on `fd`, attaching the operation and descriptor to any
/// failure.
pub(crate) fn issue(kernel: &dyn Kernel, fd: BorrowedFd<'_>, request: Ioctl<'_>) -> Result<()> {
    let kind = request.kind();
    let code = request.code();
    kernel.ioctl(fd, request).map_err(|source| {
        log::debug!(
            "ioctl {kind} (code {code:#x}) on fd {} failed: {source}",
            fd.as_raw_fd()
        );
        Error::IoctlFailed {
            kind,
            fd: fd.as_raw_fd(),
            offsets: Vec::new(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsFd;

    #[test]
    fn ioctl_on_non_gpio_descriptor_is_rejected() {
        let fd = Cdev.open(Path::new("/dev/null")).unwrap();
        let mut info = v1::gpiochip_info::zeroed();
        let err = issue(&Cdev, fd.as_fd(), Ioctl::ChipInfo(&mut info)).unwrap_err();
        match err {
            Error::IoctlFailed { kind, fd: raw, .. } => {
                assert_eq!(kind, IoctlKind::ChipInfo);
                assert_eq!(raw, fd.as_raw_fd());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        Cdev.close(fd).unwrap();
    }

    #[test]
    fn opening_missing_device_fails() {
        let err = Cdev.open(Path::new("/dev/gpiochip-does-not-exist")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn kind_and_code_follow_the_request() {
        let mut data = v1::gpiohandle_data::zeroed();
        let req = Ioctl::SetValues(&mut data);
        assert_eq!(req.kind(), IoctlKind::SetLine);
        assert_eq!(req.code(), v1::GPIOHANDLE_SET_LINE_VALUES_IOCTL);
        assert_eq!(IoctlKind::LineEvent.to_string(), "get line event");
    }
}
