use std::{io, os::fd::RawFd, path::PathBuf};

use itertools::Itertools;
use nix::errno::Errno;

use crate::{fixed_str::FixedStrErr, uapi::IoctlKind};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The chip device could not be opened
    #[error("Failed to open GPIO chip '{}': {source}", .path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The kernel rejected a request
    #[error(
        "Ioctl to {kind} failed on fd {fd} (offsets [{}]): {source}",
        .offsets.iter().join(", ")
    )]
    IoctlFailed {
        kind: IoctlKind,
        fd: RawFd,
        offsets: Vec<u32>,
        #[source]
        source: Errno,
    },

    /// The kernel reported success but handed back no usable descriptor
    #[error("Ioctl to {kind} returned invalid descriptor {fd}")]
    InvalidDescriptor { kind: IoctlKind, fd: libc::c_int },

    /// An event read returned the wrong number of bytes
    #[error("Malformed event: read {read} bytes, expected {expected}")]
    MalformedEvent { read: usize, expected: usize },

    #[error("Unknown event id {0}")]
    UnknownEvent(u32),

    /// The chip or handle has already been closed
    #[error("already closed")]
    AlreadyClosed,

    #[error(
        "Invalid request: {0} lines requested, expected 1 to {}",
        crate::uapi::v1::GPIOHANDLES_MAX
    )]
    InvalidLineCount(usize),

    #[error("Invalid label: {0}")]
    Label(#[from] FixedStrErr),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Attach the line offsets a failed request was about.
    pub(crate) fn with_offsets(self, lines: &[u32]) -> Self {
        match self {
            Error::IoctlFailed {
                kind, fd, source, ..
            } => Error::IoctlFailed {
                kind,
                fd,
                offsets: lines.to_vec(),
                source,
            },
            other => other,
        }
    }

    /// True for [`Error::AlreadyClosed`].
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::AlreadyClosed)
    }

    /// The errno behind a failed request, if any.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::IoctlFailed { source, .. } => Some(*source),
            Error::Io(err) | Error::OpenFailed { source: err, .. } => {
                err.raw_os_error().map(Errno::from_raw)
            }
            _ => None,
        }
    }
}
