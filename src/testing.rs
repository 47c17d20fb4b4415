//! In-process stand-in for the GPIO character device.
//!
//! Chip and line handle descriptors are `/dev/null`; event descriptors are
//! the read end of a pipe that receives `gpioevent_data` records whenever a
//! watched line changes level. Line levels are simulated per offset, and
//! pairs of lines can be wired together to test loopback.

use std::{
    collections::{HashMap, HashSet},
    fs::{File, OpenOptions},
    io::{self, Write},
    os::{
        fd::{AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd},
        unix::fs::OpenOptionsExt,
    },
    path::Path,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use nix::errno::Errno;

use crate::{
    fixed_str::FixedStr,
    uapi::{v1, EventRequestFlags, Ioctl, Kernel, LineFlags, LineRequestFlags},
};

/// The only path [`FakeKernel`] will open.
pub(crate) const CHIP_PATH: &str = "/dev/gpiochip-fake";

struct Owner {
    fd: RawFd,
    consumer: [u8; v1::GPIO_MAX_NAME_SIZE],
    output: bool,
}

struct FakeHandle {
    offsets: Vec<u32>,
    output: bool,
}

struct FakeEvent {
    offset: u32,
    edges: EventRequestFlags,
    writer: File,
}

#[derive(Default)]
struct State {
    levels: Vec<u8>,
    links: Vec<(u32, u32)>,
    owners: HashMap<u32, Owner>,
    chips: HashSet<RawFd>,
    handles: HashMap<RawFd, FakeHandle>,
    events: HashMap<RawFd, FakeEvent>,
    closes: HashMap<RawFd, usize>,
    fail_next: Option<Errno>,
    bogus_fd: bool,
}

pub(crate) struct FakeKernel {
    lines: u32,
    state: Mutex<State>,
}

impl FakeKernel {
    pub(crate) fn new(lines: u32) -> Arc<Self> {
        Arc::new(Self {
            lines,
            state: Mutex::new(State {
                levels: vec![0; lines as usize],
                ..State::default()
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A descriptor that is not a chip, for exercising descriptor bookkeeping.
    pub(crate) fn open_null(&self) -> OwnedFd {
        null_fd().unwrap()
    }

    /// How often `raw` has been closed through this kernel.
    pub(crate) fn close_count(&self, raw: RawFd) -> usize {
        self.lock().closes.get(&raw).copied().unwrap_or(0)
    }

    pub(crate) fn total_closes(&self) -> usize {
        self.lock().closes.values().sum()
    }

    pub(crate) fn level(&self, offset: u32) -> u8 {
        self.lock().levels[offset as usize]
    }

    /// Drive `offset` from outside, as a signal on an input pin would.
    pub(crate) fn drive(&self, offset: u32, level: u8) {
        self.lock().set_level(offset, level);
    }

    /// Wire two lines together so that driving either one drives both.
    pub(crate) fn connect(&self, a: u32, b: u32) {
        self.lock().links.push((a, b));
    }

    /// Queue raw bytes on an event descriptor.
    pub(crate) fn inject(&self, event_fd: RawFd, bytes: &[u8]) {
        let mut state = self.lock();
        let event = state.events.get_mut(&event_fd).unwrap();
        event.writer.write_all(bytes).unwrap();
    }

    /// Fail the next ioctl with `errno`.
    pub(crate) fn fail_next(&self, errno: Errno) {
        self.lock().fail_next = Some(errno);
    }

    /// Make the next line or event request succeed without a descriptor.
    pub(crate) fn bogus_fd(&self) {
        self.lock().bogus_fd = true;
    }
}

impl State {
    fn set_level(&mut self, offset: u32, level: u8) {
        let mut wired = vec![offset];
        for &(a, b) in &self.links {
            if a == offset {
                wired.push(b);
            } else if b == offset {
                wired.push(a);
            }
        }

        for offset in wired {
            let prev = std::mem::replace(&mut self.levels[offset as usize], level);
            if prev != level {
                self.fire(offset, level);
            }
        }
    }

    fn fire(&mut self, offset: u32, level: u8) {
        let (edge, id) = if level != 0 {
            (EventRequestFlags::RISING_EDGE, v1::GPIOEVENT_EVENT_RISING_EDGE)
        } else {
            (EventRequestFlags::FALLING_EDGE, v1::GPIOEVENT_EVENT_FALLING_EDGE)
        };
        let record = v1::gpioevent_data {
            timestamp: monotonic_ns(),
            id,
            _padding: 0,
        };

        for event in self.events.values_mut() {
            if event.offset == offset && event.edges.contains(edge) {
                event.writer.write_all(&record.to_bytes()).unwrap();
            }
        }
    }

    fn check_lines(&self, offsets: &[u32], lines: u32) -> nix::Result<()> {
        let mut seen = HashSet::new();
        for &offset in offsets {
            if offset >= lines {
                return Err(Errno::EINVAL);
            }
            if self.owners.contains_key(&offset) || !seen.insert(offset) {
                return Err(Errno::EBUSY);
            }
        }
        Ok(())
    }

    fn claim(&mut self, offsets: &[u32], fd: RawFd, consumer: [u8; 32], output: bool) {
        for &offset in offsets {
            self.owners.insert(
                offset,
                Owner {
                    fd,
                    consumer,
                    output,
                },
            );
        }
    }

    fn forget(&mut self, fd: RawFd) {
        self.chips.remove(&fd);
        self.handles.remove(&fd);
        self.events.remove(&fd);
        self.owners.retain(|_, owner| owner.fd != fd);
    }
}

impl Kernel for FakeKernel {
    fn open(&self, path: &Path) -> io::Result<OwnedFd> {
        if path != Path::new(CHIP_PATH) {
            return Err(io::ErrorKind::NotFound.into());
        }
        let fd = null_fd()?;
        self.lock().chips.insert(fd.as_raw_fd());
        Ok(fd)
    }

    fn ioctl(&self, fd: BorrowedFd<'_>, request: Ioctl<'_>) -> nix::Result<()> {
        let fd = fd.as_raw_fd();
        let mut state = self.lock();
        if let Some(errno) = state.fail_next.take() {
            return Err(errno);
        }

        match request {
            Ioctl::ChipInfo(info) => {
                require(state.chips.contains(&fd))?;
                info.name = label("gpio-sim");
                info.label = label("fake-chip");
                info.lines = self.lines;
            }
            Ioctl::LineInfo(info) => {
                require(state.chips.contains(&fd))?;
                let offset = info.line_offset;
                if offset >= self.lines {
                    return Err(Errno::EINVAL);
                }
                info.name = label(&format!("sim-{offset}"));
                match state.owners.get(&offset) {
                    Some(owner) => {
                        let mut flags = LineFlags::KERNEL;
                        flags.set(LineFlags::IS_OUT, owner.output);
                        info.flags = flags.bits();
                        info.consumer = owner.consumer;
                    }
                    None => {
                        info.flags = 0;
                        info.consumer = [0; v1::GPIO_MAX_NAME_SIZE];
                    }
                }
            }
            Ioctl::LineHandle(req) => {
                require(state.chips.contains(&fd))?;
                let n = req.lines as usize;
                if n == 0 || n > v1::GPIOHANDLES_MAX {
                    return Err(Errno::EINVAL);
                }
                let flags = LineRequestFlags::from_bits_truncate(req.flags);
                if flags.contains(LineRequestFlags::INPUT | LineRequestFlags::OUTPUT) {
                    return Err(Errno::EINVAL);
                }
                state.check_lines(req.offsets(), self.lines)?;
                if std::mem::take(&mut state.bogus_fd) {
                    req.fd = 0;
                    return Ok(());
                }

                let handle = null_fd().map_err(errno_of)?.into_raw_fd();
                let output = flags.contains(LineRequestFlags::OUTPUT);
                let offsets = req.offsets().to_vec();
                state.claim(&offsets, handle, req.consumer_label, output);
                if output {
                    for (i, &offset) in offsets.iter().enumerate() {
                        state.set_level(offset, req.default_values[i]);
                    }
                }
                state.handles.insert(handle, FakeHandle { offsets, output });
                req.fd = handle;
            }
            Ioctl::LineEvent(req) => {
                require(state.chips.contains(&fd))?;
                let flags = LineRequestFlags::from_bits_truncate(req.handleflags);
                if flags.contains(LineRequestFlags::OUTPUT) {
                    return Err(Errno::EINVAL);
                }
                let offset = req.lineoffset;
                state.check_lines(&[offset], self.lines)?;
                if std::mem::take(&mut state.bogus_fd) {
                    req.fd = -1;
                    return Ok(());
                }

                let mut ends = [0; 2];
                // SAFETY: `ends` has room for both descriptors.
                Errno::result(unsafe { libc::pipe2(ends.as_mut_ptr(), libc::O_CLOEXEC) })?;
                // SAFETY: the write end was just created and is owned here.
                let writer = File::from(unsafe { OwnedFd::from_raw_fd(ends[1]) });
                let reader = ends[0];

                state.claim(&[offset], reader, req.consumer_label, false);
                state.events.insert(
                    reader,
                    FakeEvent {
                        offset,
                        edges: EventRequestFlags::from_bits_truncate(req.eventflags),
                        writer,
                    },
                );
                req.fd = reader;
            }
            Ioctl::GetValues(data) => {
                let levels = if let Some(handle) = state.handles.get(&fd) {
                    handle
                        .offsets
                        .iter()
                        .map(|o| state.levels[*o as usize])
                        .collect::<Vec<_>>()
                } else if let Some(event) = state.events.get(&fd) {
                    vec![state.levels[event.offset as usize]]
                } else {
                    return Err(Errno::ENOTTY);
                };
                data.values = [0; v1::GPIOHANDLES_MAX];
                data.values[..levels.len()].copy_from_slice(&levels);
            }
            Ioctl::SetValues(data) => {
                let offsets = match state.handles.get(&fd) {
                    Some(handle) if handle.output => handle.offsets.clone(),
                    Some(_) => return Err(Errno::EPERM),
                    None if state.events.contains_key(&fd) => return Err(Errno::EPERM),
                    None => return Err(Errno::ENOTTY),
                };
                for (i, offset) in offsets.into_iter().enumerate() {
                    state.set_level(offset, data.values[i]);
                }
            }
        }

        Ok(())
    }

    fn close(&self, fd: OwnedFd) -> nix::Result<()> {
        let raw = fd.as_raw_fd();
        let mut state = self.lock();
        *state.closes.entry(raw).or_default() += 1;
        state.forget(raw);
        drop(fd);
        Ok(())
    }
}

fn require(known: bool) -> nix::Result<()> {
    if known {
        Ok(())
    } else {
        Err(Errno::ENOTTY)
    }
}

fn label(s: &str) -> [u8; v1::GPIO_MAX_NAME_SIZE] {
    FixedStr::<{ v1::GPIO_MAX_NAME_SIZE }>::new(s)
        .unwrap()
        .into_byte_array()
}

fn null_fd() -> io::Result<OwnedFd> {
    let f = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_CLOEXEC)
        .open("/dev/null")?;
    Ok(OwnedFd::from(f))
}

fn errno_of(e: io::Error) -> Errno {
    e.raw_os_error().map_or(Errno::EIO, Errno::from_raw)
}

fn monotonic_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid out-pointer.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}
