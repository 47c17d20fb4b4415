// Copyright (c) 2018 The rust-gpio-cdev Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Records and request codes of the GPIO character device uAPI v1.
//!
//! Every record mirrors the kernel's [`linux/gpio.h`] declaration field for
//! field. The request codes are derived from the record sizes, so a layout
//! mistake shows up as a wrong code rather than as silent memory corruption.
//!
//! [`linux/gpio.h`]: https://github.com/torvalds/linux/blob/v5.19/include/uapi/linux/gpio.h

use core::mem::size_of;

use bitflags::bitflags;
use bstr::BStr;
use nix::sys::ioctl::ioctl_num_type;
use nix::{ioctl_read, ioctl_readwrite, request_code_read, request_code_readwrite};

pub const GPIOHANDLES_MAX: usize = 64;
pub const GPIO_MAX_NAME_SIZE: usize = 32;

const GPIO_IOC_MAGIC: u8 = 0xB4;

bitflags! {
    /// Informational Flags
    ///
    /// Maps to kernel [`GPIOLINE_FLAG_*`] flags.
    ///
    /// [`GPIOLINE_FLAG_*`]: https://github.com/torvalds/linux/blob/v5.19/include/uapi/linux/gpio.h
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LineFlags: u32 {
        const KERNEL = (1 << 0);
        const IS_OUT = (1 << 1);
        const ACTIVE_LOW = (1 << 2);
        const OPEN_DRAIN = (1 << 3);
        const OPEN_SOURCE = (1 << 4);
    }
}

bitflags! {
    /// Line Request Flags
    ///
    /// Maps to kernel [`GPIOHANDLE_REQUEST_*`] flags.
    ///
    /// [`GPIOHANDLE_REQUEST_*`]: https://github.com/torvalds/linux/blob/v5.19/include/uapi/linux/gpio.h#L58
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LineRequestFlags: u32 {
        const INPUT = (1 << 0);
        const OUTPUT = (1 << 1);
        const ACTIVE_LOW = (1 << 2);
        const OPEN_DRAIN = (1 << 3);
        const OPEN_SOURCE = (1 << 4);
    }
}

bitflags! {
    /// Event request flags
    ///
    /// Maps to kernel [`GPIOEVENT_REQUEST_*`] flags.
    ///
    /// [`GPIOEVENT_REQUEST_*`]: https://github.com/torvalds/linux/blob/v5.19/include/uapi/linux/gpio.h
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventRequestFlags: u32 {
        const RISING_EDGE = (1 << 0);
        const FALLING_EDGE = (1 << 1);
        const BOTH_EDGES = Self::RISING_EDGE.bits() | Self::FALLING_EDGE.bits();
    }
}

/// `GPIOEVENT_EVENT_RISING_EDGE`
pub const GPIOEVENT_EVENT_RISING_EDGE: u32 = 0x01;
/// `GPIOEVENT_EVENT_FALLING_EDGE`
pub const GPIOEVENT_EVENT_FALLING_EDGE: u32 = 0x02;

/// Information about a certain GPIO chip
#[derive(Clone, Copy)]
#[repr(C)]
pub struct gpiochip_info {
    /// the Linux kernel name of this GPIO chip
    pub name: [u8; GPIO_MAX_NAME_SIZE],
    /// a functional name for this GPIO chip, such as a product number, may be empty
    pub label: [u8; GPIO_MAX_NAME_SIZE],
    /// number of GPIO lines on this chip
    pub lines: u32,
}

impl gpiochip_info {
    pub const fn zeroed() -> Self {
        Self {
            name: [0; GPIO_MAX_NAME_SIZE],
            label: [0; GPIO_MAX_NAME_SIZE],
            lines: 0,
        }
    }
}

impl core::fmt::Debug for gpiochip_info {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("gpiochip_info")
            .field("name", &label_bytes(&self.name))
            .field("label", &label_bytes(&self.label))
            .field("lines", &self.lines)
            .finish()
    }
}

/// Information about a certain GPIO line
#[derive(Clone, Copy)]
#[repr(C)]
pub struct gpioline_info {
    /// The local offset on this GPIO device, fill this in when
    /// requesting the line information from the kernel.
    pub line_offset: u32,
    /// various flags for this line, see [`LineFlags`]
    pub flags: u32,
    /// the name of this GPIO line, such as the output pin of the line on the
    /// chip, a rail or a pin header name on a board, may be empty
    pub name: [u8; GPIO_MAX_NAME_SIZE],
    /// a functional name for the consumer of this GPIO line as set by
    /// whatever is using it, will be empty if there is no current user but may
    /// also be empty if the consumer doesn't set this up
    pub consumer: [u8; GPIO_MAX_NAME_SIZE],
}

impl gpioline_info {
    pub const fn for_offset(line_offset: u32) -> Self {
        Self {
            line_offset,
            flags: 0,
            name: [0; GPIO_MAX_NAME_SIZE],
            consumer: [0; GPIO_MAX_NAME_SIZE],
        }
    }
}

impl core::fmt::Debug for gpioline_info {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("gpioline_info")
            .field("line_offset", &self.line_offset)
            .field("flags", &LineFlags::from_bits_retain(self.flags))
            .field("name", &label_bytes(&self.name))
            .field("consumer", &label_bytes(&self.consumer))
            .finish()
    }
}

/// Information about a GPIO handle request
#[derive(Clone, Copy)]
#[repr(C)]
pub struct gpiohandle_request {
    /// an array of desired lines, specified by offset index for the associated GPIO device
    pub lineoffsets: [u32; GPIOHANDLES_MAX],
    /// desired flags for the desired GPIO lines, see [`LineRequestFlags`].
    ///
    /// Note that even if multiple lines are requested, the same flags
    /// must be applicable to all of them, if you want lines with individual
    /// flags set, request them one by one.
    pub flags: u32,
    /// if [`LineRequestFlags::OUTPUT`] is set for a requested
    /// line, this specifies the default output value, should be 0 (low) or
    /// 1 (high), anything else than 0 or 1 will be interpreted as 1 (high)
    pub default_values: [u8; GPIOHANDLES_MAX],
    /// a desired consumer label for the selected GPIO line(s)
    /// such as "my-bitbanged-relay"
    pub consumer_label: [u8; GPIO_MAX_NAME_SIZE],
    /// number of lines requested in this request, i.e. the number of
    /// valid fields in the above arrays, set to 1 to request a single line
    pub lines: u32,
    ///  if successful this field will contain a valid anonymous file handle
    ///  after a [`gpio_get_linehandle`] operation, zero or negative value
    ///  means error.
    pub fd: libc::c_int,
}

impl gpiohandle_request {
    pub const fn zeroed() -> Self {
        Self {
            lineoffsets: [0; GPIOHANDLES_MAX],
            flags: 0,
            default_values: [0; GPIOHANDLES_MAX],
            consumer_label: [0; GPIO_MAX_NAME_SIZE],
            lines: 0,
            fd: 0,
        }
    }

    /// The requested (or, after the ioctl, the granted) offsets.
    pub fn offsets(&self) -> &[u32] {
        let n = (self.lines as usize).min(GPIOHANDLES_MAX);
        &self.lineoffsets[..n]
    }
}

impl core::fmt::Debug for gpiohandle_request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let n = (self.lines as usize).min(GPIOHANDLES_MAX);
        f.debug_struct("gpiohandle_request")
            .field("lineoffsets", &self.offsets())
            .field("flags", &LineRequestFlags::from_bits_retain(self.flags))
            .field("default_values", &&self.default_values[..n])
            .field("consumer_label", &label_bytes(&self.consumer_label))
            .field("lines", &self.lines)
            .field("fd", &self.fd)
            .finish()
    }
}

/// Information of values on a GPIO handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct gpiohandle_data {
    /// When getting the state of lines this contains the current
    /// state of a line
    ///
    /// When setting the state of lines these should contain
    /// the desired target state
    pub values: [u8; GPIOHANDLES_MAX],
}

impl gpiohandle_data {
    pub const fn zeroed() -> Self {
        Self {
            values: [0; GPIOHANDLES_MAX],
        }
    }
}

/// Information about a GPIO event request
#[derive(Clone, Copy)]
#[repr(C)]
pub struct gpioevent_request {
    /// the desired line to subscribe to events from, specified by
    /// offset index for the associated GPIO device
    pub lineoffset: u32,
    /// desired handle flags for the desired GPIO line, see [`LineRequestFlags`]
    pub handleflags: u32,
    /// desired flags for the desired GPIO event line, see [`EventRequestFlags`]
    pub eventflags: u32,
    /// a desired consumer label for the selected GPIO line(s) such as "my-listener"
    pub consumer_label: [u8; GPIO_MAX_NAME_SIZE],
    /// if successful this field will contain a valid anonymous file handle
    /// after a [`gpio_get_lineevent`] operation, zero or negative value
    /// means error
    pub fd: libc::c_int,
}

impl gpioevent_request {
    pub const fn zeroed() -> Self {
        Self {
            lineoffset: 0,
            handleflags: 0,
            eventflags: 0,
            consumer_label: [0; GPIO_MAX_NAME_SIZE],
            fd: 0,
        }
    }
}

impl core::fmt::Debug for gpioevent_request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("gpioevent_request")
            .field("lineoffset", &self.lineoffset)
            .field("handleflags", &LineRequestFlags::from_bits_retain(self.handleflags))
            .field("eventflags", &EventRequestFlags::from_bits_retain(self.eventflags))
            .field("consumer_label", &label_bytes(&self.consumer_label))
            .field("fd", &self.fd)
            .finish()
    }
}

/// The actual event being pushed to userspace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct gpioevent_data {
    /// best estimate of time of event occurrence, in nanoseconds
    pub timestamp: u64,
    /// event identifier, `GPIOEVENT_EVENT_*`
    pub id: u32,
    pub _padding: u32,
}

impl gpioevent_data {
    /// Number of bytes a single read of an event descriptor must yield.
    pub const SIZE: usize = size_of::<Self>();

    /// Decode a record read from an event descriptor.
    pub fn from_bytes(buf: &[u8; Self::SIZE]) -> Self {
        let mut timestamp = [0; 8];
        let mut id = [0; 4];
        let mut padding = [0; 4];
        timestamp.copy_from_slice(&buf[..8]);
        id.copy_from_slice(&buf[8..12]);
        padding.copy_from_slice(&buf[12..]);
        Self {
            timestamp: u64::from_ne_bytes(timestamp),
            id: u32::from_ne_bytes(id),
            _padding: u32::from_ne_bytes(padding),
        }
    }

    /// Encode the record the way the kernel hands it out.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0; Self::SIZE];
        buf[..8].copy_from_slice(&self.timestamp.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.id.to_ne_bytes());
        buf[12..].copy_from_slice(&self._padding.to_ne_bytes());
        buf
    }
}

fn label_bytes(raw: &[u8]) -> &BStr {
    let nul = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    BStr::new(&raw[..nul])
}

pub const GPIO_GET_CHIPINFO_IOCTL: ioctl_num_type =
    request_code_read!(GPIO_IOC_MAGIC, 0x01, size_of::<gpiochip_info>());
pub const GPIO_GET_LINEINFO_IOCTL: ioctl_num_type =
    request_code_readwrite!(GPIO_IOC_MAGIC, 0x02, size_of::<gpioline_info>());
pub const GPIO_GET_LINEHANDLE_IOCTL: ioctl_num_type =
    request_code_readwrite!(GPIO_IOC_MAGIC, 0x03, size_of::<gpiohandle_request>());
pub const GPIO_GET_LINEEVENT_IOCTL: ioctl_num_type =
    request_code_readwrite!(GPIO_IOC_MAGIC, 0x04, size_of::<gpioevent_request>());
pub const GPIOHANDLE_GET_LINE_VALUES_IOCTL: ioctl_num_type =
    request_code_readwrite!(GPIO_IOC_MAGIC, 0x08, size_of::<gpiohandle_data>());
pub const GPIOHANDLE_SET_LINE_VALUES_IOCTL: ioctl_num_type =
    request_code_readwrite!(GPIO_IOC_MAGIC, 0x09, size_of::<gpiohandle_data>());

ioctl_read!(gpio_get_chipinfo, GPIO_IOC_MAGIC, 0x01, gpiochip_info);
ioctl_readwrite!(gpio_get_lineinfo, GPIO_IOC_MAGIC, 0x02, gpioline_info);
ioctl_readwrite!(gpio_get_linehandle, GPIO_IOC_MAGIC, 0x03, gpiohandle_request);
ioctl_readwrite!(gpio_get_lineevent, GPIO_IOC_MAGIC, 0x04, gpioevent_request);

ioctl_readwrite!(gpiohandle_get_line_values, GPIO_IOC_MAGIC, 0x08, gpiohandle_data);
ioctl_readwrite!(gpiohandle_set_line_values, GPIO_IOC_MAGIC, 0x09, gpiohandle_data);
