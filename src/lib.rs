// Copyright (c) 2018 The rust-gpio-cdev Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The `gpio-chardev` crate provides access to the [GPIO character device
//! ABI](https://www.kernel.org/doc/Documentation/ABI/testing/gpio-cdev) in its
//! first revision (uAPI v1), stabilized with Linux v4.4.
//!
//! A [`Chip`] is an open `/dev/gpiochipN`. Lines are reserved from it as a
//! [`LineHandle`] (one or more lines read and written together) or as an
//! [`EventHandle`] (a single input line reporting edges). Handles keep the
//! chip's descriptor open: it is closed exactly once, after the chip and all
//! handles derived from it have been closed, whatever the order.
//!
//! Every type here can be shared between threads. Closing a handle while
//! another thread waits on it wakes the waiter with [`Error::AlreadyClosed`].
//!
//! # Examples
//!
//! The following example mirrors the state of one GPIO line onto another.
//!
//! ```no_run
//! use gpio_chardev::{Chip, EventKind, EventRequestFlags, LineRequestFlags};
//!
//! // Lines are offset within gpiochip0; see docs for more info on chips/lines
//! fn mirror_gpio(inputline: u32, outputline: u32) -> gpio_chardev::Result<()> {
//!     let chip = Chip::open("/dev/gpiochip0", "mirror-gpio")?;
//!     let output = chip.open_lines(LineRequestFlags::OUTPUT, "", &[outputline])?;
//!     let input = chip.get_line_event(
//!         inputline,
//!         LineRequestFlags::empty(),
//!         EventRequestFlags::BOTH_EDGES,
//!         "",
//!     )?;
//!
//!     for event in input.events() {
//!         let evt = event?;
//!         println!("{:?}", evt);
//!         match evt.kind() {
//!             EventKind::Rising => output.write(&[1])?,
//!             EventKind::Falling => output.write(&[0])?,
//!         }
//!     }
//!
//!     Ok(())
//! }
//!
//! # fn main() -> gpio_chardev::Result<()> {
//! #     mirror_gpio(0, 1)
//! # }
//! ```
//!
//! To get the state of a GPIO Line on a given chip:
//!
//! ```no_run
//! use gpio_chardev::{Chip, LineRequestFlags};
//!
//! # fn main() -> gpio_chardev::Result<()> {
//! // Read the state of GPIO4 on a raspberry pi.  /dev/gpiochip0
//! // maps to the driver for the SoC (builtin) GPIO controller.
//! let chip = Chip::open("/dev/gpiochip0", "read-input")?;
//! let handle = chip.open_lines(LineRequestFlags::INPUT, "", &[4])?;
//! for _ in 1..4 {
//!     println!("Value: {:?}", handle.read()?.get(4));
//! }
//! handle.close()?;
//! chip.close()?;
//! # Ok(()) }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

mod errors;

pub mod fixed_str;

#[allow(non_camel_case_types)]
pub mod uapi;

mod refcount;

pub mod chip;

pub mod line;

#[cfg(test)]
mod testing;

pub use chip::{chips, Chip, ChipInfo};
pub use errors::{Error, Result};
pub use line::{
    Direction, EventHandle, EventKind, LineEvent, LineHandle, LineInfo, LineRequest, LineSetter,
    LineValues,
};
pub use uapi::{Cdev, EventRequestFlags, IoctlKind, Kernel, LineFlags, LineRequestFlags};
