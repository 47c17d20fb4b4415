// Copyright (c) 2018 The rust-gpio-cdev Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use gpio_chardev::{Chip, LineRequest};
use quicli::prelude::*;
use std::path::PathBuf;
use std::thread::sleep;
use std::time::{Duration, Instant};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
struct Cli {
    /// The gpiochip device (e.g. /dev/gpiochip0)
    chip: PathBuf,
    /// The offset of the GPIO lines for the provided chip
    #[structopt(required = true)]
    lines: Vec<u32>,
    /// Period in milliseconds
    #[structopt(long, default_value = "500")]
    period_ms: u64,
    /// Duration over which to blink in milliseconds
    #[structopt(long, default_value = "5000")]
    duration_ms: u64,
}

fn do_main(args: Cli) -> anyhow::Result<()> {
    let chip = Chip::open(&args.chip, "blinky")?;

    // NOTE: we set the default value to the desired state so
    // setting it separately is not required
    let on = vec![1; args.lines.len()];
    let off = vec![0; args.lines.len()];
    let handle = chip.request_lines(&LineRequest::output(&args.lines).with_defaults(&on))?;

    let period = Duration::from_millis(args.period_ms);
    let duration = Duration::from_millis(args.duration_ms);
    let start_time = Instant::now();
    while start_time.elapsed() < duration {
        sleep(period);
        handle.write(&off)?;
        sleep(period);
        handle.write(&on)?;
    }

    handle.write(&off)?;
    handle.close()?;
    chip.close()?;
    Ok(())
}

fn main() -> CliResult {
    let args = Cli::from_args();
    do_main(args).or_else(|e| {
        error!("{:?}", e);
        Ok(())
    })
}
