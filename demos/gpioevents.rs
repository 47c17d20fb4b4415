// Copyright (c) 2018 The rust-gpio-cdev Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use gpio_chardev::{Chip, EventRequestFlags, LineRequestFlags};
use quicli::prelude::*;
use std::path::PathBuf;
use std::time::Duration;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
struct Cli {
    /// The gpiochip device (e.g. /dev/gpiochip0)
    chip: PathBuf,
    /// The offset of the GPIO line for the provided chip
    line: u32,
    /// Give up after this many seconds without an edge
    #[structopt(long)]
    timeout_s: Option<u64>,
}

fn do_main(args: Cli) -> anyhow::Result<()> {
    let chip = Chip::open(&args.chip, "gpioevents")?;
    let handle = chip.get_line_event(
        args.line,
        LineRequestFlags::empty(),
        EventRequestFlags::BOTH_EDGES,
        "",
    )?;
    info!(
        "watching line {} on {} ({})",
        args.line,
        args.chip.display(),
        chip.info()
    );

    match args.timeout_s {
        Some(secs) => {
            while let Some(event) = handle.wait(Duration::from_secs(secs))? {
                println!("{:?}", event);
            }
            println!("no edge within {secs}s");
        }
        None => {
            for event in handle.events() {
                println!("{:?}", event?);
            }
        }
    }

    handle.close()?;
    chip.close()?;
    Ok(())
}

fn main() -> CliResult {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Cli::from_args();
    do_main(args).or_else(|e| {
        error!("{:?}", e);
        Ok(())
    })
}
