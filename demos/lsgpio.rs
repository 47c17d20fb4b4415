// Copyright (c) 2018 The rust-gpio-cdev Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Clone of functionality of linux/tools/gpio/lsgpio.c

use gpio_chardev::{chips, Direction};

fn main() {
    let chip_iterator = match chips("lsgpio") {
        Ok(chips) => chips,
        Err(e) => {
            println!("Failed to get chip iterator: {:?}", e);
            return;
        }
    };

    for chip in chip_iterator {
        let chip = match chip {
            Ok(chip) => chip,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        let chip_info = chip.info();
        println!(
            "GPIO chip: {}, \"{}\", \"{}\", {} GPIO Lines",
            chip.path().display(),
            chip_info.name(),
            chip_info.label(),
            chip_info.num_lines()
        );
        for (lineno, line) in chip.lines().enumerate() {
            let info = match line {
                Ok(l) => l,
                Err(e) => {
                    eprintln!("\tline {lineno:>3}: error {e}");
                    continue;
                }
            };

            let mut flags = vec![];

            if info.is_used() {
                flags.push("used");
            }

            if info.direction() == Direction::Output {
                flags.push("output");
            }

            if info.is_active_low() {
                flags.push("active-low");
            }
            if info.is_open_drain() {
                flags.push("open-drain");
            }
            if info.is_open_source() {
                flags.push("open-source");
            }

            let usage = if !flags.is_empty() {
                format!("[{}]", flags.join(" "))
            } else {
                "".to_owned()
            };

            println!(
                "\tline {lineno:>3}: {name} {consumer} {usage}",
                lineno = info.offset(),
                name = info.name().unwrap_or("unnamed"),
                consumer = info.consumer().unwrap_or("unused"),
                usage = usage,
            );
        }
        println!();

        if let Err(e) = chip.close() {
            eprintln!("failed to close {}: {e}", chip.path().display());
        }
    }
}
