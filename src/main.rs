// Copyright (c) The gtest-isolate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use env_logger::fmt::Formatter;
use log::{Level, Record};
use owo_colors::{OwoColorize, Style};
use std::io::Write;
use std::process;
use owo_colors::Stream;

fn main() {
    init_logger();

    let harness = gtest_isolate::selftest::harness();
    match gtest_isolate::run(&harness) {
        Ok(code) => process::exit(code),
        Err(err) => {
            log::error!("{:#}", err);
            process::exit(1);
        }
    }
}

fn init_logger() {
    env_logger::Builder::from_env("GTEST_ISOLATE_LOG")
        .format(format_fn)
        .init();
}

fn format_fn(f: &mut Formatter, record: &Record<'_>) -> std::io::Result<()> {
    match record.level() {
        Level::Error => writeln!(
            f,
            "{}: {}",
            "error".if_supports_color(Stream::Stderr, |s| s.style(Style::new().bold().red())),
            record.args()
        ),
        Level::Warn => writeln!(
            f,
            "{}: {}",
            "warning".if_supports_color(Stream::Stderr, |s| s.style(Style::new().bold().yellow())),
            record.args()
        ),
        _ => writeln!(f, "[{}] {}", record.level(), record.args()),
    }
}
