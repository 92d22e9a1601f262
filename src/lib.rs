// Copyright (c) The gtest-isolate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! gtest-isolate runs each test of a GoogleTest-style test binary in its own short-lived child
//! process, up to `-j` of them in parallel, with a per-test deadline.
//!
//! The runner and the test framework share one executable: the embedding binary's `main` hands
//! its argument vector to [`run`]. In isolation mode (the default) the runner re-invokes
//! argv[0] in listing mode to discover the inventory, then schedules one child per test and
//! aggregates outcomes into console output and an optional JUnit XML report. With
//! `--no-isolate` (which the runner also inserts into every child's argument vector) the whole
//! vector is delegated to the in-process [`harness`](crate::harness) instead.

pub mod args;
pub mod errors;
pub mod harness;
pub mod junit;
pub mod reporter;
pub mod runner;
pub mod selftest;
mod stopwatch;
pub mod test_filter;
pub mod test_list;

use crate::{
    harness::Harness,
    reporter::TestReporter,
    runner::{TestEvent, TestRunner},
    test_list::TestList,
};
use anyhow::Result;
use std::{env, io};

/// Runs the full tool against the process argument vector. Returns the process exit code:
/// isolation mode exits 0 whenever the run itself completed (test failures are reported, not
/// errors); single-process mode returns the framework status.
pub fn run(harness: &Harness) -> Result<i32> {
    run_from_args(env::args().collect(), harness)
}

/// Like [`run`], with an explicit argument vector (argv[0] included).
pub fn run_from_args(mut args: Vec<String>, harness: &Harness) -> Result<i32> {
    let opts = args::pick_options(&mut args)?;
    if !opts.isolate {
        return Ok(harness.run_from_args(&args));
    }

    let mut test_list = TestList::collect(&args)?;
    let runner = TestRunner::new(&opts, &args);
    let mut reporter = TestReporter::new(opts.color, opts.print_time, opts.warnline_ms);
    let xml_output_path = opts.xml_output_path.clone();

    let stdout = io::stdout();
    runner.try_execute(&mut test_list, |event| {
        reporter.report_event(&event, stdout.lock())?;
        if let TestEvent::IterationFinished {
            test_list,
            start_time,
            elapsed,
            ..
        } = &event
        {
            if let Some(path) = &xml_output_path {
                junit::write_report(path, test_list, *start_time, *elapsed)?;
            }
        }
        Ok(())
    })?;

    Ok(0)
}
