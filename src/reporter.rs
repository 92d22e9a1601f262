// Copyright (c) The gtest-isolate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Console reporting.
//!
//! The output format follows gtest's pretty printer: a green banner per iteration, one tagged
//! line per finished test followed by its diagnostic text, and an iteration summary listing
//! failed, timed-out and slow tests.

use crate::{
    args::Color,
    runner::TestEvent,
    test_list::{TestList, TestResult},
};
use owo_colors::{OwoColorize, Style};
use std::{
    io::{self, Write},
    time::Duration,
};

/// Writes test events to a console writer.
pub struct TestReporter {
    styles: Box<Styles>,
    print_time: bool,
    warnline_ms: u64,
}

impl TestReporter {
    pub fn new(color: Color, print_time: bool, warnline_ms: u64) -> Self {
        let mut styles = Box::<Styles>::default();
        if color.should_colorize(supports_color::Stream::Stdout) {
            styles.colorize();
        }
        Self {
            styles,
            print_time,
            warnline_ms,
        }
    }

    /// Reports a test event to the given writer.
    pub fn report_event(&mut self, event: &TestEvent<'_>, mut writer: impl Write) -> io::Result<()> {
        match event {
            TestEvent::IterationStarted {
                iteration,
                iteration_count,
                test_list,
            } => {
                if *iteration_count > 1 {
                    write!(
                        writer,
                        "\nRepeating all tests (iteration {}) . . .\n\n",
                        iteration
                    )?;
                }
                let test_count = test_list.test_count();
                let suite_count = test_list.suite_count();
                write!(writer, "{}", "[==========] ".style(self.styles.pass))?;
                writeln!(
                    writer,
                    "Running {} {} from {} {}.",
                    test_count,
                    plural(test_count, "test", "tests"),
                    suite_count,
                    plural(suite_count, "test case", "test cases"),
                )?;
                writer.flush()
            }
            TestEvent::TestFinished { suite_name, test } => {
                let tag = match test.result {
                    Some(TestResult::Pass) => "[    OK    ] ".style(self.styles.pass),
                    Some(TestResult::Timeout) => "[ TIMEOUT  ] ".style(self.styles.fail),
                    Some(TestResult::Fail) | None => "[  FAILED  ] ".style(self.styles.fail),
                };
                write!(writer, "{}{}.{}", tag, suite_name, test.name)?;
                if self.print_time {
                    writeln!(writer, " ({} ms)", test.elapsed.as_millis())?;
                } else {
                    writeln!(writer)?;
                }
                write!(writer, "{}", test.failure_message)?;
                writer.flush()
            }
            TestEvent::IterationFinished {
                test_list, elapsed, ..
            } => {
                self.write_summary(test_list, *elapsed, &mut writer)?;
                writer.flush()
            }
        }
    }

    fn write_summary(
        &self,
        test_list: &TestList,
        elapsed: Duration,
        mut writer: impl Write,
    ) -> io::Result<()> {
        let summary = Summary::compute(test_list, self.warnline_ms);

        write!(writer, "{}", "[==========] ".style(self.styles.pass))?;
        write!(
            writer,
            "{} {} from {} {} ran.",
            summary.test_count,
            plural(summary.test_count, "test", "tests"),
            summary.suite_count,
            plural(summary.suite_count, "test case", "test cases"),
        )?;
        if self.print_time {
            write!(writer, " ({} ms total)", elapsed.as_millis())?;
        }
        writeln!(writer)?;
        write!(writer, "{}", "[   PASS   ] ".style(self.styles.pass))?;
        writeln!(
            writer,
            "{} {}.",
            summary.success_count,
            plural(summary.success_count, "test", "tests"),
        )?;

        let fail_count = summary.failed.len();
        if fail_count > 0 {
            write!(writer, "{}", "[   FAIL   ] ".style(self.styles.fail))?;
            writeln!(
                writer,
                "{} {}, listed below:",
                fail_count,
                plural(fail_count, "test", "tests"),
            )?;
            for name in &summary.failed {
                write!(writer, "{}", "[   FAIL   ] ".style(self.styles.fail))?;
                writeln!(writer, "{}", name)?;
            }
        }

        let timeout_count = summary.timed_out.len();
        if timeout_count > 0 {
            write!(writer, "{}", "[ TIMEOUT  ] ".style(self.styles.fail))?;
            writeln!(
                writer,
                "{} {}, listed below:",
                timeout_count,
                plural(timeout_count, "test", "tests"),
            )?;
            for (name, stopped_at) in &summary.timed_out {
                write!(writer, "{}", "[ TIMEOUT  ] ".style(self.styles.fail))?;
                writeln!(writer, "{} (stopped at {} ms)", name, stopped_at.as_millis())?;
            }
        }

        let slow_count = summary.slow.len();
        if slow_count > 0 {
            write!(writer, "{}", "[   SLOW   ] ".style(self.styles.warn))?;
            writeln!(
                writer,
                "{} {}, listed below:",
                slow_count,
                plural(slow_count, "test", "tests"),
            )?;
            for (name, elapsed) in &summary.slow {
                write!(writer, "{}", "[   SLOW   ] ".style(self.styles.warn))?;
                writeln!(
                    writer,
                    "{} ({} ms, exceed warnline {} ms)",
                    name,
                    elapsed.as_millis(),
                    self.warnline_ms,
                )?;
            }
        }

        if fail_count > 0 {
            writeln!(
                writer,
                "\n{:2} FAILED {}",
                fail_count,
                plural(fail_count, "TEST", "TESTS"),
            )?;
        }
        if timeout_count > 0 {
            writeln!(
                writer,
                "{:2} TIMEOUT {}",
                timeout_count,
                plural(timeout_count, "TEST", "TESTS"),
            )?;
        }
        if slow_count > 0 {
            writeln!(
                writer,
                "{:2} SLOW {}",
                slow_count,
                plural(slow_count, "TEST", "TESTS"),
            )?;
        }
        Ok(())
    }
}

/// Per-iteration aggregates, computed once after every test has a terminal outcome.
struct Summary {
    suite_count: usize,
    test_count: usize,
    success_count: usize,
    failed: Vec<String>,
    timed_out: Vec<(String, Duration)>,
    /// Tests at or over the warnline that didn't time out. Failed tests can be slow too.
    slow: Vec<(String, Duration)>,
}

impl Summary {
    fn compute(test_list: &TestList, warnline_ms: u64) -> Self {
        let mut summary = Summary {
            suite_count: test_list.suite_count(),
            test_count: 0,
            success_count: 0,
            failed: Vec::new(),
            timed_out: Vec::new(),
            slow: Vec::new(),
        };
        for suite in test_list.suites() {
            for test in &suite.tests {
                summary.test_count += 1;
                let name = format!("{}.{}", suite.name, test.name);
                match test.result {
                    Some(TestResult::Pass) => summary.success_count += 1,
                    Some(TestResult::Fail) => summary.failed.push(name.clone()),
                    Some(TestResult::Timeout) => {
                        summary.timed_out.push((name.clone(), test.elapsed))
                    }
                    None => {}
                }
                if test.result != Some(TestResult::Timeout)
                    && test.elapsed.as_millis() >= u128::from(warnline_ms)
                {
                    summary.slow.push((name, test.elapsed));
                }
            }
        }
        summary
    }
}

fn plural<'a>(count: usize, singular: &'a str, plural: &'a str) -> &'a str {
    if count == 1 {
        singular
    } else {
        plural
    }
}

#[derive(Debug, Default)]
struct Styles {
    pass: Style,
    fail: Style,
    warn: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.pass = Style::new().green();
        self.fail = Style::new().red();
        self.warn = Style::new().yellow();
    }
}
