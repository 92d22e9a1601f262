// Copyright (c) The gtest-isolate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The in-process test framework.
//!
//! This is the single-process side of the runner: a flat registry of named test functions with
//! GoogleTest-compatible command line behavior (`--gtest_list_tests`, `--gtest_filter=`,
//! `--gtest_print_time=0`; unrecognized arguments are ignored). The isolation scheduler never
//! runs tests itself; it spawns this harness in a child process, one test per child.
//!
//! When a test fails, the harness serializes a single failure record and writes it to the
//! diagnostic fd (stderr, which the parent connects to a private pipe). The record format is
//! fixed: `<file>:(<line>) Failure in test <suite>.<name>\n<message>\n`.

use crate::test_filter::TestFilter;
use std::{
    cell::RefCell,
    io::{self, Write},
    panic::{self, AssertUnwindSafe},
    sync::Once,
    time::Instant,
};

/// A single test failure, carrying the location it was raised at.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestFailure {
    pub file: String,
    pub line: u32,
    pub message: String,
}

impl TestFailure {
    pub fn new(file: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

/// The result a test function reports.
pub type TestFnResult = Result<(), TestFailure>;

/// A registered test.
#[derive(Clone, Copy, Debug)]
pub struct TestDef {
    pub suite: &'static str,
    pub name: &'static str,
    pub run: fn() -> TestFnResult,
}

/// A registry of tests, in registration order.
#[derive(Clone, Debug, Default)]
pub struct Harness {
    tests: Vec<TestDef>,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a test. Registration order is the listing and execution order.
    pub fn add(&mut self, test: TestDef) -> &mut Self {
        self.tests.push(test);
        self
    }

    /// Runs the harness against a full argument vector (including argv[0]), returning the
    /// process exit status: 0 if every selected test passed, 1 otherwise.
    pub fn run_from_args(&self, args: &[String]) -> i32 {
        // The runner entry already printed its help text; gtest prints its own and runs nothing.
        if args.iter().skip(1).any(|a| a == "--help" || a == "-h") {
            return 0;
        }

        let mut filter = TestFilter::match_all();
        let mut print_time = true;
        let mut list_tests = false;
        for arg in args.iter().skip(1) {
            if let Some(spec) = arg.strip_prefix("--gtest_filter=") {
                // The last filter argument wins.
                filter = TestFilter::from_spec(spec);
            } else if arg == "--gtest_print_time=0" {
                print_time = false;
            } else if arg == "--gtest_list_tests" {
                list_tests = true;
            }
        }

        if list_tests {
            let stdout = io::stdout();
            match self.write_listing(&filter, stdout.lock()) {
                Ok(()) => return 0,
                Err(err) => {
                    log::error!("failed to write test listing: {}", err);
                    return 1;
                }
            }
        }

        self.run_filtered(&filter, print_time)
    }

    /// Writes the `--gtest_list_tests` output for tests passing the filter: a `Suite.` header
    /// line per suite, then one indented line per test.
    pub fn write_listing(&self, filter: &TestFilter, mut writer: impl Write) -> io::Result<()> {
        let mut current_suite = None;
        for test in self.selected(filter) {
            if current_suite != Some(test.suite) {
                writeln!(writer, "{}.", test.suite)?;
                current_suite = Some(test.suite);
            }
            writeln!(writer, "  {}", test.name)?;
        }
        Ok(())
    }

    fn selected<'a>(&'a self, filter: &'a TestFilter) -> impl Iterator<Item = &'a TestDef> + 'a {
        self.tests
            .iter()
            .filter(move |test| filter.matches(&format!("{}.{}", test.suite, test.name)))
    }

    fn run_filtered(&self, filter: &TestFilter, print_time: bool) -> i32 {
        install_panic_hook();

        let mut failed = 0usize;
        let mut ran = 0usize;
        for test in self.selected(filter) {
            ran += 1;
            println!("[ RUN      ] {}.{}", test.suite, test.name);
            let start = Instant::now();
            let outcome = run_one(test);
            let elapsed_ms = start.elapsed().as_millis();
            match outcome {
                Ok(()) => {
                    if print_time {
                        println!("[       OK ] {}.{} ({} ms)", test.suite, test.name, elapsed_ms);
                    } else {
                        println!("[       OK ] {}.{}", test.suite, test.name);
                    }
                }
                Err(failure) => {
                    failed += 1;
                    if write_failure_record(test, &failure).is_err() {
                        // The diagnostic fd is gone; nothing more useful can be reported.
                        return 1;
                    }
                    println!("[  FAILED  ] {}.{}", test.suite, test.name);
                }
            }
        }

        let passed = ran - failed;
        println!("[==========] {} {} ran.", ran, plural(ran, "test", "tests"));
        println!("[  PASSED  ] {} {}.", passed, plural(passed, "test", "tests"));
        if failed > 0 {
            println!("[  FAILED  ] {} {}.", failed, plural(failed, "test", "tests"));
            1
        } else {
            0
        }
    }
}

fn plural<'a>(count: usize, singular: &'a str, plural: &'a str) -> &'a str {
    if count == 1 {
        singular
    } else {
        plural
    }
}

/// Runs a single test function, converting panics into failures.
fn run_one(test: &TestDef) -> TestFnResult {
    PANIC_LOCATION.with(|loc| *loc.borrow_mut() = None);
    match panic::catch_unwind(AssertUnwindSafe(test.run)) {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_owned()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "test panicked".to_owned()
            };
            let (file, line) = PANIC_LOCATION
                .with(|loc| loc.borrow_mut().take())
                .unwrap_or_else(|| ("<unknown>".to_owned(), 0));
            Err(TestFailure::new(file, line, message))
        }
    }
}

thread_local! {
    static PANIC_LOCATION: RefCell<Option<(String, u32)>> = const { RefCell::new(None) };
}

fn install_panic_hook() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        // Record the panic location and keep the default hook from writing to the diagnostic
        // fd; the failure record is the only thing the parent should see there.
        panic::set_hook(Box::new(|info| {
            let location = info
                .location()
                .map(|loc| (loc.file().to_owned(), loc.line()));
            PANIC_LOCATION.with(|loc| *loc.borrow_mut() = location);
        }));
    });
}

/// Serializes the failure record and writes it in full to the diagnostic fd. `write_all` retries
/// interrupted writes and continues after short ones, which is exactly the contract the parent
/// relies on.
fn write_failure_record(test: &TestDef, failure: &TestFailure) -> io::Result<()> {
    let record = format!(
        "{}:({}) Failure in test {}.{}\n{}\n",
        failure.file, failure.line, test.suite, test.name, failure.message
    );
    let stderr = io::stderr();
    let mut stderr = stderr.lock();
    stderr.write_all(record.as_bytes())?;
    stderr.flush()
}

/// Fails the current test unless the two expressions compare equal.
#[macro_export]
macro_rules! check_eq {
    ($left:expr, $right:expr) => {{
        let (left, right) = (&$left, &$right);
        if left != right {
            return Err($crate::harness::TestFailure::new(
                file!(),
                line!(),
                format!(
                    "Expected equality of these values:\n  {:?}\n  {:?}",
                    left, right
                ),
            ));
        }
    }};
}

/// Fails the current test unless the condition holds.
#[macro_export]
macro_rules! check {
    ($cond:expr, $($fmt:tt)+) => {{
        if !$cond {
            return Err($crate::harness::TestFailure::new(
                file!(),
                line!(),
                format!($($fmt)+),
            ));
        }
    }};
}
