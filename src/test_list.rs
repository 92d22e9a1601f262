// Copyright (c) The gtest-isolate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test inventory: suites, their tests, and per-test results.
//!
//! The inventory is discovered once per process by running the wrapped binary in listing mode
//! (`--gtest_list_tests`) and parsing its stdout. Enumeration order is preserved and is the
//! dispatch order for every iteration.

use crate::errors::ListTestsError;
use duct::cmd;
use std::time::Duration;

/// Terminal outcome of a single test. A test with no outcome yet is pending.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TestResult {
    Pass,
    Fail,
    Timeout,
}

/// A single test and its mutable per-iteration state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestCase {
    pub name: String,

    /// `None` until the scheduler harvests the test's child process.
    pub result: Option<TestResult>,

    pub elapsed: Duration,

    /// Diagnostic text drained from the child's pipe, plus any message the scheduler
    /// synthesizes (timeout, signal). Append-only.
    pub failure_message: String,
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            result: None,
            elapsed: Duration::ZERO,
            failure_message: String::new(),
        }
    }
}

/// A suite and its tests, in enumeration order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestSuite {
    pub name: String,
    pub tests: Vec<TestCase>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tests: Vec::new(),
        }
    }
}

/// The full two-level inventory.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TestList {
    suites: Vec<TestSuite>,
}

impl TestList {
    /// Enumerates tests by running `argv ⊕ --gtest_list_tests` with captured stdout.
    ///
    /// `child_args` is the full child argument vector, argv[0] included. Fails if the listing
    /// child exits non-zero or its output doesn't parse.
    pub fn collect(child_args: &[String]) -> Result<Self, ListTestsError> {
        let mut args: Vec<&str> = child_args[1..].iter().map(String::as_str).collect();
        args.push("--gtest_list_tests");
        let output = cmd(child_args[0].as_str(), args)
            .stdout_capture()
            .read()
            .map_err(ListTestsError::Command)?;
        let list = Self::parse(&output)?;
        log::debug!(
            "enumerated {} tests in {} suites",
            list.test_count(),
            list.suites.len()
        );
        Ok(list)
    }

    /// Parses listing output. A token ending in `.` opens a suite; any other single token is a
    /// test in the most recently opened suite.
    pub fn parse(listing: &str) -> Result<Self, ListTestsError> {
        let mut suites: Vec<TestSuite> = Vec::new();
        for line in listing.lines() {
            let mut tokens = line.split_whitespace();
            let token = match tokens.next() {
                Some(token) => token,
                None => continue,
            };
            if tokens.next().is_some() {
                return Err(ListTestsError::UnexpectedToken {
                    line: line.to_owned(),
                });
            }
            if let Some(suite_name) = token.strip_suffix('.') {
                suites.push(TestSuite::new(suite_name));
            } else {
                match suites.last_mut() {
                    Some(suite) => suite.tests.push(TestCase::new(token)),
                    None => {
                        return Err(ListTestsError::TestBeforeSuite {
                            line: line.to_owned(),
                        })
                    }
                }
            }
        }
        Ok(Self { suites })
    }

    pub fn suites(&self) -> &[TestSuite] {
        &self.suites
    }

    pub fn suite_count(&self) -> usize {
        self.suites.len()
    }

    pub fn test_count(&self) -> usize {
        self.suites.iter().map(|suite| suite.tests.len()).sum()
    }

    /// The `Suite.test` name used for filters and reporting.
    pub fn test_name(&self, suite_idx: usize, test_idx: usize) -> String {
        let suite = &self.suites[suite_idx];
        format!("{}.{}", suite.name, suite.tests[test_idx].name)
    }

    pub fn case(&self, suite_idx: usize, test_idx: usize) -> &TestCase {
        &self.suites[suite_idx].tests[test_idx]
    }

    pub(crate) fn case_mut(&mut self, suite_idx: usize, test_idx: usize) -> &mut TestCase {
        &mut self.suites[suite_idx].tests[test_idx]
    }

    /// Clears per-test state before a repeat iteration.
    pub(crate) fn reset(&mut self) {
        for suite in &mut self.suites {
            for test in &mut suite.tests {
                test.result = None;
                test.elapsed = Duration::ZERO;
                test.failure_message.clear();
            }
        }
    }
}
