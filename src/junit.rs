// Copyright (c) The gtest-isolate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JUnit-style XML reports.
//!
//! The document shape is fixed by the consumers of gtest's own XML printer: a `<testsuites>`
//! root carrying aggregate counts, one `<testsuite>` per suite, one `<testcase>` per test.
//! Passing testcases are empty elements; non-passing ones carry a single `<failure>` child
//! whose `message` attribute is the captured diagnostic text. Every non-Pass outcome counts as
//! a failure. The report is rewritten from scratch each iteration.

use crate::{
    errors::WriteXmlError,
    test_list::{TestList, TestResult},
};
use camino::Utf8Path;
use chrono::{DateTime, Local};
use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, Event},
    Writer,
};
use std::{
    fs::File,
    io,
    time::{Duration, SystemTime},
};

static TESTSUITES_TAG: &str = "testsuites";
static TESTSUITE_TAG: &str = "testsuite";
static TESTCASE_TAG: &str = "testcase";
static FAILURE_TAG: &str = "failure";

/// Writes the report for one finished iteration, replacing any previous file.
pub fn write_report(
    path: &Utf8Path,
    test_list: &TestList,
    start_time: SystemTime,
    elapsed: Duration,
) -> Result<(), WriteXmlError> {
    let file = File::create(path).map_err(|err| WriteXmlError::new(path, err))?;
    let timestamp = format_timestamp(start_time);
    serialize_report(test_list, &timestamp, elapsed, file)
        .map_err(|err| WriteXmlError::new(path, err))
}

/// The gtest timestamp format, in local time.
fn format_timestamp(start_time: SystemTime) -> String {
    let datetime: DateTime<Local> = start_time.into();
    datetime.format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn seconds(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}

pub(crate) fn serialize_report(
    test_list: &TestList,
    timestamp: &str,
    elapsed: Duration,
    writer: impl io::Write,
) -> quick_xml::Result<()> {
    let mut writer = Writer::new_with_indent(writer, b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let total_tests = test_list.test_count();
    let total_failures: usize = test_list
        .suites()
        .iter()
        .map(|suite| {
            suite
                .tests
                .iter()
                .filter(|test| test.result != Some(TestResult::Pass))
                .count()
        })
        .sum();

    let mut testsuites_tag = BytesStart::new(TESTSUITES_TAG);
    testsuites_tag.extend_attributes([
        ("tests", total_tests.to_string().as_str()),
        ("failures", total_failures.to_string().as_str()),
        ("disabled", "0"),
        ("errors", "0"),
        ("timestamp", timestamp),
        ("time", seconds(elapsed).as_str()),
        ("name", "AllTests"),
    ]);
    writer.write_event(Event::Start(testsuites_tag))?;

    for suite in test_list.suites() {
        let failures = suite
            .tests
            .iter()
            .filter(|test| test.result != Some(TestResult::Pass))
            .count();
        let elapsed: Duration = suite.tests.iter().map(|test| test.elapsed).sum();

        let mut testsuite_tag = BytesStart::new(TESTSUITE_TAG);
        testsuite_tag.extend_attributes([
            ("name", suite.name.as_str()),
            ("tests", suite.tests.len().to_string().as_str()),
            ("failures", failures.to_string().as_str()),
            ("disabled", "0"),
            ("errors", "0"),
            ("time", seconds(elapsed).as_str()),
        ]);
        writer.write_event(Event::Start(testsuite_tag))?;

        for test in &suite.tests {
            let mut testcase_tag = BytesStart::new(TESTCASE_TAG);
            testcase_tag.extend_attributes([
                ("name", test.name.as_str()),
                ("status", "run"),
                ("time", seconds(test.elapsed).as_str()),
                ("classname", suite.name.as_str()),
            ]);
            if test.result == Some(TestResult::Pass) {
                writer.write_event(Event::Empty(testcase_tag))?;
            } else {
                writer.write_event(Event::Start(testcase_tag))?;
                let mut failure_tag = BytesStart::new(FAILURE_TAG);
                failure_tag.extend_attributes([
                    ("message", test.failure_message.as_str()),
                    ("type", ""),
                ]);
                writer.write_event(Event::Start(failure_tag))?;
                writer.write_event(Event::End(BytesEnd::new(FAILURE_TAG)))?;
                writer.write_event(Event::End(BytesEnd::new(TESTCASE_TAG)))?;
            }
        }

        writer.write_event(Event::End(BytesEnd::new(TESTSUITE_TAG)))?;
    }

    writer.write_event(Event::End(BytesEnd::new(TESTSUITES_TAG)))?;

    // Trailing newline.
    let mut inner = writer.into_inner();
    inner.write_all(b"\n")?;
    Ok(())
}
