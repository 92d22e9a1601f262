// Copyright (c) The gtest-isolate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by gtest-isolate.

use camino::Utf8PathBuf;
use std::{error, fmt, io};

/// An error that occurred while picking runner options out of the argument list.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ArgumentError {
    /// The job count passed to `-j` was zero, negative or not a number.
    InvalidJobCount(String),

    /// The `--deadline` value was zero, negative or not a number.
    InvalidDeadline(String),

    /// The `--warnline` value was zero, negative or not a number.
    InvalidWarnline(String),

    /// The `--gtest_repeat` value was negative or not a number.
    InvalidRepeat(String),

    /// The `--gtest_output` spec was not of the form `xml:PATH`, or the path could not be
    /// resolved.
    InvalidOutput(String),
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ArgumentError::InvalidJobCount(value) => write!(f, "invalid job count: {}", value),
            ArgumentError::InvalidDeadline(value) => write!(f, "invalid deadline: {}", value),
            ArgumentError::InvalidWarnline(value) => write!(f, "invalid warnline: {}", value),
            ArgumentError::InvalidRepeat(value) => {
                write!(f, "invalid gtest_repeat count: {}", value)
            }
            ArgumentError::InvalidOutput(value) => {
                write!(f, "invalid gtest_output file: {}", value)
            }
        }
    }
}

impl error::Error for ArgumentError {}

/// An error that occurred while enumerating tests through a listing child.
#[derive(Debug)]
#[non_exhaustive]
pub enum ListTestsError {
    /// Running the listing child failed, or it exited non-zero.
    Command(io::Error),

    /// A listing line carried more than one token.
    UnexpectedToken { line: String },

    /// A test entry appeared before any suite header.
    TestBeforeSuite { line: String },
}

impl fmt::Display for ListTestsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ListTestsError::Command(_) => write!(f, "failed to list tests"),
            ListTestsError::UnexpectedToken { line } => {
                write!(f, "unexpected token in test listing line '{}'", line)
            }
            ListTestsError::TestBeforeSuite { line } => {
                write!(f, "test entry '{}' appeared before any suite header", line)
            }
        }
    }
}

impl error::Error for ListTestsError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ListTestsError::Command(err) => Some(err),
            ListTestsError::UnexpectedToken { .. } | ListTestsError::TestBeforeSuite { .. } => None,
        }
    }
}

/// An error that occurred while writing the XML report.
#[derive(Debug)]
pub struct WriteXmlError {
    path: Utf8PathBuf,
    err: WriteXmlErrorKind,
}

#[derive(Debug)]
pub(crate) enum WriteXmlErrorKind {
    Io(io::Error),
    Xml(quick_xml::Error),
}

impl WriteXmlError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, err: impl Into<WriteXmlErrorKind>) -> Self {
        Self {
            path: path.into(),
            err: err.into(),
        }
    }
}

impl From<io::Error> for WriteXmlErrorKind {
    fn from(err: io::Error) -> Self {
        WriteXmlErrorKind::Io(err)
    }
}

impl From<quick_xml::Error> for WriteXmlErrorKind {
    fn from(err: quick_xml::Error) -> Self {
        WriteXmlErrorKind::Xml(err)
    }
}

impl fmt::Display for WriteXmlError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "failed to write XML report to '{}'", self.path)
    }
}

impl error::Error for WriteXmlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.err {
            WriteXmlErrorKind::Io(err) => Some(err),
            WriteXmlErrorKind::Xml(err) => Some(err),
        }
    }
}
