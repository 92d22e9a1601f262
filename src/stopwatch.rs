// Copyright (c) The gtest-isolate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stopwatch for tracking how long tests take to run.
//!
//! Each test needs a start time and a duration. For that we use a combination of a `SystemTime`
//! (realtime clock, reported in the XML timestamp) and an `Instant` (monotonic clock, used for
//! elapsed times and deadlines).

use std::time::{Duration, Instant, SystemTime};

/// The start state of a stopwatch.
#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    start_time: SystemTime,
    instant: Instant,
}

impl StopwatchStart {
    pub(crate) fn now() -> Self {
        Self {
            // These two syscalls will happen imperceptibly close to each other, which is good
            // enough for our purposes.
            start_time: SystemTime::now(),
            instant: Instant::now(),
        }
    }

    /// The absolute monotonic instant `duration` past the start.
    pub(crate) fn deadline(&self, duration: Duration) -> Instant {
        self.instant + duration
    }

    #[inline]
    pub(crate) fn elapsed(&self) -> Duration {
        self.instant.elapsed()
    }

    pub(crate) fn end(&self) -> StopwatchEnd {
        StopwatchEnd {
            start_time: self.start_time,
            duration: self.instant.elapsed(),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct StopwatchEnd {
    pub(crate) start_time: SystemTime,
    pub(crate) duration: Duration,
}
