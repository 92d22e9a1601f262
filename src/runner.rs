// Copyright (c) The gtest-isolate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The isolation scheduler.
//!
//! The parent stays single-threaded; all concurrency is child processes. Up to `job_count`
//! slots hold running children, dispatched in inventory order. The wait loop multiplexes
//! completion detection (a non-blocking reap scan over the busy slots) with deadline
//! enforcement (an absolute-deadline scan, run only when nothing was reaped), sleeping 1 ms
//! between rounds. Harvesting a finished slot reaps a timed-out child with SIGKILL, drains the
//! child's diagnostic pipe to EOF, classifies the outcome and reports it, then frees the slot.
//!
//! Threads are deliberately absent here: a thread-per-child design would mean spawning from a
//! multi-threaded parent, and the 1 ms poll keeps the loop portable.

use crate::{
    args::IsolationOpts,
    stopwatch::StopwatchStart,
    test_list::{TestList, TestResult},
};
use anyhow::{Context, Result};
use std::{
    io::Read,
    os::unix::process::ExitStatusExt,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant, SystemTime},
};

/// An event reported to the caller's callback. Each test is reported in the same harvest step
/// that records its outcome.
#[derive(Debug)]
pub enum TestEvent<'list> {
    IterationStarted {
        /// 1-based.
        iteration: usize,
        iteration_count: usize,
        test_list: &'list TestList,
    },
    TestFinished {
        suite_name: &'list str,
        test: &'list crate::test_list::TestCase,
    },
    IterationFinished {
        iteration: usize,
        test_list: &'list TestList,
        start_time: SystemTime,
        elapsed: Duration,
    },
}

/// Drives one test run: `max(repeat, 1)` iterations over the inventory, each test in its own
/// child process.
pub struct TestRunner<'a> {
    child_args: &'a [String],
    job_count: usize,
    deadline: Duration,
    repeat: usize,
}

impl<'a> TestRunner<'a> {
    /// `child_args` is the partitioned child argument vector (argv[0] included, `--no-isolate`
    /// already inserted).
    pub fn new(opts: &IsolationOpts, child_args: &'a [String]) -> Self {
        Self {
            child_args,
            job_count: opts.job_count,
            deadline: Duration::from_millis(opts.deadline_ms),
            repeat: opts.repeat,
        }
    }

    /// Runs every iteration, invoking the callback per event. Callback errors and OS errors
    /// are both fatal and abort the run.
    pub fn try_execute<F>(&self, test_list: &mut TestList, mut callback: F) -> Result<()>
    where
        F: FnMut(TestEvent<'_>) -> Result<()>,
    {
        let iteration_count = self.repeat.max(1);
        for iteration in 1..=iteration_count {
            if iteration > 1 {
                test_list.reset();
            }
            callback(TestEvent::IterationStarted {
                iteration,
                iteration_count,
                test_list,
            })?;
            let stopwatch = StopwatchStart::now();

            self.run_iteration(test_list, &mut callback)?;

            let end = stopwatch.end();
            callback(TestEvent::IterationFinished {
                iteration,
                test_list,
                start_time: end.start_time,
                elapsed: end.duration,
            })?;
        }
        Ok(())
    }

    fn run_iteration<F>(&self, test_list: &mut TestList, callback: &mut F) -> Result<()>
    where
        F: FnMut(TestEvent<'_>) -> Result<()>,
    {
        let total = test_list.test_count();
        let mut slots: Vec<Option<ChildSlot>> = (0..self.job_count).map(|_| None).collect();
        let mut cursor = Cursor::new(test_list);
        let mut finished = 0;

        while finished < total {
            // Fill every free slot while tests remain.
            for slot in &mut slots {
                if slot.is_none() {
                    if let Some((suite_idx, test_idx)) = cursor.next() {
                        *slot = Some(self.spawn_test(test_list, suite_idx, test_idx)?);
                    }
                }
            }

            wait_children(&mut slots)?;

            for slot in &mut slots {
                if matches!(slot, Some(s) if s.done) {
                    let child = slot.take().expect("slot was checked to be busy");
                    let (suite_idx, test_idx) = (child.suite_idx, child.test_idx);
                    self.harvest(child, test_list)?;
                    finished += 1;
                    let suite = &test_list.suites()[suite_idx];
                    callback(TestEvent::TestFinished {
                        suite_name: &suite.name,
                        test: &suite.tests[test_idx],
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Spawns one child running exactly one test: argv[0] re-invoked with the child argument
    /// vector plus `--gtest_filter=Suite.test` appended. Stdout is discarded (children do not
    /// stream output); stderr is the private diagnostic pipe.
    fn spawn_test(
        &self,
        test_list: &TestList,
        suite_idx: usize,
        test_idx: usize,
    ) -> Result<ChildSlot> {
        let test_name = test_list.test_name(suite_idx, test_idx);
        let child = Command::new(&self.child_args[0])
            .args(&self.child_args[1..])
            .arg(format!("--gtest_filter={}", test_name))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn child process for {}", test_name))?;
        log::debug!("spawned pid {} for {}", child.id(), test_name);

        let stopwatch = StopwatchStart::now();
        let deadline = stopwatch.deadline(self.deadline);
        Ok(ChildSlot {
            child,
            stopwatch,
            deadline,
            suite_idx,
            test_idx,
            done: false,
            timed_out: false,
            status: None,
        })
    }

    /// Finalizes a finished slot: reap (SIGKILL first if timed out), drain, classify, record.
    fn harvest(&self, mut slot: ChildSlot, test_list: &mut TestList) -> Result<()> {
        let elapsed = slot.stopwatch.elapsed();
        let test_name = test_list.test_name(slot.suite_idx, slot.test_idx);

        let status = if slot.timed_out {
            log::debug!("killing pid {}: {} exceeded its deadline", slot.child.id(), test_name);
            slot.child
                .kill()
                .with_context(|| format!("failed to kill child process for {}", test_name))?;
            slot.child
                .wait()
                .with_context(|| format!("failed to wait for killed child for {}", test_name))?
        } else {
            slot.status.expect("reaped slot carries an exit status")
        };

        // The child is gone, so the pipe has a bounded amount of data left; drain it to EOF.
        let mut diagnostics = Vec::new();
        slot.child
            .stderr
            .take()
            .expect("child stderr was piped")
            .read_to_end(&mut diagnostics)
            .with_context(|| format!("failed to read output pipe for {}", test_name))?;

        let case = test_list.case_mut(slot.suite_idx, slot.test_idx);
        case.elapsed = elapsed;
        case.failure_message
            .push_str(&String::from_utf8_lossy(&diagnostics));

        if slot.timed_out {
            case.result = Some(TestResult::Timeout);
            case.failure_message.push_str(&format!(
                "{} killed because of timeout at {} ms.\n",
                test_name,
                elapsed.as_millis()
            ));
        } else if let Some(signal) = status.signal() {
            case.result = Some(TestResult::Fail);
            case.failure_message.push_str(&format!(
                "{} terminated by signal: {}.\n",
                test_name,
                signal_name(signal)
            ));
        } else if status.success() {
            case.result = Some(TestResult::Pass);
        } else {
            case.result = Some(TestResult::Fail);
        }
        Ok(())
    }
}

/// Per-slot child state. A free slot is `None` in the slot vector.
struct ChildSlot {
    child: Child,
    stopwatch: StopwatchStart,
    deadline: Instant,
    suite_idx: usize,
    test_idx: usize,
    done: bool,
    timed_out: bool,
    status: Option<ExitStatus>,
}

/// Blocks until at least one busy slot is done, alternating a non-blocking reap scan with a
/// deadline scan. The reap branch runs first each round, so a child that finishes right at its
/// deadline is classified by its exit status, not as a timeout.
fn wait_children(slots: &mut [Option<ChildSlot>]) -> Result<()> {
    loop {
        let mut transitioned = false;
        for slot in slots.iter_mut().flatten() {
            match slot.child.try_wait().context("failed to wait for child process")? {
                Some(status) => {
                    slot.done = true;
                    slot.timed_out = false;
                    slot.status = Some(status);
                    transitioned = true;
                }
                None => {}
            }
        }

        if !transitioned {
            let now = Instant::now();
            for slot in slots.iter_mut().flatten() {
                if slot.deadline <= now {
                    slot.done = true;
                    slot.timed_out = true;
                    transitioned = true;
                }
            }
        }

        if transitioned {
            return Ok(());
        }
        // Nothing finished and nothing expired; don't busy-loop.
        thread::sleep(Duration::from_millis(1));
    }
}

/// Walks the inventory in `(suite_idx, test_idx)` lexicographic order, skipping suites that
/// enumerated empty.
struct Cursor {
    counts: Vec<usize>,
    suite_idx: usize,
    test_idx: usize,
}

impl Cursor {
    fn new(test_list: &TestList) -> Self {
        Self {
            counts: test_list
                .suites()
                .iter()
                .map(|suite| suite.tests.len())
                .collect(),
            suite_idx: 0,
            test_idx: 0,
        }
    }

    fn next(&mut self) -> Option<(usize, usize)> {
        while self.suite_idx < self.counts.len() && self.test_idx >= self.counts[self.suite_idx] {
            self.suite_idx += 1;
            self.test_idx = 0;
        }
        if self.suite_idx >= self.counts.len() {
            return None;
        }
        let next = (self.suite_idx, self.test_idx);
        self.test_idx += 1;
        Some(next)
    }
}

/// Human-readable signal names, matching what `strsignal(3)` reports for the signals a test is
/// likely to die from.
fn signal_name(signal: i32) -> String {
    let name = match signal {
        libc::SIGHUP => "Hangup",
        libc::SIGINT => "Interrupt",
        libc::SIGQUIT => "Quit",
        libc::SIGILL => "Illegal instruction",
        libc::SIGTRAP => "Trace/breakpoint trap",
        libc::SIGABRT => "Aborted",
        libc::SIGBUS => "Bus error",
        libc::SIGFPE => "Floating point exception",
        libc::SIGKILL => "Killed",
        libc::SIGUSR1 => "User defined signal 1",
        libc::SIGSEGV => "Segmentation fault",
        libc::SIGUSR2 => "User defined signal 2",
        libc::SIGPIPE => "Broken pipe",
        libc::SIGALRM => "Alarm clock",
        libc::SIGTERM => "Terminated",
        _ => return format!("Unknown signal {}", signal),
    };
    name.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn opts(job_count: usize) -> IsolationOpts {
        IsolationOpts {
            job_count,
            ..IsolationOpts::default()
        }
    }

    fn run_against(program: &str, job_count: usize, listing: &str) -> (TestList, Vec<String>) {
        let child_args = vec![program.to_owned()];
        let mut test_list = TestList::parse(listing).unwrap();
        let runner = TestRunner::new(&opts(job_count), &child_args);
        let mut order = Vec::new();
        runner
            .try_execute(&mut test_list, |event| {
                if let TestEvent::TestFinished { suite_name, test } = event {
                    order.push(format!("{}.{}", suite_name, test.name));
                }
                Ok(())
            })
            .unwrap();
        (test_list, order)
    }

    #[test]
    fn test_all_pass_with_true() {
        // `true` ignores the filter argument and exits 0, which classifies as Pass.
        let (list, order) = run_against("true", 2, "Smoke.\n  a\n  b\n  c\n");
        assert_eq!(order.len(), 3);
        for suite in list.suites() {
            for test in &suite.tests {
                assert_eq!(test.result, Some(TestResult::Pass));
                assert!(test.failure_message.is_empty());
            }
        }
    }

    #[test]
    fn test_all_fail_with_false() {
        let (list, _) = run_against("false", 3, "Smoke.\n  a\n  b\n");
        for suite in list.suites() {
            for test in &suite.tests {
                assert_eq!(test.result, Some(TestResult::Fail));
            }
        }
    }

    #[test]
    fn test_sequential_dispatch_preserves_order() {
        // With a single slot, completion order must equal inventory order.
        let (_, order) = run_against("true", 1, "A.\n  one\n  two\nB.\n  three\n");
        assert_eq!(order, vec!["A.one", "A.two", "B.three"]);
    }

    #[test]
    fn test_empty_inventory_finishes_immediately() {
        let child_args = vec!["true".to_owned()];
        let mut test_list = TestList::parse("").unwrap();
        let runner = TestRunner::new(&opts(4), &child_args);
        let mut events = Vec::new();
        runner
            .try_execute(&mut test_list, |event| {
                events.push(match event {
                    TestEvent::IterationStarted { .. } => "start",
                    TestEvent::TestFinished { .. } => "test",
                    TestEvent::IterationFinished { .. } => "end",
                });
                Ok(())
            })
            .unwrap();
        assert_eq!(events, vec!["start", "end"]);
    }

    #[test]
    fn test_repeat_runs_every_iteration() {
        let child_args = vec!["true".to_owned()];
        let mut test_list = TestList::parse("Smoke.\n  a\n").unwrap();
        let runner = TestRunner::new(
            &IsolationOpts {
                repeat: 3,
                ..IsolationOpts::default()
            },
            &child_args,
        );
        let mut iterations = Vec::new();
        runner
            .try_execute(&mut test_list, |event| {
                if let TestEvent::IterationFinished { iteration, .. } = event {
                    iterations.push(iteration);
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(iterations, vec![1, 2, 3]);
    }

    #[test]
    fn test_repeat_zero_runs_once() {
        let child_args = vec!["true".to_owned()];
        let mut test_list = TestList::parse("Smoke.\n  a\n").unwrap();
        let runner = TestRunner::new(
            &IsolationOpts {
                repeat: 0,
                ..IsolationOpts::default()
            },
            &child_args,
        );
        let mut count = 0;
        runner
            .try_execute(&mut test_list, |event| {
                if matches!(event, TestEvent::IterationFinished { .. }) {
                    count += 1;
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_parallel_deadline_batches() {
        // Eight sleepers, four slots, a one second deadline: every test times out and the run
        // takes two deadline rounds, not eight.
        let child_args: Vec<String> = ["sh", "-c", "sleep 3"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect();
        let mut test_list =
            TestList::parse("Sleepy.\n  a\n  b\n  c\n  d\n  e\n  f\n  g\n  h\n").unwrap();
        let runner = TestRunner::new(
            &IsolationOpts {
                job_count: 4,
                deadline_ms: 1_000,
                ..IsolationOpts::default()
            },
            &child_args,
        );
        let started = Instant::now();
        runner.try_execute(&mut test_list, |_| Ok(())).unwrap();
        let wall = started.elapsed();

        for test in &test_list.suites()[0].tests {
            assert_eq!(test.result, Some(TestResult::Timeout));
            let elapsed_ms = test.elapsed.as_millis();
            assert!(
                (1_000..2_500).contains(&elapsed_ms),
                "elapsed {} ms should be just past the deadline",
                elapsed_ms
            );
            assert!(test.failure_message.contains("killed because of timeout at"));
        }
        assert!(
            wall < Duration::from_secs(6),
            "two batches of four should take about two deadlines, took {:?}",
            wall
        );
    }

    #[test]
    fn test_signal_termination_classified_as_fail() {
        let child_args: Vec<String> = ["sh", "-c", "kill -SEGV $$"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect();
        let mut test_list = TestList::parse("Crash.\n  hard\n").unwrap();
        let runner = TestRunner::new(&opts(1), &child_args);
        runner.try_execute(&mut test_list, |_| Ok(())).unwrap();

        let case = test_list.case(0, 0);
        assert_eq!(case.result, Some(TestResult::Fail));
        assert!(case
            .failure_message
            .contains("Crash.hard terminated by signal: Segmentation fault."));
    }

    #[test]
    fn test_cursor_skips_empty_suites() {
        let list = TestList::parse("A.\nB.\n  one\nC.\n").unwrap();
        let mut cursor = Cursor::new(&list);
        assert_eq!(cursor.next(), Some((1, 0)));
        assert_eq!(cursor.next(), None);
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(signal_name(libc::SIGSEGV), "Segmentation fault");
        assert_eq!(signal_name(libc::SIGABRT), "Aborted");
        assert_eq!(signal_name(200), "Unknown signal 200");
    }
}
