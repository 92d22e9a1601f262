// Copyright (c) The gtest-isolate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The runner's own diagnostic suite, enabled with `--bionic-selftest`.
//!
//! These tests exist to exercise every outcome classification path in the scheduler: pass,
//! assertion failure, slow-but-passing, deadline kill, signal death, and the death-test
//! re-exec path. They are excluded from normal runs by the filter the option parser encodes.

use crate::harness::{Harness, TestDef, TestFailure, TestFnResult};
use crate::{check, check_eq};
use std::{
    env,
    process::{Command, Stdio},
    thread,
    time::Duration,
};

/// Builds the harness with the self-test suite registered.
pub fn harness() -> Harness {
    let mut harness = Harness::new();
    harness
        .add(TestDef {
            suite: "bionic_selftest",
            name: "test_success",
            run: test_success,
        })
        .add(TestDef {
            suite: "bionic_selftest",
            name: "test_fail",
            run: test_fail,
        })
        .add(TestDef {
            suite: "bionic_selftest",
            name: "test_time_warn",
            run: test_time_warn,
        })
        .add(TestDef {
            suite: "bionic_selftest",
            name: "test_timeout",
            run: test_timeout,
        })
        .add(TestDef {
            suite: "bionic_selftest",
            name: "test_signal_SEGV_terminated",
            run: test_signal_segv_terminated,
        })
        .add(TestDef {
            suite: "bionic_selftest_DeathTest",
            name: "success",
            run: deathtest_success,
        })
        .add(TestDef {
            suite: "bionic_selftest_DeathTest",
            name: "fail",
            run: deathtest_fail,
        });
    harness
}

fn test_success() -> TestFnResult {
    check_eq!(1, 1);
    Ok(())
}

fn test_fail() -> TestFnResult {
    check_eq!(0, 1);
    Ok(())
}

fn test_time_warn() -> TestFnResult {
    thread::sleep(Duration::from_secs(4));
    Ok(())
}

fn test_timeout() -> TestFnResult {
    loop {
        thread::sleep(Duration::from_millis(100));
    }
}

fn test_signal_segv_terminated() -> TestFnResult {
    // The runtime installs its own SIGSEGV handler for stack-overflow detection; restore the
    // default disposition so the raise reliably terminates the process.
    unsafe {
        libc::signal(libc::SIGSEGV, libc::SIG_DFL);
        libc::raise(libc::SIGSEGV);
    }
    Ok(())
}

/// Re-invokes the current executable the way a death-test helper would, running a single
/// filtered test in a fresh single-process child, and returns its exit code.
fn run_death_child(filter: &str) -> Result<Option<i32>, TestFailure> {
    let exe = env::current_exe()
        .map_err(|err| TestFailure::new(file!(), line!(), format!("current_exe failed: {}", err)))?;
    let status = Command::new(exe)
        .arg("--no-isolate")
        .arg("--bionic-selftest")
        .arg(format!("--gtest_filter={}", filter))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|err| TestFailure::new(file!(), line!(), format!("spawn failed: {}", err)))?;
    Ok(status.code())
}

fn deathtest_success() -> TestFnResult {
    let code = run_death_child("bionic_selftest.test_success")?;
    check!(code == Some(0), "child exited with {:?}, expected 0", code);
    Ok(())
}

fn deathtest_fail() -> TestFnResult {
    let code = run_death_child("bionic_selftest.test_fail")?;
    check!(code == Some(0), "child exited with {:?}, expected 0", code);
    Ok(())
}
