// Copyright (c) The gtest-isolate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Argument partitioning.
//!
//! The argument vector carries two kinds of options: runner options that configure isolation
//! mode, and everything else, which is forwarded to the child test framework. `pick_options`
//! splits the two, rewriting the vector in place into the child-ready form: the self-test
//! filter is encoded, `--gtest_repeat=`/`--gtest_output=` are stripped so children run exactly
//! one iteration and never touch the report file, and `--no-isolate` is inserted at position 1
//! so a child that re-execs itself (death-test helpers do) cannot recurse into isolation mode.

use crate::errors::ArgumentError;
use camino::Utf8PathBuf;
use std::str::FromStr;

pub const DEFAULT_DEADLINE_MS: u64 = 60_000;
pub const DEFAULT_WARNLINE_MS: u64 = 2_000;

/// Console color mode, from `--gtest_color=`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Color {
    #[default]
    Auto,
    Always,
    Never,
}

impl Color {
    pub(crate) fn should_colorize(self, stream: supports_color::Stream) -> bool {
        match self {
            Color::Auto => supports_color::on_cached(stream).is_some(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

impl FromStr for Color {
    type Err = ();

    // gtest accepts yes/no/auto and friends; anything unrecognized falls back to auto.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "always" | "yes" | "true" => Color::Always,
            "never" | "no" | "false" => Color::Never,
            _ => Color::Auto,
        })
    }
}

/// Options observed by the runner itself.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IsolationOpts {
    /// False when `--help`, `--no-isolate` or `--gtest_list_tests` was seen; the caller then
    /// delegates the whole argument vector to the in-process framework.
    pub isolate: bool,
    pub job_count: usize,
    pub deadline_ms: u64,
    pub warnline_ms: u64,
    pub color: Color,
    pub print_time: bool,
    /// Iteration count; 0 is treated as 1 by the scheduler.
    pub repeat: usize,
    pub xml_output_path: Option<Utf8PathBuf>,
}

impl Default for IsolationOpts {
    fn default() -> Self {
        Self {
            isolate: true,
            job_count: 1,
            deadline_ms: DEFAULT_DEADLINE_MS,
            warnline_ms: DEFAULT_WARNLINE_MS,
            color: Color::Auto,
            print_time: true,
            repeat: 1,
            xml_output_path: None,
        }
    }
}

/// Partitions `args` (argv[0] included) into an `IsolationOpts` and, in place, the child-ready
/// argument vector.
pub fn pick_options(args: &mut Vec<String>) -> Result<IsolationOpts, ArgumentError> {
    let mut opts = IsolationOpts::default();

    if args.iter().skip(1).any(|a| a == "--help" || a == "-h") {
        print_help();
        opts.isolate = false;
        return Ok(opts);
    }

    rewrite_filter_synonym(args);

    // --bionic-selftest restricts the run to the self-test suite; it is deliberately not
    // removed from the child argument vector.
    let enable_selftest = args.iter().skip(1).any(|a| a == "--bionic-selftest");

    let mut existing_filter = None;
    for i in (1..args.len()).rev() {
        if args[i].starts_with("--gtest_filter=") {
            existing_filter = Some(args.remove(i));
            break;
        }
    }
    let filter = if enable_selftest {
        match existing_filter {
            // A filter already scoped under the self-test suite is kept: children re-enter
            // this parser with `--gtest_filter=bionic_selftest.NAME` appended, and forcing
            // the suite-wide filter back would make the child run every self-test.
            Some(filter) if filter["--gtest_filter=".len()..].starts_with("bionic_selftest") => {
                filter
            }
            _ => "--gtest_filter=bionic_selftest*".to_owned(),
        }
    } else {
        match existing_filter {
            None => "--gtest_filter=-bionic_selftest*".to_owned(),
            Some(filter) if filter.contains(":-") => format!("{}:bionic_selftest*", filter),
            Some(filter) => format!("{}:-bionic_selftest*", filter),
        }
    };
    args.push(filter);

    opts.isolate = !args
        .iter()
        .skip(1)
        .any(|a| a == "--no-isolate" || a == "--gtest_list_tests");
    if !opts.isolate {
        return Ok(opts);
    }

    opts.job_count = num_cpus::get();

    let mut i = 1;
    while i < args.len() {
        if let Some(rest) = args[i].strip_prefix("-j") {
            if !rest.is_empty() {
                // -jN
                opts.job_count = parse_job_count(rest)?;
            } else if let Some(next) = args.get(i + 1).filter(|next| next.parse::<i64>().is_ok()) {
                // -j N; a numeric follower is the count, anything else leaves -j bare.
                opts.job_count = parse_job_count(next)?;
                i += 1;
            }
            // Bare -j keeps the processor-count default.
        } else if let Some(value) = args[i].strip_prefix("--deadline=") {
            opts.deadline_ms = parse_positive_ms(value)
                .ok_or_else(|| ArgumentError::InvalidDeadline(value.to_owned()))?;
        } else if let Some(value) = args[i].strip_prefix("--warnline=") {
            opts.warnline_ms = parse_positive_ms(value)
                .ok_or_else(|| ArgumentError::InvalidWarnline(value.to_owned()))?;
        } else if let Some(value) = args[i].strip_prefix("--gtest_color=") {
            opts.color = value.parse().unwrap_or_default();
        } else if args[i] == "--gtest_print_time=0" {
            opts.print_time = false;
        } else if let Some(value) = args[i].strip_prefix("--gtest_repeat=") {
            opts.repeat = value
                .parse::<usize>()
                .map_err(|_| ArgumentError::InvalidRepeat(value.to_owned()))?;
            // Children must run exactly one iteration each.
            args.remove(i);
            continue;
        } else if args[i].starts_with("--gtest_output=") {
            let arg = args.remove(i);
            let spec = arg.strip_prefix("--gtest_output=").expect("prefix matched");
            opts.xml_output_path = Some(resolve_xml_path(spec, &arg)?);
            continue;
        }
        i += 1;
    }

    args.insert(1, "--no-isolate".to_owned());
    Ok(opts)
}

/// `--gtest-filter` is accepted as a synonym for `--gtest_filter`; the dash is rewritten in
/// place.
fn rewrite_filter_synonym(args: &mut [String]) {
    for arg in args.iter_mut().skip(1) {
        if arg.starts_with("--gtest-filter") {
            arg.replace_range(7..8, "_");
        }
    }
}

fn parse_job_count(value: &str) -> Result<usize, ArgumentError> {
    match value.parse::<usize>() {
        Ok(count) if count > 0 => Ok(count),
        _ => Err(ArgumentError::InvalidJobCount(value.to_owned())),
    }
}

fn parse_positive_ms(value: &str) -> Option<u64> {
    match value.parse::<u64>() {
        Ok(ms) if ms > 0 => Some(ms),
        _ => None,
    }
}

/// Resolves a `--gtest_output=` spec into an absolute XML file path: only `xml:` specs are
/// accepted, relative paths are anchored to the current directory, and a trailing `/` means
/// "directory" and gets the default file name appended.
fn resolve_xml_path(spec: &str, arg: &str) -> Result<Utf8PathBuf, ArgumentError> {
    let invalid = || ArgumentError::InvalidOutput(arg.to_owned());

    let raw = spec.strip_prefix("xml:").ok_or_else(invalid)?;
    if raw.is_empty() {
        return Err(invalid());
    }
    let is_dir = raw.ends_with('/');

    let mut path = Utf8PathBuf::from(raw);
    if path.is_relative() {
        let cwd = std::env::current_dir()
            .map_err(|_| invalid())
            .and_then(|cwd| Utf8PathBuf::try_from(cwd).map_err(|_| invalid()))?;
        path = cwd.join(path);
    }
    if is_dir {
        path.push("test_details.xml");
    }
    Ok(path)
}

fn print_help() {
    println!(
        "Unit test options:\n\
         \x20 -j [JOB_COUNT] or -j[JOB_COUNT]\n\
         \x20     Run up to JOB_COUNT tests in parallel.\n\
         \x20     Use isolation mode, running each test in a separate process.\n\
         \x20     If JOB_COUNT is not given, it is set to the count of available processors.\n\
         \x20 --no-isolate\n\
         \x20     Don't use isolation mode, run all tests in a single process.\n\
         \x20 --deadline=[TIME_IN_MS]\n\
         \x20     Run each test in no longer than [TIME_IN_MS] time.\n\
         \x20     It takes effect only in isolation mode. Default deadline is 60000 ms.\n\
         \x20 --warnline=[TIME_IN_MS]\n\
         \x20     Test running longer than [TIME_IN_MS] will be warned.\n\
         \x20     It takes effect only in isolation mode. Default warnline is 2000 ms.\n\
         \x20 --gtest-filter=POSITIVE_PATTERNS[-NEGATIVE_PATTERNS]\n\
         \x20     Used as a synonym for --gtest_filter option in gtest.\n\
         \nDefault unit test option is -j.\n"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_selftest_overrides_user_filter() {
        let mut argv = args(&["runner", "--gtest-filter=Foo.*:-Bar.*", "--bionic-selftest"]);
        let opts = pick_options(&mut argv).unwrap();
        assert!(opts.isolate);
        assert_eq!(
            argv,
            args(&[
                "runner",
                "--no-isolate",
                "--bionic-selftest",
                "--gtest_filter=bionic_selftest*",
            ])
        );
    }

    #[test]
    fn test_filter_with_negative_section_gets_appended() {
        let mut argv = args(&["runner", "--gtest_filter=Foo.*:-Bar.*"]);
        pick_options(&mut argv).unwrap();
        assert_eq!(
            argv,
            args(&[
                "runner",
                "--no-isolate",
                "--gtest_filter=Foo.*:-Bar.*:bionic_selftest*",
            ])
        );
    }

    #[test]
    fn test_filter_without_negative_section_gets_negative() {
        let mut argv = args(&["runner", "--gtest_filter=Foo.*"]);
        pick_options(&mut argv).unwrap();
        assert_eq!(
            argv,
            args(&["runner", "--no-isolate", "--gtest_filter=Foo.*:-bionic_selftest*"])
        );
    }

    #[test]
    fn test_no_filter_excludes_selftests() {
        let mut argv = args(&["runner"]);
        pick_options(&mut argv).unwrap();
        assert_eq!(
            argv,
            args(&["runner", "--no-isolate", "--gtest_filter=-bionic_selftest*"])
        );
    }

    #[test]
    fn test_last_filter_wins() {
        let mut argv = args(&["runner", "--gtest_filter=A.*", "--gtest_filter=B.*"]);
        pick_options(&mut argv).unwrap();
        assert_eq!(
            argv,
            args(&[
                "runner",
                "--no-isolate",
                "--gtest_filter=A.*",
                "--gtest_filter=B.*:-bionic_selftest*",
            ])
        );
    }

    #[test]
    fn test_job_count_forms() {
        let mut argv = args(&["runner", "-j17"]);
        assert_eq!(pick_options(&mut argv).unwrap().job_count, 17);

        let mut argv = args(&["runner", "-j", "9"]);
        assert_eq!(pick_options(&mut argv).unwrap().job_count, 9);

        let mut argv = args(&["runner", "-j"]);
        assert_eq!(pick_options(&mut argv).unwrap().job_count, num_cpus::get());

        // A following non-numeric argument is not consumed as a count.
        let mut argv = args(&["runner", "-j", "--deadline=500"]);
        let opts = pick_options(&mut argv).unwrap();
        assert_eq!(opts.job_count, num_cpus::get());
        assert_eq!(opts.deadline_ms, 500);

        let mut argv = args(&["runner", "-j0"]);
        assert_eq!(
            pick_options(&mut argv).unwrap_err(),
            ArgumentError::InvalidJobCount("0".to_owned())
        );

        let mut argv = args(&["runner", "-j", "0"]);
        assert_eq!(
            pick_options(&mut argv).unwrap_err(),
            ArgumentError::InvalidJobCount("0".to_owned())
        );
    }

    #[test]
    fn test_deadline_and_warnline() {
        let mut argv = args(&["runner", "--deadline=90000", "--warnline=5000"]);
        let opts = pick_options(&mut argv).unwrap();
        assert_eq!(opts.deadline_ms, 90_000);
        assert_eq!(opts.warnline_ms, 5_000);

        let mut argv = args(&["runner", "--deadline=0"]);
        assert_eq!(
            pick_options(&mut argv).unwrap_err(),
            ArgumentError::InvalidDeadline("0".to_owned())
        );

        let mut argv = args(&["runner", "--warnline=soon"]);
        assert_eq!(
            pick_options(&mut argv).unwrap_err(),
            ArgumentError::InvalidWarnline("soon".to_owned())
        );
    }

    #[test]
    fn test_repeat_is_removed_from_child_args() {
        let mut argv = args(&["runner", "--gtest_repeat=10"]);
        let opts = pick_options(&mut argv).unwrap();
        assert_eq!(opts.repeat, 10);
        assert_eq!(
            argv,
            args(&["runner", "--no-isolate", "--gtest_filter=-bionic_selftest*"])
        );

        let mut argv = args(&["runner", "--gtest_repeat=-1"]);
        assert!(matches!(
            pick_options(&mut argv).unwrap_err(),
            ArgumentError::InvalidRepeat(_)
        ));
    }

    #[test]
    fn test_xml_output_path_resolution() {
        let cwd = Utf8PathBuf::try_from(std::env::current_dir().unwrap()).unwrap();

        let mut argv = args(&["runner", "--gtest_output=xml:reports/"]);
        let opts = pick_options(&mut argv).unwrap();
        assert_eq!(
            opts.xml_output_path,
            Some(cwd.join("reports").join("test_details.xml"))
        );
        // The option is stripped so children don't overwrite the report.
        assert_eq!(
            argv,
            args(&["runner", "--no-isolate", "--gtest_filter=-bionic_selftest*"])
        );

        let mut argv = args(&["runner", "--gtest_output=xml:/tmp/out.xml"]);
        let opts = pick_options(&mut argv).unwrap();
        assert_eq!(opts.xml_output_path, Some(Utf8PathBuf::from("/tmp/out.xml")));

        let mut argv = args(&["runner", "--gtest_output=xml:"]);
        assert!(matches!(
            pick_options(&mut argv).unwrap_err(),
            ArgumentError::InvalidOutput(_)
        ));

        let mut argv = args(&["runner", "--gtest_output=json:out.json"]);
        assert!(matches!(
            pick_options(&mut argv).unwrap_err(),
            ArgumentError::InvalidOutput(_)
        ));
    }

    #[test]
    fn test_isolation_disabled_leaves_options_alone() {
        let mut argv = args(&["runner", "--no-isolate", "--gtest_repeat=5"]);
        let opts = pick_options(&mut argv).unwrap();
        assert!(!opts.isolate);
        // No isolation parsing happened: repeat stays at its default and the repeat flag is
        // still in the vector.
        assert_eq!(opts.repeat, 1);
        assert!(argv.contains(&"--gtest_repeat=5".to_owned()));
    }

    #[test]
    fn test_list_tests_disables_isolation() {
        let mut argv = args(&["runner", "--gtest_list_tests"]);
        let opts = pick_options(&mut argv).unwrap();
        assert!(!opts.isolate);
    }

    #[test]
    fn test_print_time_and_color() {
        let mut argv = args(&[
            "runner",
            "--gtest_print_time=0",
            "--gtest_color=never",
        ]);
        let opts = pick_options(&mut argv).unwrap();
        assert!(!opts.print_time);
        assert_eq!(opts.color, Color::Never);
        // Appearance flags are forwarded to children untouched.
        assert!(argv.contains(&"--gtest_print_time=0".to_owned()));
        assert!(argv.contains(&"--gtest_color=never".to_owned()));
    }

    #[test]
    fn test_reparsing_child_args_keeps_isolation_off() {
        // Children re-enter the option parser with the vector we hand them; the re-entry guard
        // must keep them out of isolation mode.
        let mut argv = args(&["runner", "--gtest_filter=Foo.*", "-j4"]);
        let opts = pick_options(&mut argv).unwrap();
        assert!(opts.isolate);

        let mut reparsed = argv.clone();
        let child_opts = pick_options(&mut reparsed).unwrap();
        assert!(!child_opts.isolate);
    }

    #[test]
    fn test_selftest_child_keeps_per_test_filter() {
        // The argument vector a self-test child sees: re-entry guard, the suite-wide filter,
        // and the per-test filter the scheduler appended last. Re-parsing must not widen the
        // filter back to the whole suite.
        let mut argv = args(&[
            "runner",
            "--no-isolate",
            "--bionic-selftest",
            "--gtest_filter=bionic_selftest*",
            "--gtest_filter=bionic_selftest.test_success",
        ]);
        let opts = pick_options(&mut argv).unwrap();
        assert!(!opts.isolate);
        // The last filter is the one the framework honors.
        assert_eq!(
            argv.last().unwrap(),
            "--gtest_filter=bionic_selftest.test_success"
        );
    }

    #[test]
    fn test_filter_synonym_rewrite() {
        let mut argv = args(&["runner", "--gtest-filter=Foo.*"]);
        rewrite_filter_synonym(&mut argv);
        assert_eq!(argv[1], "--gtest_filter=Foo.*");
    }
}
