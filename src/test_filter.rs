// Copyright (c) The gtest-isolate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! GoogleTest-style test name filtering.
//!
//! A filter spec has the form `POSITIVE_PATTERNS[-NEGATIVE_PATTERNS]`, where each pattern set is
//! a `:`-separated list of glob patterns built from literal characters, `?` (any single
//! character) and `*` (any substring). A test name matches the filter if it matches any positive
//! pattern and no negative pattern. An empty positive section matches everything.

/// A compiled test name filter.
#[derive(Clone, Debug)]
pub struct TestFilter {
    positive: Vec<String>,
    negative: Vec<String>,
}

impl TestFilter {
    /// Creates a filter that matches every test name.
    pub fn match_all() -> Self {
        Self {
            positive: vec!["*".to_owned()],
            negative: vec![],
        }
    }

    /// Parses a filter spec.
    ///
    /// The first `-` in the spec starts the negative section; everything before it forms the
    /// positive section.
    pub fn from_spec(spec: &str) -> Self {
        let (positive, negative) = match spec.split_once('-') {
            Some((positive, negative)) => (positive, Some(negative)),
            None => (spec, None),
        };

        let positive = if positive.is_empty() {
            vec!["*".to_owned()]
        } else {
            split_patterns(positive)
        };
        let negative = negative.map_or_else(Vec::new, split_patterns);

        Self { positive, negative }
    }

    /// Returns true if the given test name passes the filter.
    pub fn matches(&self, name: &str) -> bool {
        self.positive.iter().any(|p| pattern_matches(p, name))
            && !self.negative.iter().any(|p| pattern_matches(p, name))
    }
}

impl Default for TestFilter {
    fn default() -> Self {
        Self::match_all()
    }
}

fn split_patterns(section: &str) -> Vec<String> {
    section
        .split(':')
        .filter(|p| !p.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Glob matching with `?` and `*`, anchored at both ends.
fn pattern_matches(pattern: &str, name: &str) -> bool {
    matches_impl(pattern.as_bytes(), name.as_bytes())
}

fn matches_impl(pattern: &[u8], name: &[u8]) -> bool {
    match pattern.split_first() {
        None => name.is_empty(),
        Some((b'?', rest)) => !name.is_empty() && matches_impl(rest, &name[1..]),
        Some((b'*', rest)) => {
            matches_impl(rest, name) || (!name.is_empty() && matches_impl(pattern, &name[1..]))
        }
        Some((&c, rest)) => name.first() == Some(&c) && matches_impl(rest, &name[1..]),
    }
}
