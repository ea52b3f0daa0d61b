// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Doom-loop detection.
//!
//! A stable hash of the sorted multiset of tool names requested in one
//! iteration. Two iterations "match" when their signatures are equal *and*
//! every call in both iterations failed; three consecutive matches halt the
//! session with a user-visible "repeated-failure halt" response.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Consecutive all-failing, same-signature iterations before the loop halts.
pub const DOOM_LOOP_THRESHOLD: u32 = 3;

/// Stable hash of the sorted tool-name multiset for one iteration.
pub fn tool_signature(tool_names: &[String]) -> u64 {
    let mut sorted: Vec<&str> = tool_names.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let mut hasher = DefaultHasher::new();
    for name in sorted {
        name.hash(&mut hasher);
        0u8.hash(&mut hasher); // separator so "ab","c" != "a","bc"
    }
    hasher.finish()
}

/// Update doom-loop state for one completed iteration. Returns the new
/// `consecutive_failures` count.
pub fn update(
    last_signature: &mut Option<u64>,
    consecutive_failures: &mut u32,
    tool_names: &[String],
    all_failed: bool,
) -> u32 {
    let signature = tool_signature(tool_names);
    let repeats = *last_signature == Some(signature);
    if repeats && all_failed {
        *consecutive_failures += 1;
    } else {
        *consecutive_failures = 0;
    }
    *last_signature = Some(signature);
    *consecutive_failures
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_order_independent() {
        let a = tool_signature(&["b".into(), "a".into()]);
        let b = tool_signature(&["a".into(), "b".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn signature_differs_for_different_sets() {
        let a = tool_signature(&["a".into()]);
        let b = tool_signature(&["a".into(), "b".into()]);
        assert_ne!(a, b);
    }

    #[test]
    fn three_consecutive_matching_failures_halts() {
        let mut sig = None;
        let mut failures = 0;
        let names = vec!["broken_tool".to_string()];

        assert_eq!(update(&mut sig, &mut failures, &names, true), 1);
        assert_eq!(update(&mut sig, &mut failures, &names, true), 2);
        assert_eq!(update(&mut sig, &mut failures, &names, true), 3);
        assert!(failures >= DOOM_LOOP_THRESHOLD);
    }

    #[test]
    fn success_in_between_resets_counter() {
        let mut sig = None;
        let mut failures = 0;
        let names = vec!["broken_tool".to_string()];

        update(&mut sig, &mut failures, &names, true);
        update(&mut sig, &mut failures, &names, true);
        // A successful iteration with the same tool set resets the streak.
        update(&mut sig, &mut failures, &names, false);
        assert_eq!(failures, 0);
    }

    #[test]
    fn different_tool_set_resets_counter() {
        let mut sig = None;
        let mut failures = 0;

        update(&mut sig, &mut failures, &["a".to_string()], true);
        update(&mut sig, &mut failures, &["a".to_string()], true);
        update(&mut sig, &mut failures, &["b".to_string()], true);
        assert_eq!(failures, 0);
    }
}
