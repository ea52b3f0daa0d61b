// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Signal Classifier and Noise Filter.
//!
//! Both are pure functions of their input: no I/O, no shared state, no
//! async. `classify` always succeeds; `filter` is the front door every
//! inbound message passes through before it reaches the agent loop.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Intent category: what kind of work the message is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Execute,
    Assist,
    Analyze,
    Build,
    Maintain,
}

/// Speech-act category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    Direct,
    Inform,
    Commit,
    Decide,
    Express,
}

/// Content category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Question,
    Issue,
    Scheduling,
    Summary,
    General,
}

/// Channel-derived presentation hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Message,
    Document,
    Notification,
    Command,
    Transcript,
}

/// The result of classifying a single inbound message. Produced once,
/// never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub mode: Mode,
    pub genre: Genre,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub format: Format,
    pub weight: f64,
    pub channel: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

fn word_regex(words: &[&str]) -> Regex {
    let pattern = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{pattern})\b")).expect("static word list compiles")
}

fn any_match(re: &Regex, text: &str) -> bool {
    re.is_match(text)
}

static BUILD_WORDS: Lazy<Regex> =
    Lazy::new(|| word_regex(&["build", "create", "implement", "scaffold", "generate", "write"]));
static EXECUTE_WORDS: Lazy<Regex> =
    Lazy::new(|| word_regex(&["run", "execute", "deploy", "launch", "invoke", "start"]));
static ANALYZE_WORDS: Lazy<Regex> = Lazy::new(|| {
    word_regex(&[
        "analyze", "analyse", "investigate", "review", "inspect", "debug", "diagnose", "explain",
    ])
});
static MAINTAIN_WORDS: Lazy<Regex> = Lazy::new(|| {
    word_regex(&[
        "fix", "update", "refactor", "upgrade", "patch", "maintain", "cleanup",
    ])
});

static IMPERATIVE_WORDS: Lazy<Regex> = Lazy::new(|| word_regex(&["please", "run", "make"]));
static COMMISSIVE_PHRASES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:i will|i'll|let me|i promise)\b").unwrap());
static VERDICTIVE_WORDS: Lazy<Regex> =
    Lazy::new(|| word_regex(&["approve", "reject", "confirm", "cancel", "set"]));
static EXPRESSIVE_WORDS: Lazy<Regex> =
    Lazy::new(|| word_regex(&["thanks", "thank", "love", "great", "terrible", "awesome"]));

static FAILURE_WORDS: Lazy<Regex> =
    Lazy::new(|| word_regex(&["error", "bug", "broken", "fail", "failed", "crash", "crashed"]));
static TEMPORAL_WORDS: Lazy<Regex> =
    Lazy::new(|| word_regex(&["remind", "schedule", "later", "tomorrow", "tonight"]));
static SUMMARY_WORDS: Lazy<Regex> =
    Lazy::new(|| word_regex(&["summarize", "summarise", "recap", "tldr"]));

static URGENCY_WORDS: Lazy<Regex> =
    Lazy::new(|| word_regex(&["urgent", "asap", "critical", "emergency", "immediately"]));

/// Exact-match set (after trimming) for short acknowledgements, greetings
/// and reactions — used both for the classifier's weight penalty and the
/// noise filter's pattern tier. Matching is whole-string, never substring.
static SHORT_ACK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:hi|hello|hey|yo|sup|thanks|thank you|thx|ty|ok|okay|k|yes|no|yep|nope|sure|cool|nice|lol|haha|got it|noted|np|welcome|bye|goodnight|gm|gn)[.!?]?$",
    )
    .unwrap()
});

/// Pure, deterministic: no I/O. Always produces a signal.
pub fn classify(text: &str, channel: &str) -> Signal {
    let trimmed = text.trim();

    let mode = if any_match(&BUILD_WORDS, trimmed) {
        Mode::Build
    } else if any_match(&EXECUTE_WORDS, trimmed) {
        Mode::Execute
    } else if any_match(&ANALYZE_WORDS, trimmed) {
        Mode::Analyze
    } else if any_match(&MAINTAIN_WORDS, trimmed) {
        Mode::Maintain
    } else {
        Mode::Assist
    };

    let genre = if trimmed.ends_with('!') || any_match(&IMPERATIVE_WORDS, trimmed) {
        Genre::Direct
    } else if any_match(&COMMISSIVE_PHRASES, trimmed) {
        Genre::Commit
    } else if any_match(&VERDICTIVE_WORDS, trimmed) {
        Genre::Decide
    } else if any_match(&EXPRESSIVE_WORDS, trimmed) {
        Genre::Express
    } else {
        Genre::Inform
    };

    let has_question_mark = trimmed.contains('?');
    let message_type = if has_question_mark {
        MessageType::Question
    } else if any_match(&FAILURE_WORDS, trimmed) {
        MessageType::Issue
    } else if any_match(&TEMPORAL_WORDS, trimmed) {
        MessageType::Scheduling
    } else if any_match(&SUMMARY_WORDS, trimmed) {
        MessageType::Summary
    } else {
        MessageType::General
    };

    let format = match channel {
        "cli" => Format::Command,
        "webhook" => Format::Notification,
        "filesystem" => Format::Document,
        _ => Format::Message,
    };

    let mut weight = 0.5;
    weight += (trimmed.len() as f64 / 500.0).min(0.2);
    if has_question_mark {
        weight += 0.15;
    }
    if any_match(&URGENCY_WORDS, trimmed) {
        weight += 0.2;
    }
    if SHORT_ACK_RE.is_match(trimmed) {
        weight -= 0.3;
    }
    weight = weight.max(0.0).min(1.0);

    Signal {
        mode,
        genre,
        message_type,
        format,
        weight,
        channel: channel.to_string(),
        timestamp: chrono::Utc::now(),
    }
}

/// Why a message was classified as noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseReason {
    Empty,
    TooShort,
    PatternMatch,
    LowWeight,
}

/// Outcome of [`filter`].
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    Noise(NoiseReason),
    Signal(f64),
}

/// Three-tier noise gate. Tier0 rejects empty/too-short input without
/// running the classifier at all; tier1 rejects exact-match greetings and
/// acknowledgements; tier2 runs the classifier and rejects low-weight
/// results. Anything in `[0.3, 1.0]` passes through, even below 0.6 — the
/// uncertain band is forwarded and the LLM is the tiebreaker, not this
/// filter.
pub fn filter(text: &str, channel: &str) -> FilterOutcome {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return FilterOutcome::Noise(NoiseReason::Empty);
    }
    if trimmed.chars().count() < 3 {
        return FilterOutcome::Noise(NoiseReason::TooShort);
    }
    if SHORT_ACK_RE.is_match(trimmed) {
        return FilterOutcome::Noise(NoiseReason::PatternMatch);
    }
    let signal = classify(text, channel);
    if signal.weight < 0.3 {
        return FilterOutcome::Noise(NoiseReason::LowWeight);
    }
    FilterOutcome::Signal(signal.weight)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_bounds_always_hold() {
        let cases = [
            "",
            "hi",
            "please run the deploy script immediately!",
            &"x".repeat(5000),
        ];
        for c in cases {
            let s = classify(c, "cli");
            assert!(s.weight >= 0.0 && s.weight <= 1.0, "weight out of bounds for {c:?}");
        }
    }

    #[test]
    fn greeting_gets_weight_penalty() {
        let greeting = classify("hi", "message");
        let longer = classify("please explain the rust borrow checker", "message");
        assert!(greeting.weight < longer.weight);
    }

    #[test]
    fn reset_does_not_match_set_word_boundary() {
        let s = classify("let's reset the counter", "message");
        // "reset" must not trigger the verdictive "set" keyword via substring match.
        assert_ne!(s.genre, Genre::Decide);
    }

    #[test]
    fn question_mark_takes_priority_over_failure_keyword() {
        let s = classify("is this a bug?", "message");
        assert_eq!(s.message_type, MessageType::Question);
    }

    #[test]
    fn mode_falls_through_to_assist() {
        let s = classify("what do you think about this", "message");
        assert_eq!(s.mode, Mode::Assist);
    }

    #[test]
    fn mode_build_detected() {
        let s = classify("please build a new dashboard for me", "message");
        assert_eq!(s.mode, Mode::Build);
    }

    #[test]
    fn format_derived_from_channel() {
        assert_eq!(classify("hello there", "cli").format, Format::Command);
        assert_eq!(classify("hello there", "webhook").format, Format::Notification);
        assert_eq!(classify("hello there", "filesystem").format, Format::Document);
        assert_eq!(classify("hello there", "telegram").format, Format::Message);
    }

    #[test]
    fn filter_rejects_empty() {
        assert_eq!(filter("", "message"), FilterOutcome::Noise(NoiseReason::Empty));
        assert_eq!(filter("   ", "message"), FilterOutcome::Noise(NoiseReason::Empty));
    }

    #[test]
    fn filter_rejects_too_short() {
        assert_eq!(filter("ok", "message"), FilterOutcome::Noise(NoiseReason::TooShort));
    }

    #[test]
    fn filter_rejects_pattern_match_greeting() {
        assert_eq!(
            filter("thanks!", "message"),
            FilterOutcome::Noise(NoiseReason::PatternMatch)
        );
    }

    #[test]
    fn filter_forwards_uncertain_band() {
        // Deliberately crafted to land weight in [0.3, 0.6): short-ish statement,
        // no question mark, no urgency keyword.
        match filter("the build finished", "message") {
            FilterOutcome::Signal(w) => assert!((0.3..1.0).contains(&w)),
            other => panic!("expected signal, got {other:?}"),
        }
    }

    #[test]
    fn noise_drop_hi_weight_matches_scenario() {
        // "hi" -> weight ~= 0.204 at the classifier level, even though the
        // noise filter's pattern tier would catch it first.
        let s = classify("hi", "message");
        assert!((s.weight - 0.2).abs() < 0.05);
    }
}
