// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Trigger body template interpolation.
//!
//! Supports `{{payload}}` (the raw JSON payload, compact-encoded),
//! `{{timestamp}}` (RFC3339, UTC) and `{{payload.<key>}}` (a top-level
//! string/number/bool field of the payload object). Every substitution is
//! shell-escaped before insertion: trigger bodies feed directly into the
//! `command` job type, so an attacker-controlled payload must never be able
//! to break out of its substitution slot.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Wrap `s` in single quotes, POSIX-escaping any embedded single quote as
/// `'\''`. Safe to splice into any `sh -c` command line.
pub fn shell_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

fn payload_field_as_string(payload: &Value, key: &str) -> Option<String> {
    let field = payload.get(key)?;
    match field {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Interpolate `template` against `payload` at `now`, shell-escaping every
/// substituted value.
pub fn interpolate(template: &str, payload: &Value, now: DateTime<Utc>) -> String {
    let payload_str = serde_json::to_string(payload).unwrap_or_else(|_| "null".to_string());
    let timestamp = now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    let mut out = String::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // Unterminated placeholder: emit the rest verbatim.
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let key = after[..end].trim();
        let replacement = if key == "payload" {
            shell_escape(&payload_str)
        } else if key == "timestamp" {
            shell_escape(&timestamp)
        } else if let Some(field) = key.strip_prefix("payload.") {
            match payload_field_as_string(payload, field) {
                Some(v) => shell_escape(&v),
                None => shell_escape(""),
            }
        } else {
            // Unknown placeholder: leave it untouched rather than guess.
            format!("{{{{{key}}}}}")
        };
        out.push_str(&replacement);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn escapes_embedded_single_quote() {
        assert_eq!(shell_escape("it's"), "'it'\\''s'");
    }

    #[test]
    fn escapes_shell_metacharacters() {
        let escaped = shell_escape("; rm -rf / #");
        assert_eq!(escaped, "'; rm -rf / #'");
    }

    #[test]
    fn interpolates_timestamp() {
        let out = interpolate("deployed at {{timestamp}}", &json!({}), at());
        assert_eq!(out, "deployed at '2026-03-01T12:00:00Z'");
    }

    #[test]
    fn interpolates_whole_payload() {
        let out = interpolate("payload={{payload}}", &json!({"a": 1}), at());
        assert_eq!(out, "payload='{\"a\":1}'");
    }

    #[test]
    fn interpolates_payload_field() {
        let out = interpolate("hello {{payload.name}}", &json!({"name": "world"}), at());
        assert_eq!(out, "hello 'world'");
    }

    #[test]
    fn malicious_payload_field_cannot_break_out_of_quotes() {
        let payload = json!({"name": "x'; rm -rf / #"});
        let out = interpolate("echo {{payload.name}}", &payload, at());
        assert_eq!(out, "echo 'x'\\''; rm -rf / #'");
    }

    #[test]
    fn missing_payload_field_interpolates_as_empty() {
        let out = interpolate("value={{payload.missing}}", &json!({}), at());
        assert_eq!(out, "value=''");
    }

    #[test]
    fn unknown_placeholder_left_untouched() {
        let out = interpolate("{{bogus}}", &json!({}), at());
        assert_eq!(out, "{{bogus}}");
    }
}
