// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! 5-field cron expression parsing and matching.
//!
//! Fields: `minute 0-59, hour 0-23, dom 1-31, month 1-12, dow 0-6 (0=Sun)`.
//! Supported syntax per field: `*`, `*/n`, `n`, `a,b,c`, `a-b`.

use chrono::{DateTime, Datelike, Timelike, Utc};

#[derive(Debug, Clone)]
struct Field {
    /// Matching values for this field, expanded at parse time.
    allowed: Vec<u32>,
}

impl Field {
    fn parse(spec: &str, min: u32, max: u32) -> Result<Self, String> {
        let mut allowed = Vec::new();
        for part in spec.split(',') {
            allowed.extend(Self::parse_part(part, min, max)?);
        }
        allowed.sort_unstable();
        allowed.dedup();
        if allowed.is_empty() {
            return Err(format!("cron field '{spec}' matches no values"));
        }
        Ok(Self { allowed })
    }

    fn parse_part(part: &str, min: u32, max: u32) -> Result<Vec<u32>, String> {
        if part == "*" {
            return Ok((min..=max).collect());
        }
        if let Some(step_spec) = part.strip_prefix("*/") {
            let step: u32 = step_spec
                .parse()
                .map_err(|_| format!("invalid step '{part}'"))?;
            if step == 0 {
                return Err(format!("invalid step '{part}': step must be > 0"));
            }
            return Ok((min..=max).step_by(step as usize).collect());
        }
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: u32 = lo.parse().map_err(|_| format!("invalid range '{part}'"))?;
            let hi: u32 = hi.parse().map_err(|_| format!("invalid range '{part}'"))?;
            if lo > hi || lo < min || hi > max {
                return Err(format!("range '{part}' out of bounds [{min},{max}]"));
            }
            return Ok((lo..=hi).collect());
        }
        let v: u32 = part.parse().map_err(|_| format!("invalid value '{part}'"))?;
        if v < min || v > max {
            return Err(format!("value '{v}' out of bounds [{min},{max}]"));
        }
        Ok(vec![v])
    }

    fn matches(&self, value: u32) -> bool {
        self.allowed.binary_search(&value).is_ok()
    }
}

/// A parsed 5-field cron schedule.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    minute: Field,
    hour: Field,
    dom: Field,
    month: Field,
    dow: Field,
}

impl CronSchedule {
    /// Parse a 5-field cron expression. Field order: minute, hour,
    /// day-of-month, month, day-of-week (0 = Sunday).
    pub fn parse(expr: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!(
                "expected 5 fields (minute hour dom month dow), got {}",
                fields.len()
            ));
        }
        Ok(Self {
            minute: Field::parse(fields[0], 0, 59)?,
            hour: Field::parse(fields[1], 0, 23)?,
            dom: Field::parse(fields[2], 1, 31)?,
            month: Field::parse(fields[3], 1, 12)?,
            dow: Field::parse(fields[4], 0, 6)?,
        })
    }

    /// True if `t` (UTC) matches every field predicate.
    pub fn matches(&self, t: DateTime<Utc>) -> bool {
        self.minute.matches(t.minute())
            && self.hour.matches(t.hour())
            && self.dom.matches(t.day())
            && self.month.matches(t.month())
            && self.dow.matches(t.weekday().num_days_from_sunday())
    }
}
