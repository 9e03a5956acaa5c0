//! Six-field cron expression parsing and matching (SPEC_FULL §4.3).
//!
//! Fields, in order: seconds, minutes, hours, day-of-month, month,
//! day-of-week. Each field is `*`, a literal integer, a comma-separated
//! list, or an `a-b` range — no step values, no names. Unlike a
//! timezone-aware scheduler, Kiwibes matches purely against local wall
//! clock: `matches` takes an already broken-down time, not a timezone.

use chrono::{Datelike, Local, Timelike};

/// A broken-down local time, the unit `matches` tests a schedule against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokenDownTime {
    pub sec: u32,
    pub min: u32,
    pub hour: u32,
    pub dom: u32,
    pub month: u32,
    /// 0 = Sunday .. 6 = Saturday.
    pub dow: u32,
}

impl BrokenDownTime {
    pub fn now_local() -> Self {
        let now = Local::now();
        BrokenDownTime {
            sec: now.second(),
            min: now.minute(),
            hour: now.hour(),
            dom: now.day(),
            month: now.month(),
            // chrono's `weekday().num_days_from_sunday()` is already 0=Sunday.
            dow: now.weekday().num_days_from_sunday(),
        }
    }
}

const FIELD_RANGES: [(u32, u32); 6] = [
    (0, 59), // seconds
    (0, 59), // minutes
    (0, 23), // hours
    (1, 31), // day of month
    (1, 12), // month
    (0, 6),  // day of week, 0 = Sunday
];

/// `true` iff `expr` is a syntactically and range-valid 6-field cron
/// expression.
pub fn validate(expr: &str) -> bool {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 6 {
        return false;
    }
    fields
        .iter()
        .zip(FIELD_RANGES.iter())
        .all(|(field, &(min, max))| validate_field(field, min, max))
}

fn validate_field(field: &str, min: u32, max: u32) -> bool {
    if field == "*" {
        return true;
    }
    field.split(',').all(|part| validate_token(part, min, max))
}

fn validate_token(token: &str, min: u32, max: u32) -> bool {
    if let Some((lo, hi)) = token.split_once('-') {
        match (lo.parse::<u32>(), hi.parse::<u32>()) {
            (Ok(lo), Ok(hi)) => lo <= hi && lo >= min && hi <= max,
            _ => false,
        }
    } else {
        match token.parse::<u32>() {
            Ok(v) => v >= min && v <= max,
            Err(_) => false,
        }
    }
}

/// `true` iff every field of `expr` contains `t`'s corresponding
/// component. Pure, deterministic, never panics (P5): an invalid
/// expression simply never matches.
pub fn matches(expr: &str, t: BrokenDownTime) -> bool {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 6 {
        return false;
    }
    let values = [t.sec, t.min, t.hour, t.dom, t.month, t.dow];

    fields
        .iter()
        .zip(FIELD_RANGES.iter())
        .zip(values.iter())
        .all(|((field, &(min, max)), &value)| {
            validate_field(field, min, max) && field_matches(field, value)
        })
}

fn field_matches(field: &str, value: u32) -> bool {
    if field == "*" {
        return true;
    }
    field.split(',').any(|part| token_matches(part, value))
}

fn token_matches(token: &str, value: u32) -> bool {
    if let Some((lo, hi)) = token.split_once('-') {
        match (lo.parse::<u32>(), hi.parse::<u32>()) {
            (Ok(lo), Ok(hi)) => value >= lo && value <= hi,
            _ => false,
        }
    } else {
        token.parse::<u32>() == Ok(value)
    }
}
