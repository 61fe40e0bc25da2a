//! Lightweight cron expression parser for the scheduler cadence.
//! Supports: "MIN HOUR DOM MON DOW" (5-field) or "SEC MIN HOUR DOM MON DOW" (6-field).
//! Wildcards: *, */N, N, comma lists. DOM/MON/DOW accept only `*`.
//! Example: "0 * * * * *" = every minute at second 0.

use chrono::{DateTime, Duration, Timelike, Utc};
use nudge_core::error::{NudgeError, Result};

/// A parsed cadence expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    seconds: Vec<u32>,
    minutes: Vec<u32>,
    hours: Vec<u32>,
}

impl CronSchedule {
    /// Parse a 5- or 6-field expression.
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        let (second_spec, rest) = match parts.len() {
            5 => ("0", &parts[..]),
            6 => (parts[0], &parts[1..]),
            _ => {
                return Err(invalid(
                    expression,
                    "need 5 fields (MIN HOUR DOM MON DOW) or 6 with leading seconds",
                ));
            }
        };

        for spec in &rest[2..] {
            if *spec != "*" {
                return Err(invalid(expression, "day/month/weekday fields only support '*'"));
            }
        }

        let seconds =
            parse_field(second_spec, 0, 59).ok_or_else(|| invalid(expression, "bad seconds field"))?;
        let minutes =
            parse_field(rest[0], 0, 59).ok_or_else(|| invalid(expression, "bad minute field"))?;
        let hours =
            parse_field(rest[1], 0, 23).ok_or_else(|| invalid(expression, "bad hour field"))?;

        Ok(Self {
            expression: expression.to_string(),
            seconds,
            minutes,
            hours,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First matching instant strictly after `after`, searching up to 48 hours ahead.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.with_nanosecond(0)? + Duration::seconds(1);
        let mut minute = start.with_second(0)?;

        for _ in 0..(48 * 60) {
            if self.hours.contains(&minute.hour()) && self.minutes.contains(&minute.minute()) {
                for &s in &self.seconds {
                    let candidate = minute + Duration::seconds(i64::from(s));
                    if candidate >= start {
                        return Some(candidate);
                    }
                }
            }
            minute += Duration::minutes(1);
        }

        None
    }
}

fn invalid(expression: &str, why: &str) -> NudgeError {
    NudgeError::Configuration(format!("invalid cron expression '{expression}': {why}"))
}

/// Parse a cron field into a sorted list of matching values.
fn parse_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    if field == "*" {
        return Some((min..=max).collect());
    }

    // */N: every N
    if let Some(step) = field.strip_prefix("*/") {
        let n: u32 = step.parse().ok()?;
        if n == 0 {
            return None;
        }
        return Some((min..=max).step_by(n as usize).collect());
    }

    // Comma-separated: "0,15,30,45"
    if field.contains(',') {
        let mut vals: Vec<u32> = field
            .split(',')
            .map(|s| s.trim().parse())
            .collect::<std::result::Result<_, _>>()
            .ok()?;
        if vals.iter().any(|v| *v < min || *v > max) {
            return None;
        }
        vals.sort_unstable();
        vals.dedup();
        return Some(vals);
    }

    // Single number
    let n: u32 = field.parse().ok()?;
    if n >= min && n <= max {
        Some(vec![n])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_every_minute_six_fields() {
        let schedule = CronSchedule::parse("0 * * * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 30, 15).unwrap();
        let next = schedule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 22, 10, 31, 0).unwrap());
    }

    #[test]
    fn test_every_hour_five_fields() {
        let schedule = CronSchedule::parse("0 * * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 30, 0).unwrap();
        let next = schedule.next_after(after).unwrap();
        assert_eq!(next.hour(), 11);
        assert_eq!(next.minute(), 0);
        assert_eq!(next.second(), 0);
    }

    #[test]
    fn test_specific_time() {
        let schedule = CronSchedule::parse("0 8 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 7, 0, 0).unwrap();
        let next = schedule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 22, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_every_15_seconds() {
        let schedule = CronSchedule::parse("*/15 * * * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 2, 16).unwrap();
        let next = schedule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 22, 10, 2, 30).unwrap());
    }

    #[test]
    fn test_next_is_strictly_after() {
        let schedule = CronSchedule::parse("0 * * * * *").unwrap();
        let on_tick = Utc.with_ymd_and_hms(2026, 2, 22, 10, 31, 0).unwrap();
        let next = schedule.next_after(on_tick).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 2, 22, 10, 32, 0).unwrap());
    }

    #[test]
    fn test_comma_list() {
        let schedule = CronSchedule::parse("45,15 * * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 20, 0).unwrap();
        assert_eq!(schedule.next_after(after).unwrap().minute(), 45);
    }

    #[test]
    fn test_invalid_expression() {
        assert!(CronSchedule::parse("bad").is_err());
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
        assert!(CronSchedule::parse("61 * * * *").is_err());
        assert!(matches!(
            CronSchedule::parse("0 8 1 * *"),
            Err(NudgeError::Configuration(_))
        ));
    }
}
