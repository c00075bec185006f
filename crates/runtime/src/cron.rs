// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule pattern language: `every <N><unit>` intervals and a cron subset.
//!
//! Cron expressions have 5 or 6 whitespace-separated fields
//! (`minute hour day month weekday [year]`) built from digits, `*`, `/`,
//! `-`, and `,`. Unsupported constructs are rejected at parse time rather
//! than silently degraded.

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone,
    Timelike, Utc,
};
use conveyor_core::QueueError;
use std::time::Duration;

/// Common cron patterns.
pub mod patterns {
    pub const EVERY_MINUTE: &str = "* * * * *";
    pub const EVERY_5_MINUTES: &str = "*/5 * * * *";
    pub const EVERY_15_MINUTES: &str = "*/15 * * * *";
    pub const EVERY_30_MINUTES: &str = "*/30 * * * *";
    pub const HOURLY: &str = "0 * * * *";
    pub const DAILY_MIDNIGHT: &str = "0 0 * * *";
    pub const DAILY_NOON: &str = "0 12 * * *";
    pub const WEEKLY_MONDAY: &str = "0 0 * * 1";
    pub const MONTHLY_FIRST: &str = "0 0 1 * *";
}

/// Upper bound on field-guided search steps. Each mismatch skips at least a
/// minute and usually a whole day, so this covers decades of calendar.
const MAX_SEARCH_STEPS: u32 = 100_000;

/// Timezone for cron evaluation: `UTC` or a fixed `±HH:MM` offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timezone(FixedOffset);

impl Timezone {
    pub fn utc() -> Self {
        match FixedOffset::east_opt(0) {
            Some(offset) => Self(offset),
            // A zero offset is always in range.
            None => unreachable!("zero offset is always valid"),
        }
    }

    pub fn parse(input: &str) -> Result<Self, QueueError> {
        let s = input.trim();
        if s.eq_ignore_ascii_case("utc") {
            return Ok(Self::utc());
        }
        let (sign, rest) = if let Some(rest) = s.strip_prefix('+') {
            (1i32, rest)
        } else if let Some(rest) = s.strip_prefix('-') {
            (-1i32, rest)
        } else {
            return Err(QueueError::validation(format!(
                "unsupported timezone '{s}': expected UTC or a ±HH:MM offset"
            )));
        };
        let Some((hh, mm)) = rest.split_once(':') else {
            return Err(QueueError::validation(format!("malformed timezone offset '{s}'")));
        };
        let hours: i32 = hh
            .parse()
            .map_err(|_| QueueError::validation(format!("malformed timezone offset '{s}'")))?;
        let minutes: i32 = mm
            .parse()
            .map_err(|_| QueueError::validation(format!("malformed timezone offset '{s}'")))?;
        if hours > 23 || minutes > 59 {
            return Err(QueueError::validation(format!("timezone offset '{s}' is out of range")));
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Self)
            .ok_or_else(|| QueueError::validation(format!("timezone offset '{s}' is out of range")))
    }

    fn offset(&self) -> FixedOffset {
        self.0
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Self::utc()
    }
}

/// A parsed recurring pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulePattern {
    /// `every <N><unit>` with unit in `s|m|h|d`.
    Interval(Duration),
    Cron(CronExpr),
}

impl SchedulePattern {
    pub fn parse(input: &str) -> Result<Self, QueueError> {
        let s = input.trim();
        if let Some(rest) = s.strip_prefix("every ") {
            return parse_interval(rest).map(Self::Interval);
        }
        CronExpr::parse(s).map(Self::Cron)
    }

    /// Epoch ms of the next firing strictly after `after_ms`.
    pub fn next_after(&self, after_ms: u64, tz: &Timezone) -> Result<u64, QueueError> {
        match self {
            Self::Interval(interval) => Ok(after_ms + interval.as_millis() as u64),
            Self::Cron(expr) => expr.next_after(after_ms, tz),
        }
    }
}

fn parse_interval(input: &str) -> Result<Duration, QueueError> {
    let s = input.trim();
    let digits_end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let (num, unit) = (&s[..digits_end], s[digits_end..].trim());
    let n: u64 = num
        .parse()
        .map_err(|_| QueueError::validation(format!("invalid interval '{input}'")))?;
    if n == 0 {
        return Err(QueueError::validation(format!("interval '{input}' must be positive")));
    }
    let seconds = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => {
            return Err(QueueError::validation(format!(
                "invalid interval unit in '{input}': expected s, m, h, or d"
            )))
        }
    };
    Ok(Duration::from_secs(n * seconds))
}

#[derive(Debug, Clone, PartialEq)]
enum CronField {
    Any,
    /// `*/k`: every k-th value.
    Step(u32),
    /// Explicit values, expanded from lists and ranges, sorted.
    Values(Vec<u32>),
}

impl CronField {
    fn matches(&self, value: u32) -> bool {
        match self {
            CronField::Any => true,
            CronField::Step(k) => value % k == 0,
            CronField::Values(values) => values.contains(&value),
        }
    }

    /// Whether the field constrains anything (used for the day/weekday rule).
    fn is_restricted(&self) -> bool {
        !matches!(self, CronField::Any)
    }
}

fn parse_field(input: &str, min: u32, max: u32, label: &str) -> Result<CronField, QueueError> {
    if input == "*" {
        return Ok(CronField::Any);
    }
    if let Some(step) = input.strip_prefix("*/") {
        let k: u32 = step.parse().map_err(|_| {
            QueueError::validation(format!("invalid {label} field '{input}' in cron pattern"))
        })?;
        if k == 0 || k > max {
            return Err(QueueError::validation(format!(
                "step in {label} field '{input}' is out of range"
            )));
        }
        return Ok(CronField::Step(k));
    }
    let mut values = Vec::new();
    for part in input.split(',') {
        let bad =
            || QueueError::validation(format!("invalid {label} field '{input}' in cron pattern"));
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: u32 = lo.parse().map_err(|_| bad())?;
            let hi: u32 = hi.parse().map_err(|_| bad())?;
            if lo > hi || lo < min || hi > max {
                return Err(QueueError::validation(format!(
                    "range in {label} field '{input}' is out of bounds {min}-{max}"
                )));
            }
            values.extend(lo..=hi);
        } else {
            let v: u32 = part.parse().map_err(|_| bad())?;
            if v < min || v > max {
                return Err(QueueError::validation(format!(
                    "value {v} in {label} field is out of bounds {min}-{max}"
                )));
            }
            values.push(v);
        }
    }
    if values.is_empty() {
        return Err(QueueError::validation(format!("empty {label} field in cron pattern")));
    }
    values.sort_unstable();
    values.dedup();
    Ok(CronField::Values(values))
}

/// A parsed 5/6-field cron expression.
#[derive(Debug, Clone, PartialEq)]
pub struct CronExpr {
    minute: CronField,
    hour: CronField,
    day: CronField,
    month: CronField,
    weekday: CronField,
    year: Option<CronField>,
}

impl CronExpr {
    pub fn parse(input: &str) -> Result<Self, QueueError> {
        let fields: Vec<&str> = input.split_whitespace().collect();
        if fields.len() != 5 && fields.len() != 6 {
            return Err(QueueError::validation(format!(
                "cron pattern '{input}' must have 5 or 6 fields, got {}",
                fields.len()
            )));
        }
        let weekday = match parse_field(fields[4], 0, 7, "weekday")? {
            // 7 is an alias for Sunday.
            CronField::Values(values) => {
                let mut values: Vec<u32> =
                    values.into_iter().map(|v| if v == 7 { 0 } else { v }).collect();
                values.sort_unstable();
                values.dedup();
                CronField::Values(values)
            }
            field => field,
        };
        Ok(Self {
            minute: parse_field(fields[0], 0, 59, "minute")?,
            hour: parse_field(fields[1], 0, 23, "hour")?,
            day: parse_field(fields[2], 1, 31, "day")?,
            month: parse_field(fields[3], 1, 12, "month")?,
            weekday,
            year: match fields.get(5) {
                Some(field) => Some(parse_field(field, 1970, 9999, "year")?),
                None => None,
            },
        })
    }

    /// Day is a match when day-of-month and day-of-week agree; when both are
    /// restricted, either matching suffices (standard cron rule).
    fn day_matches(&self, t: &NaiveDateTime) -> bool {
        let dom = self.day.matches(t.day());
        let dow = self.weekday.matches(t.weekday().num_days_from_sunday());
        if self.day.is_restricted() && self.weekday.is_restricted() {
            dom || dow
        } else {
            dom && dow
        }
    }

    /// Epoch ms of the next match strictly after `after_ms`, evaluated in `tz`.
    pub fn next_after(&self, after_ms: u64, tz: &Timezone) -> Result<u64, QueueError> {
        let fail = || QueueError::timeout("next-run computation failed");
        let offset = tz.offset();
        let after: DateTime<Utc> =
            Utc.timestamp_millis_opt(after_ms as i64).single().ok_or_else(fail)?;
        let mut t: NaiveDateTime = after.with_timezone(&offset).naive_local();
        t = t
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .and_then(|t| t.checked_add_signed(TimeDelta::minutes(1)))
            .ok_or_else(fail)?;

        let midnight = NaiveTime::default();
        for _ in 0..MAX_SEARCH_STEPS {
            if let Some(year) = &self.year {
                let y = t.year();
                if y < 0 || y > 9999 {
                    return Err(QueueError::timeout("cron pattern has no upcoming run"));
                }
                if !year.matches(y as u32) {
                    t = NaiveDate::from_ymd_opt(y + 1, 1, 1)
                        .map(|d| d.and_time(midnight))
                        .ok_or_else(fail)?;
                    continue;
                }
            }
            if !self.month.matches(t.month()) {
                let (y, m) =
                    if t.month() == 12 { (t.year() + 1, 1) } else { (t.year(), t.month() + 1) };
                t = NaiveDate::from_ymd_opt(y, m, 1)
                    .map(|d| d.and_time(midnight))
                    .ok_or_else(fail)?;
                continue;
            }
            if !self.day_matches(&t) {
                t = t
                    .date()
                    .succ_opt()
                    .map(|d| d.and_time(midnight))
                    .ok_or_else(fail)?;
                continue;
            }
            if !self.hour.matches(t.hour()) {
                t = t
                    .with_minute(0)
                    .and_then(|t| t.checked_add_signed(TimeDelta::hours(1)))
                    .ok_or_else(fail)?;
                continue;
            }
            if !self.minute.matches(t.minute()) {
                t = t.checked_add_signed(TimeDelta::minutes(1)).ok_or_else(fail)?;
                continue;
            }
            let resolved = offset.from_local_datetime(&t).single().ok_or_else(fail)?;
            return Ok(resolved.with_timezone(&Utc).timestamp_millis() as u64);
        }
        Err(QueueError::timeout("cron pattern has no upcoming run"))
    }
}

#[cfg(test)]
#[path = "cron_tests.rs"]
mod tests;
