//! Lightweight cron expression parser.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds)
//! Fields: *, */N, N, A-B, A-B/N and comma lists of those
//! Example: "0 8 * * 1" = Mondays at 8:00, "0 9 1 1,4,7,10 *" = quarter starts
//!
//! Day-of-week is 0-6 with Sunday = 0 (7 is accepted as Sunday too). When both
//! day-of-month and day-of-week are restricted a day matching either fires,
//! as in classic cron.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use hrflow_core::{HrFlowError, Result};

/// How far ahead `next_after` searches before giving up (e.g. "0 0 30 2 *").
const SEARCH_DAYS: i64 = 366 * 5;

/// A parsed 5-field cron expression, evaluated in local wall-clock time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days_of_month: Vec<u32>,
    months: Vec<u32>,
    days_of_week: Vec<u32>,
    dom_any: bool,
    dow_any: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(HrFlowError::Config(format!(
                "invalid cron expression '{expression}' (need 5 fields: MIN HOUR DOM MON DOW)"
            )));
        }
        let field = |idx: usize, min: u32, max: u32| {
            parse_field(parts[idx], min, max).ok_or_else(|| {
                HrFlowError::Config(format!(
                    "invalid cron field '{}' in '{expression}' (allowed {min}-{max})",
                    parts[idx]
                ))
            })
        };

        let mut days_of_week: Vec<u32> = field(4, 0, 7)?.into_iter().map(|d| d % 7).collect();
        days_of_week.sort_unstable();
        days_of_week.dedup();

        Ok(Self {
            expression: expression.trim().to_string(),
            minutes: field(0, 0, 59)?,
            hours: field(1, 0, 23)?,
            days_of_month: field(2, 1, 31)?,
            months: field(3, 1, 12)?,
            days_of_week,
            dom_any: parts[2].starts_with('*'),
            dow_any: parts[4].starts_with('*'),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn matches_day(&self, date: NaiveDate) -> bool {
        if !self.months.contains(&date.month()) {
            return false;
        }
        let dom = self.days_of_month.contains(&date.day());
        let dow = self.days_of_week.contains(&date.weekday().num_days_from_sunday());
        match (self.dom_any, self.dow_any) {
            (true, true) => true,
            (false, true) => dom,
            (true, false) => dow,
            (false, false) => dom || dow,
        }
    }

    /// Whether the schedule fires in the minute containing `at`.
    pub fn matches(&self, at: NaiveDateTime) -> bool {
        self.matches_day(at.date())
            && self.hours.contains(&at.hour())
            && self.minutes.contains(&at.minute())
    }

    /// First fire time strictly after `after`, at minute resolution.
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let start = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let first_day = start.date();

        for offset in 0..SEARCH_DAYS {
            let date = first_day + Duration::days(offset);
            if !self.matches_day(date) {
                continue;
            }
            for &h in &self.hours {
                for &m in &self.minutes {
                    let candidate = date.and_hms_opt(h, m, 0)?;
                    if candidate >= start {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }
}

impl std::fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Parse a cron field into the sorted list of matching values.
fn parse_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    let mut values = Vec::new();
    for part in field.split(',') {
        values.extend(parse_part(part.trim(), min, max)?);
    }
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    values.dedup();
    Some(values)
}

fn parse_part(part: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => {
            let n: usize = step.parse().ok()?;
            if n == 0 {
                return None;
            }
            (range, n)
        }
        None => (part, 1),
    };

    let (lo, hi) = if range == "*" {
        (min, max)
    } else if let Some((a, b)) = range.split_once('-') {
        (a.parse().ok()?, b.parse().ok()?)
    } else {
        let n: u32 = range.parse().ok()?;
        // "5/15" means from 5 to the end of the range
        if step > 1 { (n, max) } else { (n, n) }
    };

    if lo < min || hi > max || lo > hi {
        return None;
    }
    Some((lo..=hi).step_by(step).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn next(expr: &str, after: NaiveDateTime) -> NaiveDateTime {
        CronSchedule::parse(expr).unwrap().next_after(after).unwrap()
    }

    #[test]
    fn test_every_hour() {
        assert_eq!(next("0 * * * *", at(2026, 2, 22, 10, 30)), at(2026, 2, 22, 11, 0));
    }

    #[test]
    fn test_specific_time() {
        assert_eq!(next("0 8 * * *", at(2026, 2, 22, 7, 0)), at(2026, 2, 22, 8, 0));
        // Exactly on the fire time: the next one is tomorrow
        assert_eq!(next("0 8 * * *", at(2026, 2, 22, 8, 0)), at(2026, 2, 23, 8, 0));
    }

    #[test]
    fn test_every_15_minutes() {
        assert_eq!(next("*/15 * * * *", at(2026, 2, 22, 10, 2)), at(2026, 2, 22, 10, 15));
    }

    #[test]
    fn test_weekly_monday() {
        // 2024-06-12 is a Wednesday
        assert_eq!(next("0 8 * * 1", at(2024, 6, 12, 9, 0)), at(2024, 6, 17, 8, 0));
        assert_eq!(next("0 8 * * 1", at(2024, 6, 10, 7, 59)), at(2024, 6, 10, 8, 0));
    }

    #[test]
    fn test_monthly_first() {
        assert_eq!(next("0 9 1 * *", at(2024, 2, 15, 0, 0)), at(2024, 3, 1, 9, 0));
        assert_eq!(next("0 9 1 * *", at(2024, 12, 1, 9, 0)), at(2025, 1, 1, 9, 0));
    }

    #[test]
    fn test_quarterly() {
        assert_eq!(
            next("0 9 1 1,4,7,10 *", at(2024, 4, 1, 9, 0)),
            at(2024, 7, 1, 9, 0)
        );
    }

    #[test]
    fn test_ranges_and_sunday_alias() {
        let weekdays = CronSchedule::parse("30 9 * * 1-5").unwrap();
        // Saturday 2024-06-15
        assert!(!weekdays.matches(at(2024, 6, 15, 9, 30)));
        assert!(weekdays.matches(at(2024, 6, 14, 9, 30)));

        let sunday = CronSchedule::parse("0 0 * * 7").unwrap();
        assert!(sunday.matches(at(2024, 6, 16, 0, 0)));
    }

    #[test]
    fn test_dom_or_dow() {
        // 1st of the month OR any Monday
        let s = CronSchedule::parse("0 9 1 * 1").unwrap();
        assert!(s.matches(at(2024, 6, 1, 9, 0)));
        assert!(s.matches(at(2024, 6, 3, 9, 0)));
        assert!(!s.matches(at(2024, 6, 4, 9, 0)));
    }

    #[test]
    fn test_invalid_expression() {
        assert!(CronSchedule::parse("bad").is_err());
        assert!(CronSchedule::parse("60 * * * *").is_err());
        assert!(CronSchedule::parse("*/0 * * * *").is_err());
        assert!(CronSchedule::parse("0 9 5-1 * *").is_err());
        assert!(CronSchedule::parse("0 9 0 * *").is_err());
    }

    #[test]
    fn test_impossible_date_never_fires() {
        let s = CronSchedule::parse("0 0 30 2 *").unwrap();
        assert!(s.next_after(at(2024, 1, 1, 0, 0)).is_none());
    }
}
