//! Month arithmetic for rent billing cycles.
//!
//! A billing cycle is identified by its [`MonthKey`] (`YYYY-MM`). Each month
//! carries exactly one due date, built from the unit's recurring
//! [`DueMonthDay`] pattern.

use std::fmt;

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Serialize, Serializer};

/// Upper bound on generated cycles (20 years).
pub const MAX_SEQUENCE_MONTHS: usize = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parse `YYYY-MM`, or the leading `YYYY-MM` of a longer ISO date.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let head = raw.get(..7)?;
        let (year, month) = head.split_once('-')?;
        if year.len() != 4 || month.len() != 2 {
            return None;
        }
        if raw.len() > 7 && !raw[7..].starts_with('-') {
            return None;
        }
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    pub fn days_in_month(self) -> u32 {
        let first = self.first_day();
        first
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .map(|last| last.day())
            .unwrap_or(28)
    }

    /// Human label such as `March 2024`.
    pub fn label(self) -> String {
        self.first_day().format("%B %Y").to_string()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Recurring `MM-DD` rule naming the day rent falls due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueMonthDay {
    pub month: u32,
    pub day: u32,
}

impl Default for DueMonthDay {
    fn default() -> Self {
        Self { month: 1, day: 1 }
    }
}

impl DueMonthDay {
    /// Accepts `MM-DD` or a full `YYYY-MM-DD`. Anything else yields `01-01`.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse).unwrap_or_default()
    }

    fn parse(raw: &str) -> Option<Self> {
        let parts = raw.trim().split('-').collect::<Vec<_>>();
        let (month, day) = match parts.as_slice() {
            [month, day] => (*month, *day),
            [year, month, day] if year.len() == 4 => (*month, *day),
            _ => return None,
        };
        let month = month.parse::<u32>().ok()?;
        let day = day.parse::<u32>().ok()?;
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return None;
        }
        Some(Self { month, day })
    }
}

impl fmt::Display for DueMonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

pub fn month_key(date: NaiveDate) -> MonthKey {
    MonthKey::from_date(date)
}

pub fn next_month_key(key: MonthKey) -> MonthKey {
    key.next()
}

/// Parse a stored month or date string, falling back to `today`'s month.
pub fn month_key_or_today(raw: Option<&str>, today: NaiveDate) -> MonthKey {
    raw.and_then(MonthKey::parse)
        .unwrap_or_else(|| MonthKey::from_date(today))
}

/// Inclusive ascending run of months from `start` to `end`.
///
/// Truncated after [`MAX_SEQUENCE_MONTHS`] entries; empty when `end < start`.
pub fn month_key_sequence(start: MonthKey, end: MonthKey) -> Vec<MonthKey> {
    let mut keys = Vec::new();
    let mut current = start;
    while current <= end && keys.len() < MAX_SEQUENCE_MONTHS {
        keys.push(current);
        current = current.next();
    }
    keys
}

/// Due date of `key` under `pattern`. Days past the end of the month are
/// clamped to its last day (the 31st falls on Feb 28/29).
pub fn due_date_for_month(key: MonthKey, pattern: DueMonthDay) -> NaiveDate {
    let day = pattern.day.clamp(1, key.days_in_month());
    NaiveDate::from_ymd_opt(key.year, key.month, day).unwrap_or_else(|| key.first_day())
}

/// First billing month of a unit created at `created_at` (local wall-clock
/// time): the earliest due date, taken at midnight, not before creation.
pub fn first_due_month_key(created_at: NaiveDateTime, pattern: DueMonthDay) -> MonthKey {
    let created_on = created_at.date();
    let created_month = created_on.month();
    let created_year = created_on.year();

    let candidate = if pattern.month == created_month && pattern.day >= created_on.day() {
        MonthKey::from_date(created_on)
    } else if pattern.month < created_month {
        MonthKey {
            year: created_year + 1,
            month: pattern.month,
        }
    } else {
        MonthKey {
            year: created_year,
            month: pattern.month,
        }
    };

    if due_date_for_month(candidate, pattern).and_time(NaiveTime::MIN) < created_at {
        candidate.next()
    } else {
        candidate
    }
}
