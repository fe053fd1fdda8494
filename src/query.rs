//! Gmail search expressions for PDF-carrying messages

use chrono::{Datelike, Local, NaiveDate};
use std::fmt;
use std::str::FromStr;

use crate::error::{OrganizerError, Result};

/// A calendar month parsed from `YYYY-MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Month {
    first_day: NaiveDate,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|first_day| Self { first_day })
            .ok_or_else(|| {
                OrganizerError::ConfigError(format!("Invalid month: {}-{:02}", year, month))
            })
    }

    /// The month containing today's local date
    pub fn current() -> Self {
        let today = Local::now().date_naive();
        Self {
            first_day: today.with_day(1).unwrap_or(today),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first_day
    }

    /// First day of the following month
    pub fn next_first_day(&self) -> NaiveDate {
        let (year, month) = if self.first_day.month() == 12 {
            (self.first_day.year() + 1, 1)
        } else {
            (self.first_day.year(), self.first_day.month() + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(self.first_day)
    }
}

impl FromStr for Month {
    type Err = OrganizerError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            OrganizerError::ConfigError(format!("Invalid month '{}', expected YYYY-MM", s))
        };

        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first_day.format("%Y-%m"))
    }
}

/// Search expression handed to `messages.list`; immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    expression: String,
}

impl SearchQuery {
    /// Messages with a PDF attachment, optionally received within `month`
    ///
    /// Gmail's `after:` includes the given day and `before:` excludes it, so
    /// the range runs from the 1st up to the 1st of the next month.
    pub fn pdf_attachments(month: Option<Month>) -> Self {
        let mut parts = vec!["has:attachment".to_string(), "filename:pdf".to_string()];
        if let Some(month) = month {
            parts.push(format!("after:{}", month.first_day().format("%Y/%m/%d")));
            parts.push(format!("before:{}", month.next_first_day().format("%Y/%m/%d")));
        }

        Self {
            expression: parts.join(" "),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.expression
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}
