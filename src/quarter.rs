//! Calendar quarters.
//!
//! A [`Quarter`] is rendered and parsed as `YYYY-Qn`. Ordering is by
//! `(year, quarter)`, which is the same as ordering by `year * 4 + quarter`.

use crate::error::{BuzzError, Result};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// A calendar quarter such as `2023-Q1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quarter {
    pub(crate) year: i32,
    pub(crate) quarter: u8,
}

impl Quarter {
    /// Build a quarter, rejecting anything outside `1..=4`.
    pub fn new(year: i32, quarter: u8) -> Result<Self> {
        if !(1..=4).contains(&quarter) {
            return Err(BuzzError::Parse(format!(
                "quarter must be 1-4, got {}",
                quarter
            )));
        }
        Ok(Self { year, quarter })
    }

    /// Quarter containing the given date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            quarter: ((date.month() - 1) / 3 + 1) as u8,
        }
    }

    /// Quarter of a publication timestamp.
    ///
    /// Only the first 10 characters are read, as `YYYY-MM-DD`, so full Atom
    /// timestamps like `2022-04-15T17:59:59Z` are accepted.
    pub fn from_published(published: &str) -> Result<Self> {
        let trimmed = published.trim();
        let head = trimmed.get(..10).unwrap_or(trimmed);
        let date = NaiveDate::parse_from_str(head, "%Y-%m-%d").map_err(|e| BuzzError::Date {
            value: published.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_date(date))
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn quarter(&self) -> u8 {
        self.quarter
    }

    /// Linear index `year * 4 + quarter`.
    pub fn index(&self) -> i64 {
        i64::from(self.year) * 4 + i64::from(self.quarter)
    }

    /// The three calendar months (1-based) covered by this quarter.
    pub fn months(&self) -> std::ops::RangeInclusive<u32> {
        let start = u32::from(self.quarter - 1) * 3 + 1;
        start..=start + 2
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-Q{}", self.year, self.quarter)
    }
}

fn label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})-Q([1-4])$").expect("valid quarter regex"))
}

impl FromStr for Quarter {
    type Err = BuzzError;

    fn from_str(s: &str) -> Result<Self> {
        let caps = label_regex()
            .captures(s.trim())
            .ok_or_else(|| BuzzError::Parse(format!("invalid quarter label {:?}", s)))?;
        let year = caps[1]
            .parse::<i32>()
            .map_err(|e| BuzzError::Parse(format!("invalid year in {:?}: {}", s, e)))?;
        let quarter = caps[2]
            .parse::<u8>()
            .map_err(|e| BuzzError::Parse(format!("invalid quarter in {:?}: {}", s, e)))?;
        Self::new(year, quarter)
    }
}

impl Serialize for Quarter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quarter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
