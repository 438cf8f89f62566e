#![forbid(unsafe_code)]

use crate::DomainError;
use chrono::{Datelike, Month, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calendar anchor of a date-based plan day.
///
/// Plan files either pin a day to a full date or to a month/day pair that repeats every
/// year (`Mar-7`). Yearly anchors resolve against the year of the reference date.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScheduleDate {
    Calendar(NaiveDate),
    Yearly { month: u32, day: u32 },
}

impl ScheduleDate {
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let value = value.trim();
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Ok(Self::Calendar(date));
        }

        let invalid = || DomainError::InvalidScheduleDate(value.to_string());
        let (month, day) = value.split_once('-').ok_or_else(invalid)?;
        let month = Month::from_str(month.trim())
            .map_err(|_| invalid())?
            .number_from_month();
        let day = day.trim().parse::<u32>().map_err(|_| invalid())?;
        // 2024 is a leap year, so Feb-29 is accepted here.
        if NaiveDate::from_ymd_opt(2024, month, day).is_none() {
            return Err(invalid());
        }
        Ok(Self::Yearly { month, day })
    }

    /// Resolves the anchor to a concrete date in `year`. Feb-29 falls back to Feb-28 in
    /// non-leap years.
    pub fn resolve(self, year: i32) -> Option<NaiveDate> {
        match self {
            Self::Calendar(date) => Some(date),
            Self::Yearly { month, day } => NaiveDate::from_ymd_opt(year, month, day)
                .or_else(|| NaiveDate::from_ymd_opt(year, month, day.saturating_sub(1))),
        }
    }

    pub fn resolve_near(self, today: NaiveDate) -> Option<NaiveDate> {
        self.resolve(today.year())
    }
}

impl fmt::Display for ScheduleDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Calendar(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::Yearly { month, day } => {
                let name = u8::try_from(*month)
                    .ok()
                    .and_then(|month| Month::try_from(month).ok())
                    .map(|month| month.name())
                    .unwrap_or("???");
                write!(f, "{}-{day}", &name[..3])
            }
        }
    }
}

impl FromStr for ScheduleDate {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for ScheduleDate {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ScheduleDate> for String {
    fn from(value: ScheduleDate) -> Self {
        value.to_string()
    }
}
