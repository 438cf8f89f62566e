#![forbid(unsafe_code)]

use crate::ids::PlanId;
use crate::{DomainError, ScheduleDate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStatus {
    Completed,
    Skipped,
    Unread,
}

impl ReadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadStatus::Completed => "completed",
            ReadStatus::Skipped => "skipped",
            ReadStatus::Unread => "unread",
        }
    }

    /// Strict parse of the persisted representation.
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "completed" => Ok(ReadStatus::Completed),
            "skipped" => Ok(ReadStatus::Skipped),
            "unread" => Ok(ReadStatus::Unread),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }

    /// Lenient mapping of the free-text status written by the single-cycle schema.
    /// Returns `None` for text that has no sensible reading.
    pub fn from_legacy(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "read" | "completed" | "complete" | "done" | "finished" => Some(ReadStatus::Completed),
            "skipped" | "skip" => Some(ReadStatus::Skipped),
            "" | "unread" | "not_read" | "notread" | "none" => Some(ReadStatus::Unread),
            _ => None,
        }
    }
}

/// How a plan's current day is determined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    /// Days advance by user action.
    Ordinal,
    /// Days are due on calendar dates.
    DateAnchored,
}

impl PlanKind {
    pub fn of(days: &[PlanDay]) -> Self {
        if days.iter().any(|day| day.date.is_some()) {
            PlanKind::DateAnchored
        } else {
            PlanKind::Ordinal
        }
    }
}

/// A plan the user has started. Absence of a row means "never started".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub day_count: u32,
    pub versification: String,
    pub start_date: Option<DateTime<Utc>>,
    /// Highest day completed in the current iteration of a date-anchored plan.
    pub day_complete: Option<u32>,
    /// Stored pointer of an ordinal plan; ignored for date-anchored plans.
    pub current_day: u32,
    /// Incremented on every reset, so history rows of earlier cycles stay addressable.
    pub iteration: u32,
    /// Catalog content revision the stored days were built from. `None` until the day table
    /// has been built from a catalog definition.
    pub version: Option<u32>,
}

impl Plan {
    pub fn new(
        id: PlanId,
        day_count: u32,
        versification: impl Into<String>,
    ) -> Result<Self, DomainError> {
        if day_count == 0 {
            return Err(DomainError::ZeroDayCount);
        }
        Ok(Self {
            id,
            name: None,
            description: None,
            day_count,
            versification: versification.into(),
            start_date: None,
            day_complete: None,
            current_day: 1,
            iteration: 1,
            version: None,
        })
    }

    pub fn contains_day(&self, day_number: u32) -> bool {
        (1..=self.day_count).contains(&day_number)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.day_count == 0 {
            return Err(DomainError::ZeroDayCount);
        }
        if self.iteration == 0 {
            return Err(DomainError::ZeroIteration);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDay {
    pub plan_id: PlanId,
    pub day_number: u32,
    pub date: Option<ScheduleDate>,
    pub assignment: String,
}

/// Completion fact for one (plan, day, iteration).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub plan_id: PlanId,
    pub day_number: u32,
    pub iteration: u32,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ReadStatus,
}

impl HistoryRecord {
    pub fn completed(plan_id: PlanId, day_number: u32, iteration: u32, at: DateTime<Utc>) -> Self {
        Self {
            plan_id,
            day_number,
            iteration,
            completed_at: Some(at),
            status: ReadStatus::Completed,
        }
    }

    pub fn pending(plan_id: PlanId, day_number: u32, iteration: u32, status: ReadStatus) -> Self {
        Self {
            plan_id,
            day_number,
            iteration,
            completed_at: None,
            status,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ReadStatus::Completed
    }
}
