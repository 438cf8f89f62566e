#![forbid(unsafe_code)]

use chrono::NaiveDate;
use rp_core::PlanKind;
use rp_core::ids::PlanId;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    NotStarted,
    Active,
    AllDaysComplete,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StartWarning {
    /// Stored days were built from an older catalog revision, or from no catalog definition
    /// at all (`stored: None`), and have been rebuilt.
    CatalogMismatch {
        stored: Option<u32>,
        catalog: u32,
        discarded_history: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    Resumed { warning: Option<StartWarning> },
}

impl StartOutcome {
    pub fn warning(&self) -> Option<&StartWarning> {
        match self {
            StartOutcome::Started => None,
            StartOutcome::Resumed { warning } => warning.as_ref(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub completed_days: u32,
    pub total_days: u32,
    pub iterations_completed: u32,
    pub current_iteration: u32,
    pub percent_complete: u32,
}

/// Snapshot of one plan handed back to callers after reads and writes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProgressView {
    pub plan_id: PlanId,
    pub kind: PlanKind,
    pub state: PlanState,
    pub iteration: u32,
    pub current_day: u32,
    pub day_count: u32,
    pub completed_days: Vec<u32>,
    pub percent_complete: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DueDay {
    pub day_number: u32,
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
    pub overdue: bool,
}

pub(crate) fn percent(completed: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let value = u64::from(completed) * 100 / u64::from(total);
    u32::try_from(value).unwrap_or(100)
}
