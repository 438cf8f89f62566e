#![forbid(unsafe_code)]

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("plan id must not be empty")]
    EmptyPlanId,

    #[error("plan id exceeds {max} characters")]
    PlanIdTooLong { max: usize },

    #[error("plan id contains a control character at index {index}")]
    InvalidPlanIdChar { index: usize },

    #[error("day count must be greater than zero")]
    ZeroDayCount,

    #[error("iteration must be at least 1")]
    ZeroIteration,

    #[error("invalid schedule date: {0}")]
    InvalidScheduleDate(String),

    #[error("unknown read status: {0}")]
    UnknownStatus(String),
}
