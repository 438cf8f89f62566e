#![forbid(unsafe_code)]

use rp_core::DomainError;
use rp_core::ids::PlanId;
use rp_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The plan was never started, or the catalog does not know it.
    #[error("plan not found: {0}")]
    NotFound(PlanId),

    #[error("day {day} is outside 1..={day_count}")]
    OutOfRange { day: u32, day_count: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
