#![forbid(unsafe_code)]

mod clock;
mod config;
mod engine;
mod error;
mod view;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{EngineConfig, PointerMode, POINTER_MODE_ENV, STORAGE_DIR_ENV};
pub use engine::ProgressEngine;
pub use error::EngineError;
pub use view::{DueDay, PlanState, ProgressView, StartOutcome, StartWarning, Statistics};

pub use rp_core::ids::PlanId;
pub use rp_storage::{MigrationReport, MigrationWarning, SqliteStore, StoreError};
