#![forbid(unsafe_code)]

use crate::view::percent;
use crate::{
    Clock, DueDay, EngineConfig, EngineError, PlanState, PointerMode, ProgressView, StartOutcome,
    StartWarning, Statistics, SystemClock,
};
use chrono::{DateTime, NaiveDate, Utc};
use rp_core::ids::PlanId;
use rp_core::{
    HistoryRecord, Plan, PlanCatalog, PlanDay, PlanKind, ReadStatus, completed_days,
    count_completed_iterations, highest_completed_day, independent_pointer, is_iteration_complete,
    plan_days_from_catalog, prefix_pointer, resolve_current_day,
};
use rp_storage::{
    LegacyMigrator, MigrationReport, ProgressStore, SqliteStore, TransactionalStore,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Progress and scheduling rules over a catalog (read-only) and a store (sole writer).
///
/// Every mutating operation is one store transaction; reads run against one snapshot, so
/// callers never observe a half-applied update.
pub struct ProgressEngine<S, C, K = SystemClock> {
    store: S,
    catalog: C,
    clock: K,
    config: EngineConfig,
}

impl<C: PlanCatalog> ProgressEngine<SqliteStore, C, SystemClock> {
    /// Opens the store in the configured directory and imports any single-cycle rows.
    pub fn open(config: EngineConfig, catalog: C) -> Result<(Self, MigrationReport), EngineError> {
        let store = SqliteStore::open(config.resolved_storage_dir())?;
        let mut engine = Self::new(store, catalog, config);
        let report = engine.migrate_legacy()?;
        Ok((engine, report))
    }
}

impl<C: PlanCatalog, K: Clock> ProgressEngine<SqliteStore, C, K> {
    pub fn migrate_legacy(&mut self) -> Result<MigrationReport, EngineError> {
        let now = self.clock.now();
        let report = LegacyMigrator::new(&self.catalog).migrate(&mut self.store, now)?;
        if !report.migrated.is_empty() || !report.failed.is_empty() {
            info!(
                migrated = report.migrated.len(),
                failed = report.failed.len(),
                warnings = report.warnings.len(),
                "legacy reading plan migration finished"
            );
        }
        Ok(report)
    }
}

impl<S: TransactionalStore, C: PlanCatalog> ProgressEngine<S, C, SystemClock> {
    pub fn new(store: S, catalog: C, config: EngineConfig) -> Self {
        Self::with_clock(store, catalog, SystemClock, config)
    }
}

impl<S: TransactionalStore, C: PlanCatalog, K: Clock> ProgressEngine<S, C, K> {
    pub fn with_clock(store: S, catalog: C, clock: K, config: EngineConfig) -> Self {
        Self {
            store,
            catalog,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock_mut(&mut self) -> &mut K {
        &mut self.clock
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Creates the plan on first use, otherwise resumes it. A newer catalog revision, or a day
    /// table that was never built from the catalog, rebuilds the days and is reported as a
    /// warning, never as an error.
    pub fn start_or_resume(&mut self, plan_id: &PlanId) -> Result<StartOutcome, EngineError> {
        let catalog_version = self
            .catalog
            .version(plan_id)
            .ok_or_else(|| EngineError::NotFound(plan_id.clone()))?;
        let now = self.clock.now();
        let mode = self.config.pointer_mode;
        let catalog = &self.catalog;

        self.store.atomically(|store| -> Result<_, EngineError> {
            let Some(mut plan) = store.get_plan(plan_id)? else {
                let plan = plan_from_catalog(catalog, plan_id, now)?;
                store.upsert_plan(&plan)?;
                rebuild_days_in(store, catalog, plan_id, mode)?;
                info!(plan = %plan_id, day_count = plan.day_count, "reading plan started");
                return Ok(StartOutcome::Started);
            };

            if plan.start_date.is_none() {
                plan.start_date = Some(now);
                store.upsert_plan(&plan)?;
            }

            if plan.version.is_some_and(|stored| stored >= catalog_version) {
                debug!(plan = %plan_id, iteration = plan.iteration, "reading plan resumed");
                return Ok(StartOutcome::Resumed { warning: None });
            }

            let stored = plan.version;
            let discarded_history = rebuild_days_in(store, catalog, plan_id, mode)?;
            warn!(
                plan = %plan_id,
                stored = ?stored,
                catalog = catalog_version,
                discarded_history,
                "catalog definition changed; day table rebuilt"
            );
            Ok(StartOutcome::Resumed {
                warning: Some(StartWarning::CatalogMismatch {
                    stored,
                    catalog: catalog_version,
                    discarded_history,
                }),
            })
        })
    }

    /// Rebuilds the day table from the catalog. Returns the number of history rows dropped
    /// because their day no longer exists.
    pub fn rebuild_days(&mut self, plan_id: &PlanId) -> Result<usize, EngineError> {
        let mode = self.config.pointer_mode;
        let catalog = &self.catalog;
        self.store.atomically(|store| -> Result<_, EngineError> {
            rebuild_days_in(store, catalog, plan_id, mode)
        })
    }

    /// `None` when the plan was never started.
    pub fn current_day(&self, plan_id: &PlanId) -> Result<Option<u32>, EngineError> {
        let today = self.clock.today();
        self.store.snapshot(|store| -> Result<_, EngineError> {
            let Some(plan) = store.get_plan(plan_id)? else {
                return Ok(None);
            };
            let days = store.get_days(plan_id)?;
            Ok(Some(resolve_current_day(&plan, &days, today)))
        })
    }

    /// Records (or retracts) completion of `day` in the current iteration.
    ///
    /// A completed day keeps its original completion date when marked again.
    pub fn mark_complete(
        &mut self,
        plan_id: &PlanId,
        day: u32,
        completed: bool,
    ) -> Result<ProgressView, EngineError> {
        let status = if completed {
            ReadStatus::Completed
        } else {
            ReadStatus::Unread
        };
        self.record_day(plan_id, day, status)
    }

    /// Marks `day` as skipped. Has no effect on a completed day; retract it first.
    pub fn mark_skipped(&mut self, plan_id: &PlanId, day: u32) -> Result<ProgressView, EngineError> {
        self.record_day(plan_id, day, ReadStatus::Skipped)
    }

    fn record_day(
        &mut self,
        plan_id: &PlanId,
        day: u32,
        status: ReadStatus,
    ) -> Result<ProgressView, EngineError> {
        let now = self.clock.now();
        let today = self.clock.today();
        let mode = self.config.pointer_mode;

        self.store.atomically(|store| -> Result<_, EngineError> {
            let mut plan = store
                .get_plan(plan_id)?
                .ok_or_else(|| EngineError::NotFound(plan_id.clone()))?;
            if !plan.contains_day(day) {
                return Err(EngineError::OutOfRange {
                    day,
                    day_count: plan.day_count,
                });
            }

            let mut history = store.get_history(plan_id, plan.iteration)?;
            if let Some(record) = next_record(&plan, day, status, history.get(&day), now) {
                store.upsert_history(&record)?;
                debug!(
                    plan = %plan_id,
                    day,
                    iteration = plan.iteration,
                    status = record.status.as_str(),
                    "day status recorded"
                );
                history.insert(day, record);
            }

            let days = store.get_days(plan_id)?;
            let completed = status == ReadStatus::Completed;
            apply_progress(&mut plan, &days, &history, mode, Some((day, completed)));
            store.upsert_plan(&plan)?;
            Ok(build_view(&plan, &days, &history, today))
        })
    }

    /// Starts a new iteration. History of earlier iterations is left untouched.
    /// Returns the new iteration number, or `None` when the plan was never started.
    pub fn reset_iteration(&mut self, plan_id: &PlanId) -> Result<Option<u32>, EngineError> {
        let now = self.clock.now();
        self.store.atomically(|store| -> Result<_, EngineError> {
            let Some(mut plan) = store.get_plan(plan_id)? else {
                return Ok(None);
            };
            plan.iteration = plan.iteration.saturating_add(1);
            plan.start_date = Some(now);
            plan.current_day = 1;
            plan.day_complete = None;
            store.upsert_plan(&plan)?;
            info!(plan = %plan_id, iteration = plan.iteration, "reading plan reset");
            Ok(Some(plan.iteration))
        })
    }

    pub fn statistics(&self, plan_id: &PlanId) -> Result<Option<Statistics>, EngineError> {
        self.store.snapshot(|store| -> Result<_, EngineError> {
            let Some(plan) = store.get_plan(plan_id)? else {
                return Ok(None);
            };
            let history = store.get_history(plan_id, plan.iteration)?;
            let all = store.get_all_history(plan_id)?;
            let completed = u32::try_from(completed_days(plan.day_count, &history).len())
                .unwrap_or(u32::MAX);
            Ok(Some(Statistics {
                completed_days: completed,
                total_days: plan.day_count,
                iterations_completed: count_completed_iterations(
                    plan.day_count,
                    plan.iteration,
                    &all,
                ),
                current_iteration: plan.iteration,
                percent_complete: percent(completed, plan.day_count),
            }))
        })
    }

    pub fn view(&self, plan_id: &PlanId) -> Result<Option<ProgressView>, EngineError> {
        let today = self.clock.today();
        self.store.snapshot(|store| -> Result<_, EngineError> {
            let Some(plan) = store.get_plan(plan_id)? else {
                return Ok(None);
            };
            let days = store.get_days(plan_id)?;
            let history = store.get_history(plan_id, plan.iteration)?;
            Ok(Some(build_view(&plan, &days, &history, today)))
        })
    }

    pub fn state(&self, plan_id: &PlanId) -> Result<PlanState, EngineError> {
        Ok(self
            .view(plan_id)?
            .map_or(PlanState::NotStarted, |view| view.state))
    }

    /// Due date and completion of every day. Only date-anchored days carry a date and can be
    /// overdue.
    pub fn due_days(&self, plan_id: &PlanId) -> Result<Option<Vec<DueDay>>, EngineError> {
        let today = self.clock.today();
        self.store.snapshot(|store| -> Result<_, EngineError> {
            let Some(plan) = store.get_plan(plan_id)? else {
                return Ok(None);
            };
            let days = store.get_days(plan_id)?;
            let history = store.get_history(plan_id, plan.iteration)?;
            Ok(Some(
                days.iter()
                    .map(|day| due_day(day, &history, today))
                    .collect(),
            ))
        })
    }

    /// All history rows of every iteration as pretty-printed JSON.
    pub fn export_history(&self, plan_id: &PlanId) -> Result<Option<String>, EngineError> {
        self.store.snapshot(|store| -> Result<_, EngineError> {
            if store.get_plan(plan_id)?.is_none() {
                return Ok(None);
            }
            let records = store.get_all_history(plan_id)?;
            Ok(Some(serde_json::to_string_pretty(&records)?))
        })
    }

    /// Forgets the plan entirely, history included.
    pub fn stop_plan(&mut self, plan_id: &PlanId) -> Result<bool, EngineError> {
        let removed = self
            .store
            .atomically(|store| -> Result<_, EngineError> { Ok(store.delete_plan(plan_id)?) })?;
        if removed {
            info!(plan = %plan_id, "reading plan stopped");
        }
        Ok(removed)
    }

    pub fn started_plans(&self) -> Result<Vec<Plan>, EngineError> {
        Ok(self.store.list_plans()?)
    }
}

fn plan_from_catalog<C: PlanCatalog + ?Sized>(
    catalog: &C,
    plan_id: &PlanId,
    now: DateTime<Utc>,
) -> Result<Plan, EngineError> {
    let day_count = catalog
        .day_count(plan_id)
        .ok_or_else(|| EngineError::NotFound(plan_id.clone()))?;
    let versification = catalog.versification(plan_id).unwrap_or_default();
    let mut plan = Plan::new(plan_id.clone(), day_count, versification)?;
    let meta = catalog.metadata(plan_id).unwrap_or_default();
    plan.name = meta.name;
    plan.description = meta.description;
    plan.start_date = Some(now);
    Ok(plan)
}

fn rebuild_days_in<C: PlanCatalog + ?Sized>(
    store: &mut dyn ProgressStore,
    catalog: &C,
    plan_id: &PlanId,
    mode: PointerMode,
) -> Result<usize, EngineError> {
    let not_found = || EngineError::NotFound(plan_id.clone());
    let mut plan = store.get_plan(plan_id)?.ok_or_else(not_found)?;
    let day_count = catalog.day_count(plan_id).ok_or_else(not_found)?;
    let days = plan_days_from_catalog(catalog, plan_id).ok_or_else(not_found)?;

    store.replace_days(plan_id, &days)?;
    let discarded = store.delete_history_beyond(plan_id, day_count)?;

    plan.day_count = day_count;
    plan.version = catalog.version(plan_id).or(plan.version);
    if let Some(versification) = catalog.versification(plan_id) {
        plan.versification = versification;
    }
    if let Some(meta) = catalog.metadata(plan_id) {
        plan.name = meta.name;
        plan.description = meta.description;
    }

    let history = store.get_history(plan_id, plan.iteration)?;
    apply_progress(&mut plan, &days, &history, mode, None);
    store.upsert_plan(&plan)?;
    debug!(plan = %plan_id, day_count, version = ?plan.version, "day table rebuilt");
    Ok(discarded)
}

/// Record to write for a status change, or `None` when the stored state already says so.
fn next_record(
    plan: &Plan,
    day: u32,
    status: ReadStatus,
    existing: Option<&HistoryRecord>,
    now: DateTime<Utc>,
) -> Option<HistoryRecord> {
    let already_completed = existing.is_some_and(HistoryRecord::is_completed);
    match status {
        ReadStatus::Completed if already_completed => None,
        ReadStatus::Completed => Some(HistoryRecord::completed(
            plan.id.clone(),
            day,
            plan.iteration,
            now,
        )),
        ReadStatus::Skipped if already_completed => None,
        ReadStatus::Unread if existing.is_none_or(|record| record.status == ReadStatus::Unread) => {
            None
        }
        other => Some(HistoryRecord::pending(
            plan.id.clone(),
            day,
            plan.iteration,
            other,
        )),
    }
}

fn apply_progress(
    plan: &mut Plan,
    days: &[PlanDay],
    history: &BTreeMap<u32, HistoryRecord>,
    mode: PointerMode,
    change: Option<(u32, bool)>,
) {
    match PlanKind::of(days) {
        PlanKind::DateAnchored => {
            plan.day_complete = highest_completed_day(history);
            plan.current_day = plan.current_day.clamp(1, plan.day_count);
        }
        PlanKind::Ordinal => {
            plan.day_complete = None;
            plan.current_day = match (mode, change) {
                (PointerMode::ContiguousPrefix, _) => prefix_pointer(plan.day_count, history),
                (PointerMode::Independent, Some((day, completed))) => independent_pointer(
                    plan.current_day,
                    plan.day_count,
                    day,
                    completed,
                    history,
                ),
                (PointerMode::Independent, None) => plan.current_day.clamp(1, plan.day_count),
            };
        }
    }
}

fn build_view(
    plan: &Plan,
    days: &[PlanDay],
    history: &BTreeMap<u32, HistoryRecord>,
    today: NaiveDate,
) -> ProgressView {
    let completed = completed_days(plan.day_count, history);
    let state = if is_iteration_complete(plan.day_count, history) {
        PlanState::AllDaysComplete
    } else {
        PlanState::Active
    };
    let completed_count = u32::try_from(completed.len()).unwrap_or(u32::MAX);
    ProgressView {
        plan_id: plan.id.clone(),
        kind: PlanKind::of(days),
        state,
        iteration: plan.iteration,
        current_day: resolve_current_day(plan, days, today),
        day_count: plan.day_count,
        percent_complete: percent(completed_count, plan.day_count),
        completed_days: completed,
    }
}

fn due_day(day: &PlanDay, history: &BTreeMap<u32, HistoryRecord>, today: NaiveDate) -> DueDay {
    let due_date = day.date.and_then(|date| date.resolve_near(today));
    let completed = history
        .get(&day.day_number)
        .is_some_and(HistoryRecord::is_completed);
    DueDay {
        day_number: day.day_number,
        due_date,
        completed,
        overdue: !completed && due_date.is_some_and(|date| date < today),
    }
}
