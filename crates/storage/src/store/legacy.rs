#![forbid(unsafe_code)]

//! One-time import of the single-cycle schema (`readingplan` + `readingplan_status`).
//!
//! The old layout kept one current-day counter per plan and one free-text status per
//! (plan, day), with no notion of iterations and no per-day timestamps. Each legacy plan is
//! moved in its own transaction; the legacy tables are dropped once they are empty.

use super::{SqliteStore, StoreError, days, from_ms, history, plans};
use chrono::{DateTime, Utc};
use rp_core::ids::PlanId;
use rp_core::{
    HistoryRecord, Plan, PlanCatalog, PlanDay, PlanKind, ReadStatus, highest_completed_day,
    plan_days_from_catalog, prefix_pointer,
};
use rusqlite::{Connection, params};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

pub(super) const LEGACY_PLAN_TABLE: &str = "readingplan";
pub(super) const LEGACY_STATUS_TABLE: &str = "readingplan_status";
pub(super) const LEGACY_TABLES: [&str; 2] = [LEGACY_PLAN_TABLE, LEGACY_STATUS_TABLE];

/// Upper bound for the day table of a plan rebuilt from legacy rows alone (ten years of
/// daily readings).
const MAX_INFERRED_DAYS: i64 = 3_660;

const LEGACY_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS readingplan (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      plan_code TEXT NOT NULL,
      plan_start_date INTEGER NOT NULL,
      plan_current_day INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE IF NOT EXISTS readingplan_status (
      _id INTEGER PRIMARY KEY AUTOINCREMENT,
      plan_code TEXT NOT NULL,
      plan_day INTEGER NOT NULL,
      reading_status TEXT NOT NULL
    );
"#;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MigrationWarning {
    /// Status text with no mapping; the day was imported as unread.
    UnrecognizedStatus {
        plan_code: String,
        day: u32,
        status: String,
    },
    /// Status row for a day the plan does not have; the row was dropped.
    DayOutOfRange {
        plan_code: String,
        day: i64,
        day_count: u32,
    },
    /// Status rows without a legacy plan row; they were dropped.
    OrphanStatus { plan_code: String, rows: usize },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: Vec<String>,
    /// (plan code, error) for plans left in the legacy tables for a later retry.
    pub failed: Vec<(String, String)>,
    pub warnings: Vec<MigrationWarning>,
    /// Set once the legacy tables were dropped.
    pub legacy_retired: bool,
}

impl MigrationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.warnings.is_empty()
    }
}

#[derive(Debug)]
struct LegacyPlanRow {
    code: String,
    start_date_ms: Option<i64>,
    current_day: i64,
}

pub struct LegacyMigrator<'a, C: ?Sized> {
    catalog: &'a C,
}

impl<'a, C: PlanCatalog + ?Sized> LegacyMigrator<'a, C> {
    pub fn new(catalog: &'a C) -> Self {
        Self { catalog }
    }

    /// Moves every legacy plan into the iteration-aware tables. `now` stands in for a
    /// missing legacy start date.
    pub fn migrate(
        &self,
        store: &mut SqliteStore,
        now: DateTime<Utc>,
    ) -> Result<MigrationReport, StoreError> {
        let mut report = MigrationReport::default();
        if !legacy_tables_present(&store.conn)? {
            return Ok(report);
        }
        store.conn.execute_batch(LEGACY_SCHEMA)?;

        for legacy in read_legacy_plans(&store.conn)? {
            let mut warnings = Vec::new();
            match self.migrate_plan(store, &legacy, now, &mut warnings) {
                Ok(()) => {
                    info!(plan = %legacy.code, "migrated legacy reading plan");
                    report.migrated.push(legacy.code);
                }
                Err(err) => {
                    warn!(
                        plan = %legacy.code,
                        error = %err,
                        "legacy reading plan migration failed; rows kept for retry"
                    );
                    report.failed.push((legacy.code, err.to_string()));
                }
            }
            report.warnings.extend(warnings);
        }

        report.warnings.extend(drop_orphan_statuses(store)?);

        if legacy_row_count(&store.conn)? == 0 {
            let tx = store.begin_write()?;
            tx.conn().execute_batch(
                "DROP TABLE IF EXISTS readingplan_status;\n\
                 DROP TABLE IF EXISTS readingplan;",
            )?;
            tx.commit()?;
            report.legacy_retired = true;
            info!("legacy reading plan tables retired");
        }

        Ok(report)
    }

    fn migrate_plan(
        &self,
        store: &mut SqliteStore,
        legacy: &LegacyPlanRow,
        now: DateTime<Utc>,
        warnings: &mut Vec<MigrationWarning>,
    ) -> Result<(), StoreError> {
        let plan_id = PlanId::try_new(legacy.code.clone())
            .map_err(|_| StoreError::InvalidInput("legacy plan_code is not a valid plan id"))?;
        let started_at = legacy
            .start_date_ms
            .map(|value| from_ms(LEGACY_PLAN_TABLE, value))
            .transpose()?
            .unwrap_or(now);
        let counter = legacy.current_day.max(1);

        let tx = store.begin_write()?;
        let conn = tx.conn();
        let statuses = read_legacy_statuses(conn, &legacy.code)?;

        let existing = plans::get_plan(conn, &plan_id)?;
        let fresh = existing.is_none();
        let mut plan = match existing {
            Some(plan) => {
                debug!(plan = %plan_id, "plan already present; merging legacy rows");
                plan
            }
            None => self.create_plan(conn, &plan_id, counter, &statuses, started_at)?,
        };

        let mut records = history::get_history(conn, &plan_id, plan.iteration)?;

        // Everything before the legacy counter was read; the old schema kept no per-day
        // timestamps, so the plan start date is the best available completion date.
        let completed_through = u32::try_from(counter - 1)
            .unwrap_or(u32::MAX)
            .min(plan.day_count);
        for day in 1..=completed_through {
            if records.contains_key(&day) {
                continue;
            }
            let record = HistoryRecord::completed(plan_id.clone(), day, plan.iteration, started_at);
            history::upsert_history(conn, &record)?;
            records.insert(day, record);
        }

        for (raw_day, text) in statuses {
            let day = match u32::try_from(raw_day) {
                Ok(day) if plan.contains_day(day) => day,
                _ => {
                    warn!(plan = %plan_id, day = raw_day, "legacy status for a day outside the plan dropped");
                    warnings.push(MigrationWarning::DayOutOfRange {
                        plan_code: legacy.code.clone(),
                        day: raw_day,
                        day_count: plan.day_count,
                    });
                    continue;
                }
            };
            let status = match ReadStatus::from_legacy(&text) {
                Some(status) => status,
                None => {
                    warn!(plan = %plan_id, day, status = %text, "unrecognized legacy reading status; importing as unread");
                    warnings.push(MigrationWarning::UnrecognizedStatus {
                        plan_code: legacy.code.clone(),
                        day,
                        status: text.clone(),
                    });
                    ReadStatus::Unread
                }
            };
            if records.contains_key(&day) {
                continue;
            }
            let record = match status {
                ReadStatus::Completed => {
                    HistoryRecord::completed(plan_id.clone(), day, plan.iteration, started_at)
                }
                other => HistoryRecord::pending(plan_id.clone(), day, plan.iteration, other),
            };
            history::upsert_history(conn, &record)?;
            records.insert(day, record);
        }

        let plan_days = days::get_days(conn, &plan_id)?;
        match PlanKind::of(&plan_days) {
            PlanKind::DateAnchored => plan.day_complete = highest_completed_day(&records),
            PlanKind::Ordinal if fresh => plan.current_day = prefix_pointer(plan.day_count, &records),
            PlanKind::Ordinal => {}
        }
        plans::upsert_plan(conn, &plan)?;

        conn.execute(
            "DELETE FROM readingplan_status WHERE plan_code=?1",
            params![legacy.code],
        )?;
        conn.execute(
            "DELETE FROM readingplan WHERE plan_code=?1",
            params![legacy.code],
        )?;

        tx.commit()
    }

    fn create_plan(
        &self,
        conn: &Connection,
        plan_id: &PlanId,
        counter: i64,
        statuses: &[(i64, String)],
        started_at: DateTime<Utc>,
    ) -> Result<Plan, StoreError> {
        let (mut plan, plan_days) = match plan_days_from_catalog(self.catalog, plan_id) {
            Some(plan_days) => {
                let day_count = u32::try_from(plan_days.len())
                    .map_err(|_| StoreError::InvalidInput("catalog day count overflow"))?;
                let versification = self.catalog.versification(plan_id).unwrap_or_default();
                let mut plan = Plan::new(plan_id.clone(), day_count, versification)
                    .map_err(|_| StoreError::InvalidInput("catalog plan has no days"))?;
                let meta = self.catalog.metadata(plan_id).unwrap_or_default();
                plan.name = meta.name;
                plan.description = meta.description;
                plan.version = self.catalog.version(plan_id);
                (plan, plan_days)
            }
            None => {
                // Unknown to the catalog: keep what the legacy rows imply. No version makes the
                // first start rebuild the day table once the definition shows up.
                warn!(plan = %plan_id, "legacy plan missing from catalog; importing as ordinal");
                if counter - 1 > MAX_INFERRED_DAYS {
                    warn!(plan = %plan_id, counter, "legacy counter exceeds the inferred day cap");
                }
                let day_count = inferred_day_count(counter, statuses);
                let plan = Plan::new(plan_id.clone(), day_count, String::new())
                    .map_err(|_| StoreError::InvalidInput("legacy plan has no days"))?;
                let plan_days = (1..=day_count)
                    .map(|day_number| PlanDay {
                        plan_id: plan_id.clone(),
                        day_number,
                        date: None,
                        assignment: String::new(),
                    })
                    .collect::<Vec<_>>();
                (plan, plan_days)
            }
        };

        plan.start_date = Some(started_at);
        plans::upsert_plan(conn, &plan)?;
        days::replace_days(conn, plan_id, &plan_days)?;
        Ok(plan)
    }
}

/// Day count of a plan the catalog does not know: the days before the legacy counter plus the
/// status rows that extend that run without a gap. Later status rows are reported as out of
/// range instead of widening the plan.
fn inferred_day_count(counter: i64, statuses: &[(i64, String)]) -> u32 {
    let status_days: BTreeSet<i64> = statuses.iter().map(|(day, _)| *day).collect();
    let mut last = (counter - 1).clamp(0, MAX_INFERRED_DAYS);
    while last < MAX_INFERRED_DAYS && status_days.contains(&(last + 1)) {
        last += 1;
    }
    u32::try_from(last.max(1)).unwrap_or(1)
}

pub(super) fn legacy_tables_present(conn: &Connection) -> Result<bool, StoreError> {
    let count = conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name IN (?1, ?2)",
        params![LEGACY_PLAN_TABLE, LEGACY_STATUS_TABLE],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count > 0)
}

fn read_legacy_plans(conn: &Connection) -> Result<Vec<LegacyPlanRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT plan_code, plan_start_date, plan_current_day \
         FROM readingplan ORDER BY plan_code ASC",
    )?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(LegacyPlanRow {
            code: row.get(0)?,
            start_date_ms: row.get(1)?,
            current_day: row.get::<_, Option<i64>>(2)?.unwrap_or(1),
        });
    }
    Ok(out)
}

fn read_legacy_statuses(conn: &Connection, code: &str) -> Result<Vec<(i64, String)>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT plan_day, reading_status FROM readingplan_status \
         WHERE plan_code=?1 ORDER BY plan_day ASC",
    )?;
    let mut rows = stmt.query(params![code])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push((
            row.get::<_, i64>(0)?,
            row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        ));
    }
    Ok(out)
}

fn drop_orphan_statuses(store: &mut SqliteStore) -> Result<Vec<MigrationWarning>, StoreError> {
    let tx = store.begin_write()?;
    let mut orphans = BTreeMap::new();
    {
        let mut stmt = tx.conn().prepare(
            "SELECT plan_code, COUNT(1) FROM readingplan_status \
             WHERE plan_code NOT IN (SELECT plan_code FROM readingplan) \
             GROUP BY plan_code",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            orphans.insert(row.get::<_, String>(0)?, row.get::<_, i64>(1)?);
        }
    }

    let mut warnings = Vec::new();
    for (plan_code, rows) in orphans {
        warn!(plan = %plan_code, rows, "legacy status rows without a plan dropped");
        tx.conn().execute(
            "DELETE FROM readingplan_status WHERE plan_code=?1",
            params![plan_code],
        )?;
        warnings.push(MigrationWarning::OrphanStatus {
            plan_code,
            rows: usize::try_from(rows).unwrap_or(0),
        });
    }
    tx.commit()?;
    Ok(warnings)
}

fn legacy_row_count(conn: &Connection) -> Result<i64, StoreError> {
    Ok(conn.query_row(
        "SELECT (SELECT COUNT(1) FROM readingplan) + (SELECT COUNT(1) FROM readingplan_status)",
        [],
        |row| row.get::<_, i64>(0),
    )?)
}
