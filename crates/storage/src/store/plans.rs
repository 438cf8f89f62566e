#![forbid(unsafe_code)]

use super::{StoreError, from_ms, to_ms};
use rp_core::Plan;
use rp_core::ids::PlanId;
use rusqlite::{Connection, OptionalExtension, Row, params};

const TABLE: &str = "plans";

struct PlanRow {
    id: String,
    name: Option<String>,
    description: Option<String>,
    day_count: u32,
    versification: String,
    start_date_ms: Option<i64>,
    day_complete: Option<u32>,
    current_day: u32,
    iteration: u32,
    version: Option<u32>,
}

impl PlanRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            day_count: row.get(3)?,
            versification: row.get(4)?,
            start_date_ms: row.get(5)?,
            day_complete: row.get(6)?,
            current_day: row.get(7)?,
            iteration: row.get(8)?,
            version: row.get(9)?,
        })
    }

    fn into_plan(self) -> Result<Plan, StoreError> {
        let id = PlanId::try_new(self.id).map_err(|err| StoreError::corrupt(TABLE, err))?;
        let start_date = self
            .start_date_ms
            .map(|value| from_ms(TABLE, value))
            .transpose()?;
        let plan = Plan {
            id,
            name: self.name,
            description: self.description,
            day_count: self.day_count,
            versification: self.versification,
            start_date,
            day_complete: self.day_complete,
            current_day: self.current_day,
            iteration: self.iteration,
            version: self.version,
        };
        plan.validate()
            .map_err(|err| StoreError::corrupt(TABLE, err))?;
        Ok(plan)
    }
}

pub(super) fn get_plan(conn: &Connection, id: &PlanId) -> Result<Option<Plan>, StoreError> {
    conn.query_row(
        "SELECT id, name, description, day_count, versification, start_date_ms, day_complete, \
                current_day, iteration, version \
         FROM plans WHERE id=?1",
        params![id.as_str()],
        PlanRow::read,
    )
    .optional()?
    .map(PlanRow::into_plan)
    .transpose()
}

pub(super) fn list_plans(conn: &Connection) -> Result<Vec<Plan>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, day_count, versification, start_date_ms, day_complete, \
                current_day, iteration, version \
         FROM plans ORDER BY id ASC",
    )?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(PlanRow::read(row)?.into_plan()?);
    }
    Ok(out)
}

pub(super) fn plan_exists(conn: &Connection, id: &PlanId) -> Result<bool, StoreError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM plans WHERE id=?1",
            params![id.as_str()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

/// Insert or full replace. Uses `ON CONFLICT DO UPDATE` rather than `INSERT OR REPLACE` so the
/// existing row is never deleted, which would cascade into its days and history.
pub(super) fn upsert_plan(conn: &Connection, plan: &Plan) -> Result<(), StoreError> {
    plan.validate()
        .map_err(|_| StoreError::InvalidInput("plan requires day_count > 0 and iteration >= 1"))?;
    if !plan.contains_day(plan.current_day) {
        return Err(StoreError::InvalidInput(
            "plan current_day must be within 1..=day_count",
        ));
    }

    conn.execute(
        "INSERT INTO plans(id, name, description, day_count, versification, start_date_ms, \
                           day_complete, current_day, iteration, version) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
         ON CONFLICT(id) DO UPDATE SET \
           name=excluded.name, \
           description=excluded.description, \
           day_count=excluded.day_count, \
           versification=excluded.versification, \
           start_date_ms=excluded.start_date_ms, \
           day_complete=excluded.day_complete, \
           current_day=excluded.current_day, \
           iteration=excluded.iteration, \
           version=excluded.version",
        params![
            plan.id.as_str(),
            plan.name,
            plan.description,
            plan.day_count,
            plan.versification,
            plan.start_date.map(to_ms),
            plan.day_complete,
            plan.current_day,
            plan.iteration,
            plan.version,
        ],
    )?;
    Ok(())
}

pub(super) fn delete_plan(conn: &Connection, id: &PlanId) -> Result<bool, StoreError> {
    let deleted = conn.execute("DELETE FROM plans WHERE id=?1", params![id.as_str()])?;
    Ok(deleted > 0)
}
