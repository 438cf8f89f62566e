#![forbid(unsafe_code)]

use super::StoreError;
use super::plans::plan_exists;
use rp_core::ids::PlanId;
use rp_core::{PlanDay, ScheduleDate};
use rusqlite::{Connection, params};

const TABLE: &str = "plan_days";

pub(super) fn get_days(conn: &Connection, plan_id: &PlanId) -> Result<Vec<PlanDay>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT day_number, reading_date, assignment \
         FROM plan_days WHERE plan_id=?1 \
         ORDER BY day_number ASC",
    )?;
    let mut rows = stmt.query(params![plan_id.as_str()])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let reading_date = row.get::<_, Option<String>>(1)?;
        let date = reading_date
            .as_deref()
            .map(ScheduleDate::parse)
            .transpose()
            .map_err(|err| StoreError::corrupt(TABLE, err))?;
        out.push(PlanDay {
            plan_id: plan_id.clone(),
            day_number: row.get(0)?,
            date,
            assignment: row.get(2)?,
        });
    }
    Ok(out)
}

/// Deletes every day of the plan and inserts `days`. Callers provide the transaction.
pub(super) fn replace_days(
    conn: &Connection,
    plan_id: &PlanId,
    days: &[PlanDay],
) -> Result<(), StoreError> {
    if days.iter().any(|day| &day.plan_id != plan_id) {
        return Err(StoreError::InvalidInput(
            "replace_days received a day of another plan",
        ));
    }
    if days.iter().any(|day| day.day_number == 0) {
        return Err(StoreError::InvalidInput("day_number must be >= 1"));
    }
    if !plan_exists(conn, plan_id)? {
        return Err(StoreError::InvalidInput(
            "replace_days requires an existing plan",
        ));
    }

    conn.execute(
        "DELETE FROM plan_days WHERE plan_id=?1",
        params![plan_id.as_str()],
    )?;

    let mut insert = conn.prepare(
        "INSERT INTO plan_days(plan_id, day_number, reading_date, assignment) \
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for day in days {
        insert.execute(params![
            plan_id.as_str(),
            day.day_number,
            day.date.map(|date| date.to_string()),
            day.assignment,
        ])?;
    }
    Ok(())
}
