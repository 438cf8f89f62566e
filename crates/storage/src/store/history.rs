#![forbid(unsafe_code)]

use super::{StoreError, from_ms, to_ms};
use rp_core::ids::PlanId;
use rp_core::{HistoryRecord, ReadStatus};
use rusqlite::{Connection, Row, params};
use std::collections::BTreeMap;

const TABLE: &str = "plan_history";

fn read_record(plan_id: &PlanId, row: &Row<'_>) -> Result<HistoryRecord, StoreError> {
    let completed_at = row
        .get::<_, Option<i64>>(2)?
        .map(|value| from_ms(TABLE, value))
        .transpose()?;
    let status = ReadStatus::parse(&row.get::<_, String>(3)?)
        .map_err(|err| StoreError::corrupt(TABLE, err))?;
    Ok(HistoryRecord {
        plan_id: plan_id.clone(),
        day_number: row.get(0)?,
        iteration: row.get(1)?,
        completed_at,
        status,
    })
}

pub(super) fn get_history(
    conn: &Connection,
    plan_id: &PlanId,
    iteration: u32,
) -> Result<BTreeMap<u32, HistoryRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT day_number, iteration, completed_at_ms, status \
         FROM plan_history WHERE plan_id=?1 AND iteration=?2",
    )?;
    let mut rows = stmt.query(params![plan_id.as_str(), iteration])?;
    let mut out = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let record = read_record(plan_id, row)?;
        out.insert(record.day_number, record);
    }
    Ok(out)
}

pub(super) fn get_all_history(
    conn: &Connection,
    plan_id: &PlanId,
) -> Result<Vec<HistoryRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT day_number, iteration, completed_at_ms, status \
         FROM plan_history WHERE plan_id=?1 \
         ORDER BY iteration ASC, day_number ASC",
    )?;
    let mut rows = stmt.query(params![plan_id.as_str()])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(read_record(plan_id, row)?);
    }
    Ok(out)
}

pub(super) fn upsert_history(conn: &Connection, record: &HistoryRecord) -> Result<(), StoreError> {
    if record.day_number == 0 || record.iteration == 0 {
        return Err(StoreError::InvalidInput(
            "history record requires day_number >= 1 and iteration >= 1",
        ));
    }

    conn.execute(
        "INSERT INTO plan_history(plan_id, day_number, iteration, completed_at_ms, status) \
         VALUES (?1, ?2, ?3, ?4, ?5) \
         ON CONFLICT(plan_id, day_number, iteration) DO UPDATE SET \
           completed_at_ms=excluded.completed_at_ms, \
           status=excluded.status",
        params![
            record.plan_id.as_str(),
            record.day_number,
            record.iteration,
            record.completed_at.map(to_ms),
            record.status.as_str(),
        ],
    )?;
    Ok(())
}

pub(super) fn delete_history_beyond(
    conn: &Connection,
    plan_id: &PlanId,
    max_day: u32,
) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "DELETE FROM plan_history WHERE plan_id=?1 AND day_number > ?2",
        params![plan_id.as_str(), max_day],
    )?)
}
