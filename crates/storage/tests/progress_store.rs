#![forbid(unsafe_code)]

use chrono::{TimeZone, Utc};
use rp_core::ids::PlanId;
use rp_core::{HistoryRecord, Plan, PlanDay, ReadStatus, ScheduleDate};
use rp_storage::{DB_FILE_NAME, ProgressStore, SqliteStore, StoreError, TransactionalStore};
use rusqlite::{Connection, params};
use tempfile::TempDir;

fn plan_id(value: &str) -> PlanId {
    PlanId::try_new(value).expect("plan id")
}

fn plan(id: &str, day_count: u32) -> Plan {
    Plan::new(plan_id(id), day_count, "KJV").expect("plan")
}

fn ordinal_days(id: &str, day_count: u32) -> Vec<PlanDay> {
    (1..=day_count)
        .map(|day_number| PlanDay {
            plan_id: plan_id(id),
            day_number,
            date: None,
            assignment: format!("Gen.{day_number}"),
        })
        .collect()
}

fn completed(id: &str, day: u32, iteration: u32) -> HistoryRecord {
    let at = Utc.with_ymd_and_hms(2026, 5, 1, 6, 30, 0).unwrap();
    HistoryRecord::completed(plan_id(id), day, iteration, at)
}

#[test]
fn plan_round_trips_through_sqlite() {
    let mut store = SqliteStore::open_in_memory().expect("open store");
    let mut original = plan("y1ot1nt1", 365);
    original.name = Some("Whole Bible".to_string());
    original.start_date = Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    original.current_day = 12;
    original.iteration = 3;
    original.version = Some(2);
    store.upsert_plan(&original).expect("upsert plan");

    let loaded = store
        .get_plan(&plan_id("y1ot1nt1"))
        .expect("get plan")
        .expect("plan exists");
    assert_eq!(loaded, original);
    assert!(store.get_plan(&plan_id("missing")).expect("get").is_none());
}

#[test]
fn upsert_plan_rejects_pointer_outside_day_range() {
    let mut store = SqliteStore::open_in_memory().expect("open store");
    let mut invalid = plan("short", 3);
    invalid.current_day = 4;
    let err = store.upsert_plan(&invalid).expect_err("pointer out of range");
    assert!(matches!(err, StoreError::InvalidInput(_)), "got {err:?}");
}

#[test]
fn upsert_plan_keeps_children() {
    let mut store = SqliteStore::open_in_memory().expect("open store");
    let mut row = plan("psalms", 5);
    store.upsert_plan(&row).expect("insert plan");
    store
        .replace_days(&row.id, &ordinal_days("psalms", 5))
        .expect("replace days");
    store
        .upsert_history(&completed("psalms", 1, 1))
        .expect("history");

    row.current_day = 2;
    store.upsert_plan(&row).expect("replace plan");

    assert_eq!(store.get_days(&row.id).expect("days").len(), 5);
    assert_eq!(store.get_history(&row.id, 1).expect("history").len(), 1);
}

#[test]
fn days_come_back_ordered_with_dates() {
    let mut store = SqliteStore::open_in_memory().expect("open store");
    let row = plan("yearly", 3);
    store.upsert_plan(&row).expect("insert plan");

    let mut days: Vec<PlanDay> = ["Jan-1", "Jan-2", "2026-01-03"]
        .into_iter()
        .zip(1u32..)
        .map(|(date, day_number)| PlanDay {
            plan_id: row.id.clone(),
            day_number,
            date: Some(ScheduleDate::parse(date).expect("date")),
            assignment: String::new(),
        })
        .collect();
    days.reverse();
    store.replace_days(&row.id, &days).expect("replace days");

    let loaded = store.get_days(&row.id).expect("days");
    let numbers: Vec<u32> = loaded.iter().map(|day| day.day_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(
        loaded[0].date,
        Some(ScheduleDate::Yearly { month: 1, day: 1 })
    );
    assert_eq!(
        loaded[2].date.map(|date| date.to_string()).as_deref(),
        Some("2026-01-03")
    );
}

#[test]
fn replace_days_rolls_back_on_failure() {
    let mut store = SqliteStore::open_in_memory().expect("open store");
    let row = plan("gospels", 3);
    store.upsert_plan(&row).expect("insert plan");
    store
        .replace_days(&row.id, &ordinal_days("gospels", 3))
        .expect("initial days");

    let mut broken = ordinal_days("gospels", 4);
    broken[3].day_number = 2;
    let err = store
        .replace_days(&row.id, &broken)
        .expect_err("duplicate day number must fail");
    assert!(matches!(err, StoreError::Sql(_)), "got {err:?}");

    let days = store.get_days(&row.id).expect("days");
    assert_eq!(days, ordinal_days("gospels", 3));
}

#[test]
fn replace_days_requires_matching_plan() {
    let mut store = SqliteStore::open_in_memory().expect("open store");
    store.upsert_plan(&plan("a", 2)).expect("plan a");
    let err = store
        .replace_days(&plan_id("a"), &ordinal_days("b", 2))
        .expect_err("foreign days");
    assert!(matches!(err, StoreError::InvalidInput(_)));

    let err = store
        .replace_days(&plan_id("never-started"), &ordinal_days("never-started", 2))
        .expect_err("unknown plan");
    assert!(matches!(err, StoreError::InvalidInput(_)));
}

#[test]
fn history_is_keyed_by_iteration() {
    let mut store = SqliteStore::open_in_memory().expect("open store");
    let row = plan("acts", 4);
    store.upsert_plan(&row).expect("plan");
    for day in 1..=4 {
        store
            .upsert_history(&completed("acts", day, 1))
            .expect("iteration 1");
    }
    store
        .upsert_history(&completed("acts", 1, 2))
        .expect("iteration 2");
    store
        .upsert_history(&HistoryRecord::pending(
            row.id.clone(),
            2,
            2,
            ReadStatus::Skipped,
        ))
        .expect("skip");

    let second = store.get_history(&row.id, 2).expect("history");
    assert_eq!(second.len(), 2);
    assert_eq!(second[&2].status, ReadStatus::Skipped);
    assert_eq!(second[&2].completed_at, None);

    let all = store.get_all_history(&row.id).expect("all history");
    let keys: Vec<(u32, u32)> = all
        .iter()
        .map(|record| (record.iteration, record.day_number))
        .collect();
    assert_eq!(keys, vec![(1, 1), (1, 2), (1, 3), (1, 4), (2, 1), (2, 2)]);
}

#[test]
fn clearing_completion_keeps_the_row() {
    let mut store = SqliteStore::open_in_memory().expect("open store");
    let row = plan("romans", 2);
    store.upsert_plan(&row).expect("plan");
    store
        .upsert_history(&completed("romans", 1, 1))
        .expect("complete");
    store
        .upsert_history(&HistoryRecord::pending(
            row.id.clone(),
            1,
            1,
            ReadStatus::Unread,
        ))
        .expect("clear");

    let history = store.get_history(&row.id, 1).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[&1].completed_at, None);
    assert!(!history[&1].is_completed());
}

#[test]
fn deleting_a_plan_cascades() {
    let mut store = SqliteStore::open_in_memory().expect("open store");
    for id in ["keep", "drop"] {
        store.upsert_plan(&plan(id, 2)).expect("plan");
        store
            .replace_days(&plan_id(id), &ordinal_days(id, 2))
            .expect("days");
        store.upsert_history(&completed(id, 1, 1)).expect("history");
    }

    assert!(store.delete_plan(&plan_id("drop")).expect("delete"));
    assert!(!store.delete_plan(&plan_id("drop")).expect("delete again"));

    assert!(store.get_days(&plan_id("drop")).expect("days").is_empty());
    assert!(
        store
            .get_all_history(&plan_id("drop"))
            .expect("history")
            .is_empty()
    );
    assert_eq!(store.get_days(&plan_id("keep")).expect("days").len(), 2);
    assert_eq!(store.list_plans().expect("list").len(), 1);
}

#[test]
fn delete_history_beyond_only_touches_trailing_days() {
    let mut store = SqliteStore::open_in_memory().expect("open store");
    store.upsert_plan(&plan("shrinking", 5)).expect("plan");
    for day in 1..=5 {
        store
            .upsert_history(&completed("shrinking", day, 1))
            .expect("history");
    }
    let removed = store
        .delete_history_beyond(&plan_id("shrinking"), 3)
        .expect("delete");
    assert_eq!(removed, 2);
    let left = store
        .get_history(&plan_id("shrinking"), 1)
        .expect("history");
    assert_eq!(left.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[test]
fn failed_atomic_block_leaves_no_trace() {
    let mut store = SqliteStore::open_in_memory().expect("open store");
    let result: Result<(), StoreError> = store.atomically(|tx| {
        tx.upsert_plan(&plan("half", 2))?;
        tx.upsert_history(&completed("half", 1, 1))?;
        Err(StoreError::InvalidInput("abort"))
    });
    assert!(result.is_err());
    assert!(store.get_plan(&plan_id("half")).expect("get").is_none());
}

#[test]
fn uncommitted_transaction_is_not_persisted_after_reopen() {
    let dir = TempDir::new().expect("temp dir");
    {
        let _store = SqliteStore::open(dir.path()).expect("open store");
    }

    {
        let mut conn = Connection::open(dir.path().join(DB_FILE_NAME)).expect("open db");
        let tx = conn.transaction().expect("begin tx");
        tx.execute(
            "INSERT INTO plans (id, day_count, versification) VALUES (?1, ?2, ?3)",
            params!["crashed", 3, "KJV"],
        )
        .expect("insert plan");
        // Dropped without commit.
    }

    let store = SqliteStore::open(dir.path()).expect("reopen store");
    assert!(store.get_plan(&plan_id("crashed")).expect("get").is_none());
}

#[test]
fn open_rejects_unknown_tables() {
    let dir = TempDir::new().expect("temp dir");
    let conn = Connection::open(dir.path().join(DB_FILE_NAME)).expect("open db");
    conn.execute_batch("CREATE TABLE bookmarks(id INTEGER PRIMARY KEY);")
        .expect("seed foreign table");
    drop(conn);

    let err = SqliteStore::open(dir.path()).expect_err("foreign schema");
    assert!(matches!(err, StoreError::ResetRequired(_)), "got {err:?}");
}

#[test]
fn open_accepts_legacy_tables_next_to_a_fresh_schema() {
    let dir = TempDir::new().expect("temp dir");
    let conn = Connection::open(dir.path().join(DB_FILE_NAME)).expect("open db");
    conn.execute_batch(
        "CREATE TABLE readingplan(_id INTEGER PRIMARY KEY AUTOINCREMENT, plan_code TEXT NOT NULL, \
                                  plan_start_date INTEGER NOT NULL, plan_current_day INTEGER NOT NULL DEFAULT 1);",
    )
    .expect("seed legacy schema");
    drop(conn);

    let store = SqliteStore::open(dir.path()).expect("open store");
    assert!(store.has_legacy_tables().expect("legacy check"));
    assert_eq!(store.schema_version().expect("schema version"), 3);
}

#[test]
fn open_rejects_schema_version_mismatch() {
    let dir = TempDir::new().expect("temp dir");
    {
        let _store = SqliteStore::open(dir.path()).expect("open store");
    }
    let conn = Connection::open(dir.path().join(DB_FILE_NAME)).expect("open db");
    conn.execute("UPDATE store_state SET schema_version=99", [])
        .expect("bump version");
    drop(conn);

    let err = SqliteStore::open(dir.path()).expect_err("version mismatch");
    assert!(matches!(err, StoreError::ResetRequired(_)), "got {err:?}");
}
