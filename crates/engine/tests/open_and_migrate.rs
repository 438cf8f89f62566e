#![forbid(unsafe_code)]

use chrono::{TimeZone, Utc};
use rp_core::{CatalogPlan, StaticCatalog};
use rp_engine::{
    EngineConfig, PlanId, PlanState, ProgressEngine, StartOutcome, StartWarning,
};
use rp_storage::{DB_FILE_NAME, ProgressStore};
use rusqlite::{Connection, params};
use tempfile::TempDir;

fn plan_id(value: &str) -> PlanId {
    PlanId::try_new(value).expect("plan id")
}

fn catalog() -> StaticCatalog {
    StaticCatalog::new().with_plan(CatalogPlan::ordinal(plan_id("nt90"), 90).with_version(4))
}

fn config(dir: &TempDir) -> EngineConfig {
    EngineConfig {
        storage_dir: Some(dir.path().join("state")),
        ..EngineConfig::default()
    }
}

fn seed_legacy(dir: &TempDir, code: &str, current_day: i64, statuses: &[(i64, &str)]) {
    let state_dir = dir.path().join("state");
    std::fs::create_dir_all(&state_dir).expect("state dir");
    let conn = Connection::open(state_dir.join(DB_FILE_NAME)).expect("open legacy db");
    conn.execute_batch(
        "CREATE TABLE readingplan(_id INTEGER PRIMARY KEY AUTOINCREMENT, plan_code TEXT NOT NULL, \
                                  plan_start_date INTEGER NOT NULL, plan_current_day INTEGER NOT NULL DEFAULT 1);\n\
         CREATE TABLE readingplan_status(_id INTEGER PRIMARY KEY AUTOINCREMENT, plan_code TEXT NOT NULL, \
                                         plan_day INTEGER NOT NULL, reading_status TEXT NOT NULL);",
    )
    .expect("legacy schema");
    let started = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap();
    conn.execute(
        "INSERT INTO readingplan(plan_code, plan_start_date, plan_current_day) VALUES (?1, ?2, ?3)",
        params![code, started.timestamp_millis(), current_day],
    )
    .expect("legacy plan");
    for (day, status) in statuses {
        conn.execute(
            "INSERT INTO readingplan_status(plan_code, plan_day, reading_status) VALUES (?1, ?2, ?3)",
            params![code, day, status],
        )
        .expect("legacy status");
    }
}

#[test]
fn progress_survives_reopening() {
    let dir = TempDir::new().expect("temp dir");
    let id = plan_id("nt90");
    {
        let (mut engine, report) = ProgressEngine::open(config(&dir), catalog()).expect("open");
        assert!(report.is_clean());
        assert!(!report.legacy_retired);
        engine.start_or_resume(&id).expect("start");
        for day in 1..=3 {
            engine.mark_complete(&id, day, true).expect("complete");
        }
    }

    assert!(dir.path().join("state").join(DB_FILE_NAME).exists());

    let (engine, _) = ProgressEngine::open(config(&dir), catalog()).expect("reopen");
    assert_eq!(engine.current_day(&id).expect("current day"), Some(4));
    let view = engine.view(&id).expect("view").expect("started");
    assert_eq!(view.completed_days, vec![1, 2, 3]);
    assert_eq!(view.state, PlanState::Active);
}

#[test]
fn open_imports_single_cycle_progress() {
    let dir = TempDir::new().expect("temp dir");
    seed_legacy(&dir, "nt90", 11, &[(12, "read")]);

    let id = plan_id("nt90");
    let (mut engine, report) = ProgressEngine::open(config(&dir), catalog()).expect("open");
    assert_eq!(report.migrated, vec!["nt90".to_string()]);
    assert!(report.legacy_retired);

    assert_eq!(engine.current_day(&id).expect("current day"), Some(11));
    let stats = engine.statistics(&id).expect("stats").expect("started");
    assert_eq!(stats.completed_days, 11);
    assert_eq!(stats.current_iteration, 1);

    // The imported plan already matches the catalog revision.
    assert_eq!(
        engine.start_or_resume(&id).expect("resume").warning(),
        None
    );

    let view = engine.mark_complete(&id, 11, true).expect("complete");
    assert_eq!(view.current_day, 13);

    // A second pass finds nothing left to import.
    let again = engine.migrate_legacy().expect("migrate again");
    assert!(again.migrated.is_empty());
    assert!(again.is_clean());
}

#[test]
fn uncatalogued_import_is_rebuilt_once_the_definition_appears() {
    let dir = TempDir::new().expect("temp dir");
    seed_legacy(&dir, "x", 4, &[]);
    let id = plan_id("x");

    {
        let (engine, report) =
            ProgressEngine::open(config(&dir), StaticCatalog::new()).expect("open");
        assert_eq!(report.migrated, vec!["x".to_string()]);
        let plan = engine.store().get_plan(&id).expect("get").expect("imported");
        assert_eq!(plan.day_count, 3);
        assert_eq!(plan.version, None);
    }

    // Revision 0 is what a plan file without a version deserializes to.
    let catalog = StaticCatalog::from_json(r#"[{"id": "x", "day_count": 10}]"#).expect("catalog");
    let (mut engine, _) = ProgressEngine::open(config(&dir), catalog).expect("reopen");
    assert_eq!(
        engine.start_or_resume(&id).expect("resume"),
        StartOutcome::Resumed {
            warning: Some(StartWarning::CatalogMismatch {
                stored: None,
                catalog: 0,
                discarded_history: 0,
            }),
        }
    );

    let plan = engine.store().get_plan(&id).expect("get").expect("plan");
    assert_eq!(plan.day_count, 10);
    assert_eq!(plan.version, Some(0));
    assert_eq!(engine.store().get_days(&id).expect("days").len(), 10);
    assert_eq!(engine.current_day(&id).expect("current day"), Some(4));

    let view = engine.mark_complete(&id, 7, true).expect("day 7 exists now");
    assert_eq!(view.completed_days, vec![1, 2, 3, 7]);
    assert_eq!(
        engine.start_or_resume(&id).expect("resume again"),
        StartOutcome::Resumed { warning: None }
    );
}
