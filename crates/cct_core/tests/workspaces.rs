use tempfile::tempdir;

use cct_core::config::TrackerConfig;
use cct_core::demo::seed_demo_dataset;
use cct_core::workspace::{
    connect_configured, create_workspace, create_workspace_connection, db_is_empty,
    open_workspace, open_workspace_connection,
};

fn count_incidents(conn: &rusqlite::Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM incidents", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn workspace_isolation_create_open_switch() {
    let tmp = tempdir().unwrap();
    let w1 = tmp.path().join("w1.sqlite");
    let w2 = tmp.path().join("w2.sqlite");

    // Create workspace A and seed it.
    let mut conn1 = create_workspace_connection(&w1).expect("create w1");
    seed_demo_dataset(&mut conn1).expect("seed w1");
    assert!(count_incidents(&conn1) > 0);

    // Workspace B starts out empty.
    let conn2 = create_workspace_connection(&w2).expect("create w2");
    assert_eq!(count_incidents(&conn2), 0);
    assert!(db_is_empty(&w2).expect("is_empty"));

    // Re-open A and confirm data is still there.
    let conn1b = open_workspace_connection(&w1).expect("open w1");
    assert!(count_incidents(&conn1b) > 0);
}

#[test]
fn migrations_run_on_open_and_create() {
    let tmp = tempdir().unwrap();
    let w = tmp.path().join("nested").join("migrate.sqlite");

    let meta = create_workspace(&w).expect("create meta");
    assert_eq!(meta.is_empty, true);

    let meta = open_workspace(&w).expect("reopen");
    assert_eq!(meta.is_empty, true);
}

#[test]
fn create_refuses_existing_file_and_open_refuses_missing_one() {
    let tmp = tempdir().unwrap();
    let w = tmp.path().join("once.sqlite");

    create_workspace_connection(&w).expect("create");
    let err = create_workspace_connection(&w).unwrap_err();
    assert_eq!(err.code, "WORKSPACE_CREATE_FAILED");

    let err = open_workspace_connection(&tmp.path().join("missing.sqlite")).unwrap_err();
    assert_eq!(err.code, "WORKSPACE_DB_NOT_FOUND");

    let err = open_workspace_connection(tmp.path()).unwrap_err();
    assert_eq!(err.code, "WORKSPACE_INVALID_PATH");
}

#[test]
fn configured_connection_creates_then_reopens() {
    let tmp = tempdir().unwrap();
    let config = TrackerConfig {
        db_path: tmp.path().join("tracker.sqlite"),
        ..TrackerConfig::default()
    };

    let mut conn = connect_configured(&config).expect("first connect creates");
    seed_demo_dataset(&mut conn).expect("seed");
    drop(conn);

    let conn = connect_configured(&config).expect("second connect opens");
    assert!(count_incidents(&conn) > 0);
    assert!(!db_is_empty(&config.db_path).unwrap());
}
