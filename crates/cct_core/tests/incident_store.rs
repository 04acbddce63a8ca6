use pretty_assertions::assert_eq;
use rusqlite::Connection;

use cct_core::db;
use cct_core::domain::{Customer, Email, Incident, IncidentState, IncidentType, Priority};
use cct_core::identity::{User, UserRole};
use cct_core::repo::{
    get_customer, get_incident_type, get_priority, get_user, insert_customer, insert_incident, insert_incident_type, insert_priority, insert_user,
    list_incidents, list_incidents_assigned_to, list_incidents_for_customer, load_incident,
    next_incident_number, save_incident, IncidentFilter,
};

struct Fixture {
    conn: Connection,
    operator: User,
    supervisor: User,
    customer: Customer,
    incident_type: IncidentType,
    priority: Priority,
}

fn fixture() -> Fixture {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");

    let admin = User::bootstrap("admin", "Admin", UserRole::Administrator).unwrap();
    let operator = User::new("oscar", "Oscar Ruiz", UserRole::Operator, admin.id()).unwrap();
    let supervisor = User::new("sofia", "Sofia Paz", UserRole::Supervisor, admin.id()).unwrap();
    for u in [&admin, &operator, &supervisor] {
        insert_user(&conn, u).expect("insert user");
    }

    let customer = Customer::new(
        "30111222",
        "Ana Ferreyra",
        Email::parse("ana@example.com").unwrap(),
        Some("+54 11 5555 0000"),
        admin.id(),
    )
    .unwrap();
    insert_customer(&conn, &customer).expect("insert customer");
    let incident_type = IncidentType::new("Technical", None, admin.id()).unwrap();
    insert_incident_type(&conn, &incident_type).expect("insert type");
    let priority = Priority::new("High", 30, admin.id()).unwrap();
    insert_priority(&conn, &priority).expect("insert priority");

    Fixture {
        conn,
        operator,
        supervisor,
        customer,
        incident_type,
        priority,
    }
}

fn open_one(fx: &mut Fixture, problem: &str) -> Incident {
    let number = next_incident_number(&fx.conn, "INC", 6).expect("number");
    let created = Incident::create(
        &number,
        &fx.customer,
        &fx.incident_type,
        &fx.priority,
        problem,
        &fx.operator.actor(),
    )
    .expect("create");
    let mut incident = created.incident;
    insert_incident(&mut fx.conn, &mut incident, None).expect("insert incident");
    incident
}

#[test]
fn incident_round_trips_with_full_audit_trail() {
    let mut fx = fixture();
    let mut incident = open_one(&mut fx, "No dial tone");
    let op = fx.operator.actor();

    incident
        .reassign(&fx.supervisor.actor(), &fx.supervisor, "Escalated")
        .unwrap();
    incident
        .modify(&op, |e| e.add_comment("Line test scheduled"), Some("Diagnosing"))
        .unwrap();
    incident.resolve(&op, "Replaced the splitter").unwrap();
    save_incident(&mut fx.conn, &mut incident, None).expect("save");
    assert_eq!(incident.version(), 2);

    let loaded = load_incident(&fx.conn, incident.id()).expect("load");
    assert_eq!(loaded, incident);
    assert_eq!(loaded.state(), IncidentState::Resolved);
    let states: Vec<IncidentState> = loaded.state_history().iter().map(|h| h.state()).collect();
    assert_eq!(
        states,
        vec![
            IncidentState::Open,
            IncidentState::Assigned,
            IncidentState::InAnalysis,
            IncidentState::Resolved,
        ]
    );
    assert_eq!(loaded.assignments().len(), 2);
    assert_eq!(loaded.comments().len(), 1);
}

#[test]
fn stale_save_is_rejected_as_concurrent_modification() {
    let mut fx = fixture();
    let incident = open_one(&mut fx, "Router reboots");
    let op = fx.operator.actor();

    let mut first = load_incident(&fx.conn, incident.id()).unwrap();
    let mut second = load_incident(&fx.conn, incident.id()).unwrap();

    first.resolve(&op, "Firmware updated").unwrap();
    save_incident(&mut fx.conn, &mut first, None).expect("first save wins");

    second.close(&op, "Closing without resolving").unwrap();
    let err = save_incident(&mut fx.conn, &mut second, None).unwrap_err();
    assert_eq!(err.code, "STORE_CONCURRENT_MODIFICATION");
    assert!(err.retryable);

    // The losing save left nothing behind.
    let stored = load_incident(&fx.conn, incident.id()).unwrap();
    assert_eq!(stored.state(), IncidentState::Resolved);
    assert_eq!(stored.state_history().len(), 2);
}

#[test]
fn audit_tables_refuse_updates_and_deletes() {
    let mut fx = fixture();
    open_one(&mut fx, "Duplicated charge");

    for sql in [
        "DELETE FROM incident_state_history",
        "UPDATE incident_state_history SET note = 'rewritten'",
        "DELETE FROM incident_assignments",
        "UPDATE incident_assignments SET note = 'x'",
    ] {
        assert!(fx.conn.execute(sql, []).is_err(), "expected `{sql}` to abort");
    }
}

#[test]
fn load_detects_state_out_of_sync_with_history() {
    let mut fx = fixture();
    let incident = open_one(&mut fx, "No dial tone");
    fx.conn
        .execute(
            "UPDATE incidents SET state = 'closed' WHERE id = ?1",
            [incident.id().to_string()],
        )
        .unwrap();

    let err = load_incident(&fx.conn, incident.id()).unwrap_err();
    assert_eq!(err.code, "STORE_CORRUPT_INCIDENT");
}

#[test]
fn numbers_are_sequential_and_zero_padded() {
    let mut fx = fixture();
    assert_eq!(next_incident_number(&fx.conn, "INC", 6).unwrap(), "INC-000001");
    let first = open_one(&mut fx, "One");
    assert_eq!(first.number(), "INC-000001");
    assert_eq!(next_incident_number(&fx.conn, "INC", 6).unwrap(), "INC-000002");
    assert_eq!(next_incident_number(&fx.conn, "CC", 3).unwrap(), "CC-002");
}

#[test]
fn list_filters_by_state_assignee_customer_and_deletion() {
    let mut fx = fixture();
    let mut a = open_one(&mut fx, "First");
    let mut b = open_one(&mut fx, "Second");
    let op = fx.operator.actor();

    a.resolve(&op, "Done").unwrap();
    save_incident(&mut fx.conn, &mut a, None).unwrap();

    let resolved = list_incidents(
        &fx.conn,
        &IncidentFilter {
            state: Some(IncidentState::Resolved),
            ..IncidentFilter::default()
        },
    )
    .unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].id, a.id());
    assert_eq!(resolved[0].priority_name, "High");

    let mine = list_incidents_assigned_to(&fx.conn, fx.operator.id()).unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].assigned_to_username, "oscar");
    assert!(list_incidents_assigned_to(&fx.conn, fx.supervisor.id()).unwrap().is_empty());

    b.delete(&op).unwrap();
    save_incident(&mut fx.conn, &mut b, None).expect("save deletion");

    let visible = list_incidents_for_customer(&fx.conn, fx.customer.id()).unwrap();
    assert_eq!(visible.len(), 1);
    let everything = list_incidents(
        &fx.conn,
        &IncidentFilter {
            include_deleted: true,
            ..IncidentFilter::default()
        },
    )
    .unwrap();
    assert_eq!(everything.len(), 2);

    // Deleted incidents keep their audit trail.
    let reloaded = load_incident(&fx.conn, b.id()).unwrap();
    assert_eq!(reloaded.state_history().len(), 1);
    assert!(reloaded.meta().is_deleted());
}

#[test]
fn list_keeps_insertion_order_within_a_priority() {
    let mut fx = fixture();
    let first = open_one(&mut fx, "First");
    let second = open_one(&mut fx, "Second");

    // RFC3339 text drops trailing zeros, so ".1Z" would sort after ".12Z" as text.
    for (id, ts) in [
        (first.id(), "2026-03-01T10:00:05.1Z"),
        (second.id(), "2026-03-01T10:00:05.12Z"),
    ] {
        fx.conn
            .execute(
                "UPDATE incidents SET created_at = ?1 WHERE id = ?2",
                [ts.to_string(), id.to_string()],
            )
            .unwrap();
    }

    let ids: Vec<_> = list_incidents(&fx.conn, &IncidentFilter::default())
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec![first.id(), second.id()]);
}

#[test]
fn catalog_rows_reload_with_their_metadata() {
    let fx = fixture();
    let admin_id = fx.operator.meta().created_by_user_id();

    let customer = get_customer(&fx.conn, fx.customer.id()).expect("customer");
    let incident_type = get_incident_type(&fx.conn, fx.incident_type.id()).expect("type");
    let priority = get_priority(&fx.conn, fx.priority.id()).expect("priority");
    let operator = get_user(&fx.conn, fx.operator.id()).expect("user");

    for meta in [customer.meta(), incident_type.meta(), priority.meta(), operator.meta()] {
        assert_eq!(meta.created_by_user_id(), admin_id);
        assert!(!meta.is_deleted());
    }
    assert_eq!(customer.meta(), fx.customer.meta());
}
