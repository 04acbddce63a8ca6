use std::cell::RefCell;

use pretty_assertions::assert_eq;
use rusqlite::Connection;
use uuid::Uuid;

use cct_core::config::TrackerConfig;
use cct_core::db;
use cct_core::domain::{Customer, DomainEvent, Email, IncidentType, Priority};
use cct_core::error::AppError;
use cct_core::identity::{User, UserRole};
use cct_core::notify::{deliver_pending, mark_notification_sent, pending_notifications, Notifier};
use cct_core::repo::{insert_customer, insert_incident_type, insert_priority, insert_user};
use cct_core::service::{IncidentService, OpenIncidentRequest};

/// Accepts everything except resolution notices.
#[derive(Default)]
struct PickyNotifier {
    delivered: RefCell<Vec<Uuid>>,
}

impl Notifier for PickyNotifier {
    fn notify(&self, event: &DomainEvent) -> Result<(), AppError> {
        if let DomainEvent::IncidentResolved { .. } = event {
            return Err(AppError::new("SMTP_REJECTED", "template missing"));
        }
        self.delivered.borrow_mut().push(event.incident_id());
        Ok(())
    }
}

struct Offline;

impl Notifier for Offline {
    fn notify(&self, _event: &DomainEvent) -> Result<(), AppError> {
        Err(AppError::new("SMTP_UNAVAILABLE", "offline"))
    }
}

/// Two incidents opened and one resolved while the gateway was down.
fn queued_db() -> (Connection, Uuid, Uuid) {
    let mut conn = db::open_in_memory().expect("open");
    db::migrate(&mut conn).expect("migrate");

    let admin = User::bootstrap("admin", "Admin", UserRole::Administrator).unwrap();
    insert_user(&conn, &admin).unwrap();
    let customer = Customer::new(
        "33999000",
        "Carla Medina",
        Email::parse("carla@example.com").unwrap(),
        None,
        admin.id(),
    )
    .unwrap();
    insert_customer(&conn, &customer).unwrap();
    let incident_type = IncidentType::new("Technical", None, admin.id()).unwrap();
    insert_incident_type(&conn, &incident_type).unwrap();
    let priority = Priority::new("Low", 10, admin.id()).unwrap();
    insert_priority(&conn, &priority).unwrap();

    let req = OpenIncidentRequest {
        customer_id: customer.id(),
        type_id: incident_type.id(),
        priority_id: priority.id(),
        problem: "Slow connection at night".to_string(),
    };
    let config = TrackerConfig::default();
    let actor = admin.actor();
    let (a, b) = {
        let mut svc = IncidentService::new(&mut conn, &Offline, &config);
        let a = svc.open_incident(&actor, &req).unwrap().id();
        let b = svc.open_incident(&actor, &req).unwrap().id();
        svc.resolve(a, &actor, "Line profile reset").unwrap();
        (a, b)
    };
    (conn, a, b)
}

#[test]
fn pending_rows_carry_the_serialized_event() {
    let (conn, a, b) = queued_db();

    let pending = pending_notifications(&conn, 10).unwrap();
    assert_eq!(pending.len(), 3);
    assert_eq!(pending[0].incident_id, a);
    assert_eq!(pending[1].incident_id, b);
    assert_eq!(pending[2].event_kind, "incident.resolved");
    match &pending[0].event {
        DomainEvent::IncidentCreated {
            incident_number,
            customer_email,
            ..
        } => {
            assert_eq!(incident_number, "INC-000001");
            assert_eq!(customer_email.as_str(), "carla@example.com");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let limited = pending_notifications(&conn, 1).unwrap();
    assert_eq!(limited.len(), 1);
}

#[test]
fn deliver_pending_marks_accepted_rows_and_keeps_failures() {
    let (conn, a, b) = queued_db();
    let notifier = PickyNotifier::default();

    let delivered = deliver_pending(&conn, &notifier, 10).unwrap();
    assert_eq!(delivered, 2);
    assert_eq!(*notifier.delivered.borrow(), vec![a, b]);

    let left = pending_notifications(&conn, 10).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].event_kind, "incident.resolved");
    assert_eq!(left[0].incident_id, a);
}

#[test]
fn marking_twice_is_reported() {
    let (conn, _, _) = queued_db();
    let first = pending_notifications(&conn, 1).unwrap().remove(0);

    mark_notification_sent(&conn, first.id).expect("first mark");
    let err = mark_notification_sent(&conn, first.id).unwrap_err();
    assert_eq!(err.code, "NOTIFY_NOT_PENDING");
    assert_eq!(pending_notifications(&conn, 10).unwrap().len(), 2);
}
