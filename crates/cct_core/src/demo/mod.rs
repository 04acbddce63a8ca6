use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::config::TrackerConfig;
use crate::domain::{Customer, Email, IncidentType, Priority};
use crate::error::AppError;
use crate::identity::{User, UserRole};
use crate::notify::LogNotifier;
use crate::repo::{insert_customer, insert_incident_type, insert_priority, insert_user};
use crate::service::{IncidentService, OpenIncidentRequest};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DemoSeedSummary {
    pub users: usize,
    pub customers: usize,
    pub incidents: usize,
    pub resolved: usize,
    pub closed: usize,
    pub reopened: usize,
}

const CUSTOMERS: [(&str, &str, &str); 5] = [
    ("30111222", "Ana Ferreyra", "ana.ferreyra@example.com"),
    ("27444555", "Bruno Salinas", "bruno.salinas@example.com"),
    ("33999000", "Carla Medina", "carla.medina@example.com"),
    ("20123456", "Acme Logistics", "soporte@acme-logistics.example"),
    ("29876543", "Diego Romero", "diego.romero@example.com"),
];

const PROBLEMS: [&str; 4] = [
    "Customer reports no dial tone since this morning",
    "Invoice shows a duplicated monthly charge",
    "Router reboots every few minutes",
    "Requests downgrade of the current plan",
];

fn demo_err(e: crate::error::DomainError) -> AppError {
    AppError::new("DEMO_SEED_FAILED", "Demo fixture rejected by domain validation")
        .with_details(e.to_string())
}

/// Seed a small call center: staff, catalogs, customers and incidents spread over
/// every lifecycle state. Runs through [`IncidentService`] so the audit trail and
/// outbox look exactly like production data.
pub fn seed_demo_dataset(conn: &mut Connection) -> Result<DemoSeedSummary, AppError> {
    let admin = User::bootstrap("admin", "Demo Administrator", UserRole::Administrator).map_err(demo_err)?;
    insert_user(conn, &admin)?;

    let supervisor = User::new("sofia", "Sofia Paz", UserRole::Supervisor, admin.id())
        .map_err(demo_err)?
        .with_email(Email::parse("sofia.paz@example.com").map_err(demo_err)?);
    insert_user(conn, &supervisor)?;

    let mut operators = Vec::new();
    for (username, full_name) in [("oscar", "Oscar Ruiz"), ("lucia", "Lucia Gomez")] {
        let op = User::new(username, full_name, UserRole::Operator, admin.id()).map_err(demo_err)?;
        insert_user(conn, &op)?;
        operators.push(op);
    }

    let mut types = Vec::new();
    for (name, desc) in [
        ("Technical", "Connectivity and equipment faults"),
        ("Billing", "Charges, invoices and refunds"),
        ("Commercial", "Plan changes and new services"),
    ] {
        let t = IncidentType::new(name, Some(desc), admin.id()).map_err(demo_err)?;
        insert_incident_type(conn, &t)?;
        types.push(t);
    }

    let mut priorities = Vec::new();
    for (name, weight) in [("Low", 10), ("Medium", 20), ("High", 30), ("Critical", 40)] {
        let p = Priority::new(name, weight, admin.id()).map_err(demo_err)?;
        insert_priority(conn, &p)?;
        priorities.push(p);
    }

    let mut customers = Vec::new();
    for (doc, name, email) in CUSTOMERS {
        let email = Email::parse(email).map_err(demo_err)?;
        let c = Customer::new(doc, name, email, None, admin.id()).map_err(demo_err)?;
        insert_customer(conn, &c)?;
        customers.push(c);
    }

    let config = TrackerConfig::default();
    let notifier = LogNotifier;
    let mut svc = IncidentService::new(conn, &notifier, &config);
    let supervisor_actor = supervisor.actor();

    let mut summary = DemoSeedSummary {
        users: 2 + operators.len(),
        customers: customers.len(),
        incidents: 0,
        resolved: 0,
        closed: 0,
        reopened: 0,
    };

    for i in 0..12 {
        let creator = &operators[i % operators.len()];
        let actor = creator.actor();
        let req = OpenIncidentRequest {
            customer_id: customers[i % customers.len()].id(),
            type_id: types[i % types.len()].id(),
            priority_id: priorities[i % priorities.len()].id(),
            problem: PROBLEMS[i % PROBLEMS.len()].to_string(),
        };
        let incident = svc.open_incident(&actor, &req)?;
        let id = incident.id();
        summary.incidents += 1;

        // Stages: 0 open, 1 assigned, 2 in analysis, 3 resolved, 4 closed, 5 reopened.
        let stage = i % 6;
        if stage >= 1 {
            let other = &operators[(i + 1) % operators.len()];
            svc.reassign(id, &supervisor_actor, other.id(), "Balancing the queue")?;
        }
        if stage >= 2 {
            svc.modify(
                id,
                &actor,
                |edit| edit.add_comment("Called the customer back for details."),
                None,
            )?;
        }
        if stage >= 3 {
            svc.resolve(id, &actor, "Issue fixed remotely.")?;
            summary.resolved += 1;
        }
        if stage >= 4 {
            svc.close(id, &actor, "Customer confirmed the fix.")?;
            summary.resolved -= 1;
            summary.closed += 1;
        }
        if stage == 5 {
            svc.reopen(id, &supervisor_actor, "Problem came back after two days")?;
            summary.closed -= 1;
            summary.reopened += 1;
        }
    }

    tracing::info!(incidents = summary.incidents, "demo dataset seeded");
    Ok(summary)
}
