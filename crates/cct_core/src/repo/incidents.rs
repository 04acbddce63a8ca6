use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use super::{collect_rows, get_customer, get_incident_type, get_priority, get_user, meta_from_row, query_failed};
use crate::db::{format_opt_ts, format_ts, parsed_col, ts_col, uuid_col};
use crate::domain::incident::IncidentParts;
use crate::domain::{
    Customer, DomainEvent, Incident, IncidentAssignment, IncidentComment, IncidentState,
    IncidentStateHistory, IncidentType, Priority,
};
use crate::error::AppError;
use crate::identity::User;
use crate::notify::enqueue_notification;

/// Row shape for incident lists.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IncidentSummary {
    pub id: Uuid,
    pub number: String,
    pub state: IncidentState,
    pub problem: String,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub priority_name: String,
    pub priority_weight: i64,
    pub assigned_to_user_id: Uuid,
    pub assigned_to_username: String,
    pub created_at: String,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentFilter {
    pub state: Option<IncidentState>,
    pub assigned_to_user_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub include_deleted: bool,
}

/// Incident aggregate together with the entities it references, for detail views.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IncidentDetail {
    pub incident: Incident,
    pub customer: Customer,
    pub incident_type: IncidentType,
    pub priority: Priority,
    pub owner: User,
    pub assignee: User,
}

fn corrupt(id: Uuid, details: impl Into<String>) -> AppError {
    AppError::new("STORE_CORRUPT_INCIDENT", "Stored incident violates audit trail invariants")
        .with_details(format!("id={id}; {}", details.into()))
}

fn tx_failed(message: &'static str) -> impl Fn(rusqlite::Error) -> AppError {
    move |e| AppError::new("DB_TX_FAILED", message).with_details(e.to_string())
}

fn insert_comment(conn: &Connection, seq: usize, c: &IncidentComment) -> Result<(), AppError> {
    conn.execute(
        r#"
      INSERT INTO incident_comments(
        id, incident_id, seq, author_user_id, text, created_at, created_by_user_id
      ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
      "#,
        params![
            c.id().to_string(),
            c.incident_id().to_string(),
            seq as i64,
            c.author_user_id().to_string(),
            c.text(),
            format_ts(c.created_at())?,
            c.created_by_user_id().to_string(),
        ],
    )
    .map_err(|e| {
        AppError::new("DB_INSERT_FAILED", "Failed to append incident comment")
            .with_details(e.to_string())
    })?;
    Ok(())
}

fn insert_assignment(conn: &Connection, seq: usize, a: &IncidentAssignment) -> Result<(), AppError> {
    conn.execute(
        r#"
      INSERT INTO incident_assignments(
        id, incident_id, seq, assigned_by_user_id, assigned_to_user_id, note,
        created_at, created_by_user_id
      ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
      "#,
        params![
            a.id().to_string(),
            a.incident_id().to_string(),
            seq as i64,
            a.assigned_by_user_id().to_string(),
            a.assigned_to_user_id().to_string(),
            a.note(),
            format_ts(a.created_at())?,
            a.created_by_user_id().to_string(),
        ],
    )
    .map_err(|e| {
        AppError::new("DB_INSERT_FAILED", "Failed to append incident assignment")
            .with_details(e.to_string())
    })?;
    Ok(())
}

fn insert_history(conn: &Connection, seq: usize, h: &IncidentStateHistory) -> Result<(), AppError> {
    conn.execute(
        r#"
      INSERT INTO incident_state_history(
        id, incident_id, seq, state, actor_user_id, note, created_at, created_by_user_id
      ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
      "#,
        params![
            h.id().to_string(),
            h.incident_id().to_string(),
            seq as i64,
            h.state().as_str(),
            h.actor_user_id().to_string(),
            h.note(),
            format_ts(h.created_at())?,
            h.created_by_user_id().to_string(),
        ],
    )
    .map_err(|e| {
        AppError::new("DB_INSERT_FAILED", "Failed to append incident state history")
            .with_details(e.to_string())
    })?;
    Ok(())
}

fn persisted_count(conn: &Connection, table: &str, incident_id: Uuid) -> Result<usize, AppError> {
    let n: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE incident_id = ?1"),
            [incident_id.to_string()],
            |row| row.get(0),
        )
        .map_err(query_failed("Failed to count audit trail rows"))?;
    Ok(n as usize)
}

/// Append the records the store has not seen yet. Records are append-only, so the
/// persisted rows are always a prefix of the in-memory sequence.
fn append_audit_trail(conn: &Connection, incident: &Incident) -> Result<(), AppError> {
    let id = incident.id();

    let done = persisted_count(conn, "incident_comments", id)?;
    if done > incident.comments().len() {
        return Err(corrupt(id, "more stored comments than in memory"));
    }
    for (seq, c) in incident.comments().iter().enumerate().skip(done) {
        insert_comment(conn, seq, c)?;
    }

    let done = persisted_count(conn, "incident_assignments", id)?;
    if done > incident.assignments().len() {
        return Err(corrupt(id, "more stored assignments than in memory"));
    }
    for (seq, a) in incident.assignments().iter().enumerate().skip(done) {
        insert_assignment(conn, seq, a)?;
    }

    let done = persisted_count(conn, "incident_state_history", id)?;
    if done > incident.state_history().len() {
        return Err(corrupt(id, "more stored history entries than in memory"));
    }
    for (seq, h) in incident.state_history().iter().enumerate().skip(done) {
        insert_history(conn, seq, h)?;
    }

    Ok(())
}

/// Persist a freshly created incident and its initial audit trail as one unit.
/// `outbox` is queued for the notification dispatcher inside the same transaction;
/// the returned id is its outbox row.
pub fn insert_incident(
    conn: &mut Connection,
    incident: &mut Incident,
    outbox: Option<&DomainEvent>,
) -> Result<Option<i64>, AppError> {
    let tx = conn
        .transaction()
        .map_err(tx_failed("Failed to start incident transaction"))?;

    let m = incident.meta();
    tx.execute(
        r#"
      INSERT INTO incidents(
        id, number, customer_id, customer_email, type_id, priority_id, problem, state,
        owner_user_id, assigned_to_user_id, resolution_note, close_comment, version,
        created_at, created_by_user_id, updated_at, updated_by_user_id, is_deleted
      ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1, ?13, ?14, ?15, ?16, ?17)
      "#,
        params![
            incident.id().to_string(),
            incident.number(),
            incident.customer_id().to_string(),
            incident.customer_email().as_str(),
            incident.type_id().to_string(),
            incident.priority_id().to_string(),
            incident.problem(),
            incident.state().as_str(),
            incident.owner_user_id().to_string(),
            incident.assigned_to_user_id().to_string(),
            incident.resolution_note(),
            incident.close_comment(),
            format_ts(m.created_at())?,
            m.created_by_user_id().to_string(),
            format_opt_ts(m.updated_at())?,
            m.updated_by_user_id().map(|u| u.to_string()),
            m.is_deleted(),
        ],
    )
    .map_err(|e| {
        AppError::new("DB_INSERT_FAILED", "Failed to insert incident").with_details(e.to_string())
    })?;

    append_audit_trail(&tx, incident)?;
    let outbox_id = outbox
        .map(|event| enqueue_notification(&tx, event))
        .transpose()?;

    tx.commit()
        .map_err(tx_failed("Failed to commit incident transaction"))?;
    incident.set_version(1);
    Ok(outbox_id)
}

/// Save the mutable columns of an already stored incident and append its new audit
/// records, checking that nobody saved the incident since it was loaded.
pub fn save_incident(
    conn: &mut Connection,
    incident: &mut Incident,
    outbox: Option<&DomainEvent>,
) -> Result<Option<i64>, AppError> {
    let tx = conn
        .transaction()
        .map_err(tx_failed("Failed to start incident transaction"))?;

    let m = incident.meta();
    let updated = tx
        .execute(
            r#"
      UPDATE incidents SET
        problem = ?1,
        state = ?2,
        assigned_to_user_id = ?3,
        resolution_note = ?4,
        close_comment = ?5,
        updated_at = ?6,
        updated_by_user_id = ?7,
        is_deleted = ?8,
        version = version + 1
      WHERE id = ?9 AND version = ?10
      "#,
            params![
                incident.problem(),
                incident.state().as_str(),
                incident.assigned_to_user_id().to_string(),
                incident.resolution_note(),
                incident.close_comment(),
                format_opt_ts(m.updated_at())?,
                m.updated_by_user_id().map(|u| u.to_string()),
                m.is_deleted(),
                incident.id().to_string(),
                incident.version(),
            ],
        )
        .map_err(query_failed("Failed to update incident"))?;

    if updated == 0 {
        let stored: Option<i64> = tx
            .query_row(
                "SELECT version FROM incidents WHERE id = ?1",
                [incident.id().to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_failed("Failed to query incident version"))?;
        return Err(match stored {
            None => AppError::new("DB_NOT_FOUND", "Incident not found")
                .with_details(incident.id().to_string()),
            Some(v) => AppError::new(
                "STORE_CONCURRENT_MODIFICATION",
                "Incident was modified by someone else; reload and retry",
            )
            .with_details(format!("expected_version={}; stored_version={v}", incident.version()))
            .with_retryable(true),
        });
    }

    append_audit_trail(&tx, incident)?;
    let outbox_id = outbox
        .map(|event| enqueue_notification(&tx, event))
        .transpose()?;

    tx.commit()
        .map_err(tx_failed("Failed to commit incident transaction"))?;
    incident.set_version(incident.version() + 1);
    Ok(outbox_id)
}

fn load_comments(conn: &Connection, id: Uuid) -> Result<Vec<IncidentComment>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
      SELECT id, incident_id, author_user_id, text, created_at
      FROM incident_comments
      WHERE incident_id = ?1
      ORDER BY seq ASC
      "#,
        )
        .map_err(query_failed("Failed to prepare comments query"))?;
    let rows = stmt
        .query_map([id.to_string()], |row| {
            Ok(IncidentComment::restore(
                uuid_col(row, 0)?,
                uuid_col(row, 1)?,
                uuid_col(row, 2)?,
                row.get(3)?,
                ts_col(row, 4)?,
            ))
        })
        .map_err(query_failed("Failed to query comments"))?;
    collect_rows(rows, "Failed to decode comment row")
}

fn load_assignments(conn: &Connection, id: Uuid) -> Result<Vec<IncidentAssignment>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
      SELECT id, incident_id, assigned_by_user_id, assigned_to_user_id, note, created_at
      FROM incident_assignments
      WHERE incident_id = ?1
      ORDER BY seq ASC
      "#,
        )
        .map_err(query_failed("Failed to prepare assignments query"))?;
    let rows = stmt
        .query_map([id.to_string()], |row| {
            Ok(IncidentAssignment::restore(
                uuid_col(row, 0)?,
                uuid_col(row, 1)?,
                uuid_col(row, 2)?,
                uuid_col(row, 3)?,
                row.get(4)?,
                ts_col(row, 5)?,
            ))
        })
        .map_err(query_failed("Failed to query assignments"))?;
    collect_rows(rows, "Failed to decode assignment row")
}

fn load_history(conn: &Connection, id: Uuid) -> Result<Vec<IncidentStateHistory>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
      SELECT id, incident_id, state, actor_user_id, note, created_at
      FROM incident_state_history
      WHERE incident_id = ?1
      ORDER BY seq ASC
      "#,
        )
        .map_err(query_failed("Failed to prepare state history query"))?;
    let rows = stmt
        .query_map([id.to_string()], |row| {
            Ok(IncidentStateHistory::restore(
                uuid_col(row, 0)?,
                uuid_col(row, 1)?,
                parsed_col(row, 2)?,
                uuid_col(row, 3)?,
                row.get(4)?,
                ts_col(row, 5)?,
            ))
        })
        .map_err(query_failed("Failed to query state history"))?;
    collect_rows(rows, "Failed to decode state history row")
}

/// Rebuild the aggregate with its audit trail in append order.
pub fn load_incident(conn: &Connection, id: Uuid) -> Result<Incident, AppError> {
    let parts = conn
        .query_row(
            r#"
      SELECT
        id, number, customer_id, customer_email, type_id, priority_id, problem, state,
        owner_user_id, assigned_to_user_id, resolution_note, close_comment, version,
        created_at, created_by_user_id, updated_at, updated_by_user_id, is_deleted
      FROM incidents
      WHERE id = ?1
      "#,
            [id.to_string()],
            |row| {
                Ok(IncidentParts {
                    meta: meta_from_row(row, 0, 13)?,
                    number: row.get(1)?,
                    customer_id: uuid_col(row, 2)?,
                    customer_email: parsed_col(row, 3)?,
                    type_id: uuid_col(row, 4)?,
                    priority_id: uuid_col(row, 5)?,
                    problem: row.get(6)?,
                    state: parsed_col(row, 7)?,
                    owner_user_id: uuid_col(row, 8)?,
                    assigned_to_user_id: uuid_col(row, 9)?,
                    resolution_note: row.get(10)?,
                    close_comment: row.get(11)?,
                    version: row.get(12)?,
                    comments: Vec::new(),
                    assignments: Vec::new(),
                    state_history: Vec::new(),
                })
            },
        )
        .optional()
        .map_err(query_failed("Failed to query incident"))?
        .ok_or_else(|| {
            AppError::new("DB_NOT_FOUND", "Incident not found").with_details(id.to_string())
        })?;

    let state_history = load_history(conn, id)?;
    match state_history.last() {
        None => return Err(corrupt(id, "empty state history")),
        Some(last) if last.state() != parts.state => {
            return Err(corrupt(
                id,
                format!("state={} but last history entry={}", parts.state, last.state()),
            ))
        }
        Some(_) => {}
    }

    Ok(Incident::from_parts(IncidentParts {
        comments: load_comments(conn, id)?,
        assignments: load_assignments(conn, id)?,
        state_history,
        ..parts
    }))
}

pub fn list_incidents(conn: &Connection, filter: &IncidentFilter) -> Result<Vec<IncidentSummary>, AppError> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<String> = Vec::new();
    if !filter.include_deleted {
        clauses.push("i.is_deleted = 0");
    }
    if let Some(state) = filter.state {
        values.push(state.as_str().to_string());
        clauses.push("i.state = ?");
    }
    if let Some(user) = filter.assigned_to_user_id {
        values.push(user.to_string());
        clauses.push("i.assigned_to_user_id = ?");
    }
    if let Some(customer) = filter.customer_id {
        values.push(customer.to_string());
        clauses.push("i.customer_id = ?");
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let sql = format!(
        r#"
      SELECT
        i.id, i.number, i.state, i.problem, i.customer_id, c.name,
        p.name, p.weight, i.assigned_to_user_id, u.username, i.created_at, i.is_deleted
      FROM incidents i
      JOIN customers c ON c.id = i.customer_id
      JOIN priorities p ON p.id = i.priority_id
      JOIN users u ON u.id = i.assigned_to_user_id
      {where_sql}
      ORDER BY p.weight DESC, i.rowid ASC
      "#
    );

    let mut stmt = conn
        .prepare(&sql)
        .map_err(query_failed("Failed to prepare incidents query"))?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), |row| {
            Ok(IncidentSummary {
                id: uuid_col(row, 0)?,
                number: row.get(1)?,
                state: parsed_col(row, 2)?,
                problem: row.get(3)?,
                customer_id: uuid_col(row, 4)?,
                customer_name: row.get(5)?,
                priority_name: row.get(6)?,
                priority_weight: row.get(7)?,
                assigned_to_user_id: uuid_col(row, 8)?,
                assigned_to_username: row.get(9)?,
                created_at: row.get(10)?,
                is_deleted: row.get(11)?,
            })
        })
        .map_err(query_failed("Failed to query incidents"))?;
    collect_rows(rows, "Failed to decode incident row")
}

/// Work queue of a single operator.
pub fn list_incidents_assigned_to(conn: &Connection, user_id: Uuid) -> Result<Vec<IncidentSummary>, AppError> {
    list_incidents(
        conn,
        &IncidentFilter {
            assigned_to_user_id: Some(user_id),
            ..IncidentFilter::default()
        },
    )
}

pub fn list_incidents_for_customer(conn: &Connection, customer_id: Uuid) -> Result<Vec<IncidentSummary>, AppError> {
    list_incidents(
        conn,
        &IncidentFilter {
            customer_id: Some(customer_id),
            ..IncidentFilter::default()
        },
    )
}

/// Next free human-readable number, e.g. `INC-000042` for prefix `INC` and width 6.
pub fn next_incident_number(conn: &Connection, prefix: &str, width: usize) -> Result<String, AppError> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM incidents", [], |row| row.get(0))
        .map_err(query_failed("Failed to count incidents"))?;

    let mut n = count + 1;
    loop {
        let candidate = format!("{prefix}-{n:0width$}");
        let taken: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM incidents WHERE number = ?1",
                [&candidate],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_failed("Failed to check incident number"))?;
        if taken.is_none() {
            return Ok(candidate);
        }
        n += 1;
    }
}

pub fn get_incident_detail(conn: &Connection, id: Uuid) -> Result<IncidentDetail, AppError> {
    let incident = load_incident(conn, id)?;
    Ok(IncidentDetail {
        customer: get_customer(conn, incident.customer_id())?,
        incident_type: get_incident_type(conn, incident.type_id())?,
        priority: get_priority(conn, incident.priority_id())?,
        owner: get_user(conn, incident.owner_user_id())?,
        assignee: get_user(conn, incident.assigned_to_user_id())?,
        incident,
    })
}

