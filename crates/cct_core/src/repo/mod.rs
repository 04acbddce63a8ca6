use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_opt_ts, format_ts, opt_ts_col, opt_uuid_col, parsed_col, ts_col, uuid_col};
use crate::domain::{AuditMetadata, Customer, Email, IncidentType, Priority};
use crate::error::AppError;
use crate::identity::User;

pub mod incidents;

pub use incidents::{
    get_incident_detail, insert_incident, list_incidents, list_incidents_assigned_to,
    list_incidents_for_customer, load_incident, next_incident_number, save_incident,
    IncidentDetail, IncidentFilter, IncidentSummary,
};

/// Shared metadata columns, in this order, trail every entity SELECT below.
const META_COLUMNS: &str = "created_at, created_by_user_id, updated_at, updated_by_user_id, is_deleted";

pub(crate) fn meta_from_row(
    row: &rusqlite::Row<'_>,
    id_idx: usize,
    start: usize,
) -> rusqlite::Result<AuditMetadata> {
    Ok(AuditMetadata::restore(
        uuid_col(row, id_idx)?,
        ts_col(row, start)?,
        uuid_col(row, start + 1)?,
        opt_ts_col(row, start + 2)?,
        opt_uuid_col(row, start + 3)?,
        row.get(start + 4)?,
    ))
}

pub(crate) fn query_failed(message: &'static str) -> impl Fn(rusqlite::Error) -> AppError {
    move |e| AppError::new("DB_QUERY_FAILED", message).with_details(e.to_string())
}

fn insert_failed(message: &'static str) -> impl Fn(rusqlite::Error) -> AppError {
    move |e| AppError::new("DB_INSERT_FAILED", message).with_details(e.to_string())
}

fn not_found(what: &str, id: Uuid) -> AppError {
    AppError::new("DB_NOT_FOUND", format!("{what} not found")).with_details(id.to_string())
}

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
    message: &'static str,
) -> Result<Vec<T>, AppError> {
    let mut out = Vec::new();
    for r in rows {
        out.push(r.map_err(query_failed(message))?);
    }
    Ok(out)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        meta: meta_from_row(row, 0, 6)?,
        username: row.get(1)?,
        full_name: row.get(2)?,
        role: parsed_col(row, 3)?,
        email: row
            .get::<_, Option<String>>(4)?
            .map(|_| parsed_col::<Email>(row, 4))
            .transpose()?,
        is_blocked: row.get(5)?,
    })
}

fn user_select() -> String {
    format!("SELECT id, username, full_name, role, email, is_blocked, {META_COLUMNS} FROM users")
}

pub fn insert_user(conn: &Connection, user: &User) -> Result<(), AppError> {
    let m = &user.meta;
    conn.execute(
        r#"
      INSERT INTO users(
        id, username, full_name, role, email, is_blocked,
        created_at, created_by_user_id, updated_at, updated_by_user_id, is_deleted
      ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
      "#,
        params![
            m.id().to_string(),
            user.username,
            user.full_name,
            user.role.as_str(),
            user.email.as_ref().map(|e| e.as_str().to_string()),
            user.is_blocked,
            format_ts(m.created_at())?,
            m.created_by_user_id().to_string(),
            format_opt_ts(m.updated_at())?,
            m.updated_by_user_id().map(|u| u.to_string()),
            m.is_deleted(),
        ],
    )
    .map_err(insert_failed("Failed to insert user"))?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: Uuid) -> Result<User, AppError> {
    conn.query_row(
        &format!("{} WHERE id = ?1", user_select()),
        [id.to_string()],
        user_from_row,
    )
    .optional()
    .map_err(query_failed("Failed to query user"))?
    .ok_or_else(|| not_found("User", id))
}

pub fn list_users(conn: &Connection) -> Result<Vec<User>, AppError> {
    let mut stmt = conn
        .prepare(&format!("{} WHERE is_deleted = 0 ORDER BY username ASC", user_select()))
        .map_err(query_failed("Failed to prepare users query"))?;
    let rows = stmt
        .query_map([], user_from_row)
        .map_err(query_failed("Failed to query users"))?;
    collect_rows(rows, "Failed to decode user row")
}

/// Block or unblock an account. Blocked users are refused by every incident operation.
pub fn set_user_blocked(
    conn: &Connection,
    id: Uuid,
    blocked: bool,
    actor_id: Uuid,
) -> Result<(), AppError> {
    let now = format_ts(time::OffsetDateTime::now_utc())?;
    let n = conn
        .execute(
            "UPDATE users SET is_blocked = ?1, updated_at = ?2, updated_by_user_id = ?3 WHERE id = ?4",
            params![blocked, now, actor_id.to_string(), id.to_string()],
        )
        .map_err(query_failed("Failed to update user"))?;
    if n == 0 {
        return Err(not_found("User", id));
    }
    Ok(())
}

fn customer_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        meta: meta_from_row(row, 0, 5)?,
        document_number: row.get(1)?,
        name: row.get(2)?,
        email: parsed_col(row, 3)?,
        phone: row.get(4)?,
    })
}

fn customer_select() -> String {
    format!("SELECT id, document_number, name, email, phone, {META_COLUMNS} FROM customers")
}

pub fn insert_customer(conn: &Connection, customer: &Customer) -> Result<(), AppError> {
    let m = &customer.meta;
    conn.execute(
        r#"
      INSERT INTO customers(
        id, document_number, name, email, phone,
        created_at, created_by_user_id, updated_at, updated_by_user_id, is_deleted
      ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
      "#,
        params![
            m.id().to_string(),
            customer.document_number,
            customer.name,
            customer.email.as_str(),
            customer.phone,
            format_ts(m.created_at())?,
            m.created_by_user_id().to_string(),
            format_opt_ts(m.updated_at())?,
            m.updated_by_user_id().map(|u| u.to_string()),
            m.is_deleted(),
        ],
    )
    .map_err(insert_failed("Failed to insert customer"))?;
    Ok(())
}

pub fn get_customer(conn: &Connection, id: Uuid) -> Result<Customer, AppError> {
    conn.query_row(
        &format!("{} WHERE id = ?1", customer_select()),
        [id.to_string()],
        customer_from_row,
    )
    .optional()
    .map_err(query_failed("Failed to query customer"))?
    .ok_or_else(|| not_found("Customer", id))
}

pub fn find_customer_by_document(
    conn: &Connection,
    document_number: &str,
) -> Result<Option<Customer>, AppError> {
    conn.query_row(
        &format!("{} WHERE document_number = ?1", customer_select()),
        [document_number.trim()],
        customer_from_row,
    )
    .optional()
    .map_err(query_failed("Failed to query customer by document"))
}

pub fn list_customers(conn: &Connection) -> Result<Vec<Customer>, AppError> {
    let mut stmt = conn
        .prepare(&format!("{} WHERE is_deleted = 0 ORDER BY name ASC, id ASC", customer_select()))
        .map_err(query_failed("Failed to prepare customers query"))?;
    let rows = stmt
        .query_map([], customer_from_row)
        .map_err(query_failed("Failed to query customers"))?;
    collect_rows(rows, "Failed to decode customer row")
}

fn incident_type_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IncidentType> {
    Ok(IncidentType {
        meta: meta_from_row(row, 0, 3)?,
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

pub fn insert_incident_type(conn: &Connection, incident_type: &IncidentType) -> Result<(), AppError> {
    let m = &incident_type.meta;
    conn.execute(
        r#"
      INSERT INTO incident_types(
        id, name, description,
        created_at, created_by_user_id, updated_at, updated_by_user_id, is_deleted
      ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
      "#,
        params![
            m.id().to_string(),
            incident_type.name,
            incident_type.description,
            format_ts(m.created_at())?,
            m.created_by_user_id().to_string(),
            format_opt_ts(m.updated_at())?,
            m.updated_by_user_id().map(|u| u.to_string()),
            m.is_deleted(),
        ],
    )
    .map_err(insert_failed("Failed to insert incident type"))?;
    Ok(())
}

pub fn get_incident_type(conn: &Connection, id: Uuid) -> Result<IncidentType, AppError> {
    conn.query_row(
        &format!("SELECT id, name, description, {META_COLUMNS} FROM incident_types WHERE id = ?1"),
        [id.to_string()],
        incident_type_from_row,
    )
    .optional()
    .map_err(query_failed("Failed to query incident type"))?
    .ok_or_else(|| not_found("Incident type", id))
}

pub fn list_incident_types(conn: &Connection) -> Result<Vec<IncidentType>, AppError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT id, name, description, {META_COLUMNS} FROM incident_types WHERE is_deleted = 0 ORDER BY name ASC"
        ))
        .map_err(query_failed("Failed to prepare incident types query"))?;
    let rows = stmt
        .query_map([], incident_type_from_row)
        .map_err(query_failed("Failed to query incident types"))?;
    collect_rows(rows, "Failed to decode incident type row")
}

fn priority_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Priority> {
    Ok(Priority {
        meta: meta_from_row(row, 0, 3)?,
        name: row.get(1)?,
        weight: row.get(2)?,
    })
}

pub fn insert_priority(conn: &Connection, priority: &Priority) -> Result<(), AppError> {
    let m = &priority.meta;
    conn.execute(
        r#"
      INSERT INTO priorities(
        id, name, weight,
        created_at, created_by_user_id, updated_at, updated_by_user_id, is_deleted
      ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
      "#,
        params![
            m.id().to_string(),
            priority.name,
            priority.weight,
            format_ts(m.created_at())?,
            m.created_by_user_id().to_string(),
            format_opt_ts(m.updated_at())?,
            m.updated_by_user_id().map(|u| u.to_string()),
            m.is_deleted(),
        ],
    )
    .map_err(insert_failed("Failed to insert priority"))?;
    Ok(())
}

pub fn get_priority(conn: &Connection, id: Uuid) -> Result<Priority, AppError> {
    conn.query_row(
        &format!("SELECT id, name, weight, {META_COLUMNS} FROM priorities WHERE id = ?1"),
        [id.to_string()],
        priority_from_row,
    )
    .optional()
    .map_err(query_failed("Failed to query priority"))?
    .ok_or_else(|| not_found("Priority", id))
}

/// Heaviest first, so escalation candidates come out on top.
pub fn list_priorities(conn: &Connection) -> Result<Vec<Priority>, AppError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT id, name, weight, {META_COLUMNS} FROM priorities WHERE is_deleted = 0 ORDER BY weight DESC, name ASC"
        ))
        .map_err(query_failed("Failed to prepare priorities query"))?;
    let rows = stmt
        .query_map([], priority_from_row)
        .map_err(query_failed("Failed to query priorities"))?;
    collect_rows(rows, "Failed to decode priority row")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::identity::UserRole;

    fn conn() -> Connection {
        let mut conn = db::open_in_memory().expect("open");
        db::migrate(&mut conn).expect("migrate");
        conn
    }

    #[test]
    fn user_round_trips_with_email_and_role() {
        let conn = conn();
        let admin = User::bootstrap("admin", "Site Admin", UserRole::Administrator)
            .unwrap()
            .with_email(Email::parse("admin@cc.test").unwrap());
        insert_user(&conn, &admin).unwrap();

        let loaded = get_user(&conn, admin.id()).unwrap();
        assert_eq!(loaded, admin);
    }

    #[test]
    fn missing_user_is_not_found() {
        let conn = conn();
        let err = get_user(&conn, Uuid::new_v4()).unwrap_err();
        assert_eq!(err.code, "DB_NOT_FOUND");
    }

    #[test]
    fn blocking_a_user_is_persisted() {
        let conn = conn();
        let admin = User::bootstrap("admin", "Admin", UserRole::Administrator).unwrap();
        let op = User::new("op", "Op", UserRole::Operator, admin.id()).unwrap();
        insert_user(&conn, &admin).unwrap();
        insert_user(&conn, &op).unwrap();

        set_user_blocked(&conn, op.id(), true, admin.id()).unwrap();

        let loaded = get_user(&conn, op.id()).unwrap();
        assert!(loaded.is_blocked);
        assert!(loaded.actor().is_blocked);
        assert_eq!(loaded.meta.updated_by_user_id(), Some(admin.id()));
    }

    #[test]
    fn duplicate_customer_document_is_rejected() {
        let conn = conn();
        let actor = Uuid::new_v4();
        let email = Email::parse("x@y.z").unwrap();
        let a = Customer::new("123", "A", email.clone(), None, actor).unwrap();
        let b = Customer::new("123", "B", email, None, actor).unwrap();
        insert_customer(&conn, &a).unwrap();
        let err = insert_customer(&conn, &b).unwrap_err();
        assert_eq!(err.code, "DB_INSERT_FAILED");

        let found = find_customer_by_document(&conn, " 123 ").unwrap().unwrap();
        assert_eq!(found.id(), a.id());
    }

    #[test]
    fn priorities_list_heaviest_first() {
        let conn = conn();
        let actor = Uuid::new_v4();
        for (name, weight) in [("Low", 1), ("Critical", 100), ("Medium", 10)] {
            insert_priority(&conn, &Priority::new(name, weight, actor).unwrap()).unwrap();
        }
        let names: Vec<String> = list_priorities(&conn)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Critical", "Medium", "Low"]);
    }

    fn mark_deleted(conn: &Connection, table: &str, id: Uuid) {
        conn.execute(
            &format!("UPDATE {table} SET is_deleted = 1 WHERE id = ?1"),
            [id.to_string()],
        )
        .unwrap();
    }

    #[test]
    fn user_list_is_sorted_by_username_and_skips_deleted() {
        let conn = conn();
        let admin = User::bootstrap("zoe", "Zoe Admin", UserRole::Administrator).unwrap();
        insert_user(&conn, &admin).unwrap();
        for name in ["mario", "ana", "gone"] {
            let u = User::new(name, name, UserRole::Operator, admin.id()).unwrap();
            insert_user(&conn, &u).unwrap();
            if name == "gone" {
                mark_deleted(&conn, "users", u.id());
            }
        }

        let names: Vec<String> = list_users(&conn)
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["ana", "mario", "zoe"]);
    }

    #[test]
    fn customer_list_is_sorted_by_name_and_skips_deleted() {
        let conn = conn();
        let actor = Uuid::new_v4();
        let email = Email::parse("c@example.com").unwrap();
        for (doc, name) in [("3", "Carla"), ("1", "Bruno"), ("2", "Ana"), ("4", "Deleted")] {
            let c = Customer::new(doc, name, email.clone(), None, actor).unwrap();
            insert_customer(&conn, &c).unwrap();
            if name == "Deleted" {
                mark_deleted(&conn, "customers", c.id());
            }
        }

        let names: Vec<String> = list_customers(&conn)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Ana", "Bruno", "Carla"]);
    }

    #[test]
    fn incident_type_list_is_sorted_by_name_and_skips_deleted() {
        let conn = conn();
        let actor = Uuid::new_v4();
        for name in ["Technical", "Billing", "Legacy", "Commercial"] {
            let t = IncidentType::new(name, Some("desc"), actor).unwrap();
            insert_incident_type(&conn, &t).unwrap();
            if name == "Legacy" {
                mark_deleted(&conn, "incident_types", t.id());
            }
        }

        let types = list_incident_types(&conn).unwrap();
        let names: Vec<&str> = types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Billing", "Commercial", "Technical"]);
        assert_eq!(types[0].description.as_deref(), Some("desc"));
        assert_eq!(get_incident_type(&conn, types[0].id()).unwrap(), types[0]);
    }
}
