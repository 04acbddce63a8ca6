use std::path::Path;

use rusqlite::Connection;

use crate::config::TrackerConfig;
use crate::error::AppError;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct WorkspaceMetadata {
    pub db_path: String,
    pub is_empty: bool,
}

fn validate_db_path(path: &Path) -> Result<(), AppError> {
    if path.as_os_str().is_empty() {
        return Err(AppError::new(
            "WORKSPACE_INVALID_PATH",
            "Workspace DB path is empty",
        ));
    }
    if path.exists() && path.is_dir() {
        return Err(AppError::new(
            "WORKSPACE_INVALID_PATH",
            "Workspace DB path must be a file (not a directory)",
        )
        .with_details(path.display().to_string()));
    }
    Ok(())
}

fn count(conn: &Connection, table: &str) -> Result<i64, AppError> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .map_err(|e| {
            AppError::new(
                "DB_QUERY_FAILED",
                format!("Failed to count {table} for workspace emptiness check"),
            )
            .with_details(e.to_string())
        })
}

/// A workspace is empty until someone has registered a user, customer or incident.
fn is_empty_conn(conn: &Connection) -> Result<bool, AppError> {
    for table in ["incidents", "customers", "users"] {
        if count(conn, table)? > 0 {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Open (creating the file if needed) and migrate, remapping failures to workspace codes.
fn connect(db_path: &Path, open_code: &str, open_message: &str) -> Result<Connection, AppError> {
    // `crate::db` already returns AppError; keep its details under the workspace code.
    let mut conn = crate::db::open(db_path).map_err(|e| {
        let details = e.details.clone().unwrap_or_else(|| e.to_string());
        AppError::new(open_code, open_message).with_details(details)
    })?;
    crate::db::migrate(&mut conn).map_err(|e| {
        let details = e.details.clone().unwrap_or_else(|| e.to_string());
        AppError::new("WORKSPACE_MIGRATION_FAILED", "Failed to migrate workspace database")
            .with_details(details)
    })?;
    Ok(conn)
}

pub fn open_workspace_connection(db_path: &Path) -> Result<Connection, AppError> {
    validate_db_path(db_path)?;

    if !db_path.is_file() {
        return Err(AppError::new(
            "WORKSPACE_DB_NOT_FOUND",
            "Workspace database file not found",
        )
        .with_details(db_path.display().to_string()));
    }

    let conn = connect(db_path, "WORKSPACE_OPEN_FAILED", "Failed to open workspace database")?;
    tracing::debug!(path = %db_path.display(), "workspace opened");
    Ok(conn)
}

pub fn create_workspace_connection(db_path: &Path) -> Result<Connection, AppError> {
    validate_db_path(db_path)?;

    if db_path.exists() {
        return Err(AppError::new(
            "WORKSPACE_CREATE_FAILED",
            "Workspace DB file already exists",
        )
        .with_details(db_path.display().to_string()));
    }

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::new(
                "WORKSPACE_CREATE_FAILED",
                "Failed to create workspace directory",
            )
            .with_details(format!("path={}; err={}", parent.display(), e))
        })?;
    }

    let conn = connect(db_path, "WORKSPACE_CREATE_FAILED", "Failed to create workspace database")?;
    tracing::info!(path = %db_path.display(), "workspace created");
    Ok(conn)
}

/// Connection for the configured tracker database, created on first use.
pub fn connect_configured(config: &TrackerConfig) -> Result<Connection, AppError> {
    config.validate()?;
    if config.db_path.is_file() {
        open_workspace_connection(&config.db_path)
    } else {
        create_workspace_connection(&config.db_path)
    }
}

pub fn open_workspace(db_path: &Path) -> Result<WorkspaceMetadata, AppError> {
    let conn = open_workspace_connection(db_path)?;
    let empty = is_empty_conn(&conn)?;
    Ok(WorkspaceMetadata {
        db_path: db_path.to_string_lossy().to_string(),
        is_empty: empty,
    })
}

pub fn create_workspace(db_path: &Path) -> Result<WorkspaceMetadata, AppError> {
    let conn = create_workspace_connection(db_path)?;
    let empty = is_empty_conn(&conn)?;
    Ok(WorkspaceMetadata {
        db_path: db_path.to_string_lossy().to_string(),
        is_empty: empty,
    })
}

pub fn db_is_empty(db_path: &Path) -> Result<bool, AppError> {
    let conn = open_workspace_connection(db_path)?;
    is_empty_conn(&conn)
}
