//! Hand-off point between incident transitions and customer e-mail delivery.
//!
//! Events are written to `notification_outbox` in the same transaction as the
//! state change, then offered to a [`Notifier`]. Delivery failures never undo a
//! transition; the outbox row stays pending for the external dispatcher.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{format_ts, uuid_col};
use crate::domain::DomainEvent;
use crate::error::AppError;

/// Consumer of lifecycle events, typically a mail gateway adapter.
pub trait Notifier {
    fn notify(&self, event: &DomainEvent) -> Result<(), AppError>;
}

/// Notifier that only records events in the log. Used when no gateway is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &DomainEvent) -> Result<(), AppError> {
        tracing::info!(
            kind = event.kind(),
            incident_id = %event.incident_id(),
            recipient = %event.customer_email(),
            "incident notification raised"
        );
        Ok(())
    }
}

/// Offer `event` to `notifier`. Returns whether delivery was accepted; failures are
/// logged and swallowed.
pub fn dispatch_event(notifier: &dyn Notifier, event: &DomainEvent) -> bool {
    match notifier.notify(event) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(
                kind = event.kind(),
                incident_id = %event.incident_id(),
                code = %err.code,
                error = %err,
                "notification dispatch failed; event left in outbox"
            );
            false
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingNotification {
    pub id: i64,
    pub event_kind: String,
    pub incident_id: Uuid,
    pub recipient: String,
    pub event: DomainEvent,
}

/// Queue `event` and return its outbox row id.
pub(crate) fn enqueue_notification(conn: &Connection, event: &DomainEvent) -> Result<i64, AppError> {
    let payload = serde_json::to_string(event).map_err(|e| {
        AppError::new("NOTIFY_SERIALIZE_FAILED", "Failed to serialize domain event")
            .with_details(e.to_string())
    })?;
    conn.execute(
        r#"
      INSERT INTO notification_outbox(event_kind, incident_id, recipient, payload_json, occurred_on)
      VALUES (?1, ?2, ?3, ?4, ?5)
      "#,
        params![
            event.kind(),
            event.incident_id().to_string(),
            event.customer_email().as_str(),
            payload,
            format_ts(event.occurred_on())?,
        ],
    )
    .map_err(|e| {
        AppError::new("NOTIFY_ENQUEUE_FAILED", "Failed to queue notification")
            .with_details(e.to_string())
    })?;
    Ok(conn.last_insert_rowid())
}

/// Unsent outbox rows, oldest first.
pub fn pending_notifications(conn: &Connection, limit: usize) -> Result<Vec<PendingNotification>, AppError> {
    let mut stmt = conn
        .prepare(
            r#"
      SELECT id, event_kind, incident_id, recipient, payload_json
      FROM notification_outbox
      WHERE sent_at IS NULL
      ORDER BY id ASC
      LIMIT ?1
      "#,
        )
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to prepare outbox query")
                .with_details(e.to_string())
        })?;

    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                uuid_col(row, 2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to query outbox").with_details(e.to_string())
        })?;

    let mut out = Vec::new();
    for r in rows {
        let (id, event_kind, incident_id, recipient, payload) = r.map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to decode outbox row")
                .with_details(e.to_string())
        })?;
        let event: DomainEvent = serde_json::from_str(&payload).map_err(|e| {
            AppError::new("NOTIFY_PAYLOAD_INVALID", "Stored notification payload is invalid")
                .with_details(format!("outbox_id={id}; err={e}"))
        })?;
        out.push(PendingNotification {
            id,
            event_kind,
            incident_id,
            recipient,
            event,
        });
    }
    Ok(out)
}

pub fn mark_notification_sent(conn: &Connection, outbox_id: i64) -> Result<(), AppError> {
    let now = format_ts(time::OffsetDateTime::now_utc())?;
    let n = conn
        .execute(
            "UPDATE notification_outbox SET sent_at = ?1 WHERE id = ?2 AND sent_at IS NULL",
            params![now, outbox_id],
        )
        .map_err(|e| {
            AppError::new("DB_QUERY_FAILED", "Failed to mark notification sent")
                .with_details(e.to_string())
        })?;
    if n == 0 {
        return Err(AppError::new(
            "NOTIFY_NOT_PENDING",
            "Notification not found or already sent",
        )
        .with_details(format!("outbox_id={outbox_id}")));
    }
    Ok(())
}

/// Drain the outbox through `notifier`, marking each accepted event as sent.
/// Returns how many were delivered; failed rows stay pending for the next run.
pub fn deliver_pending(
    conn: &Connection,
    notifier: &dyn Notifier,
    limit: usize,
) -> Result<usize, AppError> {
    let mut delivered = 0;
    for pending in pending_notifications(conn, limit)? {
        if dispatch_event(notifier, &pending.event) {
            mark_notification_sent(conn, pending.id)?;
            delivered += 1;
        }
    }
    tracing::debug!(delivered, "outbox drained");
    Ok(delivered)
}
