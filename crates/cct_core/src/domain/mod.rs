use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub mod audit;
pub mod catalog;
pub mod email;
pub mod events;
pub mod incident;

pub use audit::{IncidentAssignment, IncidentComment, IncidentStateHistory};
pub use catalog::{Customer, IncidentType, Priority};
pub use email::Email;
pub use events::DomainEvent;
pub use incident::{Created, Incident, IncidentEdit, IncidentState, Transition};

/// Bookkeeping shared by every persisted entity.
///
/// Notes:
/// - `id`, `created_at` and `created_by_user_id` are fixed at construction.
/// - `updated_*` is refreshed on every mutation of the owning entity.
/// - Deletion is logical only: `is_deleted` flips, rows are never removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditMetadata {
    id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    created_by_user_id: Uuid,
    #[serde(with = "time::serde::rfc3339::option")]
    updated_at: Option<OffsetDateTime>,
    updated_by_user_id: Option<Uuid>,
    is_deleted: bool,
}

impl AuditMetadata {
    pub fn new(created_by_user_id: Uuid) -> Self {
        Self::with_id(Uuid::new_v4(), created_by_user_id)
    }

    pub(crate) fn with_id(id: Uuid, created_by_user_id: Uuid) -> Self {
        Self {
            id,
            created_at: OffsetDateTime::now_utc(),
            created_by_user_id,
            updated_at: None,
            updated_by_user_id: None,
            is_deleted: false,
        }
    }

    /// Rebuild metadata read back from storage.
    pub(crate) fn restore(
        id: Uuid,
        created_at: OffsetDateTime,
        created_by_user_id: Uuid,
        updated_at: Option<OffsetDateTime>,
        updated_by_user_id: Option<Uuid>,
        is_deleted: bool,
    ) -> Self {
        Self {
            id,
            created_at,
            created_by_user_id,
            updated_at,
            updated_by_user_id,
            is_deleted,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn created_by_user_id(&self) -> Uuid {
        self.created_by_user_id
    }

    pub fn updated_at(&self) -> Option<OffsetDateTime> {
        self.updated_at
    }

    pub fn updated_by_user_id(&self) -> Option<Uuid> {
        self.updated_by_user_id
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub(crate) fn touch(&mut self, actor_id: Uuid) {
        self.updated_at = Some(OffsetDateTime::now_utc());
        self.updated_by_user_id = Some(actor_id);
    }

    pub(crate) fn mark_deleted(&mut self, actor_id: Uuid) {
        self.touch(actor_id);
        self.is_deleted = true;
    }
}

/// Trim `raw` and reject it when nothing is left.
pub(crate) fn required_text(
    raw: &str,
    code: &str,
    message: &str,
) -> Result<String, crate::error::DomainError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(crate::error::DomainError::validation(code, message));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_sets_updated_fields_only() {
        let creator = Uuid::new_v4();
        let editor = Uuid::new_v4();
        let mut meta = AuditMetadata::new(creator);
        let created_at = meta.created_at();
        let id = meta.id();

        meta.touch(editor);

        assert_eq!(meta.id(), id);
        assert_eq!(meta.created_at(), created_at);
        assert_eq!(meta.created_by_user_id(), creator);
        assert_eq!(meta.updated_by_user_id(), Some(editor));
        assert!(meta.updated_at().is_some());
        assert!(!meta.is_deleted());
    }

    #[test]
    fn required_text_trims_and_rejects_blank() {
        assert_eq!(required_text("  ok ", "C", "m").unwrap(), "ok");
        assert!(required_text(" \t\n", "C", "m").unwrap_err().is_validation());
    }
}
