//! Append-only facts owned by an incident. Only the incident itself creates them,
//! so the incident reference and author always match the owning aggregate.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::IncidentState;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentComment {
    id: Uuid,
    incident_id: Uuid,
    author_user_id: Uuid,
    text: String,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

impl IncidentComment {
    pub(crate) fn record(incident_id: Uuid, author_user_id: Uuid, text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            incident_id,
            author_user_id,
            text: text.trim().to_string(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub(crate) fn restore(
        id: Uuid,
        incident_id: Uuid,
        author_user_id: Uuid,
        text: String,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            incident_id,
            author_user_id,
            text,
            created_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn incident_id(&self) -> Uuid {
        self.incident_id
    }

    pub fn author_user_id(&self) -> Uuid {
        self.author_user_id
    }

    /// Same as the author; kept for parity with the other audit records.
    pub fn created_by_user_id(&self) -> Uuid {
        self.author_user_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentAssignment {
    id: Uuid,
    incident_id: Uuid,
    assigned_by_user_id: Uuid,
    assigned_to_user_id: Uuid,
    note: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

impl IncidentAssignment {
    pub(crate) fn record(
        incident_id: Uuid,
        assigned_by_user_id: Uuid,
        assigned_to_user_id: Uuid,
        note: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            incident_id,
            assigned_by_user_id,
            assigned_to_user_id,
            note: note.map(str::to_string),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub(crate) fn restore(
        id: Uuid,
        incident_id: Uuid,
        assigned_by_user_id: Uuid,
        assigned_to_user_id: Uuid,
        note: Option<String>,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            incident_id,
            assigned_by_user_id,
            assigned_to_user_id,
            note,
            created_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn incident_id(&self) -> Uuid {
        self.incident_id
    }

    pub fn assigned_by_user_id(&self) -> Uuid {
        self.assigned_by_user_id
    }

    pub fn assigned_to_user_id(&self) -> Uuid {
        self.assigned_to_user_id
    }

    pub fn created_by_user_id(&self) -> Uuid {
        self.assigned_by_user_id
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentStateHistory {
    id: Uuid,
    incident_id: Uuid,
    state: IncidentState,
    actor_user_id: Uuid,
    note: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

impl IncidentStateHistory {
    pub(crate) fn record(
        incident_id: Uuid,
        state: IncidentState,
        actor_user_id: Uuid,
        note: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            incident_id,
            state,
            actor_user_id,
            note: note.map(str::to_string),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub(crate) fn restore(
        id: Uuid,
        incident_id: Uuid,
        state: IncidentState,
        actor_user_id: Uuid,
        note: Option<String>,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            incident_id,
            state,
            actor_user_id,
            note,
            created_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn incident_id(&self) -> Uuid {
        self.incident_id
    }

    pub fn state(&self) -> IncidentState {
        self.state
    }

    pub fn actor_user_id(&self) -> Uuid {
        self.actor_user_id
    }

    pub fn created_by_user_id(&self) -> Uuid {
        self.actor_user_id
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }
}
