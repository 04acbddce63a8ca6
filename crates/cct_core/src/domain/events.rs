use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::Email;

/// Lifecycle milestone raised by the incident aggregate for the customer-facing
/// notifier. The aggregate never delivers these itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    IncidentCreated {
        incident_id: Uuid,
        incident_number: String,
        customer_email: Email,
        #[serde(with = "time::serde::rfc3339")]
        occurred_on: OffsetDateTime,
    },
    IncidentResolved {
        incident_id: Uuid,
        customer_email: Email,
        #[serde(with = "time::serde::rfc3339")]
        occurred_on: OffsetDateTime,
    },
    IncidentClosed {
        incident_id: Uuid,
        customer_email: Email,
        #[serde(with = "time::serde::rfc3339")]
        occurred_on: OffsetDateTime,
    },
}

impl DomainEvent {
    pub(crate) fn created(incident_id: Uuid, incident_number: &str, customer_email: Email) -> Self {
        Self::IncidentCreated {
            incident_id,
            incident_number: incident_number.to_string(),
            customer_email,
            occurred_on: OffsetDateTime::now_utc(),
        }
    }

    pub(crate) fn resolved(incident_id: Uuid, customer_email: Email) -> Self {
        Self::IncidentResolved {
            incident_id,
            customer_email,
            occurred_on: OffsetDateTime::now_utc(),
        }
    }

    pub(crate) fn closed(incident_id: Uuid, customer_email: Email) -> Self {
        Self::IncidentClosed {
            incident_id,
            customer_email,
            occurred_on: OffsetDateTime::now_utc(),
        }
    }

    /// Stable routing key, e.g. `incident.created`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IncidentCreated { .. } => "incident.created",
            Self::IncidentResolved { .. } => "incident.resolved",
            Self::IncidentClosed { .. } => "incident.closed",
        }
    }

    pub fn incident_id(&self) -> Uuid {
        match self {
            Self::IncidentCreated { incident_id, .. }
            | Self::IncidentResolved { incident_id, .. }
            | Self::IncidentClosed { incident_id, .. } => *incident_id,
        }
    }

    pub fn customer_email(&self) -> &Email {
        match self {
            Self::IncidentCreated { customer_email, .. }
            | Self::IncidentResolved { customer_email, .. }
            | Self::IncidentClosed { customer_email, .. } => customer_email,
        }
    }

    pub fn occurred_on(&self) -> OffsetDateTime {
        match self {
            Self::IncidentCreated { occurred_on, .. }
            | Self::IncidentResolved { occurred_on, .. }
            | Self::IncidentClosed { occurred_on, .. } => *occurred_on,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape_is_tagged_by_kind() {
        let id = Uuid::new_v4();
        let ev = DomainEvent::resolved(id, Email::parse("c@d.io").unwrap());
        let v: serde_json::Value = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["kind"], "incident_resolved");
        assert_eq!(v["incident_id"], id.to_string());
        assert_eq!(v["customer_email"], "c@d.io");

        let back: DomainEvent = serde_json::from_value(v).unwrap();
        assert_eq!(back, ev);
        assert_eq!(back.kind(), "incident.resolved");
    }
}
