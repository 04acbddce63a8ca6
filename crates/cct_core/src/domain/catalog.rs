use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{required_text, AuditMetadata, Email};
use crate::error::DomainError;

/// Person or company that reports incidents to the call center.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Customer {
    pub(crate) meta: AuditMetadata,
    pub document_number: String,
    pub name: String,
    pub email: Email,
    pub phone: Option<String>,
}

impl Customer {
    pub fn new(
        document_number: &str,
        name: &str,
        email: Email,
        phone: Option<&str>,
        created_by_user_id: Uuid,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            meta: AuditMetadata::new(created_by_user_id),
            document_number: required_text(
                document_number,
                "CUSTOMER_DOCUMENT_REQUIRED",
                "Customer document number is required",
            )?,
            name: required_text(name, "CUSTOMER_NAME_REQUIRED", "Customer name is required")?,
            email,
            phone: phone
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        })
    }

    pub fn id(&self) -> Uuid {
        self.meta.id()
    }

    pub fn meta(&self) -> &AuditMetadata {
        &self.meta
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentType {
    pub(crate) meta: AuditMetadata,
    pub name: String,
    pub description: Option<String>,
}

impl IncidentType {
    pub fn new(
        name: &str,
        description: Option<&str>,
        created_by_user_id: Uuid,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            meta: AuditMetadata::new(created_by_user_id),
            name: required_text(name, "INCIDENT_TYPE_NAME_REQUIRED", "Incident type name is required")?,
            description: description.map(|d| d.trim().to_string()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.meta.id()
    }

    pub fn meta(&self) -> &AuditMetadata {
        &self.meta
    }
}

/// Urgency level. Higher `weight` sorts first when escalating.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Priority {
    pub(crate) meta: AuditMetadata,
    pub name: String,
    pub weight: i64,
}

impl Priority {
    pub fn new(name: &str, weight: i64, created_by_user_id: Uuid) -> Result<Self, DomainError> {
        Ok(Self {
            meta: AuditMetadata::new(created_by_user_id),
            name: required_text(name, "PRIORITY_NAME_REQUIRED", "Priority name is required")?,
            weight,
        })
    }

    pub fn id(&self) -> Uuid {
        self.meta.id()
    }

    pub fn meta(&self) -> &AuditMetadata {
        &self.meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_trims_fields_and_drops_blank_phone() {
        let email = Email::parse("jane@example.com").unwrap();
        let c = Customer::new(" 30111222 ", " Jane Doe ", email, Some("   "), Uuid::new_v4())
            .unwrap();
        assert_eq!(c.document_number, "30111222");
        assert_eq!(c.name, "Jane Doe");
        assert_eq!(c.phone, None);
    }

    #[test]
    fn catalog_names_are_required() {
        let actor = Uuid::new_v4();
        assert_eq!(
            IncidentType::new(" ", None, actor).unwrap_err().code(),
            "INCIDENT_TYPE_NAME_REQUIRED"
        );
        assert_eq!(
            Priority::new("", 1, actor).unwrap_err().code(),
            "PRIORITY_NAME_REQUIRED"
        );
    }
}
