use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{required_text, AuditMetadata, Email};
use crate::error::DomainError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Administrator,
    /// Telephone operator taking customer calls.
    Operator,
    Supervisor,
}

impl UserRole {
    pub const ALL: [UserRole; 3] = [
        UserRole::Administrator,
        UserRole::Operator,
        UserRole::Supervisor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Administrator => "administrator",
            UserRole::Operator => "operator",
            UserRole::Supervisor => "supervisor",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UserRole::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation("ROLE_UNKNOWN", format!("Unknown role: {s}")))
    }
}

/// Staff member able to act on incidents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub(crate) meta: AuditMetadata,
    pub username: String,
    pub full_name: String,
    pub role: UserRole,
    pub email: Option<Email>,
    pub is_blocked: bool,
}

impl User {
    pub fn new(
        username: &str,
        full_name: &str,
        role: UserRole,
        created_by_user_id: Uuid,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            meta: AuditMetadata::new(created_by_user_id),
            username: required_text(username, "USERNAME_REQUIRED", "Username is required")?,
            full_name: full_name.trim().to_string(),
            role,
            email: None,
            is_blocked: false,
        })
    }

    /// First account of a fresh installation; it is recorded as its own creator.
    pub fn bootstrap(username: &str, full_name: &str, role: UserRole) -> Result<Self, DomainError> {
        let id = Uuid::new_v4();
        let mut user = Self::new(username, full_name, role, id)?;
        user.meta = AuditMetadata::with_id(id, id);
        Ok(user)
    }

    pub fn with_email(mut self, email: Email) -> Self {
        self.email = Some(email);
        self
    }

    pub fn id(&self) -> Uuid {
        self.meta.id()
    }

    pub fn meta(&self) -> &AuditMetadata {
        &self.meta
    }

    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id(),
            role: self.role,
            is_blocked: self.is_blocked,
        }
    }
}

/// Identity and role of whoever is performing an operation, as supplied by the
/// access-control layer in front of the core.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: UserRole,
    #[serde(default)]
    pub is_blocked: bool,
}

impl Actor {
    pub fn new(id: Uuid, role: UserRole) -> Self {
        Self {
            id,
            role,
            is_blocked: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Reassign,
    Modify,
    Resolve,
    Close,
    Reopen,
    Comment,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Reassign => "reassign",
            Operation::Modify => "modify",
            Operation::Resolve => "resolve",
            Operation::Close => "close",
            Operation::Reopen => "reopen",
            Operation::Comment => "comment",
        }
    }
}

/// The authorization matrix: roles allowed to perform each operation.
pub fn allowed_roles(op: Operation) -> &'static [UserRole] {
    match op {
        Operation::Reassign => &[UserRole::Supervisor, UserRole::Administrator],
        Operation::Create
        | Operation::Modify
        | Operation::Resolve
        | Operation::Close
        | Operation::Reopen
        | Operation::Comment => &UserRole::ALL,
    }
}

/// Single capability check used by every incident operation.
pub fn authorize(actor: &Actor, op: Operation) -> Result<(), DomainError> {
    if actor.is_blocked {
        return Err(DomainError::authorization(
            "ACTOR_BLOCKED",
            format!("Blocked users cannot {}", op.as_str()),
        ));
    }
    if !allowed_roles(op).contains(&actor.role) {
        return Err(DomainError::authorization(
            "ROLE_NOT_ALLOWED",
            format!("Role {} cannot {}", actor.role, op.as_str()),
        ));
    }
    Ok(())
}
