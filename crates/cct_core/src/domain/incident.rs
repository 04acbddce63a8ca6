use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    required_text, AuditMetadata, Customer, DomainEvent, Email, IncidentAssignment,
    IncidentComment, IncidentStateHistory, IncidentType, Priority,
};
use crate::error::DomainError;
use crate::identity::{authorize, Actor, Operation, User};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IncidentState {
    /// Initial state; only reachable through creation.
    Open,
    Assigned,
    InAnalysis,
    Resolved,
    Closed,
    Reopened,
}

impl IncidentState {
    pub const ALL: [IncidentState; 6] = [
        IncidentState::Open,
        IncidentState::Assigned,
        IncidentState::InAnalysis,
        IncidentState::Resolved,
        IncidentState::Closed,
        IncidentState::Reopened,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentState::Open => "open",
            IncidentState::Assigned => "assigned",
            IncidentState::InAnalysis => "in_analysis",
            IncidentState::Resolved => "resolved",
            IncidentState::Closed => "closed",
            IncidentState::Reopened => "reopened",
        }
    }
}

impl fmt::Display for IncidentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IncidentState::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| {
                DomainError::validation("STATE_UNKNOWN", format!("Unknown incident state: {s}"))
            })
    }
}

/// Result of a successful mutator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// False when the call was an accepted no-op (reassigning to the current assignee).
    pub changed: bool,
    pub state: IncidentState,
    pub event: Option<DomainEvent>,
}

/// Result of [`Incident::create`]: the new aggregate plus its creation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    pub incident: Incident,
    pub event: DomainEvent,
}

/// The only fields a `modify` closure may touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncidentEdit {
    problem: String,
    comment: Option<String>,
}

impl IncidentEdit {
    pub fn problem(&self) -> &str {
        &self.problem
    }

    pub fn set_problem(&mut self, problem: impl Into<String>) {
        self.problem = problem.into();
    }

    /// Attach a follow-up comment recorded together with the modification.
    pub fn add_comment(&mut self, text: impl Into<String>) {
        self.comment = Some(text.into());
    }
}

/// Aggregate root for a reported problem and its audit trail.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Incident {
    meta: AuditMetadata,
    number: String,
    customer_id: Uuid,
    customer_email: Email,
    type_id: Uuid,
    priority_id: Uuid,
    problem: String,
    state: IncidentState,
    owner_user_id: Uuid,
    assigned_to_user_id: Uuid,
    resolution_note: Option<String>,
    close_comment: Option<String>,
    comments: Vec<IncidentComment>,
    assignments: Vec<IncidentAssignment>,
    state_history: Vec<IncidentStateHistory>,
    /// Storage revision used for optimistic concurrency; owned by the store.
    version: i64,
}

/// Column values needed to rebuild an incident loaded from storage.
pub(crate) struct IncidentParts {
    pub meta: AuditMetadata,
    pub number: String,
    pub customer_id: Uuid,
    pub customer_email: Email,
    pub type_id: Uuid,
    pub priority_id: Uuid,
    pub problem: String,
    pub state: IncidentState,
    pub owner_user_id: Uuid,
    pub assigned_to_user_id: Uuid,
    pub resolution_note: Option<String>,
    pub close_comment: Option<String>,
    pub comments: Vec<IncidentComment>,
    pub assignments: Vec<IncidentAssignment>,
    pub state_history: Vec<IncidentStateHistory>,
    pub version: i64,
}

impl Incident {
    /// Open a new incident on behalf of `creator`, who also becomes the first assignee.
    pub fn create(
        number: &str,
        customer: &Customer,
        incident_type: &IncidentType,
        priority: &Priority,
        problem: &str,
        creator: &Actor,
    ) -> Result<Created, DomainError> {
        authorize(creator, Operation::Create)?;
        let number = required_text(number, "INCIDENT_NUMBER_REQUIRED", "Incident number is required")?;
        let problem = required_text(problem, "PROBLEM_REQUIRED", "Problem description is required")?;
        for (deleted, what) in [
            (customer.meta().is_deleted(), "customer"),
            (incident_type.meta().is_deleted(), "incident type"),
            (priority.meta().is_deleted(), "priority"),
        ] {
            if deleted {
                return Err(DomainError::validation(
                    "REFERENCE_DELETED",
                    format!("Cannot open an incident against a deleted {what}"),
                ));
            }
        }

        let mut incident = Incident {
            meta: AuditMetadata::new(creator.id),
            number,
            customer_id: customer.id(),
            customer_email: customer.email.clone(),
            type_id: incident_type.id(),
            priority_id: priority.id(),
            problem,
            state: IncidentState::Open,
            owner_user_id: creator.id,
            assigned_to_user_id: creator.id,
            resolution_note: None,
            close_comment: None,
            comments: Vec::new(),
            assignments: Vec::new(),
            state_history: Vec::new(),
            version: 0,
        };
        incident.push_history(IncidentState::Open, creator.id, Some("Incident created."));
        incident.push_assignment(creator.id, creator.id, Some("Initial assignment to creator."));

        let event = DomainEvent::created(incident.id(), &incident.number, incident.customer_email.clone());
        Ok(Created { incident, event })
    }

    pub fn reassign(
        &mut self,
        actor: &Actor,
        new_assignee: &User,
        reason: &str,
    ) -> Result<Transition, DomainError> {
        authorize(actor, Operation::Reassign)?;
        if self.assigned_to_user_id == new_assignee.id() {
            return Ok(self.unchanged());
        }

        self.assigned_to_user_id = new_assignee.id();
        self.meta.touch(actor.id);
        let reason = Some(reason.trim()).filter(|r| !r.is_empty());
        self.push_assignment(actor.id, new_assignee.id(), reason);
        Ok(self.transition_to(IncidentState::Assigned, actor.id, Some("Reassigned by supervisor."), None))
    }

    /// Apply an edit to the mutable working fields and move the incident into analysis.
    ///
    /// The closure receives a scratch copy; nothing is applied unless the edited
    /// values validate.
    pub fn modify<F>(
        &mut self,
        actor: &Actor,
        change: F,
        note: Option<&str>,
    ) -> Result<Transition, DomainError>
    where
        F: FnOnce(&mut IncidentEdit),
    {
        authorize(actor, Operation::Modify)?;
        let mut edit = IncidentEdit {
            problem: self.problem.clone(),
            comment: None,
        };
        change(&mut edit);

        let problem = required_text(&edit.problem, "PROBLEM_REQUIRED", "Problem description is required")?;
        let comment = match edit.comment.as_deref() {
            Some(text) => Some(required_text(text, "COMMENT_REQUIRED", "Comment text is required")?),
            None => None,
        };

        self.problem = problem;
        if let Some(text) = comment {
            self.push_comment(actor.id, &text);
        }
        self.meta.touch(actor.id);
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        Ok(self.transition_to(
            IncidentState::InAnalysis,
            actor.id,
            Some(note.unwrap_or("Modification recorded.")),
            None,
        ))
    }

    pub fn resolve(&mut self, actor: &Actor, resolution_note: &str) -> Result<Transition, DomainError> {
        authorize(actor, Operation::Resolve)?;
        let note = required_text(resolution_note, "RESOLUTION_NOTE_REQUIRED", "Resolution note is required")?;

        self.resolution_note = Some(note);
        self.meta.touch(actor.id);
        let event = DomainEvent::resolved(self.id(), self.customer_email.clone());
        Ok(self.transition_to(IncidentState::Resolved, actor.id, Some("Incident resolved."), Some(event)))
    }

    pub fn close(&mut self, actor: &Actor, close_comment: &str) -> Result<Transition, DomainError> {
        authorize(actor, Operation::Close)?;
        let comment = required_text(close_comment, "CLOSE_COMMENT_REQUIRED", "Close comment is required")?;

        self.close_comment = Some(comment);
        self.meta.touch(actor.id);
        let event = DomainEvent::closed(self.id(), self.customer_email.clone());
        Ok(self.transition_to(IncidentState::Closed, actor.id, Some("Incident closed."), Some(event)))
    }

    pub fn reopen(&mut self, actor: &Actor, reason: &str) -> Result<Transition, DomainError> {
        authorize(actor, Operation::Reopen)?;
        self.push_comment(actor.id, &format!("Reopened: {}", reason.trim()));
        self.meta.touch(actor.id);
        Ok(self.transition_to(IncidentState::Reopened, actor.id, Some("Reopened for follow-up."), None))
    }

    /// Free-form comment; leaves the state untouched.
    pub fn add_comment(&mut self, actor: &Actor, text: &str) -> Result<(), DomainError> {
        authorize(actor, Operation::Comment)?;
        let text = required_text(text, "COMMENT_REQUIRED", "Comment text is required")?;
        self.push_comment(actor.id, &text);
        self.meta.touch(actor.id);
        Ok(())
    }

    /// Logical delete. The audit trail stays attached to the deleted incident.
    pub fn delete(&mut self, actor: &Actor) -> Result<(), DomainError> {
        authorize(actor, Operation::Modify)?;
        self.meta.mark_deleted(actor.id);
        Ok(())
    }

    // State and its history entry always change together here and nowhere else.
    fn transition_to(
        &mut self,
        state: IncidentState,
        actor_id: Uuid,
        note: Option<&str>,
        event: Option<DomainEvent>,
    ) -> Transition {
        self.state = state;
        self.push_history(state, actor_id, note);
        Transition {
            changed: true,
            state,
            event,
        }
    }

    fn unchanged(&self) -> Transition {
        Transition {
            changed: false,
            state: self.state,
            event: None,
        }
    }

    fn push_history(&mut self, state: IncidentState, actor_id: Uuid, note: Option<&str>) {
        let id = self.id();
        self.state_history
            .push(IncidentStateHistory::record(id, state, actor_id, note));
    }

    fn push_assignment(&mut self, by: Uuid, to: Uuid, note: Option<&str>) {
        let id = self.id();
        self.assignments.push(IncidentAssignment::record(id, by, to, note));
    }

    fn push_comment(&mut self, author: Uuid, text: &str) {
        let id = self.id();
        self.comments.push(IncidentComment::record(id, author, text));
    }

    pub(crate) fn from_parts(parts: IncidentParts) -> Self {
        Self {
            meta: parts.meta,
            number: parts.number,
            customer_id: parts.customer_id,
            customer_email: parts.customer_email,
            type_id: parts.type_id,
            priority_id: parts.priority_id,
            problem: parts.problem,
            state: parts.state,
            owner_user_id: parts.owner_user_id,
            assigned_to_user_id: parts.assigned_to_user_id,
            resolution_note: parts.resolution_note,
            close_comment: parts.close_comment,
            comments: parts.comments,
            assignments: parts.assignments,
            state_history: parts.state_history,
            version: parts.version,
        }
    }

    pub(crate) fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    pub fn id(&self) -> Uuid {
        self.meta.id()
    }

    pub fn meta(&self) -> &AuditMetadata {
        &self.meta
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn customer_id(&self) -> Uuid {
        self.customer_id
    }

    /// Customer address captured at creation, used for notifications.
    pub fn customer_email(&self) -> &Email {
        &self.customer_email
    }

    pub fn type_id(&self) -> Uuid {
        self.type_id
    }

    pub fn priority_id(&self) -> Uuid {
        self.priority_id
    }

    pub fn problem(&self) -> &str {
        &self.problem
    }

    pub fn state(&self) -> IncidentState {
        self.state
    }

    pub fn owner_user_id(&self) -> Uuid {
        self.owner_user_id
    }

    pub fn assigned_to_user_id(&self) -> Uuid {
        self.assigned_to_user_id
    }

    pub fn resolution_note(&self) -> Option<&str> {
        self.resolution_note.as_deref()
    }

    pub fn close_comment(&self) -> Option<&str> {
        self.close_comment.as_deref()
    }

    pub fn comments(&self) -> &[IncidentComment] {
        &self.comments
    }

    pub fn assignments(&self) -> &[IncidentAssignment] {
        &self.assignments
    }

    pub fn state_history(&self) -> &[IncidentStateHistory] {
        &self.state_history
    }

    pub fn version(&self) -> i64 {
        self.version
    }
}
