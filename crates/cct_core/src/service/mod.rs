use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TrackerConfig;
use crate::domain::{Created, DomainEvent, Incident, IncidentEdit, Transition};
use crate::error::{AppError, DomainError};
use crate::identity::Actor;
use crate::notify::{dispatch_event, mark_notification_sent, Notifier};
use crate::repo::{
    get_customer, get_incident_detail, get_incident_type, get_priority, get_user, insert_incident,
    load_incident, next_incident_number, save_incident, IncidentDetail,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenIncidentRequest {
    pub customer_id: Uuid,
    pub type_id: Uuid,
    pub priority_id: Uuid,
    pub problem: String,
}

/// Runs incident operations against the store: load, apply, save with the version
/// check, then hand any event to the notifier.
///
/// The caller's [`Actor`] is re-read from the user table, so a stale role or a block
/// applied after login takes effect immediately.
pub struct IncidentService<'a> {
    conn: &'a mut Connection,
    notifier: &'a dyn Notifier,
    config: &'a TrackerConfig,
}

impl<'a> IncidentService<'a> {
    pub fn new(conn: &'a mut Connection, notifier: &'a dyn Notifier, config: &'a TrackerConfig) -> Self {
        Self {
            conn,
            notifier,
            config,
        }
    }

    fn resolve_actor(&self, actor: &Actor) -> Result<Actor, AppError> {
        let user = get_user(&*self.conn, actor.id).map_err(|e| {
            AppError::new("ACTOR_UNKNOWN", "Acting user is not registered")
                .with_details(e.details.unwrap_or(e.message))
        })?;
        if user.meta().is_deleted() {
            return Err(AppError::new("ACTOR_UNKNOWN", "Acting user has been removed")
                .with_details(actor.id.to_string()));
        }
        Ok(user.actor())
    }

    fn emit(&self, event: &DomainEvent, outbox_id: Option<i64>) {
        if !dispatch_event(self.notifier, event) {
            return;
        }
        if let Some(id) = outbox_id {
            if let Err(err) = mark_notification_sent(&*self.conn, id) {
                tracing::warn!(outbox_id = id, error = %err, "failed to mark notification sent");
            }
        }
    }

    #[tracing::instrument(skip(self, actor, req), fields(actor_id = %actor.id))]
    pub fn open_incident(&mut self, actor: &Actor, req: &OpenIncidentRequest) -> Result<Incident, AppError> {
        let actor = self.resolve_actor(actor)?;
        let customer = get_customer(&*self.conn, req.customer_id)?;
        let incident_type = get_incident_type(&*self.conn, req.type_id)?;
        let priority = get_priority(&*self.conn, req.priority_id)?;
        let number = next_incident_number(
            &*self.conn,
            self.config.number_prefix.trim(),
            self.config.number_width,
        )?;

        let Created { mut incident, event } =
            Incident::create(&number, &customer, &incident_type, &priority, &req.problem, &actor)
                .map_err(rejected("create"))?;

        let queued = self.config.queue_notifications.then_some(&event);
        let outbox_id = insert_incident(self.conn, &mut incident, queued)?;
        tracing::info!(
            incident_id = %incident.id(),
            number = incident.number(),
            "incident opened"
        );

        self.emit(&event, outbox_id);
        Ok(incident)
    }

    fn apply<F>(&mut self, op: &'static str, incident_id: Uuid, actor: &Actor, f: F) -> Result<Incident, AppError>
    where
        F: FnOnce(&mut Incident, &Actor) -> Result<Transition, DomainError>,
    {
        let actor = self.resolve_actor(actor)?;
        let mut incident = load_incident(&*self.conn, incident_id)?;
        if incident.meta().is_deleted() {
            return Err(AppError::new("INCIDENT_DELETED", "Incident has been deleted")
                .with_details(incident_id.to_string()));
        }

        let transition = f(&mut incident, &actor).map_err(rejected(op))?;
        if !transition.changed {
            tracing::debug!(op, incident_id = %incident_id, "no-op; nothing saved");
            return Ok(incident);
        }

        let queued = transition
            .event
            .as_ref()
            .filter(|_| self.config.queue_notifications);
        let outbox_id = save_incident(self.conn, &mut incident, queued)?;
        tracing::info!(
            op,
            incident_id = %incident_id,
            state = %transition.state,
            version = incident.version(),
            "incident updated"
        );

        if let Some(event) = &transition.event {
            self.emit(event, outbox_id);
        }
        Ok(incident)
    }

    #[tracing::instrument(skip(self, actor, reason), fields(actor_id = %actor.id))]
    pub fn reassign(
        &mut self,
        incident_id: Uuid,
        actor: &Actor,
        assignee_id: Uuid,
        reason: &str,
    ) -> Result<Incident, AppError> {
        let assignee = get_user(&*self.conn, assignee_id)?;
        if assignee.meta().is_deleted() {
            return Err(AppError::new("ASSIGNEE_INACTIVE", "Cannot assign to a removed user")
                .with_details(assignee_id.to_string()));
        }
        self.apply("reassign", incident_id, actor, |inc, actor| {
            inc.reassign(actor, &assignee, reason)
        })
    }

    #[tracing::instrument(skip(self, actor, change, note), fields(actor_id = %actor.id))]
    pub fn modify<F>(
        &mut self,
        incident_id: Uuid,
        actor: &Actor,
        change: F,
        note: Option<&str>,
    ) -> Result<Incident, AppError>
    where
        F: FnOnce(&mut IncidentEdit),
    {
        self.apply("modify", incident_id, actor, |inc, actor| {
            inc.modify(actor, change, note)
        })
    }

    #[tracing::instrument(skip(self, actor, resolution_note), fields(actor_id = %actor.id))]
    pub fn resolve(&mut self, incident_id: Uuid, actor: &Actor, resolution_note: &str) -> Result<Incident, AppError> {
        self.apply("resolve", incident_id, actor, |inc, actor| {
            inc.resolve(actor, resolution_note)
        })
    }

    #[tracing::instrument(skip(self, actor, close_comment), fields(actor_id = %actor.id))]
    pub fn close(&mut self, incident_id: Uuid, actor: &Actor, close_comment: &str) -> Result<Incident, AppError> {
        self.apply("close", incident_id, actor, |inc, actor| {
            inc.close(actor, close_comment)
        })
    }

    #[tracing::instrument(skip(self, actor, reason), fields(actor_id = %actor.id))]
    pub fn reopen(&mut self, incident_id: Uuid, actor: &Actor, reason: &str) -> Result<Incident, AppError> {
        self.apply("reopen", incident_id, actor, |inc, actor| {
            inc.reopen(actor, reason)
        })
    }

    #[tracing::instrument(skip(self, actor, text), fields(actor_id = %actor.id))]
    pub fn add_comment(&mut self, incident_id: Uuid, actor: &Actor, text: &str) -> Result<Incident, AppError> {
        self.apply("comment", incident_id, actor, |inc, actor| {
            inc.add_comment(actor, text)?;
            Ok(Transition {
                changed: true,
                state: inc.state(),
                event: None,
            })
        })
    }

    /// Logical delete; the audit trail stays attached to the incident.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub fn delete(&mut self, incident_id: Uuid, actor: &Actor) -> Result<Incident, AppError> {
        self.apply("delete", incident_id, actor, |inc, actor| {
            inc.delete(actor)?;
            Ok(Transition {
                changed: true,
                state: inc.state(),
                event: None,
            })
        })
    }

    pub fn incident_detail(&self, incident_id: Uuid) -> Result<IncidentDetail, AppError> {
        get_incident_detail(&*self.conn, incident_id)
    }
}

fn rejected(op: &'static str) -> impl Fn(DomainError) -> AppError {
    move |err| {
        tracing::debug!(op, code = err.code(), "operation rejected");
        AppError::from(err)
    }
}
