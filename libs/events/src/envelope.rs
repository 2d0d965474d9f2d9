//! Plan event envelope.

use chrono::{DateTime, Utc};
use keel_plan::{ActionId, ActionRecord, ActionType, EventId, PlanKind, ServerGroup, TickId};
use serde::{Deserialize, Serialize};

use crate::{EventError, Outcome, PlanEventKind, Severity};

/// One event about a deployment's plan execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEvent {
    pub event_id: EventId,

    pub occurred_at: DateTime<Utc>,

    /// Name of the deployment the plan belongs to.
    pub deployment: String,

    /// Tick that produced the event.
    pub tick_id: TickId,

    pub event_type: PlanEventKind,

    pub severity: Severity,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_id: Option<ActionId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_type: Option<ActionType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<ServerGroup>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub member_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl PlanEvent {
    pub fn builder() -> PlanEventBuilder {
        PlanEventBuilder::new()
    }

    pub fn to_json(&self) -> Result<String, EventError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Builder for [`PlanEvent`]. `deployment`, `tick_id` and `event_type` are required.
#[derive(Debug, Default)]
pub struct PlanEventBuilder {
    occurred_at: Option<DateTime<Utc>>,
    deployment: Option<String>,
    tick_id: Option<TickId>,
    event_type: Option<PlanEventKind>,
    severity: Option<Severity>,
    plan: Option<PlanKind>,
    action_id: Option<ActionId>,
    action_type: Option<ActionType>,
    group: Option<ServerGroup>,
    member_id: String,
    outcome: Option<Outcome>,
    message: String,
}

impl PlanEventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn occurred_at(mut self, ts: DateTime<Utc>) -> Self {
        self.occurred_at = Some(ts);
        self
    }

    pub fn deployment(mut self, name: impl Into<String>) -> Self {
        self.deployment = Some(name.into());
        self
    }

    pub fn tick(mut self, tick_id: TickId) -> Self {
        self.tick_id = Some(tick_id);
        self
    }

    pub fn event_type(mut self, kind: PlanEventKind) -> Self {
        self.event_type = Some(kind);
        self
    }

    /// Overrides the kind's default severity.
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn plan(mut self, kind: PlanKind) -> Self {
        self.plan = Some(kind);
        self
    }

    /// Copies id, type, group and member from a record.
    pub fn record(mut self, record: &ActionRecord) -> Self {
        self.action_id = Some(record.id);
        self.action_type = Some(record.action_type);
        self.group = Some(record.group);
        self.member_id = record.member_id.clone();
        self
    }

    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn build(self) -> Result<PlanEvent, EventError> {
        let event_type = self.event_type.ok_or(EventError::MissingField("event_type"))?;
        Ok(PlanEvent {
            event_id: EventId::new(),
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            deployment: self.deployment.ok_or(EventError::MissingField("deployment"))?,
            tick_id: self.tick_id.ok_or(EventError::MissingField("tick_id"))?,
            event_type,
            severity: self.severity.unwrap_or_else(|| event_type.severity()),
            plan: self.plan,
            action_id: self.action_id,
            action_type: self.action_type,
            group: self.group,
            member_id: self.member_id,
            outcome: self.outcome,
            message: self.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_copies_record_fields() {
        let record = ActionRecord::new(ActionType::CleanOutMember, ServerGroup::DbServers, "PRMR-1");
        let event = PlanEvent::builder()
            .deployment("db")
            .tick(TickId::new())
            .event_type(PlanEventKind::ActionAborted)
            .plan(PlanKind::Normal)
            .record(&record)
            .outcome(Outcome::Aborted)
            .message("cleanout job failed")
            .build()
            .unwrap();

        assert_eq!(event.action_id, Some(record.id));
        assert_eq!(event.action_type, Some(ActionType::CleanOutMember));
        assert_eq!(event.member_id, "PRMR-1");
        assert_eq!(event.severity, Severity::Warning);
    }

    #[test]
    fn test_builder_requires_fields() {
        let err = PlanEvent::builder()
            .tick(TickId::new())
            .event_type(PlanEventKind::PlanAborted)
            .build()
            .unwrap_err();
        assert_eq!(err, EventError::MissingField("deployment"));

        let err = PlanEvent::builder().deployment("db").build().unwrap_err();
        assert_eq!(err, EventError::MissingField("event_type"));
    }

    #[test]
    fn test_json_shape() {
        let event = PlanEvent::builder()
            .deployment("db")
            .tick(TickId::new())
            .event_type(PlanEventKind::PlanAborted)
            .build()
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["event_type"], "plan.aborted");
        assert_eq!(json["severity"], "warning");
        assert!(json.get("action_id").is_none());
    }
}
