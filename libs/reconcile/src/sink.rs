//! Destinations for committed plan events.

use std::sync::{Mutex, PoisonError};

use keel_events::{PlanEvent, PlanEventKind, Severity};
use tracing::{info, warn};

pub trait EventSink: Send + Sync {
    fn publish(&self, event: &PlanEvent);
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: &PlanEvent) {
        let action_type = event.action_type.map(|t| t.as_str()).unwrap_or_default();
        match event.severity {
            Severity::Normal => info!(
                deployment = %event.deployment,
                tick_id = %event.tick_id,
                event_type = %event.event_type,
                action_type,
                member_id = %event.member_id,
                message = %event.message,
                "Plan event"
            ),
            Severity::Warning => warn!(
                deployment = %event.deployment,
                tick_id = %event.tick_id,
                event_type = %event.event_type,
                action_type,
                member_id = %event.member_id,
                message = %event.message,
                "Plan event"
            ),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<PlanEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PlanEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn of_kind(&self, kind: PlanEventKind) -> Vec<PlanEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == kind)
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn publish(&self, event: &PlanEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
