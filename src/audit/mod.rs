// Event Audit Log - append-only history of every transition
//
// The row is a materialized projection; this log is the source of
// historical truth. Events are never mutated or deleted. Append failures
// must not roll back the transition that produced them (a completed
// operation with a delayed audit record beats a reverted operation), but
// they are escalated loudly because a lost record breaks traceability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::workflow::operation::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Transition,
    Inspection,
    Override,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Claimed,
    Resumed,
    Paused,
    Completed,
    Accepted,
    Rejected,
    BlockOverridden,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub action: AuditAction,
    pub spool_id: String,
    pub actor_id: String,
    pub actor_name: String,
    pub operation: Option<Operation>,
    /// When the operation itself happened, as opposed to when the event was
    /// recorded; backfilled entries can differ from `timestamp`.
    pub operation_date: Option<DateTime<Utc>>,
    pub payload: serde_json::Value,
}

impl AuditEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        spool_id: &str,
        actor_id: &str,
        actor_name: &str,
        kind: EventKind,
        action: AuditAction,
        operation: Option<Operation>,
        operation_date: Option<DateTime<Utc>>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            action,
            spool_id: spool_id.to_string(),
            actor_id: actor_id.to_string(),
            actor_name: actor_name.to_string(),
            operation,
            operation_date,
            payload,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), AuditError>;

    /// Ordered event history for one spool, oldest first. Returned as a
    /// structured list; callers must not re-wrap or re-parse it.
    async fn events_for(&self, spool_id: &str) -> Result<Vec<AuditEvent>, AuditError>;
}

#[derive(Default)]
pub struct InMemoryAuditLog {
    events: RwLock<Vec<AuditEvent>>,
    fail_appends: AtomicBool,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent appends fail, for exercising the degraded path.
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, event: AuditEvent) -> Result<(), AuditError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(AuditError::Unavailable("injected outage".to_string()));
        }
        self.events.write().await.push(event);
        Ok(())
    }

    async fn events_for(&self, spool_id: &str) -> Result<Vec<AuditEvent>, AuditError> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|event| event.spool_id == spool_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(spool_id: &str, action: AuditAction) -> AuditEvent {
        AuditEvent::new(
            spool_id,
            "o.diaz",
            "Olga Diaz",
            EventKind::Transition,
            action,
            Some(Operation::Weld),
            None,
            serde_json::Value::Null,
        )
    }

    #[tokio::test]
    async fn history_is_per_spool_and_ordered() {
        let log = InMemoryAuditLog::new();
        log.append(event("SP-1", AuditAction::Claimed)).await.unwrap();
        log.append(event("SP-2", AuditAction::Claimed)).await.unwrap();
        log.append(event("SP-1", AuditAction::Paused)).await.unwrap();

        let history = log.events_for("SP-1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, AuditAction::Claimed);
        assert_eq!(history[1].action, AuditAction::Paused);
    }

    #[tokio::test]
    async fn injected_failure_surfaces_on_append() {
        let log = InMemoryAuditLog::new();
        log.set_fail_appends(true);
        assert!(log.append(event("SP-1", AuditAction::Claimed)).await.is_err());
        assert!(log.is_empty().await);
    }

    #[test]
    fn events_serialize_with_snake_case_fields() {
        let json = serde_json::to_value(event("SP-1", AuditAction::Claimed)).unwrap();
        assert_eq!(json["action"], "claimed");
        assert_eq!(json["kind"], "transition");
        assert_eq!(json["operation"], "weld");
    }
}
