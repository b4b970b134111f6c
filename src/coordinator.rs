// Spool Coordinator - composition root of the occupation core
//
// Control flow per mutating request: claim lock acquired -> durable row
// re-read (cache bypassed) -> machine hydrated -> transition validated and
// executed -> one optimistic write batch (status included) -> audit append
// -> push-update fan-out. The lock is retained while the spool stays
// occupied and released on pause/complete.
//
// All shared state is injected; nothing here is ambient or static.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Instrument};

use crate::audit::{AuditAction, AuditEvent, AuditError, AuditLog, EventKind};
use crate::config::SpoolTrackConfig;
use crate::error::CoreError;
use crate::lock::{HolderToken, LockError, LockStore};
use crate::notify::{StatusFeed, StatusUpdate};
use crate::store::record::SpoolRecord;
use crate::store::{apply_updates, columns, ColumnUpdates, OptimisticWriter, RecordStore, RowData};
use crate::telemetry::{create_claim_span, generate_correlation_id};
use crate::workflow::{
    combined_status, Operation, OperationEvent, OperationMachine, OperationState, ReworkPolicy,
    ReworkStanding, TransitionError,
};

/// The worker behind a request. Roster management lives outside the core;
/// identity arrives resolved from the routing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub name: String,
}

impl Actor {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectionVerdict {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimOutcome {
    pub new_status: String,
    /// True when the claim resumed a paused operation.
    pub resumed: bool,
    /// True when the transition landed but its audit record did not.
    pub audit_degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub new_status: String,
    pub audit_degraded: bool,
}

pub struct SpoolCoordinator {
    store: Arc<dyn RecordStore>,
    writer: OptimisticWriter,
    locks: Arc<dyn LockStore>,
    lock_ttl: Duration,
    audit: Arc<dyn AuditLog>,
    feed: StatusFeed,
    rework: ReworkPolicy,
}

impl SpoolCoordinator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        locks: Arc<dyn LockStore>,
        audit: Arc<dyn AuditLog>,
        config: &SpoolTrackConfig,
    ) -> Self {
        let writer = OptimisticWriter::new(store.clone(), config.writes.clone());
        Self {
            store,
            writer,
            locks,
            lock_ttl: Duration::from_secs(config.lock.ttl_seconds),
            audit,
            feed: StatusFeed::default(),
            rework: ReworkPolicy::new(config.rework.cycle_limit),
        }
    }

    /// Feed of occupation/status changes for real-time viewers.
    pub fn status_feed(&self) -> &StatusFeed {
        &self.feed
    }

    /// Take the live claim on one operation of a spool. On success the
    /// claim lock stays held until the same worker pauses or completes.
    pub async fn claim(
        &self,
        spool_id: &str,
        operation: Operation,
        actor: &Actor,
    ) -> Result<ClaimOutcome, CoreError> {
        let correlation_id = generate_correlation_id();
        let span = create_claim_span("claim", spool_id, &actor.id, &correlation_id);
        async move {
            let token = HolderToken::new(&actor.id);
            self.acquire_or_conflict(spool_id, &token).await?;

            match self.claim_locked(spool_id, operation, actor).await {
                Ok(outcome) => {
                    info!(
                        spool_id,
                        operation = %operation,
                        worker = %actor.id,
                        resumed = outcome.resumed,
                        status = %outcome.new_status,
                        "spool claimed"
                    );
                    Ok(outcome)
                }
                Err(err) => {
                    // A failed claim leaves nothing occupied; do not keep
                    // the gate shut behind it.
                    self.release_quietly(spool_id, &token).await;
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Step away from an in-progress operation, leaving it resumable.
    pub async fn pause(
        &self,
        spool_id: &str,
        operation: Operation,
        actor: &Actor,
    ) -> Result<TransitionOutcome, CoreError> {
        let correlation_id = generate_correlation_id();
        let span = create_claim_span("pause", spool_id, &actor.id, &correlation_id);
        async move {
            let token = HolderToken::new(&actor.id);
            self.acquire_or_conflict(spool_id, &token).await?;

            let result = self.pause_locked(spool_id, operation, actor).await;
            self.settle_lock(spool_id, &token, &result).await;
            result
        }
        .instrument(span)
        .await
    }

    /// Finish an operation. Only the recorded assignee may complete.
    /// Completing the inspection operation is shorthand for an acceptance
    /// verdict.
    pub async fn complete(
        &self,
        spool_id: &str,
        operation: Operation,
        actor: &Actor,
    ) -> Result<TransitionOutcome, CoreError> {
        if operation == Operation::Inspect {
            return self
                .record_inspection(spool_id, actor, InspectionVerdict::Accepted, None)
                .await;
        }

        let correlation_id = generate_correlation_id();
        let span = create_claim_span("complete", spool_id, &actor.id, &correlation_id);
        async move {
            let token = HolderToken::new(&actor.id);
            self.acquire_or_conflict(spool_id, &token).await?;

            let result = self.complete_locked(spool_id, operation, actor).await;
            self.settle_lock(spool_id, &token, &result).await;
            result
        }
        .instrument(span)
        .await
    }

    /// Record an inspection verdict. Acceptance completes the spool and
    /// closes any open rework loop; rejection resets the inspection and
    /// opens the next rework cycle, or blocks the spool at the limit.
    pub async fn record_inspection(
        &self,
        spool_id: &str,
        actor: &Actor,
        verdict: InspectionVerdict,
        notes: Option<String>,
    ) -> Result<TransitionOutcome, CoreError> {
        let correlation_id = generate_correlation_id();
        let span = create_claim_span("inspection", spool_id, &actor.id, &correlation_id);
        async move {
            let token = HolderToken::new(&actor.id);
            self.acquire_or_conflict(spool_id, &token).await?;

            let result = self
                .inspection_locked(spool_id, actor, verdict, notes)
                .await;
            self.settle_lock(spool_id, &token, &result).await;
            result
        }
        .instrument(span)
        .await
    }

    /// Manual override clearing a blocked spool so it can re-enter the
    /// rework loop. Supervisor action; the override event is the reset, so
    /// its audit append is mandatory here, not best-effort.
    pub async fn override_block(
        &self,
        spool_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> Result<TransitionOutcome, CoreError> {
        let correlation_id = generate_correlation_id();
        let span = create_claim_span("override", spool_id, &actor.id, &correlation_id);
        async move {
            let token = HolderToken::new(&actor.id);
            self.acquire_or_conflict(spool_id, &token).await?;

            let result = self.override_locked(spool_id, actor, reason).await;
            self.release_quietly(spool_id, &token).await;
            result
        }
        .instrument(span)
        .await
    }

    /// Materialized combined status for one spool.
    pub async fn current_status(&self, spool_id: &str) -> Result<String, CoreError> {
        let row = self.store.fetch_row(spool_id).await?;
        let record = SpoolRecord::from_row(spool_id, &row);
        if record.status.is_empty() {
            // Rows migrated from before the status column existed.
            let standing = self.standing(spool_id).await?;
            return Ok(combined_status(&record, &standing));
        }
        Ok(record.status)
    }

    /// Ordered audit history for one spool, oldest first.
    pub async fn history(&self, spool_id: &str) -> Result<Vec<AuditEvent>, CoreError> {
        self.audit
            .events_for(spool_id)
            .await
            .map_err(audit_unavailable)
    }

    async fn claim_locked(
        &self,
        spool_id: &str,
        operation: Operation,
        actor: &Actor,
    ) -> Result<ClaimOutcome, CoreError> {
        let mut row = self.store.fetch_row_uncached(spool_id).await?;
        let record = SpoolRecord::from_row(spool_id, &row);
        let standing = self.standing(spool_id).await?;

        self.check_claimable(operation, &record, &standing)
            .map_err(|source| CoreError::InvalidTransition {
                spool_id: spool_id.to_string(),
                source,
            })?;

        let mut machine = OperationMachine::hydrated(operation, &record);
        let resumed = machine.state() == Some(OperationState::Paused);

        let now = Utc::now();
        let event = OperationEvent::Claim {
            worker: actor.id.clone(),
            at: now,
        };
        let effects = machine
            .handle(&event)
            .map_err(|err| transition_error(spool_id, err))?;

        let new_status = self
            .persist(spool_id, &mut row, effects.writes, &standing)
            .await?;

        let action = if resumed {
            AuditAction::Resumed
        } else {
            AuditAction::Claimed
        };
        let audit_degraded = self
            .append_audit(AuditEvent::new(
                spool_id,
                &actor.id,
                &actor.name,
                EventKind::Transition,
                action,
                Some(operation),
                Some(now),
                json!({ "resumed": resumed }),
            ))
            .await;

        self.publish(spool_id, &new_status, Some(actor.id.clone()));
        Ok(ClaimOutcome {
            new_status,
            resumed,
            audit_degraded,
        })
    }

    async fn pause_locked(
        &self,
        spool_id: &str,
        operation: Operation,
        actor: &Actor,
    ) -> Result<TransitionOutcome, CoreError> {
        let mut row = self.store.fetch_row_uncached(spool_id).await?;
        let record = SpoolRecord::from_row(spool_id, &row);

        // Only the live occupant may pause; the assignee check on complete
        // does not apply here because a paused spool has no occupant.
        if record.occupied_by.as_deref() != Some(actor.id.as_str()) {
            return Err(CoreError::NotAuthorized {
                spool_id: spool_id.to_string(),
                actor: actor.id.clone(),
                reason: "only the current occupant may pause".to_string(),
            });
        }

        let standing = self.standing(spool_id).await?;
        let mut machine = OperationMachine::hydrated(operation, &record);
        let effects = machine
            .handle(&OperationEvent::Pause)
            .map_err(|err| transition_error(spool_id, err))?;

        let new_status = self
            .persist(spool_id, &mut row, effects.writes, &standing)
            .await?;

        let audit_degraded = self
            .append_audit(AuditEvent::new(
                spool_id,
                &actor.id,
                &actor.name,
                EventKind::Transition,
                AuditAction::Paused,
                Some(operation),
                Some(Utc::now()),
                serde_json::Value::Null,
            ))
            .await;

        self.publish(spool_id, &new_status, None);
        Ok(TransitionOutcome {
            new_status,
            audit_degraded,
        })
    }

    async fn complete_locked(
        &self,
        spool_id: &str,
        operation: Operation,
        actor: &Actor,
    ) -> Result<TransitionOutcome, CoreError> {
        let mut row = self.store.fetch_row_uncached(spool_id).await?;
        let record = SpoolRecord::from_row(spool_id, &row);
        let standing = self.standing(spool_id).await?;

        let mut machine = OperationMachine::hydrated(operation, &record);
        let now = Utc::now();
        let event = OperationEvent::Complete {
            worker: actor.id.clone(),
            at: now,
        };
        let effects = machine
            .handle(&event)
            .map_err(|err| transition_error(spool_id, err))?;

        let new_status = self
            .persist(spool_id, &mut row, effects.writes, &standing)
            .await?;

        let audit_degraded = self
            .append_audit(AuditEvent::new(
                spool_id,
                &actor.id,
                &actor.name,
                EventKind::Transition,
                AuditAction::Completed,
                Some(operation),
                Some(now),
                serde_json::Value::Null,
            ))
            .await;

        self.publish(spool_id, &new_status, None);
        Ok(TransitionOutcome {
            new_status,
            audit_degraded,
        })
    }

    async fn inspection_locked(
        &self,
        spool_id: &str,
        actor: &Actor,
        verdict: InspectionVerdict,
        notes: Option<String>,
    ) -> Result<TransitionOutcome, CoreError> {
        let mut row = self.store.fetch_row_uncached(spool_id).await?;
        let record = SpoolRecord::from_row(spool_id, &row);
        let standing = self.standing(spool_id).await?;

        let mut machine = OperationMachine::hydrated(Operation::Inspect, &record);
        let now = Utc::now();

        let (effects, next_standing, action) = match verdict {
            InspectionVerdict::Accepted => {
                let effects = machine
                    .handle(&OperationEvent::Complete {
                        worker: actor.id.clone(),
                        at: now,
                    })
                    .map_err(|err| transition_error(spool_id, err))?;
                let next = ReworkStanding {
                    cycles: 0,
                    limit: standing.limit,
                };
                (effects.writes, next, AuditAction::Accepted)
            }
            InspectionVerdict::Rejected => {
                let effects = machine
                    .handle(&OperationEvent::Reject {
                        worker: actor.id.clone(),
                        at: now,
                    })
                    .map_err(|err| transition_error(spool_id, err))?;
                let mut writes = effects.writes;
                // Open a fresh rework cycle: the previous cycle's rework
                // columns would otherwise satisfy the re-inspection gate.
                writes.push((Operation::Rework.assignee_column().to_string(), None));
                writes.push((Operation::Rework.started_column().to_string(), None));
                writes.push((Operation::Rework.completed_column().to_string(), None));
                let next = ReworkStanding {
                    cycles: standing.cycles + 1,
                    limit: standing.limit,
                };
                (writes, next, AuditAction::Rejected)
            }
        };

        let new_status = self
            .persist(spool_id, &mut row, effects, &next_standing)
            .await?;

        let audit_degraded = self
            .append_audit(AuditEvent::new(
                spool_id,
                &actor.id,
                &actor.name,
                EventKind::Inspection,
                action,
                Some(Operation::Inspect),
                Some(now),
                json!({
                    "verdict": match verdict {
                        InspectionVerdict::Accepted => "accepted",
                        InspectionVerdict::Rejected => "rejected",
                    },
                    "notes": notes,
                }),
            ))
            .await;

        if next_standing.blocked() {
            warn!(
                spool_id,
                rejections = next_standing.cycles,
                "spool blocked after repeated rejections"
            );
        }

        self.publish(spool_id, &new_status, None);
        Ok(TransitionOutcome {
            new_status,
            audit_degraded,
        })
    }

    async fn override_locked(
        &self,
        spool_id: &str,
        actor: &Actor,
        reason: &str,
    ) -> Result<TransitionOutcome, CoreError> {
        let mut row = self.store.fetch_row_uncached(spool_id).await?;
        let standing = self.standing(spool_id).await?;

        if !standing.blocked() {
            return Err(CoreError::InvalidTransition {
                spool_id: spool_id.to_string(),
                source: TransitionError::NotBlocked,
            });
        }

        // The override event itself is what resets the derived cycle count,
        // so this append is load-bearing and its failure fails the request.
        self.audit
            .append(AuditEvent::new(
                spool_id,
                &actor.id,
                &actor.name,
                EventKind::Override,
                AuditAction::BlockOverridden,
                None,
                Some(Utc::now()),
                json!({ "reason": reason }),
            ))
            .await
            .map_err(audit_unavailable)?;

        let next_standing = ReworkStanding {
            cycles: 0,
            limit: standing.limit,
        };
        let new_status = self
            .persist(spool_id, &mut row, Vec::new(), &next_standing)
            .await?;

        info!(spool_id, supervisor = %actor.id, reason, "rework block overridden");
        self.publish(spool_id, &new_status, None);
        Ok(TransitionOutcome {
            new_status,
            audit_degraded: false,
        })
    }

    /// Claim gates that live above the per-operation machine: release
    /// prerequisite, operation ordering, and the rework loop standing.
    fn check_claimable(
        &self,
        operation: Operation,
        record: &SpoolRecord,
        standing: &ReworkStanding,
    ) -> Result<(), TransitionError> {
        if standing.blocked() {
            return Err(TransitionError::UnitBlocked {
                rejections: standing.cycles,
            });
        }

        if operation == Operation::Fitup && record.released.is_none() {
            return Err(TransitionError::PrerequisiteIncomplete {
                operation,
                prerequisite: "release".to_string(),
            });
        }

        if operation == Operation::Rework && standing.cycles == 0 {
            return Err(TransitionError::NotAwaitingRework);
        }

        if let Some(prerequisite) = operation.prerequisite() {
            if record.slot(prerequisite).completed.is_none() {
                return Err(TransitionError::PrerequisiteIncomplete {
                    operation,
                    prerequisite: prerequisite.label().to_string(),
                });
            }
        }

        // During an open rework cycle the re-inspection waits for rework.
        if operation == Operation::Inspect
            && standing.cycles > 0
            && record.slot(Operation::Rework).completed.is_none()
        {
            return Err(TransitionError::PrerequisiteIncomplete {
                operation,
                prerequisite: Operation::Rework.label().to_string(),
            });
        }

        Ok(())
    }

    /// Apply the transition's writes plus the recomputed status in one
    /// optimistic batch, and keep the local row view in step. The revision
    /// from the hydration read covers the first write attempt, so the
    /// uncontended path costs no extra read against the remote budget.
    async fn persist(
        &self,
        spool_id: &str,
        row: &mut RowData,
        mut writes: ColumnUpdates,
        standing: &ReworkStanding,
    ) -> Result<String, CoreError> {
        let snapshot_revision = row.get(columns::REVISION).cloned();
        apply_updates(row, &writes);
        let record = SpoolRecord::from_row(spool_id, row);
        let status = combined_status(&record, standing);
        writes.push((columns::STATUS.to_string(), Some(status.clone())));

        let new_revision = self
            .writer
            .update_with_retry(spool_id, writes, snapshot_revision)
            .await?;
        row.insert(columns::STATUS.to_string(), status.clone());
        row.insert(columns::REVISION.to_string(), new_revision);
        Ok(status)
    }

    async fn standing(&self, spool_id: &str) -> Result<ReworkStanding, CoreError> {
        let events = self
            .audit
            .events_for(spool_id)
            .await
            .map_err(audit_unavailable)?;
        Ok(self.rework.standing(&events))
    }

    /// Acquire the claim lock or fail with a conflict naming the holder.
    /// An unreachable lock store fails closed: the claim is refused, never
    /// assumed.
    async fn acquire_or_conflict(
        &self,
        spool_id: &str,
        token: &HolderToken,
    ) -> Result<(), CoreError> {
        let acquired = self
            .locks
            .try_acquire(spool_id, token, self.lock_ttl)
            .await
            .map_err(lock_unavailable)?;
        if acquired {
            return Ok(());
        }

        let holder = match self.locks.holder(spool_id).await {
            Ok(Some(holder)) => holder.worker_id,
            _ => "another worker".to_string(),
        };
        Err(CoreError::Occupied {
            spool_id: spool_id.to_string(),
            holder,
        })
    }

    /// Post-transition lock bookkeeping for pause/complete/inspection:
    /// release on success (the occupation session is over) and on
    /// authorization failures (the caller never legitimately held it);
    /// keep it on transient failures so the worker can retry inside their
    /// session.
    async fn settle_lock<T>(
        &self,
        spool_id: &str,
        token: &HolderToken,
        result: &Result<T, CoreError>,
    ) {
        let release = match result {
            Ok(_) => true,
            Err(CoreError::NotAuthorized { .. }) | Err(CoreError::InvalidTransition { .. }) => true,
            Err(_) => false,
        };
        if release {
            self.release_quietly(spool_id, token).await;
        }
    }

    async fn release_quietly(&self, spool_id: &str, token: &HolderToken) {
        match self.locks.release(spool_id, token).await {
            Ok(true) => {}
            Ok(false) => warn!(spool_id, holder = %token, "lock already gone on release"),
            Err(err) => warn!(spool_id, error = %err, "lock release failed; TTL will clean up"),
        }
    }

    async fn append_audit(&self, event: AuditEvent) -> bool {
        let spool_id = event.spool_id.clone();
        let action = event.action;
        if let Err(err) = self.audit.append(event).await {
            // Policy: a finished transition is never rolled back for a
            // missing audit record, but the gap must be operator-visible.
            error!(
                spool_id,
                action = ?action,
                error = %err,
                "audit write degraded: transition record lost"
            );
            return true;
        }
        false
    }

    fn publish(&self, spool_id: &str, status: &str, occupied_by: Option<String>) {
        self.feed.publish(StatusUpdate {
            spool_id: spool_id.to_string(),
            status: status.to_string(),
            occupied_by,
        });
    }
}

fn transition_error(spool_id: &str, err: TransitionError) -> CoreError {
    match err {
        TransitionError::NotAssignee {
            operation,
            actor,
            assignee,
        } => CoreError::NotAuthorized {
            spool_id: spool_id.to_string(),
            actor,
            reason: format!("recorded {operation} assignee is '{assignee}'"),
        },
        other => CoreError::InvalidTransition {
            spool_id: spool_id.to_string(),
            source: other,
        },
    }
}

fn lock_unavailable(err: LockError) -> CoreError {
    let LockError::Unavailable(reason) = err;
    CoreError::DependencyUnavailable {
        dependency: "lock store",
        reason,
    }
}

fn audit_unavailable(err: AuditError) -> CoreError {
    let AuditError::Unavailable(reason) = err;
    CoreError::DependencyUnavailable {
        dependency: "audit log",
        reason,
    }
}
