// Per-operation state machine.
//
// One machine instance is hydrated per request from the spool row, handles
// exactly one event, and is discarded. Nothing here touches the store:
// transitions return the column writes they require and the coordinator
// applies them through the optimistic writer.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::record::SpoolRecord;
use crate::store::{columns, dates, ColumnUpdates};

use super::hydration::hydrate;
use super::operation::Operation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    InProgress,
    Paused,
    Completed,
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperationState::Pending => "pending",
            OperationState::InProgress => "in progress",
            OperationState::Paused => "paused",
            OperationState::Completed => "completed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationEvent {
    /// Take or resume the operation. Also covers resuming a paused unit.
    Claim { worker: String, at: DateTime<Utc> },
    /// Step away without finishing; the operation stays resumable.
    Pause,
    /// Finish the operation.
    Complete { worker: String, at: DateTime<Utc> },
    /// Inspection verdict against the work; only valid for `Inspect`.
    /// Resets the operation so it can be re-run after rework.
    Reject { worker: String, at: DateTime<Utc> },
}

impl OperationEvent {
    fn name(&self) -> &'static str {
        match self {
            OperationEvent::Claim { .. } => "claim",
            OperationEvent::Pause => "pause",
            OperationEvent::Complete { .. } => "complete",
            OperationEvent::Reject { .. } => "reject",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// The machine was constructed but never activated with a hydrated
    /// state. This is a bug in the calling code, not a workflow condition.
    #[error("operation machine used before activation")]
    NotActivated,

    #[error("cannot {event} {operation}: operation is {state}")]
    Invalid {
        operation: Operation,
        event: &'static str,
        state: OperationState,
    },

    #[error("worker '{actor}' is not the recorded assignee ('{assignee}') for {operation}")]
    NotAssignee {
        operation: Operation,
        actor: String,
        assignee: String,
    },

    #[error("cannot claim {operation}: {prerequisite} is not complete")]
    PrerequisiteIncomplete {
        operation: Operation,
        prerequisite: String,
    },

    #[error("spool is blocked after {rejections} rejections; manual override required")]
    UnitBlocked { rejections: u32 },

    #[error("cannot claim rework: spool has no open rejection")]
    NotAwaitingRework,

    #[error("cannot override: spool is not blocked")]
    NotBlocked,

    #[error("{0} verdicts only apply to inspection")]
    VerdictOutsideInspection(&'static str),
}

/// Column writes produced by one transition.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TransitionEffects {
    pub writes: ColumnUpdates,
}

/// Transient per-request machine. Activation is a two-step affair by
/// construction: `new` leaves the state unset and every transition on an
/// unactivated machine fails with [`TransitionError::NotActivated`]. Use
/// [`OperationMachine::hydrated`] which performs both steps together.
#[derive(Debug)]
pub struct OperationMachine {
    operation: Operation,
    state: Option<OperationState>,
    assignee: Option<String>,
    occupant: Option<String>,
    started: Option<DateTime<Utc>>,
}

impl OperationMachine {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            state: None,
            assignee: None,
            occupant: None,
            started: None,
        }
    }

    pub fn activate(&mut self, state: OperationState) {
        self.state = Some(state);
    }

    /// Construct and activate from the current row in one step, so callers
    /// cannot forget activation.
    pub fn hydrated(operation: Operation, record: &SpoolRecord) -> Self {
        let state = hydrate(operation, record);
        let slot = record.slot(operation);

        // In the recovered-claim case (occupant set, assignee column never
        // written) the occupant is the de facto assignee; adopting it here
        // lets the ownership checks and the healing writes below work
        // unchanged.
        let assignee = slot.assignee.clone().or_else(|| {
            if state == OperationState::InProgress {
                record.occupied_by.clone()
            } else {
                None
            }
        });

        let mut machine = Self {
            operation,
            state: None,
            assignee,
            occupant: record.occupied_by.clone(),
            started: slot.started,
        };
        machine.activate(state);
        machine
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn state(&self) -> Option<OperationState> {
        self.state
    }

    pub fn assignee(&self) -> Option<&str> {
        self.assignee.as_deref()
    }

    pub fn occupant(&self) -> Option<&str> {
        self.occupant.as_deref()
    }

    /// Validate and execute one transition, returning the field writes it
    /// requires. Invalid moves name the attempted transition and the
    /// current state.
    pub fn handle(&mut self, event: &OperationEvent) -> Result<TransitionEffects, TransitionError> {
        let state = self.state.ok_or(TransitionError::NotActivated)?;

        match (state, event) {
            (OperationState::Pending, OperationEvent::Claim { worker, at })
            | (OperationState::Paused, OperationEvent::Claim { worker, at }) => {
                self.enter_in_progress(worker, *at)
            }

            (OperationState::InProgress, OperationEvent::Pause) => self.enter_paused(),

            (OperationState::InProgress, OperationEvent::Complete { worker, at }) => {
                self.check_assignee(worker)?;
                self.enter_completed(worker, *at)
            }

            (OperationState::InProgress, OperationEvent::Reject { worker, at }) => {
                if self.operation != Operation::Inspect {
                    return Err(TransitionError::VerdictOutsideInspection(event.name()));
                }
                self.check_assignee(worker)?;
                self.reset_after_rejection(*at)
            }

            (state, event) => Err(TransitionError::Invalid {
                operation: self.operation,
                event: event.name(),
                state,
            }),
        }
    }

    fn check_assignee(&self, worker: &str) -> Result<(), TransitionError> {
        match self.assignee.as_deref() {
            Some(assignee) if assignee != worker => Err(TransitionError::NotAssignee {
                operation: self.operation,
                actor: worker.to_string(),
                assignee: assignee.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn enter_in_progress(
        &mut self,
        worker: &str,
        at: DateTime<Utc>,
    ) -> Result<TransitionEffects, TransitionError> {
        let mut writes: ColumnUpdates = vec![
            (columns::OCCUPIED_BY.to_string(), Some(worker.to_string())),
            (columns::OCCUPIED_AT.to_string(), Some(dates::to_wire(at))),
            // A resume re-assigns the operation to whoever picks it up;
            // attribution follows the worker who carries it to completion.
            (
                self.operation.assignee_column().to_string(),
                Some(worker.to_string()),
            ),
        ];
        // The start timestamp is written once and survives pause/resume.
        if self.started.is_none() {
            writes.push((
                self.operation.started_column().to_string(),
                Some(dates::to_wire(at)),
            ));
            self.started = Some(at);
        }

        self.occupant = Some(worker.to_string());
        self.assignee = Some(worker.to_string());
        self.state = Some(OperationState::InProgress);
        Ok(TransitionEffects { writes })
    }

    fn enter_paused(&mut self) -> Result<TransitionEffects, TransitionError> {
        let mut writes: ColumnUpdates = vec![
            (columns::OCCUPIED_BY.to_string(), None),
            (columns::OCCUPIED_AT.to_string(), None),
        ];
        // Re-writing the assignee is a no-op for healthy rows and repairs
        // rows recovered from a crash between the occupant and assignee
        // writes.
        if let Some(assignee) = &self.assignee {
            writes.push((
                self.operation.assignee_column().to_string(),
                Some(assignee.clone()),
            ));
        }

        self.occupant = None;
        self.state = Some(OperationState::Paused);
        Ok(TransitionEffects { writes })
    }

    fn enter_completed(
        &mut self,
        worker: &str,
        at: DateTime<Utc>,
    ) -> Result<TransitionEffects, TransitionError> {
        let writes: ColumnUpdates = vec![
            (
                self.operation.completed_column().to_string(),
                Some(dates::to_wire(at)),
            ),
            (
                self.operation.assignee_column().to_string(),
                Some(worker.to_string()),
            ),
            (columns::OCCUPIED_BY.to_string(), None),
            (columns::OCCUPIED_AT.to_string(), None),
        ];

        self.occupant = None;
        self.state = Some(OperationState::Completed);
        Ok(TransitionEffects { writes })
    }

    fn reset_after_rejection(
        &mut self,
        _at: DateTime<Utc>,
    ) -> Result<TransitionEffects, TransitionError> {
        // A rejected inspection never happened as far as the row is
        // concerned; the verdict lives in the audit log. Clearing the slot
        // makes re-inspection claimable once rework lands.
        let writes: ColumnUpdates = vec![
            (self.operation.assignee_column().to_string(), None),
            (self.operation.started_column().to_string(), None),
            (self.operation.completed_column().to_string(), None),
            (columns::OCCUPIED_BY.to_string(), None),
            (columns::OCCUPIED_AT.to_string(), None),
        ];

        self.occupant = None;
        self.assignee = None;
        self.started = None;
        self.state = Some(OperationState::Pending);
        Ok(TransitionEffects { writes })
    }
}
