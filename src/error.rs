// Error taxonomy for the occupation core.
//
// Conflict, invalid-transition and not-authorized are expected business
// outcomes and stay distinct so the routing layer can map each to its own
// response; they are never collapsed into a generic failure.

use thiserror::Error;

use crate::store::StoreError;
use crate::workflow::TransitionError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("spool '{0}' not found")]
    SpoolNotFound(String),

    /// Another worker holds the claim lock. Immediate rejection; there is
    /// no queueing.
    #[error("spool '{spool_id}' is already occupied by '{holder}'")]
    Occupied { spool_id: String, holder: String },

    /// Optimistic writes exhausted their retries against a faster writer.
    #[error("write conflict on spool '{spool_id}': concurrent writers exhausted retries")]
    WriteConflict { spool_id: String },

    #[error("invalid transition on spool '{spool_id}': {source}")]
    InvalidTransition {
        spool_id: String,
        #[source]
        source: TransitionError,
    },

    #[error("worker '{actor}' not authorized on spool '{spool_id}': {reason}")]
    NotAuthorized {
        spool_id: String,
        actor: String,
        reason: String,
    },

    /// A backing service is unreachable. Claims fail closed on this; it is
    /// retryable from the caller's side.
    #[error("{dependency} unavailable: {reason}")]
    DependencyUnavailable {
        dependency: &'static str,
        reason: String,
    },
}

impl CoreError {
    /// Conflict-class errors mean "someone else has it" rather than
    /// "something broke"; callers retry or tell the worker to pick another
    /// spool.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CoreError::Occupied { .. } | CoreError::WriteConflict { .. }
        )
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RowNotFound(id) => CoreError::SpoolNotFound(id),
            // The optimistic writer only lets a mismatch out once its
            // retries are spent.
            StoreError::RevisionMismatch { spool_id, .. } => CoreError::WriteConflict { spool_id },
            StoreError::Unavailable(reason) => CoreError::DependencyUnavailable {
                dependency: "record store",
                reason,
            },
        }
    }
}
