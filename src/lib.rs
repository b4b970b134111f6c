// Spooltrack - fabrication occupation & state-transition core
//
// Exposes the claim/lock protocol, the optimistic write path against the
// shared spool sheet, the per-operation state machines, and the audit log
// that backs them. The HTTP surface and UI live in separate services and
// consume this crate through SpoolCoordinator.

pub mod audit;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod lock;
pub mod metrics;
pub mod notify;
pub mod store;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use audit::{AuditAction, AuditEvent, AuditLog, EventKind, InMemoryAuditLog};
pub use config::SpoolTrackConfig;
pub use coordinator::{
    Actor, ClaimOutcome, InspectionVerdict, SpoolCoordinator, TransitionOutcome,
};
pub use error::CoreError;
pub use lock::{HolderToken, InMemoryLockStore, LockStore};
pub use metrics::{StoreMetrics, StoreStats};
pub use notify::{StatusFeed, StatusUpdate};
pub use store::{
    InMemoryStore, OptimisticWriter, RateLimitedStore, RecordStore, SpoolRecord, StoreError,
};
pub use telemetry::{create_claim_span, generate_correlation_id, init_telemetry};
pub use workflow::{
    combined_status, Operation, OperationMachine, OperationState, ReworkPolicy, ReworkStanding,
    TransitionError,
};
