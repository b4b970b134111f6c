// Workflow Module - per-operation state machines and derived views
//
// Machines are transient: hydrated from the row per request, driven through
// one transition, and discarded. Only their field-write effects persist.

pub mod hydration;
pub mod operation;
pub mod rework;
pub mod state_machine;
pub mod status;

pub use hydration::hydrate;
pub use operation::Operation;
pub use rework::{ReworkPolicy, ReworkStanding, DEFAULT_CYCLE_LIMIT};
pub use state_machine::{
    OperationEvent, OperationMachine, OperationState, TransitionEffects, TransitionError,
};
pub use status::combined_status;
