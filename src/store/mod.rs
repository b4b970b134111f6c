// Durable Record Store - column-keyed access to the shared spool sheet
//
// Layering, outermost first: OptimisticWriter (revision-checked retry)
// -> RateLimitedStore (write quota + read cache) -> RecordStore backend.
// Rows are mutated only through the optimistic writer; raw `write_columns`
// calls from anywhere else reintroduce stale-read races.

pub mod client;
pub mod columns;
pub mod dates;
pub mod memory;
pub mod optimistic;
pub mod rate_limited;
pub mod record;

pub use client::{apply_updates, ColumnUpdates, RecordStore, RowData, StoreError};
pub use memory::InMemoryStore;
pub use optimistic::OptimisticWriter;
pub use rate_limited::RateLimitedStore;
pub use record::{OperationSlot, SpoolRecord};
