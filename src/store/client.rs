// Durable record store boundary.
//
// The production backend is a remote tabular store reached over a
// rate-limited HTTP API. The core never talks to it directly; everything
// goes through this trait so tests can substitute the in-memory backend.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// One row of the sheet, keyed by column name. Absent keys and empty-string
/// values both mean "blank cell".
pub type RowData = HashMap<String, String>;

/// A batch of column mutations. `None` clears the cell.
pub type ColumnUpdates = Vec<(String, Option<String>)>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row '{0}' not found")]
    RowNotFound(String),

    /// The revision token changed between our read and the write attempt;
    /// another writer won the race.
    #[error("revision check failed for '{spool_id}': expected {expected:?}, found {found:?}")]
    RevisionMismatch {
        spool_id: String,
        expected: String,
        found: String,
    },

    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read a row. Implementations may serve this from a cache.
    async fn fetch_row(&self, spool_id: &str) -> Result<RowData, StoreError>;

    /// Read a row, bypassing any cache. The optimistic write path uses this
    /// after a revision conflict, when the cached view is known stale.
    async fn fetch_row_uncached(&self, spool_id: &str) -> Result<RowData, StoreError> {
        self.fetch_row(spool_id).await
    }

    /// Conditionally apply `updates` and stamp `new_revision` onto the row.
    ///
    /// When `expected_revision` is given, the write must fail with
    /// [`StoreError::RevisionMismatch`] if the row's revision no longer
    /// matches. The backend re-checks at write time; this is the only
    /// concurrency primitive the remote store offers.
    async fn write_columns(
        &self,
        spool_id: &str,
        updates: &ColumnUpdates,
        expected_revision: Option<&str>,
        new_revision: &str,
    ) -> Result<(), StoreError>;

    async fn list_ids(&self) -> Result<Vec<String>, StoreError>;
}

/// Apply a batch of updates to a local row copy. Used to keep an in-process
/// view consistent with what was just written without spending a read
/// against the remote budget.
pub fn apply_updates(row: &mut RowData, updates: &ColumnUpdates) {
    for (column, value) in updates {
        match value {
            Some(v) => {
                row.insert(column.clone(), v.clone());
            }
            None => {
                row.remove(column);
            }
        }
    }
}
