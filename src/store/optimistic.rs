// Optimistic-concurrency write protocol.
//
// The remote store has no transactions; the revision token is the only
// concurrency primitive. Every mutation is a read-modify-write: read the
// current revision, attempt a conditional write stamped with a fresh token,
// and on a revision conflict re-read and retry a bounded number of times
// with jittered backoff. Exhaustion surfaces as a conflict, never as a
// silent overwrite.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::WriteRetryConfig;

use super::client::{ColumnUpdates, RecordStore, StoreError};
use super::columns;
use super::dates;

pub struct OptimisticWriter {
    store: Arc<dyn RecordStore>,
    config: WriteRetryConfig,
}

impl OptimisticWriter {
    pub fn new(store: Arc<dyn RecordStore>, config: WriteRetryConfig) -> Self {
        Self { store, config }
    }

    /// Apply `updates` to the row, retrying the whole read-modify-write
    /// cycle on revision conflicts. Returns the revision token the winning
    /// write was stamped with.
    ///
    /// A caller that already holds a fresh row snapshot passes its revision
    /// as `expected_revision`; the first attempt then writes without a read.
    /// Retries always re-read, since the snapshot is known stale by then.
    ///
    /// Date-column values are normalized to the canonical wire format here,
    /// regardless of the variant the caller supplied.
    pub async fn update_with_retry(
        &self,
        spool_id: &str,
        updates: ColumnUpdates,
        expected_revision: Option<String>,
    ) -> Result<String, StoreError> {
        let updates = normalize_dates(updates);
        let max_attempts = self.config.max_attempts.max(1);

        let mut snapshot_revision = expected_revision;
        let mut attempt = 0;
        loop {
            attempt += 1;

            let expected = match snapshot_revision.take() {
                Some(revision) => revision,
                None => {
                    let row = self.store.fetch_row_uncached(spool_id).await?;
                    row.get(columns::REVISION).cloned().unwrap_or_default()
                }
            };
            let new_revision = Uuid::new_v4().to_string();

            match self
                .store
                .write_columns(spool_id, &updates, Some(&expected), &new_revision)
                .await
            {
                Ok(()) => {
                    debug!(spool_id, attempt, revision = %new_revision, "row updated");
                    return Ok(new_revision);
                }
                Err(StoreError::RevisionMismatch { .. }) if attempt < max_attempts => {
                    warn!(spool_id, attempt, "lost write race, retrying");
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay_ms.max(1);
        let exp = base.saturating_mul(1u64 << (attempt - 1).min(16));
        let capped = exp.min(self.config.max_delay_ms.max(base));
        let jitter = rand::rng().random_range(0..=capped / 2);
        Duration::from_millis(capped + jitter)
    }
}

fn normalize_dates(updates: ColumnUpdates) -> ColumnUpdates {
    updates
        .into_iter()
        .map(|(column, value)| {
            let value = match value {
                Some(v) if columns::is_date_column(&column) => Some(dates::normalize(&v)),
                other => other,
            };
            (column, value)
        })
        .collect()
}
