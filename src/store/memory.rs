// In-memory record store. Backs the test suites and local single-process
// runs; implements the same conditional-write contract as the remote
// adapter, including revision checking and fault injection.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

use super::client::{apply_updates, ColumnUpdates, RecordStore, RowData, StoreError};
use super::columns;

#[derive(Default)]
pub struct InMemoryStore {
    rows: RwLock<HashMap<String, RowData>>,
    unavailable: AtomicBool,
    write_attempts: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row directly, bypassing the write protocol. Test setup only.
    pub async fn seed_row(&self, spool_id: &str, mut row: RowData) {
        row.insert(columns::SPOOL_ID.to_string(), spool_id.to_string());
        row.entry(columns::REVISION.to_string())
            .or_insert_with(|| uuid::Uuid::new_v4().to_string());
        self.rows.write().await.insert(spool_id.to_string(), row);
    }

    /// Simulate the backing store going away. While set, every call returns
    /// [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of conditional write attempts seen, including rejected ones.
    pub fn write_attempts(&self) -> u64 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    pub async fn row_snapshot(&self, spool_id: &str) -> Option<RowData> {
        self.rows.read().await.get(spool_id).cloned()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn fetch_row(&self, spool_id: &str) -> Result<RowData, StoreError> {
        self.check_available()?;
        self.rows
            .read()
            .await
            .get(spool_id)
            .cloned()
            .ok_or_else(|| StoreError::RowNotFound(spool_id.to_string()))
    }

    async fn write_columns(
        &self,
        spool_id: &str,
        updates: &ColumnUpdates,
        expected_revision: Option<&str>,
        new_revision: &str,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        self.write_attempts.fetch_add(1, Ordering::SeqCst);

        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(spool_id)
            .ok_or_else(|| StoreError::RowNotFound(spool_id.to_string()))?;

        if let Some(expected) = expected_revision {
            let found = row.get(columns::REVISION).cloned().unwrap_or_default();
            if found != expected {
                return Err(StoreError::RevisionMismatch {
                    spool_id: spool_id.to_string(),
                    expected: expected.to_string(),
                    found,
                });
            }
        }

        apply_updates(row, updates);
        row.insert(columns::REVISION.to_string(), new_revision.to_string());
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        let mut ids: Vec<String> = self.rows.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
