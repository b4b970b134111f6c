// Optimistic-write protocol tests: transparent retry after losing a race,
// bounded retry exhaustion, and concurrent writers converging without lost
// updates.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use spooltrack::config::WriteRetryConfig;
use spooltrack::store::client::{ColumnUpdates, RecordStore, RowData, StoreError};
use spooltrack::store::columns;
use spooltrack::{InMemoryStore, OptimisticWriter};

fn fast_retry() -> WriteRetryConfig {
    WriteRetryConfig {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 5,
    }
}

/// Delegates to an in-memory store but slips a competing write in front of
/// the first `count` conditional writes, so the caller deterministically
/// loses those races.
struct ContendedStore {
    inner: Arc<InMemoryStore>,
    remaining_contentions: AtomicU32,
}

impl ContendedStore {
    fn new(inner: Arc<InMemoryStore>, contentions: u32) -> Self {
        Self {
            inner,
            remaining_contentions: AtomicU32::new(contentions),
        }
    }
}

#[async_trait]
impl RecordStore for ContendedStore {
    async fn fetch_row(&self, spool_id: &str) -> Result<RowData, StoreError> {
        self.inner.fetch_row(spool_id).await
    }

    async fn write_columns(
        &self,
        spool_id: &str,
        updates: &ColumnUpdates,
        expected_revision: Option<&str>,
        new_revision: &str,
    ) -> Result<(), StoreError> {
        let contend = self
            .remaining_contentions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if contend {
            let competitor: ColumnUpdates = vec![(
                columns::DRAWING_NO.to_string(),
                Some("competitor-write".to_string()),
            )];
            self.inner
                .write_columns(spool_id, &competitor, None, "rev-competitor")
                .await?;
        }
        self.inner
            .write_columns(spool_id, updates, expected_revision, new_revision)
            .await
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_ids().await
    }
}

#[tokio::test]
async fn losing_one_race_retries_transparently() {
    let inner = Arc::new(InMemoryStore::new());
    inner.seed_row("SP-1", RowData::new()).await;
    let store = Arc::new(ContendedStore::new(inner.clone(), 1));

    let writer = OptimisticWriter::new(store, fast_retry());
    writer
        .update_with_retry(
            "SP-1",
            vec![(columns::STATUS.to_string(), Some("complete".to_string()))],
            None,
        )
        .await
        .unwrap();

    let snapshot = inner.row_snapshot("SP-1").await.unwrap();
    // Both the competitor's write and ours landed; nothing was lost.
    assert_eq!(snapshot[columns::DRAWING_NO], "competitor-write");
    assert_eq!(snapshot[columns::STATUS], "complete");
    // Competitor write + our rejected attempt + our retry.
    assert_eq!(inner.write_attempts(), 3);
}

#[tokio::test]
async fn retries_are_bounded_and_surface_a_conflict() {
    let inner = Arc::new(InMemoryStore::new());
    inner.seed_row("SP-1", RowData::new()).await;
    // More contention than the retry budget tolerates.
    let store = Arc::new(ContendedStore::new(inner.clone(), 10));

    let writer = OptimisticWriter::new(store, fast_retry());
    let err = writer
        .update_with_retry(
            "SP-1",
            vec![(columns::STATUS.to_string(), Some("complete".to_string()))],
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::RevisionMismatch { .. }));
    let snapshot = inner.row_snapshot("SP-1").await.unwrap();
    assert!(!snapshot.contains_key(columns::STATUS));
}

#[tokio::test]
async fn concurrent_writers_both_land_without_lost_updates() {
    let inner = Arc::new(InMemoryStore::new());
    inner.seed_row("SP-1", RowData::new()).await;

    let writer_a = OptimisticWriter::new(inner.clone(), fast_retry());
    let writer_b = OptimisticWriter::new(inner.clone(), fast_retry());

    let (a, b) = futures::join!(
        writer_a.update_with_retry(
            "SP-1",
            vec![(columns::FITUP_BY.to_string(), Some("o.diaz".to_string()))],
            None,
        ),
        writer_b.update_with_retry(
            "SP-1",
            vec![(columns::WELD_BY.to_string(), Some("k.osei".to_string()))],
            None,
        ),
    );
    a.unwrap();
    b.unwrap();

    let snapshot = inner.row_snapshot("SP-1").await.unwrap();
    assert_eq!(snapshot[columns::FITUP_BY], "o.diaz");
    assert_eq!(snapshot[columns::WELD_BY], "k.osei");
}

#[tokio::test]
async fn each_write_stamps_a_fresh_revision() {
    let inner = Arc::new(InMemoryStore::new());
    inner.seed_row("SP-1", RowData::new()).await;
    let writer = OptimisticWriter::new(inner.clone(), fast_retry());

    let first = writer
        .update_with_retry(
            "SP-1",
            vec![(columns::FITUP_BY.to_string(), Some("o.diaz".to_string()))],
            None,
        )
        .await
        .unwrap();
    let second = writer
        .update_with_retry(
            "SP-1",
            vec![(columns::FITUP_DONE.to_string(), Some("2024-01-12".to_string()))],
            None,
        )
        .await
        .unwrap();

    assert_ne!(first, second);
    let snapshot = inner.row_snapshot("SP-1").await.unwrap();
    assert_eq!(snapshot[columns::REVISION], second);
}
