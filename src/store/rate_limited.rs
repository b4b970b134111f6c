// Rate-limited, caching decorator around a record store.
//
// The remote API tolerates roughly 60 writes per minute before throttling
// the whole account, so every write waits on a governor quota. Reads are
// served from a moka cache; every write invalidates the written row so no
// code path can observe its own write as stale. Writes made from inside
// transition callbacks go through the same `write_columns` entry point, so
// invalidation cannot be bypassed.

use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use moka::future::Cache;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use async_trait::async_trait;

use crate::config::StoreConfig;
use crate::metrics::StoreMetrics;

use super::client::{ColumnUpdates, RecordStore, RowData, StoreError};

pub struct RateLimitedStore {
    inner: Arc<dyn RecordStore>,
    write_limiter: DefaultDirectRateLimiter,
    cache: Cache<String, RowData>,
    metrics: Arc<StoreMetrics>,
}

impl RateLimitedStore {
    pub fn new(inner: Arc<dyn RecordStore>, config: &StoreConfig, metrics: Arc<StoreMetrics>) -> Self {
        let per_minute = NonZeroU32::new(config.write_quota_per_minute.max(1))
            .expect("quota clamped to at least 1");
        let burst = NonZeroU32::new(config.write_burst.max(1)).expect("burst clamped to at least 1");
        let quota = Quota::per_minute(per_minute).allow_burst(burst);

        let cache = Cache::builder()
            .max_capacity(config.cache_capacity)
            .time_to_live(Duration::from_secs(config.cache_ttl_seconds))
            .build();

        Self {
            inner,
            write_limiter: RateLimiter::direct(quota),
            cache,
            metrics,
        }
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }
}

#[async_trait]
impl RecordStore for RateLimitedStore {
    async fn fetch_row(&self, spool_id: &str) -> Result<RowData, StoreError> {
        if let Some(row) = self.cache.get(spool_id).await {
            self.metrics.record_cache_hit();
            debug!(spool_id, "row served from cache");
            return Ok(row);
        }
        self.metrics.record_cache_miss();
        self.metrics.record_read();
        let row = self.inner.fetch_row(spool_id).await?;
        self.cache.insert(spool_id.to_string(), row.clone()).await;
        Ok(row)
    }

    async fn fetch_row_uncached(&self, spool_id: &str) -> Result<RowData, StoreError> {
        self.cache.invalidate(spool_id).await;
        self.metrics.record_read();
        let row = self.inner.fetch_row_uncached(spool_id).await?;
        self.cache.insert(spool_id.to_string(), row.clone()).await;
        Ok(row)
    }

    async fn write_columns(
        &self,
        spool_id: &str,
        updates: &ColumnUpdates,
        expected_revision: Option<&str>,
        new_revision: &str,
    ) -> Result<(), StoreError> {
        // `check` consumes the slot when one is free; only an empty quota
        // takes the waiting path.
        if self.write_limiter.check().is_err() {
            self.metrics.record_rate_limit_wait();
            self.write_limiter
                .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
                .await;
        }
        self.metrics.record_write();

        let result = self
            .inner
            .write_columns(spool_id, updates, expected_revision, new_revision)
            .await;

        // Invalidate on failure as well: a rejected conditional write means
        // our cached view was stale.
        self.cache.invalidate(spool_id).await;
        if matches!(result, Err(StoreError::RevisionMismatch { .. })) {
            self.metrics.record_revision_conflict();
        }
        result
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        self.metrics.record_read();
        self.inner.list_ids().await
    }
}
