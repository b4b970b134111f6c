// Distributed Claim Lock - per-spool TTL mutex
//
// The lock serializes claim-transition sequences before any durable write
// happens. It is a gate, not a queue: whoever acquires first wins, everyone
// else gets an immediate rejection. The TTL is the only protection against
// a crashed holder, so it is set conservatively (default one hour).

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Identifies one holder of a claim lock.
///
/// Release and re-acquire match on the worker component only: the request id
/// makes tokens unique in logs and in the backing store, but a worker may
/// release a lock they took under an earlier request (pause and complete
/// arrive as separate requests from the same worker). A different worker can
/// never release or steal the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderToken {
    pub worker_id: String,
    pub request_id: Uuid,
}

impl HolderToken {
    pub fn new(worker_id: &str) -> Self {
        Self {
            worker_id: worker_id.to_string(),
            request_id: Uuid::new_v4(),
        }
    }

    pub fn same_worker(&self, other: &HolderToken) -> bool {
        self.worker_id == other.worker_id
    }
}

impl fmt::Display for HolderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.worker_id, self.request_id)
    }
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait LockStore: Send + Sync {
    /// Take the lock for `key`. Returns true iff no unexpired lock exists or
    /// the same worker already holds it (re-acquire resets the TTL).
    async fn try_acquire(
        &self,
        key: &str,
        token: &HolderToken,
        ttl: Duration,
    ) -> Result<bool, LockError>;

    /// Drop the lock. Returns true iff a lock held by the same worker was
    /// released; a mismatched holder leaves the lock untouched.
    async fn release(&self, key: &str, token: &HolderToken) -> Result<bool, LockError>;

    /// Current unexpired holder, if any. Diagnostic use only.
    async fn holder(&self, key: &str) -> Result<Option<HolderToken>, LockError>;
}

struct LockEntry {
    token: HolderToken,
    expires_at: Instant,
}

/// Shared in-process lock store. Production deployments put this behind a
/// network service shared by all request handlers; the semantics are the
/// same either way.
#[derive(Default)]
pub struct InMemoryLockStore {
    entries: Mutex<HashMap<String, LockEntry>>,
    unavailable: AtomicBool,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the lock store going away. While set, every call errors and
    /// callers must fail closed.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), LockError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LockError::Unavailable("injected outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn try_acquire(
        &self,
        key: &str,
        token: &HolderToken,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        if let Some(entry) = entries.get(key) {
            if entry.expires_at > now && !entry.token.same_worker(token) {
                debug!(key, holder = %entry.token, "lock held by another worker");
                return Ok(false);
            }
        }

        entries.insert(
            key.to_string(),
            LockEntry {
                token: token.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release(&self, key: &str, token: &HolderToken) -> Result<bool, LockError> {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        match entries.get(key) {
            Some(entry) if entry.expires_at > now && entry.token.same_worker(token) => {
                entries.remove(key);
                Ok(true)
            }
            Some(entry) if entry.expires_at <= now => {
                // Expired entries are garbage regardless of who asks.
                entries.remove(key);
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    async fn holder(&self, key: &str) -> Result<Option<HolderToken>, LockError> {
        self.check_available()?;
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.token.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn first_acquire_wins_second_worker_rejected() {
        let store = InMemoryLockStore::new();
        let a = HolderToken::new("o.diaz");
        let b = HolderToken::new("k.osei");

        assert!(store.try_acquire("SP-1", &a, TTL).await.unwrap());
        assert!(!store.try_acquire("SP-1", &b, TTL).await.unwrap());
    }

    #[tokio::test]
    async fn same_worker_reacquires_under_new_request() {
        let store = InMemoryLockStore::new();
        let claim = HolderToken::new("o.diaz");
        let pause = HolderToken::new("o.diaz");

        assert!(store.try_acquire("SP-1", &claim, TTL).await.unwrap());
        assert!(store.try_acquire("SP-1", &pause, TTL).await.unwrap());
        assert!(store.release("SP-1", &pause).await.unwrap());
        assert!(store.holder("SP-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn release_by_other_worker_is_refused() {
        let store = InMemoryLockStore::new();
        let a = HolderToken::new("o.diaz");
        let b = HolderToken::new("k.osei");

        store.try_acquire("SP-1", &a, TTL).await.unwrap();
        assert!(!store.release("SP-1", &b).await.unwrap());
        assert_eq!(
            store.holder("SP-1").await.unwrap().map(|t| t.worker_id),
            Some("o.diaz".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lock_no_longer_blocks_acquire() {
        let store = InMemoryLockStore::new();
        let a = HolderToken::new("o.diaz");
        let b = HolderToken::new("k.osei");

        store
            .try_acquire("SP-1", &a, Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(store.holder("SP-1").await.unwrap().is_none());
        assert!(store.try_acquire("SP-1", &b, TTL).await.unwrap());
    }

    #[tokio::test]
    async fn outage_surfaces_as_error_not_false() {
        let store = InMemoryLockStore::new();
        store.set_unavailable(true);
        let token = HolderToken::new("o.diaz");
        assert!(matches!(
            store.try_acquire("SP-1", &token, TTL).await,
            Err(LockError::Unavailable(_))
        ));
    }
}
