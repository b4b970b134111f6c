use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Main configuration structure for spooltrack.
///
/// Loaded from `spooltrack.toml` (optional) with `SPOOLTRACK_*` environment
/// overrides; every field has a default so the core runs with no file at
/// all.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SpoolTrackConfig {
    /// Durable record store settings
    pub store: StoreConfig,
    /// Claim lock settings
    pub lock: LockConfig,
    /// Optimistic write retry policy
    pub writes: WriteRetryConfig,
    /// Rework cycle policy
    pub rework: ReworkConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Write budget against the remote API
    pub write_quota_per_minute: u32,
    /// Burst capacity on top of the steady quota
    pub write_burst: u32,
    /// Read cache time-to-live
    pub cache_ttl_seconds: u64,
    /// Read cache entry capacity
    pub cache_capacity: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            write_quota_per_minute: 60,
            write_burst: 10,
            cache_ttl_seconds: 300,
            cache_capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lock TTL; the only safety net against a crashed holder, so it is
    /// sized well above a realistic single-operation session.
    pub ttl_seconds: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { ttl_seconds: 3600 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WriteRetryConfig {
    /// Read-modify-write attempts before surfacing a conflict
    pub max_attempts: u32,
    /// Base backoff between attempts
    pub base_delay_ms: u64,
    /// Backoff ceiling
    pub max_delay_ms: u64,
}

impl Default for WriteRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReworkConfig {
    /// Consecutive rejections before a spool is blocked
    pub cycle_limit: u32,
}

impl Default for ReworkConfig {
    fn default() -> Self {
        Self { cycle_limit: 3 }
    }
}

impl SpoolTrackConfig {
    pub fn load() -> Result<Self> {
        Self::load_from("spooltrack")
    }

    pub fn load_from(basename: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(basename).required(false))
            .add_source(Environment::with_prefix("SPOOLTRACK").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_shop_budget() {
        let config = SpoolTrackConfig::default();
        assert_eq!(config.store.write_quota_per_minute, 60);
        assert_eq!(config.lock.ttl_seconds, 3600);
        assert_eq!(config.writes.max_attempts, 3);
        assert_eq!(config.rework.cycle_limit, 3);
    }

    #[test]
    fn loads_without_a_config_file() {
        let config = SpoolTrackConfig::load_from("spooltrack-nonexistent").unwrap();
        assert_eq!(config.store.cache_ttl_seconds, 300);
    }
}
