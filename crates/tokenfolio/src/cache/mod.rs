//! Best-effort key/value cache with TTL.
//!
//! Two optional tiers sit behind one `get`/`set` contract: a remote Redis tier and a bounded
//! in-memory tier. Neither operation ever returns an error; an unreachable backend reads as a
//! miss and swallows writes.

mod memory;
mod remote;

use crate::config::CacheConfig;
use memory::MemoryCache;
use remote::RemoteCache;
use std::time::Duration;
use tracing::{info, warn};

pub struct CacheLayer {
    local: Option<MemoryCache>,
    remote: Option<RemoteCache>,
}

impl CacheLayer {
    /// Open the configured tiers. A Redis backend that cannot be reached at startup is
    /// disabled for the rest of the process; this never fails.
    pub async fn connect(cfg: &CacheConfig) -> Self {
        let local = (cfg.memory_capacity > 0).then(|| MemoryCache::new(cfg.memory_capacity));
        let remote = match cfg.redis_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => {
                match RemoteCache::connect(
                    url,
                    Duration::from_millis(cfg.op_timeout_ms),
                    Duration::from_secs(cfg.reconnect_interval_seconds),
                )
                .await
                {
                    Ok(r) => {
                        info!("redis cache connected");
                        Some(r)
                    }
                    Err(e) => {
                        warn!(error = %format!("{e:#}"), "redis cache disabled; continuing without it");
                        None
                    }
                }
            }
            _ => None,
        };
        Self { local, remote }
    }

    #[cfg(test)]
    pub fn memory_only(capacity: usize) -> Self {
        Self {
            local: Some(MemoryCache::new(capacity)),
            remote: None,
        }
    }

    #[cfg(test)]
    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        if let Some(r) = &self.remote {
            if r.ensure_available().await {
                match r.get(key).await {
                    Ok(Some(v)) => return Some(v),
                    Ok(None) => {}
                    Err(e) => r.mark_unavailable(&e),
                }
            }
        }
        self.local.as_ref().and_then(|l| l.get(key))
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Duration) {
        if let Some(l) = &self.local {
            l.set(key, value, ttl);
        }
        if let Some(r) = &self.remote {
            if r.ensure_available().await {
                if let Err(e) = r.set(key, value, ttl).await {
                    r.mark_unavailable(&e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeRedis;

    #[tokio::test]
    async fn memory_only_round_trip() {
        let c = CacheLayer::memory_only(16);
        assert_eq!(c.get("price:bsc:0xabc").await, None, "empty cache misses");
        c.set("price:bsc:0xabc", "0.25", Duration::from_secs(300))
            .await;
        assert_eq!(c.get("price:bsc:0xabc").await, Some("0.25".to_owned()), "hit after set");
    }

    #[tokio::test]
    async fn unreachable_redis_degrades_to_memory_tier() {
        let cfg = CacheConfig {
            // Nothing listens on port 1.
            redis_url: Some("redis://127.0.0.1:1/".into()),
            op_timeout_ms: 500,
            ..CacheConfig::default()
        };
        let c = CacheLayer::connect(&cfg).await;
        assert!(!c.has_remote(), "remote tier disabled after failed connect");
        c.set("name:solana:mint", "Token", Duration::from_secs(60))
            .await;
        assert_eq!(c.get("name:solana:mint").await, Some("Token".to_owned()), "memory tier serves");
    }

    #[tokio::test]
    async fn runtime_redis_errors_fall_back_to_memory_until_ping_recovers() -> eyre::Result<()> {
        let redis = FakeRedis::start().await?;
        let cfg = CacheConfig {
            redis_url: Some(redis.url()),
            op_timeout_ms: 1_000,
            reconnect_interval_seconds: 1,
            ..CacheConfig::default()
        };
        let c = CacheLayer::connect(&cfg).await;
        assert!(c.has_remote(), "fake redis accepted the connection");

        let ttl = Duration::from_secs(60);
        c.set("price:base:0xa", "1.5", ttl).await;
        assert_eq!(redis.stored("price:base:0xa").as_deref(), Some("1.5"), "written through to redis");

        redis.set_failing(true);
        assert_eq!(
            c.get("price:base:0xa").await.as_deref(),
            Some("1.5"),
            "remote error reads from the memory tier"
        );

        // Inside the reconnect interval nothing reaches redis, not even a PING.
        let (commands, pings) = (redis.commands(), redis.pings());
        c.set("price:base:0xb", "2", ttl).await;
        assert_eq!(c.get("price:base:0xb").await.as_deref(), Some("2"), "memory tier serves writes");
        assert_eq!(c.get("price:base:0xa").await.as_deref(), Some("1.5"), "memory tier serves reads");
        assert_eq!(redis.commands(), commands, "no commands while marked unavailable");
        assert_eq!(redis.pings(), pings, "no PING before the interval elapses");
        assert_eq!(redis.stored("price:base:0xb"), None, "write skipped the remote tier");

        redis.set_failing(false);
        redis.insert("name:base:0xc", "Remote Only");
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(
            c.get("name:base:0xc").await.as_deref(),
            Some("Remote Only"),
            "successful PING restores the remote tier"
        );
        assert_eq!(redis.pings(), pings + 1, "exactly one PING after the interval");

        c.set("price:base:0xd", "3", ttl).await;
        assert_eq!(redis.stored("price:base:0xd").as_deref(), Some("3"), "writes reach redis again");
        Ok(())
    }

    #[tokio::test]
    async fn no_tiers_is_a_silent_no_op() {
        let cfg = CacheConfig {
            memory_capacity: 0,
            ..CacheConfig::default()
        };
        let c = CacheLayer::connect(&cfg).await;
        c.set("k", "v", Duration::from_secs(60)).await;
        assert_eq!(c.get("k").await, None, "nothing is stored");
    }
}
