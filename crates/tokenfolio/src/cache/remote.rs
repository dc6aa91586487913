use crate::retry::with_timeout;
use eyre::Context as _;
use redis::{aio::ConnectionManager, AsyncCommands as _};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Redis tier. One long-lived [`ConnectionManager`] (which reconnects on its own); this
/// wrapper only tracks availability so callers short-circuit while the backend is down.
pub struct RemoteCache {
    conn: ConnectionManager,
    available: AtomicBool,
    /// Milliseconds since `epoch` before which no reconnect probe is attempted.
    retry_at_ms: AtomicU64,
    epoch: Instant,
    op_timeout: Duration,
    reconnect_interval: Duration,
}

impl RemoteCache {
    pub async fn connect(
        url: &str,
        op_timeout: Duration,
        reconnect_interval: Duration,
    ) -> eyre::Result<Self> {
        let client = redis::Client::open(url).context("parse redis url")?;
        let conn = with_timeout(op_timeout, "redis connect", async {
            ConnectionManager::new(client)
                .await
                .context("connect redis")
        })
        .await?;
        Ok(Self {
            conn,
            available: AtomicBool::new(true),
            retry_at_ms: AtomicU64::new(0),
            epoch: Instant::now(),
            op_timeout,
            reconnect_interval,
        })
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn push_retry_deadline(&self) {
        let interval = u64::try_from(self.reconnect_interval.as_millis()).unwrap_or(u64::MAX);
        self.retry_at_ms
            .store(self.elapsed_ms().saturating_add(interval), Ordering::Relaxed);
    }

    pub fn mark_unavailable(&self, error: &eyre::Report) {
        if self.available.swap(false, Ordering::Relaxed) {
            warn!(error = %format!("{error:#}"), "redis cache unavailable; using in-memory tier");
        }
        self.push_retry_deadline();
    }

    /// Whether the tier may be used right now. While unavailable, at most one `PING` probe
    /// is sent per reconnect interval.
    pub async fn ensure_available(&self) -> bool {
        if self.available.load(Ordering::Relaxed) {
            return true;
        }
        if self.elapsed_ms() < self.retry_at_ms.load(Ordering::Relaxed) {
            return false;
        }
        self.push_retry_deadline();

        let mut conn = self.conn.clone();
        let probe = with_timeout(self.op_timeout, "redis PING", async move {
            redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .context("PING")
        })
        .await;
        match probe {
            Ok(_) => {
                self.available.store(true, Ordering::Relaxed);
                info!("redis cache reachable again");
                true
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "redis reconnect probe failed");
                false
            }
        }
    }

    pub async fn get(&self, key: &str) -> eyre::Result<Option<String>> {
        let mut conn = self.conn.clone();
        with_timeout(self.op_timeout, "redis GET", async move {
            let v: Option<String> = conn.get(key).await.context("GET")?;
            Ok(v)
        })
        .await
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> eyre::Result<()> {
        let mut conn = self.conn.clone();
        let seconds = ttl.as_secs().max(1);
        with_timeout(self.op_timeout, "redis SET", async move {
            let () = conn
                .set_ex(key, value, seconds)
                .await
                .context("SET EX")?;
            Ok(())
        })
        .await
    }
}
