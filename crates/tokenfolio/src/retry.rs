use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FailoverConfig {
    /// Number of full rounds. Each round tries every item once.
    pub rounds: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Random jitter (`0..=jitter_max_ms`) added to each backoff sleep.
    pub jitter_max_ms: u64,
    /// Upper bound for a single attempt; an elapsed attempt counts as a failure.
    pub attempt_timeout: Duration,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            rounds: 1,
            base_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(4),
            jitter_max_ms: 250,
            attempt_timeout: Duration::from_secs(8),
        }
    }
}

/// A failed attempt against the item at `index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub index: usize,
    pub error: String,
}

fn compute_backoff_delay(cfg: &FailoverConfig, round: usize) -> Duration {
    let shift = u32::try_from(round.min(16)).unwrap_or(16_u32);
    let pow2 = 1_u64.checked_shl(shift).unwrap_or(u64::MAX);
    let base_ms = u64::try_from(cfg.base_delay.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(cfg.max_delay.as_millis()).unwrap_or(u64::MAX);
    let ms = base_ms.saturating_mul(pow2).min(max_ms);
    let jitter = if cfg!(test) || cfg.jitter_max_ms == 0 {
        0
    } else {
        // Avoid holding a non-Send RNG across await points.
        let range = cfg.jitter_max_ms.saturating_add(1);
        rand::random::<u64>() % range
    };
    Duration::from_millis(ms.saturating_add(jitter))
}

/// Await `fut` for at most `limit`. Elapsing is reported as an ordinary error.
pub async fn with_timeout<T, Fut>(limit: Duration, label: &str, fut: Fut) -> eyre::Result<T>
where
    Fut: Future<Output = eyre::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => eyre::bail!("{label}: timed out after {}ms", limit.as_millis()),
    }
}

/// Try `op(item)` across all items in order, starting at `start` and wrapping around, for
/// `rounds` rounds. The first success is returned immediately; no later item is touched.
///
/// Between rounds, sleep with exponential backoff + jitter, but only after every item has
/// failed. On exhaustion every attempt is returned, in the order it was made.
pub async fn try_in_order<I, T, Fut>(
    items: &[I],
    start: usize,
    cfg: &FailoverConfig,
    mut op: impl FnMut(&I) -> Fut + Send,
) -> Result<T, Vec<Attempt>>
where
    I: Sync,
    Fut: Future<Output = eyre::Result<T>> + Send,
{
    let mut attempts = Vec::new();
    if items.is_empty() || cfg.rounds == 0 {
        return Err(attempts);
    }

    for round in 0..cfg.rounds {
        for offset in 0..items.len() {
            let index = (start + offset) % items.len();
            let Some(item) = items.get(index) else {
                continue;
            };
            match with_timeout(cfg.attempt_timeout, "attempt", op(item)).await {
                Ok(v) => return Ok(v),
                Err(e) => attempts.push(Attempt {
                    index,
                    error: format!("{e:#}"),
                }),
            }
        }

        if round + 1 < cfg.rounds {
            tokio::time::sleep(compute_backoff_delay(cfg, round)).await;
        }
    }

    Err(attempts)
}
