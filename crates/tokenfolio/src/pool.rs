use crate::chains::Connection;
use crate::config::{ChainProfile, FolioConfig, PoolStrategy};
use crate::errors::{EndpointFailure, FolioError};
use crate::retry::{try_in_order, FailoverConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Hands out a probed [`Connection`] per request. Nothing is pooled between acquisitions;
/// the only state is the per-chain round-robin cursor.
pub struct EndpointPool {
    strategy: PoolStrategy,
    probe: FailoverConfig,
    rpc_timeout: Duration,
    cursors: HashMap<String, AtomicUsize>,
}

/// Trimmed, deduplicated endpoint list in configured order.
fn candidate_urls(profile: &ChainProfile) -> Vec<String> {
    let mut urls: Vec<String> = Vec::with_capacity(profile.rpc_urls.len());
    for u in &profile.rpc_urls {
        let t = u.trim();
        if t.is_empty() || urls.iter().any(|x| x == t) {
            continue;
        }
        urls.push(t.to_owned());
    }
    urls
}

impl EndpointPool {
    pub fn new(cfg: &FolioConfig) -> Self {
        Self {
            strategy: cfg.fetch.pool_strategy,
            probe: FailoverConfig {
                rounds: cfg.fetch.probe_rounds.max(1),
                attempt_timeout: Duration::from_millis(cfg.fetch.probe_timeout_ms),
                ..FailoverConfig::default()
            },
            rpc_timeout: Duration::from_millis(cfg.fetch.rpc_timeout_ms),
            cursors: cfg
                .chains
                .keys()
                .map(|k| (k.clone(), AtomicUsize::new(0)))
                .collect(),
        }
    }

    fn start_index(&self, chain: &str, len: usize) -> usize {
        match self.strategy {
            PoolStrategy::Failover => 0,
            PoolStrategy::RoundRobin => self
                .cursors
                .get(chain)
                .map_or(0, |c| c.fetch_add(1, Ordering::Relaxed) % len.max(1)),
        }
    }

    /// First endpoint (from the strategy's start position) whose liveness probe succeeds.
    /// Later endpoints are never contacted once one answers.
    pub async fn acquire(&self, profile: &ChainProfile) -> Result<Connection, FolioError> {
        let urls = candidate_urls(profile);
        let start = self.start_index(&profile.name, urls.len());
        let kind = profile.kind;
        let rpc_timeout = self.rpc_timeout;
        let chain = profile.name.as_str();

        let res = try_in_order(&urls, start, &self.probe, |url| {
            let url = url.clone();
            async move {
                let probed: eyre::Result<Connection> = async {
                    let conn = Connection::open(kind, &url, rpc_timeout)?;
                    let height = conn.probe().await?;
                    debug!(chain, endpoint = %url, height, "rpc probe ok");
                    Ok(conn)
                }
                .await;
                if let Err(e) = &probed {
                    warn!(chain, endpoint = %url, error = %format!("{e:#}"), "rpc probe failed; trying next endpoint");
                }
                probed
            }
        })
        .await;

        match res {
            Ok(conn) => {
                info!(chain, endpoint = conn.endpoint(), "rpc endpoint selected");
                Ok(conn)
            }
            Err(attempts) => {
                let attempts: Vec<EndpointFailure> = attempts
                    .into_iter()
                    .map(|a| EndpointFailure {
                        endpoint: urls.get(a.index).cloned().unwrap_or_default(),
                        error: a.error,
                    })
                    .collect();
                warn!(chain, attempted = attempts.len(), "no rpc endpoint available");
                Err(FolioError::NoAvailableEndpoint {
                    chain: profile.name.clone(),
                    attempts,
                })
            }
        }
    }
}
