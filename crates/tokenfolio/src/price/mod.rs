mod sources;

use crate::amount::parse_usable_price;
use crate::cache::CacheLayer;
use crate::config::{ChainProfile, FolioConfig};
use bigdecimal::BigDecimal;
use serde::Serialize;
use sources::{PriceHttp, Quote};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Key segment used for the chain's native asset.
pub const NATIVE_KEY: &str = "native";

pub fn price_key(chain: &str, token: &str) -> String {
    format!("price:{chain}:{token}")
}

pub fn name_key(chain: &str, token: &str) -> String {
    format!("name:{chain}:{token}")
}

/// A price source that yielded nothing usable, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

/// Outcome of one lookup. `price: None` means "unpriced", which is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceResolution {
    pub price: Option<BigDecimal>,
    pub name: Option<String>,
    /// Served from cache without any live call.
    pub cached: bool,
    pub failures: Vec<SourceFailure>,
}

impl PriceResolution {
    fn unpriced(failures: Vec<SourceFailure>) -> Self {
        Self {
            price: None,
            name: None,
            cached: false,
            failures,
        }
    }

    fn live(q: Quote, failures: Vec<SourceFailure>) -> Self {
        Self {
            price: Some(q.price),
            name: q.name,
            cached: false,
            failures,
        }
    }
}

/// Read-through price lookup: cache first, then the chain's price sources in order.
pub struct PriceResolver {
    http: PriceHttp,
    cache: Arc<CacheLayer>,
    ttl: Duration,
}

impl PriceResolver {
    pub fn new(cfg: &FolioConfig, cache: Arc<CacheLayer>) -> eyre::Result<Self> {
        Ok(Self {
            http: PriceHttp::new(&cfg.http)?,
            cache,
            ttl: Duration::from_secs(cfg.cache.price_ttl_seconds),
        })
    }

    /// Both keys must be present; a lone price or a lone name counts as a miss.
    async fn cached(&self, chain: &str, token: &str) -> Option<PriceResolution> {
        let pk = price_key(chain, token);
        let nk = name_key(chain, token);
        let (price, name) = tokio::join!(self.cache.get(&pk), self.cache.get(&nk));
        let (Some(price), Some(name)) = (price, name) else {
            return None;
        };
        let Some(price) = parse_usable_price(&price) else {
            warn!(chain, token, cached = %price, "ignoring unusable cached price");
            return None;
        };
        Some(PriceResolution {
            price: Some(price),
            name: (!name.is_empty()).then_some(name),
            cached: true,
            failures: vec![],
        })
    }

    /// A missing name is stored as an empty string so the next lookup still hits.
    async fn remember(&self, chain: &str, token: &str, q: &Quote) {
        let pk = price_key(chain, token);
        let nk = name_key(chain, token);
        let price = q.price.to_plain_string();
        let name = q.name.as_deref().unwrap_or_default();
        tokio::join!(
            self.cache.set(&pk, &price, self.ttl),
            self.cache.set(&nk, name, self.ttl)
        );
    }

    pub async fn resolve(&self, profile: &ChainProfile, token: &str) -> PriceResolution {
        let chain = profile.name.as_str();
        let token = profile.normalize_token(token);
        if let Some(hit) = self.cached(chain, &token).await {
            debug!(chain, token = %token, "price cache hit");
            return hit;
        }

        let mut failures = Vec::new();
        for &source in &profile.price_sources {
            match self.http.quote(source, profile, &token).await {
                Ok(Some(q)) => {
                    self.remember(chain, &token, &q).await;
                    return PriceResolution::live(q, failures);
                }
                Ok(None) => {
                    debug!(chain, token = %token, source = source.as_str(), "no usable price from source");
                    failures.push(SourceFailure {
                        source: source.as_str().to_owned(),
                        error: "no matching pair with a usable price".into(),
                    });
                }
                Err(e) => {
                    warn!(chain, token = %token, source = source.as_str(), error = %format!("{e:#}"), "price source failed");
                    failures.push(SourceFailure {
                        source: source.as_str().to_owned(),
                        error: format!("{e:#}"),
                    });
                }
            }
        }
        PriceResolution::unpriced(failures)
    }

    /// Native asset price from Binance, cached under the `native` token segment.
    pub async fn resolve_native(&self, profile: &ChainProfile) -> PriceResolution {
        let chain = profile.name.as_str();
        if let Some(hit) = self.cached(chain, NATIVE_KEY).await {
            return hit;
        }
        let Some(symbol) = profile.native.binance_symbol.as_deref() else {
            return PriceResolution::unpriced(vec![]);
        };
        match self.http.binance(symbol).await {
            Ok(Some(price)) => {
                let q = Quote {
                    price,
                    name: Some(profile.native.name.clone()),
                };
                self.remember(chain, NATIVE_KEY, &q).await;
                PriceResolution::live(q, vec![])
            }
            Ok(None) => PriceResolution::unpriced(vec![SourceFailure {
                source: "binance".into(),
                error: format!("unusable price for {symbol}"),
            }]),
            Err(e) => {
                warn!(chain, symbol, error = %format!("{e:#}"), "native price lookup failed");
                PriceResolution::unpriced(vec![SourceFailure {
                    source: "binance".into(),
                    error: format!("{e:#}"),
                }])
            }
        }
    }
}
