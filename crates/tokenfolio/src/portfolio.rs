use crate::cache::CacheLayer;
use crate::chains::WalletAddress;
use crate::config::{ChainProfile, FolioConfig};
use crate::errors::{FolioError, TokenIssue};
use crate::fetcher::{BalanceFetcher, PricedToken};
use crate::price::PriceResolver;
use bigdecimal::BigDecimal;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// One wallet's valued holdings on one chain at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSnapshot {
    pub chain: String,
    pub wallet: String,
    pub endpoint: String,
    pub tokens: Vec<PricedToken>,
    /// Sum of every priced `usd_value`; unpriced tokens count as zero.
    pub total_usd_value: BigDecimal,
    /// Configured tokens that did not come back with a balance.
    pub not_found: Vec<String>,
    pub issues: Vec<TokenIssue>,
    pub fetched_at_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPrice {
    pub chain: String,
    pub token: String,
    pub price: Option<BigDecimal>,
    pub name: Option<String>,
    pub cached: bool,
}

pub struct Portfolio {
    cfg: FolioConfig,
    fetcher: BalanceFetcher,
}

fn total_value(tokens: &[PricedToken]) -> BigDecimal {
    tokens
        .iter()
        .filter_map(|t| t.usd_value.as_ref())
        .fold(BigDecimal::from(0_u8), |acc, v| acc + v)
}

fn not_found(profile: &ChainProfile, tokens: &[PricedToken]) -> Vec<String> {
    profile
        .unique_tokens()
        .into_iter()
        .filter(|configured| {
            !tokens
                .iter()
                .any(|t| !t.balance.native && t.balance.token == *configured)
        })
        .collect()
}

impl Portfolio {
    pub fn new(cfg: FolioConfig, cache: Arc<CacheLayer>) -> eyre::Result<Self> {
        let prices = PriceResolver::new(&cfg, cache)?;
        let fetcher = BalanceFetcher::new(&cfg, prices);
        Ok(Self { cfg, fetcher })
    }

    pub fn profile(&self, chain: &str) -> Result<&ChainProfile, FolioError> {
        self.cfg
            .chain(chain)
            .ok_or_else(|| FolioError::UnknownChain(chain.to_owned()))
    }

    /// Fetch, price and total one wallet's holdings.
    ///
    /// Fails only for an unknown chain, a malformed wallet, or when no endpoint answers.
    pub async fn snapshot(&self, chain: &str, wallet: &str) -> Result<PortfolioSnapshot, FolioError> {
        let profile = self.profile(chain)?;
        let address = WalletAddress::parse(profile, wallet)?;
        let fetched = self.fetcher.fetch(profile, &address).await?;

        let total_usd_value = total_value(&fetched.tokens);
        let missing = not_found(profile, &fetched.tokens);
        info!(
            chain = %profile.name,
            wallet = %address,
            found = fetched.tokens.len(),
            not_found = missing.len(),
            issues = fetched.issues.len(),
            total_usd = %total_usd_value,
            "portfolio snapshot"
        );
        Ok(PortfolioSnapshot {
            chain: profile.name.clone(),
            wallet: address.to_string(),
            endpoint: fetched.endpoint,
            tokens: fetched.tokens,
            total_usd_value,
            not_found: missing,
            issues: fetched.issues,
            fetched_at_ms: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Current price of every configured token on `chain` (or every chain), cache first.
    pub async fn token_prices(&self, chain: Option<&str>) -> Result<Vec<TokenPrice>, FolioError> {
        let profiles: Vec<&ChainProfile> = match chain {
            Some(c) => vec![self.profile(c)?],
            None => self.cfg.chains.values().collect(),
        };
        let pairs: Vec<(&ChainProfile, String)> = profiles
            .iter()
            .flat_map(|p| p.unique_tokens().into_iter().map(move |t| (*p, t)))
            .collect();

        // Same batching as balance reads: one batch of lookups in flight at a time.
        let mut out = Vec::with_capacity(pairs.len());
        for batch in pairs.chunks(self.cfg.fetch.batch_size.max(1)) {
            let lookups = batch.iter().map(|(p, token)| async move {
                let res = self.fetcher.prices().resolve(p, token).await;
                TokenPrice {
                    chain: p.name.clone(),
                    token: token.clone(),
                    price: res.price,
                    name: res.name,
                    cached: res.cached,
                }
            });
            out.extend(join_all(lookups).await);
        }
        Ok(out)
    }
}
