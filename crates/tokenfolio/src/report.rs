//! Presentation boundary for `portfolio` and `prices` output.
//!
//! This is the only place where unknown prices and values are rendered as zero.

use crate::errors::{EndpointFailure, FolioError, TokenIssue};
use crate::fetcher::PricedToken;
use crate::portfolio::{PortfolioSnapshot, TokenPrice};
use bigdecimal::{BigDecimal, RoundingMode};
use serde::Serialize;

const PRICE_SCALE: i64 = 6;
const VALUE_SCALE: i64 = 2;

fn fixed(v: Option<&BigDecimal>, scale: i64) -> String {
    v.map_or_else(
        || BigDecimal::from(0_u8).with_scale(scale),
        |x| x.with_scale_round(scale, RoundingMode::HalfUp),
    )
    .to_plain_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoundToken {
    pub address: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub amount: String,
    pub usd_price: String,
    pub usd_value: String,
    pub native: bool,
}

impl From<&PricedToken> for FoundToken {
    fn from(t: &PricedToken) -> Self {
        Self {
            address: t.balance.token.clone(),
            symbol: t.balance.symbol.clone(),
            name: t.name.clone(),
            amount: t.balance.amount.to_plain_string(),
            usd_price: fixed(t.price.as_ref(), PRICE_SCALE),
            usd_value: fixed(t.usd_value.as_ref(), VALUE_SCALE),
            native: t.balance.native,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_found: usize,
    pub total_checked: usize,
    pub total_usd_value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    pub found: Vec<FoundToken>,
    pub not_found: Vec<String>,
    pub issues: Vec<TokenIssue>,
    pub summary: Summary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioReport {
    pub success: bool,
    pub chain: String,
    pub wallet: String,
    pub endpoint: String,
    pub fetched_at_ms: i64,
    pub data: ReportData,
}

impl From<&PortfolioSnapshot> for PortfolioReport {
    fn from(s: &PortfolioSnapshot) -> Self {
        let checked = s.tokens.iter().filter(|t| !t.balance.native).count() + s.not_found.len();
        Self {
            success: true,
            chain: s.chain.clone(),
            wallet: s.wallet.clone(),
            endpoint: s.endpoint.clone(),
            fetched_at_ms: s.fetched_at_ms,
            data: ReportData {
                found: s.tokens.iter().map(FoundToken::from).collect(),
                not_found: s.not_found.clone(),
                issues: s.issues.clone(),
                summary: Summary {
                    total_found: s.tokens.len(),
                    total_checked: checked,
                    total_usd_value: fixed(Some(&s.total_usd_value), VALUE_SCALE),
                },
            },
        }
    }
}

/// Request-level failure, rendered in the same envelope as a success.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub success: bool,
    pub chain: String,
    pub wallet: String,
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<EndpointFailure>,
}

impl FailureReport {
    pub fn new(chain: &str, wallet: &str, err: &FolioError) -> Self {
        let attempts = match err {
            FolioError::NoAvailableEndpoint { attempts, .. } => attempts.clone(),
            FolioError::UnknownChain(_) | FolioError::InvalidWallet { .. } => Vec::new(),
        };
        Self {
            success: false,
            chain: chain.to_owned(),
            wallet: wallet.to_owned(),
            error: err.to_string(),
            attempts,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRow {
    pub chain: String,
    pub address: String,
    pub name: Option<String>,
    /// `None` renders as `null`; this listing does not zero-default.
    pub usd_price: Option<String>,
    pub cached: bool,
}

impl From<&TokenPrice> for PriceRow {
    fn from(p: &TokenPrice) -> Self {
        Self {
            chain: p.chain.clone(),
            address: p.token.clone(),
            name: p.name.clone(),
            usd_price: p.price.as_ref().map(|v| fixed(Some(v), PRICE_SCALE)),
            cached: p.cached,
        }
    }
}
