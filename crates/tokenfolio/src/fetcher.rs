use crate::amount::base_units_to_decimal;
use crate::chains::{Connection, WalletAddress};
use crate::config::{ChainProfile, FolioConfig};
use crate::errors::{FolioError, IssueStage, TokenIssue};
use crate::pool::EndpointPool;
use crate::price::{PriceResolution, PriceResolver, NATIVE_KEY};
use bigdecimal::BigDecimal;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

/// A non-zero holding read from chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenBalance {
    /// Normalized token identifier, or `native` for the chain's base asset.
    pub token: String,
    pub amount: BigDecimal,
    /// Raw base-unit amount as a decimal string.
    pub raw: String,
    pub decimals: u8,
    pub symbol: Option<String>,
    pub native: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedToken {
    #[serde(flatten)]
    pub balance: TokenBalance,
    /// Price source name, falling back to the on-chain name.
    pub name: Option<String>,
    pub price: Option<BigDecimal>,
    /// `amount * price`; `None` when unpriced.
    pub usd_value: Option<BigDecimal>,
}

impl PricedToken {
    fn new(balance: TokenBalance, chain_name: Option<String>, res: PriceResolution) -> Self {
        let usd_value = res.price.as_ref().map(|p| &balance.amount * p);
        Self {
            balance,
            name: res.name.or(chain_name),
            price: res.price,
            usd_value,
        }
    }
}

/// Everything one fetch produced for one wallet on one chain.
#[derive(Debug, Clone)]
pub struct ChainFetch {
    pub endpoint: String,
    pub tokens: Vec<PricedToken>,
    pub issues: Vec<TokenIssue>,
}

#[derive(Debug, Default)]
struct TokenOutcome {
    priced: Option<PricedToken>,
    issue: Option<TokenIssue>,
}

fn unpriced_issue(token: &str, res: &PriceResolution) -> Option<TokenIssue> {
    if res.price.is_some() || res.failures.is_empty() {
        return None;
    }
    let detail = res
        .failures
        .iter()
        .map(|f| format!("{}: {}", f.source, f.error))
        .collect::<Vec<_>>()
        .join("; ");
    Some(TokenIssue::new(token, IssueStage::Price, detail))
}

pub struct BalanceFetcher {
    pool: EndpointPool,
    prices: PriceResolver,
    batch_size: usize,
}

impl BalanceFetcher {
    pub fn new(cfg: &FolioConfig, prices: PriceResolver) -> Self {
        Self {
            pool: EndpointPool::new(cfg),
            prices,
            batch_size: cfg.fetch.batch_size.max(1),
        }
    }

    pub fn prices(&self) -> &PriceResolver {
        &self.prices
    }

    /// Native balance plus every configured token with a non-zero balance, priced.
    ///
    /// Only endpoint exhaustion fails the call. Every per-token problem becomes a
    /// [`TokenIssue`] and the token is skipped or left unpriced.
    pub async fn fetch(
        &self,
        profile: &ChainProfile,
        wallet: &WalletAddress,
    ) -> Result<ChainFetch, FolioError> {
        let conn = self.pool.acquire(profile).await?;
        let mut tokens = Vec::new();
        let mut issues = Vec::new();

        let native = self.fetch_native(&conn, profile, wallet).await;
        tokens.extend(native.priced);
        issues.extend(native.issue);

        let list = profile.unique_tokens();
        // Batches run one after another; tokens inside a batch run concurrently.
        for batch in list.chunks(self.batch_size) {
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|t| self.fetch_token(&conn, profile, wallet, t)),
            )
            .await;
            for o in outcomes {
                tokens.extend(o.priced);
                issues.extend(o.issue);
            }
        }

        Ok(ChainFetch {
            endpoint: conn.endpoint().to_owned(),
            tokens,
            issues,
        })
    }

    async fn fetch_native(
        &self,
        conn: &Connection,
        profile: &ChainProfile,
        wallet: &WalletAddress,
    ) -> TokenOutcome {
        let chain = profile.name.as_str();
        let native = &profile.native;
        let raw = match conn.native_balance(wallet).await {
            Ok(v) => v,
            Err(e) => {
                warn!(chain, error = %format!("{e:#}"), "native balance read failed");
                return TokenOutcome {
                    priced: None,
                    issue: Some(TokenIssue::new(
                        NATIVE_KEY,
                        IssueStage::NativeBalance,
                        format!("{e:#}"),
                    )),
                };
            }
        };
        let amount = match base_units_to_decimal(raw, native.decimals) {
            Ok(a) => a,
            Err(e) => {
                return TokenOutcome {
                    priced: None,
                    issue: Some(TokenIssue::new(
                        NATIVE_KEY,
                        IssueStage::Conversion,
                        format!("{e:#}"),
                    )),
                }
            }
        };
        if amount <= native.dust_floor {
            debug!(chain, amount = %amount, "native balance at or below dust floor");
            return TokenOutcome::default();
        }

        let balance = TokenBalance {
            token: NATIVE_KEY.to_owned(),
            amount,
            raw: raw.to_string(),
            decimals: native.decimals,
            symbol: Some(native.symbol.clone()),
            native: true,
        };
        let res = self.prices.resolve_native(profile).await;
        let issue = unpriced_issue(NATIVE_KEY, &res);
        TokenOutcome {
            priced: Some(PricedToken::new(balance, Some(native.name.clone()), res)),
            issue,
        }
    }

    async fn fetch_token(
        &self,
        conn: &Connection,
        profile: &ChainProfile,
        wallet: &WalletAddress,
        token: &str,
    ) -> TokenOutcome {
        let chain = profile.name.as_str();
        let reading = match conn.read_token(wallet, token).await {
            Ok(r) => r,
            Err(e) => {
                warn!(chain, token, error = %format!("{e:#}"), "token read failed; skipping");
                return TokenOutcome {
                    priced: None,
                    issue: Some(TokenIssue::new(
                        token,
                        IssueStage::TokenRead,
                        format!("{e:#}"),
                    )),
                };
            }
        };
        let amount = match base_units_to_decimal(reading.raw, reading.decimals) {
            Ok(a) => a,
            Err(e) => {
                warn!(chain, token, decimals = reading.decimals, error = %format!("{e:#}"), "amount conversion failed; skipping");
                return TokenOutcome {
                    priced: None,
                    issue: Some(TokenIssue::new(
                        token,
                        IssueStage::Conversion,
                        format!("{e:#}"),
                    )),
                }
            }
        };
        if amount <= BigDecimal::from(0_u8) {
            return TokenOutcome::default();
        }

        let balance = TokenBalance {
            token: token.to_owned(),
            amount,
            raw: reading.raw.to_string(),
            decimals: reading.decimals,
            symbol: reading.symbol,
            native: false,
        };
        let res = self.prices.resolve(profile, token).await;
        let issue = unpriced_issue(token, &res);
        TokenOutcome {
            priced: Some(PricedToken::new(balance, reading.name, res)),
            issue,
        }
    }
}
