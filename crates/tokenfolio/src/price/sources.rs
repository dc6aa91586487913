use crate::amount::parse_usable_price;
use crate::config::{ChainKind, ChainProfile, HttpConfig, PriceSourceKind};
use bigdecimal::BigDecimal;
use eyre::Context as _;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// A usable (strictly positive) USD price, plus whatever display name the source offered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub price: BigDecimal,
    pub name: Option<String>,
}

fn allow_insecure_http() -> bool {
    std::env::var("TOKENFOLIO_ALLOW_INSECURE_HTTP")
        .ok()
        .is_some_and(|v| {
            matches!(
                v.as_str(),
                "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON"
            )
        })
}

fn is_loopback_http(url: &str) -> bool {
    fn host_prefix_ok(s: &str, prefix: &str) -> bool {
        if !s.starts_with(prefix) {
            return false;
        }
        matches!(s.as_bytes().get(prefix.len()), None | Some(b':' | b'/'))
    }
    let u = url.trim();
    host_prefix_ok(u, "http://127.0.0.1")
        || host_prefix_ok(u, "http://localhost")
        || host_prefix_ok(u, "http://[::1]")
}

fn ensure_secure(label: &str, base: &str) -> eyre::Result<()> {
    if !base.trim().starts_with("https://") && !is_loopback_http(base) && !allow_insecure_http() {
        eyre::bail!(
            "{label} must use https (or loopback); set TOKENFOLIO_ALLOW_INSECURE_HTTP=1 to override"
        );
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct DexResponse {
    #[serde(default)]
    pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DexPair {
    #[serde(default)]
    pub chain_id: String,
    pub base_token: DexToken,
    #[serde(default)]
    pub price_usd: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexToken {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

/// Pick the first pair whose base token is `token` (case-insensitive) and that carries a
/// usable price. On EVM chains the pair must also be listed under this chain, since the
/// aggregator's search index spans every chain and addresses collide across them.
pub fn select_pair(pairs: &[DexPair], profile: &ChainProfile, token: &str) -> Option<Quote> {
    pairs
        .iter()
        .filter(|p| p.base_token.address.trim().eq_ignore_ascii_case(token.trim()))
        .filter(|p| profile.kind != ChainKind::Evm || profile.matches_price_chain(&p.chain_id))
        .find_map(|p| {
            let price = parse_usable_price(p.price_usd.as_deref()?)?;
            let name = p
                .base_token
                .name
                .as_deref()
                .or(p.base_token.symbol.as_deref())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned);
            Some(Quote { price, name })
        })
}

/// Read a Jupiter price entry. Accepts both `{"data": {mint: {"price": ..}}}` and
/// `{mint: {"usdPrice": ..}}` layouts, with the price as a string or a number.
fn jupiter_quote(v: &Value, mint: &str) -> Option<Quote> {
    let entry = v
        .get("data")
        .and_then(|d| d.get(mint))
        .or_else(|| v.get(mint))?;
    let raw = entry.get("price").or_else(|| entry.get("usdPrice"))?;
    let price = match raw {
        Value::String(s) => parse_usable_price(s),
        Value::Number(n) => parse_usable_price(&n.to_string()),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    }?;
    let name = entry
        .get("mintSymbol")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(ToOwned::to_owned);
    Some(Quote { price, name })
}

#[derive(Debug, Deserialize)]
struct BinanceTickerPrice {
    price: String,
}

/// HTTP access to the price APIs. One client, built once, with a request timeout.
#[derive(Debug, Clone)]
pub struct PriceHttp {
    client: Client,
    cfg: HttpConfig,
}

impl PriceHttp {
    pub fn new(cfg: &HttpConfig) -> eyre::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            cfg: cfg.clone(),
        })
    }

    /// `Ok(None)` means the source answered but had nothing usable for this token.
    pub async fn quote(
        &self,
        source: PriceSourceKind,
        profile: &ChainProfile,
        token: &str,
    ) -> eyre::Result<Option<Quote>> {
        match source {
            PriceSourceKind::DexscreenerSearch => {
                let base = self.cfg.dexscreener_base_url.trim_end_matches('/');
                ensure_secure("dexscreener_base_url", base)?;
                let req = self
                    .client
                    .get(format!("{base}/latest/dex/search"))
                    .query(&[("q", token)]);
                let pairs = Self::dex_pairs(req).await?;
                Ok(select_pair(&pairs, profile, token))
            }
            PriceSourceKind::DexscreenerTokens => {
                let base = self.cfg.dexscreener_base_url.trim_end_matches('/');
                ensure_secure("dexscreener_base_url", base)?;
                let req = self.client.get(format!("{base}/latest/dex/tokens/{token}"));
                let pairs = Self::dex_pairs(req).await?;
                Ok(select_pair(&pairs, profile, token))
            }
            PriceSourceKind::Jupiter => {
                let url = self.cfg.jupiter_price_url.trim();
                ensure_secure("jupiter_price_url", url)?;
                let mut req = self.client.get(url).query(&[("ids", token)]);
                if let Some(k) = self.cfg.jupiter_api_key.as_deref() {
                    req = req.header("x-api-key", k);
                }
                let v: Value = req
                    .send()
                    .await
                    .context("jupiter request")?
                    .error_for_status()
                    .context("jupiter status")?
                    .json()
                    .await
                    .context("jupiter json")?;
                Ok(jupiter_quote(&v, token))
            }
        }
    }

    async fn dex_pairs(req: reqwest::RequestBuilder) -> eyre::Result<Vec<DexPair>> {
        let v: DexResponse = req
            .send()
            .await
            .context("dexscreener request")?
            .error_for_status()
            .context("dexscreener status")?
            .json()
            .await
            .context("dexscreener json")?;
        Ok(v.pairs.unwrap_or_default())
    }

    /// Spot price for a Binance symbol such as `ETHUSDT`.
    pub async fn binance(&self, symbol: &str) -> eyre::Result<Option<BigDecimal>> {
        let base = self.cfg.binance_base_url.trim_end_matches('/');
        ensure_secure("binance_base_url", base)?;
        let v: BinanceTickerPrice = self
            .client
            .get(format!("{base}/api/v3/ticker/price"))
            .query(&[("symbol", symbol.to_uppercase())])
            .send()
            .await
            .context("binance request")?
            .error_for_status()
            .context("binance status")?
            .json()
            .await
            .context("binance json")?;
        Ok(parse_usable_price(&v.price))
    }
}
