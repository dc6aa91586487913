use crate::amount::MAX_DECIMALS;
use bigdecimal::{num_bigint::BigInt, BigDecimal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    Evm,
    Solana,
}

impl ChainKind {
    /// Canonical form of a token identifier for comparisons and cache keys.
    ///
    /// EVM addresses are hex and compare case-insensitively. Solana mints are base58,
    /// where case is significant.
    pub fn normalize_token(self, token: &str) -> String {
        let t = token.trim();
        match self {
            Self::Evm => t.to_lowercase(),
            Self::Solana => t.to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSourceKind {
    DexscreenerSearch,
    DexscreenerTokens,
    Jupiter,
}

impl PriceSourceKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DexscreenerSearch => "dexscreener_search",
            Self::DexscreenerTokens => "dexscreener_tokens",
            Self::Jupiter => "jupiter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PoolStrategy {
    #[default]
    Failover,
    RoundRobin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeAsset {
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    /// Native balances at or below this amount are treated as dust and dropped.
    pub dust_floor: BigDecimal,
    /// Binance spot symbol quoting the asset in USD terms (e.g. `ETHUSDT`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binance_symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainProfile {
    /// Filled from the `chains.<name>` key on load.
    #[serde(skip)]
    pub name: String,
    pub kind: ChainKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Chain tag used by DEX aggregators (e.g. `bsc`).
    pub price_chain_tag: String,
    /// Ordered endpoint candidates. Earlier entries are preferred.
    pub rpc_urls: Vec<String>,
    pub native: NativeAsset,
    /// Ordered price sources; later sources are only consulted when earlier ones yield nothing.
    pub price_sources: Vec<PriceSourceKind>,
    #[serde(default)]
    pub tokens: Vec<String>,
}

impl ChainProfile {
    pub fn normalize_token(&self, token: &str) -> String {
        self.kind.normalize_token(token)
    }

    /// Configured token identifiers, normalized and deduplicated, in configured order.
    pub fn unique_tokens(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.tokens
            .iter()
            .map(|t| self.normalize_token(t))
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect()
    }

    /// Whether a DEX pair reported under `chain_id` belongs to this chain.
    pub fn matches_price_chain(&self, chain_id: &str) -> bool {
        let c = chain_id.trim();
        c.eq_ignore_ascii_case(&self.price_chain_tag)
            || self.chain_id.is_some_and(|id| c == id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// DexScreener public API base URL (keyless).
    pub dexscreener_base_url: String,
    /// Jupiter price endpoint. Queried as `{url}?ids={mint}`.
    pub jupiter_price_url: String,
    /// Optional Jupiter API key (x-api-key).
    pub jupiter_api_key: Option<String>,
    /// Binance public API base URL (keyless). Used for native asset USD prices.
    pub binance_base_url: String,
    pub timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            dexscreener_base_url: "https://api.dexscreener.com".into(),
            jupiter_price_url: "https://lite-api.jup.ag/price/v2".into(),
            jupiter_api_key: None,
            binance_base_url: "https://api.binance.com".into(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis URL. When unset only the in-memory tier is used.
    pub redis_url: Option<String>,
    pub price_ttl_seconds: u64,
    /// Entry bound of the in-memory tier. `0` disables it.
    pub memory_capacity: usize,
    pub op_timeout_ms: u64,
    /// How long the remote tier stays short-circuited before a `PING` probe is tried.
    pub reconnect_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            price_ttl_seconds: 300,
            memory_capacity: 4096,
            op_timeout_ms: 1_500,
            reconnect_interval_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Tokens read concurrently per batch; batches run one after another.
    pub batch_size: usize,
    pub rpc_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub probe_rounds: usize,
    pub pool_strategy: PoolStrategy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            rpc_timeout_ms: 10_000,
            probe_timeout_ms: 8_000,
            probe_rounds: 1,
            pool_strategy: PoolStrategy::Failover,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub enabled: bool,
    pub db_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_file: "tokenfolio.db".into(),
        }
    }
}

/// A single chain definition used by the table-driven [`FolioConfig::default()`].
struct ChainDef {
    name: &'static str,
    kind: ChainKind,
    chain_id: Option<u64>,
    price_chain_tag: &'static str,
    rpc_urls: &'static [&'static str],
    native_symbol: &'static str,
    native_name: &'static str,
    native_decimals: u8,
    binance_symbol: &'static str,
    price_sources: &'static [PriceSourceKind],
    tokens: &'static [&'static str],
}

const EVM_SOURCES: &[PriceSourceKind] = &[
    PriceSourceKind::DexscreenerSearch,
    PriceSourceKind::DexscreenerTokens,
];

const SOLANA_SOURCES: &[PriceSourceKind] =
    &[PriceSourceKind::DexscreenerSearch, PriceSourceKind::Jupiter];

const DEFAULT_CHAINS: &[ChainDef] = &[
    ChainDef {
        name: "ethereum",
        kind: ChainKind::Evm,
        chain_id: Some(1),
        price_chain_tag: "ethereum",
        rpc_urls: &[
            "https://eth.llamarpc.com",
            "https://rpc.ankr.com/eth",
            "https://ethereum.publicnode.com",
            "https://eth.meowrpc.com",
        ],
        native_symbol: "ETH",
        native_name: "Ethereum",
        native_decimals: 18,
        binance_symbol: "ETHUSDT",
        price_sources: EVM_SOURCES,
        tokens: &[
            "0x5a3e6a77ba2f983ec0d371ea3b475f8bc0811ad5",
            "0x14feE680690900BA0ccCfC76AD70Fd1b95D10e16",
            "0xf94e7d0710709388bce3161c32b4eea56d3f91cc",
            "0x292fcdd1b104de5a00250febba9bc6a5092a0076",
            "0x44971abf0251958492fee97da3e5c5ada88b9185",
            "0x8FAc8031e079F409135766C7d5De29cf22EF897C",
            "0xadf7c35560035944e805d98ff17d58cde2449389",
            "0x7da2641000cbb407c329310c461b2cb9c70c3046",
            "0xEbcD1Cc56Db8ce89B4A83C037103c870998034C7",
            "0xDdbcDD8637d5CEDd15EeEe398108FCa05A71b32b",
        ],
    },
    ChainDef {
        name: "base",
        kind: ChainKind::Evm,
        chain_id: Some(8453),
        price_chain_tag: "base",
        rpc_urls: &[
            "https://mainnet.base.org",
            "https://1rpc.io/base",
            "https://base.blockpi.network/v1/rpc/public",
            "https://base.meowrpc.com",
        ],
        native_symbol: "ETH",
        native_name: "Ethereum",
        native_decimals: 18,
        binance_symbol: "ETHUSDT",
        price_sources: EVM_SOURCES,
        tokens: &[
            "0x4f9fd6be4a90f2620860d680c0d4d5fb53d1a825",
            "0x0b3e328455c4059EEb9e3f84b5543F74E24e7E1b",
            "0xacfe6019ed1a7dc6f7b508c02d1b04ec88cc21bf",
            "0xb33ff54b9f7242ef1593d2c9bcd8f9df46c77935",
            "0x0c03ce270b4826ec62e7dd007f0b716068639f7b",
            "0x55cd6469f597452b5a7536e2cd98fde4c1247ee4",
            "0xd418dfe7670c21f682e041f34250c114db5d7789",
        ],
    },
    ChainDef {
        name: "bsc",
        kind: ChainKind::Evm,
        chain_id: Some(56),
        price_chain_tag: "bsc",
        rpc_urls: &[
            "https://bsc-dataseed.binance.org",
            "https://bsc-dataseed1.binance.org",
            "https://bsc-dataseed2.binance.org",
            "https://bsc-dataseed3.binance.org",
            "https://bsc-dataseed4.binance.org",
        ],
        native_symbol: "BNB",
        native_name: "BNB",
        native_decimals: 18,
        binance_symbol: "BNBUSDT",
        price_sources: EVM_SOURCES,
        tokens: &[
            "0x2A3350e8dAc29265c2b8Ded3789A27A702B0af2b",
            "0xf2c88757f8d03634671208935974b60a2a28bdb3",
            "0x5fd12bbb709a59c9f3bf9c690bff75edc6c4dcfd",
            "0x997a58129890bbda032231a52ed1ddc845fc18e1",
            "0xA18BBdCd86e4178d10eCd9316667cfE4C4AA8717",
            "0x054b568022e4bffc950e77a7aecc9c4787a6fa5d",
        ],
    },
    ChainDef {
        name: "solana",
        kind: ChainKind::Solana,
        chain_id: None,
        price_chain_tag: "solana",
        rpc_urls: &[
            "https://api.mainnet-beta.solana.com",
            "https://solana-api.projectserum.com",
            "https://rpc.ankr.com/solana",
            "https://ssc-dao.genesysgo.net",
        ],
        native_symbol: "SOL",
        native_name: "Solana",
        native_decimals: 9,
        binance_symbol: "SOLUSDT",
        price_sources: SOLANA_SOURCES,
        tokens: &[
            "HeLp6NuQkmYB4pYWo2zYs22mESHXPQYzXbB8n4V98jwC",
            "61V8vBaqAGMpgDQi4JcAwo1dmBGHsyhzodcPqnEVpump",
            "KENJSUYLASHUMfHyy5o4Hp2FdNqZg1AsUPhfH2kYvEP",
            "9BB6NFEcjBCtnNLFko2FqVQBq8HHM13kCyYcdQbgpump",
            "Hax9LTgsQkze1YFychnBLtFH8gYbQKtKfWKKg2SP6gdD",
            "74SBV4zDXxTRgv1pEMoECskKBkZHc2yGPnc7GYVepump",
            "Goatm5cqggssKRUwbMnPhHXKtN5SDGEP57qjwTSHD1Xf",
            "AKzAhPPLMH5NG35kGbgkwtrTLeGyVrfCtApjnvqAATcm",
            "63LfDmNb3MQ8mw9MtZ2To9bEA2M71kZUUGq5tiJxcqj9",
        ],
    },
];

/// Default native dust floor: 0.0001.
pub fn default_dust_floor() -> BigDecimal {
    BigDecimal::new(BigInt::from(1_u8), 4)
}

fn profile_from_def(def: &ChainDef) -> ChainProfile {
    ChainProfile {
        name: def.name.into(),
        kind: def.kind,
        chain_id: def.chain_id,
        price_chain_tag: def.price_chain_tag.into(),
        rpc_urls: def.rpc_urls.iter().map(|&s| s.into()).collect(),
        native: NativeAsset {
            symbol: def.native_symbol.into(),
            name: def.native_name.into(),
            decimals: def.native_decimals,
            dust_floor: default_dust_floor(),
            binance_symbol: Some(def.binance_symbol.into()),
        },
        price_sources: def.price_sources.to_vec(),
        tokens: def.tokens.iter().map(|&s| s.into()).collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolioConfig {
    pub chains: BTreeMap<String, ChainProfile>,
    pub http: HttpConfig,
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub store: StoreConfig,
}

impl Default for FolioConfig {
    fn default() -> Self {
        let chains = DEFAULT_CHAINS
            .iter()
            .map(|def| (def.name.to_owned(), profile_from_def(def)))
            .collect();
        Self {
            chains,
            http: HttpConfig::default(),
            cache: CacheConfig::default(),
            fetch: FetchConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl FolioConfig {
    /// Canonicalize each `chains.<name>` key (trimmed, lowercase) and copy it into its profile.
    ///
    /// Lookups via [`Self::chain`] are case-insensitive, so two keys that differ only in case
    /// would be ambiguous and are rejected.
    pub fn assign_chain_names(&mut self) -> eyre::Result<()> {
        let raw = std::mem::take(&mut self.chains);
        for (key, mut profile) in raw {
            let name = key.trim().to_lowercase();
            if name.is_empty() {
                eyre::bail!("chains: empty chain name");
            }
            if self.chains.contains_key(&name) {
                eyre::bail!("chains.{key}: duplicates chain {name} (names are case-insensitive)");
            }
            name.clone_into(&mut profile.name);
            self.chains.insert(name, profile);
        }
        Ok(())
    }

    /// Look up a chain profile by name (case-insensitive).
    pub fn chain(&self, name: &str) -> Option<&ChainProfile> {
        let n = name.trim().to_lowercase();
        self.chains.get(&n)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if self.chains.is_empty() {
            eyre::bail!("no chains configured");
        }
        if self.fetch.batch_size == 0 {
            eyre::bail!("fetch.batch_size must be at least 1");
        }
        for (name, p) in &self.chains {
            if *name != name.trim().to_lowercase() {
                eyre::bail!("chains.{name}: chain names must be lowercase");
            }
            if p.rpc_urls.iter().all(|u| u.trim().is_empty()) {
                eyre::bail!("chains.{name}: at least one rpc url is required");
            }
            if p.native.decimals > MAX_DECIMALS {
                eyre::bail!(
                    "chains.{name}: native decimals {} exceeds {MAX_DECIMALS}",
                    p.native.decimals
                );
            }
            if p.native.dust_floor < BigDecimal::from(0_u8) {
                eyre::bail!("chains.{name}: dust_floor must not be negative");
            }
            if p.price_chain_tag.trim().is_empty() {
                eyre::bail!("chains.{name}: price_chain_tag is required");
            }
        }
        Ok(())
    }
}
