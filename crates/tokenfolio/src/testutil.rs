//! Fixtures shared by async tests: a JSON-RPC node stub for `wiremock`, a minimal RESP server
//! standing in for Redis, plus config helpers that point every upstream at local mock servers.

use crate::config::{ChainKind, ChainProfile, FolioConfig, NativeAsset, PriceSourceKind};
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolValue as _;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::{TcpListener, TcpStream};
use wiremock::{Request, Respond, ResponseTemplate};

/// Arrival log of requests keyed by what they concern (token address, mint, ...).
pub type ArrivalLog = Arc<Mutex<Vec<(String, Instant)>>>;

fn record(log: &ArrivalLog, key: String) {
    log.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push((key, Instant::now()));
}

/// Largest number of distinct keys seen arriving within any `window`.
///
/// With responses delayed by more than `window`, this is a lower bound on how many keys
/// were being worked on at once.
pub fn max_concurrent(log: &ArrivalLog, window: Duration) -> usize {
    let entries = log.lock().unwrap_or_else(PoisonError::into_inner).clone();
    entries
        .iter()
        .map(|(_, at)| {
            entries
                .iter()
                .filter(|(_, t)| t <= at && at.duration_since(*t) < window)
                .map(|(k, _)| k.as_str())
                .collect::<HashSet<_>>()
                .len()
        })
        .max()
        .unwrap_or(0)
}

/// Distinct keys seen in `log`.
pub fn distinct_keys(log: &ArrivalLog) -> usize {
    log.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|(k, _)| k.clone())
        .collect::<HashSet<_>>()
        .len()
}

const SEL_BALANCE_OF: &str = "0x70a08231";
const SEL_DECIMALS: &str = "0x313ce567";
const SEL_SYMBOL: &str = "0x95d89b41";
const SEL_NAME: &str = "0x06fdde03";

#[derive(Debug, Clone)]
pub struct Erc20Fixture {
    pub balance: U256,
    pub decimals: u8,
    pub symbol: String,
    pub name: String,
    /// When set, every call to this contract reverts.
    pub reverts: bool,
}

#[derive(Debug, Clone)]
pub struct SplFixture {
    pub amount: u64,
    pub decimals: u8,
}

/// Minimal JSON-RPC node: answers the handful of EVM and Solana methods the fetch path uses.
#[derive(Debug, Clone, Default)]
pub struct RpcStub {
    native: U256,
    erc20: Arc<HashMap<String, Erc20Fixture>>,
    spl: Arc<HashMap<String, SplFixture>>,
    /// Delay applied to every `eth_call` response.
    call_delay: Duration,
    calls: ArrivalLog,
}

impl RpcStub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn native(mut self, v: U256) -> Self {
        self.native = v;
        self
    }

    pub fn erc20(mut self, token: &str, balance: U256, decimals: u8, symbol: &str) -> Self {
        Arc::make_mut(&mut self.erc20).insert(
            token.to_lowercase(),
            Erc20Fixture {
                balance,
                decimals,
                symbol: symbol.to_owned(),
                name: format!("{symbol} Token"),
                reverts: false,
            },
        );
        self
    }

    pub fn reverting_erc20(mut self, token: &str) -> Self {
        Arc::make_mut(&mut self.erc20).insert(
            token.to_lowercase(),
            Erc20Fixture {
                balance: U256::ZERO,
                decimals: 0,
                symbol: String::new(),
                name: String::new(),
                reverts: true,
            },
        );
        self
    }

    /// Delay every `eth_call` by `d`, and log its arrival keyed by the contract address.
    pub fn slow_calls(mut self, d: Duration) -> Self {
        self.call_delay = d;
        self
    }

    pub fn call_log(&self) -> ArrivalLog {
        Arc::clone(&self.calls)
    }

    pub fn spl(mut self, mint: &str, amount: u64, decimals: u8) -> Self {
        Arc::make_mut(&mut self.spl).insert(mint.to_owned(), SplFixture { amount, decimals });
        self
    }

    fn eth_call(&self, params: &Value) -> Result<Value, String> {
        let tx = params.get(0).ok_or("missing call object")?;
        let to = tx
            .get("to")
            .and_then(Value::as_str)
            .ok_or("missing to")?
            .to_lowercase();
        let input = tx
            .get("input")
            .or_else(|| tx.get("data"))
            .and_then(Value::as_str)
            .ok_or("missing input")?;
        let selector = input.get(..10).ok_or("short input")?;

        let Some(t) = self.erc20.get(&to) else {
            return Err("execution reverted".into());
        };
        if t.reverts {
            return Err("execution reverted".into());
        }
        let out: Vec<u8> = match selector {
            SEL_BALANCE_OF => t.balance.abi_encode(),
            SEL_DECIMALS => U256::from(t.decimals).abi_encode(),
            SEL_SYMBOL => t.symbol.abi_encode(),
            SEL_NAME => t.name.abi_encode(),
            _ => return Err("unknown selector".into()),
        };
        Ok(json!(alloy::primitives::hex::encode_prefixed(out)))
    }

    fn token_accounts(&self, params: &Value) -> Value {
        let mint = params
            .get(1)
            .and_then(|f| f.get("mint"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let accounts: Vec<Value> = self
            .spl
            .get(mint)
            .map(|s| {
                vec![json!({
                    "pubkey": "11111111111111111111111111111111",
                    "account": {
                        "lamports": 2_039_280,
                        "owner": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
                        "executable": false,
                        "rentEpoch": 0,
                        "space": 165,
                        "data": {
                            "program": "spl-token",
                            "space": 165,
                            "parsed": {
                                "type": "account",
                                "info": {
                                    "mint": mint,
                                    "tokenAmount": {
                                        "amount": s.amount.to_string(),
                                        "decimals": s.decimals,
                                    }
                                }
                            }
                        }
                    }
                })]
            })
            .unwrap_or_default();
        json!({ "context": { "slot": 1 }, "value": accounts })
    }

    fn dispatch(&self, method: &str, params: &Value) -> Result<Value, String> {
        match method {
            "eth_blockNumber" => Ok(json!("0x10")),
            "eth_chainId" => Ok(json!("0x1")),
            "eth_getBalance" => Ok(json!(format!("{:#x}", self.native))),
            "eth_call" => self.eth_call(params),
            "getSlot" => Ok(json!(100)),
            "getVersion" => Ok(json!({ "solana-core": "2.2.0", "feature-set": 1 })),
            "getBalance" => Ok(json!({
                "context": { "slot": 1 },
                "value": u64::try_from(self.native).unwrap_or(u64::MAX),
            })),
            "getTokenAccountsByOwner" => Ok(self.token_accounts(params)),
            other => Err(format!("method not found: {other}")),
        }
    }
}

impl Respond for RpcStub {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let id = body.get("id").cloned().unwrap_or(Value::Null);
        let method = body.get("method").and_then(Value::as_str).unwrap_or_default();
        let params = body.get("params").cloned().unwrap_or(Value::Null);
        let mut delay = Duration::ZERO;
        if method == "eth_call" {
            let to = params
                .get(0)
                .and_then(|tx| tx.get("to"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_lowercase();
            record(&self.calls, to);
            delay = self.call_delay;
        }
        let payload = match self.dispatch(method, &params) {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err(message) => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": 3, "message": message }
            }),
        };
        ResponseTemplate::new(200)
            .set_body_json(payload)
            .set_delay(delay)
    }
}

/// Price API that never knows a token and answers slowly, logging which token each
/// request was for (`?q=` or the last path segment).
#[derive(Debug, Clone)]
pub struct SlowPrices {
    delay: Duration,
    log: ArrivalLog,
}

impl SlowPrices {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            log: ArrivalLog::default(),
        }
    }

    pub fn log(&self) -> ArrivalLog {
        Arc::clone(&self.log)
    }
}

impl Respond for SlowPrices {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let key = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "q" || k == "ids")
            .map(|(_, v)| v.into_owned())
            .or_else(|| {
                request
                    .url
                    .path_segments()
                    .and_then(Iterator::last)
                    .map(ToOwned::to_owned)
            })
            .unwrap_or_default();
        record(&self.log, key.to_lowercase());
        ResponseTemplate::new(200)
            .set_body_json(json!({ "pairs": [] }))
            .set_delay(self.delay)
    }
}

#[derive(Debug, Default)]
struct FakeRedisState {
    failing: AtomicBool,
    commands: AtomicUsize,
    pings: AtomicUsize,
    data: Mutex<HashMap<String, String>>,
}

impl FakeRedisState {
    fn reply(&self, cmd: &[String]) -> Vec<u8> {
        let name = cmd.first().map(|c| c.to_ascii_uppercase()).unwrap_or_default();
        self.commands.fetch_add(1, Ordering::SeqCst);
        if name == "PING" {
            self.pings.fetch_add(1, Ordering::SeqCst);
        }
        if self.failing.load(Ordering::SeqCst) {
            return b"-ERR backend unavailable\r\n".to_vec();
        }
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        match (name.as_str(), cmd.get(1..).unwrap_or_default()) {
            ("PING", _) => b"+PONG\r\n".to_vec(),
            ("GET", [key, ..]) => data.get(key).map_or_else(
                || b"$-1\r\n".to_vec(),
                |v| format!("${}\r\n{v}\r\n", v.len()).into_bytes(),
            ),
            // SETEX key seconds value
            ("SETEX", [key, _, value, ..]) => {
                data.insert(key.clone(), value.clone());
                b"+OK\r\n".to_vec()
            }
            ("SET", [key, value, ..]) => {
                data.insert(key.clone(), value.clone());
                b"+OK\r\n".to_vec()
            }
            // Connection setup (CLIENT SETINFO, SELECT, ...).
            _ => b"+OK\r\n".to_vec(),
        }
    }
}

fn read_line(buf: &[u8], at: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(at..)?;
    let end = rest.windows(2).position(|w| w == b"\r\n")?;
    Some((rest.get(..end)?, at + end + 2))
}

/// One complete RESP command array from the front of `buf`, and the bytes it used.
fn parse_command(buf: &[u8]) -> Option<(Vec<String>, usize)> {
    let (head, mut at) = read_line(buf, 0)?;
    let n: usize = std::str::from_utf8(head.strip_prefix(b"*")?).ok()?.parse().ok()?;
    let mut parts = Vec::with_capacity(n);
    for _ in 0..n {
        let (len_line, start) = read_line(buf, at)?;
        let len: usize = std::str::from_utf8(len_line.strip_prefix(b"$")?)
            .ok()?
            .parse()
            .ok()?;
        let data = buf.get(start..start + len)?;
        parts.push(String::from_utf8_lossy(data).into_owned());
        at = start + len + 2;
        if buf.len() < at {
            return None;
        }
    }
    Some((parts, at))
}

async fn serve_redis(state: Arc<FakeRedisState>, mut sock: TcpStream) {
    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let n = match sock.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(chunk.get(..n).unwrap_or_default());
        while let Some((cmd, used)) = parse_command(&buf) {
            buf.drain(..used);
            if sock.write_all(&state.reply(&cmd)).await.is_err() {
                return;
            }
        }
    }
}

/// In-process stand-in for a Redis server: GET/SET/SETEX/PING over RESP2, with a switch that
/// makes every command answer with an error.
pub struct FakeRedis {
    addr: SocketAddr,
    state: Arc<FakeRedisState>,
    task: tokio::task::JoinHandle<()>,
}

impl FakeRedis {
    pub async fn start() -> eyre::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(FakeRedisState::default());
        let shared = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((sock, _)) = listener.accept().await {
                tokio::spawn(serve_redis(Arc::clone(&shared), sock));
            }
        });
        Ok(Self { addr, state, task })
    }

    pub fn url(&self) -> String {
        format!("redis://{}/", self.addr)
    }

    pub fn set_failing(&self, on: bool) {
        self.state.failing.store(on, Ordering::SeqCst);
    }

    pub fn commands(&self) -> usize {
        self.state.commands.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.state.pings.load(Ordering::SeqCst)
    }

    pub fn stored(&self, key: &str) -> Option<String> {
        self.state
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.state
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
    }
}

impl Drop for FakeRedis {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn evm_token(n: u8) -> String {
    format!("{:#x}", Address::with_last_byte(n))
}

/// A wallet address that is valid on EVM chains.
pub const EVM_WALLET: &str = "0x00000000000000000000000000000000000000aa";
/// A wallet address that is valid on Solana.
pub const SOLANA_WALLET: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";

pub fn evm_profile(name: &str, rpc_urls: Vec<String>, tokens: Vec<String>) -> ChainProfile {
    ChainProfile {
        name: name.to_owned(),
        kind: ChainKind::Evm,
        chain_id: Some(8453),
        price_chain_tag: name.to_owned(),
        rpc_urls,
        native: NativeAsset {
            symbol: "ETH".into(),
            name: "Ethereum".into(),
            decimals: 18,
            dust_floor: crate::config::default_dust_floor(),
            binance_symbol: Some("ETHUSDT".into()),
        },
        price_sources: vec![
            PriceSourceKind::DexscreenerSearch,
            PriceSourceKind::DexscreenerTokens,
        ],
        tokens,
    }
}

pub fn solana_profile(rpc_urls: Vec<String>, tokens: Vec<String>) -> ChainProfile {
    ChainProfile {
        name: "solana".into(),
        kind: ChainKind::Solana,
        chain_id: None,
        price_chain_tag: "solana".into(),
        rpc_urls,
        native: NativeAsset {
            symbol: "SOL".into(),
            name: "Solana".into(),
            decimals: 9,
            dust_floor: crate::config::default_dust_floor(),
            binance_symbol: Some("SOLUSDT".into()),
        },
        price_sources: vec![PriceSourceKind::DexscreenerSearch, PriceSourceKind::Jupiter],
        tokens,
    }
}

/// Config with the given chains and every price API pointed at `price_base`.
pub fn config_with(profiles: Vec<ChainProfile>, price_base: &str) -> FolioConfig {
    let mut cfg = FolioConfig {
        chains: profiles.into_iter().map(|p| (p.name.clone(), p)).collect(),
        ..FolioConfig::default()
    };
    cfg.http.dexscreener_base_url = price_base.to_owned();
    cfg.http.jupiter_price_url = format!("{price_base}/price/v2");
    cfg.http.binance_base_url = price_base.to_owned();
    cfg.http.timeout_ms = 2_000;
    cfg.fetch.rpc_timeout_ms = 2_000;
    cfg.fetch.probe_timeout_ms = 2_000;
    cfg
}
