use super::TokenReading;
use crate::retry::with_timeout;
use alloy::{
    primitives::{Address, U256},
    providers::{Provider as _, RootProvider},
    sol,
};
use eyre::Context as _;
use reqwest::Client;
use std::future::IntoFuture as _;
use std::{str::FromStr as _, time::Duration};

const RPC_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

type EvmProvider = RootProvider;

sol! {
    #[sol(rpc)]
    contract IERC20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);
    }
}

pub fn parse_address(s: &str) -> eyre::Result<Address> {
    Address::from_str(s.trim()).with_context(|| format!("parse evm address {s}"))
}

/// A provider bound to a single endpoint URL.
#[derive(Debug, Clone)]
pub struct EvmConnection {
    url: String,
    provider: EvmProvider,
    timeout: Duration,
}

impl EvmConnection {
    pub fn open(url: &str, timeout: Duration) -> eyre::Result<Self> {
        let u: reqwest::Url = url
            .parse()
            .with_context(|| format!("invalid rpc url: {url}"))?;
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(RPC_CONNECT_TIMEOUT.min(timeout))
            .build()
            .context("build rpc http client")?;
        let http = alloy::transports::http::Http::with_client(client, u);
        let rpc_client = alloy::rpc::client::RpcClient::new(http, false);
        Ok(Self {
            url: url.to_owned(),
            provider: RootProvider::new(rpc_client),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Liveness check: current block height.
    pub async fn probe(&self) -> eyre::Result<u64> {
        with_timeout(self.timeout, "get block number", async {
            self.provider
                .get_block_number()
                .await
                .context("get block number")
        })
        .await
    }

    pub async fn native_balance(&self, owner: Address) -> eyre::Result<U256> {
        with_timeout(self.timeout, "get balance", async {
            self.provider
                .get_balance(owner)
                .await
                .context("get balance")
        })
        .await
    }

    /// Balance, decimals, symbol and name of one ERC-20, read concurrently.
    ///
    /// Balance and decimals are required. Symbol and name are optional: plenty of tokens
    /// return `bytes32` or revert there.
    pub async fn read_token(&self, token: Address, owner: Address) -> eyre::Result<TokenReading> {
        let c = IERC20::new(token, &self.provider);
        let balance = c.balanceOf(owner);
        let decimals = c.decimals();
        let symbol = c.symbol();
        let name = c.name();

        with_timeout(self.timeout, "erc20 reads", async {
            let (bal, dec, sym, nm) = tokio::join!(
                balance.call().into_future(),
                decimals.call().into_future(),
                symbol.call().into_future(),
                name.call().into_future(),
            );
            let raw = bal.context("erc20 balanceOf")?;
            let decimals = dec.context("erc20 decimals")?;
            Ok(TokenReading {
                raw,
                decimals,
                symbol: sym.ok().filter(|s| !s.trim().is_empty()),
                name: nm.ok().filter(|s| !s.trim().is_empty()),
            })
        })
        .await
    }
}
