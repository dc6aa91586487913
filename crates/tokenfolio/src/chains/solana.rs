use super::TokenReading;
use crate::retry::with_timeout;
use alloy::primitives::U256;
use eyre::Context as _;
use serde::Deserialize;
use serde_json::json;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::RpcRequest;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::{str::FromStr as _, time::Duration};

pub fn parse_pubkey(s: &str) -> eyre::Result<Pubkey> {
    Pubkey::from_str(s.trim()).context("parse solana pubkey")
}

#[derive(Debug, Deserialize)]
struct TokenAccountsResponse {
    value: Vec<KeyedTokenAccount>,
}

#[derive(Debug, Deserialize)]
struct KeyedTokenAccount {
    account: TokenAccount,
}

#[derive(Debug, Deserialize)]
struct TokenAccount {
    data: TokenAccountData,
}

#[derive(Debug, Deserialize)]
struct TokenAccountData {
    parsed: ParsedTokenAccount,
}

#[derive(Debug, Deserialize)]
struct ParsedTokenAccount {
    info: ParsedTokenInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedTokenInfo {
    token_amount: UiTokenAmount,
}

#[derive(Debug, Deserialize)]
struct UiTokenAmount {
    /// Raw base-unit amount as a decimal string.
    amount: String,
    decimals: u8,
}

/// Sum every token account the owner holds for one mint.
fn sum_token_accounts(resp: &TokenAccountsResponse) -> eyre::Result<(U256, u8)> {
    let mut raw = U256::ZERO;
    let mut decimals = 0_u8;
    for acc in &resp.value {
        let amt = &acc.account.data.parsed.info.token_amount;
        let v = U256::from_str(amt.amount.trim())
            .with_context(|| format!("parse token amount {}", amt.amount))?;
        raw = raw
            .checked_add(v)
            .ok_or_else(|| eyre::eyre!("token amount overflow"))?;
        decimals = amt.decimals;
    }
    Ok((raw, decimals))
}

/// An RPC client bound to a single endpoint URL.
#[derive(Clone)]
pub struct SolanaConnection {
    url: String,
    rpc: Arc<RpcClient>,
    timeout: Duration,
}

impl std::fmt::Debug for SolanaConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaConnection")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl SolanaConnection {
    pub fn open(url: &str, timeout: Duration) -> Self {
        let rpc = RpcClient::new_with_timeout_and_commitment(
            url.to_owned(),
            timeout,
            CommitmentConfig::confirmed(),
        );
        Self {
            url: url.to_owned(),
            rpc: Arc::new(rpc),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Liveness check: current slot.
    pub async fn probe(&self) -> eyre::Result<u64> {
        with_timeout(self.timeout, "get slot", async {
            self.rpc.get_slot().await.context("get slot")
        })
        .await
    }

    pub async fn native_balance(&self, owner: &Pubkey) -> eyre::Result<U256> {
        with_timeout(self.timeout, "get balance", async {
            let lamports = self.rpc.get_balance(owner).await.context("get balance")?;
            Ok(U256::from(lamports))
        })
        .await
    }

    /// Balance and decimals of one SPL mint via parsed token accounts. A wallet without an
    /// account for the mint reads as zero.
    pub async fn read_token(&self, mint: &str, owner: &Pubkey) -> eyre::Result<TokenReading> {
        let mint = parse_pubkey(mint)?;
        let params = json!([
            owner.to_string(),
            { "mint": mint.to_string() },
            { "encoding": "jsonParsed", "commitment": "confirmed" }
        ]);
        with_timeout(self.timeout, "get token accounts", async {
            let resp: TokenAccountsResponse = self
                .rpc
                .send(RpcRequest::GetTokenAccountsByOwner, params)
                .await
                .context("get token accounts by owner")?;
            let (raw, decimals) = sum_token_accounts(&resp)?;
            Ok(TokenReading {
                raw,
                decimals,
                symbol: None,
                name: None,
            })
        })
        .await
    }
}
