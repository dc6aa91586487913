pub mod evm;
pub mod solana;

use crate::config::{ChainKind, ChainProfile};
use crate::errors::FolioError;
use alloy::primitives::{Address, U256};
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;

/// Raw on-chain view of one token for one wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenReading {
    pub raw: U256,
    pub decimals: u8,
    pub symbol: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletAddress {
    Evm(Address),
    Solana(Pubkey),
}

impl WalletAddress {
    pub fn parse(profile: &ChainProfile, s: &str) -> Result<Self, FolioError> {
        let parsed = match profile.kind {
            ChainKind::Evm => evm::parse_address(s).map(Self::Evm),
            ChainKind::Solana => solana::parse_pubkey(s).map(Self::Solana),
        };
        parsed.map_err(|e| FolioError::InvalidWallet {
            chain: profile.name.clone(),
            address: format!("{} ({e:#})", s.trim()),
        })
    }
}

impl std::fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Lowercase hex keeps persisted keys stable regardless of input casing.
            Self::Evm(a) => write!(f, "{}", format!("{a:#x}").to_lowercase()),
            Self::Solana(p) => write!(f, "{p}"),
        }
    }
}

/// A live, probed connection to one endpoint of one chain.
#[derive(Debug, Clone)]
pub enum Connection {
    Evm(evm::EvmConnection),
    Solana(solana::SolanaConnection),
}

impl Connection {
    pub fn open(kind: ChainKind, url: &str, timeout: Duration) -> eyre::Result<Self> {
        Ok(match kind {
            ChainKind::Evm => Self::Evm(evm::EvmConnection::open(url, timeout)?),
            ChainKind::Solana => Self::Solana(solana::SolanaConnection::open(url, timeout)),
        })
    }

    pub fn endpoint(&self) -> &str {
        match self {
            Self::Evm(c) => c.url(),
            Self::Solana(c) => c.url(),
        }
    }

    /// Block height (EVM) or slot (Solana).
    pub async fn probe(&self) -> eyre::Result<u64> {
        match self {
            Self::Evm(c) => c.probe().await,
            Self::Solana(c) => c.probe().await,
        }
    }

    pub async fn native_balance(&self, wallet: &WalletAddress) -> eyre::Result<U256> {
        match (self, wallet) {
            (Self::Evm(c), WalletAddress::Evm(a)) => c.native_balance(*a).await,
            (Self::Solana(c), WalletAddress::Solana(p)) => c.native_balance(p).await,
            (Self::Evm(_) | Self::Solana(_), _) => {
                eyre::bail!("wallet address does not belong to this chain")
            }
        }
    }

    pub async fn read_token(&self, wallet: &WalletAddress, token: &str) -> eyre::Result<TokenReading> {
        match (self, wallet) {
            (Self::Evm(c), WalletAddress::Evm(a)) => {
                let t = evm::parse_address(token)?;
                c.read_token(t, *a).await
            }
            (Self::Solana(c), WalletAddress::Solana(p)) => c.read_token(token, p).await,
            (Self::Evm(_) | Self::Solana(_), _) => {
                eyre::bail!("wallet address does not belong to this chain")
            }
        }
    }
}
