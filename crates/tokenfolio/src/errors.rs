use serde::Serialize;
use thiserror::Error;

/// Failure of a whole portfolio request. Everything else is contained and reported as a
/// [`TokenIssue`] or a degraded value.
#[derive(Debug, Error, Clone)]
pub enum FolioError {
    #[error("no available rpc endpoint for {chain} ({} attempted)", attempts.len())]
    NoAvailableEndpoint {
        chain: String,
        attempts: Vec<EndpointFailure>,
    },

    #[error("unknown chain: {0}")]
    UnknownChain(String),

    #[error("invalid wallet address for {chain}: {address}")]
    InvalidWallet { chain: String, address: String },
}

/// One endpoint that failed its liveness probe during acquisition.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointFailure {
    pub endpoint: String,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStage {
    NativeBalance,
    TokenRead,
    Conversion,
    Price,
}

/// A contained, per-token failure. The token is skipped or left unpriced; the fetch goes on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenIssue {
    pub token: String,
    pub stage: IssueStage,
    pub detail: String,
}

impl TokenIssue {
    pub fn new(token: impl Into<String>, stage: IssueStage, detail: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            stage,
            detail: detail.into(),
        }
    }
}
