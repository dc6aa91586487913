#![recursion_limit = "256"]
#![expect(
    clippy::multiple_crate_versions,
    reason = "transitive dependency duplication"
)]

use clap::{Parser, Subcommand};
use eyre::Context as _;
use std::io::Write as _;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

mod amount;
mod cache;
mod chains;
mod config;
mod db;
mod errors;
mod fetcher;
mod paths;
mod pool;
mod portfolio;
mod price;
mod report;
mod retry;
mod store;
#[cfg(test)]
mod testutil;

#[derive(Parser, Debug)]
#[command(name = "tokenfolio", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Value one wallet's holdings on one chain and print the report as JSON.
    ///
    /// Exits non-zero only when the chain is unknown, the address is malformed, or no RPC
    /// endpoint answers. Per-token failures are listed under `data.issues`.
    Portfolio {
        /// Chain name from the config (`ethereum`, `base`, `bsc`, `solana`, ...).
        #[arg(long)]
        chain: String,

        /// Wallet address (hex for EVM chains, base58 for Solana).
        wallet: String,

        /// Skip writing holdings to the local store.
        #[arg(long, default_value_t = false)]
        no_store: bool,
    },

    /// Resolve the USD price of every configured token.
    Prices {
        /// Limit to one chain. Defaults to every configured chain.
        #[arg(long)]
        chain: Option<String>,
    },

    /// Print the loaded chain profiles (no network).
    Chains,

    /// Print resolved paths (useful for debugging).
    Paths,
}

fn init_logging(paths: &paths::TokenfolioPaths) -> tracing_appender::non_blocking::WorkerGuard {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let file_name = paths
        .log_file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tokenfolio.log.jsonl");
    let file_appender = tracing_appender::rolling::never(&paths.data_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone());
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

fn print_json<T: serde::Serialize>(v: &T, what: &str) -> eyre::Result<()> {
    let s = serde_json::to_string_pretty(v).with_context(|| format!("serialize {what}"))?;
    writeln!(std::io::stdout().lock(), "{s}").with_context(|| format!("write {what}"))?;
    Ok(())
}

/// Persist a snapshot. Failures are logged; the report is printed regardless.
async fn store_snapshot(
    paths: &paths::TokenfolioPaths,
    cfg: &config::FolioConfig,
    snap: &portfolio::PortfolioSnapshot,
) {
    let res: eyre::Result<usize> = async {
        let db = db::Db::open(&paths.db_file(&cfg.store.db_file)).await?;
        let n = db.upsert_holdings(snap).await?;
        db.touch_wallet(&snap.wallet, &snap.total_usd_value, snap.fetched_at_ms)
            .await?;
        Ok(n)
    }
    .await;
    match res {
        Ok(n) => info!(chain = %snap.chain, wallet = %snap.wallet, holdings = n, "snapshot stored"),
        Err(e) => warn!(chain = %snap.chain, wallet = %snap.wallet, error = %format!("{e:#}"), "snapshot store failed"),
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let paths = paths::TokenfolioPaths::discover()?;
    paths.ensure_dirs().context("create tokenfolio dirs")?;
    let _log_guard = init_logging(&paths);

    let cfg_store = store::ConfigStore::new(&paths);

    match cli.cmd {
        Command::Paths => print_json(
            &serde_json::json!({
              "config_dir": paths.config_dir,
              "config_file": cfg_store.path(),
              "data_dir": paths.data_dir,
              "log_file": paths.log_file,
            }),
            "paths",
        ),
        Command::Chains => {
            let cfg = cfg_store.load_or_init_default()?;
            print_json(&cfg.chains, "chains")
        }
        Command::Prices { chain } => {
            let cfg = cfg_store.load_or_init_default()?;
            let cache = Arc::new(cache::CacheLayer::connect(&cfg.cache).await);
            let folio = portfolio::Portfolio::new(cfg, cache)?;
            let prices = folio.token_prices(chain.as_deref()).await?;
            let rows: Vec<report::PriceRow> = prices.iter().map(report::PriceRow::from).collect();
            print_json(&rows, "prices")
        }
        Command::Portfolio {
            chain,
            wallet,
            no_store,
        } => {
            let cfg = cfg_store.load_or_init_default()?;
            let persist = cfg.store.enabled && !no_store;
            let cache = Arc::new(cache::CacheLayer::connect(&cfg.cache).await);
            let folio = portfolio::Portfolio::new(cfg.clone(), cache)?;
            match folio.snapshot(&chain, &wallet).await {
                Ok(snap) => {
                    if persist {
                        store_snapshot(&paths, &cfg, &snap).await;
                    }
                    print_json(&report::PortfolioReport::from(&snap), "portfolio report")
                }
                Err(e) => {
                    print_json(&report::FailureReport::new(&chain, &wallet, &e), "failure report")?;
                    Err(e).context("portfolio request failed")
                }
            }
        }
    }
}
