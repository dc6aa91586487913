use crate::portfolio::PortfolioSnapshot;
use bigdecimal::BigDecimal;
use eyre::Context as _;
use std::path::Path;

// Local embedded store (Turso, pure Rust) for the latest holdings per wallet.
//
// Best-effort: callers log failures and still return the computed snapshot.
// Decimal columns are TEXT so arbitrary-precision values round-trip exactly.

pub struct Db {
    // Keep the database handle alive for the lifetime of the connection.
    _db: turso::Database,
    conn: turso::Connection,
}

// `turso::Database` / `turso::Connection` may not implement `Debug`.
impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldingRow {
    pub token: String,
    pub amount: String,
    pub price: String,
    pub value: String,
    pub last_updated_ms: i64,
}

/// Unknown price or value is stored as zero; the row is still written.
fn stored(v: Option<&BigDecimal>) -> String {
    v.map_or_else(|| "0".to_owned(), BigDecimal::to_plain_string)
}

impl Db {
    pub async fn open(path: &Path) -> eyre::Result<Self> {
        let p_s = path.to_string_lossy();
        let db = turso::Builder::new_local(p_s.as_ref())
            .build()
            .await
            .context("open turso local db")?;
        let conn = db.connect().context("connect turso db")?;

        let this = Self { _db: db, conn };
        this.init().await?;
        Ok(this)
    }

    async fn init(&self) -> eyre::Result<()> {
        // Latest known balance per (chain, token, wallet); one fetch overwrites the previous.
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS holdings (\
                  chain TEXT NOT NULL,\
                  token TEXT NOT NULL,\
                  wallet TEXT NOT NULL,\
                  amount TEXT NOT NULL,\
                  price TEXT NOT NULL DEFAULT '0',\
                  value TEXT NOT NULL DEFAULT '0',\
                  last_updated_ms INTEGER NOT NULL,\
                  PRIMARY KEY (chain, token, wallet)\
                )",
                (),
            )
            .await
            .context("create holdings")?;

        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS wallets (\
                  address TEXT PRIMARY KEY,\
                  last_updated_ms INTEGER NOT NULL,\
                  total_value TEXT NOT NULL DEFAULT '0'\
                )",
                (),
            )
            .await
            .context("create wallets")?;
        Ok(())
    }

    /// Upsert every holding of `snap`, keyed by `(chain, token, wallet)`.
    pub async fn upsert_holdings(&self, snap: &PortfolioSnapshot) -> eyre::Result<usize> {
        let mut written = 0_usize;
        for t in &snap.tokens {
            self.conn
                .execute(
                    "INSERT INTO holdings (chain, token, wallet, amount, price, value, last_updated_ms) \
                     VALUES (?, ?, ?, ?, ?, ?, ?) \
                     ON CONFLICT(chain, token, wallet) DO UPDATE SET \
                       amount=excluded.amount, \
                       price=excluded.price, \
                       value=excluded.value, \
                       last_updated_ms=excluded.last_updated_ms",
                    (
                        snap.chain.as_str(),
                        t.balance.token.as_str(),
                        snap.wallet.as_str(),
                        t.balance.amount.to_plain_string(),
                        stored(t.price.as_ref()),
                        stored(t.usd_value.as_ref()),
                        snap.fetched_at_ms,
                    ),
                )
                .await
                .with_context(|| format!("upsert holding {}:{}", snap.chain, t.balance.token))?;
            written += 1;
        }
        Ok(written)
    }

    /// Record when `address` was last valued and its total.
    pub async fn touch_wallet(
        &self,
        address: &str,
        total_value: &BigDecimal,
        last_updated_ms: i64,
    ) -> eyre::Result<()> {
        self.conn
            .execute(
                "INSERT INTO wallets (address, last_updated_ms, total_value) \
                 VALUES (?, ?, ?) \
                 ON CONFLICT(address) DO UPDATE SET \
                   last_updated_ms=excluded.last_updated_ms, \
                   total_value=excluded.total_value",
                (address, last_updated_ms, total_value.to_plain_string()),
            )
            .await
            .context("upsert wallets")?;
        Ok(())
    }

    #[cfg(test)]
    pub async fn holdings(&self, chain: &str, wallet: &str) -> eyre::Result<Vec<HoldingRow>> {
        let mut rows = self
            .conn
            .query(
                "SELECT token, amount, price, value, last_updated_ms FROM holdings \
                 WHERE chain = ? AND wallet = ? ORDER BY token",
                (chain, wallet),
            )
            .await
            .context("query holdings")?;

        let mut out: Vec<HoldingRow> = vec![];
        while let Some(row) = rows.next().await.context("next row")? {
            out.push(HoldingRow {
                token: row.get(0).context("row.token")?,
                amount: row.get(1).context("row.amount")?,
                price: row.get(2).context("row.price")?,
                value: row.get(3).context("row.value")?,
                last_updated_ms: row.get(4).context("row.last_updated_ms")?,
            });
        }
        Ok(out)
    }

    #[cfg(test)]
    pub async fn wallet_total(&self, address: &str) -> eyre::Result<Option<(String, i64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT total_value, last_updated_ms FROM wallets WHERE address = ?",
                (address,),
            )
            .await
            .context("query wallets")?;
        let Some(row) = rows.next().await.context("next row")? else {
            return Ok(None);
        };
        Ok(Some((
            row.get(0).context("row.total_value")?,
            row.get(1).context("row.last_updated_ms")?,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{PricedToken, TokenBalance};
    use std::str::FromStr as _;

    fn holding(token: &str, amount: &str, price: Option<&str>) -> eyre::Result<PricedToken> {
        let amount = BigDecimal::from_str(amount)?;
        let price = price.map(BigDecimal::from_str).transpose()?;
        Ok(PricedToken {
            usd_value: price.as_ref().map(|p| &amount * p),
            balance: TokenBalance {
                token: token.to_owned(),
                amount,
                raw: "0".to_owned(),
                decimals: 18,
                symbol: None,
                native: false,
            },
            name: None,
            price,
        })
    }

    fn snapshot(tokens: Vec<PricedToken>, at: i64) -> PortfolioSnapshot {
        PortfolioSnapshot {
            chain: "base".to_owned(),
            wallet: "0xw".to_owned(),
            endpoint: "https://rpc".to_owned(),
            tokens,
            total_usd_value: BigDecimal::from(0_u8),
            not_found: vec![],
            issues: vec![],
            fetched_at_ms: at,
        }
    }

    #[tokio::test]
    async fn unpriced_holdings_are_stored_as_zero() -> eyre::Result<()> {
        let td = tempfile::tempdir().context("create tempdir")?;
        let db = Db::open(&td.path().join("t.db")).await.context("open db")?;

        let snap = snapshot(
            vec![
                holding("0xa", "1.5", Some("2"))?,
                holding("0xb", "7", None)?,
            ],
            100,
        );
        assert_eq!(db.upsert_holdings(&snap).await?, 2);

        let rows = db.holdings("base", "0xw").await?;
        assert_eq!(rows.len(), 2, "two holdings");
        let b = rows.get(1).ok_or_else(|| eyre::eyre!("missing 0xb"))?;
        assert_eq!(b.token, "0xb");
        assert_eq!(b.price, "0");
        assert_eq!(b.value, "0");
        let a = rows.first().ok_or_else(|| eyre::eyre!("missing 0xa"))?;
        assert_eq!(a.value, "3.0", "1.5 * 2 keeps its scale");
        Ok(())
    }

    #[tokio::test]
    async fn a_second_fetch_overwrites_the_same_key() -> eyre::Result<()> {
        let td = tempfile::tempdir().context("create tempdir")?;
        let db = Db::open(&td.path().join("t.db")).await.context("open db")?;

        db.upsert_holdings(&snapshot(vec![holding("0xa", "1", Some("1"))?], 100))
            .await?;
        db.upsert_holdings(&snapshot(vec![holding("0xa", "4", Some("1"))?], 200))
            .await?;

        let rows = db.holdings("base", "0xw").await?;
        assert_eq!(rows.len(), 1, "composite key is unique");
        let row = rows.first().ok_or_else(|| eyre::eyre!("no row"))?;
        assert_eq!(row.amount, "4");
        assert_eq!(row.last_updated_ms, 200);
        Ok(())
    }

    #[tokio::test]
    async fn wallet_total_is_upserted() -> eyre::Result<()> {
        let td = tempfile::tempdir().context("create tempdir")?;
        let db = Db::open(&td.path().join("t.db")).await.context("open db")?;

        db.touch_wallet("0xw", &BigDecimal::from_str("10.50")?, 1).await?;
        db.touch_wallet("0xw", &BigDecimal::from_str("12.25")?, 2).await?;
        assert_eq!(
            db.wallet_total("0xw").await?,
            Some(("12.25".to_owned(), 2)),
            "latest total wins"
        );
        assert_eq!(db.wallet_total("0xother").await?, None, "unknown wallet");
        Ok(())
    }
}
