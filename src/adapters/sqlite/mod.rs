//! SQLite Adapter
//!
//! `TokenStore` backed by a single SQLite database file. The schema is
//! created on open. Timestamps are stored as microseconds since the epoch
//! so ordering in SQL matches ordering in time.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use crate::domain::{PricePoint, ProfitLoss, TokenCreationEvent};
use crate::ports::store::{StoreError, TokenStore};

const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS tokens (
        mint TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        symbol TEXT NOT NULL,
        bonding_curve_key TEXT NOT NULL,
        initial_buy REAL NOT NULL,
        market_cap_sol REAL NOT NULL,
        signature TEXT NOT NULL,
        sol_amount REAL NOT NULL,
        trader_public_key TEXT NOT NULL,
        tx_type TEXT NOT NULL,
        uri TEXT NOT NULL,
        v_sol_in_bonding_curve REAL NOT NULL,
        v_tokens_in_bonding_curve REAL NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tokens_created_at ON tokens (created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS price_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        mint TEXT NOT NULL,
        price REAL NOT NULL,
        timestamp INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_price_history_mint ON price_history (mint, timestamp)",
    r#"
    CREATE TABLE IF NOT EXISTS profit_loss (
        mint TEXT PRIMARY KEY,
        initial_price REAL NOT NULL,
        current_price REAL NOT NULL,
        profit_loss REAL NOT NULL,
        profit_loss_pct REAL NOT NULL,
        last_updated INTEGER NOT NULL
    )
    "#,
];

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .ok_or_else(|| StoreError::Decode(format!("timestamp out of range: {}", micros)))
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[derive(Debug, FromRow)]
struct TokenRow {
    mint: String,
    name: String,
    symbol: String,
    bonding_curve_key: String,
    initial_buy: f64,
    market_cap_sol: f64,
    signature: String,
    sol_amount: f64,
    trader_public_key: String,
    tx_type: String,
    uri: String,
    v_sol_in_bonding_curve: f64,
    v_tokens_in_bonding_curve: f64,
    created_at: i64,
}

impl TryFrom<TokenRow> for TokenCreationEvent {
    type Error = StoreError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        Ok(TokenCreationEvent {
            mint: row.mint,
            name: row.name,
            symbol: row.symbol,
            bonding_curve_key: row.bonding_curve_key,
            v_sol_in_bonding_curve: row.v_sol_in_bonding_curve,
            v_tokens_in_bonding_curve: row.v_tokens_in_bonding_curve,
            initial_buy: row.initial_buy,
            market_cap_sol: row.market_cap_sol,
            sol_amount: row.sol_amount,
            signature: row.signature,
            trader_public_key: row.trader_public_key,
            tx_type: row.tx_type,
            uri: row.uri,
            created_at: from_micros(row.created_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct PriceRow {
    mint: String,
    price: f64,
    timestamp: i64,
}

impl TryFrom<PriceRow> for PricePoint {
    type Error = StoreError;

    fn try_from(row: PriceRow) -> Result<Self, Self::Error> {
        Ok(PricePoint::new(row.mint, row.price, from_micros(row.timestamp)?))
    }
}

#[derive(Debug, FromRow)]
struct ProfitLossRow {
    mint: String,
    initial_price: f64,
    current_price: f64,
    profit_loss: f64,
    profit_loss_pct: f64,
    last_updated: i64,
}

impl TryFrom<ProfitLossRow> for ProfitLoss {
    type Error = StoreError;

    fn try_from(row: ProfitLossRow) -> Result<Self, Self::Error> {
        Ok(ProfitLoss {
            mint: row.mint,
            initial_price: row.initial_price,
            current_price: row.current_price,
            profit_loss: row.profit_loss,
            profit_loss_pct: row.profit_loss_pct,
            last_updated: from_micros(row.last_updated)?,
        })
    }
}

/// SQLite-backed token store
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file at `path` and ensure the schema.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening token database");

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Self::with_pool(pool).await
    }

    /// Private in-memory database, mostly for tests and dry runs.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        // Each connection to :memory: is its own database, so pin exactly one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await.map_err(db_err)?;
        }
        debug!("Token database schema ready");
        Ok(Self { pool })
    }

    pub async fn token_count(&self) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tokens")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.0)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl TokenStore for SqliteStore {
    async fn save_token(&self, event: &TokenCreationEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO tokens (
                mint, name, symbol, bonding_curve_key, initial_buy,
                market_cap_sol, signature, sol_amount, trader_public_key,
                tx_type, uri, v_sol_in_bonding_curve, v_tokens_in_bonding_curve,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.mint)
        .bind(&event.name)
        .bind(&event.symbol)
        .bind(&event.bonding_curve_key)
        .bind(event.initial_buy)
        .bind(event.market_cap_sol)
        .bind(&event.signature)
        .bind(event.sol_amount)
        .bind(&event.trader_public_key)
        .bind(&event.tx_type)
        .bind(&event.uri)
        .bind(event.v_sol_in_bonding_curve)
        .bind(event.v_tokens_in_bonding_curve)
        .bind(to_micros(event.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn save_price_point(&self, point: &PricePoint) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO price_history (mint, price, timestamp) VALUES (?, ?, ?)")
            .bind(&point.mint)
            .bind(point.price)
            .bind(to_micros(point.timestamp))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn upsert_profit_loss(&self, record: &ProfitLoss) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO profit_loss (
                mint, initial_price, current_price, profit_loss,
                profit_loss_pct, last_updated
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(mint) DO UPDATE SET
                initial_price = excluded.initial_price,
                current_price = excluded.current_price,
                profit_loss = excluded.profit_loss,
                profit_loss_pct = excluded.profit_loss_pct,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&record.mint)
        .bind(record.initial_price)
        .bind(record.current_price)
        .bind(record.profit_loss)
        .bind(record.profit_loss_pct)
        .bind(to_micros(record.last_updated))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_recent_tokens(
        &self,
        limit: usize,
    ) -> Result<Vec<TokenCreationEvent>, StoreError> {
        let rows: Vec<TokenRow> = sqlx::query_as(
            r#"
            SELECT mint, name, symbol, bonding_curve_key, initial_buy,
                   market_cap_sol, signature, sol_amount, trader_public_key,
                   tx_type, uri, v_sol_in_bonding_curve, v_tokens_in_bonding_curve,
                   created_at
            FROM tokens
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_price_history(&self, mint: &str) -> Result<Vec<PricePoint>, StoreError> {
        let rows: Vec<PriceRow> = sqlx::query_as(
            r#"
            SELECT mint, price, timestamp
            FROM price_history
            WHERE mint = ?
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .bind(mint)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_profit_loss(&self, mint: &str) -> Result<Option<ProfitLoss>, StoreError> {
        let row: Option<ProfitLossRow> = sqlx::query_as(
            r#"
            SELECT mint, initial_price, current_price, profit_loss,
                   profit_loss_pct, last_updated
            FROM profit_loss
            WHERE mint = ?
            "#,
        )
        .bind(mint)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_profit_loss(&self, limit: usize) -> Result<Vec<ProfitLoss>, StoreError> {
        let rows: Vec<ProfitLossRow> = sqlx::query_as(
            r#"
            SELECT mint, initial_price, current_price, profit_loss,
                   profit_loss_pct, last_updated
            FROM profit_loss
            ORDER BY profit_loss_pct DESC
            LIMIT ?
            "#,
        )
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn token(mint: &str, created_at: DateTime<Utc>) -> TokenCreationEvent {
        TokenCreationEvent {
            mint: mint.to_string(),
            name: "Test Meme".to_string(),
            symbol: "MEME".to_string(),
            bonding_curve_key: "Curve789".to_string(),
            v_sol_in_bonding_curve: 30.0,
            v_tokens_in_bonding_curve: 1_000_000_000.0,
            initial_buy: 62_500_000.0,
            market_cap_sol: 30.0,
            sol_amount: 1.5,
            signature: "5xSig".to_string(),
            trader_public_key: "Creator456".to_string(),
            tx_type: "create".to_string(),
            uri: "https://ipfs.io/ipfs/abc".to_string(),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_save_token_is_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();
        let event = token("MintA", Utc::now());

        store.save_token(&event).await.unwrap();
        store.save_token(&event).await.unwrap();

        assert_eq!(store.token_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_token_round_trip_preserves_fields() {
        let store = SqliteStore::in_memory().await.unwrap();
        let event = token("MintA", Utc::now());
        store.save_token(&event).await.unwrap();

        let loaded = store.get_recent_tokens(10).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].mint, event.mint);
        assert_eq!(loaded[0].trader_public_key, event.trader_public_key);
        assert_eq!(
            loaded[0].created_at.timestamp_micros(),
            event.created_at.timestamp_micros()
        );
    }

    #[tokio::test]
    async fn test_recent_tokens_newest_first_and_limited() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = Utc::now();
        for (i, mint) in ["MintA", "MintB", "MintC"].iter().enumerate() {
            let event = token(mint, now + ChronoDuration::seconds(i as i64));
            store.save_token(&event).await.unwrap();
        }

        let recent = store.get_recent_tokens(2).await.unwrap();
        let mints: Vec<_> = recent.iter().map(|t| t.mint.as_str()).collect();
        assert_eq!(mints, vec!["MintC", "MintB"]);
    }

    #[tokio::test]
    async fn test_price_history_newest_first() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = Utc::now();

        store
            .save_price_point(&PricePoint::new("MintA", 1.0, now))
            .await
            .unwrap();
        store
            .save_price_point(&PricePoint::new("MintA", 1.5, now + ChronoDuration::seconds(30)))
            .await
            .unwrap();
        store
            .save_price_point(&PricePoint::new("MintB", 7.0, now))
            .await
            .unwrap();

        let history = store.get_price_history("MintA").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_relative_eq!(history[0].price, 1.5);
        assert_relative_eq!(history[1].price, 1.0);
    }

    #[tokio::test]
    async fn test_equal_timestamps_order_by_insertion() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = Utc::now();

        store
            .save_price_point(&PricePoint::new("MintA", 1.0, now))
            .await
            .unwrap();
        store
            .save_price_point(&PricePoint::new("MintA", 2.0, now))
            .await
            .unwrap();

        let history = store.get_price_history("MintA").await.unwrap();
        assert_relative_eq!(history[0].price, 2.0);
    }

    #[tokio::test]
    async fn test_upsert_profit_loss_replaces_record() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = Utc::now();

        store
            .upsert_profit_loss(&ProfitLoss::opening("MintA", 1.0, now))
            .await
            .unwrap();
        store
            .upsert_profit_loss(&ProfitLoss::between("MintA", 1.0, 1.5, now))
            .await
            .unwrap();

        let record = store.get_profit_loss("MintA").await.unwrap().unwrap();
        assert_relative_eq!(record.current_price, 1.5);
        assert_relative_eq!(record.profit_loss_pct, 50.0);
        assert!(store.get_profit_loss("MintB").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_profit_loss_best_first() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = Utc::now();

        store
            .upsert_profit_loss(&ProfitLoss::between("Loser", 2.0, 1.0, now))
            .await
            .unwrap();
        store
            .upsert_profit_loss(&ProfitLoss::between("Winner", 1.0, 3.0, now))
            .await
            .unwrap();

        let records = store.list_profit_loss(10).await.unwrap();
        assert_eq!(records[0].mint, "Winner");
        assert_eq!(records[1].mint, "Loser");
    }

    #[tokio::test]
    async fn test_file_database_persists_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tracker.db");

        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.save_token(&token("MintA", Utc::now())).await.unwrap();
            store.close().await;
        }

        let store = SqliteStore::open(&path).await.unwrap();
        assert_eq!(store.token_count().await.unwrap(), 1);
    }
}
