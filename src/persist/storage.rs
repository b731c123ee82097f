//! SQLite persistence backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{FromRow, Pool, Sqlite};
use tracing::{debug, info};

use super::{Persistence, StoredPosition, TradeRecord};

#[derive(Debug, FromRow)]
struct TradeRow {
    token_mint: String,
    side: String,
    qty: f64,
    price_usd: f64,
    fee_usd: f64,
    ts: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct PositionRow {
    token_mint: String,
    qty: f64,
    avg_cost_usd: f64,
    updated_ts: DateTime<Utc>,
}

/// SQLite-backed storage. All writes go through a connection pool; the
/// schema is created on open.
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
}

impl SqliteStorage {
    /// Open (or create) the database at `db_path` and run the schema.
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{db_path}?mode=rwc"))
            .await
            .with_context(|| format!("failed to open database at {db_path}"))?;

        let storage = Self { pool };
        storage.create_schema().await?;
        info!(db_path, "sqlite storage ready");
        Ok(storage)
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token_mint TEXT NOT NULL,
                side TEXT NOT NULL,
                qty REAL NOT NULL,
                price_usd REAL NOT NULL,
                fee_usd REAL NOT NULL,
                ts TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create trades table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                token_mint TEXT PRIMARY KEY,
                qty REAL NOT NULL,
                avg_cost_usd REAL NOT NULL,
                updated_ts TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create positions table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_ts TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create state table")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_mint_ts ON trades (token_mint, ts)")
            .execute(&self.pool)
            .await
            .context("failed to create trades index")?;

        Ok(())
    }
}

#[async_trait]
impl Persistence for SqliteStorage {
    async fn save_state_json(&self, key: &str, value: &Value) -> Result<()> {
        let serialized = serde_json::to_string(value).context("failed to serialize state value")?;
        sqlx::query(
            r#"
            INSERT INTO state (key, value, updated_ts) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_ts = excluded.updated_ts
            "#,
        )
        .bind(key)
        .bind(serialized)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to save state key {key}"))?;
        debug!(key, "state saved");
        Ok(())
    }

    async fn load_state_json(&self, key: &str) -> Result<Option<Value>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to load state key {key}"))?;
        match row {
            Some((raw,)) => {
                let value = serde_json::from_str(&raw)
                    .with_context(|| format!("corrupt state value for key {key}"))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn record_trade(&self, trade: &TradeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trades (token_mint, side, qty, price_usd, fee_usd, ts)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trade.token_mint)
        .bind(&trade.side)
        .bind(trade.qty)
        .bind(trade.price_usd)
        .bind(trade.fee_usd)
        .bind(trade.ts)
        .execute(&self.pool)
        .await
        .context("failed to record trade")?;
        Ok(())
    }

    async fn upsert_position(
        &self,
        token_mint: &str,
        qty: f64,
        avg_cost_usd: f64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO positions (token_mint, qty, avg_cost_usd, updated_ts)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(token_mint) DO UPDATE SET
                qty = excluded.qty,
                avg_cost_usd = excluded.avg_cost_usd,
                updated_ts = excluded.updated_ts
            "#,
        )
        .bind(token_mint)
        .bind(qty)
        .bind(avg_cost_usd)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to upsert position for {token_mint}"))?;
        Ok(())
    }

    async fn load_positions(&self) -> Result<Vec<StoredPosition>> {
        let rows: Vec<PositionRow> = sqlx::query_as(
            "SELECT token_mint, qty, avg_cost_usd, updated_ts FROM positions WHERE qty > 0",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to load positions")?;
        Ok(rows
            .into_iter()
            .map(|r| StoredPosition {
                token_mint: r.token_mint,
                qty: r.qty,
                avg_cost_usd: r.avg_cost_usd,
                updated_ts: r.updated_ts,
            })
            .collect())
    }

    async fn load_trades(&self, limit: i64) -> Result<Vec<TradeRecord>> {
        let rows: Vec<TradeRow> = sqlx::query_as(
            r#"
            SELECT token_mint, side, qty, price_usd, fee_usd, ts
            FROM trades ORDER BY ts DESC, id DESC LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("failed to load trades")?;
        Ok(rows
            .into_iter()
            .map(|r| TradeRecord {
                token_mint: r.token_mint,
                side: r.side,
                qty: r.qty,
                price_usd: r.price_usd,
                fee_usd: r.fee_usd,
                ts: r.ts,
            })
            .collect())
    }
}
