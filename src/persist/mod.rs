//! Durable storage for trades, positions and engine state.

pub mod memory;
pub mod storage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use memory::MemoryStorage;
pub use storage::SqliteStorage;

/// One executed trade, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub token_mint: String,
    pub side: String,
    pub qty: f64,
    pub price_usd: f64,
    pub fee_usd: f64,
    pub ts: DateTime<Utc>,
}

/// Aggregated holding, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPosition {
    pub token_mint: String,
    pub qty: f64,
    pub avg_cost_usd: f64,
    pub updated_ts: DateTime<Utc>,
}

/// Storage seam shared by the engine components. The production backend is
/// SQLite; tests use the in-memory implementation.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Upsert an opaque JSON document under a key.
    async fn save_state_json(&self, key: &str, value: &Value) -> anyhow::Result<()>;

    /// Load a JSON document, `None` when the key has never been written.
    async fn load_state_json(&self, key: &str) -> anyhow::Result<Option<Value>>;

    async fn record_trade(&self, trade: &TradeRecord) -> anyhow::Result<()>;

    async fn upsert_position(
        &self,
        token_mint: &str,
        qty: f64,
        avg_cost_usd: f64,
    ) -> anyhow::Result<()>;

    async fn load_positions(&self) -> anyhow::Result<Vec<StoredPosition>>;

    /// Most recent trades first.
    async fn load_trades(&self, limit: i64) -> anyhow::Result<Vec<TradeRecord>>;
}
