//! In-memory storage backend for tests and dry runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::{Persistence, StoredPosition, TradeRecord};

/// Hash-map backed storage with the same contract as the SQLite backend.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<HashMap<String, Value>>,
    positions: Mutex<HashMap<String, StoredPosition>>,
    trades: Mutex<Vec<TradeRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trade_count(&self) -> usize {
        self.trades.lock().unwrap().len()
    }
}

#[async_trait]
impl Persistence for MemoryStorage {
    async fn save_state_json(&self, key: &str, value: &Value) -> anyhow::Result<()> {
        self.state
            .lock()
            .unwrap()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn load_state_json(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.state.lock().unwrap().get(key).cloned())
    }

    async fn record_trade(&self, trade: &TradeRecord) -> anyhow::Result<()> {
        self.trades.lock().unwrap().push(trade.clone());
        Ok(())
    }

    async fn upsert_position(
        &self,
        token_mint: &str,
        qty: f64,
        avg_cost_usd: f64,
    ) -> anyhow::Result<()> {
        self.positions.lock().unwrap().insert(
            token_mint.to_string(),
            StoredPosition {
                token_mint: token_mint.to_string(),
                qty,
                avg_cost_usd,
                updated_ts: Utc::now(),
            },
        );
        Ok(())
    }

    async fn load_positions(&self) -> anyhow::Result<Vec<StoredPosition>> {
        Ok(self
            .positions
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.qty > 0.0)
            .cloned()
            .collect())
    }

    async fn load_trades(&self, limit: i64) -> anyhow::Result<Vec<TradeRecord>> {
        let trades = self.trades.lock().unwrap();
        Ok(trades
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
