//! Position state and pure price math.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One recorded partial exit. `level` carries the take-profit multiplier
/// that fired, or `None` for stop and time exits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialSell {
    pub ts: DateTime<Utc>,
    pub quantity: f64,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    pub reason: String,
}

/// Full state of one open position. Serialized to storage on every
/// mutation so a restart can resume exactly where it left off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    pub token_mint: String,
    pub entry_price_usd: f64,
    /// Remaining base-asset quantity
    pub quantity: f64,
    pub entry_time: DateTime<Utc>,
    /// Highest price seen since entry; never decreases
    pub high_water_mark: f64,
    /// Trailing stop trigger; only ratchets upward
    pub trailing_stop_price: f64,
    #[serde(default)]
    pub partial_sells: Vec<PartialSell>,
}

impl PositionState {
    pub fn open(
        token_mint: impl Into<String>,
        entry_price_usd: f64,
        quantity: f64,
        entry_time: DateTime<Utc>,
        trailing_stop_pct: f64,
    ) -> Self {
        Self {
            token_mint: token_mint.into(),
            entry_price_usd,
            quantity,
            entry_time,
            high_water_mark: entry_price_usd,
            trailing_stop_price: trailing_stop_price(entry_price_usd, trailing_stop_pct),
            partial_sells: Vec::new(),
        }
    }

    /// Whether a take-profit multiplier has already fired for this
    /// position.
    pub fn level_already_taken(&self, level: f64) -> bool {
        self.partial_sells.iter().any(|s| s.level == Some(level))
    }

    pub fn to_record(&self) -> anyhow::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_record(value: &Value) -> anyhow::Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

/// Stop price for a given high-water mark.
pub fn trailing_stop_price(high_water_mark: f64, stop_pct: f64) -> f64 {
    high_water_mark * (1.0 - stop_pct)
}

/// Percentage gain or loss relative to entry.
pub fn pnl_percentage(entry_price: f64, current_price: f64) -> f64 {
    if entry_price == 0.0 {
        return 0.0;
    }
    (current_price - entry_price) / entry_price * 100.0
}
