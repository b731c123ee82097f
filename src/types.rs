//! Core types shared across the trading engine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token identifier with chain and mint address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId {
    /// Blockchain identifier (e.g., "sol")
    pub chain: String,
    /// Token mint address
    pub mint: String,
}

impl TokenId {
    /// Solana token by mint address.
    pub fn sol(mint: impl Into<String>) -> Self {
        Self {
            chain: "sol".to_string(),
            mint: mint.into(),
        }
    }
}

/// Pool identifier with DEX program and pool address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolId {
    pub program: String,
    pub address: String,
}

/// Immutable market observation for a single token at a point in time.
///
/// Produced by upstream data sources; consumed read-only by every core
/// component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSnapshot {
    pub token: TokenId,
    #[serde(default)]
    pub pool: Option<PoolId>,
    /// Current price in USD
    pub price_usd: f64,
    /// Pool liquidity in USD
    pub liq_usd: f64,
    /// Trailing 5-minute volume in USD
    pub vol_5m_usd: f64,
    #[serde(default)]
    pub holders: Option<u64>,
    #[serde(default)]
    pub age_seconds: Option<u64>,
    #[serde(default)]
    pub pct_change_5m: Option<f64>,
    /// Data source identifier
    pub source: String,
    pub ts: DateTime<Utc>,
}

/// Outcome of an upstream acceptance filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterDecision {
    pub accepted: bool,
    pub score: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

/// Live-mode execution details attached to a fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveFill {
    /// Transaction signature returned by the RPC node
    pub signature: String,
    /// Aggregator quote identifier, when the API returned one
    pub quote_id: Option<String>,
    pub price_impact_pct: f64,
    /// Slippage tolerance that was actually sent, after per-call overrides
    pub slippage_bps: u32,
    /// Raw selected route, kept for auditing
    pub route: Value,
}

/// Outcome of a buy or sell. This is the single contract shared by the live
/// and paper executors; callers depend only on this shape, never on which
/// executor produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub side: TradeSide,
    pub token_mint: String,
    /// Executed price in USD per base token
    pub price_exec: f64,
    /// Base-asset quantity bought or sold
    pub qty_base: f64,
    /// USD cost for buys, USD proceeds for sells, before fees
    pub gross_usd: f64,
    pub fee_usd: f64,
    pub ts: DateTime<Utc>,
    /// Realized P&L for sells where the cost basis is known
    pub realized_pnl_usd: Option<f64>,
    /// Present only for live fills
    pub live: Option<LiveFill>,
}

/// Projected outcome of a trade from the quote step alone. Transient;
/// discarded after sizing checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteSummary {
    pub input_mint: String,
    pub output_mint: String,
    /// Input amount in smallest units
    pub in_amount: u64,
    /// Expected output amount in smallest units
    pub out_amount: u64,
    pub price_impact_pct: f64,
    pub slippage_bps: u32,
    pub ts: DateTime<Utc>,
}

/// Injectable time source so day boundaries, cooldowns and hold timers can
/// be driven deterministically in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shorthand for the default clock.
pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_id_sol_shorthand() {
        let token = TokenId::sol("Mint111");
        assert_eq!(token.chain, "sol");
        assert_eq!(token.mint, "Mint111");
    }

    #[test]
    fn snapshot_optional_fields_default_on_deserialize() {
        let raw = serde_json::json!({
            "token": {"chain": "sol", "mint": "Mint111"},
            "price_usd": 1.5,
            "liq_usd": 10_000.0,
            "vol_5m_usd": 500.0,
            "source": "dexscreener",
            "ts": "2024-06-15T12:00:00Z",
        });
        let snap: TokenSnapshot = serde_json::from_value(raw).unwrap();
        assert!(snap.pool.is_none());
        assert!(snap.holders.is_none());
        assert_eq!(snap.price_usd, 1.5);
    }

    #[test]
    fn filter_decision_round_trip() {
        let decision = FilterDecision {
            accepted: false,
            score: 0.42,
            reasons: vec!["low liquidity".to_string()],
        };
        let value = serde_json::to_value(&decision).unwrap();
        let back: FilterDecision = serde_json::from_value(value).unwrap();
        assert!(!back.accepted);
        assert_eq!(back.reasons.len(), 1);
    }

    #[test]
    fn trade_side_serializes_lowercase() {
        assert_eq!(serde_json::to_value(TradeSide::Buy).unwrap(), "buy");
        assert_eq!(TradeSide::Sell.as_str(), "sell");
    }
}
