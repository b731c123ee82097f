//! Position lifecycle engine.
//!
//! Drives entries through the risk gate, then manages each open position
//! with a laddered take-profit, a ratcheting trailing stop and a maximum
//! hold time. Evaluations are serialized per mint through a dedicated
//! async lock, so concurrent snapshots for the same token can never
//! interleave state updates; different mints proceed in parallel.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Duration as ChronoDuration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::alerts::AlertSink;
use crate::exec::ExecutionClient;
use crate::persist::{Persistence, TradeRecord};
use crate::risk::RiskManager;
use crate::strategy::position::{trailing_stop_price, PartialSell, PositionState};
use crate::types::{Clock, ExecutionResult, TokenId, TokenSnapshot};

/// Remaining quantity below this is treated as fully closed.
const QTY_EPSILON: f64 = 1e-9;

type SharedPosition = Arc<AsyncMutex<PositionState>>;

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Take-profit ladder as (price multiplier, fraction of remaining
    /// quantity to sell), in ascending multiplier order. Each level fires
    /// at most once per position.
    pub take_profit_levels: Vec<(f64, f64)>,
    /// Trailing stop distance below the high-water mark
    pub trailing_stop_pct: f64,
    /// Maximum hold time before a forced exit
    pub max_hold_time_hours: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            take_profit_levels: vec![(2.0, 0.25), (3.0, 0.25)],
            trailing_stop_pct: 0.15,
            max_hold_time_hours: 24.0,
        }
    }
}

pub struct TradingStrategy {
    exec: Arc<dyn ExecutionClient>,
    risk: Arc<RiskManager>,
    storage: Arc<dyn Persistence>,
    alerts: Arc<dyn AlertSink>,
    config: StrategyConfig,
    clock: Arc<dyn Clock>,
    positions: StdMutex<HashMap<String, SharedPosition>>,
    // Mints with an entry in flight, so racing signals cannot double-open
    // before the position lands in the map.
    opening: StdMutex<HashSet<String>>,
}

impl TradingStrategy {
    pub fn new(
        exec: Arc<dyn ExecutionClient>,
        risk: Arc<RiskManager>,
        storage: Arc<dyn Persistence>,
        alerts: Arc<dyn AlertSink>,
        config: StrategyConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            exec,
            risk,
            storage,
            alerts,
            config,
            clock,
            positions: StdMutex::new(HashMap::new()),
            opening: StdMutex::new(HashSet::new()),
        }
    }

    pub fn has_position(&self, mint: &str) -> bool {
        self.positions.lock().unwrap().contains_key(mint)
    }

    pub fn active_mints(&self) -> Vec<String> {
        self.positions.lock().unwrap().keys().cloned().collect()
    }

    /// Snapshot of a position's current state.
    pub async fn position(&self, mint: &str) -> Option<PositionState> {
        let slot = self.shared(mint)?;
        let pos = slot.lock().await;
        Some(pos.clone())
    }

    fn shared(&self, mint: &str) -> Option<SharedPosition> {
        self.positions.lock().unwrap().get(mint).cloned()
    }

    fn remove_position(&self, mint: &str) {
        self.positions.lock().unwrap().remove(mint);
    }

    fn state_key(mint: &str) -> String {
        format!("position_{mint}")
    }

    /// Write the full position state to storage. Persistence failures are
    /// logged and absorbed; the in-memory state stays authoritative.
    async fn persist(&self, pos: &PositionState) {
        let record = match pos.to_record() {
            Ok(r) => r,
            Err(e) => {
                error!(mint = %pos.token_mint, error = %e, "failed to serialize position");
                return;
            }
        };
        if let Err(e) = self
            .storage
            .save_state_json(&Self::state_key(&pos.token_mint), &record)
            .await
        {
            error!(mint = %pos.token_mint, error = %e, "failed to persist position");
        }
    }

    async fn record_trade(&self, result: &ExecutionResult) {
        let trade = TradeRecord {
            token_mint: result.token_mint.clone(),
            side: result.side.as_str().to_string(),
            qty: result.qty_base,
            price_usd: result.price_exec,
            fee_usd: result.fee_usd,
            ts: result.ts,
        };
        if let Err(e) = self.storage.record_trade(&trade).await {
            error!(mint = %result.token_mint, error = %e, "failed to record trade");
        }
    }

    /// Restore a persisted position into the live map. Returns whether a
    /// position with remaining quantity was found.
    pub async fn load_position(&self, mint: &str) -> anyhow::Result<bool> {
        let Some(record) = self.storage.load_state_json(&Self::state_key(mint)).await? else {
            return Ok(false);
        };
        let pos = PositionState::from_record(&record)?;
        if pos.quantity <= QTY_EPSILON {
            return Ok(false);
        }
        info!(mint, quantity = pos.quantity, "restored position from storage");
        self.risk
            .record_position(mint, pos.entry_price_usd * pos.quantity);
        self.positions
            .lock()
            .unwrap()
            .insert(mint.to_string(), Arc::new(AsyncMutex::new(pos)));
        Ok(true)
    }

    /// Entry point for accepted tokens. At most one position per mint; a
    /// denial or failed buy leaves no trace beyond logs.
    pub async fn on_signal(&self, snap: &TokenSnapshot) -> anyhow::Result<Option<ExecutionResult>> {
        let mint = snap.token.mint.clone();
        {
            let positions = self.positions.lock().unwrap();
            let mut opening = self.opening.lock().unwrap();
            if positions.contains_key(&mint) || !opening.insert(mint.clone()) {
                debug!(%mint, "position already open or opening, ignoring signal");
                return Ok(None);
            }
        }
        let result = self.try_open(snap).await;
        self.opening.lock().unwrap().remove(&mint);
        result
    }

    async fn try_open(&self, snap: &TokenSnapshot) -> anyhow::Result<Option<ExecutionResult>> {
        let mint = &snap.token.mint;
        let (allowed, reasons) = self.risk.allow_buy(snap);
        if !allowed {
            debug!(%mint, ?reasons, "entry denied by risk gate");
            return Ok(None);
        }
        let size_usd = self.risk.size_usd(snap);
        if size_usd <= 0.0 {
            debug!(%mint, "zero position size, skipping entry");
            return Ok(None);
        }

        info!(%mint, price = snap.price_usd, size_usd, "entering position");
        let fill = match self.exec.buy(snap, size_usd).await {
            Ok(fill) => fill,
            Err(e) => {
                error!(%mint, error = %e, "entry buy failed");
                return Ok(None);
            }
        };

        let position = PositionState::open(
            mint.clone(),
            fill.price_exec,
            fill.qty_base,
            self.clock.now(),
            self.config.trailing_stop_pct,
        );
        self.persist(&position).await;
        self.record_trade(&fill).await;

        self.positions
            .lock()
            .unwrap()
            .insert(mint.clone(), Arc::new(AsyncMutex::new(position)));
        self.risk.record_position(mint, size_usd);
        self.risk.set_cooldown(mint);
        // Realized P&L is not yet known at entry.
        self.risk.after_fill(0.0);

        self.alerts
            .push(&format!(
                "Opened {mint} @ {:.6} (${:.2})",
                fill.price_exec, size_usd
            ))
            .await;
        Ok(Some(fill))
    }

    /// Evaluate the take-profit ladder against a fresh snapshot. Levels
    /// fire one at a time, lowest first, each at most once.
    pub async fn take_profits(
        &self,
        snap: &TokenSnapshot,
    ) -> anyhow::Result<Option<ExecutionResult>> {
        let mint = &snap.token.mint;
        let Some(slot) = self.shared(mint) else {
            return Ok(None);
        };
        let mut pos = slot.lock().await;

        let mut dirty = false;
        if snap.price_usd > pos.high_water_mark {
            pos.high_water_mark = snap.price_usd;
            dirty = true;
        }

        if pos.entry_price_usd <= 0.0 || pos.quantity <= QTY_EPSILON {
            return Ok(None);
        }
        let multiple = snap.price_usd / pos.entry_price_usd;
        let fired = self
            .config
            .take_profit_levels
            .iter()
            .copied()
            .find(|(level, _)| multiple >= *level && !pos.level_already_taken(*level));
        let Some((level, fraction)) = fired else {
            if dirty {
                self.persist(&pos).await;
            }
            return Ok(None);
        };

        let sell_qty = pos.quantity * fraction;
        let pct = fraction * 100.0;
        info!(%mint, level, multiple, sell_qty, "take-profit level reached");

        let result = match self.exec.sell(&snap.token, pct).await {
            Ok(result) => result,
            Err(e) => {
                error!(%mint, level, error = %e, "take-profit sell failed");
                if dirty {
                    self.persist(&pos).await;
                }
                return Ok(None);
            }
        };

        pos.quantity -= result.qty_base;
        pos.partial_sells.push(PartialSell {
            ts: self.clock.now(),
            quantity: result.qty_base,
            price: result.price_exec,
            level: Some(level),
            reason: "take_profit".to_string(),
        });
        self.persist(&pos).await;
        self.record_trade(&result).await;
        self.risk.after_fill(result.realized_pnl_usd.unwrap_or(0.0));

        if pos.quantity <= QTY_EPSILON {
            self.close_out(&pos, "take_profit").await;
        }

        self.alerts
            .push(&format!(
                "Take-profit {level}x on {mint}: sold {:.4} @ {:.6}",
                result.qty_base, result.price_exec
            ))
            .await;
        Ok(Some(result))
    }

    /// Ratchet the trailing stop with the high-water mark and exit fully
    /// once price touches it.
    pub async fn trailing_stop(
        &self,
        snap: &TokenSnapshot,
    ) -> anyhow::Result<Option<ExecutionResult>> {
        let mint = &snap.token.mint;
        let Some(slot) = self.shared(mint) else {
            return Ok(None);
        };
        let mut pos = slot.lock().await;

        let mut dirty = false;
        if snap.price_usd > pos.high_water_mark {
            pos.high_water_mark = snap.price_usd;
            dirty = true;
        }
        let candidate = trailing_stop_price(pos.high_water_mark, self.config.trailing_stop_pct);
        // The stop only moves up, never back down.
        if candidate > pos.trailing_stop_price {
            debug!(%mint, stop = candidate, "trailing stop raised");
            pos.trailing_stop_price = candidate;
            dirty = true;
        }
        if dirty {
            self.persist(&pos).await;
        }

        if snap.price_usd <= pos.trailing_stop_price {
            info!(
                %mint,
                price = snap.price_usd,
                stop = pos.trailing_stop_price,
                "trailing stop triggered"
            );
            return self.full_exit(&mut pos, &snap.token, "trailing_stop").await;
        }
        Ok(None)
    }

    /// Force a full exit once the position has been held too long.
    pub async fn time_stop(&self, snap: &TokenSnapshot) -> anyhow::Result<Option<ExecutionResult>> {
        let mint = &snap.token.mint;
        let Some(slot) = self.shared(mint) else {
            return Ok(None);
        };
        let mut pos = slot.lock().await;

        let max_hold =
            ChronoDuration::milliseconds((self.config.max_hold_time_hours * 3_600_000.0) as i64);
        let held = self.clock.now() - pos.entry_time;
        if held < max_hold {
            return Ok(None);
        }
        info!(
            %mint,
            held_hours = held.num_minutes() as f64 / 60.0,
            "maximum hold time reached"
        );
        self.full_exit(&mut pos, &snap.token, "time_stop").await
    }

    /// Sell the entire remaining quantity and tear the position down.
    async fn full_exit(
        &self,
        pos: &mut PositionState,
        token: &TokenId,
        reason: &str,
    ) -> anyhow::Result<Option<ExecutionResult>> {
        let result = match self.exec.sell(token, 100.0).await {
            Ok(result) => result,
            Err(e) => {
                // The position stays open; the next snapshot retries.
                error!(mint = %token.mint, reason, error = %e, "exit sell failed");
                return Ok(None);
            }
        };

        pos.partial_sells.push(PartialSell {
            ts: self.clock.now(),
            quantity: result.qty_base,
            price: result.price_exec,
            level: None,
            reason: reason.to_string(),
        });
        pos.quantity = 0.0;
        self.persist(pos).await;
        self.record_trade(&result).await;
        self.risk.after_fill(result.realized_pnl_usd.unwrap_or(0.0));
        self.close_out(pos, reason).await;

        self.alerts
            .push(&format!(
                "Closed {} ({reason}) @ {:.6}, P&L ${:.2}",
                token.mint,
                result.price_exec,
                result.realized_pnl_usd.unwrap_or(0.0)
            ))
            .await;
        Ok(Some(result))
    }

    async fn close_out(&self, pos: &PositionState, reason: &str) {
        self.remove_position(&pos.token_mint);
        self.risk.close_position(&pos.token_mint);
        self.risk.set_cooldown(&pos.token_mint);
        info!(mint = %pos.token_mint, reason, "position closed");
    }

    /// Run the full lifecycle for one snapshot: try each exit rule in
    /// priority order, otherwise treat the snapshot as an entry signal.
    pub async fn evaluate(&self, snap: &TokenSnapshot) -> anyhow::Result<Option<ExecutionResult>> {
        if self.has_position(&snap.token.mint) {
            if let Some(result) = self.take_profits(snap).await? {
                return Ok(Some(result));
            }
            if let Some(result) = self.trailing_stop(snap).await? {
                return Ok(Some(result));
            }
            if let Some(result) = self.time_stop(snap).await? {
                return Ok(Some(result));
            }
            return Ok(None);
        }
        if snap.price_usd <= 0.0 {
            warn!(mint = %snap.token.mint, "snapshot with invalid price, ignoring");
            return Ok(None);
        }
        self.on_signal(snap).await
    }
}
