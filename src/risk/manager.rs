//! Pre-trade gatekeeper and position sizer.
//!
//! State is in-memory and day-scoped: realized P&L accumulates against a
//! daily loss budget that resets at UTC midnight, cooldowns throttle
//! re-entry per token, and a registry of open positions bounds concurrency.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::types::{Clock, TokenSnapshot};

/// Minimum pool liquidity to consider a token tradeable at all.
const MIN_LIQUIDITY_USD: f64 = 1_000.0;
/// Minimum 5-minute volume to consider a token alive.
const MIN_VOLUME_5M_USD: f64 = 100.0;
/// A position may not exceed a tenth of pool liquidity.
const LIQUIDITY_SIZE_DIVISOR: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Base position size in USD
    pub position_size_usd: f64,
    /// Daily realized-loss budget in USD
    pub daily_max_loss_usd: f64,
    /// Per-token re-entry cooldown
    pub cooldown_seconds: u64,
    pub max_concurrent_positions: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            position_size_usd: 50.0,
            daily_max_loss_usd: 200.0,
            cooldown_seconds: 60,
            max_concurrent_positions: 10,
        }
    }
}

#[derive(Debug)]
struct RiskState {
    /// Realized P&L since the day boundary; losses are negative
    daily_pnl: f64,
    day_start: DateTime<Utc>,
    /// Last trade time per mint
    cooldowns: HashMap<String, DateTime<Utc>>,
    /// Open position sizes in USD, keyed by mint
    active_positions: HashMap<String, f64>,
}

/// Snapshot of risk state for logging and status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct RiskSummary {
    pub daily_pnl: f64,
    pub remaining_daily_budget: f64,
    pub active_positions: usize,
    pub tokens_in_cooldown: usize,
}

pub struct RiskManager {
    config: RiskConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<RiskState>,
}

impl RiskManager {
    pub fn new(config: RiskConfig, clock: Arc<dyn Clock>) -> Self {
        let day_start = Self::day_start_of(clock.now());
        Self {
            config,
            clock,
            state: Mutex::new(RiskState {
                daily_pnl: 0.0,
                day_start,
                cooldowns: HashMap::new(),
                active_positions: HashMap::new(),
            }),
        }
    }

    fn day_start_of(now: DateTime<Utc>) -> DateTime<Utc> {
        now.date_naive().and_time(NaiveTime::MIN).and_utc()
    }

    /// Roll the day forward if the clock crossed UTC midnight: P&L resets
    /// and cooldowns clear. Open positions survive the boundary.
    fn reset_daily_if_needed(&self, state: &mut RiskState) {
        let current = Self::day_start_of(self.clock.now());
        if current > state.day_start {
            info!(
                previous_pnl = state.daily_pnl,
                "new trading day, resetting daily P&L and cooldowns"
            );
            state.daily_pnl = 0.0;
            state.day_start = current;
            state.cooldowns.clear();
        }
    }

    fn remaining_budget(&self, state: &RiskState) -> f64 {
        self.config.daily_max_loss_usd + state.daily_pnl
    }

    /// Position size in USD for a prospective entry: the base size, capped
    /// by the remaining daily budget and by a tenth of pool liquidity.
    /// Never negative.
    pub fn size_usd(&self, snap: &TokenSnapshot) -> f64 {
        let mut state = self.state.lock().unwrap();
        self.reset_daily_if_needed(&mut state);

        let remaining = self.remaining_budget(&state);
        if remaining <= 0.0 {
            warn!(daily_pnl = state.daily_pnl, "daily loss budget exhausted");
            return 0.0;
        }

        let mut size = self.config.position_size_usd.min(remaining);
        let liquidity_cap = snap.liq_usd / LIQUIDITY_SIZE_DIVISOR;
        if liquidity_cap < size {
            info!(
                mint = %snap.token.mint,
                liquidity = snap.liq_usd,
                adjusted = liquidity_cap,
                "reduced position size for thin liquidity"
            );
            size = liquidity_cap;
        }
        size.max(0.0)
    }

    /// Evaluate every entry precondition and return the full list of
    /// violations, not just the first.
    pub fn allow_buy(&self, snap: &TokenSnapshot) -> (bool, Vec<String>) {
        let mut state = self.state.lock().unwrap();
        self.reset_daily_if_needed(&mut state);

        let now = self.clock.now();
        let mint = &snap.token.mint;
        let mut reasons = Vec::new();

        if self.remaining_budget(&state) <= 0.0 {
            reasons.push("Daily loss limit exceeded".to_string());
        }

        if let Some(last) = state.cooldowns.get(mint) {
            let elapsed = (now - *last).num_milliseconds() as f64 / 1_000.0;
            let cooldown = self.config.cooldown_seconds as f64;
            if elapsed < cooldown {
                reasons.push(format!(
                    "Token in cooldown ({:.1}s remaining)",
                    cooldown - elapsed
                ));
            }
        }

        if state.active_positions.len() >= self.config.max_concurrent_positions {
            reasons.push("Maximum concurrent positions reached".to_string());
        }

        if state.active_positions.contains_key(mint) {
            reasons.push("Already have position in this token".to_string());
        }

        if snap.liq_usd < MIN_LIQUIDITY_USD {
            reasons.push("Insufficient liquidity".to_string());
        }

        if snap.vol_5m_usd < MIN_VOLUME_5M_USD {
            reasons.push("Insufficient trading volume".to_string());
        }

        if snap.price_usd <= 0.0 {
            reasons.push("Invalid price".to_string());
        }

        let allowed = reasons.is_empty();
        if !allowed {
            info!(mint = %mint, ?reasons, "buy request denied");
        }
        (allowed, reasons)
    }

    /// Fold a realized P&L delta into the daily total.
    pub fn after_fill(&self, pnl_usd: f64) {
        let mut state = self.state.lock().unwrap();
        self.reset_daily_if_needed(&mut state);
        state.daily_pnl += pnl_usd;
        info!(pnl_usd, daily_pnl = state.daily_pnl, "recorded fill P&L");
    }

    /// Register an open position against the concurrency limit.
    pub fn record_position(&self, mint: &str, size_usd: f64) {
        let mut state = self.state.lock().unwrap();
        state.active_positions.insert(mint.to_string(), size_usd);
    }

    /// Remove a closed position from the registry.
    pub fn close_position(&self, mint: &str) {
        let mut state = self.state.lock().unwrap();
        state.active_positions.remove(mint);
    }

    /// Start the re-entry cooldown for a token.
    pub fn set_cooldown(&self, mint: &str) {
        let mut state = self.state.lock().unwrap();
        state.cooldowns.insert(mint.to_string(), self.clock.now());
    }

    pub fn daily_pnl(&self) -> f64 {
        let mut state = self.state.lock().unwrap();
        self.reset_daily_if_needed(&mut state);
        state.daily_pnl
    }

    pub fn remaining_daily_budget(&self) -> f64 {
        let mut state = self.state.lock().unwrap();
        self.reset_daily_if_needed(&mut state);
        self.remaining_budget(&state)
    }

    pub fn active_position_count(&self) -> usize {
        self.state.lock().unwrap().active_positions.len()
    }

    pub fn summary(&self) -> RiskSummary {
        let mut state = self.state.lock().unwrap();
        self.reset_daily_if_needed(&mut state);
        RiskSummary {
            daily_pnl: state.daily_pnl,
            remaining_daily_budget: self.remaining_budget(&state),
            active_positions: state.active_positions.len(),
            tokens_in_cooldown: state.cooldowns.len(),
        }
    }
}
