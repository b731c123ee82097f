//! Paper trading engine.
//!
//! Mirrors the live execution contract against a virtual ledger: buys apply
//! unfavorable slippage and a taker fee, sells realize P&L against the
//! average cost basis. No network calls are made.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::exec::jupiter::{USDC_DECIMALS, USDC_MINT};
use crate::exec::{ExecError, ExecutionClient};
use crate::types::{
    Clock, ExecutionResult, QuoteSummary, SystemClock, TokenId, TokenSnapshot, TradeSide,
};

/// Remaining quantity below this is treated as fully closed.
const QTY_EPSILON: f64 = 1e-9;

/// One virtual holding, tracked at average cost.
#[derive(Debug, Clone)]
pub struct VirtualPosition {
    pub token_mint: String,
    pub qty_base: f64,
    pub avg_cost_usd: f64,
}

impl VirtualPosition {
    fn add_fill(&mut self, qty: f64, cost_usd: f64) {
        let total_cost = self.avg_cost_usd * self.qty_base + cost_usd;
        self.qty_base += qty;
        if self.qty_base > 0.0 {
            self.avg_cost_usd = total_cost / self.qty_base;
        }
    }

    /// Remove quantity and return its cost basis.
    fn reduce(&mut self, qty: f64) -> f64 {
        let basis = self.avg_cost_usd * qty;
        self.qty_base -= qty;
        basis
    }
}

/// Simulated execution engine with configurable slippage and fee.
pub struct PaperExecutor {
    slippage_bps: u32,
    fee_bps: u32,
    clock: Arc<dyn Clock>,
    positions: Mutex<HashMap<String, VirtualPosition>>,
    // Last observed price per mint, so percentage sells have a mark price.
    marks: Mutex<HashMap<String, f64>>,
}

impl PaperExecutor {
    pub fn new(slippage_bps: u32, fee_bps: u32) -> Self {
        Self {
            slippage_bps,
            fee_bps,
            clock: Arc::new(SystemClock),
            positions: Mutex::new(HashMap::new()),
            marks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Record the latest market price for a mint. Drivers feed every
    /// snapshot through here so later sells execute at market rather than
    /// at the stale cost basis.
    pub fn observe(&self, snap: &TokenSnapshot) {
        if snap.price_usd > 0.0 {
            self.marks
                .lock()
                .unwrap()
                .insert(snap.token.mint.clone(), snap.price_usd);
        }
    }

    /// Current virtual holding for a mint, if any.
    pub fn position(&self, mint: &str) -> Option<VirtualPosition> {
        self.positions.lock().unwrap().get(mint).cloned()
    }

    /// Unrealized P&L for a mint at the last observed price.
    pub fn unrealized_pnl(&self, mint: &str) -> Option<f64> {
        let positions = self.positions.lock().unwrap();
        let position = positions.get(mint)?;
        let mark = self.marks.lock().unwrap().get(mint).copied()?;
        Some((mark - position.avg_cost_usd) * position.qty_base)
    }

    /// Slippage always moves against the trade: buys pay more, sells
    /// receive less.
    fn exec_price(&self, market_price: f64, side: TradeSide) -> f64 {
        let slip = self.slippage_bps as f64 / 10_000.0;
        match side {
            TradeSide::Buy => market_price * (1.0 + slip),
            TradeSide::Sell => market_price * (1.0 - slip),
        }
    }

    fn fee(&self, notional_usd: f64) -> f64 {
        notional_usd * self.fee_bps as f64 / 10_000.0
    }
}

#[async_trait]
impl ExecutionClient for PaperExecutor {
    async fn simulate(
        &self,
        snap: &TokenSnapshot,
        usd_amount: f64,
    ) -> Result<QuoteSummary, ExecError> {
        if usd_amount <= 0.0 {
            return Err(ExecError::InvalidAmount(format!(
                "simulation amount must be positive, got {usd_amount}"
            )));
        }
        if snap.price_usd <= 0.0 {
            return Err(ExecError::InvalidAmount(format!(
                "invalid snapshot price: {}",
                snap.price_usd
            )));
        }
        self.observe(snap);

        let price = self.exec_price(snap.price_usd, TradeSide::Buy);
        let qty = usd_amount / price;
        Ok(QuoteSummary {
            input_mint: USDC_MINT.to_string(),
            output_mint: snap.token.mint.clone(),
            in_amount: (usd_amount * 10f64.powi(USDC_DECIMALS as i32)) as u64,
            out_amount: (qty * 1e9) as u64,
            price_impact_pct: self.slippage_bps as f64 / 100.0,
            slippage_bps: self.slippage_bps,
            ts: self.clock.now(),
        })
    }

    async fn buy(&self, snap: &TokenSnapshot, usd_amount: f64) -> Result<ExecutionResult, ExecError> {
        if usd_amount <= 0.0 {
            return Err(ExecError::InvalidAmount(format!(
                "buy amount must be positive, got {usd_amount}"
            )));
        }
        if snap.price_usd <= 0.0 {
            return Err(ExecError::InvalidAmount(format!(
                "invalid snapshot price: {}",
                snap.price_usd
            )));
        }
        self.observe(snap);

        let price = self.exec_price(snap.price_usd, TradeSide::Buy);
        let qty = usd_amount / price;
        let fee = self.fee(usd_amount);

        {
            let mut positions = self.positions.lock().unwrap();
            positions
                .entry(snap.token.mint.clone())
                .or_insert_with(|| VirtualPosition {
                    token_mint: snap.token.mint.clone(),
                    qty_base: 0.0,
                    avg_cost_usd: 0.0,
                })
                .add_fill(qty, usd_amount + fee);
        }

        info!(
            mint = %snap.token.mint,
            price_exec = price,
            qty,
            usd_amount,
            fee,
            "paper buy filled"
        );

        Ok(ExecutionResult {
            side: TradeSide::Buy,
            token_mint: snap.token.mint.clone(),
            price_exec: price,
            qty_base: qty,
            gross_usd: usd_amount,
            fee_usd: fee,
            ts: self.clock.now(),
            realized_pnl_usd: None,
            live: None,
        })
    }

    async fn sell(&self, token: &TokenId, pct: f64) -> Result<ExecutionResult, ExecError> {
        if !(pct > 0.0 && pct <= 100.0) {
            return Err(ExecError::InvalidAmount(format!(
                "sell percentage must be in (0, 100], got {pct}"
            )));
        }

        let mut positions = self.positions.lock().unwrap();
        let position = positions
            .get_mut(&token.mint)
            .ok_or_else(|| ExecError::NoPosition(token.mint.clone()))?;

        let mark = self
            .marks
            .lock()
            .unwrap()
            .get(&token.mint)
            .copied()
            .unwrap_or(position.avg_cost_usd);
        let price = self.exec_price(mark, TradeSide::Sell);

        // Requested quantity, capped at what the ledger actually holds.
        let qty = (position.qty_base * pct / 100.0).min(position.qty_base);
        let proceeds = qty * price;
        let fee = self.fee(proceeds);
        let basis = position.reduce(qty);
        let realized = proceeds - fee - basis;

        if position.qty_base <= QTY_EPSILON {
            positions.remove(&token.mint);
            debug!(mint = %token.mint, "paper position fully closed");
        }

        info!(
            mint = %token.mint,
            price_exec = price,
            qty,
            proceeds,
            fee,
            realized,
            "paper sell filled"
        );

        Ok(ExecutionResult {
            side: TradeSide::Sell,
            token_mint: token.mint.clone(),
            price_exec: price,
            qty_base: qty,
            gross_usd: proceeds,
            fee_usd: fee,
            ts: self.clock.now(),
            realized_pnl_usd: Some(realized),
            live: None,
        })
    }
}
