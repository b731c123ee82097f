//! Paper-mode demo driver.
//!
//! Wires the full engine together with the paper executor and walks one
//! token through a scripted price path: entry, a 2x take-profit, then a
//! trailing-stop exit.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use mintrunner::alerts::NoopAlertSink;
use mintrunner::config::Settings;
use mintrunner::exec::PaperExecutor;
use mintrunner::persist::SqliteStorage;
use mintrunner::risk::RiskManager;
use mintrunner::strategy::TradingStrategy;
use mintrunner::types::{system_clock, TokenId, TokenSnapshot};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let profile = std::env::args().nth(1).unwrap_or_else(|| "paper".to_string());
    let settings = Settings::load(&profile, "config.toml")?;
    settings.validate_live_trading()?;

    info!(profile, "starting mintrunner paper demo");

    let clock = system_clock();
    let storage = Arc::new(SqliteStorage::new(&settings.db_path).await?);
    let paper = Arc::new(PaperExecutor::new(
        settings.paper_slippage_bps,
        settings.paper_fee_bps,
    ));
    let risk = Arc::new(RiskManager::new(settings.risk_config(), clock.clone()));
    let strategy = TradingStrategy::new(
        paper.clone(),
        risk.clone(),
        storage.clone(),
        Arc::new(NoopAlertSink),
        settings.strategy_config(),
        clock,
    );

    let token = TokenId::sol("DemoTokenMint1111111111111111111111111111111");
    // Entry at $1, ride to $3, then fall through the trailing stop.
    let price_path = [1.0, 1.2, 2.1, 3.05, 2.8, 2.4];

    for price in price_path {
        let snap = snapshot(&token, price);
        paper.observe(&snap);
        if let Some(result) = strategy.evaluate(&snap).await? {
            info!(
                side = result.side.as_str(),
                price_exec = result.price_exec,
                qty = result.qty_base,
                realized = result.realized_pnl_usd.unwrap_or(0.0),
                "fill"
            );
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
    }

    let summary = risk.summary();
    info!(
        daily_pnl = summary.daily_pnl,
        remaining_budget = summary.remaining_daily_budget,
        open_positions = summary.active_positions,
        "demo complete"
    );
    info!(db_path = %settings.db_path, "trade history persisted");

    Ok(())
}

fn snapshot(token: &TokenId, price: f64) -> TokenSnapshot {
    TokenSnapshot {
        token: token.clone(),
        pool: None,
        price_usd: price,
        liq_usd: 25_000.0,
        vol_5m_usd: 4_000.0,
        holders: Some(320),
        age_seconds: Some(1_800),
        pct_change_5m: None,
        source: "demo".to_string(),
        ts: Utc::now(),
    }
}
