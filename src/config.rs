//! Application settings.
//!
//! Settings load from a TOML file with full defaults, so an empty file is a
//! valid paper-mode configuration. Live trading is opt-in and guarded by
//! `validate_live_trading`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::exec::JupiterConfig;
use crate::risk::RiskConfig;
use crate::strategy::StrategyConfig;

const PROFILES: &[&str] = &["dev", "paper", "prod"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    // Endpoints
    pub rpc_url: String,
    pub jupiter_base_url: String,
    pub jupiter_requests_per_second: u32,

    // Transaction shaping
    pub max_slippage_bps: u32,
    pub priority_fee_microlamports: u64,
    pub compute_unit_limit: u32,
    pub tip_lamports: u64,
    pub tip_account_b58: Option<String>,
    pub token_decimals: u8,
    pub enable_preflight: bool,

    // Risk
    pub position_size_usd: f64,
    pub daily_max_loss_usd: f64,
    pub cooldown_seconds: u64,
    pub max_concurrent_positions: usize,

    // Strategy
    pub take_profit_levels: Vec<(f64, f64)>,
    pub trailing_stop_pct: f64,
    pub max_hold_time_hours: f64,

    // Paper engine
    pub paper_slippage_bps: u32,
    pub paper_fee_bps: u32,

    // Persistence and alerts
    pub db_path: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,

    /// When true, the paper engine is used regardless of other settings.
    pub dry_run: bool,
    /// Escape hatch for intentionally extreme slippage settings
    pub unsafe_allow_high_slippage: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            jupiter_base_url: "https://quote-api.jup.ag/v6".to_string(),
            jupiter_requests_per_second: 10,
            max_slippage_bps: 100,
            priority_fee_microlamports: 0,
            compute_unit_limit: 120_000,
            tip_lamports: 0,
            tip_account_b58: None,
            token_decimals: 9,
            enable_preflight: true,
            position_size_usd: 50.0,
            daily_max_loss_usd: 200.0,
            cooldown_seconds: 60,
            max_concurrent_positions: 10,
            take_profit_levels: vec![(2.0, 0.25), (3.0, 0.25)],
            trailing_stop_pct: 0.15,
            max_hold_time_hours: 24.0,
            paper_slippage_bps: 100,
            paper_fee_bps: 50,
            db_path: "mintrunner.db".to_string(),
            telegram_bot_token: None,
            telegram_chat_id: None,
            dry_run: true,
            unsafe_allow_high_slippage: false,
        }
    }
}

impl Settings {
    /// Load settings for a profile. The `paper` profile always forces
    /// `dry_run`; `prod` always clears it.
    pub fn load(profile: &str, path: impl AsRef<Path>) -> Result<Self> {
        if !PROFILES.contains(&profile) {
            bail!("unknown profile {profile:?}, expected one of {PROFILES:?}");
        }
        let path = path.as_ref();
        let mut settings = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("invalid config file {}", path.display()))?
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        match profile {
            "paper" => settings.dry_run = true,
            "prod" => settings.dry_run = false,
            _ => {}
        }
        info!(profile, dry_run = settings.dry_run, "settings loaded");
        Ok(settings)
    }

    /// Safety checks that must pass before live trading is allowed.
    pub fn validate_live_trading(&self) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        if self.rpc_url.contains("localhost") || self.rpc_url.contains("127.0.0.1") {
            bail!("live trading against a localhost RPC endpoint is not allowed");
        }
        if self.position_size_usd <= 0.0 {
            bail!("position_size_usd must be positive for live trading");
        }
        if self.position_size_usd > self.daily_max_loss_usd {
            bail!(
                "position_size_usd ({}) exceeds daily_max_loss_usd ({})",
                self.position_size_usd,
                self.daily_max_loss_usd
            );
        }
        if self.max_slippage_bps > 1_000 && !self.unsafe_allow_high_slippage {
            bail!(
                "max_slippage_bps {} exceeds 1000; set unsafe_allow_high_slippage to override",
                self.max_slippage_bps
            );
        }
        Ok(())
    }

    pub fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            position_size_usd: self.position_size_usd,
            daily_max_loss_usd: self.daily_max_loss_usd,
            cooldown_seconds: self.cooldown_seconds,
            max_concurrent_positions: self.max_concurrent_positions,
        }
    }

    pub fn strategy_config(&self) -> StrategyConfig {
        StrategyConfig {
            take_profit_levels: self.take_profit_levels.clone(),
            trailing_stop_pct: self.trailing_stop_pct,
            max_hold_time_hours: self.max_hold_time_hours,
        }
    }

    pub fn jupiter_config(&self) -> JupiterConfig {
        JupiterConfig {
            max_slippage_bps: self.max_slippage_bps,
            priority_fee_microlamports: self.priority_fee_microlamports,
            compute_unit_limit: self.compute_unit_limit,
            tip_lamports: self.tip_lamports,
            tip_account_b58: self.tip_account_b58.clone(),
            token_decimals: self.token_decimals,
            enable_preflight: self.enable_preflight,
        }
    }
}
