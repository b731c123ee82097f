//! mintrunner - autonomous on-chain token trading engine for Solana.
//!
//! Accepted token snapshots flow through a risk gatekeeper into a position
//! lifecycle engine (laddered take-profit, trailing stop, time stop), with
//! interchangeable live (Jupiter) and paper execution backends, SQLite
//! persistence and Telegram alerting.

pub mod alerts;
pub mod config;
pub mod exec;
pub mod persist;
pub mod risk;
pub mod strategy;
pub mod types;

// Re-export the main surface for convenience
pub use config::Settings;
pub use exec::{ExecError, ExecutionClient, JupiterExecutor, PaperExecutor};
pub use risk::{RiskConfig, RiskManager};
pub use strategy::{PositionState, StrategyConfig, TradingStrategy};
pub use types::{ExecutionResult, TokenId, TokenSnapshot, TradeSide};
