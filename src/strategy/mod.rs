//! Position lifecycle management.

pub mod engine;
pub mod position;

pub use engine::{StrategyConfig, TradingStrategy};
pub use position::{pnl_percentage, trailing_stop_price, PartialSell, PositionState};
