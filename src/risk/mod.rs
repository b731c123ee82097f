//! Risk controls applied before and after every trade.

pub mod manager;

pub use manager::{RiskConfig, RiskManager, RiskSummary};
