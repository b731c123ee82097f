//! Shared helpers for integration tests.

use std::sync::Mutex;

use chrono::{DateTime, Duration, TimeZone, Utc};
use mintrunner::types::{Clock, TokenId, TokenSnapshot};

/// Manually advanced clock for deterministic time-based behavior.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Midday UTC, safely away from the day boundary.
    pub fn midday() -> Self {
        Self::at(Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap())
    }

    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }

    pub fn set(&self, ts: DateTime<Utc>) {
        *self.now.lock().unwrap() = ts;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Healthy snapshot that passes every risk gate at the given price.
pub fn snapshot(mint: &str, price_usd: f64) -> TokenSnapshot {
    TokenSnapshot {
        token: TokenId::sol(mint),
        pool: None,
        price_usd,
        liq_usd: 50_000.0,
        vol_5m_usd: 5_000.0,
        holders: Some(250),
        age_seconds: Some(3_600),
        pct_change_5m: None,
        source: "test".to_string(),
        ts: Utc::now(),
    }
}
