//! Tests for the storage backends: the shared contract against both the
//! SQLite and in-memory implementations, plus SQLite durability across
//! reopens.

use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use mintrunner::persist::{MemoryStorage, Persistence, SqliteStorage, TradeRecord};
use serde_json::json;

/// Unique database path per test so parallel tests never collide.
fn temp_db(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("mintrunner_test_{}_{}.db", std::process::id(), name));
    let _ = std::fs::remove_file(&path);
    path
}

fn ts(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, hour, minute, 0).unwrap()
}

fn trade(mint: &str, side: &str, qty: f64, at: DateTime<Utc>) -> TradeRecord {
    TradeRecord {
        token_mint: mint.to_string(),
        side: side.to_string(),
        qty,
        price_usd: 1.25,
        fee_usd: 0.05,
        ts: at,
    }
}

/// The behavior every backend must share.
async fn exercise_contract(storage: &dyn Persistence) {
    // State JSON: missing key, round trip, overwrite.
    assert!(storage.load_state_json("position_MintA").await.unwrap().is_none());

    let state = json!({"quantity": 37.5, "high_water_mark": 2.0});
    storage.save_state_json("position_MintA", &state).await.unwrap();
    assert_eq!(
        storage.load_state_json("position_MintA").await.unwrap(),
        Some(state)
    );

    let updated = json!({"quantity": 0.0, "high_water_mark": 3.0});
    storage.save_state_json("position_MintA", &updated).await.unwrap();
    assert_eq!(
        storage.load_state_json("position_MintA").await.unwrap(),
        Some(updated)
    );

    // Trades come back most recent first, bounded by the limit.
    storage.record_trade(&trade("MintA", "buy", 50.0, ts(10, 0))).await.unwrap();
    storage.record_trade(&trade("MintA", "sell", 12.5, ts(11, 0))).await.unwrap();
    storage.record_trade(&trade("MintB", "buy", 80.0, ts(12, 0))).await.unwrap();

    let recent = storage.load_trades(2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].token_mint, "MintB");
    assert_eq!(recent[0].ts, ts(12, 0));
    assert_eq!(recent[1].side, "sell");

    let all = storage.load_trades(10).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[2].side, "buy");
    assert_eq!(all[2].qty, 50.0);
    assert_eq!(all[2].fee_usd, 0.05);

    // Positions upsert in place; zero-quantity rows drop out of loads.
    storage.upsert_position("MintA", 50.0, 1.0).await.unwrap();
    storage.upsert_position("MintB", 80.0, 0.5).await.unwrap();
    storage.upsert_position("MintA", 37.5, 1.0).await.unwrap();

    let mut positions = storage.load_positions().await.unwrap();
    positions.sort_by(|a, b| a.token_mint.cmp(&b.token_mint));
    assert_eq!(positions.len(), 2);
    assert_eq!(positions[0].token_mint, "MintA");
    assert_eq!(positions[0].qty, 37.5);
    assert_eq!(positions[0].avg_cost_usd, 1.0);
    assert_eq!(positions[1].qty, 80.0);

    storage.upsert_position("MintA", 0.0, 1.0).await.unwrap();
    let positions = storage.load_positions().await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].token_mint, "MintB");
}

#[tokio::test]
async fn memory_storage_honors_the_contract() {
    let storage = MemoryStorage::new();
    exercise_contract(&storage).await;
}

#[tokio::test]
async fn sqlite_storage_honors_the_contract() {
    let path = temp_db("contract");
    let storage = SqliteStorage::new(path.to_str().unwrap()).await.unwrap();
    exercise_contract(&storage).await;
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn sqlite_data_survives_reopen() {
    let path = temp_db("reopen");
    let db_path = path.to_str().unwrap();

    {
        let storage = SqliteStorage::new(db_path).await.unwrap();
        storage
            .save_state_json("position_MintA", &json!({"quantity": 28.125}))
            .await
            .unwrap();
        storage.record_trade(&trade("MintA", "buy", 50.0, ts(9, 30))).await.unwrap();
        storage.upsert_position("MintA", 28.125, 1.0).await.unwrap();
    }

    let storage = SqliteStorage::new(db_path).await.unwrap();
    let state = storage.load_state_json("position_MintA").await.unwrap().unwrap();
    assert_eq!(state["quantity"], 28.125);

    let trades = storage.load_trades(10).await.unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].token_mint, "MintA");
    assert_eq!(trades[0].ts, ts(9, 30));

    let positions = storage.load_positions().await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].qty, 28.125);

    let _ = std::fs::remove_file(&path);
}
