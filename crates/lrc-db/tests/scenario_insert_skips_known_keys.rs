//! Inserting the same entries twice stores them once, and the stored keys
//! come back in the form the reconciler compares against.
//!
//! DB-backed test, skipped if LRC_DATABASE_URL is not set.

use chrono::{TimeZone, Utc};
use lrc_db::PgLedgerStore;
use lrc_runtime::LedgerStore;
use lrc_schemas::{Category, Key, LedgerEntry, RawRecord};
use rust_decimal::Decimal;
use serde_json::json;

fn entry(source: &str, account: &str, key: Key, amount: Decimal) -> LedgerEntry {
    LedgerEntry {
        key,
        source: source.to_string(),
        account: account.to_string(),
        category: Category::NormalTx,
        timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        amount,
        asset: "ETH".to_string(),
        fee: Decimal::new(21, 6),
        counterparty_from: Some("0xfeed".to_string()),
        counterparty_to: Some(account.to_string()),
        raw: RawRecord::from_value(json!({"hash": "0xabc"})).unwrap(),
    }
}

#[tokio::test]
async fn insert_is_idempotent_and_keys_round_trip() -> anyhow::Result<()> {
    let url = match std::env::var(lrc_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: LRC_DATABASE_URL not set");
            return Ok(());
        }
    };
    let pool = lrc_db::connect(&url).await?;
    lrc_db::migrate(&pool).await?;

    // Unique source per run keeps reruns independent.
    let source = format!("test-{}", uuid::Uuid::new_v4());
    let account = "0xacc0";
    let store = PgLedgerStore::new(pool.clone());

    let entries = vec![
        entry(&source, account, Key::from_text("0xABC").unwrap(), Decimal::new(15, 1)),
        entry(&source, account, Key::paired(7, 3), Decimal::new(-2, 0)),
    ];
    assert_eq!(store.insert(&entries).await?, 2);
    assert_eq!(store.insert(&entries).await?, 0);

    let keys = store.known_keys(&source, account, Category::NormalTx).await?;
    assert_eq!(keys.len(), 2);
    assert!(keys.contains(&Key::from_text("0xabc").unwrap()));
    assert!(keys.contains(&Key::paired(7, 3)));
    assert!(store.known_keys(&source, account, Category::TokenTx).await?.is_empty());

    let rows = lrc_db::fetch_entries(&pool, &source, account).await?;
    let total: Decimal = rows.iter().map(|r| r.amount).sum();
    assert_eq!(total, Decimal::new(-5, 1));

    Ok(())
}

#[tokio::test]
async fn balance_defaults_to_zero_and_upserts() -> anyhow::Result<()> {
    let url = match std::env::var(lrc_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: LRC_DATABASE_URL not set");
            return Ok(());
        }
    };
    let pool = lrc_db::connect(&url).await?;
    lrc_db::migrate(&pool).await?;

    let account = format!("acct-{}", uuid::Uuid::new_v4());
    let store = PgLedgerStore::new(pool.clone());
    assert_eq!(store.known_balance(&account).await?, Decimal::ZERO);

    lrc_db::upsert_balance(&pool, &account, Decimal::new(1_000_000_005, 9)).await?;
    lrc_db::upsert_balance(&pool, &account, Decimal::new(2_000_000_005, 9)).await?;
    assert_eq!(store.known_balance(&account).await?, Decimal::new(2_000_000_005, 9));
    Ok(())
}
