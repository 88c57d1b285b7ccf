//! lrc-db
//!
//! PostgreSQL store for reconciled ledger entries and recorded balances.
//! Keys are stored in their canonical text form; amounts as `numeric`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use lrc_schemas::{Category, Key, LedgerEntry};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::collections::HashSet;

mod store;

pub use store::PgLedgerStore;

pub const ENV_DB_URL: &str = "LRC_DATABASE_URL";

/// Connect to Postgres using LRC_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_ledger_table: bool,
    pub has_balance_table: bool,
}

/// Connectivity plus schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_ledger_table: table_exists(pool, "ledger_entries").await?,
        has_balance_table: table_exists(pool, "account_balances").await?,
    })
}

async fn table_exists(pool: &PgPool, table: &str) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = 'public' and table_name = $1
        )
        "#,
    )
    .bind(table)
    .fetch_one(pool)
    .await
    .with_context(|| format!("status table-exists query failed: {table}"))?;
    Ok(exists)
}

// ---------------------------------------------------------------------------
// Ledger entries
// ---------------------------------------------------------------------------

/// Keys already stored for one (source, account, category).
pub async fn known_keys(
    pool: &PgPool,
    source: &str,
    account: &str,
    category: Category,
) -> Result<HashSet<Key>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        select entry_key
        from ledger_entries
        where source = $1 and account = $2 and category = $3
        "#,
    )
    .bind(source)
    .bind(account)
    .bind(category.as_str())
    .fetch_all(pool)
    .await
    .context("known_keys query failed")?;

    rows.into_iter()
        .map(|(k,)| {
            k.parse::<Key>()
                .with_context(|| format!("stored entry_key is not a valid key: '{k}'"))
        })
        .collect()
}

/// Insert entries in one transaction. Rows already present are skipped.
/// Returns the number of rows actually inserted.
pub async fn insert_entries(pool: &PgPool, entries: &[LedgerEntry]) -> Result<usize> {
    let mut tx = pool.begin().await.context("insert_entries begin failed")?;
    let mut inserted = 0u64;

    for e in entries {
        let res = sqlx::query(
            r#"
            insert into ledger_entries (
              source, account, category, entry_key, ts_utc, amount, asset, fee,
              counterparty_from, counterparty_to, raw
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11
            )
            on conflict (source, account, category, entry_key) do nothing
            "#,
        )
        .bind(&e.source)
        .bind(&e.account)
        .bind(e.category.as_str())
        .bind(e.key.to_string())
        .bind(e.timestamp)
        .bind(e.amount)
        .bind(&e.asset)
        .bind(e.fee)
        .bind(e.counterparty_from.as_deref())
        .bind(e.counterparty_to.as_deref())
        .bind(sqlx::types::Json(&e.raw))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("insert ledger entry failed: key={}", e.key))?;
        inserted += res.rows_affected();
    }

    tx.commit().await.context("insert_entries commit failed")?;
    Ok(inserted as usize)
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub entry_key: String,
    pub ts_utc: DateTime<Utc>,
    pub amount: Decimal,
    pub fee: Decimal,
    pub asset: String,
}

/// Stored entries of one account, oldest first.
pub async fn fetch_entries(pool: &PgPool, source: &str, account: &str) -> Result<Vec<StoredEntry>> {
    let rows: Vec<(String, DateTime<Utc>, Decimal, Decimal, String)> = sqlx::query_as(
        r#"
        select entry_key, ts_utc, amount, fee, asset
        from ledger_entries
        where source = $1 and account = $2
        order by ts_utc asc, category asc, entry_key asc
        "#,
    )
    .bind(source)
    .bind(account)
    .fetch_all(pool)
    .await
    .context("fetch_entries query failed")?;

    Ok(rows
        .into_iter()
        .map(|(entry_key, ts_utc, amount, fee, asset)| StoredEntry {
            entry_key,
            ts_utc,
            amount,
            fee,
            asset,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Balances
// ---------------------------------------------------------------------------

/// Recorded balance of `account`; zero when none is recorded.
pub async fn known_balance(pool: &PgPool, account: &str) -> Result<Decimal> {
    let row: Option<(Decimal,)> =
        sqlx::query_as("select balance from account_balances where account = $1")
            .bind(account)
            .fetch_optional(pool)
            .await
            .context("known_balance query failed")?;
    Ok(row.map_or(Decimal::ZERO, |(b,)| b))
}

pub async fn upsert_balance(pool: &PgPool, account: &str, balance: Decimal) -> Result<()> {
    sqlx::query(
        r#"
        insert into account_balances (account, balance, updated_at)
        values ($1, $2, now())
        on conflict (account) do update
          set balance = excluded.balance, updated_at = excluded.updated_at
        "#,
    )
    .bind(account)
    .bind(balance)
    .execute(pool)
    .await
    .context("upsert_balance failed")?;
    Ok(())
}
