use std::collections::HashSet;

use async_trait::async_trait;
use lrc_runtime::LedgerStore;
use lrc_schemas::{Category, Key, LedgerEntry};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::debug;

/// [`LedgerStore`] backed by the `ledger_entries` / `account_balances` tables.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn known_keys(
        &self,
        source: &str,
        account: &str,
        category: Category,
    ) -> anyhow::Result<HashSet<Key>> {
        let keys = crate::known_keys(&self.pool, source, account, category).await?;
        debug!(source, account, category = %category, keys = keys.len(), "known keys loaded");
        Ok(keys)
    }

    async fn known_balance(&self, account: &str) -> anyhow::Result<Decimal> {
        crate::known_balance(&self.pool, account).await
    }

    async fn insert(&self, entries: &[LedgerEntry]) -> anyhow::Result<usize> {
        crate::insert_entries(&self.pool, entries).await
    }
}
