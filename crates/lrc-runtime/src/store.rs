//! Store collaborator contract.
//!
//! Implementations: `lrc-testkit::MemoryStore`, the CLI file store and
//! `lrc-db::PgLedgerStore`.

use std::collections::HashSet;

use async_trait::async_trait;
use lrc_schemas::{Category, Key, LedgerEntry};
use rust_decimal::Decimal;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Keys the store already holds for one `(source, account, category)`.
    async fn known_keys(
        &self,
        source: &str,
        account: &str,
        category: Category,
    ) -> anyhow::Result<HashSet<Key>>;

    /// Recorded balance of `account`. Zero when the store has none.
    async fn known_balance(&self, account: &str) -> anyhow::Result<Decimal>;

    /// Persist entries; already present `(source, account, category, key)`
    /// rows are skipped. Returns the number actually inserted.
    async fn insert(&self, entries: &[LedgerEntry]) -> anyhow::Result<usize>;
}
