use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use lrc_runtime::LedgerStore;
use lrc_schemas::{Category, Key, LedgerEntry};
use rust_decimal::Decimal;

type Slot = (String, String, Category);

#[derive(Default)]
struct Inner {
    keys: HashMap<Slot, HashSet<Key>>,
    balances: HashMap<String, Decimal>,
    rows: Vec<LedgerEntry>,
    snapshot_reads: usize,
}

/// In-memory store. Inserts skip rows whose `(source, account, category, key)`
/// is already present, matching the database store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_reads: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every read errors.
    pub fn failing() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    pub fn with_keys<I, K>(self, source: &str, account: &str, category: Category, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        {
            let mut inner = self.lock();
            inner
                .keys
                .entry((source.to_string(), account.to_string(), category))
                .or_default()
                .extend(keys.into_iter().map(Into::into));
        }
        self
    }

    pub fn with_balance(self, account: &str, balance: Decimal) -> Self {
        self.lock().balances.insert(account.to_string(), balance);
        self
    }

    pub fn rows(&self) -> Vec<LedgerEntry> {
        self.lock().rows.clone()
    }

    pub fn key_count(&self, source: &str, account: &str, category: Category) -> usize {
        self.lock()
            .keys
            .get(&(source.to_string(), account.to_string(), category))
            .map_or(0, HashSet::len)
    }

    /// Number of `known_keys` calls served.
    pub fn snapshot_reads(&self) -> usize {
        self.lock().snapshot_reads
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn known_keys(
        &self,
        source: &str,
        account: &str,
        category: Category,
    ) -> anyhow::Result<HashSet<Key>> {
        if self.fail_reads {
            anyhow::bail!("memory store configured to fail reads");
        }
        let mut inner = self.lock();
        inner.snapshot_reads += 1;
        Ok(inner
            .keys
            .get(&(source.to_string(), account.to_string(), category))
            .cloned()
            .unwrap_or_default())
    }

    async fn known_balance(&self, account: &str) -> anyhow::Result<Decimal> {
        if self.fail_reads {
            anyhow::bail!("memory store configured to fail reads");
        }
        Ok(self
            .lock()
            .balances
            .get(account)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn insert(&self, entries: &[LedgerEntry]) -> anyhow::Result<usize> {
        let mut inner = self.lock();
        let mut inserted = 0;
        for e in entries {
            let slot = (e.source.clone(), e.account.clone(), e.category);
            if inner.keys.entry(slot).or_default().insert(e.key.clone()) {
                inner.rows.push(e.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
