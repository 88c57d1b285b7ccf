//! File-backed store for runs without a database.
//!
//! Snapshot (read-only):
//! `{"balances": {"<account>": "<decimal>"}, "keys": {"<source>": {"<account>": {"<category>": [key, ...]}}}}`
//!
//! Inserts are appended as JSON lines to `<snapshot>.inserts.jsonl` and
//! replayed on open, so a rerun sees previously inserted keys.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lrc_runtime::LedgerStore;
use lrc_schemas::{Category, Key, LedgerEntry};
use rust_decimal::Decimal;
use serde::Deserialize;

type Slot = (String, String, Category);

#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    #[serde(default)]
    balances: BTreeMap<String, Decimal>,
    #[serde(default)]
    keys: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<Key>>>>,
}

pub struct FileStore {
    journal: PathBuf,
    balances: BTreeMap<String, Decimal>,
    keys: Mutex<HashMap<Slot, HashSet<Key>>>,
}

impl FileStore {
    /// A missing snapshot is an empty store.
    pub fn open(path: &Path) -> Result<Self> {
        let snapshot: Snapshot = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("read store snapshot failed: {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parse store snapshot failed: {}", path.display()))?
        } else {
            Snapshot::default()
        };

        let mut keys: HashMap<Slot, HashSet<Key>> = HashMap::new();
        for (source, accounts) in snapshot.keys {
            for (account, categories) in accounts {
                for (category, list) in categories {
                    let category = Category::parse(&category).with_context(|| {
                        format!("unknown category '{category}' in store snapshot")
                    })?;
                    keys.entry((source.clone(), account.clone(), category))
                        .or_default()
                        .extend(list);
                }
            }
        }

        let journal = journal_path(path);
        if journal.exists() {
            let raw = fs::read_to_string(&journal)
                .with_context(|| format!("read store journal failed: {}", journal.display()))?;
            for (i, line) in raw.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
                let e: LedgerEntry = serde_json::from_str(line).with_context(|| {
                    format!("store journal line {} is invalid: {}", i + 1, journal.display())
                })?;
                keys.entry((e.source, e.account, e.category))
                    .or_default()
                    .insert(e.key);
            }
        }

        Ok(Self {
            journal,
            balances: snapshot.balances,
            keys: Mutex::new(keys),
        })
    }

    pub fn journal(&self) -> &Path {
        &self.journal
    }
}

pub fn journal_path(snapshot: &Path) -> PathBuf {
    let mut name = snapshot.as_os_str().to_owned();
    name.push(".inserts.jsonl");
    PathBuf::from(name)
}

#[async_trait]
impl LedgerStore for FileStore {
    async fn known_keys(
        &self,
        source: &str,
        account: &str,
        category: Category,
    ) -> Result<HashSet<Key>> {
        let keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        Ok(keys
            .get(&(source.to_string(), account.to_string(), category))
            .cloned()
            .unwrap_or_default())
    }

    async fn known_balance(&self, account: &str) -> Result<Decimal> {
        Ok(self.balances.get(account).copied().unwrap_or(Decimal::ZERO))
    }

    async fn insert(&self, entries: &[LedgerEntry]) -> Result<usize> {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal)
            .with_context(|| format!("open store journal failed: {}", self.journal.display()))?;

        let mut inserted = 0;
        for e in entries {
            let slot = (e.source.clone(), e.account.clone(), e.category);
            if !keys.entry(slot).or_default().insert(e.key.clone()) {
                continue;
            }
            let line = serde_json::to_string(e).context("serialize ledger entry failed")?;
            writeln!(out, "{line}")
                .with_context(|| format!("append store journal failed: {}", self.journal.display()))?;
            inserted += 1;
        }
        Ok(inserted)
    }
}
