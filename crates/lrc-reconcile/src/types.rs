use std::collections::{BTreeMap, HashSet};

use lrc_schemas::{Category, Key, LedgerEntry};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fractional digits used when a source does not configure one.
pub const DEFAULT_PRECISION: u32 = 8;

/// Largest precision a `Decimal` can represent.
pub const MAX_PRECISION: u32 = 28;

fn default_precision() -> u32 {
    DEFAULT_PRECISION
}

/// Where the source-side balance comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStrategy {
    /// The balance the source reports for the account.
    Reported,
    /// Sum of entry net changes, oldest first.
    #[default]
    Summed,
}

/// Per-source balance agreement rule (`sources[].balance` in config).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancePolicy {
    #[serde(default)]
    pub strategy: BalanceStrategy,
    #[serde(default = "default_precision")]
    pub precision: u32,
    /// Only entries of this asset contribute to a summed balance.
    #[serde(default)]
    pub asset: Option<String>,
}

impl Default for BalancePolicy {
    fn default() -> Self {
        Self {
            strategy: BalanceStrategy::Summed,
            precision: DEFAULT_PRECISION,
            asset: None,
        }
    }
}

/// How `source_balance` was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceBasis {
    Reported,
    Summed,
    /// `Reported` was configured but no balance was obtained.
    SummedFallback,
}

/// Store keys for one account, per category. Read-only snapshot for a pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KnownKeys {
    by_category: BTreeMap<Category, HashSet<Key>>,
}

impl KnownKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: Category, keys: HashSet<Key>) {
        self.by_category.entry(category).or_default().extend(keys);
    }

    pub fn with(mut self, category: Category, keys: impl IntoIterator<Item = Key>) -> Self {
        self.insert(category, keys.into_iter().collect());
        self
    }

    pub fn get(&self, category: Category) -> Option<&HashSet<Key>> {
        self.by_category.get(&category)
    }

    pub fn contains(&self, category: Category, key: &Key) -> bool {
        self.get(category).is_some_and(|k| k.contains(key))
    }

    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.by_category.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_category.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Key-level comparison of one category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub category: Category,
    /// Distinct entries the source reported.
    pub source_count: usize,
    /// Source entries the store already has.
    pub known_count: usize,
    /// Source entries the store lacks.
    pub unknown_count: usize,
    /// Store keys the source did not report.
    pub store_only_count: usize,
    pub duplicates_collapsed: usize,
}

/// Outcome for one account. Derived, never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub source: String,
    pub account: String,
    pub show_all: bool,
    /// Newest first. Every entry in non-show-all mode is absent from the store.
    pub new_entries: Vec<LedgerEntry>,
    pub categories: Vec<CategoryCounts>,
    pub source_balance: Decimal,
    pub known_balance: Decimal,
    pub balance_basis: BalanceBasis,
    pub precision: u32,
    pub balance_match: bool,
    pub count_match: bool,
    pub unkeyed: usize,
    pub self_transfers_dropped: usize,
}

impl ReconciliationResult {
    pub fn is_ok(&self) -> bool {
        self.balance_match && self.count_match
    }

    pub fn source_count(&self) -> usize {
        self.categories.iter().map(|c| c.source_count).sum()
    }

    pub fn known_count(&self) -> usize {
        self.categories.iter().map(|c| c.known_count).sum()
    }

    pub fn store_only_count(&self) -> usize {
        self.categories.iter().map(|c| c.store_only_count).sum()
    }

    pub fn duplicates_collapsed(&self) -> usize {
        self.categories.iter().map(|c| c.duplicates_collapsed).sum()
    }
}
