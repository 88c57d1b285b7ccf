//! Per-account normalized history.
//!
//! # Invariants
//! - Within one category every entry key is unique. A repeated
//!   `(Key, category)` keeps the first occurrence; later ones are counted in
//!   [`CategoryHistory::duplicates_collapsed`] and discarded.
//! - Source order is preserved inside a category. Chronological views are
//!   computed on demand and never reorder the stored sequence.

use std::collections::{BTreeMap, HashSet};

use crate::{Category, Key, LedgerEntry};

/// Entries of one category, in source order.
#[derive(Debug, Clone, Default)]
pub struct CategoryHistory {
    entries: Vec<LedgerEntry>,
    seen: HashSet<Key>,
    duplicates: usize,
}

impl CategoryHistory {
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn keys(&self) -> &HashSet<Key> {
        &self.seen
    }

    pub fn duplicates_collapsed(&self) -> usize {
        self.duplicates
    }

    fn push(&mut self, entry: LedgerEntry) -> bool {
        if !self.seen.insert(entry.key.clone()) {
            self.duplicates += 1;
            return false;
        }
        self.entries.push(entry);
        true
    }
}

/// Ordered ledger entries for one account, grouped by category.
#[derive(Debug, Clone)]
pub struct AccountHistory {
    pub source: String,
    pub account: String,
    categories: BTreeMap<Category, CategoryHistory>,
    /// Records skipped because no key could be derived.
    pub unkeyed: usize,
    /// Incoming legs dropped because the sender is another tracked account.
    pub self_transfers_dropped: usize,
}

impl AccountHistory {
    pub fn new(source: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            account: account.into(),
            categories: BTreeMap::new(),
            unkeyed: 0,
            self_transfers_dropped: 0,
        }
    }

    /// Register a category that was fetched, even when it produced no entries,
    /// so reconciliation reports it with zero counts.
    pub fn touch(&mut self, category: Category) {
        self.categories.entry(category).or_default();
    }

    /// Append an entry. Returns `false` when `(key, category)` was already present.
    pub fn push(&mut self, entry: LedgerEntry) -> bool {
        self.categories
            .entry(entry.category)
            .or_default()
            .push(entry)
    }

    pub fn extend<I: IntoIterator<Item = LedgerEntry>>(&mut self, entries: I) {
        for e in entries {
            self.push(e);
        }
    }

    /// Fold another partial history for the same account into this one.
    /// Duplicate entries collapse exactly as with [`push`](Self::push).
    pub fn merge(&mut self, other: AccountHistory) {
        self.unkeyed += other.unkeyed;
        self.self_transfers_dropped += other.self_transfers_dropped;
        for (category, part) in other.categories {
            let slot = self.categories.entry(category).or_default();
            slot.duplicates += part.duplicates;
            for e in part.entries {
                slot.push(e);
            }
        }
    }

    pub fn category(&self, category: Category) -> Option<&CategoryHistory> {
        self.categories.get(&category)
    }

    pub fn entries(&self, category: Category) -> &[LedgerEntry] {
        self.categories
            .get(&category)
            .map(|c| c.entries())
            .unwrap_or(&[])
    }

    /// Categories present, in stable order.
    pub fn categories(&self) -> impl Iterator<Item = (Category, &CategoryHistory)> {
        self.categories.iter().map(|(c, h)| (*c, h))
    }

    /// All entries, category by category, each in source order.
    pub fn iter(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.categories.values().flat_map(|c| c.entries.iter())
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(|c| c.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duplicates_collapsed(&self) -> usize {
        self.categories.values().map(|c| c.duplicates).sum()
    }

    /// Entries oldest-first (ties broken by category, then key) for balance accumulation.
    pub fn chronological(&self) -> Vec<&LedgerEntry> {
        let mut out: Vec<&LedgerEntry> = self.iter().collect();
        out.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.category.cmp(&b.category))
                .then_with(|| a.key.cmp(&b.key))
        });
        out
    }
}
