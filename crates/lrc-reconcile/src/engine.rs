use std::collections::BTreeSet;

use lrc_schemas::{AccountHistory, Category, LedgerEntry};
use rust_decimal::Decimal;

use crate::balance::{round_balance, select_source_balance};
use crate::types::{BalancePolicy, CategoryCounts, KnownKeys, ReconciliationResult};

/// Entries of `history` whose key the store does not hold for that category,
/// in history order. In show-all mode every entry is returned and `known` is
/// not consulted.
pub fn new_entries<'a>(
    history: &'a AccountHistory,
    known: &KnownKeys,
    show_all: bool,
) -> Vec<&'a LedgerEntry> {
    if show_all {
        return history.iter().collect();
    }
    history
        .iter()
        .filter(|e| !known.contains(e.category, &e.key))
        .collect()
}

fn category_counts(
    history: &AccountHistory,
    known: &KnownKeys,
    category: Category,
) -> CategoryCounts {
    let (source_count, known_count, duplicates_collapsed) = match history.category(category) {
        Some(h) => (
            h.entries().len(),
            h.entries()
                .iter()
                .filter(|e| known.contains(category, &e.key))
                .count(),
            h.duplicates_collapsed(),
        ),
        None => (0, 0, 0),
    };

    let store_only_count = match (known.get(category), history.category(category)) {
        (Some(store), Some(h)) => store.iter().filter(|k| !h.keys().contains(*k)).count(),
        (Some(store), None) => store.len(),
        (None, _) => 0,
    };

    CategoryCounts {
        category,
        source_count,
        known_count,
        unknown_count: source_count - known_count,
        store_only_count,
        duplicates_collapsed,
    }
}

/// Deterministic reconciliation of one account:
/// - `new_entries` = history minus `known_keys` (all of history when `show_all`)
/// - per-category counts from the true difference, regardless of `show_all`
/// - `balance_match` = rounded source balance == rounded `known_balance`
/// - `count_match` = no store key missing from the source
pub fn reconcile(
    history: &AccountHistory,
    known_keys: &KnownKeys,
    known_balance: Decimal,
    show_all: bool,
    policy: &BalancePolicy,
    reported_balance: Option<Decimal>,
) -> ReconciliationResult {
    let mut fresh: Vec<LedgerEntry> = new_entries(history, known_keys, show_all)
        .into_iter()
        .cloned()
        .collect();
    fresh.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.category.cmp(&b.category))
            .then_with(|| a.key.cmp(&b.key))
    });

    let categories: BTreeSet<Category> = history
        .categories()
        .map(|(c, _)| c)
        .chain(known_keys.categories())
        .collect();
    let counts: Vec<CategoryCounts> = categories
        .into_iter()
        .map(|c| category_counts(history, known_keys, c))
        .collect();
    let count_match = counts.iter().all(|c| c.store_only_count == 0);

    let (raw_source_balance, balance_basis) =
        select_source_balance(history, policy, reported_balance);
    let source_balance = round_balance(raw_source_balance, policy.precision);
    let known_balance = round_balance(known_balance, policy.precision);

    ReconciliationResult {
        source: history.source.clone(),
        account: history.account.clone(),
        show_all,
        new_entries: fresh,
        categories: counts,
        source_balance,
        known_balance,
        balance_basis,
        precision: policy.precision,
        balance_match: source_balance == known_balance,
        count_match,
        unkeyed: history.unkeyed,
        self_transfers_dropped: history.self_transfers_dropped,
    }
}
