//! Scenario: sources occasionally emit the same record twice.
//!
//! Duplicates collapse by (key, category) keeping the first occurrence, and
//! the collapsed count is reported rather than failing the pass.
//! Normalizing one page twice and merging equals normalizing it once.

use std::collections::HashSet;
use std::sync::Arc;

use lrc_runtime::{PassOptions, ReconcilePass};
use lrc_schemas::{Category, Key};
use lrc_source::{normalize_records, tracked_set, NormalizeContext, Page, Termination};
use lrc_testkit::builders::{deposit, deposit_category, descriptor, pagination};
use lrc_testkit::{MemoryStore, ScriptedSource};
use rust_decimal::Decimal;

#[test]
fn normalizing_a_page_twice_is_idempotent() {
    let page = vec![
        deposit(1, 1_700_000_001, "5"),
        deposit(2, 1_700_000_002, "6"),
    ];
    let spec = deposit_category();
    let tracked: HashSet<String> = tracked_set(["acct"]);
    let ctx = NormalizeContext {
        source: "kraken",
        account: "acct",
        tracked: &tracked,
    };

    let once = normalize_records(page.clone(), &spec, &ctx);
    let mut twice = normalize_records(page.clone(), &spec, &ctx);
    twice.merge(normalize_records(page, &spec, &ctx));

    let once_entries: Vec<_> = once.entries(Category::Deposit).to_vec();
    let twice_entries: Vec<_> = twice.entries(Category::Deposit).to_vec();
    assert_eq!(once_entries, twice_entries);
    assert_eq!(twice.len(), 2);
    assert_eq!(twice.duplicates_collapsed(), 2);
}

#[tokio::test]
async fn repeated_record_across_pages_counts_once() {
    // Same id 2 on both pages, with a different amount on the repeat.
    let pages = vec![
        Page::new(vec![deposit(1, 1_700_000_001, "1"), deposit(2, 1_700_000_002, "2")]),
        Page::new(vec![deposit(2, 1_700_000_002, "999"), deposit(3, 1_700_000_003, "3")]),
        Page::new(vec![]),
    ];
    let source = ScriptedSource::new("kraken").with_pages("acct", Category::Deposit, pages);
    let d = descriptor(
        "kraken",
        &["acct"],
        pagination(0, 2, Termination::ShortPage),
        vec![deposit_category()],
    );
    let store = MemoryStore::new().with_balance("acct", Decimal::new(6, 0));

    let report = ReconcilePass::new(
        Arc::new(d),
        Arc::new(source),
        Arc::new(store),
        PassOptions::default(),
    )
    .run()
    .await
    .unwrap();

    let r = report.result("acct").unwrap();
    assert_eq!(r.source_count(), 3);
    assert_eq!(r.duplicates_collapsed(), 1);
    let kept = r
        .new_entries
        .iter()
        .find(|e| e.key == Key::from(2))
        .unwrap();
    assert_eq!(kept.amount, Decimal::new(2, 0));
    assert!(r.balance_match, "first occurrence wins, so the sum is 6");
}
