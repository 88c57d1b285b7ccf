//! Scenario: user interrupt during a pass.
//!
//! Raising the cancel flag while fetches are in flight stops the pass with
//! `PassError::Cancelled` promptly; no report is produced and nothing is
//! salvaged from the abandoned fetches.

use std::sync::Arc;
use std::time::Duration;

use lrc_runtime::{PassError, PassOptions, ReconcilePass};
use lrc_schemas::Category;
use lrc_source::Termination;
use lrc_testkit::builders::{deposit, deposit_category, descriptor, pagination};
use lrc_testkit::{MemoryStore, ScriptedSource};
use tokio::sync::watch;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn cancel_stops_in_flight_fetches() {
    let source = Arc::new(
        ScriptedSource::new("kraken")
            .with_records(
                "alice",
                Category::Deposit,
                vec![deposit(1, 1_700_000_000, "1")],
                10,
            )
            .with_delay(Duration::from_secs(60)),
    );
    let d = descriptor(
        "kraken",
        &["alice", "bob"],
        pagination(0, 10, Termination::ShortPage),
        vec![deposit_category()],
    );
    let (tx, rx) = watch::channel(false);
    let pass = ReconcilePass::new(
        Arc::new(d),
        source.clone(),
        Arc::new(MemoryStore::new()),
        PassOptions::default(),
    )
    .with_cancel(rx);

    let started = Instant::now();
    let (result, _) = tokio::join!(pass.run(), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();
    });

    assert_eq!(result.unwrap_err(), PassError::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(60));
    assert_eq!(source.call_count(), 2, "both streams had started their first page");
}

#[tokio::test]
async fn dropped_sender_never_cancels() {
    let source = Arc::new(ScriptedSource::new("kraken"));
    let d = descriptor(
        "kraken",
        &["alice"],
        pagination(0, 10, Termination::ShortPage),
        vec![deposit_category()],
    );
    let (tx, rx) = watch::channel(false);
    drop(tx);

    let report = ReconcilePass::new(
        Arc::new(d),
        source,
        Arc::new(MemoryStore::new()),
        PassOptions::default(),
    )
    .with_cancel(rx)
    .run()
    .await
    .unwrap();
    assert_eq!(report.new_entry_count(), 0);
}
