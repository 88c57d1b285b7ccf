//! Account orchestrator.
//!
//! One [`ReconcilePass`] reconciles one source:
//! 1. validate the descriptor (fail fast, nothing fetched yet)
//! 2. snapshot known keys and balances from the store, once
//! 3. fan out one task per (account, category), bounded by a semaphore and
//!    spaced by the source's shared [`RateGate`]
//! 4. merge every partial history once all tasks have finished
//! 5. fetch reported balances when the source's strategy asks for them
//! 6. reconcile each account in configured order
//!
//! Pagination inside a task stays sequential. A failed page fetch truncates
//! only its own (account, category); it is recorded in the report as a
//! [`FetchFailure`] and never cancels sibling tasks. Cancellation through the
//! watch flag aborts every in-flight task and returns
//! [`PassError::Cancelled`] without salvaging partial results.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lrc_reconcile::{
    failing_accounts, overall_ok, reconcile, BalanceStrategy, KnownKeys, ReconciliationResult,
};
use lrc_schemas::{AccountHistory, Category, LedgerEntry};
use lrc_source::{
    normalize_records, tracked_set, NormalizeContext, Paginator, RateGate, SourceFetcher,
    StopReason,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PassOptions;
use crate::descriptor::{DescriptorError, SourceDescriptor};
use crate::store::LedgerStore;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassError {
    /// Invalid descriptor or pass options. Raised before any fetch.
    Config(DescriptorError),
    /// The store could not provide the known-keys/balance snapshot, or
    /// rejected an insert.
    Store(String),
    /// The pass was cancelled; in-flight fetches were abandoned.
    Cancelled,
    /// A fetch task panicked or was aborted outside cancellation.
    Task(String),
    /// `commit_new_entries` was called with a show-all report.
    CommitRefused(String),
}

impl fmt::Display for PassError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassError::Config(e) => write!(f, "configuration error: {e}"),
            PassError::Store(msg) => write!(f, "store error: {msg}"),
            PassError::Cancelled => write!(f, "reconciliation pass cancelled"),
            PassError::Task(msg) => write!(f, "fetch task failed: {msg}"),
            PassError::CommitRefused(msg) => write!(f, "commit refused: {msg}"),
        }
    }
}

impl std::error::Error for PassError {}

impl From<DescriptorError> for PassError {
    fn from(e: DescriptorError) -> Self {
        PassError::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// An (account, category) whose history was truncated by a fetch error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    pub account: String,
    pub category: Category,
    /// Pages successfully fetched before the failure.
    pub pages_fetched: usize,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub pass_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub show_all: bool,
    /// One result per configured account, in configured order.
    pub results: Vec<ReconciliationResult>,
    /// Ordered by account, then category.
    pub fetch_failures: Vec<FetchFailure>,
    pub overall_ok: bool,
}

impl SourceReport {
    pub fn result(&self, account: &str) -> Option<&ReconciliationResult> {
        self.results.iter().find(|r| r.account == account)
    }

    pub fn new_entry_count(&self) -> usize {
        self.results.iter().map(|r| r.new_entries.len()).sum()
    }

    pub fn new_entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.results.iter().flat_map(|r| r.new_entries.iter())
    }
}

// ---------------------------------------------------------------------------
// Pass
// ---------------------------------------------------------------------------

struct AccountSnapshot {
    known_keys: KnownKeys,
    known_balance: Decimal,
}

struct TaskOutcome {
    account_index: usize,
    category: Category,
    history: AccountHistory,
    pages_fetched: usize,
    stop: StopReason,
}

pub struct ReconcilePass {
    descriptor: Arc<SourceDescriptor>,
    fetcher: Arc<dyn SourceFetcher>,
    store: Arc<dyn LedgerStore>,
    options: PassOptions,
    cancel: Option<watch::Receiver<bool>>,
}

impl ReconcilePass {
    pub fn new(
        descriptor: Arc<SourceDescriptor>,
        fetcher: Arc<dyn SourceFetcher>,
        store: Arc<dyn LedgerStore>,
        options: PassOptions,
    ) -> Self {
        Self {
            descriptor,
            fetcher,
            store,
            options,
            cancel: None,
        }
    }

    /// Cancel the pass once `true` is published on this channel.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub async fn run(&self) -> Result<SourceReport, PassError> {
        self.descriptor.validate()?;
        if self.options.max_concurrency == 0 {
            return Err(PassError::Config(DescriptorError::ZeroConcurrency));
        }

        let mut cancel = self.cancel.clone();
        let d = &self.descriptor;
        let pass_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            source = %d.name,
            %pass_id,
            accounts = d.accounts.len(),
            categories = d.categories.len(),
            show_all = self.options.show_all,
            "reconcile pass started"
        );

        let snapshots = until_cancelled(&mut cancel, self.snapshot()).await??;
        // One gate spaces every request of this source, pages and balances alike.
        let gate = RateGate::from_millis(d.min_request_interval_ms);
        let (histories, fetch_failures) = self.fetch_all(&gate, &mut cancel).await?;
        let reported = until_cancelled(&mut cancel, self.reported_balances(&gate)).await?;

        let mut results = Vec::with_capacity(d.accounts.len());
        for (i, history) in histories.iter().enumerate() {
            let snap = &snapshots[i];
            let result = reconcile(
                history,
                &snap.known_keys,
                snap.known_balance,
                self.options.show_all,
                &d.balance,
                reported[i],
            );
            log_result(&result);
            results.push(result);
        }

        let ok = overall_ok(&results);
        let report = SourceReport {
            source: d.name.clone(),
            pass_id,
            started_at,
            finished_at: Utc::now(),
            show_all: self.options.show_all,
            results,
            fetch_failures,
            overall_ok: ok,
        };
        info!(
            source = %report.source,
            %pass_id,
            overall_ok = report.overall_ok,
            new_entries = report.new_entry_count(),
            fetch_failures = report.fetch_failures.len(),
            failing = ?failing_accounts(&report.results),
            "reconcile pass finished"
        );
        Ok(report)
    }

    /// Known keys per (account, category) and known balance per account.
    async fn snapshot(&self) -> Result<Vec<AccountSnapshot>, PassError> {
        let d = &self.descriptor;
        let mut out = Vec::with_capacity(d.accounts.len());
        for account in &d.accounts {
            let mut known_keys = KnownKeys::new();
            for spec in &d.categories {
                let keys = self
                    .store
                    .known_keys(&d.name, account, spec.category)
                    .await
                    .map_err(|e| PassError::Store(format!("{e:#}")))?;
                known_keys.insert(spec.category, keys);
            }
            let known_balance = self
                .store
                .known_balance(account)
                .await
                .map_err(|e| PassError::Store(format!("{e:#}")))?;
            debug!(
                source = %d.name,
                account = %account,
                known_keys = known_keys.len(),
                %known_balance,
                "store snapshot taken"
            );
            out.push(AccountSnapshot {
                known_keys,
                known_balance,
            });
        }
        Ok(out)
    }

    /// Run every (account, category) pagination and merge per account.
    async fn fetch_all(
        &self,
        gate: &RateGate,
        cancel: &mut Option<watch::Receiver<bool>>,
    ) -> Result<(Vec<AccountHistory>, Vec<FetchFailure>), PassError> {
        let d = &self.descriptor;
        let tracked = Arc::new(tracked_set(&d.accounts));
        let permits = Arc::new(Semaphore::new(self.options.max_concurrency));

        let mut tasks: JoinSet<Result<TaskOutcome, String>> = JoinSet::new();
        for account_index in 0..d.accounts.len() {
            for category_index in 0..d.categories.len() {
                let descriptor = Arc::clone(d);
                let fetcher = Arc::clone(&self.fetcher);
                let tracked = Arc::clone(&tracked);
                let permits = Arc::clone(&permits);
                let gate = gate.clone();
                tasks.spawn(async move {
                    let _permit = permits.acquire_owned().await.map_err(|e| e.to_string())?;
                    let account = &descriptor.accounts[account_index];
                    let spec = &descriptor.categories[category_index];

                    let collected = Paginator::new(fetcher.as_ref(), &descriptor.pagination)
                        .with_gate(&gate)
                        .collect(account, spec.category)
                        .await;
                    let ctx = NormalizeContext {
                        source: &descriptor.name,
                        account,
                        tracked: &tracked,
                    };
                    let history = normalize_records(collected.records, spec, &ctx);
                    Ok(TaskOutcome {
                        account_index,
                        category: spec.category,
                        history,
                        pages_fetched: collected.pages_fetched,
                        stop: collected.stop,
                    })
                });
            }
        }

        let mut histories: Vec<AccountHistory> = d
            .accounts
            .iter()
            .map(|a| AccountHistory::new(d.name.clone(), a.clone()))
            .collect();
        let mut failures: Vec<(usize, FetchFailure)> = Vec::new();

        loop {
            let next = match until_cancelled(cancel, tasks.join_next()).await {
                Ok(next) => next,
                Err(cancelled) => {
                    tasks.abort_all();
                    warn!(source = %d.name, "pass cancelled; in-flight fetches abandoned");
                    return Err(cancelled);
                }
            };
            let Some(joined) = next else {
                break;
            };
            let outcome = joined
                .map_err(|e| PassError::Task(e.to_string()))?
                .map_err(PassError::Task)?;

            if let StopReason::FetchFailed(err) = &outcome.stop {
                failures.push((
                    outcome.account_index,
                    FetchFailure {
                        account: d.accounts[outcome.account_index].clone(),
                        category: outcome.category,
                        pages_fetched: outcome.pages_fetched,
                        error: err.to_string(),
                    },
                ));
            }
            histories[outcome.account_index].merge(outcome.history);
        }

        failures.sort_by(|a, b| (a.0, a.1.category).cmp(&(b.0, b.1.category)));
        Ok((histories, failures.into_iter().map(|(_, f)| f).collect()))
    }

    /// Source-reported balance per account, or `None` when the strategy is
    /// `Summed` or the fetch failed.
    async fn reported_balances(&self, gate: &RateGate) -> Vec<Option<Decimal>> {
        let d = &self.descriptor;
        if d.balance.strategy != BalanceStrategy::Reported {
            return vec![None; d.accounts.len()];
        }
        let mut out = Vec::with_capacity(d.accounts.len());
        for account in &d.accounts {
            gate.wait().await;
            let balance = match self.fetcher.fetch_balance(account).await {
                Ok(b) => b,
                Err(err) => {
                    warn!(
                        source = %d.name,
                        account = %account,
                        error = %err,
                        "balance fetch failed; falling back to summed balance"
                    );
                    None
                }
            };
            out.push(balance);
        }
        out
    }
}

fn log_result(r: &ReconciliationResult) {
    if !r.balance_match {
        warn!(
            source = %r.source,
            account = %r.account,
            source_balance = %r.source_balance,
            known_balance = %r.known_balance,
            basis = ?r.balance_basis,
            precision = r.precision,
            "balance mismatch"
        );
    }
    if !r.count_match {
        warn!(
            source = %r.source,
            account = %r.account,
            store_only = r.store_only_count(),
            "store holds keys the source no longer reports"
        );
    }
    info!(
        source = %r.source,
        account = %r.account,
        source_count = r.source_count(),
        known_count = r.known_count(),
        new_entries = r.new_entries.len(),
        duplicates = r.duplicates_collapsed(),
        unkeyed = r.unkeyed,
        self_transfers = r.self_transfers_dropped,
        balance_match = r.balance_match,
        count_match = r.count_match,
        "account reconciled"
    );
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Resolves once `true` is observed. Never resolves without a receiver or
/// after the sender is dropped.
async fn cancelled(cancel: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = cancel else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

async fn until_cancelled<F: Future>(
    cancel: &mut Option<watch::Receiver<bool>>,
    fut: F,
) -> Result<F::Output, PassError> {
    tokio::select! {
        biased;
        _ = cancelled(cancel) => Err(PassError::Cancelled),
        out = fut => Ok(out),
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Insert the new entries of `report` into `store`.
///
/// Refused for show-all reports, whose entries include records the store
/// already holds.
pub async fn commit_new_entries(
    store: &dyn LedgerStore,
    report: &SourceReport,
) -> Result<usize, PassError> {
    if report.show_all {
        return Err(PassError::CommitRefused(format!(
            "pass {} ran in show-all mode",
            report.pass_id
        )));
    }
    let entries: Vec<LedgerEntry> = report.new_entries().cloned().collect();
    if entries.is_empty() {
        return Ok(0);
    }
    let inserted = store
        .insert(&entries)
        .await
        .map_err(|e| PassError::Store(format!("{e:#}")))?;
    info!(
        source = %report.source,
        pass_id = %report.pass_id,
        offered = entries.len(),
        inserted,
        "new entries committed"
    );
    Ok(inserted)
}
